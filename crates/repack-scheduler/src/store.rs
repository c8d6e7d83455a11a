use chrono::{DateTime, Utc};
use repack_core::types::{DeviceId, ReminderStage};
use repack_devices::{DeviceListing, DeviceStore, RecordOutcome, Result};

/// The persistence the engine needs: read eligible devices, record deliveries.
///
/// Record operations are idempotent and fail with `DeviceNotFound` when the
/// device has been deleted since it was listed.
pub trait ReminderStore: Send + Sync {
    /// Devices whose owner is active and whose reminders are enabled, plus
    /// the number of rows that could not be decoded.
    /// `now` lets an implementation pre-filter; the evaluator decides anyway.
    fn list_eligible_devices(&self, now: DateTime<Utc>) -> Result<DeviceListing>;

    fn record_stage1_sent(&self, id: DeviceId, when: DateTime<Utc>) -> Result<RecordOutcome>;

    fn record_stage2_sent(&self, id: DeviceId, when: DateTime<Utc>) -> Result<RecordOutcome>;

    fn record_sent(
        &self,
        id: DeviceId,
        stage: ReminderStage,
        when: DateTime<Utc>,
    ) -> Result<RecordOutcome> {
        match stage {
            ReminderStage::Stage1 => self.record_stage1_sent(id, when),
            ReminderStage::Stage2 => self.record_stage2_sent(id, when),
        }
    }
}

impl ReminderStore for DeviceStore {
    fn list_eligible_devices(&self, _now: DateTime<Utc>) -> Result<DeviceListing> {
        DeviceStore::list_eligible_devices(self)
    }

    fn record_stage1_sent(&self, id: DeviceId, when: DateTime<Utc>) -> Result<RecordOutcome> {
        DeviceStore::record_stage1_sent(self, id, when)
    }

    fn record_stage2_sent(&self, id: DeviceId, when: DateTime<Utc>) -> Result<RecordOutcome> {
        DeviceStore::record_stage2_sent(self, id, when)
    }
}
