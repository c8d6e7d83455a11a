use chrono::{DateTime, Utc};
use repack_core::types::{DeviceId, ReminderStage};
use repack_devices::ReminderState;
use serde::Serialize;

/// What the evaluator decided for one device at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderAction {
    NoAction,
    SendStage1,
    SendStage2,
}

impl ReminderAction {
    pub fn stage(self) -> Option<ReminderStage> {
        match self {
            ReminderAction::NoAction => None,
            ReminderAction::SendStage1 => Some(ReminderStage::Stage1),
            ReminderAction::SendStage2 => Some(ReminderStage::Stage2),
        }
    }
}

impl std::fmt::Display for ReminderAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReminderAction::NoAction => "no_action",
            ReminderAction::SendStage1 => "send_stage1",
            ReminderAction::SendStage2 => "send_stage2",
        };
        write!(f, "{s}")
    }
}

/// Whether a batch is currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    Idle,
    Running,
}

impl std::fmt::Display for DriverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverState::Idle => write!(f, "idle"),
            DriverState::Running => write!(f, "running"),
        }
    }
}

/// Result of one device's work within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceOutcome {
    /// Nothing due.
    Skipped,
    Sent(ReminderStage),
    /// Rendered by a dry-run dispatcher; nothing recorded.
    DryRun(ReminderStage),
    /// The dispatcher failed; state untouched, retried next run.
    DeliveryFailed,
    /// Delivered, but the sent-flag could not be persisted.
    CommitFailed,
}

/// Counters for one `run_once` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Eligible devices loaded for this run.
    pub evaluated: usize,
    /// Eligible rows that could not be decoded and were left out.
    pub unreadable: usize,
    pub stage1_sent: usize,
    pub stage2_sent: usize,
    /// Reminders that were due but only logged, not delivered.
    pub dry_run: usize,
    pub skipped: usize,
    pub delivery_failures: usize,
    pub commit_failures: usize,
    /// Devices with a reminder due that were not started because a stop was
    /// requested.
    pub abandoned: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: DeviceOutcome) {
        match outcome {
            DeviceOutcome::Skipped => self.skipped += 1,
            DeviceOutcome::Sent(ReminderStage::Stage1) => self.stage1_sent += 1,
            DeviceOutcome::Sent(ReminderStage::Stage2) => self.stage2_sent += 1,
            DeviceOutcome::DryRun(_) => self.dry_run += 1,
            DeviceOutcome::DeliveryFailed => self.delivery_failures += 1,
            DeviceOutcome::CommitFailed => self.commit_failures += 1,
        }
    }

    pub fn sent(&self) -> usize {
        self.stage1_sent + self.stage2_sent
    }
}

/// Operator view of one device's position in its cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    pub device_id: DeviceId,
    pub device_name: String,
    pub owner_email: String,
    pub eligible: bool,
    pub state: ReminderState,
    pub due_date: DateTime<Utc>,
    pub escalation_date: DateTime<Utc>,
    /// What a run at the status instant would do.
    pub next_action: ReminderAction,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_outcomes() {
        let mut s = RunSummary::default();
        s.record(DeviceOutcome::Sent(ReminderStage::Stage1));
        s.record(DeviceOutcome::Sent(ReminderStage::Stage2));
        s.record(DeviceOutcome::Sent(ReminderStage::Stage1));
        s.record(DeviceOutcome::Skipped);
        s.record(DeviceOutcome::DeliveryFailed);
        s.record(DeviceOutcome::CommitFailed);
        s.record(DeviceOutcome::DryRun(ReminderStage::Stage2));
        assert_eq!(s.stage1_sent, 2);
        assert_eq!(s.stage2_sent, 1);
        assert_eq!(s.sent(), 3);
        assert_eq!(s.skipped, 1);
        assert_eq!(s.delivery_failures, 1);
        assert_eq!(s.commit_failures, 1);
        assert_eq!(s.dry_run, 1);
    }

    #[test]
    fn summary_serializes_flat() {
        let s = RunSummary {
            evaluated: 3,
            stage1_sent: 1,
            ..RunSummary::default()
        };
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["evaluated"], 3);
        assert_eq!(json["stage1_sent"], 1);
        assert_eq!(json["abandoned"], 0);
        assert_eq!(json["unreadable"], 0);
    }

    #[test]
    fn action_maps_to_stage() {
        assert_eq!(ReminderAction::NoAction.stage(), None);
        assert_eq!(ReminderAction::SendStage1.stage(), Some(ReminderStage::Stage1));
        assert_eq!(ReminderAction::SendStage2.stage(), Some(ReminderStage::Stage2));
    }
}
