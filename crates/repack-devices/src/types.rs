use chrono::{DateTime, Utc};
use repack_core::types::{DeviceId, OwnerId, ReminderInterval, ReminderStage};
use serde::{Deserialize, Serialize};

/// Person who registered one or more devices and receives the reminders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: OwnerId,
    /// Contact address; unique across owners.
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_admin: bool,
    /// Inactive owners never receive reminders, whatever their devices' state.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Owner {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// A registered safety device and the reminder state of its current service cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub owner_id: OwnerId,
    pub name: String,
    pub serial_number: Option<String>,
    pub notes: Option<String>,
    /// Start of the current cycle ("last packed").
    pub last_serviced: DateTime<Utc>,
    pub interval: ReminderInterval,
    pub reminders_enabled: bool,
    pub stage1_sent_at: Option<DateTime<Utc>>,
    /// Only ever set after `stage1_sent_at`.
    pub stage2_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Device {
    pub fn reminder_state(&self) -> ReminderState {
        match (self.stage1_sent_at, self.stage2_sent_at) {
            (_, Some(_)) => ReminderState::Stage2Notified,
            (Some(_), None) => ReminderState::Stage1Notified,
            (None, None) => ReminderState::Pending,
        }
    }

    pub fn sent_at(&self, stage: ReminderStage) -> Option<DateTime<Utc>> {
        match stage {
            ReminderStage::Stage1 => self.stage1_sent_at,
            ReminderStage::Stage2 => self.stage2_sent_at,
        }
    }
}

/// Position of a device within its current service cycle.
///
/// `Pending → Stage1Notified → Stage2Notified`; a new packing date resets to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderState {
    Pending,
    Stage1Notified,
    /// Terminal until the device is repacked.
    Stage2Notified,
}

impl std::fmt::Display for ReminderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReminderState::Pending => "pending",
            ReminderState::Stage1Notified => "stage1_notified",
            ReminderState::Stage2Notified => "stage2_notified",
        };
        write!(f, "{s}")
    }
}

/// Device joined with its owner, as the scheduler and the admin listing see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceWithOwner {
    pub device: Device,
    pub owner: Owner,
}

impl DeviceWithOwner {
    /// Active owner and reminders switched on.
    pub fn is_eligible(&self) -> bool {
        self.owner.is_active && self.device.reminders_enabled
    }
}

/// Owner row for the admin listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnerSummary {
    pub owner: Owner,
    pub device_count: usize,
}

/// Result of a device listing. Rows that cannot be mapped (for example a
/// legacy row with an interval outside 6/9/12) are counted, not returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceListing {
    pub devices: Vec<DeviceWithOwner>,
    pub unreadable: usize,
}

#[derive(Debug, Clone)]
pub struct NewOwner {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone)]
pub struct NewDevice {
    pub owner_id: OwnerId,
    pub name: String,
    pub serial_number: Option<String>,
    pub notes: Option<String>,
    /// Defaults to the creation time.
    pub last_serviced: Option<DateTime<Utc>>,
    pub interval: ReminderInterval,
    pub reminders_enabled: bool,
}

/// Full replacement of the owner-editable device fields.
#[derive(Debug, Clone)]
pub struct DeviceUpdate {
    pub name: String,
    pub serial_number: Option<String>,
    pub notes: Option<String>,
    pub last_serviced: DateTime<Utc>,
    pub interval: ReminderInterval,
    pub reminders_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    /// True when the packing date changed and both sent-flags were cleared.
    pub reminders_reset: bool,
}

/// Result of recording a sent reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    /// The flag was already set; nothing changed.
    AlreadyRecorded,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn device(stage1: Option<DateTime<Utc>>, stage2: Option<DateTime<Utc>>) -> Device {
        let t = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        Device {
            id: DeviceId(1),
            owner_id: OwnerId(1),
            name: "Reserve".into(),
            serial_number: None,
            notes: None,
            last_serviced: t,
            interval: ReminderInterval::SixMonths,
            reminders_enabled: true,
            stage1_sent_at: stage1,
            stage2_sent_at: stage2,
            created_at: t,
        }
    }

    #[test]
    fn state_follows_sent_flags() {
        let t = Utc::now();
        assert_eq!(device(None, None).reminder_state(), ReminderState::Pending);
        assert_eq!(
            device(Some(t), None).reminder_state(),
            ReminderState::Stage1Notified
        );
        assert_eq!(
            device(Some(t), Some(t)).reminder_state(),
            ReminderState::Stage2Notified
        );
    }

    #[test]
    fn display_name_joins_and_trims() {
        let owner = Owner {
            id: OwnerId(3),
            email: "a@example.org".into(),
            first_name: "Ada".into(),
            last_name: String::new(),
            is_admin: false,
            is_active: true,
            created_at: Utc::now(),
        };
        assert_eq!(owner.display_name(), "Ada");
    }
}
