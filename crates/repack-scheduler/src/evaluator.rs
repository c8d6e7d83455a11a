//! Decides which reminder, if any, a device needs right now.
//!
//! Pure functions of the persisted device record and an injected `now`, so a
//! run can be repeated at any time and always re-derives the same action.

use chrono::{DateTime, Utc};
use repack_devices::DeviceWithOwner;

use crate::calendar::{due_date, escalation_date};
use crate::types::{DeviceStatus, ReminderAction};

/// Stage 1 is checked before stage 2, so a device that was never reminded
/// gets its first notice even when `now` is already past the escalation date.
pub fn evaluate(record: &DeviceWithOwner, now: DateTime<Utc>) -> ReminderAction {
    if !record.is_eligible() {
        return ReminderAction::NoAction;
    }
    let device = &record.device;
    let due = due_date(device.last_serviced, device.interval);

    match (device.stage1_sent_at, device.stage2_sent_at) {
        (None, _) if now >= due => ReminderAction::SendStage1,
        (None, _) => ReminderAction::NoAction,
        (Some(_), None) if now >= escalation_date(due) => ReminderAction::SendStage2,
        _ => ReminderAction::NoAction,
    }
}

pub fn status(record: &DeviceWithOwner, now: DateTime<Utc>) -> DeviceStatus {
    let device = &record.device;
    let due = due_date(device.last_serviced, device.interval);
    DeviceStatus {
        device_id: device.id,
        device_name: device.name.clone(),
        owner_email: record.owner.email.clone(),
        eligible: record.is_eligible(),
        state: device.reminder_state(),
        due_date: due,
        escalation_date: escalation_date(due),
        next_action: evaluate(record, now),
    }
}
