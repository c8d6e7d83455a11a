//! `repack-devices`: SQLite store for owners, devices and per-cycle reminder state.
//!
//! Reminder state is two nullable timestamps on the device row
//! (`first_reminder_sent`, `second_reminder_sent`). Changing the packing
//! date clears both in the same `UPDATE`, so a new cycle always starts
//! from [`ReminderState::Pending`].

pub mod db;
pub mod error;
pub mod migrate;
pub mod store;
pub mod types;

pub use error::{DeviceError, Result};
pub use store::DeviceStore;
pub use types::{
    Device, DeviceListing, DeviceUpdate, DeviceWithOwner, NewDevice, NewOwner, Owner,
    OwnerSummary, RecordOutcome, ReminderState, UpdateOutcome,
};
