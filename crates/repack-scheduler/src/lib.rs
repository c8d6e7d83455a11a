//! `repack-scheduler`: the two-stage repack reminder engine.
//!
//! # Overview
//!
//! [`engine::ReminderEngine::run_once`] loads every eligible device, lets the
//! [`evaluator`] decide which reminder (if any) is due, hands it to a
//! [`repack_notify::Dispatcher`] and records the sent-flag only after the
//! delivery succeeded. A dry-run dispatcher never records anything.
//! [`engine::ReminderEngine::run`] wraps it in a daily loop.
//!
//! # Reminder timeline
//!
//! | Instant                       | Action                          |
//! |-------------------------------|---------------------------------|
//! | `last_serviced + interval`    | stage 1 (due date)              |
//! | due date + 1 month            | stage 2 (escalation)            |
//! | after stage 2                 | nothing until the next repack   |

pub mod calendar;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod schedule;
pub mod store;
pub mod types;

pub use engine::ReminderEngine;
pub use error::{Result, SchedulerError};
pub use evaluator::evaluate;
pub use store::ReminderStore;
pub use types::{DeviceOutcome, DeviceStatus, DriverState, ReminderAction, RunSummary};
