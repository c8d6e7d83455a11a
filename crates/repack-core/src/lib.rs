//! `repack-core`: shared primitives for the repack reminder service.

pub mod config;
pub mod error;
pub mod types;

pub use config::{OverlapPolicy, RepackConfig};
pub use error::{CoreError, Result};
pub use types::{DeviceId, OwnerId, ReminderInterval, ReminderStage};
