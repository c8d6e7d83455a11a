use repack_core::types::{DeviceId, OwnerId};
use thiserror::Error;

/// All device-store errors. Kept separate from CoreError so the scheduler
/// can tell "device is gone" apart from "database is broken".
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceId),

    #[error("Owner not found: {0}")]
    OwnerNotFound(OwnerId),

    #[error("Owner already exists: {0}")]
    OwnerExists(String),

    /// Stage 2 can only be recorded once stage 1 has been recorded for the cycle.
    #[error("Stage 2 reminder recorded before stage 1 for device {0}")]
    StageOrder(DeviceId),

    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, DeviceError>;
