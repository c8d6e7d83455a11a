use repack_devices::DeviceError;
use thiserror::Error;

/// Errors that can occur within the reminder scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Reading eligible devices failed; the whole run is retried at the next tick.
    #[error("Store error: {0}")]
    Store(#[from] DeviceError),

    /// A batch is already running and the overlap policy is `skip`.
    #[error("A reminder run is already in progress")]
    RunInProgress,

    /// The configured daily run time does not exist.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
