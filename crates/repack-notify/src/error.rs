use thiserror::Error;

/// Errors a dispatcher can report. All of them are transient from the
/// scheduler's point of view: the reminder is retried on the next run.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The recipient address is empty or obviously malformed.
    #[error("Invalid address: {0:?}")]
    InvalidAddress(String),

    /// A message could not be delivered to the relay.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// The relay answered with a non-success status.
    #[error("Relay rejected message: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Operation timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Template error: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<minijinja::Error> for NotifyError {
    fn from(e: minijinja::Error) -> Self {
        NotifyError::Template(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NotifyError>;
