use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Repack plans are 6, 9 or 12 months; everything else is rejected.
    #[error("Invalid reminder interval: {0} months (expected 6, 9 or 12)")]
    InvalidInterval(u32),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
