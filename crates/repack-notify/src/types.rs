use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything a reminder message needs to say about one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderPayload {
    pub owner_name: String,
    pub device_name: String,
    pub serial_number: Option<String>,
    pub last_serviced: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub interval_months: u32,
}

/// A message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedMessage {
    pub subject: String,
    /// HTML body.
    pub html: String,
}

/// What a dispatcher did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// Handed to the mail relay.
    Delivered,
    /// Rendered but deliberately not sent. Nothing may be recorded as sent.
    DryRun,
}
