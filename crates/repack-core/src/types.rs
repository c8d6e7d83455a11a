use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Primary key of an owner row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub i64);

impl OwnerId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for OwnerId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Primary key of a device row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub i64);

impl DeviceId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for DeviceId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// How often a device has to be repacked.
///
/// Only the three plans offered to owners exist; anything else is rejected
/// at construction so the rest of the system never sees an odd interval.
/// New devices default to a yearly plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum ReminderInterval {
    SixMonths,
    NineMonths,
    #[default]
    TwelveMonths,
}

impl ReminderInterval {
    pub fn months(self) -> u32 {
        match self {
            ReminderInterval::SixMonths => 6,
            ReminderInterval::NineMonths => 9,
            ReminderInterval::TwelveMonths => 12,
        }
    }
}

impl TryFrom<u32> for ReminderInterval {
    type Error = CoreError;

    fn try_from(months: u32) -> std::result::Result<Self, Self::Error> {
        match months {
            6 => Ok(ReminderInterval::SixMonths),
            9 => Ok(ReminderInterval::NineMonths),
            12 => Ok(ReminderInterval::TwelveMonths),
            other => Err(CoreError::InvalidInterval(other)),
        }
    }
}

impl From<ReminderInterval> for u32 {
    fn from(interval: ReminderInterval) -> Self {
        interval.months()
    }
}

impl fmt::Display for ReminderInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} months", self.months())
    }
}

/// Notification tier. Stage 2 is the escalation sent one month after the due date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStage {
    Stage1,
    Stage2,
}

impl ReminderStage {
    pub fn number(self) -> u8 {
        match self {
            ReminderStage::Stage1 => 1,
            ReminderStage::Stage2 => 2,
        }
    }
}

impl fmt::Display for ReminderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReminderStage::Stage1 => write!(f, "stage1"),
            ReminderStage::Stage2 => write!(f, "stage2"),
        }
    }
}

impl std::str::FromStr for ReminderStage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "stage1" | "1" => Ok(ReminderStage::Stage1),
            "stage2" | "2" => Ok(ReminderStage::Stage2),
            other => Err(format!("unknown reminder stage: {other}")),
        }
    }
}
