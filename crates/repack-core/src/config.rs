use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, Result};

pub const DEFAULT_DAILY_HOUR: u8 = 9;
pub const DEFAULT_DAILY_MINUTE: u8 = 0;
pub const DEFAULT_MAX_CONCURRENT_DELIVERIES: usize = 4;
pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_SENDER_NAME: &str = "Repack Reminder";

/// Top-level config (repack.toml + REPACK_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepackConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// What to do with a tick that arrives while a batch is still running.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Reject the overlapping tick; the next scheduled tick picks up the work.
    #[default]
    Skip,
    /// Wait for the running batch, then run.
    Queue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Hour (UTC) of the daily run.
    #[serde(default = "default_daily_hour")]
    pub daily_at_hour: u8,
    #[serde(default = "default_daily_minute")]
    pub daily_at_minute: u8,
    #[serde(default)]
    pub overlap: OverlapPolicy,
    /// Upper bound on devices processed concurrently within one batch.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_deliveries: usize,
    /// Run one catch-up batch immediately when the daemon starts.
    #[serde(default = "bool_true")]
    pub run_on_startup: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            daily_at_hour: DEFAULT_DAILY_HOUR,
            daily_at_minute: DEFAULT_DAILY_MINUTE,
            overlap: OverlapPolicy::default(),
            max_concurrent_deliveries: DEFAULT_MAX_CONCURRENT_DELIVERIES,
            run_on_startup: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotifyMode {
    /// Render and log messages without delivering them.
    #[default]
    Log,
    /// POST rendered messages to an HTTP mail relay.
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub mode: NotifyMode,
    /// Display name used in the From header.
    #[serde(default = "default_sender_name")]
    pub sender_name: String,
    pub webhook: Option<WebhookConfig>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            mode: NotifyMode::default(),
            sender_name: default_sender_name(),
            webhook: None,
        }
    }
}

/// HTTP mail relay endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    /// Sent as `Authorization: Bearer <token>` when set.
    pub token: Option<String>,
    /// Sender address.
    pub from: String,
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
}

fn bool_true() -> bool {
    true
}
fn default_daily_hour() -> u8 {
    DEFAULT_DAILY_HOUR
}
fn default_daily_minute() -> u8 {
    DEFAULT_DAILY_MINUTE
}
fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT_DELIVERIES
}
fn default_webhook_timeout() -> u64 {
    DEFAULT_WEBHOOK_TIMEOUT_SECS
}
fn default_sender_name() -> String {
    DEFAULT_SENDER_NAME.to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.repack/repack.db", home)
}

impl RepackConfig {
    /// Load config from a TOML file with REPACK_* env var overrides.
    ///
    /// The file is `config_path` if given, else `~/.repack/repack.toml`.
    /// A missing file is not an error; every field has a default.
    /// Nested keys use a double underscore: `REPACK_SCHEDULER__DAILY_AT_HOUR=7`.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        debug!(%path, "loading config");

        Self::from_figment(
            Figment::new()
                .merge(Toml::file(&path))
                .merge(Env::prefixed("REPACK_").split("__")),
        )
    }

    /// Extract and validate from an already assembled figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: RepackConfig = figment
            .extract()
            .map_err(|e| CoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let s = &self.scheduler;
        if s.daily_at_hour > 23 || s.daily_at_minute > 59 {
            return Err(CoreError::Config(format!(
                "scheduler time {:02}:{:02} is not a valid time of day",
                s.daily_at_hour, s.daily_at_minute
            )));
        }
        if s.max_concurrent_deliveries == 0 {
            return Err(CoreError::Config(
                "scheduler.max_concurrent_deliveries must be at least 1".to_string(),
            ));
        }
        if self.notify.mode == NotifyMode::Webhook && self.notify.webhook.is_none() {
            return Err(CoreError::Config(
                "notify.mode = \"webhook\" requires a [notify.webhook] section".to_string(),
            ));
        }
        if let Some(hook) = &self.notify.webhook {
            if hook.timeout_secs == 0 {
                return Err(CoreError::Config(
                    "notify.webhook.timeout_secs must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.repack/repack.toml", home)
}
