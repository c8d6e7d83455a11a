use std::sync::Arc;

use async_trait::async_trait;
use repack_core::config::{NotifyConfig, NotifyMode};
use repack_core::types::ReminderStage;

use crate::error::{NotifyError, Result};
use crate::log::LogDispatcher;
use crate::types::{Delivery, ReminderPayload};
use crate::webhook::WebhookDispatcher;

/// Delivers one reminder to one owner.
///
/// A failed delivery is returned as an error value; the scheduler treats
/// every error as transient and retries on its next run.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Stable lowercase identifier (e.g. `"webhook"`), used in logs.
    fn name(&self) -> &str;

    /// Render and deliver the reminder for `stage` to `address`.
    ///
    /// Only [`Delivery::Delivered`] allows the caller to record the reminder
    /// as sent.
    async fn send(
        &self,
        address: &str,
        stage: ReminderStage,
        payload: &ReminderPayload,
    ) -> Result<Delivery>;

    /// Send a fixed test message to check the delivery setup end to end.
    async fn send_test(&self, address: &str) -> Result<Delivery>;
}

/// Build the dispatcher selected by `[notify] mode`.
pub fn from_config(cfg: &NotifyConfig) -> Result<Arc<dyn Dispatcher>> {
    match cfg.mode {
        NotifyMode::Log => Ok(Arc::new(LogDispatcher::new(&cfg.sender_name)?)),
        NotifyMode::Webhook => {
            let hook = cfg.webhook.as_ref().ok_or_else(|| {
                NotifyError::Config("notify.mode = \"webhook\" needs a [notify.webhook] section".into())
            })?;
            Ok(Arc::new(WebhookDispatcher::new(hook, &cfg.sender_name)?))
        }
    }
}
