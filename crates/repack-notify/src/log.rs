use async_trait::async_trait;
use repack_core::types::ReminderStage;
use tracing::info;

use crate::dispatcher::Dispatcher;
use crate::error::{NotifyError, Result};
use crate::template::TemplateRenderer;
use crate::types::{Delivery, ReminderPayload, RenderedMessage};

/// Dry-run dispatcher: renders the message and writes it to the log.
///
/// Every send reports [`Delivery::DryRun`], so nothing is recorded as sent
/// and real delivery still happens once a relay is configured.
pub struct LogDispatcher {
    sender_name: String,
    renderer: TemplateRenderer,
}

impl LogDispatcher {
    pub fn new(sender_name: &str) -> Result<Self> {
        Ok(Self {
            sender_name: sender_name.to_string(),
            renderer: TemplateRenderer::new()?,
        })
    }

    fn log(&self, address: &str, msg: &RenderedMessage) -> Result<Delivery> {
        if address.trim().is_empty() {
            return Err(NotifyError::InvalidAddress(address.to_string()));
        }
        info!(
            to = %address,
            from = %self.sender_name,
            subject = %msg.subject,
            bytes = msg.html.len(),
            "message rendered (log only, not delivered)"
        );
        Ok(Delivery::DryRun)
    }
}

#[async_trait]
impl Dispatcher for LogDispatcher {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(
        &self,
        address: &str,
        stage: ReminderStage,
        payload: &ReminderPayload,
    ) -> Result<Delivery> {
        let msg = self.renderer.render(stage, payload)?;
        self.log(address, &msg)
    }

    async fn send_test(&self, address: &str) -> Result<Delivery> {
        let msg = self.renderer.render_test(&self.sender_name)?;
        self.log(address, &msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn payload() -> ReminderPayload {
        ReminderPayload {
            owner_name: "Max".into(),
            device_name: "Rescue One".into(),
            serial_number: None,
            last_serviced: Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap(),
            due_date: Utc.with_ymd_and_hms(2024, 7, 15, 0, 0, 0).unwrap(),
            interval_months: 6,
        }
    }

    #[tokio::test]
    async fn reports_dry_run() {
        let d = LogDispatcher::new("Repack").unwrap();
        let delivery = d
            .send("max@example.com", ReminderStage::Stage1, &payload())
            .await
            .unwrap();
        assert_eq!(delivery, Delivery::DryRun);
        assert_eq!(d.send_test("max@example.com").await.unwrap(), Delivery::DryRun);
    }

    #[tokio::test]
    async fn empty_address_rejected() {
        let d = LogDispatcher::new("Repack").unwrap();
        let err = d
            .send("  ", ReminderStage::Stage2, &payload())
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::InvalidAddress(_)));
    }
}
