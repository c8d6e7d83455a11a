use std::time::Duration;

use async_trait::async_trait;
use repack_core::config::WebhookConfig;
use repack_core::types::ReminderStage;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::dispatcher::Dispatcher;
use crate::error::{NotifyError, Result};
use crate::template::TemplateRenderer;
use crate::types::{Delivery, ReminderPayload, RenderedMessage};

/// Longest relay response body kept in a `Rejected` error.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Serialize)]
struct RelayRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<u8>,
}

/// Posts rendered reminders as JSON to an HTTP mail relay.
pub struct WebhookDispatcher {
    client: Client,
    url: String,
    token: Option<String>,
    from: String,
    sender_name: String,
    timeout_ms: u64,
    renderer: TemplateRenderer,
}

impl WebhookDispatcher {
    pub fn new(cfg: &WebhookConfig, sender_name: &str) -> Result<Self> {
        if cfg.url.trim().is_empty() {
            return Err(NotifyError::Config("notify.webhook.url is empty".into()));
        }
        if cfg.timeout_secs == 0 {
            return Err(NotifyError::Config(
                "notify.webhook.timeout_secs must be at least 1".into(),
            ));
        }
        let timeout = Duration::from_secs(cfg.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Config(e.to_string()))?;
        Ok(Self {
            client,
            url: cfg.url.clone(),
            token: cfg.token.clone(),
            from: format!("\"{}\" <{}>", sender_name, cfg.from),
            sender_name: sender_name.to_string(),
            timeout_ms: timeout.as_millis() as u64,
            renderer: TemplateRenderer::new()?,
        })
    }

    fn map_transport_error(&self, e: reqwest::Error) -> NotifyError {
        if e.is_timeout() {
            NotifyError::Timeout {
                ms: self.timeout_ms,
            }
        } else {
            NotifyError::SendFailed(e.to_string())
        }
    }

    async fn post(&self, address: &str, msg: &RenderedMessage, stage: Option<u8>) -> Result<Delivery> {
        let body = RelayRequest {
            from: &self.from,
            to: address,
            subject: &msg.subject,
            html: &msg.html,
            stage,
        };

        let mut req = self.client.post(&self.url).json(&body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.map_err(|e| self.map_transport_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let mut text = resp.text().await.unwrap_or_default();
            if text.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !text.is_char_boundary(cut) {
                    cut -= 1;
                }
                text.truncate(cut);
            }
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(Delivery::Delivered)
    }
}

fn checked_address(address: &str) -> Result<&str> {
    let address = address.trim();
    if address.is_empty() || !address.contains('@') {
        return Err(NotifyError::InvalidAddress(address.to_string()));
    }
    Ok(address)
}

#[async_trait]
impl Dispatcher for WebhookDispatcher {
    fn name(&self) -> &str {
        "webhook"
    }

    #[instrument(skip(self, payload), fields(device = %payload.device_name))]
    async fn send(
        &self,
        address: &str,
        stage: ReminderStage,
        payload: &ReminderPayload,
    ) -> Result<Delivery> {
        let address = checked_address(address)?;
        let msg = self.renderer.render(stage, payload)?;
        let delivery = self.post(address, &msg, Some(stage.number())).await?;
        debug!(to = %address, %stage, "relay accepted reminder");
        Ok(delivery)
    }

    #[instrument(skip(self))]
    async fn send_test(&self, address: &str) -> Result<Delivery> {
        let address = checked_address(address)?;
        let msg = self.renderer.render_test(&self.sender_name)?;
        let delivery = self.post(address, &msg, None).await?;
        debug!(to = %address, "relay accepted test message");
        Ok(delivery)
    }
}
