use minijinja::Environment;
use repack_core::types::ReminderStage;
use serde::Serialize;

use crate::error::Result;
use crate::types::{ReminderPayload, RenderedMessage};

const DATE_FORMAT: &str = "%d.%m.%Y";

const STAGE1_SUBJECT: &str = "Reminder: {{ device_name }} is due for repacking";
const STAGE2_SUBJECT: &str = "SECOND reminder: {{ device_name }} is overdue";

// Names ending in .html get minijinja's HTML auto-escaping.
const BODY: &str = r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h2>Hello {{ owner_name }},</h2>
{% if second %}
  <p style="color: #dc2626; font-weight: bold;">This is the second reminder. Your rescue device has been overdue for a month.</p>
{% else %}
  <p>It is time to inspect and repack your rescue device.</p>
{% endif %}
  <table>
    <tr><td><b>Device</b></td><td>{{ device_name }}{% if serial_number %} ({{ serial_number }}){% endif %}</td></tr>
    <tr><td><b>Last packed</b></td><td>{{ last_serviced }}</td></tr>
    <tr><td><b>Due by</b></td><td>{{ due_date }}</td></tr>
  </table>
  <ul>
    <li>All components complete and working?</li>
    <li>Expiry dates checked?</li>
    <li>Device packed properly and accessible?</li>
  </ul>
  <p style="color: #9ca3af; font-size: 12px;">
{% if second %}
    This is the second and final automatic reminder for this packing cycle.
{% else %}
    This reminder is sent every <strong>{{ interval_months }} months</strong>.
    If the device is not repacked within a month you will receive one more reminder.
{% endif %}
  </p>
</div>
"#;

const TEST_SUBJECT: &str = "Test message: reminder delivery";

const TEST_BODY: &str = r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h2>Delivery works</h2>
  <p>If you are reading this, {{ sender_name }} can send repack reminders to this address.</p>
</div>
"#;

#[derive(Serialize)]
struct TemplateContext<'a> {
    owner_name: &'a str,
    device_name: &'a str,
    serial_number: Option<&'a str>,
    last_serviced: String,
    due_date: String,
    interval_months: u32,
    second: bool,
}

/// Renders stage 1 and stage 2 reminder messages.
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl TemplateRenderer {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("stage1_subject.txt", STAGE1_SUBJECT)?;
        env.add_template("stage2_subject.txt", STAGE2_SUBJECT)?;
        env.add_template("body.html", BODY)?;
        env.add_template("test.html", TEST_BODY)?;
        Ok(Self { env })
    }

    pub fn render(&self, stage: ReminderStage, payload: &ReminderPayload) -> Result<RenderedMessage> {
        let ctx = TemplateContext {
            owner_name: &payload.owner_name,
            device_name: &payload.device_name,
            serial_number: payload.serial_number.as_deref(),
            last_serviced: payload.last_serviced.format(DATE_FORMAT).to_string(),
            due_date: payload.due_date.format(DATE_FORMAT).to_string(),
            interval_months: payload.interval_months,
            second: stage == ReminderStage::Stage2,
        };
        let subject_name = match stage {
            ReminderStage::Stage1 => "stage1_subject.txt",
            ReminderStage::Stage2 => "stage2_subject.txt",
        };
        let subject = self.env.get_template(subject_name)?.render(&ctx)?;
        let html = self.env.get_template("body.html")?.render(&ctx)?;
        Ok(RenderedMessage {
            subject: subject.trim().to_string(),
            html,
        })
    }

    /// The delivery check message.
    pub fn render_test(&self, sender_name: &str) -> Result<RenderedMessage> {
        let html = self
            .env
            .get_template("test.html")?
            .render(minijinja::context! { sender_name })?;
        Ok(RenderedMessage {
            subject: TEST_SUBJECT.to_string(),
            html,
        })
    }
}
