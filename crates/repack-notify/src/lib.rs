//! `repack-notify`: reminder message rendering and delivery.
//!
//! The scheduler only sees the [`Dispatcher`] trait. Two implementations
//! ship here:
//!
//! | Mode      | Type                  | Behaviour                                   |
//! |-----------|-----------------------|---------------------------------------------|
//! | `log`     | [`LogDispatcher`]     | Renders the message and logs it (dry run)   |
//! | `webhook` | [`WebhookDispatcher`] | POSTs the rendered message to a mail relay  |

pub mod dispatcher;
pub mod error;
pub mod log;
pub mod template;
pub mod types;
pub mod webhook;

pub use dispatcher::{from_config, Dispatcher};
pub use error::{NotifyError, Result};
pub use log::LogDispatcher;
pub use template::TemplateRenderer;
pub use types::{Delivery, ReminderPayload, RenderedMessage};
pub use webhook::WebhookDispatcher;
