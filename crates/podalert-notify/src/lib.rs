//! Notification sinks for podalert
//!
//! A sink receives finished alerts and delivers them somewhere a human will
//! see them. Delivery failures are reported to the caller, which only logs
//! them; sinks never retry.

mod discord;
mod tracing_sink;

use async_trait::async_trait;
use thiserror::Error;

pub use discord::{DISCORD_DESCRIPTION_LIMIT, DiscordSink, WebhookUrl};
pub use tracing_sink::TracingSink;

// Re-export types used in our public API
pub use podalert_types::Alert;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("invalid webhook URL: {0}")]
    InvalidWebhook(String),

    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("webhook returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// Receives alerts and delivers them
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, alert: &Alert) -> Result<(), SinkError>;
}
