use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{NotificationSink, SinkError};
use podalert_types::{Alert, AlertOrigin};

/// Discord rejects embed descriptions longer than this (in characters)
pub const DISCORD_DESCRIPTION_LIMIT: usize = 4096;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A Discord webhook URL split into its id and token
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookUrl {
    pub id: u64,
    pub token: String,
    url: String,
}

impl WebhookUrl {
    /// Parse `https://discord.com/api/webhooks/<id>/<token>`, with or without
    /// a trailing slash
    pub fn parse(url: &str) -> Result<Self, SinkError> {
        let trimmed = url.trim().trim_end_matches('/');
        let mut segments = trimmed.rsplit('/');

        let token = segments
            .next()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SinkError::InvalidWebhook("missing token".to_string()))?;
        let id = segments
            .next()
            .and_then(|id| id.parse::<u64>().ok())
            .ok_or_else(|| SinkError::InvalidWebhook("missing or non-numeric id".to_string()))?;

        Ok(Self {
            id,
            token: token.to_string(),
            url: trimmed.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    embeds: [Embed<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Embed<'a> {
    title: &'a str,
    description: String,
    color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookInfo {
    #[serde(default)]
    name: Option<String>,
}

/// Delivers alerts as embeds through a Discord webhook
pub struct DiscordSink {
    client: reqwest::Client,
    webhook: WebhookUrl,
}

impl DiscordSink {
    pub fn new(webhook_url: &str) -> Result<Self, SinkError> {
        let webhook = WebhookUrl::parse(webhook_url)?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("podalert/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, webhook })
    }

    /// Create the sink and check that the webhook exists
    pub async fn connect(webhook_url: &str) -> Result<Self, SinkError> {
        let sink = Self::new(webhook_url)?;
        let name = sink.verify().await?;
        info!(
            webhook_id = sink.webhook.id,
            name = name.as_deref().unwrap_or("<unnamed>"),
            "Discord webhook initialized"
        );
        Ok(sink)
    }

    /// Fetch the webhook object, returning its display name
    pub async fn verify(&self) -> Result<Option<String>, SinkError> {
        let response = self.client.get(self.webhook.as_str()).send().await?;
        let response = check_status(response).await?;
        let info: WebhookInfo = response.json().await?;
        Ok(info.name)
    }

    pub fn webhook(&self) -> &WebhookUrl {
        &self.webhook
    }
}

#[async_trait]
impl NotificationSink for DiscordSink {
    async fn deliver(&self, alert: &Alert) -> Result<(), SinkError> {
        // A log alert without lines has nothing worth showing
        if alert.origin == AlertOrigin::Log && alert.context.is_empty() {
            debug!(service = %alert.service, "Skipping log alert without context");
            return Ok(());
        }

        let timestamp = match alert.origin {
            AlertOrigin::Log | AlertOrigin::Notice => Some(alert.timestamp.to_rfc3339()),
            AlertOrigin::PhaseChange(_) => None,
        };

        let payload = WebhookPayload {
            embeds: [Embed {
                title: &alert.service,
                description: truncate_chars(alert.render_body(), DISCORD_DESCRIPTION_LIMIT),
                color: alert.color(),
                timestamp,
            }],
        };

        let response = self
            .client
            .post(self.webhook.as_str())
            .json(&payload)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SinkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SinkError::Status {
        status: status.as_u16(),
        body,
    })
}

fn truncate_chars(mut text: String, limit: usize) -> String {
    if let Some((idx, _)) = text.char_indices().nth(limit) {
        text.truncate(idx);
    }
    text
}
