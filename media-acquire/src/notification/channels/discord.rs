//! Discord webhook channel.
//!
//! Each event becomes one embed whose fields carry the acquisition facts
//! (candidate, library path, failed attempts). Failures that need an operator
//! can ping a role or user through `mention`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::NotificationChannel;
use crate::notification::events::{NotificationEvent, NotificationPriority};
use crate::{Error, Result};

/// Rate-limited sends are attempted at most this many times.
const MAX_SEND_ATTEMPTS: u32 = 3;

/// Discord rejects embeds with longer field values.
const FIELD_VALUE_LIMIT: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub enabled: bool,
    pub webhook_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// Mention prepended to failures, e.g. `<@&role_id>`.
    #[serde(default)]
    pub mention: Option<String>,
    #[serde(default)]
    pub min_priority: NotificationPriority,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url: String::new(),
            username: Some("media-acquire".to_string()),
            avatar_url: None,
            mention: None,
            min_priority: NotificationPriority::Normal,
        }
    }
}

/// What one POST to the webhook amounted to.
#[derive(Debug, PartialEq)]
enum Delivery {
    Sent,
    RateLimited(Duration),
    Refused(StatusCode),
}

pub struct DiscordChannel {
    config: DiscordConfig,
    client: Client,
}

impl DiscordChannel {
    pub fn new(config: DiscordConfig, client: Client) -> Self {
        Self { config, client }
    }

    /// Embed colour by outcome.
    fn outcome_color(event: &NotificationEvent) -> u32 {
        match event {
            NotificationEvent::DownloadCompleted { .. } => 0x2ecc71,
            NotificationEvent::DownloadStarted { .. } => 0x3498db,
            NotificationEvent::TorrentsNotFound { .. } | NotificationEvent::DownloadAborted { .. } => {
                0x95a5a6
            }
            NotificationEvent::AcquisitionRejected { .. } => 0xf39c12,
            NotificationEvent::DownloadFailed { .. } | NotificationEvent::PublishFailed { .. } => {
                0xe74c3c
            }
        }
    }

    fn embed(event: &NotificationEvent) -> Value {
        let fields: Vec<Value> = event
            .details()
            .into_iter()
            .map(|(label, value)| {
                json!({
                    "name": field_name(label),
                    "value": truncate(&value, FIELD_VALUE_LIMIT),
                    "inline": label != "library_path" && label != "error",
                })
            })
            .collect();

        json!({
            "title": event.title(),
            "description": event.description(),
            "color": Self::outcome_color(event),
            "timestamp": event.timestamp().to_rfc3339(),
            "fields": fields,
            "footer": { "text": format!("{} · {}", event.item_id(), event.event_type()) },
        })
    }

    fn message(&self, event: &NotificationEvent) -> Value {
        let mut message = json!({
            "embeds": [Self::embed(event)],
            "allowed_mentions": { "parse": ["roles", "users"] },
        });
        if event.needs_attention()
            && let Some(mention) = &self.config.mention
        {
            message["content"] = json!(mention);
        }
        if let Some(username) = &self.config.username {
            message["username"] = json!(username);
        }
        if let Some(avatar_url) = &self.config.avatar_url {
            message["avatar_url"] = json!(avatar_url);
        }
        message
    }

    async fn post(&self, message: &Value) -> Result<Delivery> {
        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(message)
            .send()
            .await?;
        Ok(classify(&response))
    }
}

fn classify(response: &Response) -> Delivery {
    let status = response.status();
    if status.is_success() {
        Delivery::Sent
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        Delivery::RateLimited(retry_after(response.headers()).unwrap_or(Duration::from_secs(1)))
    } else {
        Delivery::Refused(status)
    }
}

/// Wait requested by Discord, from `Retry-After` or `X-RateLimit-Reset-After`.
fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    ["Retry-After", "X-RateLimit-Reset-After"]
        .iter()
        .filter_map(|name| headers.get(*name)?.to_str().ok()?.parse::<f64>().ok())
        .find(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

/// `library_path` -> `Library path`.
fn field_name(label: &str) -> String {
    let spaced = label.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn truncate(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let mut cut: String = value.chars().take(limit.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

#[async_trait]
impl NotificationChannel for DiscordChannel {
    fn channel_type(&self) -> &'static str {
        "discord"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.webhook_url.is_empty()
    }

    async fn send(&self, event: &NotificationEvent) -> Result<()> {
        if !self.is_enabled() || event.priority() < self.config.min_priority {
            return Ok(());
        }

        let message = self.message(event);
        for attempt in 1..=MAX_SEND_ATTEMPTS {
            match self.post(&message).await? {
                Delivery::Sent => {
                    debug!(item_id = %event.item_id(), event_type = event.event_type(), "Posted to Discord");
                    return Ok(());
                }
                Delivery::RateLimited(wait) if attempt < MAX_SEND_ATTEMPTS => {
                    debug!(?wait, attempt, "Discord rate limited");
                    tokio::time::sleep(wait).await;
                }
                Delivery::RateLimited(_) => break,
                Delivery::Refused(status) => {
                    warn!(%status, item_id = %event.item_id(), "Discord refused the message");
                    return Err(Error::Other(format!("Discord webhook returned {}", status)));
                }
            }
        }
        Err(Error::Other(format!(
            "Discord still rate limited after {} attempts",
            MAX_SEND_ATTEMPTS
        )))
    }
}
