//! Generic JSON webhook channel.
//!
//! Posts a flat acquisition record per event. Receivers can subscribe to a
//! subset of event types through `events`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::NotificationChannel;
use crate::notification::events::{NotificationEvent, NotificationPriority};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WebhookMethod {
    #[default]
    Post,
    Put,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WebhookAuth {
    Bearer { token: String },
    Basic { username: String, password: String },
    Header { name: String, value: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub url: String,
    #[serde(default)]
    pub method: WebhookMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub auth: Option<WebhookAuth>,
    #[serde(default)]
    pub min_priority: NotificationPriority,
    /// Event types to forward, e.g. `download_completed`. Empty forwards all.
    #[serde(default)]
    pub events: Vec<String>,
}

/// Body posted for every event.
#[derive(Debug, Serialize)]
struct EventRecord<'a> {
    source: &'static str,
    event: &'static str,
    priority: NotificationPriority,
    item_id: &'a str,
    title: String,
    summary: String,
    details: BTreeMap<&'static str, String>,
    needs_attention: bool,
    occurred_at: DateTime<Utc>,
}

impl<'a> EventRecord<'a> {
    fn from_event(event: &'a NotificationEvent) -> Self {
        Self {
            source: "media-acquire",
            event: event.event_type(),
            priority: event.priority(),
            item_id: event.item_id(),
            title: event.title(),
            summary: event.description(),
            details: event.details().into_iter().collect(),
            needs_attention: event.needs_attention(),
            occurred_at: event.timestamp(),
        }
    }
}

pub struct WebhookChannel {
    config: WebhookConfig,
    client: Client,
}

impl WebhookChannel {
    pub fn new(config: WebhookConfig, client: Client) -> Self {
        Self { config, client }
    }

    fn wants(&self, event: &NotificationEvent) -> bool {
        event.priority() >= self.config.min_priority
            && (self.config.events.is_empty()
                || self.config.events.iter().any(|e| e == event.event_type()))
    }

    fn request(&self, record: &EventRecord<'_>) -> RequestBuilder {
        let mut request = match self.config.method {
            WebhookMethod::Post => self.client.post(&self.config.url),
            WebhookMethod::Put => self.client.put(&self.config.url),
        };
        for (name, value) in &self.config.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request = match &self.config.auth {
            Some(WebhookAuth::Bearer { token }) => request.bearer_auth(token),
            Some(WebhookAuth::Basic { username, password }) => {
                request.basic_auth(username, Some(password))
            }
            Some(WebhookAuth::Header { name, value }) => request.header(name.as_str(), value.as_str()),
            None => request,
        };
        request.json(record)
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn channel_type(&self) -> &'static str {
        "webhook"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.url.is_empty()
    }

    async fn send(&self, event: &NotificationEvent) -> Result<()> {
        if !self.is_enabled() || !self.wants(event) {
            return Ok(());
        }

        let record = EventRecord::from_event(event);
        let response = self.request(&record).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(%status, url = %self.config.url, item_id = record.item_id, "Webhook refused event");
            return Err(Error::Other(format!("webhook returned {}", status)));
        }

        debug!(item_id = record.item_id, event = record.event, "Webhook delivered");
        Ok(())
    }
}
