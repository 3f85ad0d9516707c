//! Notification channels.
//!
//! - Discord webhooks
//! - Generic webhooks (HTTP POST/PUT)

mod discord;
mod webhook;

pub use discord::{DiscordChannel, DiscordConfig};
pub use webhook::{WebhookAuth, WebhookChannel, WebhookConfig, WebhookMethod};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::events::NotificationEvent;
use crate::Result;

/// Trait for notification channels.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Get the channel type name.
    fn channel_type(&self) -> &'static str;

    /// Check if the channel is enabled.
    fn is_enabled(&self) -> bool;

    /// Send a notification through this channel.
    async fn send(&self, event: &NotificationEvent) -> Result<()>;
}

/// Channel configuration wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChannelConfig {
    Discord(DiscordConfig),
    Webhook(WebhookConfig),
}

impl ChannelConfig {
    /// Get the channel type name.
    pub fn channel_type(&self) -> &'static str {
        match self {
            Self::Discord(_) => "discord",
            Self::Webhook(_) => "webhook",
        }
    }

    /// Check if the channel is enabled.
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Discord(c) => c.enabled,
            Self::Webhook(c) => c.enabled,
        }
    }

    /// Instantiate the channel on top of a shared HTTP client.
    pub fn build(&self, client: reqwest::Client) -> std::sync::Arc<dyn NotificationChannel> {
        match self {
            Self::Discord(c) => std::sync::Arc::new(DiscordChannel::new(c.clone(), client)),
            Self::Webhook(c) => std::sync::Arc::new(WebhookChannel::new(c.clone(), client)),
        }
    }
}
