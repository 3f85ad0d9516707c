//! Notification system module.
//!
//! Delivers acquisition events through Discord and generic webhooks with
//! priority filtering, retry with exponential backoff, and per-item
//! suppression of repeated terminal outcomes.
//!
//! # Example
//!
//! ```ignore
//! use media_acquire::notification::{NotificationService, NotificationServiceConfig};
//! use media_acquire::notification::channels::{ChannelConfig, DiscordConfig};
//!
//! let config = NotificationServiceConfig {
//!     channels: vec![ChannelConfig::Discord(DiscordConfig {
//!         enabled: true,
//!         webhook_url: "https://discord.com/api/webhooks/...".to_string(),
//!         ..Default::default()
//!     })],
//!     ..Default::default()
//! };
//!
//! let service = NotificationService::with_config(config, reqwest::Client::new());
//! ```

pub mod channels;
pub mod events;
pub mod service;

pub use channels::{ChannelConfig, DiscordConfig, NotificationChannel, WebhookConfig};
pub use events::{NotificationEvent, NotificationPriority};
pub use service::{NotificationService, NotificationServiceConfig, NotificationStats, Notifier};
