//! Notification service implementation.
//!
//! The NotificationService is responsible for:
//! - Dispatching acquisition events to configured channels without blocking callers
//! - Retrying failed deliveries with exponential backoff
//! - Suppressing repeated notifications for the same terminal outcome of an item

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::channels::{ChannelConfig, NotificationChannel};
use super::events::NotificationEvent;

/// Fire-and-forget notification sink used by the acquisition core.
pub trait Notifier: Send + Sync {
    /// Queue `event` for delivery. Never blocks and never fails.
    fn dispatch(&self, event: NotificationEvent);
}

/// Configuration for the notification service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationServiceConfig {
    pub enabled: bool,
    /// Maximum retry attempts per channel and notification.
    pub max_retries: u32,
    pub initial_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub channels: Vec<ChannelConfig>,
}

impl Default for NotificationServiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            initial_retry_delay_ms: 5000,
            max_retry_delay_ms: 60000,
            channels: Vec::new(),
        }
    }
}

/// Delivery counters.
#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    failed: AtomicU64,
    suppressed: AtomicU64,
}

/// Snapshot of delivery counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NotificationStats {
    pub channel_count: usize,
    pub delivered: u64,
    pub failed: u64,
    pub suppressed: u64,
}

/// The notification service.
pub struct NotificationService {
    config: NotificationServiceConfig,
    channels: RwLock<Vec<Arc<dyn NotificationChannel>>>,
    /// Last terminal event type delivered per item.
    last_terminal: DashMap<String, &'static str>,
    counters: Arc<Counters>,
    event_tx: broadcast::Sender<NotificationEvent>,
}

impl NotificationService {
    /// Create a service with channels built from `config`.
    pub fn with_config(config: NotificationServiceConfig, client: reqwest::Client) -> Self {
        let (event_tx, _) = broadcast::channel(256);

        let channels: Vec<Arc<dyn NotificationChannel>> = config
            .channels
            .iter()
            .filter(|c| c.is_enabled())
            .map(|c| {
                info!("Initialized notification channel: {}", c.channel_type());
                c.build(client.clone())
            })
            .collect();

        info!(
            "Notification service initialized with {} channels",
            channels.len()
        );

        Self {
            config,
            channels: RwLock::new(channels),
            last_terminal: DashMap::new(),
            counters: Arc::new(Counters::default()),
            event_tx,
        }
    }

    /// A service with no channels. Events are still broadcast to subscribers.
    pub fn disabled() -> Self {
        Self::with_config(
            NotificationServiceConfig {
                enabled: false,
                ..Default::default()
            },
            reqwest::Client::new(),
        )
    }

    /// Add a channel dynamically.
    pub fn add_channel(&self, channel: Arc<dyn NotificationChannel>) {
        self.channels.write().push(channel);
    }

    /// Subscribe to every event accepted for delivery.
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.event_tx.subscribe()
    }

    pub fn stats(&self) -> NotificationStats {
        NotificationStats {
            channel_count: self.channels.read().len(),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            suppressed: self.counters.suppressed.load(Ordering::Relaxed),
        }
    }

    /// Decide whether `event` should go out, updating the dedup record.
    ///
    /// A terminal event identical to the last terminal event of the same item
    /// is suppressed. `DownloadStarted` opens a new acquisition and resets the
    /// record.
    fn accept(&self, event: &NotificationEvent) -> bool {
        if matches!(event, NotificationEvent::DownloadStarted { .. }) {
            self.last_terminal.remove(event.item_id());
            return true;
        }
        if !event.is_terminal() {
            return true;
        }

        let event_type = event.event_type();
        let previous = self
            .last_terminal
            .insert(event.item_id().to_string(), event_type);
        if previous == Some(event_type) {
            self.counters.suppressed.fetch_add(1, Ordering::Relaxed);
            debug!(
                item_id = %event.item_id(),
                event_type,
                "Suppressing repeated terminal notification"
            );
            return false;
        }
        true
    }

    /// Deliver `event` to all channels and wait for the outcome.
    pub async fn notify(&self, event: NotificationEvent) {
        if !self.accept(&event) {
            return;
        }
        let _ = self.event_tx.send(event.clone());

        if !self.config.enabled {
            return;
        }
        let channels = self.channels.read().clone();
        Self::deliver_detached(event, channels, self.config.clone(), self.counters.clone()).await;
    }

    async fn deliver_detached(
        event: NotificationEvent,
        channels: Vec<Arc<dyn NotificationChannel>>,
        config: NotificationServiceConfig,
        counters: Arc<Counters>,
    ) {
        let deliveries = channels.into_iter().map(|channel| {
            let event = &event;
            let config = &config;
            let counters = &counters;
            async move {
                let mut attempts = 0;
                loop {
                    match channel.send(event).await {
                        Ok(()) => {
                            counters.delivered.fetch_add(1, Ordering::Relaxed);
                            return;
                        }
                        Err(e) if attempts < config.max_retries => {
                            let delay = calculate_retry_delay(config, attempts);
                            debug!(
                                channel = channel.channel_type(),
                                error = %e,
                                "Notification delivery failed, retrying in {:?}",
                                delay
                            );
                            attempts += 1;
                            tokio::time::sleep(delay).await;
                        }
                        Err(e) => {
                            counters.failed.fetch_add(1, Ordering::Relaxed);
                            warn!(
                                channel = channel.channel_type(),
                                event_type = event.event_type(),
                                error = %e,
                                "Notification delivery failed after {} attempts",
                                attempts + 1
                            );
                            return;
                        }
                    }
                }
            }
        });
        futures::future::join_all(deliveries).await;
    }
}

impl Notifier for NotificationService {
    fn dispatch(&self, event: NotificationEvent) {
        if !self.accept(&event) {
            return;
        }
        let _ = self.event_tx.send(event.clone());

        if !self.config.enabled {
            return;
        }
        let channels = self.channels.read().clone();
        if channels.is_empty() {
            return;
        }
        let config = self.config.clone();
        let counters = self.counters.clone();
        tokio::spawn(async move {
            Self::deliver_detached(event, channels, config, counters).await;
        });
    }
}

/// Calculate retry delay with exponential backoff and jitter (±25%).
fn calculate_retry_delay(config: &NotificationServiceConfig, attempts: u32) -> Duration {
    let delay_ms = config
        .initial_retry_delay_ms
        .saturating_mul(2u64.saturating_pow(attempts))
        .min(config.max_retry_delay_ms);

    let jitter_range = delay_ms / 4;
    let delay_ms = if jitter_range > 0 {
        let offset = rand::random::<u64>() % (jitter_range * 2);
        delay_ms - jitter_range + offset
    } else {
        delay_ms
    };

    Duration::from_millis(delay_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;
    use chrono::Utc;
    use std::sync::atomic::AtomicU32;

    struct TestChannel {
        fail_for_attempts: u32,
        attempts: Arc<AtomicU32>,
    }

    #[async_trait::async_trait]
    impl NotificationChannel for TestChannel {
        fn channel_type(&self) -> &'static str {
            "test"
        }

        fn is_enabled(&self) -> bool {
            true
        }

        async fn send(&self, _event: &NotificationEvent) -> Result<()> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.fail_for_attempts {
                Err(crate::Error::Other(format!("forced failure {}", attempt)))
            } else {
                Ok(())
            }
        }
    }

    fn fast_config() -> NotificationServiceConfig {
        NotificationServiceConfig {
            enabled: true,
            max_retries: 2,
            initial_retry_delay_ms: 1,
            max_retry_delay_ms: 5,
            channels: Vec::new(),
        }
    }

    fn failed(item_id: &str) -> NotificationEvent {
        NotificationEvent::DownloadFailed {
            item_id: item_id.to_string(),
            title: item_id.to_string(),
            failed_attempts: 2,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_calculate_retry_delay() {
        let config = NotificationServiceConfig {
            initial_retry_delay_ms: 1000,
            max_retry_delay_ms: 60000,
            ..Default::default()
        };

        let delay1 = calculate_retry_delay(&config, 0);
        let delay2 = calculate_retry_delay(&config, 1);
        let capped = calculate_retry_delay(&config, 20);

        assert!(delay1.as_millis() >= 750 && delay1.as_millis() <= 1250);
        assert!(delay2.as_millis() >= 1500 && delay2.as_millis() <= 2500);
        assert!(capped.as_millis() <= 75000);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let service = NotificationService::with_config(fast_config(), reqwest::Client::new());
        let attempts = Arc::new(AtomicU32::new(0));
        service.add_channel(Arc::new(TestChannel {
            fail_for_attempts: 1,
            attempts: attempts.clone(),
        }));

        service.notify(failed("ep-1")).await;

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        let stats = service.stats();
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let service = NotificationService::with_config(fast_config(), reqwest::Client::new());
        let attempts = Arc::new(AtomicU32::new(0));
        service.add_channel(Arc::new(TestChannel {
            fail_for_attempts: u32::MAX,
            attempts: attempts.clone(),
        }));

        service.notify(failed("ep-1")).await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(service.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_repeated_terminal_event_is_suppressed() {
        let service = NotificationService::with_config(fast_config(), reqwest::Client::new());
        let attempts = Arc::new(AtomicU32::new(0));
        service.add_channel(Arc::new(TestChannel {
            fail_for_attempts: 0,
            attempts: attempts.clone(),
        }));

        service.notify(failed("ep-1")).await;
        service.notify(failed("ep-1")).await;
        service.notify(failed("ep-2")).await;

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(service.stats().suppressed, 1);

        // A new acquisition resets the record
        service
            .notify(NotificationEvent::DownloadStarted {
                item_id: "ep-1".into(),
                title: "ep-1".into(),
                candidate_count: 1,
                timestamp: Utc::now(),
            })
            .await;
        service.notify(failed("ep-1")).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_disabled_service_still_broadcasts() {
        let service = NotificationService::disabled();
        let mut rx = service.subscribe();

        service.dispatch(failed("ep-1"));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.item_id(), "ep-1");
        assert_eq!(service.stats().delivered, 0);
    }
}
