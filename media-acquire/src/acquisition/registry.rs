//! Single-flight registry of per-item supervision tasks.
//!
//! The registry is the one piece of state shared between supervision tasks.
//! An item id can be reserved by at most one holder at a time; the holder
//! receives a [`TaskLease`] carrying the item's cancellation token. The slot
//! is released when the lease is released or dropped, including when the
//! owning task panics.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

struct TaskSlot {
    generation: u64,
    token: CancellationToken,
    join: Option<JoinHandle<()>>,
}

/// Registry of reserved item ids.
#[derive(Default)]
pub struct TaskRegistry {
    slots: Mutex<HashMap<String, TaskSlot>>,
    next_generation: AtomicU64,
}

impl TaskRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reserve `item_id`. Returns `None` if another holder owns it.
    pub fn try_reserve(self: &Arc<Self>, item_id: &str) -> Option<TaskLease> {
        let mut slots = self.slots.lock();
        if slots.contains_key(item_id) {
            trace!(item_id, "Item already reserved");
            return None;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        slots.insert(
            item_id.to_string(),
            TaskSlot {
                generation,
                token: token.clone(),
                join: None,
            },
        );

        Some(TaskLease {
            registry: Arc::clone(self),
            item_id: item_id.to_string(),
            generation,
            token,
            released: false,
        })
    }

    /// Record the join handle of the task now owning `lease_generation`.
    ///
    /// If the task already finished and released its slot the handle is
    /// dropped.
    pub fn attach(&self, item_id: &str, lease_generation: u64, join: JoinHandle<()>) {
        let mut slots = self.slots.lock();
        match slots.get_mut(item_id) {
            Some(slot) if slot.generation == lease_generation => slot.join = Some(join),
            _ => debug!(item_id, "Task finished before its handle was attached"),
        }
    }

    /// Signal cancellation to the current holder of `item_id`.
    ///
    /// Returns `false` when nothing holds the id. Cancelling twice is a no-op.
    pub fn cancel(&self, item_id: &str) -> bool {
        match self.slots.lock().get(item_id) {
            Some(slot) => {
                slot.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, item_id: &str) -> bool {
        self.slots.lock().contains_key(item_id)
    }

    pub fn active_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.slots.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Take the join handle of `item_id`'s task, if one is attached.
    pub fn take_join(&self, item_id: &str) -> Option<JoinHandle<()>> {
        self.slots
            .lock()
            .get_mut(item_id)
            .and_then(|slot| slot.join.take())
    }

    fn release(&self, item_id: &str, generation: u64) {
        let mut slots = self.slots.lock();
        if slots
            .get(item_id)
            .is_some_and(|slot| slot.generation == generation)
        {
            slots.remove(item_id);
            trace!(item_id, generation, "Released item");
        }
    }
}

/// Exclusive hold on one item id.
pub struct TaskLease {
    registry: Arc<TaskRegistry>,
    item_id: String,
    generation: u64,
    token: CancellationToken,
    released: bool,
}

impl TaskLease {
    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Release the slot now.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.registry.release(&self.item_id, self.generation);
        }
    }
}

impl Drop for TaskLease {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl std::fmt::Debug for TaskLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskLease")
            .field("item_id", &self.item_id)
            .field("generation", &self.generation)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_flight() {
        let registry = TaskRegistry::new();

        let lease = registry.try_reserve("a").unwrap();
        assert!(registry.try_reserve("a").is_none());
        assert!(registry.try_reserve("b").is_some());
        assert!(registry.is_active("a"));

        lease.release();
        assert!(!registry.is_active("a"));
        assert!(registry.try_reserve("a").is_some());
    }

    #[test]
    fn test_drop_releases_slot() {
        let registry = TaskRegistry::new();
        {
            let _lease = registry.try_reserve("a").unwrap();
            assert_eq!(registry.active_ids(), vec!["a".to_string()]);
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cancel_is_idempotent_and_safe_without_holder() {
        let registry = TaskRegistry::new();
        assert!(!registry.cancel("missing"));
        assert!(!registry.cancel("missing"));

        let lease = registry.try_reserve("a").unwrap();
        assert!(registry.cancel("a"));
        assert!(registry.cancel("a"));
        assert!(lease.is_cancelled());
    }

    #[test]
    fn test_stale_lease_does_not_release_new_holder() {
        let registry = TaskRegistry::new();
        let mut first = registry.try_reserve("a").unwrap();
        first.release_inner();
        let second = registry.try_reserve("a").unwrap();

        // Releasing the old generation again must not free the new slot.
        registry.release("a", first.generation());
        assert!(registry.is_active("a"));
        assert_ne!(first.generation(), second.generation());
        drop(first);
        assert!(registry.is_active("a"));
    }

    #[tokio::test]
    async fn test_attach_and_take_join() {
        let registry = TaskRegistry::new();
        let lease = registry.try_reserve("a").unwrap();
        let generation = lease.generation();

        let handle = tokio::spawn(async move {
            let _lease = lease;
        });
        registry.attach("a", generation, handle);

        if let Some(join) = registry.take_join("a") {
            join.await.unwrap();
        }
        assert!(!registry.is_active("a"));
        assert!(registry.take_join("a").is_none());
    }
}
