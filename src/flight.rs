// src/flight.rs

//! Per-key single-flight locks
//!
//! Callers working on the same key run one at a time; callers on
//! different keys never wait for each other. Combined with a re-check of
//! the cache after acquiring, this guarantees that an expensive load for a
//! key happens once while other keys proceed concurrently.
//!
//! Each slot counts its holder and waiters. The count is taken before
//! waiting and given back when the guard drops, including when a waiting
//! caller is cancelled, so a slot leaves the table as soon as nobody holds
//! or waits for its key.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
struct Slot {
    lock: Arc<AsyncMutex<()>>,
    users: usize,
}

/// Table of async locks keyed by `K`
pub(crate) struct KeyedFlight<K: Eq + Hash + Clone> {
    slots: Arc<DashMap<K, Slot>>,
}

impl<K: Eq + Hash + Clone> KeyedFlight<K> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
        }
    }

    /// Wait until no one else holds `key`, then hold it
    pub(crate) async fn acquire(&self, key: &K) -> FlightGuard<K> {
        let lock = {
            let mut slot = self.slots.entry(key.clone()).or_default();
            slot.users += 1;
            Arc::clone(&slot.lock)
        };

        // Registered before waiting so a cancelled wait still releases
        // its count.
        let mut flight = FlightGuard {
            key: key.clone(),
            guard: None,
            slots: Arc::clone(&self.slots),
        };
        flight.guard = Some(lock.lock_owned().await);
        flight
    }

    /// Keys currently held or waited on
    pub(crate) fn keys(&self) -> Vec<K> {
        self.slots.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of keys currently held or waited on
    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        self.slots.len()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedFlight<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Held (or awaited) lock on one key; released on drop
pub(crate) struct FlightGuard<K: Eq + Hash + Clone> {
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
    slots: Arc<DashMap<K, Slot>>,
}

impl<K: Eq + Hash + Clone> Drop for FlightGuard<K> {
    fn drop(&mut self) {
        self.guard.take();
        self.slots.remove_if_mut(&self.key, |_, slot| {
            slot.users -= 1;
            slot.users == 0
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_serialized() {
        let flight = Arc::new(KeyedFlight::<String>::new());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flight = Arc::clone(&flight);
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _guard = flight.acquire(&"billing".to_string()).await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let flight = KeyedFlight::<String>::new();
        let _billing = flight.acquire(&"billing".to_string()).await;

        let ledger = tokio::time::timeout(
            Duration::from_millis(100),
            flight.acquire(&"ledger".to_string()),
        )
        .await;
        assert!(ledger.is_ok());
        assert_eq!(flight.in_flight(), 2);

        drop(ledger);
        assert_eq!(flight.in_flight(), 1);
        assert_eq!(flight.keys(), vec!["billing".to_string()]);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_leaves_no_slot() {
        let flight = KeyedFlight::<String>::new();
        let holder = flight.acquire(&"billing".to_string()).await;

        let waiter = tokio::time::timeout(
            Duration::from_millis(20),
            flight.acquire(&"billing".to_string()),
        )
        .await;
        assert!(waiter.is_err());
        assert_eq!(flight.in_flight(), 1);

        drop(holder);
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_waiter_released_after_holder_is_cleaned_up() {
        let flight = Arc::new(KeyedFlight::<String>::new());
        let holder = flight.acquire(&"billing".to_string()).await;

        let waiter = {
            let flight = Arc::clone(&flight);
            tokio::spawn(async move {
                let _guard = flight.acquire(&"billing".to_string()).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(holder);
        waiter.await.unwrap();

        assert_eq!(flight.in_flight(), 0);
    }
}
