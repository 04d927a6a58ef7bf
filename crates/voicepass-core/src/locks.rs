//! Per-key async mutual exclusion.
//!
//! [`KeyedLocks`] hands out one async mutex per key on demand. Work on
//! different keys proceeds in parallel; work on the same key is serialized.
//! Slots are dropped from the map when the last holder or waiter releases
//! them, so the map only holds keys that are currently contended.
//!
//! Two instances are used: one guarding session ledger entries (held by the
//! scheduler across close/flush/settle) and one guarding profile
//! read-modify-write cycles. When both are needed the session lock is taken
//! first.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A map of lazily created async mutexes keyed by `K`.
#[derive(Debug)]
pub struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    /// An empty lock map.
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: K) -> KeyedGuard<'_, K> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(key.clone()).or_default())
        };
        let guard = slot.lock_owned().await;
        KeyedGuard {
            locks: self,
            key,
            guard: Some(guard),
        }
    }

    /// Number of keys with a live slot.
    pub fn active(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive access to one key. Released on drop.
#[derive(Debug)]
pub struct KeyedGuard<'a, K: Eq + Hash + Clone> {
    locks: &'a KeyedLocks<K>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Clone> Drop for KeyedGuard<'_, K> {
    fn drop(&mut self) {
        let mut slots = self
            .locks
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // One reference in the map and one in our guard means nobody is
        // waiting; new lockers are blocked on the map mutex we hold.
        if slots
            .get(&self.key)
            .is_some_and(|slot| Arc::strong_count(slot) == 2)
        {
            slots.remove(&self.key);
        }
        drop(self.guard.take());
    }
}
