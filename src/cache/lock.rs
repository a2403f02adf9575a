//! Per-Key Lock Module
//!
//! Serializes write-path operations on the same key while letting different
//! keys proceed in parallel.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockTable = DashMap<String, Arc<Mutex<()>>>;

// == Key Lock ==
/// Map from key to a reference-counted mutex.
///
/// A slot is created on first use and removed as soon as no holder or waiter
/// references it, so the table only ever contains keys with in-flight writes.
#[derive(Debug, Default, Clone)]
pub struct KeyLock {
    locks: Arc<LockTable>,
}

impl KeyLock {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `action` while holding the lock for `key`.
    ///
    /// The lock is released when `action` completes, whatever its outcome.
    pub async fn acquire<F, Fut, T>(&self, key: &str, action: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.lock(key).await;
        action().await
    }

    /// Waits for the lock on `key` and returns a guard that releases it on drop.
    pub async fn lock(&self, key: &str) -> KeyLockGuard {
        // Declared before the wait so a cancelled waiter still reclaims the slot.
        let slot = Slot {
            key: key.to_owned(),
            locks: Arc::clone(&self.locks),
        };

        let mutex = Arc::clone(self.locks.entry(key.to_owned()).or_default().value());
        let permit = mutex.lock_owned().await;

        KeyLockGuard {
            _permit: permit,
            _slot: slot,
        }
    }

    /// Number of keys that currently have a holder or waiter.
    pub fn tracked_keys(&self) -> usize {
        self.locks.len()
    }
}

// == Guard ==
/// Holds the lock for one key. Field order matters: the permit is released
/// before the slot tries to reclaim the table entry.
#[derive(Debug)]
pub struct KeyLockGuard {
    _permit: OwnedMutexGuard<()>,
    _slot: Slot,
}

#[derive(Debug)]
struct Slot {
    key: String,
    locks: Arc<LockTable>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        // The table's own Arc is the only one left once nobody holds or waits.
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
