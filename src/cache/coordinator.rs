//! Cache Coordinator Module
//!
//! Single entry point reconciling the in-memory index with the durability
//! engine. Reads go straight to the index; writes take the key's lock,
//! persist, and only then touch the index.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheIndex, CacheStats, KeyLock, StatsCounters};
use crate::durability::DurabilityEngine;
use crate::error::{CacheError, Result};

// == Cache Coordinator ==
/// Write-through cache over a [`DurabilityEngine`].
///
/// Cloning is cheap; every clone shares the same index, locks and engine.
#[derive(Clone)]
pub struct CacheCoordinator {
    index: Arc<CacheIndex>,
    locks: KeyLock,
    engine: Arc<dyn DurabilityEngine>,
    stats: Arc<StatsCounters>,
}

impl CacheCoordinator {
    // == Constructors ==
    /// Loads every persisted entry from `engine` and builds the index.
    ///
    /// Must complete before the server accepts traffic. A failed load is a
    /// startup failure.
    pub async fn load(engine: Arc<dyn DurabilityEngine>) -> Result<Self> {
        let entries = engine.load_all().await.map_err(|error| {
            CacheError::Startup(format!(
                "failed to load entries from '{}' engine: {}",
                engine.name(),
                error
            ))
        })?;

        info!(
            "Loaded {} entries from '{}' engine",
            entries.len(),
            engine.name()
        );
        Ok(Self::with_index(engine, CacheIndex::from_entries(entries)))
    }

    /// Creates a coordinator over an already-built index.
    pub fn with_index(engine: Arc<dyn DurabilityEngine>, index: CacheIndex) -> Self {
        Self {
            index: Arc::new(index),
            locks: KeyLock::new(),
            engine,
            stats: Arc::new(StatsCounters::new()),
        }
    }

    // == Get ==
    /// Returns the value for `key`.
    ///
    /// Never suspends. An expired entry reads as [`CacheError::NotFound`] and
    /// its removal is scheduled in the background; that removal's outcome is
    /// never reported here.
    pub fn get_value(&self, key: &str) -> Result<String> {
        match self.index.get(key) {
            None => {
                self.stats.record_miss();
                Err(CacheError::NotFound(key.to_string()))
            }
            Some(entry) if entry.is_expired() => {
                self.stats.record_expired();
                self.schedule_purge(key);
                Err(CacheError::NotFound(key.to_string()))
            }
            Some(entry) => {
                self.stats.record_hit();
                Ok(entry.value)
            }
        }
    }

    // == Set ==
    /// Persists `entry`, then publishes it to the index.
    ///
    /// If the engine fails, the error is returned and the index is untouched.
    /// The write runs on its own task, so dropping the returned future does
    /// not stop it between the engine and the index.
    pub async fn set_value(&self, entry: CacheEntry) -> Result<()> {
        let coordinator = self.clone();
        run_to_completion(async move { coordinator.write_entry(entry).await }).await
    }

    async fn write_entry(&self, entry: CacheEntry) -> Result<()> {
        let key = entry.key.clone();

        self.locks
            .acquire(&key, move || async move {
                self.engine.upsert(&entry).await?;

                let (key, value) = entry.into_parts();
                debug!("Set key '{}' (expiry: {:?})", key, value.expiry);
                self.index.put(key, value.value, value.expiry);
                Ok::<_, CacheError>(())
            })
            .await
    }

    // == Delete ==
    /// Removes `key` from the engine, then from the index. Idempotent.
    ///
    /// If the engine fails, the error is returned and the index is untouched.
    /// Like [`set_value`](Self::set_value), it completes even if the caller
    /// stops waiting.
    pub async fn delete_value(&self, key: &str) -> Result<()> {
        let coordinator = self.clone();
        let key = key.to_owned();
        run_to_completion(async move { coordinator.remove_entry(&key).await }).await
    }

    async fn remove_entry(&self, key: &str) -> Result<()> {
        self.locks
            .acquire(key, || async {
                self.engine.remove(key).await?;

                self.index.remove(key);
                debug!("Deleted key '{}'", key);
                Ok::<_, CacheError>(())
            })
            .await
    }

    // == Purge Expired ==
    /// Deletes `key` if, under its lock, the index still holds an expired entry.
    ///
    /// Returns whether anything was removed. A `set` that replaced the entry
    /// with a fresh one after it was observed expired is left alone.
    pub async fn purge_expired(&self, key: &str) -> Result<bool> {
        let coordinator = self.clone();
        let key = key.to_owned();
        run_to_completion(async move { coordinator.purge_entry(&key).await }).await
    }

    async fn purge_entry(&self, key: &str) -> Result<bool> {
        self.locks
            .acquire(key, || async {
                match self.index.get(key) {
                    Some(entry) if entry.is_expired() => {
                        self.engine.remove(key).await?;
                        self.index.remove(key);
                        Ok::<_, CacheError>(true)
                    }
                    _ => Ok(false),
                }
            })
            .await
    }

    /// Spawns a best-effort purge of `key`. Failures only reach the logs.
    fn schedule_purge(&self, key: &str) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No async runtime available, leaving expired key '{}' in place", key);
            return;
        };

        let coordinator = self.clone();
        let key = key.to_owned();
        runtime.spawn(async move {
            match coordinator.purge_entry(&key).await {
                Ok(true) => debug!("Purged expired key '{}'", key),
                Ok(false) => debug!("Expired key '{}' already replaced or removed", key),
                Err(error) => warn!("Failed to purge expired key '{}': {}", key, error),
            }
        });
    }

    // == Accessors ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.index.len())
    }

    /// The in-memory index. Read-only access for diagnostics and tests.
    pub fn index(&self) -> &CacheIndex {
        &self.index
    }

    /// Name of the backing engine.
    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Number of keys with a lock holder or waiter, including background purges.
    pub fn pending_writes(&self) -> usize {
        self.locks.tracked_keys()
    }
}

/// Drives a lock-engine-index sequence on a spawned task and waits for it.
///
/// Dropping the caller's future detaches the task instead of cancelling it.
async fn run_to_completion<T, F>(task: F) -> Result<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(task)
        .await
        .map_err(|error| CacheError::Internal(format!("write task failed: {}", error)))?
}

impl std::fmt::Debug for CacheCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("engine", &self.engine.name())
            .field("entries", &self.index.len())
            .finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::durability::{DurabilityError, MemoryEngine};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use crate::cache::EntryValue;

    /// Wraps a memory engine and fails writes while `failing` is set.
    #[derive(Default)]
    struct FlakyEngine {
        inner: MemoryEngine,
        failing: AtomicBool,
    }

    impl FlakyEngine {
        fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        fn check(&self) -> std::result::Result<(), DurabilityError> {
            if self.failing.load(Ordering::SeqCst) {
                Err(DurabilityError::Unavailable("injected failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl DurabilityEngine for FlakyEngine {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn load_all(
            &self,
        ) -> std::result::Result<HashMap<String, EntryValue>, DurabilityError> {
            self.check()?;
            self.inner.load_all().await
        }

        async fn upsert(&self, entry: &CacheEntry) -> std::result::Result<(), DurabilityError> {
            self.check()?;
            self.inner.upsert(entry).await
        }

        async fn remove(&self, key: &str) -> std::result::Result<(), DurabilityError> {
            self.check()?;
            self.inner.remove(key).await
        }
    }

    /// Commits to a memory engine, then stalls before acknowledging.
    #[derive(Default)]
    struct SlowAckEngine {
        inner: MemoryEngine,
    }

    #[async_trait]
    impl DurabilityEngine for SlowAckEngine {
        fn name(&self) -> &'static str {
            "slow-ack"
        }

        async fn load_all(
            &self,
        ) -> std::result::Result<HashMap<String, EntryValue>, DurabilityError> {
            self.inner.load_all().await
        }

        async fn upsert(&self, entry: &CacheEntry) -> std::result::Result<(), DurabilityError> {
            self.inner.upsert(entry).await?;
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        }

        async fn remove(&self, key: &str) -> std::result::Result<(), DurabilityError> {
            self.inner.remove(key).await?;
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        }
    }

    /// Panics on every write.
    struct PanickingEngine;

    #[async_trait]
    impl DurabilityEngine for PanickingEngine {
        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn load_all(
            &self,
        ) -> std::result::Result<HashMap<String, EntryValue>, DurabilityError> {
            Ok(HashMap::new())
        }

        async fn upsert(&self, _entry: &CacheEntry) -> std::result::Result<(), DurabilityError> {
            panic!("engine blew up");
        }

        async fn remove(&self, _key: &str) -> std::result::Result<(), DurabilityError> {
            panic!("engine blew up");
        }
    }

    async fn wait_for_idle(coordinator: &CacheCoordinator) {
        for _ in 0..100 {
            if coordinator.pending_writes() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("writes did not settle");
    }

    fn stored_and_indexed(
        coordinator: &CacheCoordinator,
        engine: &SlowAckEngine,
        key: &str,
    ) -> (Option<String>, Option<String>) {
        (
            engine.inner.get(key).map(|entry| entry.value),
            coordinator.index().get(key).map(|entry| entry.value),
        )
    }

    async fn memory_coordinator() -> (CacheCoordinator, Arc<MemoryEngine>) {
        let engine = Arc::new(MemoryEngine::new());
        let coordinator = CacheCoordinator::load(engine.clone()).await.unwrap();
        (coordinator, engine)
    }

    #[tokio::test]
    async fn test_get_unset_key_is_not_found() {
        let (coordinator, _) = memory_coordinator().await;
        assert!(matches!(
            coordinator.get_value("missing"),
            Err(CacheError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (coordinator, engine) = memory_coordinator().await;

        coordinator
            .set_value(CacheEntry::new("k", "v", None))
            .await
            .unwrap();

        assert_eq!(coordinator.get_value("k").unwrap(), "v");
        assert_eq!(engine.get("k"), Some(EntryValue::new("v", None)));
        assert_eq!(coordinator.pending_writes(), 0);
    }

    #[tokio::test]
    async fn test_set_with_past_expiry_reads_as_not_found() {
        let (coordinator, _) = memory_coordinator().await;
        let past = Utc::now() - ChronoDuration::seconds(10);

        coordinator
            .set_value(CacheEntry::new("k", "v", Some(past)))
            .await
            .unwrap();

        assert!(matches!(
            coordinator.get_value("k"),
            Err(CacheError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (coordinator, engine) = memory_coordinator().await;
        coordinator
            .set_value(CacheEntry::new("k", "v", None))
            .await
            .unwrap();

        coordinator.delete_value("k").await.unwrap();
        assert!(matches!(
            coordinator.get_value("k"),
            Err(CacheError::NotFound(_))
        ));
        assert!(!engine.contains("k"));

        coordinator.delete_value("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_load_populates_index() {
        let engine = Arc::new(MemoryEngine::with_entries(vec![
            CacheEntry::new("a", "1", None),
            CacheEntry::new("b", "2", None),
        ]));
        let coordinator = CacheCoordinator::load(engine).await.unwrap();

        assert_eq!(coordinator.get_value("a").unwrap(), "1");
        assert_eq!(coordinator.get_value("b").unwrap(), "2");
        assert_eq!(coordinator.stats().total_entries, 2);
    }

    #[tokio::test]
    async fn test_failed_load_is_startup_failure() {
        let engine = Arc::new(FlakyEngine::default());
        engine.set_failing(true);

        let result = CacheCoordinator::load(engine).await;
        assert!(matches!(result, Err(CacheError::Startup(_))));
    }

    #[tokio::test]
    async fn test_failed_upsert_leaves_index_untouched() {
        let engine = Arc::new(FlakyEngine::default());
        let coordinator = CacheCoordinator::load(engine.clone()).await.unwrap();
        coordinator
            .set_value(CacheEntry::new("k", "old", None))
            .await
            .unwrap();

        engine.set_failing(true);
        let result = coordinator
            .set_value(CacheEntry::new("k", "new", None))
            .await;

        assert!(matches!(result, Err(CacheError::Durability(_))));
        assert_eq!(coordinator.get_value("k").unwrap(), "old");
        assert_eq!(coordinator.pending_writes(), 0);
    }

    #[tokio::test]
    async fn test_failed_remove_leaves_index_untouched() {
        let engine = Arc::new(FlakyEngine::default());
        let coordinator = CacheCoordinator::load(engine.clone()).await.unwrap();
        coordinator
            .set_value(CacheEntry::new("k", "v", None))
            .await
            .unwrap();

        engine.set_failing(true);
        let result = coordinator.delete_value("k").await;

        assert!(matches!(result, Err(CacheError::Durability(_))));
        assert_eq!(coordinator.get_value("k").unwrap(), "v");
    }

    #[tokio::test]
    async fn test_expired_read_purges_in_background() {
        let (coordinator, engine) = memory_coordinator().await;
        let past = Utc::now() - ChronoDuration::seconds(1);
        coordinator
            .set_value(CacheEntry::new("k", "v", Some(past)))
            .await
            .unwrap();
        assert!(engine.contains("k"));

        assert!(coordinator.get_value("k").is_err());

        for _ in 0..100 {
            if !engine.contains("k") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!engine.contains("k"), "Expired key should be purged");
        assert!(coordinator.index().get("k").is_none());
        assert_eq!(coordinator.stats().expired, 1);
    }

    #[tokio::test]
    async fn test_failed_purge_does_not_affect_read() {
        let engine = Arc::new(FlakyEngine::default());
        let coordinator = CacheCoordinator::load(engine.clone()).await.unwrap();
        let past = Utc::now() - ChronoDuration::seconds(1);
        coordinator
            .set_value(CacheEntry::new("k", "v", Some(past)))
            .await
            .unwrap();

        engine.set_failing(true);
        assert!(matches!(
            coordinator.get_value("k"),
            Err(CacheError::NotFound(_))
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;

        // Still expired, still absent to readers, and still retryable.
        assert!(coordinator.index().get("k").is_some());
        assert!(matches!(
            coordinator.get_value("k"),
            Err(CacheError::NotFound(_))
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;

        engine.set_failing(false);
        assert!(coordinator.purge_expired("k").await.unwrap());
        assert!(coordinator.index().get("k").is_none());
    }

    #[tokio::test]
    async fn test_purge_skips_refreshed_entry() {
        let (coordinator, engine) = memory_coordinator().await;
        coordinator
            .set_value(CacheEntry::new("k", "fresh", None))
            .await
            .unwrap();

        assert!(!coordinator.purge_expired("k").await.unwrap());
        assert_eq!(coordinator.get_value("k").unwrap(), "fresh");
        assert!(engine.contains("k"));
    }

    #[test]
    fn test_expired_read_without_runtime_does_not_panic() {
        let engine = Arc::new(MemoryEngine::new());
        let index = CacheIndex::new();
        index.put("k", "v", Some(Utc::now() - ChronoDuration::seconds(1)));
        let coordinator = CacheCoordinator::with_index(engine, index);

        assert!(matches!(
            coordinator.get_value("k"),
            Err(CacheError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_same_key_writes_are_last_writer_wins() {
        let (coordinator, engine) = memory_coordinator().await;

        coordinator
            .set_value(CacheEntry::new("k", "e1", None))
            .await
            .unwrap();
        coordinator
            .set_value(CacheEntry::new("k", "e2", None))
            .await
            .unwrap();

        assert_eq!(coordinator.get_value("k").unwrap(), "e2");
        assert_eq!(engine.get("k").unwrap().value, "e2");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_same_key_writes_stay_consistent() {
        let (coordinator, engine) = memory_coordinator().await;

        let mut handles = Vec::new();
        for i in 0..32 {
            let coordinator = coordinator.clone();
            handles.push(tokio::spawn(async move {
                coordinator
                    .set_value(CacheEntry::new("shared", format!("value-{}", i), None))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let in_index = coordinator.get_value("shared").unwrap();
        let in_store = engine.get("shared").unwrap().value;
        assert_eq!(in_index, in_store, "Index and store must agree");
        assert_eq!(coordinator.pending_writes(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_set_still_reaches_index() {
        let engine = Arc::new(SlowAckEngine::default());
        let coordinator = CacheCoordinator::load(engine.clone()).await.unwrap();
        coordinator
            .set_value(CacheEntry::new("k", "old", None))
            .await
            .unwrap();

        // The caller gives up after the engine committed but before it acked.
        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            coordinator.set_value(CacheEntry::new("k", "new", None)),
        )
        .await;
        assert!(abandoned.is_err());

        wait_for_idle(&coordinator).await;
        let (stored, indexed) = stored_and_indexed(&coordinator, &engine, "k");
        assert_eq!(stored.as_deref(), Some("new"));
        assert_eq!(indexed, stored, "Index and store must agree");
    }

    #[tokio::test]
    async fn test_abandoned_delete_still_reaches_index() {
        let engine = Arc::new(SlowAckEngine::default());
        let coordinator = CacheCoordinator::load(engine.clone()).await.unwrap();
        coordinator
            .set_value(CacheEntry::new("k", "old", None))
            .await
            .unwrap();

        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), coordinator.delete_value("k")).await;
        assert!(abandoned.is_err());

        wait_for_idle(&coordinator).await;
        let (stored, indexed) = stored_and_indexed(&coordinator, &engine, "k");
        assert_eq!(stored, None);
        assert_eq!(indexed, None, "Deleted key must not be served");
        assert!(matches!(
            coordinator.get_value("k"),
            Err(CacheError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_panicking_engine_is_internal_error() {
        let coordinator = CacheCoordinator::load(Arc::new(PanickingEngine))
            .await
            .unwrap();

        let result = coordinator
            .set_value(CacheEntry::new("k", "v", None))
            .await;
        assert!(matches!(result, Err(CacheError::Internal(_))));

        let result = coordinator.delete_value("k").await;
        assert!(matches!(result, Err(CacheError::Internal(_))));

        assert!(coordinator.index().get("k").is_none());
        assert_eq!(coordinator.pending_writes(), 0);
    }

    #[tokio::test]
    async fn test_stats_track_reads() {
        let (coordinator, _) = memory_coordinator().await;
        coordinator
            .set_value(CacheEntry::new("k", "v", None))
            .await
            .unwrap();

        let _ = coordinator.get_value("k");
        let _ = coordinator.get_value("missing");

        let stats = coordinator.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_entries, 1);
    }
}
