//! Transient in-process durability engine.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{DurabilityEngine, DurabilityError};
use crate::cache::{CacheEntry, EntryValue};

/// Keeps entries in process memory. Data is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    entries: DashMap<String, EntryValue>,
}

impl MemoryEngine {
    /// Creates an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine pre-populated with `initial` entries.
    pub fn with_entries(initial: impl IntoIterator<Item = CacheEntry>) -> Self {
        let entries = DashMap::new();
        for entry in initial {
            let (key, value) = entry.into_parts();
            entries.insert(key, value);
        }
        Self { entries }
    }

    /// Returns whether `key` is currently persisted.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the persisted payload for `key`, if any.
    pub fn get(&self, key: &str) -> Option<EntryValue> {
        self.entries.get(key).map(|value| value.clone())
    }

    /// Number of persisted entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is persisted.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl DurabilityEngine for MemoryEngine {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn load_all(&self) -> Result<HashMap<String, EntryValue>, DurabilityError> {
        Ok(self
            .entries
            .iter()
            .map(|item| (item.key().clone(), item.value().clone()))
            .collect())
    }

    async fn upsert(&self, entry: &CacheEntry) -> Result<(), DurabilityError> {
        self.entries.insert(
            entry.key.clone(),
            EntryValue::new(entry.value.clone(), entry.expiry),
        );
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), DurabilityError> {
        self.entries.remove(key);
        Ok(())
    }
}
