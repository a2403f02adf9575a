//! Cache Index Module
//!
//! In-memory mirror of the durable store used for reads.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::cache::EntryValue;

// == Cache Index ==
/// Concurrent key -> (value, expiry) map.
///
/// Lookups never suspend and never fail. Mutations are expected to happen
/// only while the caller holds the key's lock.
#[derive(Debug, Default)]
pub struct CacheIndex {
    entries: DashMap<String, EntryValue>,
}

impl CacheIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from a loaded mapping.
    pub fn from_entries(entries: HashMap<String, EntryValue>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Returns a copy of the payload stored for `key`.
    pub fn get(&self, key: &str) -> Option<EntryValue> {
        self.entries.get(key).map(|value| value.clone())
    }

    /// Stores or replaces the payload for `key`.
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>, expiry: Option<DateTime<Utc>>) {
        self.entries.insert(key.into(), EntryValue::new(value, expiry));
    }

    /// Removes `key`, returning its previous payload.
    pub fn remove(&self, key: &str) -> Option<EntryValue> {
        self.entries.remove(key).map(|(_, value)| value)
    }

    /// Number of entries, expired-but-unpurged ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copies the full contents out. Intended for diagnostics and tests.
    pub fn snapshot(&self) -> HashMap<String, EntryValue> {
        self.entries
            .iter()
            .map(|item| (item.key().clone(), item.value().clone()))
            .collect()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_new() {
        let index = CacheIndex::new();
        assert_eq!(index.len(), 0);
        assert!(index.is_empty());
    }

    #[test]
    fn test_put_and_get() {
        let index = CacheIndex::new();
        index.put("key1", "value1", None);

        assert_eq!(index.get("key1"), Some(EntryValue::new("value1", None)));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_put_overwrites() {
        let index = CacheIndex::new();
        let expiry = Some(Utc::now());
        index.put("key1", "value1", None);
        index.put("key1", "value2", expiry);

        assert_eq!(index.get("key1"), Some(EntryValue::new("value2", expiry)));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_remove() {
        let index = CacheIndex::new();
        index.put("key1", "value1", None);

        assert!(index.remove("key1").is_some());
        assert!(index.remove("key1").is_none());
        assert!(index.get("key1").is_none());
    }

    #[test]
    fn test_from_entries() {
        let mut loaded = HashMap::new();
        loaded.insert("a".to_string(), EntryValue::new("1", None));
        loaded.insert("b".to_string(), EntryValue::new("2", None));

        let index = CacheIndex::from_entries(loaded.clone());
        assert_eq!(index.snapshot(), loaded);
    }
}
