//! Cache Entry Module
//!
//! Defines the (key, value, optional expiry) triple and the per-key payload
//! held by the index and the durability engines.

use chrono::{DateTime, Utc};

// == Entry Value ==
/// The payload stored for a single key: the value and its optional expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryValue {
    /// The stored value
    pub value: String,
    /// Absolute instant after which the entry is logically absent, None = never
    pub expiry: Option<DateTime<Utc>>,
}

impl EntryValue {
    /// Creates a new entry value.
    pub fn new(value: impl Into<String>, expiry: Option<DateTime<Utc>>) -> Self {
        Self {
            value: value.into(),
            expiry,
        }
    }

    // == Is Expired ==
    /// Checks whether the entry is expired at the given instant.
    ///
    /// Boundary condition: an entry is expired once `now >= expiry`, so an
    /// entry whose expiry equals the current instant is already absent.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry <= now,
            None => false,
        }
    }

    /// Checks whether the entry is expired right now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

// == Cache Entry ==
/// A complete cache entry as written by `set`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Unique, non-empty key
    pub key: String,
    /// The stored value
    pub value: String,
    /// Optional absolute expiry
    pub expiry: Option<DateTime<Utc>>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry.
    ///
    /// # Arguments
    /// * `key` - The key to store under
    /// * `value` - The value to store
    /// * `expiry` - Optional absolute expiry instant
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
        expiry: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            expiry,
        }
    }

    /// Splits the entry into its key and payload.
    pub fn into_parts(self) -> (String, EntryValue) {
        (
            self.key,
            EntryValue {
                value: self.value,
                expiry: self.expiry,
            },
        )
    }
}
