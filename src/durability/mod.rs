//! Durability Module
//!
//! The persistence contract behind the cache index, plus its backends:
//! - `memory`: transient, in-process, nothing survives a restart
//! - `postgres`: durable, one table keyed by `key`
//! - `sqlite`: durable, single local file with the same layout

mod error;
mod memory;
mod postgres;
mod sqlite;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::cache::{CacheEntry, EntryValue};
use crate::config::DurabilityConfig;

pub use error::DurabilityError;
pub use memory::MemoryEngine;
pub use postgres::PostgresEngine;
pub use sqlite::SqliteEngine;

/// Default table name for the relational backends.
pub const DEFAULT_TABLE_NAME: &str = "dache";

// == Durability Engine ==
/// Authoritative store of every cache entry.
///
/// `load_all` is called once at startup. `upsert` and `remove` are only
/// called by the coordinator while it holds the key's lock.
#[async_trait]
pub trait DurabilityEngine: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    /// Returns every persisted entry.
    async fn load_all(&self) -> Result<HashMap<String, EntryValue>, DurabilityError>;

    /// Inserts the entry or replaces the existing entry with the same key.
    async fn upsert(&self, entry: &CacheEntry) -> Result<(), DurabilityError>;

    /// Deletes the entry for `key`. Removing an absent key succeeds.
    async fn remove(&self, key: &str) -> Result<(), DurabilityError>;
}

/// Builds the engine selected by configuration, creating its table if needed.
pub async fn connect(
    config: &DurabilityConfig,
) -> Result<Arc<dyn DurabilityEngine>, DurabilityError> {
    let engine: Arc<dyn DurabilityEngine> = match config {
        DurabilityConfig::Memory => Arc::new(MemoryEngine::new()),
        DurabilityConfig::Postgres(pg) => Arc::new(PostgresEngine::connect(pg).await?),
        DurabilityConfig::Sqlite(lite) => Arc::new(SqliteEngine::connect(lite).await?),
    };

    info!("Durability engine '{}' ready", engine.name());
    Ok(engine)
}

/// Checks that a table name is a plain SQL identifier.
///
/// Table names are interpolated into statements, so anything beyond
/// `[A-Za-z_][A-Za-z0-9_]*` is rejected.
pub(crate) fn validate_table_name(name: &str) -> Result<(), DurabilityError> {
    let mut chars = name.chars();
    let valid_head = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    let valid_tail = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid_head && valid_tail && name.len() <= 63 {
        Ok(())
    } else {
        Err(DurabilityError::InvalidConfiguration(format!(
            "'{}' is not a valid table name",
            name
        )))
    }
}
