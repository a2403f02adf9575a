//! SQLite durability engine.
//!
//! Same single-table layout as the PostgreSQL engine, stored in one local
//! file that is created on first use.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{info, warn};

use super::{validate_table_name, DurabilityEngine, DurabilityError};
use crate::cache::{CacheEntry, EntryValue};
use crate::config::SqliteConfig;

/// Durable engine backed by a SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteEngine {
    pool: SqlitePool,
    table: String,
}

impl SqliteEngine {
    /// Opens (or creates) the database file and the entries table.
    pub async fn connect(config: &SqliteConfig) -> Result<Self, DurabilityError> {
        validate_table_name(&config.table)?;

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        info!("Opened SQLite database at {}", config.path.display());

        let engine = Self {
            pool,
            table: config.table.clone(),
        };
        engine.initialize().await?;
        Ok(engine)
    }

    /// Creates the entries table if it does not exist.
    pub async fn initialize(&self) -> Result<(), DurabilityError> {
        let statement = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                key TEXT PRIMARY KEY,
                value TEXT,
                expiry DATETIME DEFAULT NULL
            )",
            self.table
        );
        sqlx::query(&statement).execute(&self.pool).await?;
        Ok(())
    }

    /// Closes every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl DurabilityEngine for SqliteEngine {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn load_all(&self) -> Result<HashMap<String, EntryValue>, DurabilityError> {
        let statement = format!("SELECT key, value, expiry FROM {}", self.table);
        let rows: Vec<(String, Option<String>, Option<DateTime<Utc>>)> =
            sqlx::query_as(&statement).fetch_all(&self.pool).await?;

        let mut entries = HashMap::with_capacity(rows.len());
        for (key, value, expiry) in rows {
            match value {
                Some(value) => {
                    entries.insert(key, EntryValue::new(value, expiry));
                }
                None => warn!("Skipping row with null value for key '{}'", key),
            }
        }
        Ok(entries)
    }

    async fn upsert(&self, entry: &CacheEntry) -> Result<(), DurabilityError> {
        let statement = format!(
            "INSERT INTO {} (key, value, expiry) VALUES (?1, ?2, ?3)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value, expiry = excluded.expiry",
            self.table
        );
        sqlx::query(&statement)
            .bind(&entry.key)
            .bind(&entry.value)
            .bind(entry.expiry)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), DurabilityError> {
        let statement = format!("DELETE FROM {} WHERE key = ?1", self.table);
        sqlx::query(&statement).bind(key).execute(&self.pool).await?;
        Ok(())
    }
}
