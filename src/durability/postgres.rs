//! PostgreSQL durability engine.
//!
//! One row per key in a single table:
//! `key text PRIMARY KEY, value text, expiry timestamp default null`.
//! Expiry is stored as a UTC instant in a zone-less `timestamp` column.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::{info, warn};

use super::{validate_table_name, DurabilityEngine, DurabilityError};
use crate::cache::{CacheEntry, EntryValue};
use crate::config::PostgresConfig;

/// Durable engine backed by a PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PostgresEngine {
    pool: PgPool,
    table: String,
}

impl PostgresEngine {
    /// Connects to the configured server and creates the table if missing.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, DurabilityError> {
        validate_table_name(&config.table)?;

        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        info!(
            "Connected to PostgreSQL at {}:{}/{}",
            config.host, config.port, config.database
        );

        let engine = Self::with_pool(pool, config.table.clone())?;
        engine.initialize().await?;
        Ok(engine)
    }

    /// Wraps an existing pool. Does not touch the schema.
    pub fn with_pool(pool: PgPool, table: impl Into<String>) -> Result<Self, DurabilityError> {
        let table = table.into();
        validate_table_name(&table)?;
        Ok(Self { pool, table })
    }

    /// Creates the entries table if it does not exist.
    pub async fn initialize(&self) -> Result<(), DurabilityError> {
        let statement = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                key text PRIMARY KEY,
                value text,
                expiry timestamp default null
            )",
            self.table
        );
        sqlx::query(&statement).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl DurabilityEngine for PostgresEngine {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn load_all(&self) -> Result<HashMap<String, EntryValue>, DurabilityError> {
        let statement = format!("SELECT key, value, expiry FROM {}", self.table);
        let rows: Vec<(String, Option<String>, Option<NaiveDateTime>)> =
            sqlx::query_as(&statement).fetch_all(&self.pool).await?;

        let mut entries = HashMap::with_capacity(rows.len());
        for (key, value, expiry) in rows {
            match value {
                Some(value) => {
                    entries.insert(key, EntryValue::new(value, expiry.map(|e| e.and_utc())));
                }
                None => warn!("Skipping row with null value for key '{}'", key),
            }
        }
        Ok(entries)
    }

    async fn upsert(&self, entry: &CacheEntry) -> Result<(), DurabilityError> {
        let statement = format!(
            "INSERT INTO {} (key, value, expiry) VALUES ($1, $2, $3)
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, expiry = EXCLUDED.expiry",
            self.table
        );
        sqlx::query(&statement)
            .bind(&entry.key)
            .bind(&entry.value)
            .bind(entry.expiry.map(|e| e.naive_utc()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), DurabilityError> {
        let statement = format!("DELETE FROM {} WHERE key = $1", self.table);
        sqlx::query(&statement).bind(key).execute(&self.pool).await?;
        Ok(())
    }
}
