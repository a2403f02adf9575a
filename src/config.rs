//! Configuration Module
//!
//! Handles loading server configuration from environment variables and
//! selecting the durability engine.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::durability::DEFAULT_TABLE_NAME;
use crate::error::{CacheError, Result};

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default PostgreSQL pool size.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Server configuration parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Selected durability engine and its parameters
    pub durability: DurabilityConfig,
}

/// Durability engine selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DurabilityConfig {
    /// Transient in-process storage
    Memory,
    /// PostgreSQL server
    Postgres(PostgresConfig),
    /// Local SQLite file
    Sqlite(SqliteConfig),
}

/// Connection parameters for the PostgreSQL engine.
#[derive(Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub table: String,
    pub max_connections: u32,
}

// Keeps the password out of logs.
impl std::fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .field("table", &self.table)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Parameters for the SQLite engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteConfig {
    /// Database file, created if missing
    pub path: PathBuf,
    pub table: String,
}

/// Names accepted by `DURABILITY_ENGINE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Memory,
    Postgres,
    Sqlite,
}

impl FromStr for EngineKind {
    type Err = CacheError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(EngineKind::Memory),
            "postgres" => Ok(EngineKind::Postgres),
            "sqlite" => Ok(EngineKind::Sqlite),
            other => Err(CacheError::Startup(format!(
                "'{}' is not a recognized durability engine",
                other
            ))),
        }
    }
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `PORT` - HTTP server port (default: 8080)
    /// - `DURABILITY_ENGINE` - `memory`, `postgres` or `sqlite` (default: memory)
    /// - `POSTGRES_HOST`, `POSTGRES_PORT`, `POSTGRES_USER`, `POSTGRES_PASSWORD`,
    ///   `POSTGRES_DATABASE` - required for the postgres engine
    /// - `POSTGRES_TABLE` (default: dache), `POSTGRES_MAX_CONNECTIONS` (default: 10)
    /// - `SQLITE_PATH` - required for the sqlite engine
    /// - `SQLITE_TABLE` (default: dache)
    ///
    /// Missing required variables and unparsable values are startup failures.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`Config::from_env`] but reads variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        let server_port = vars.parsed_or("PORT", DEFAULT_PORT)?;
        let kind = match vars.get("DURABILITY_ENGINE") {
            Some(name) => name.parse()?,
            None => EngineKind::Memory,
        };

        let durability = match kind {
            EngineKind::Memory => DurabilityConfig::Memory,
            EngineKind::Postgres => DurabilityConfig::Postgres(PostgresConfig {
                host: vars.required("POSTGRES_HOST")?,
                port: vars.required_parsed("POSTGRES_PORT")?,
                user: vars.required("POSTGRES_USER")?,
                password: vars.required("POSTGRES_PASSWORD")?,
                database: vars.required("POSTGRES_DATABASE")?,
                table: vars
                    .get("POSTGRES_TABLE")
                    .unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string()),
                max_connections: vars
                    .parsed_or("POSTGRES_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            }),
            EngineKind::Sqlite => DurabilityConfig::Sqlite(SqliteConfig {
                path: PathBuf::from(vars.required("SQLITE_PATH")?),
                table: vars
                    .get("SQLITE_TABLE")
                    .unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string()),
            }),
        };

        Ok(Self {
            server_port,
            durability,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: DEFAULT_PORT,
            durability: DurabilityConfig::Memory,
        }
    }
}

// == Variable Helpers ==
struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Returns the variable, treating blank values as unset.
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, name: &str) -> Result<String> {
        self.get(name).ok_or_else(|| {
            CacheError::Startup(format!("missing required environment variable {}", name))
        })
    }

    fn required_parsed<T: FromStr>(&self, name: &str) -> Result<T> {
        let raw = self.required(name)?;
        parse_var(name, &raw)
    }

    fn parsed_or<T: FromStr>(&self, name: &str, default: T) -> Result<T> {
        match self.get(name) {
            Some(raw) => parse_var(name, &raw),
            None => Ok(default),
        }
    }
}

fn parse_var<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| {
        CacheError::Startup(format!("invalid value '{}' for environment variable {}", raw, name))
    })
}
