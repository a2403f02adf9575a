//! Durability Error Types

use thiserror::Error;

/// Failure reported by a durability engine.
#[derive(Error, Debug)]
pub enum DurabilityError {
    /// The underlying database rejected or failed the statement
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The engine was configured with unusable parameters
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Any other backend failure
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}
