//! Request DTOs for the cache server API
//!
//! Defines the structure of incoming HTTP request bodies.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::cache::CacheEntry;
use crate::error::{CacheError, Result};

/// Request body for the SET operation (POST /cache/{key})
///
/// # Fields
/// - `value`: The value to store
/// - `expiry`: Optional absolute expiry in unix seconds; omitted or null means never
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    /// The value to store
    pub value: String,
    /// Absolute expiry in unix seconds, fractional seconds allowed
    #[serde(default)]
    pub expiry: Option<f64>,
}

impl SetRequest {
    /// Converts the request into an entry for `key`.
    ///
    /// Fails if the key is empty or the expiry cannot be represented.
    pub fn into_entry(self, key: String) -> Result<CacheEntry> {
        if key.is_empty() {
            return Err(CacheError::InvalidRequest("Key cannot be empty".to_string()));
        }

        let expiry = self.expiry.map(unix_seconds_to_datetime).transpose()?;
        Ok(CacheEntry::new(key, self.value, expiry))
    }
}

fn unix_seconds_to_datetime(seconds: f64) -> Result<DateTime<Utc>> {
    let millis = (seconds * 1000.0).round();
    // i64::MAX as f64 rounds up, so use a strict bound
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return Err(CacheError::InvalidRequest(format!(
            "expiry {} is out of range",
            seconds
        )));
    }

    DateTime::from_timestamp_millis(millis as i64).ok_or_else(|| {
        CacheError::InvalidRequest(format!("expiry {} is out of range", seconds))
    })
}
