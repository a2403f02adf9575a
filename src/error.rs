//! Error types for the cache server
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::durability::DurabilityError;
use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the cache server.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key is absent from the index or has expired
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Malformed write request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The durability engine could not complete an operation
    #[error("Durability failure: {0}")]
    Durability(#[from] DurabilityError),

    /// Missing or invalid configuration, or the initial load failed
    #[error("Startup failure: {0}")]
    Startup(String),

    /// A write task panicked or was aborted before reporting its outcome
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::Durability(_) | CacheError::Startup(_) | CacheError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache server.
pub type Result<T> = std::result::Result<T, CacheError>;
