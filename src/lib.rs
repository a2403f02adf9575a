//! Dache - A write-through key/value cache server
//!
//! Serves reads from an in-memory index, persists every write to a pluggable
//! durability engine before publishing it, and expires entries lazily on read.

pub mod api;
pub mod cache;
pub mod config;
pub mod durability;
pub mod error;
pub mod models;

pub use api::AppState;
pub use cache::CacheCoordinator;
pub use config::Config;
