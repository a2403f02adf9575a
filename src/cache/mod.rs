//! Cache Module
//!
//! Write-through caching with lazy expiry: the in-memory index, the per-key
//! lock, and the coordinator tying them to a durability engine.

mod coordinator;
mod entry;
mod index;
mod lock;
mod stats;


// Re-export public types
pub use coordinator::CacheCoordinator;
pub use entry::{CacheEntry, EntryValue};
pub use index::CacheIndex;
pub use lock::{KeyLock, KeyLockGuard};
pub use stats::{CacheStats, StatsCounters};
