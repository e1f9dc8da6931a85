//! Read cache fronting payment lookups
//!
//! - `read_cache` - concurrent key/value map with per-entry expiry
//! - `sweeper` - scheduled eviction task with explicit start/stop

pub mod read_cache;
pub mod sweeper;

pub use read_cache::{CacheError, Expiry, ReadCache};
pub use sweeper::CacheSweeper;
