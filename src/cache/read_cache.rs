//! Expiring key/value cache shared across request tasks
//!
//! `ReadCache` is a process-local map from string keys to cloned values, each
//! with an optional expiry instant. It backs the payment read paths: listings
//! are stored with no expiry and dropped explicitly on writes, single-payment
//! lookups are stored with the configured default TTL.
//!
//! # Thread Safety
//!
//! Entries live in a `DashMap`, which shards its locks so concurrent readers of
//! different keys never block each other. Expired entries count as misses on
//! read and are physically removed by [`ReadCache::purge_expired`], which the
//! background [`CacheSweeper`](super::CacheSweeper) calls on an interval.

use dashmap::DashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Errors reported by the read cache
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// Delete was called for a key that is not cached
    #[error("cache key '{key}' not found")]
    KeyNotFound { key: String },
}

/// Lifetime of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// The cache's configured default TTL
    Default,
    /// Never expires; only an explicit delete removes it
    Never,
    /// Expires after the given duration
    After(Duration),
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Concurrent expiring cache
#[derive(Debug)]
pub struct ReadCache<V> {
    entries: DashMap<String, Entry<V>>,
    default_ttl: Duration,
}

impl<V: Clone> ReadCache<V> {
    /// Create an empty cache
    ///
    /// # Arguments
    ///
    /// * `default_ttl` - Lifetime applied to entries stored with [`Expiry::Default`]
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
        }
    }

    /// Store `value` under `key`, replacing any previous entry
    pub fn set(&self, key: impl Into<String>, value: V, expiry: Expiry) {
        let expires_at = match expiry {
            Expiry::Default => Some(Instant::now() + self.default_ttl),
            Expiry::Never => None,
            Expiry::After(ttl) => Some(Instant::now() + ttl),
        };
        self.entries
            .insert(key.into(), Entry { value, expires_at });
    }

    /// Fetch a clone of the value under `key`
    ///
    /// # Returns
    ///
    /// * `Some(value)` if the key is cached and not expired
    /// * `None` on a miss; an expired entry found here is removed
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if !entry.is_expired(now) {
                return Some(entry.value.clone());
            }
        }
        // The read guard is released above; removing while holding it would
        // deadlock on the shard.
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        None
    }

    /// Remove the entry under `key`
    ///
    /// # Errors
    ///
    /// Returns `CacheError::KeyNotFound` if nothing is cached under `key`.
    pub fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| CacheError::KeyNotFound {
                key: key.to_string(),
            })
    }

    /// Remove every expired entry and return how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries, expired ones included until purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = ReadCache::new(TTL);
        cache.set("a", 1, Expiry::Default);

        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("b"), None);
    }

    #[tokio::test]
    async fn test_set_replaces_value() {
        let cache = ReadCache::new(TTL);
        cache.set("a", 1, Expiry::Never);
        cache.set("a", 2, Expiry::Never);

        assert_eq!(cache.get("a"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_key_fails() {
        let cache: ReadCache<i32> = ReadCache::new(TTL);
        assert_eq!(
            cache.delete("missing"),
            Err(CacheError::KeyNotFound {
                key: "missing".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_delete_removes_entry() {
        let cache = ReadCache::new(TTL);
        cache.set("a", 1, Expiry::Never);

        assert_eq!(cache.delete("a"), Ok(()));
        assert_eq!(cache.get("a"), None);
        assert!(cache.is_empty());
    }

    #[rstest]
    #[case::default_ttl(Expiry::Default, Duration::from_secs(61), None)]
    #[case::before_default_ttl(Expiry::Default, Duration::from_secs(59), Some(7))]
    #[case::explicit_ttl(Expiry::After(Duration::from_secs(5)), Duration::from_secs(5), None)]
    #[case::never(Expiry::Never, Duration::from_secs(3600), Some(7))]
    #[tokio::test(start_paused = true)]
    async fn test_expiry(
        #[case] expiry: Expiry,
        #[case] elapsed: Duration,
        #[case] expected: Option<i32>,
    ) {
        let cache = ReadCache::new(TTL);
        cache.set("key", 7, expiry);

        tokio::time::advance(elapsed).await;

        assert_eq!(cache.get("key"), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_removed_on_read() {
        let cache = ReadCache::new(TTL);
        cache.set("key", 7, Expiry::Default);
        tokio::time::advance(TTL).await;

        assert_eq!(cache.get("key"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = ReadCache::new(TTL);
        cache.set("short", 1, Expiry::After(Duration::from_secs(1)));
        cache.set("default", 2, Expiry::Default);
        cache.set("pinned", 3, Expiry::Never);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 2);

        tokio::time::advance(TTL).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.get("pinned"), Some(3));
    }
}
