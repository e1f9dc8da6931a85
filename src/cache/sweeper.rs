//! Background eviction of expired cache entries

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::ReadCache;

/// Handle to a running sweep task
///
/// The task wakes every `interval`, purges expired entries of the cache, and
/// exits once [`CacheSweeper::stop`] cancels it. Dropping the handle without
/// stopping also cancels the task.
#[derive(Debug)]
pub struct CacheSweeper {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl CacheSweeper {
    /// Spawn the sweep task on the current runtime
    pub fn start<V>(cache: Arc<ReadCache<V>>, interval: Duration) -> Self
    where
        V: Clone + Send + Sync + 'static,
    {
        let token = CancellationToken::new();
        let child = token.child_token();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        let purged = cache.purge_expired();
                        if purged > 0 {
                            debug!(purged, remaining = cache.len(), "cache sweep");
                        }
                    }
                }
            }
        });

        Self {
            token,
            handle: Some(handle),
        }
    }

    /// Cancel the sweep task and wait for it to finish
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "cache sweeper task failed");
            }
        }
    }

    /// Whether the sweep task is still running
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for CacheSweeper {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Expiry;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_purges_expired_entries() {
        let cache = Arc::new(ReadCache::new(Duration::from_secs(10)));
        cache.set("expiring", 1, Expiry::Default);
        cache.set("pinned", 2, Expiry::Never);

        let sweeper = CacheSweeper::start(Arc::clone(&cache), Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("pinned"), Some(2));

        sweeper.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_sweeper_leaves_entries() {
        let cache = Arc::new(ReadCache::new(Duration::from_secs(10)));
        let sweeper = CacheSweeper::start(Arc::clone(&cache), Duration::from_secs(30));
        assert!(sweeper.is_running());
        sweeper.stop().await;

        cache.set("expiring", 1, Expiry::Default);
        tokio::time::sleep(Duration::from_secs(60)).await;

        // Nobody purged it, but reads still treat it as a miss.
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("expiring"), None);
    }
}
