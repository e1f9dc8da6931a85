//! Running ledger instance
//!
//! `Ledger` owns everything with a lifecycle: the opened storage backend, the
//! payment cache, and the background sweep task. It hands out cheap
//! [`LedgerService`] handles and tears everything down in [`Ledger::shutdown`].

use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::cache::CacheSweeper;
use crate::config::{ConfigError, LedgerConfig};
use crate::core::{LedgerEngine, PaymentCache};
use crate::service::LedgerService;
use crate::storage::{self, Backend, Storage};
use crate::types::StoreError;

/// Failure to bring a ledger up
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to open storage: {0}")]
    Storage(#[from] StoreError),
}

/// A ledger with its storage and background tasks
#[derive(Debug)]
pub struct Ledger<S = Backend> {
    engine: Arc<LedgerEngine<S>>,
    sweeper: CacheSweeper,
}

impl Ledger<Backend> {
    /// Validate `config`, open the configured backend and start the ledger
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// * `SetupError::Config` if the configuration is invalid
    /// * `SetupError::Storage` if the backend cannot be opened
    pub async fn open(config: LedgerConfig) -> Result<Self, SetupError> {
        let config = config.validate()?;
        let backend = storage::open(&config).await?;
        info!(backend = ?config.backend, "storage opened");
        Ok(Self::with_storage(Arc::new(backend), &config))
    }
}

impl<S: Storage> Ledger<S> {
    /// Start a ledger over an already opened backend
    ///
    /// Spawns the cache sweeper, so it must be called from within a tokio
    /// runtime.
    pub fn with_storage(storage: Arc<S>, config: &LedgerConfig) -> Self {
        let cache = Arc::new(PaymentCache::new(config.cache_ttl));
        let sweeper = CacheSweeper::start(Arc::clone(&cache), config.sweep_interval);
        let engine = LedgerEngine::new(storage, cache, &config.default_currency);

        Self {
            engine: Arc::new(engine),
            sweeper,
        }
    }

    /// A handle to the service façade
    pub fn service(&self) -> LedgerService<S> {
        LedgerService::new(Arc::clone(&self.engine))
    }

    /// The engine, for callers that need ledger errors with full context
    pub fn engine(&self) -> &Arc<LedgerEngine<S>> {
        &self.engine
    }

    /// Stop the cache sweeper and release the storage backend
    pub async fn shutdown(self) {
        self.sweeper.stop().await;
        self.engine.storage().close().await;
        info!("ledger shut down");
    }
}
