//! Ledger configuration
//!
//! `LedgerConfig` gathers every tunable of a running ledger. It is built from
//! CLI arguments (with environment fallbacks, see [`crate::cli`]) or
//! constructed directly by embedders, and validated once at startup.

use clap::ValueEnum;
use std::time::Duration;
use thiserror::Error;

use crate::types::DEFAULT_CURRENCY;

/// Storage backend selected at startup
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// In-process tables, lost on exit
    Memory,
    /// PostgreSQL through sqlx (requires the `postgres` feature)
    Postgres,
}

/// Invalid configuration detected at startup
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("the postgres backend requires a database url")]
    MissingDatabaseUrl,

    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },

    #[error("default currency must not be empty")]
    EmptyCurrency,
}

/// Runtime configuration of a ledger instance
#[derive(Clone, Debug, PartialEq)]
pub struct LedgerConfig {
    /// Storage backend
    pub backend: BackendKind,

    /// Connection string for the postgres backend
    pub database_url: Option<String>,

    /// Currency assigned to newly registered accounts
    pub default_currency: String,

    /// Lifetime of time-boxed cache entries (single payment lookups)
    pub cache_ttl: Duration,

    /// Period of the background sweep that evicts expired cache entries
    pub sweep_interval: Duration,

    /// Upper bound for any single storage call
    pub operation_timeout: Duration,

    /// Size of the storage connection pool
    pub max_connections: u32,

    /// Worker threads of the request-handling runtime
    pub worker_threads: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            database_url: None,
            default_currency: DEFAULT_CURRENCY.to_string(),
            cache_ttl: Duration::from_secs(10 * 60),
            sweep_interval: Duration::from_secs(10 * 60),
            operation_timeout: Duration::from_secs(5),
            max_connections: 10,
            worker_threads: num_cpus::get(),
        }
    }
}

impl LedgerConfig {
    /// Check the configuration for values the ledger cannot run with
    ///
    /// # Errors
    ///
    /// Returns the first problem found: a postgres backend without a URL,
    /// an empty currency, or a zero timeout, interval, TTL, pool size or
    /// worker count.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.backend == BackendKind::Postgres && self.database_url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }
        if self.default_currency.trim().is_empty() {
            return Err(ConfigError::EmptyCurrency);
        }

        let zero_checks = [
            ("cache_ttl", self.cache_ttl.is_zero()),
            ("sweep_interval", self.sweep_interval.is_zero()),
            ("operation_timeout", self.operation_timeout.is_zero()),
            ("max_connections", self.max_connections == 0),
            ("worker_threads", self.worker_threads == 0),
        ];
        if let Some(&(field, _)) = zero_checks.iter().find(|(_, is_zero)| *is_zero) {
            return Err(ConfigError::ZeroValue { field });
        }

        Ok(self)
    }
}
