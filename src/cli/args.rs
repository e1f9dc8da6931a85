use crate::batch::{ReportKind, DEFAULT_BATCH_SIZE};
use crate::config::{BackendKind, LedgerConfig};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Apply a file of wallet ledger commands and print a report
#[derive(Parser, Debug)]
#[command(name = "wallet-ledger")]
#[command(about = "Apply wallet ledger commands from a CSV file", long_about = None)]
pub struct CliArgs {
    /// Input CSV file path containing ledger commands
    #[arg(value_name = "COMMANDS", help = "Path to the command CSV file (op,name,to,amount)")]
    pub input_file: PathBuf,

    /// Storage backend
    #[arg(long, env = "LEDGER_BACKEND", value_name = "BACKEND", default_value = "memory")]
    pub backend: BackendKind,

    /// Connection string for the postgres backend
    #[arg(long, env = "DATABASE_URL", value_name = "URL")]
    pub database_url: Option<String>,

    /// Create the postgres tables before processing
    #[arg(long)]
    pub bootstrap_schema: bool,

    /// Currency of newly registered accounts
    #[arg(long, env = "LEDGER_CURRENCY", value_name = "CODE")]
    pub currency: Option<String>,

    /// Lifetime of cached single-payment lookups, in seconds
    #[arg(long = "cache-ttl", env = "LEDGER_CACHE_TTL", value_name = "SECS")]
    pub cache_ttl_secs: Option<u64>,

    /// Period of the cache sweep, in seconds
    #[arg(long = "sweep-interval", env = "LEDGER_SWEEP_INTERVAL", value_name = "SECS")]
    pub sweep_interval_secs: Option<u64>,

    /// Upper bound for a single storage call, in milliseconds
    #[arg(long = "op-timeout", env = "LEDGER_OP_TIMEOUT_MS", value_name = "MILLIS")]
    pub op_timeout_ms: Option<u64>,

    /// Size of the storage connection pool
    #[arg(long, env = "LEDGER_MAX_CONNECTIONS", value_name = "COUNT")]
    pub max_connections: Option<u32>,

    /// Worker threads of the runtime (default: CPU cores)
    #[arg(long, env = "LEDGER_WORKERS", value_name = "COUNT")]
    pub workers: Option<usize>,

    /// Number of commands read per batch
    #[arg(long = "batch-size", value_name = "SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Report printed to stdout after processing
    #[arg(long, value_name = "REPORT", default_value = "accounts")]
    pub report: ReportKind,

    /// Emit logs as JSON lines
    #[arg(long, env = "LEDGER_LOG_JSON")]
    pub log_json: bool,
}

impl CliArgs {
    /// Create a LedgerConfig from CLI arguments
    ///
    /// Values not given on the command line or in the environment fall back
    /// to `LedgerConfig::default()`. The result is not validated yet.
    pub fn to_config(&self) -> LedgerConfig {
        let default = LedgerConfig::default();

        LedgerConfig {
            backend: self.backend,
            database_url: self.database_url.clone(),
            default_currency: self
                .currency
                .clone()
                .unwrap_or(default.default_currency),
            cache_ttl: self
                .cache_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(default.cache_ttl),
            sweep_interval: self
                .sweep_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(default.sweep_interval),
            operation_timeout: self
                .op_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(default.operation_timeout),
            max_connections: self.max_connections.unwrap_or(default.max_connections),
            worker_threads: self.workers.unwrap_or(default.worker_threads),
        }
    }
}
