//! Batch processing of ledger command files
//!
//! Streams a CSV command file through the service façade in file order and
//! writes a final report.
//!
//! # Architecture
//!
//! ```text
//! run_file
//!     ├── CommandReader   (batched csv-async reading over a tokio file)
//!     └── LedgerService   (each command applied in order)
//! write_report
//!     └── accounts or payments CSV on the given writer
//! ```
//!
//! Commands are applied strictly one after another: a transfer may depend on
//! the deposit in the row before it. Rejected commands are logged and
//! counted; they never abort the run.

use clap::ValueEnum;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio_util::compat::TokioAsyncReadCompatExt;
use tracing::{info, warn};

use crate::io::{write_accounts_csv, write_payments_csv, CommandReader, LedgerCommand};
use crate::service::{LedgerService, ServiceError};
use crate::storage::Storage;
use crate::types::Page;

/// Commands read per batch unless configured otherwise
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Report written after the command file is processed
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportKind {
    /// Every account with its balance (`name,balance,currency`)
    Accounts,
    /// The whole payment history (`id,account,to_account,amount,direction`)
    Payments,
}

/// Counters of a processed command file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Commands the ledger accepted
    pub applied: usize,
    /// Commands the ledger rejected with a domain error
    pub rejected: usize,
    /// Rows that could not be parsed into a command
    pub skipped: usize,
}

/// Fatal failure of a batch run
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("failed to open file '{}': {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write report: {0}")]
    Report(String),

    #[error("ledger failure: {0}")]
    Service(#[from] ServiceError),
}

/// Apply one command through the service
pub async fn apply_command<S: Storage>(
    service: &LedgerService<S>,
    command: &LedgerCommand,
) -> Result<(), ServiceError> {
    match command {
        LedgerCommand::Register { name } => service.create_account(name).await.map(|_| ()),
        LedgerCommand::Deposit { name, amount } => service.deposit(name, *amount).await.map(|_| ()),
        LedgerCommand::Transfer { from, to, amount } => {
            service.transfer(from, to, *amount).await.map(|_| ())
        }
        LedgerCommand::Delete { name } => service.delete_account(name).await,
    }
}

/// Process every command of the file at `input_path`, in order
///
/// # Arguments
///
/// * `service` - Ledger to apply the commands to
/// * `input_path` - Path to the command CSV file
/// * `batch_size` - Number of commands read per batch (0 uses the default)
///
/// # Errors
///
/// Returns `BatchError::Open` if the file cannot be opened. Per-command
/// failures are logged and counted in the summary instead.
pub async fn run_file<S: Storage>(
    service: &LedgerService<S>,
    input_path: &Path,
    batch_size: usize,
) -> Result<BatchSummary, BatchError> {
    let batch_size = if batch_size == 0 {
        DEFAULT_BATCH_SIZE
    } else {
        batch_size
    };

    let file = tokio::fs::File::open(input_path)
        .await
        .map_err(|source| BatchError::Open {
            path: input_path.to_path_buf(),
            source,
        })?;

    // Wrap tokio file in a compatibility layer for csv-async
    let mut reader = CommandReader::new(file.compat());
    let mut summary = BatchSummary::default();

    loop {
        let batch = reader.read_batch(batch_size).await;
        if batch.is_empty() {
            break;
        }

        for command in &batch {
            match apply_command(service, command).await {
                Ok(()) => summary.applied += 1,
                Err(e) => {
                    warn!(op = command.op(), ?command, error = %e, "command rejected");
                    summary.rejected += 1;
                }
            }
        }
    }

    summary.skipped = reader.skipped();
    info!(
        applied = summary.applied,
        rejected = summary.rejected,
        skipped = summary.skipped,
        "command file processed"
    );
    Ok(summary)
}

/// Write the requested report of the ledger's current state
pub async fn write_report<S: Storage>(
    service: &LedgerService<S>,
    kind: ReportKind,
    output: &mut dyn Write,
) -> Result<(), BatchError> {
    let all = Page::UNBOUNDED;
    match kind {
        ReportKind::Accounts => {
            let accounts = service.accounts_list(0, all).await?;
            write_accounts_csv(&accounts, output).map_err(BatchError::Report)
        }
        ReportKind::Payments => {
            let payments = service.payments_list(None, 0, all).await?;
            write_payments_csv(&payments, output).map_err(BatchError::Report)
        }
    }
}
