//! Wallet Ledger Library
//! # Overview
//!
//! This library tracks named wallet accounts, their balances, and an immutable
//! history of the payments (deposits and transfers) that moved money between
//! them.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (Account, Payment, Page, errors)
//! - [`storage`] - The transactional storage boundary and its backends
//! - [`cache`] - Expiring read cache and its background sweeper
//! - [`core`] - Business logic components:
//!   - [`core::engine`] - Validation and operation orchestration
//!   - [`core::account_store`] - Account rows and atomic balance mutation
//!   - [`core::payment_store`] - Payment history behind the read cache
//! - [`service`] - Façade mapping outcomes to a closed error taxonomy
//! - [`ledger`] - A running ledger: storage, cache, and sweeper lifecycle
//! - [`config`] - Runtime configuration
//! - [`io`] and [`batch`] - Command file processing for the CLI
//! - [`cli`] - CLI arguments parsing
//!
//! # Invariants
//!
//! - **Conservation**: the sum of all balances equals the sum of all deposits
//! - **Non-negativity**: no balance is ever below zero
//! - **Atomicity**: a deposit or transfer either commits its balance changes
//!   and its payment record together, or has no effect at all
//! - **No lost updates**: concurrent transfers from one account are
//!   serialized by row locks, so their combined debits never exceed the
//!   balance
//!
//! # Example
//!
//! ```no_run
//! use rust_decimal::Decimal;
//! use wallet_ledger::{Ledger, LedgerConfig};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let ledger = Ledger::open(LedgerConfig::default()).await?;
//! let service = ledger.service();
//!
//! service.create_account("alice").await?;
//! service.create_account("bob01").await?;
//! service.deposit("alice", Decimal::new(100, 0)).await?;
//! service.transfer("alice", "bob01", Decimal::new(40, 0)).await?;
//!
//! ledger.shutdown().await;
//! # Ok(())
//! # }
//! ```

// Module declarations
pub mod batch;
pub mod cache;
pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod ledger;
pub mod service;
pub mod storage;
pub mod telemetry;
pub mod types;

pub use config::{BackendKind, ConfigError, LedgerConfig};
pub use core::{LedgerEngine, TransferReceipt};
pub use ledger::{Ledger, SetupError};
pub use service::{AccountView, LedgerService, PaymentView, ServiceError};
pub use storage::{Backend, MemoryStorage, Storage, StorageTx};
pub use types::{
    Account, AccountId, AccountName, AccountRole, Direction, LedgerEntry, LedgerError, Page,
    Payment, PaymentId, StoreError,
};
