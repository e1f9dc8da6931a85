//! Core business logic module
//!
//! This module contains the ledger engine and its store adapters:
//! - `engine` - Request validation and operation orchestration
//! - `account_store` - Account rows and transactional balance mutation
//! - `payment_store` - Payment history reads behind the read cache

pub mod account_store;
pub mod engine;
pub mod payment_store;

pub use account_store::{AccountStore, DepositReceipt};
pub use engine::{LedgerEngine, TransferReceipt};
pub use payment_store::{CachedPayments, InvalidationGuard, PaymentCache, PaymentStore};
