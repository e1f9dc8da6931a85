//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `account`: Account and account name types
//! - `payment`: Payment records and listing annotations
//! - `page`: Offset/limit windows for listings
//! - `error`: Error types for the ledger

pub mod account;
pub mod error;
pub mod page;
pub mod payment;

pub use account::{Account, AccountId, AccountName, DEFAULT_CURRENCY};
pub use error::{AccountRole, LedgerError, StoreError};
pub use page::Page;
pub use payment::{is_valid_amount, Direction, LedgerEntry, Payment, PaymentId, AMOUNT_SCALE};
