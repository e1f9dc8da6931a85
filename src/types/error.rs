//! Error types for the wallet ledger
//!
//! This module defines the errors raised at each layer of the ledger.
//!
//! # Error Categories
//!
//! - **Storage Errors** ([`StoreError`]): failures reported by the storage
//!   backend (constraint violations, timeouts, lost races, backend faults)
//! - **Ledger Errors** ([`LedgerError`]): the engine's domain outcomes, each
//!   carrying enough context to log a rejected operation
//!
//! Validation errors are produced before any mutating storage call. Storage
//! errors that carry domain meaning (uniqueness, missing rows, the balance
//! check constraint) are translated into ledger errors by the store adapters;
//! the rest are wrapped in [`LedgerError::Store`].

use super::account::AccountName;
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

/// Failure reported by a storage backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write
    #[error("unique constraint '{constraint}' violated")]
    UniqueViolation {
        /// Name of the violated constraint
        constraint: String,
    },

    /// A check constraint rejected the write
    #[error("check constraint '{constraint}' violated")]
    CheckViolation {
        /// Name of the violated constraint
        constraint: String,
    },

    /// A row addressed by a write does not exist
    #[error("row {id} not found in {table}")]
    RowNotFound {
        /// Table that was addressed
        table: &'static str,
        /// Identity of the missing row
        id: i64,
    },

    /// The operation did not complete within the configured timeout
    #[error("storage operation timed out")]
    Timeout,

    /// The transaction lost a race against a concurrent one
    #[error("transaction conflict: {message}")]
    Conflict {
        /// Backend description of the conflict
        message: String,
    },

    /// A fault injected by a test harness
    #[error("injected fault at {stage}")]
    Fault {
        /// Stage at which the fault fired
        stage: &'static str,
    },

    /// Any other backend failure
    #[error("storage backend error: {message}")]
    Backend {
        /// Backend description of the failure
        message: String,
    },
}

impl StoreError {
    /// Create a Backend error
    pub fn backend(message: impl fmt::Display) -> Self {
        StoreError::Backend {
            message: message.to_string(),
        }
    }
}

/// Role of the account a lookup was performed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountRole {
    /// Recipient of a deposit
    Deposit,
    /// Payer of a transfer
    From,
    /// Payee of a transfer
    To,
    /// Account named by a query or a delete
    Lookup,
}

impl fmt::Display for AccountRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = match self {
            AccountRole::Deposit => "deposit",
            AccountRole::From => "from",
            AccountRole::To => "to",
            AccountRole::Lookup => "requested",
        };
        f.write_str(role)
    }
}

/// Main error type for the ledger engine
///
/// Each variant includes the context needed to diagnose a rejected
/// operation. The service façade reduces these to a context-free taxonomy
/// before they reach callers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// The account name does not match the naming rule
    #[error("invalid account name '{name}': expected 4-32 latin letters or digits")]
    InvalidName {
        /// The rejected name, as given
        name: String,
    },

    /// An account with this name already exists
    #[error("account '{name}' already exists")]
    DuplicateName {
        /// The duplicated name
        name: AccountName,
    },

    /// The named account does not exist
    #[error("{role} account '{name}' not found")]
    AccountNotFound {
        /// What the account was looked up for
        role: AccountRole,
        /// The name that failed to resolve
        name: String,
    },

    /// The amount is zero or negative
    #[error("invalid amount {amount}: must be greater than zero")]
    AmountInvalid {
        /// The rejected amount
        amount: Decimal,
    },

    /// Payer and payee are the same account
    #[error("transfer from '{name}' to itself is not allowed")]
    SelfTransfer {
        /// The account named on both sides
        name: String,
    },

    /// The payer's balance does not cover the transfer
    #[error("insufficient funds in '{name}': balance {balance}, requested {requested}")]
    InsufficientFunds {
        /// The payer
        name: AccountName,
        /// Balance read inside the transfer transaction
        balance: Decimal,
        /// Requested transfer amount
        requested: Decimal,
    },

    /// The listing window is malformed
    #[error("invalid listing window: offset {offset}, limit {limit}")]
    OffsetLimitInvalid {
        /// Requested offset
        offset: i64,
        /// Requested limit
        limit: i64,
    },

    /// A storage failure with no domain meaning
    #[error("storage failure during {operation}: {source}")]
    Store {
        /// Operation that was running
        operation: &'static str,
        /// Underlying storage error
        #[source]
        source: StoreError,
    },
}

// Helper functions for creating common errors

impl LedgerError {
    /// Create an InvalidName error
    pub fn invalid_name(name: &str) -> Self {
        LedgerError::InvalidName {
            name: name.to_string(),
        }
    }

    /// Create an AccountNotFound error
    pub fn account_not_found(role: AccountRole, name: &str) -> Self {
        LedgerError::AccountNotFound {
            role,
            name: name.to_string(),
        }
    }

    /// Create an InsufficientFunds error
    pub fn insufficient_funds(name: &AccountName, balance: Decimal, requested: Decimal) -> Self {
        LedgerError::InsufficientFunds {
            name: name.clone(),
            balance,
            requested,
        }
    }

    /// Wrap a storage error raised during `operation`
    pub fn store(operation: &'static str, source: StoreError) -> Self {
        LedgerError::Store { operation, source }
    }

    /// Whether this error is an unclassified storage failure
    pub fn is_internal(&self) -> bool {
        matches!(self, LedgerError::Store { .. })
    }
}
