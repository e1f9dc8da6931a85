//! Payment-related types for the wallet ledger
//!
//! A payment is the immutable record of one movement of value: either a
//! deposit entering the ledger from outside, or a transfer between two
//! accounts. Payments are append-only and never change once committed.

use super::account::AccountId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// Payment identifier
///
/// Assigned by the storage backend when the payment is committed.
pub type PaymentId = i64;

/// Decimal places kept for amounts and balances by every backend
pub const AMOUNT_SCALE: u32 = 4;

/// Whether `amount` can be moved: strictly positive, at most
/// [`AMOUNT_SCALE`] significant decimal places
///
/// Trailing zeros do not count, so `1.50000` is accepted.
pub fn is_valid_amount(amount: Decimal) -> bool {
    amount > Decimal::ZERO && amount.normalize().scale() <= AMOUNT_SCALE
}

/// Committed payment record
#[derive(Debug, Clone, PartialEq)]
pub struct Payment {
    /// Store-assigned identity
    pub id: PaymentId,

    /// Commit timestamp assigned by the store
    pub date: DateTime<Utc>,

    /// Moved amount, always strictly positive
    pub amount: Decimal,

    /// Payer account, `None` for a deposit
    pub from: Option<AccountId>,

    /// Payee account
    pub to: AccountId,
}

impl Payment {
    /// Whether the given account paid or received this payment
    pub fn involves(&self, account: AccountId) -> bool {
        self.from == Some(account) || self.to == account
    }

    /// Direction of this payment as seen from `account`
    ///
    /// Only the payer sees a payment as outgoing; deposits are always
    /// incoming for their recipient.
    pub fn direction_for(&self, account: AccountId) -> Direction {
        if self.from == Some(account) {
            Direction::Outgoing
        } else {
            Direction::Incoming
        }
    }
}

/// Direction of a payment relative to an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Incoming => f.write_str("incoming"),
            Direction::Outgoing => f.write_str("outgoing"),
        }
    }
}

/// Payment annotated with its direction for a listing
///
/// Account-scoped listings derive the direction from the requested account;
/// the global listing reports every entry as outgoing.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub payment: Payment,
    pub direction: Direction,
}
