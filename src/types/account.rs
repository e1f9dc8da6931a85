//! Account-related types for the wallet ledger
//!
//! This module defines the Account structure and the validated account name
//! used to address accounts from the outside.

use super::error::LedgerError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Account identifier
///
/// Assigned by the storage backend on creation and never changed afterwards.
pub type AccountId = i64;

/// Currency assigned to every new account
pub const DEFAULT_CURRENCY: &str = "usd";

/// Validated, normalized account name
///
/// Names consist of 4 to 32 latin letters or digits. Matching is
/// case-insensitive, so names are stored in lowercase: `Alice` and `alice`
/// address the same account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountName(String);

impl AccountName {
    /// Shortest accepted name
    pub const MIN_LEN: usize = 4;

    /// Longest accepted name
    pub const MAX_LEN: usize = 32;

    /// Validate and normalize a raw account name
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidName` if the name is too short, too long,
    /// or contains anything other than ASCII letters and digits.
    pub fn parse(raw: &str) -> Result<Self, LedgerError> {
        let valid_len = (Self::MIN_LEN..=Self::MAX_LEN).contains(&raw.len());
        if !valid_len || !raw.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(LedgerError::invalid_name(raw));
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    /// Wrap a name read back from storage
    ///
    /// Stored names were validated when the account was registered.
    pub(crate) fn from_stored(name: String) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AccountName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for AccountName {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AccountName {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AccountName> for String {
    fn from(name: AccountName) -> Self {
        name.0
    }
}

/// Wallet account state
///
/// An immutable snapshot of an account row as returned by the storage
/// backend. Balance changes produce new snapshots rather than mutating this
/// one.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    /// Store-assigned identity
    pub id: AccountId,

    /// Unique account name
    pub name: AccountName,

    /// Current balance, never negative
    pub balance: Decimal,

    /// Currency fixed at creation time
    pub currency: String,
}
