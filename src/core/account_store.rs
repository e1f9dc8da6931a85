//! Account store adapter
//!
//! This module provides the `AccountStore` struct, which persists account rows
//! and performs the balance mutations of deposits and transfers against a
//! [`Storage`] backend.
//!
//! # Atomicity
//!
//! Deposits and transfers run inside a single storage transaction:
//!
//! ```text
//! begin → lock balances → check → mutate balances → insert payment → commit
//! ```
//!
//! Any failure rolls the transaction back, so no partial effect is ever
//! visible. Transfers lock the two account rows in ascending id order, so two
//! opposite transfers between the same pair cannot deadlock.
//!
//! # Error Translation
//!
//! Storage errors that carry domain meaning are translated here:
//! - `UniqueViolation` on create → `LedgerError::DuplicateName`
//! - `RowNotFound` on a balance write → `LedgerError::AccountNotFound`
//! - `CheckViolation` on a debit → `LedgerError::InsufficientFunds`
//!
//! Everything else is wrapped in `LedgerError::Store`.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::storage::{Storage, StorageTx};
use crate::types::{
    Account, AccountId, AccountName, AccountRole, LedgerError, Page, Payment, StoreError,
};

/// Outcome of a committed deposit
#[derive(Debug, Clone, PartialEq)]
pub struct DepositReceipt {
    /// The appended payment
    pub payment: Payment,
    /// Balance of the account after the deposit
    pub balance: Decimal,
}

/// Persists accounts and mutates balances
#[derive(Debug)]
pub struct AccountStore<S> {
    storage: Arc<S>,
    currency: String,
}

impl<S: Storage> AccountStore<S> {
    /// Create a store over `storage`
    ///
    /// # Arguments
    ///
    /// * `storage` - Shared storage backend
    /// * `currency` - Currency assigned to newly created accounts
    pub fn new(storage: Arc<S>, currency: impl Into<String>) -> Self {
        Self {
            storage,
            currency: currency.into(),
        }
    }

    /// Look up an account by name
    pub async fn find(&self, name: &AccountName) -> Result<Option<Account>, LedgerError> {
        self.storage
            .account_by_name(name)
            .await
            .map_err(|e| LedgerError::store("find account", e))
    }

    /// Look up an account by id
    pub async fn get_by_id(&self, id: AccountId) -> Result<Option<Account>, LedgerError> {
        self.storage
            .account_by_id(id)
            .await
            .map_err(|e| LedgerError::store("get account", e))
    }

    /// Create an account with a zero balance
    ///
    /// # Errors
    ///
    /// * `LedgerError::DuplicateName` if the name is already registered
    /// * `LedgerError::Store` for any other storage failure
    pub async fn create(&self, name: &AccountName) -> Result<Account, LedgerError> {
        match self.storage.insert_account(name, &self.currency).await {
            Ok(account) => Ok(account),
            Err(StoreError::UniqueViolation { .. }) => {
                Err(LedgerError::DuplicateName { name: name.clone() })
            }
            Err(e) => Err(LedgerError::store("create account", e)),
        }
    }

    /// Hard-delete an account row
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::AccountNotFound` if the row is already gone.
    pub async fn delete(&self, account: &Account) -> Result<(), LedgerError> {
        let deleted = self
            .storage
            .delete_account(account.id)
            .await
            .map_err(|e| LedgerError::store("delete account", e))?;

        if deleted {
            Ok(())
        } else {
            Err(LedgerError::account_not_found(
                AccountRole::Lookup,
                account.name.as_str(),
            ))
        }
    }

    /// Credit `amount` to `account` and record the deposit
    ///
    /// The caller validates the amount; this method only performs the
    /// transactional write.
    pub async fn deposit(
        &self,
        account: &Account,
        amount: Decimal,
    ) -> Result<DepositReceipt, LedgerError> {
        let mut tx = self.begin("deposit").await?;
        match Self::deposit_in(&mut tx, account, amount).await {
            Ok(receipt) => {
                commit(tx, "deposit").await?;
                Ok(receipt)
            }
            Err(e) => {
                rollback(tx, "deposit").await;
                Err(e)
            }
        }
    }

    async fn deposit_in(
        tx: &mut S::Tx,
        account: &Account,
        amount: Decimal,
    ) -> Result<DepositReceipt, LedgerError> {
        let not_found = || LedgerError::account_not_found(AccountRole::Deposit, account.name.as_str());

        tx.lock_balance(account.id)
            .await
            .map_err(|e| LedgerError::store("deposit", e))?
            .ok_or_else(not_found)?;

        let balance = tx
            .add_to_balance(account.id, amount)
            .await
            .map_err(|e| match e {
                StoreError::RowNotFound { .. } => not_found(),
                other => LedgerError::store("deposit", other),
            })?;

        let payment = tx
            .insert_payment(None, account.id, amount)
            .await
            .map_err(|e| LedgerError::store("deposit", e))?;

        Ok(DepositReceipt { payment, balance })
    }

    /// Move `amount` from `from` to `to` and record the transfer
    ///
    /// The payer's balance is re-read under a row lock inside the transaction,
    /// so the check cannot be invalidated by a concurrent transfer.
    ///
    /// # Errors
    ///
    /// * `LedgerError::AccountNotFound` if either row disappeared
    /// * `LedgerError::InsufficientFunds` if the locked balance is below `amount`
    /// * `LedgerError::Store` for any other storage failure
    pub async fn transfer(
        &self,
        from: &Account,
        to: &Account,
        amount: Decimal,
    ) -> Result<Payment, LedgerError> {
        let mut tx = self.begin("transfer").await?;
        match Self::transfer_in(&mut tx, from, to, amount).await {
            Ok(payment) => {
                commit(tx, "transfer").await?;
                Ok(payment)
            }
            Err(e) => {
                rollback(tx, "transfer").await;
                Err(e)
            }
        }
    }

    async fn transfer_in(
        tx: &mut S::Tx,
        from: &Account,
        to: &Account,
        amount: Decimal,
    ) -> Result<Payment, LedgerError> {
        let missing = |id: AccountId| {
            if id == from.id {
                LedgerError::account_not_found(AccountRole::From, from.name.as_str())
            } else {
                LedgerError::account_not_found(AccountRole::To, to.name.as_str())
            }
        };

        let (first, second) = if from.id < to.id {
            (from.id, to.id)
        } else {
            (to.id, from.id)
        };

        let mut payer_balance = Decimal::ZERO;
        for id in [first, second] {
            let balance = tx
                .lock_balance(id)
                .await
                .map_err(|e| LedgerError::store("transfer", e))?
                .ok_or_else(|| missing(id))?;
            if id == from.id {
                payer_balance = balance;
            }
        }

        if payer_balance < amount {
            return Err(LedgerError::insufficient_funds(
                &from.name,
                payer_balance,
                amount,
            ));
        }

        let translate = |e: StoreError| match e {
            StoreError::RowNotFound { id, .. } => missing(id),
            StoreError::CheckViolation { .. } => {
                LedgerError::insufficient_funds(&from.name, payer_balance, amount)
            }
            other => LedgerError::store("transfer", other),
        };

        tx.add_to_balance(from.id, -amount).await.map_err(translate)?;
        tx.add_to_balance(to.id, amount).await.map_err(translate)?;

        tx.insert_payment(Some(from.id), to.id, amount)
            .await
            .map_err(|e| LedgerError::store("transfer", e))
    }

    /// Accounts ordered by id within `page`
    pub async fn list(&self, page: Page) -> Result<Vec<Account>, LedgerError> {
        self.storage
            .accounts(page)
            .await
            .map_err(|e| LedgerError::store("list accounts", e))
    }

    async fn begin(&self, operation: &'static str) -> Result<S::Tx, LedgerError> {
        self.storage
            .begin()
            .await
            .map_err(|e| LedgerError::store(operation, e))
    }
}

async fn commit<T: StorageTx>(tx: T, operation: &'static str) -> Result<(), LedgerError> {
    tx.commit()
        .await
        .map_err(|e| LedgerError::store(operation, e))?;
    debug!(operation, "transaction committed");
    Ok(())
}

async fn rollback<T: StorageTx>(tx: T, operation: &'static str) {
    if let Err(e) = tx.rollback().await {
        warn!(operation, error = %e, "rollback failed");
    }
}
