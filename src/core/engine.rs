//! Ledger orchestration
//!
//! This module provides the `LedgerEngine` struct, which validates requests
//! and orchestrates register/deposit/transfer/list operations against the
//! account and payment store adapters.
//!
//! # Architecture
//!
//! ```text
//! LedgerEngine
//!     ├── Arc<S: Storage>        (injected storage backend)
//!     ├── AccountStore<S>        (account rows, balance mutations)
//!     └── PaymentStore<S>        (payment history behind the read cache)
//! ```
//!
//! # Validation Order
//!
//! Transfers check, in order: self transfer, payer lookup, payee lookup,
//! amount, then the payer balance read inside the mutating transaction.
//! Deposits reject an invalid amount before touching storage. An amount is
//! valid when it is positive with at most four decimal places.
//!
//! # Thread Safety
//!
//! The engine is `Send + Sync` and is shared behind an `Arc` by the service
//! façade. Concurrent transfers are serialized by the storage row locks; the
//! engine holds no locks of its own.

use futures::stream::{self, Stream, TryStreamExt};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument};

use super::account_store::AccountStore;
use super::payment_store::{PaymentCache, PaymentStore};
use crate::storage::{Backend, Storage};
use crate::types::{
    is_valid_amount, Account, AccountId, AccountName, AccountRole, Direction, LedgerEntry,
    LedgerError, Page, Payment, PaymentId,
};

/// A committed transfer with the accounts it was resolved against
#[derive(Debug, Clone, PartialEq)]
pub struct TransferReceipt {
    pub payment: Payment,
    pub from: AccountName,
    pub to: AccountName,
}

/// Wallet ledger engine
#[derive(Debug)]
pub struct LedgerEngine<S = Backend> {
    storage: Arc<S>,
    accounts: AccountStore<S>,
    payments: PaymentStore<S>,
}

impl<S: Storage> LedgerEngine<S> {
    /// Create an engine over an opened storage backend
    ///
    /// # Arguments
    ///
    /// * `storage` - Storage backend, shared with the store adapters
    /// * `cache` - Read cache for payment lookups
    /// * `currency` - Currency assigned to newly registered accounts
    pub fn new(storage: Arc<S>, cache: Arc<PaymentCache>, currency: &str) -> Self {
        Self {
            accounts: AccountStore::new(Arc::clone(&storage), currency),
            payments: PaymentStore::new(Arc::clone(&storage), cache),
            storage,
        }
    }

    /// The storage backend this engine writes to
    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Register a new account with a zero balance
    ///
    /// # Errors
    ///
    /// * `LedgerError::InvalidName` if the name breaks the naming rule
    /// * `LedgerError::DuplicateName` if the name is taken
    /// * `LedgerError::Store` for any other storage failure
    #[instrument(skip(self), level = "debug")]
    pub async fn register_account(&self, name: &str) -> Result<Account, LedgerError> {
        let name = AccountName::parse(name)?;
        let account = self.accounts.create(&name).await?;
        info!(id = account.id, name = %account.name, "account registered");
        Ok(account)
    }

    /// Credit `amount` to the named account
    ///
    /// # Returns
    ///
    /// The account balance after the deposit.
    ///
    /// # Errors
    ///
    /// * `LedgerError::AmountInvalid` for an invalid amount, before any storage call
    /// * `LedgerError::AccountNotFound` if the name does not resolve
    /// * `LedgerError::Store` for any other storage failure
    #[instrument(skip(self), level = "debug")]
    pub async fn deposit(&self, name: &str, amount: Decimal) -> Result<Decimal, LedgerError> {
        if !is_valid_amount(amount) {
            return Err(LedgerError::AmountInvalid { amount });
        }

        let account = self.resolve(name, AccountRole::Deposit).await?;
        let touched = [account.id];
        let invalidation = self.payments.invalidate_on_drop(&touched);
        let receipt = self.accounts.deposit(&account, amount).await?;
        drop(invalidation);

        info!(
            payment = receipt.payment.id,
            account = %account.name,
            %amount,
            balance = %receipt.balance,
            "deposit committed"
        );
        Ok(receipt.balance)
    }

    /// Move `amount` from one account to another
    ///
    /// # Returns
    ///
    /// The committed payment with the payer and payee names.
    ///
    /// # Errors
    ///
    /// * `LedgerError::SelfTransfer` if both names address the same account
    /// * `LedgerError::AccountNotFound` for an unknown payer or payee
    /// * `LedgerError::AmountInvalid` for an invalid amount
    /// * `LedgerError::InsufficientFunds` if the payer cannot cover `amount`
    /// * `LedgerError::Store` for any other storage failure
    #[instrument(skip(self), level = "debug")]
    pub async fn transfer(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<TransferReceipt, LedgerError> {
        if from.eq_ignore_ascii_case(to) {
            return Err(LedgerError::SelfTransfer {
                name: from.to_string(),
            });
        }

        let payer = self.resolve(from, AccountRole::From).await?;
        let payee = self.resolve(to, AccountRole::To).await?;

        if !is_valid_amount(amount) {
            return Err(LedgerError::AmountInvalid { amount });
        }

        let touched = [payer.id, payee.id];
        let invalidation = self.payments.invalidate_on_drop(&touched);
        let payment = self.accounts.transfer(&payer, &payee, amount).await?;
        drop(invalidation);

        info!(
            payment = payment.id,
            from = %payer.name,
            to = %payee.name,
            %amount,
            "transfer committed"
        );
        Ok(TransferReceipt {
            payment,
            from: payer.name,
            to: payee.name,
        })
    }

    /// Snapshot of the named account
    pub async fn account(&self, name: &str) -> Result<Account, LedgerError> {
        self.resolve(name, AccountRole::Lookup).await
    }

    /// Snapshot of the account with the given id, if it still exists
    pub async fn account_by_id(&self, id: AccountId) -> Result<Option<Account>, LedgerError> {
        self.accounts.get_by_id(id).await
    }

    /// Hard-delete the named account
    ///
    /// Payments that reference the account keep its id; the name no longer
    /// resolves.
    #[instrument(skip(self), level = "debug")]
    pub async fn delete_account(&self, name: &str) -> Result<(), LedgerError> {
        let account = self.resolve(name, AccountRole::Lookup).await?;
        let touched = [account.id];
        let invalidation = self.payments.invalidate_on_drop(&touched);
        self.accounts.delete(&account).await?;
        drop(invalidation);
        info!(id = account.id, name = %account.name, "account deleted");
        Ok(())
    }

    /// Account names ordered by id
    ///
    /// # Arguments
    ///
    /// * `offset` - Number of accounts to skip, must be non-negative
    /// * `limit` - Maximum number of names, `-1` for no limit
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::OffsetLimitInvalid` for a malformed window.
    pub async fn list_accounts(
        &self,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<AccountName>, LedgerError> {
        let accounts = self.accounts(offset, limit).await?;
        Ok(accounts.into_iter().map(|account| account.name).collect())
    }

    /// Full account rows ordered by id, fetched in one storage call
    ///
    /// Takes the same window as [`LedgerEngine::list_accounts`].
    pub async fn accounts(&self, offset: i64, limit: i64) -> Result<Vec<Account>, LedgerError> {
        let page = Page::new(offset, limit)?;
        self.accounts.list(page).await
    }

    /// Lazily page through every account name
    ///
    /// Each page is fetched when the previous one is exhausted. The stream
    /// ends after the first short page and can be recreated to start over.
    pub fn account_names(
        &self,
        page_size: u64,
    ) -> impl Stream<Item = Result<AccountName, LedgerError>> + '_ {
        let page_size = page_size.max(1);

        stream::try_unfold(Some(0u64), move |next| async move {
            let Some(offset) = next else {
                return Ok::<_, LedgerError>(None);
            };

            let accounts = self.accounts.list(Page::bounded(offset, page_size)).await?;
            if accounts.is_empty() {
                return Ok(None);
            }

            let full = accounts.len() as u64 == page_size;
            let names: Vec<AccountName> = accounts.into_iter().map(|account| account.name).collect();
            let next = full.then_some(offset + page_size);
            Ok(Some((stream::iter(names.into_iter().map(Ok::<_, LedgerError>)), next)))
        })
        .try_flatten()
    }

    /// Payment history, annotated with direction
    ///
    /// With a name, only payments where that account is payer or payee are
    /// returned, each marked `incoming` or `outgoing` relative to it. Without
    /// one, the whole history is returned and every entry is `outgoing`.
    ///
    /// # Errors
    ///
    /// * `LedgerError::OffsetLimitInvalid` for a malformed window
    /// * `LedgerError::AccountNotFound` if the name does not resolve
    pub async fn list_payments(
        &self,
        name: Option<&str>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let page = Page::new(offset, limit)?;

        let Some(name) = name else {
            let payments = self.payments.list_all(page).await?;
            return Ok(payments
                .into_iter()
                .map(|payment| LedgerEntry {
                    payment,
                    direction: Direction::Outgoing,
                })
                .collect());
        };

        let account = self.resolve(name, AccountRole::Lookup).await?;
        let payments = self.payments.list_for_account(account.id, page).await?;
        Ok(payments
            .into_iter()
            .map(|payment| LedgerEntry {
                direction: payment.direction_for(account.id),
                payment,
            })
            .collect())
    }

    /// Look up a single payment
    pub async fn payment(&self, id: PaymentId) -> Result<Option<Payment>, LedgerError> {
        self.payments.get_by_id(id).await
    }

    /// Resolve a raw name to an account
    ///
    /// A name that breaks the naming rule cannot exist, so it is reported as
    /// not found for `role`.
    async fn resolve(&self, name: &str, role: AccountRole) -> Result<Account, LedgerError> {
        let not_found = || LedgerError::account_not_found(role, name);
        let parsed = AccountName::parse(name).map_err(|_| not_found())?;
        self.accounts.find(&parsed).await?.ok_or_else(not_found)
    }
}
