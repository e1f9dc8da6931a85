//! Service façade
//!
//! `LedgerService` is the surface a boundary layer (HTTP handlers, the batch
//! CLI) calls. It forwards to the [`LedgerEngine`] and reduces every outcome to
//! the closed [`ServiceError`] taxonomy: callers never see storage text or
//! engine context. Unclassified failures are logged here with their full
//! context and surface as [`ServiceError::Internal`].
//!
//! Results are rendered as plain views ([`AccountView`], [`PaymentView`]) that
//! name accounts instead of exposing store ids.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

use crate::core::{LedgerEngine, TransferReceipt};
use crate::storage::{Backend, Storage};
use crate::types::{
    Account, AccountId, AccountRole, Direction, LedgerEntry, LedgerError, Payment, PaymentId,
};

/// Domain error returned to callers of the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("invalid name format")]
    InvalidName,

    #[error("create account error: duplicate name")]
    DuplicateName,

    #[error("{0} account not found")]
    AccountNotFound(AccountRole),

    #[error("error in amount value")]
    AmountInvalid,

    #[error("disable transfer to self account")]
    SelfTransfer,

    #[error("no enough money")]
    InsufficientFunds,

    #[error("error in offset, limit params")]
    OffsetLimitInvalid,

    #[error("internal service error")]
    Internal,
}

/// Account as shown to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountView {
    pub name: String,
    pub balance: Decimal,
    pub currency: String,
}

impl From<Account> for AccountView {
    fn from(account: Account) -> Self {
        Self {
            name: account.name.into(),
            balance: account.balance,
            currency: account.currency,
        }
    }
}

/// Payment as shown to callers
///
/// `account` is always the perspective account of the listing: the payer of an
/// outgoing entry, the payee of an incoming one. `to_account` is the
/// counterparty. Names that no longer resolve (deleted accounts, the external
/// side of a deposit) are rendered empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentView {
    pub id: PaymentId,
    pub account: String,
    pub to_account: String,
    pub amount: Decimal,
    pub direction: Direction,
    pub date: DateTime<Utc>,
}

/// Façade over the ledger engine
#[derive(Debug)]
pub struct LedgerService<S = Backend> {
    engine: Arc<LedgerEngine<S>>,
}

impl<S> Clone for LedgerService<S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<S: Storage> LedgerService<S> {
    pub fn new(engine: Arc<LedgerEngine<S>>) -> Self {
        Self { engine }
    }

    /// The engine behind this façade
    pub fn engine(&self) -> &Arc<LedgerEngine<S>> {
        &self.engine
    }

    /// Register an account
    pub async fn create_account(&self, name: &str) -> Result<AccountView, ServiceError> {
        self.engine
            .register_account(name)
            .await
            .map(AccountView::from)
            .map_err(|e| classify("create_account", e))
    }

    /// Deposit into an account, returning the new balance
    pub async fn deposit(&self, name: &str, amount: Decimal) -> Result<Decimal, ServiceError> {
        self.engine
            .deposit(name, amount)
            .await
            .map_err(|e| classify("deposit", e))
    }

    /// Transfer between two accounts, returning the payment as seen by the payer
    ///
    /// The view is built from the names the transfer resolved, so no storage
    /// call follows the commit.
    pub async fn transfer(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<PaymentView, ServiceError> {
        let TransferReceipt { payment, from, to } = self
            .engine
            .transfer(from, to, amount)
            .await
            .map_err(|e| classify("transfer", e))?;

        Ok(PaymentView {
            id: payment.id,
            account: from.into(),
            to_account: to.into(),
            amount: payment.amount,
            direction: Direction::Outgoing,
            date: payment.date,
        })
    }

    /// One account
    pub async fn account(&self, name: &str) -> Result<AccountView, ServiceError> {
        self.engine
            .account(name)
            .await
            .map(AccountView::from)
            .map_err(|e| classify("account", e))
    }

    /// Delete an account
    pub async fn delete_account(&self, name: &str) -> Result<(), ServiceError> {
        self.engine
            .delete_account(name)
            .await
            .map_err(|e| classify("delete_account", e))
    }

    /// Accounts ordered by registration, with balances
    pub async fn accounts_list(
        &self,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<AccountView>, ServiceError> {
        let accounts = self
            .engine
            .accounts(offset, limit)
            .await
            .map_err(|e| classify("accounts_list", e))?;
        Ok(accounts.into_iter().map(AccountView::from).collect())
    }

    /// Payment history of one account, or of the whole ledger
    pub async fn payments_list(
        &self,
        name: Option<&str>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<PaymentView>, ServiceError> {
        let entries = self
            .engine
            .list_payments(name, offset, limit)
            .await
            .map_err(|e| classify("payments_list", e))?;
        self.render(entries, "payments_list").await
    }

    /// One payment, rendered from the payer's side
    pub async fn payment(&self, id: PaymentId) -> Result<Option<PaymentView>, ServiceError> {
        let payment = self
            .engine
            .payment(id)
            .await
            .map_err(|e| classify("payment", e))?;

        let Some(payment) = payment else {
            return Ok(None);
        };
        let entry = LedgerEntry {
            payment,
            direction: Direction::Outgoing,
        };
        let mut views = self.render(vec![entry], "payment").await?;
        Ok(views.pop())
    }

    async fn render(
        &self,
        entries: Vec<LedgerEntry>,
        operation: &'static str,
    ) -> Result<Vec<PaymentView>, ServiceError> {
        let mut names: HashMap<AccountId, String> = HashMap::new();
        let mut views = Vec::with_capacity(entries.len());

        for LedgerEntry { payment, direction } in entries {
            let Payment {
                id,
                date,
                amount,
                from,
                to,
            } = payment;
            let (account, counterparty) = match direction {
                Direction::Outgoing => (from, Some(to)),
                Direction::Incoming => (Some(to), from),
            };

            views.push(PaymentView {
                id,
                account: self.name_of(account, &mut names, operation).await?,
                to_account: self.name_of(counterparty, &mut names, operation).await?,
                amount,
                direction,
                date,
            });
        }
        Ok(views)
    }

    async fn name_of(
        &self,
        id: Option<AccountId>,
        names: &mut HashMap<AccountId, String>,
        operation: &'static str,
    ) -> Result<String, ServiceError> {
        let Some(id) = id else {
            return Ok(String::new());
        };
        if let Some(name) = names.get(&id) {
            return Ok(name.clone());
        }

        let name = self
            .engine
            .account_by_id(id)
            .await
            .map_err(|e| classify(operation, e))?
            .map(|account| String::from(account.name))
            .unwrap_or_default();
        names.insert(id, name.clone());
        Ok(name)
    }
}

/// Reduce an engine error to the service taxonomy
fn classify(operation: &'static str, err: LedgerError) -> ServiceError {
    if err.is_internal() {
        error!(operation, error = %err, "internal failure");
        return ServiceError::Internal;
    }

    let mapped = match &err {
        LedgerError::InvalidName { .. } => ServiceError::InvalidName,
        LedgerError::DuplicateName { .. } => ServiceError::DuplicateName,
        LedgerError::AccountNotFound { role, .. } => ServiceError::AccountNotFound(*role),
        LedgerError::AmountInvalid { .. } => ServiceError::AmountInvalid,
        LedgerError::SelfTransfer { .. } => ServiceError::SelfTransfer,
        LedgerError::InsufficientFunds { .. } => ServiceError::InsufficientFunds,
        LedgerError::OffsetLimitInvalid { .. } => ServiceError::OffsetLimitInvalid,
        LedgerError::Store { .. } => ServiceError::Internal,
    };
    debug!(operation, error = %err, "request rejected");
    mapped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PaymentCache;
    use crate::storage::{MemoryStorage, MemoryTx, PaymentFilter};
    use crate::types::{AccountName, Page, StoreError};
    use async_trait::async_trait;
    use rstest::rstest;
    use std::time::Duration;

    /// Memory storage whose lookups by id always time out
    #[derive(Debug, Default)]
    struct FailingIdLookups(MemoryStorage);

    #[async_trait]
    impl Storage for FailingIdLookups {
        type Tx = MemoryTx;

        async fn begin(&self) -> Result<MemoryTx, StoreError> {
            self.0.begin().await
        }

        async fn account_by_name(
            &self,
            name: &AccountName,
        ) -> Result<Option<Account>, StoreError> {
            self.0.account_by_name(name).await
        }

        async fn account_by_id(&self, _id: AccountId) -> Result<Option<Account>, StoreError> {
            Err(StoreError::Timeout)
        }

        async fn insert_account(
            &self,
            name: &AccountName,
            currency: &str,
        ) -> Result<Account, StoreError> {
            self.0.insert_account(name, currency).await
        }

        async fn delete_account(&self, id: AccountId) -> Result<bool, StoreError> {
            self.0.delete_account(id).await
        }

        async fn accounts(&self, page: Page) -> Result<Vec<Account>, StoreError> {
            self.0.accounts(page).await
        }

        async fn payment_by_id(&self, id: PaymentId) -> Result<Option<Payment>, StoreError> {
            self.0.payment_by_id(id).await
        }

        async fn payments(
            &self,
            filter: PaymentFilter,
            page: Page,
        ) -> Result<Vec<Payment>, StoreError> {
            self.0.payments(filter, page).await
        }

        async fn close(&self) {}
    }

    fn service() -> (Arc<MemoryStorage>, LedgerService<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::default());
        let cache = Arc::new(PaymentCache::new(Duration::from_secs(60)));
        let engine = LedgerEngine::new(Arc::clone(&storage), cache, "usd");
        (storage, LedgerService::new(Arc::new(engine)))
    }

    fn dec(value: i64) -> Decimal {
        Decimal::new(value, 0)
    }

    #[rstest]
    #[case::invalid_name(LedgerError::invalid_name("x"), ServiceError::InvalidName)]
    #[case::from_not_found(
        LedgerError::account_not_found(AccountRole::From, "ghost"),
        ServiceError::AccountNotFound(AccountRole::From)
    )]
    #[case::amount(LedgerError::AmountInvalid { amount: dec(0) }, ServiceError::AmountInvalid)]
    #[case::window(LedgerError::OffsetLimitInvalid { offset: -1, limit: 0 }, ServiceError::OffsetLimitInvalid)]
    #[case::store(LedgerError::store("transfer", StoreError::Timeout), ServiceError::Internal)]
    fn test_classify(#[case] error: LedgerError, #[case] expected: ServiceError) {
        assert_eq!(classify("test", error), expected);
    }

    #[rstest]
    #[case::from(ServiceError::AccountNotFound(AccountRole::From), "from account not found")]
    #[case::to(ServiceError::AccountNotFound(AccountRole::To), "to account not found")]
    #[case::funds(ServiceError::InsufficientFunds, "no enough money")]
    #[case::internal(ServiceError::Internal, "internal service error")]
    fn test_messages(#[case] error: ServiceError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[tokio::test]
    async fn test_store_text_never_leaks() {
        let (storage, service) = service();
        service.create_account("alice").await.unwrap();
        service.create_account("bobby").await.unwrap();
        service.deposit("alice", dec(10)).await.unwrap();

        storage.fail_next_payment_insert();
        let result = service.transfer("alice", "bobby", dec(5)).await;

        assert_eq!(result, Err(ServiceError::Internal));
        assert_eq!(service.account("alice").await.unwrap().balance, dec(10));
    }

    #[tokio::test]
    async fn test_committed_transfer_needs_no_lookup_by_id() {
        let storage = Arc::new(FailingIdLookups::default());
        let cache = Arc::new(PaymentCache::new(Duration::from_secs(60)));
        let engine = LedgerEngine::new(Arc::clone(&storage), cache, "usd");
        let service = LedgerService::new(Arc::new(engine));
        service.create_account("alice").await.unwrap();
        service.create_account("bobby").await.unwrap();
        service.deposit("alice", dec(10)).await.unwrap();

        let view = service.transfer("alice", "bobby", dec(4)).await.unwrap();

        assert_eq!(view.account, "alice");
        assert_eq!(view.to_account, "bobby");
        assert_eq!(service.account("alice").await.unwrap().balance, dec(6));
        // Listings still need names by id, and report the failure.
        assert_eq!(
            service.payments_list(Some("alice"), 0, -1).await,
            Err(ServiceError::Internal)
        );
    }

    #[tokio::test]
    async fn test_accounts_list_skips_id_lookups() {
        let storage = Arc::new(FailingIdLookups::default());
        let cache = Arc::new(PaymentCache::new(Duration::from_secs(60)));
        let service = LedgerService::new(Arc::new(LedgerEngine::new(storage, cache, "usd")));
        service.create_account("alice").await.unwrap();
        service.deposit("alice", dec(2)).await.unwrap();

        let views = service.accounts_list(0, -1).await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].balance, dec(2));
    }

    #[tokio::test]
    async fn test_transfer_view() {
        let (_, service) = service();
        service.create_account("alice").await.unwrap();
        service.create_account("bobby").await.unwrap();
        service.deposit("alice", dec(10)).await.unwrap();

        let view = service.transfer("Alice", "bobby", dec(4)).await.unwrap();

        assert_eq!(view.account, "alice");
        assert_eq!(view.to_account, "bobby");
        assert_eq!(view.amount, dec(4));
        assert_eq!(view.direction, Direction::Outgoing);
    }

    #[tokio::test]
    async fn test_payments_list_perspective() {
        let (_, service) = service();
        service.create_account("alice").await.unwrap();
        service.create_account("bobby").await.unwrap();
        service.deposit("alice", dec(10)).await.unwrap();
        service.transfer("alice", "bobby", dec(4)).await.unwrap();

        let bob = service.payments_list(Some("bobby"), 0, -1).await.unwrap();
        assert_eq!(bob.len(), 1);
        assert_eq!(bob[0].account, "bobby");
        assert_eq!(bob[0].to_account, "alice");
        assert_eq!(bob[0].direction, Direction::Incoming);

        let alice = service.payments_list(Some("alice"), 0, -1).await.unwrap();
        // The deposit has no payer to name.
        assert_eq!(alice[0].account, "alice");
        assert_eq!(alice[0].to_account, "");
        assert_eq!(alice[1].to_account, "bobby");

        let all = service.payments_list(None, 0, -1).await.unwrap();
        assert_eq!(all[0].account, "");
        assert_eq!(all[0].to_account, "alice");
    }

    #[tokio::test]
    async fn test_deleted_counterparty_rendered_empty() {
        let (_, service) = service();
        service.create_account("alice").await.unwrap();
        service.create_account("bobby").await.unwrap();
        service.deposit("alice", dec(10)).await.unwrap();
        service.transfer("alice", "bobby", dec(4)).await.unwrap();
        service.delete_account("bobby").await.unwrap();

        let alice = service.payments_list(Some("alice"), 0, -1).await.unwrap();
        assert_eq!(alice[1].to_account, "");
        assert_eq!(
            service.payments_list(Some("bobby"), 0, -1).await,
            Err(ServiceError::AccountNotFound(AccountRole::Lookup))
        );
    }

    #[tokio::test]
    async fn test_accounts_list_with_balances() {
        let (_, service) = service();
        for name in ["alice", "bobby", "carol"] {
            service.create_account(name).await.unwrap();
        }
        service.deposit("bobby", dec(3)).await.unwrap();

        let views = service.accounts_list(1, 1).await.unwrap();
        assert_eq!(
            views,
            vec![AccountView {
                name: "bobby".to_string(),
                balance: dec(3),
                currency: "usd".to_string(),
            }]
        );
        assert_eq!(
            service.accounts_list(-1, 1).await,
            Err(ServiceError::OffsetLimitInvalid)
        );
    }

    #[tokio::test]
    async fn test_payment_lookup() {
        let (_, service) = service();
        service.create_account("alice").await.unwrap();
        service.deposit("alice", dec(10)).await.unwrap();

        let view = service.payment(1).await.unwrap().unwrap();
        assert_eq!(view.account, "");
        assert_eq!(view.to_account, "alice");
        assert_eq!(service.payment(2).await, Ok(None));
    }

    #[tokio::test]
    async fn test_duplicate_and_invalid_names() {
        let (_, service) = service();
        service.create_account("alice").await.unwrap();

        assert_eq!(
            service.create_account("ALICE").await,
            Err(ServiceError::DuplicateName)
        );
        assert_eq!(service.create_account("a!").await, Err(ServiceError::InvalidName));
    }
}
