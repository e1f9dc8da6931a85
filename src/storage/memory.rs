//! In-process storage backend
//!
//! `MemoryStorage` keeps the `accounts` and `payments` tables in memory behind
//! a single async mutex. A transaction owns the mutex guard for its whole
//! lifetime, which makes transactions fully serializable: the balance a
//! transfer reads cannot change until that transfer commits or rolls back.
//!
//! Writes inside a transaction are applied in place and recorded in an undo
//! log. Rolling back, or dropping the transaction without committing (for
//! example when the caller's deadline cancels the operation), replays the
//! undo log in reverse.
//!
//! Every lock acquisition is bounded by the configured operation timeout.
//!
//! The backend also carries a small fault plan so tests can make the next
//! payment insert fail or stall, or acknowledge the next commit late.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};

use super::{PaymentFilter, Storage, StorageTx};
use crate::types::{Account, AccountId, AccountName, Page, Payment, PaymentId, StoreError};

const ACCOUNTS_TABLE: &str = "accounts";
const NAME_CONSTRAINT: &str = "accounts_name";
const BALANCE_CONSTRAINT: &str = "accounts_balance_non_negative";

#[derive(Debug, Clone)]
struct AccountRow {
    name: AccountName,
    balance: Decimal,
    currency: String,
}

impl AccountRow {
    fn to_account(&self, id: AccountId) -> Account {
        Account {
            id,
            name: self.name.clone(),
            balance: self.balance,
            currency: self.currency.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Tables {
    accounts: BTreeMap<AccountId, AccountRow>,
    names: HashMap<AccountName, AccountId>,
    payments: BTreeMap<PaymentId, Payment>,
    last_account_id: AccountId,
    last_payment_id: PaymentId,
}

/// Faults to inject into the next payment insert
#[derive(Debug, Default)]
struct FaultPlan {
    fail_payment_insert: AtomicBool,
    payment_insert_delay: StdMutex<Option<Duration>>,
    commit_delay: StdMutex<Option<Duration>>,
}

impl FaultPlan {
    fn arm(slot: &StdMutex<Option<Duration>>, delay: Duration) {
        if let Ok(mut slot) = slot.lock() {
            *slot = Some(delay);
        }
    }

    fn take(slot: &StdMutex<Option<Duration>>) -> Option<Duration> {
        slot.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// In-memory storage backend
#[derive(Debug)]
pub struct MemoryStorage {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<FaultPlan>,
    operation_timeout: Duration,
}

impl MemoryStorage {
    /// Create empty tables
    ///
    /// # Arguments
    ///
    /// * `operation_timeout` - Upper bound for acquiring the table lock
    pub fn new(operation_timeout: Duration) -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            faults: Arc::new(FaultPlan::default()),
            operation_timeout,
        }
    }

    /// Make the next payment insert fail with `StoreError::Fault`
    pub fn fail_next_payment_insert(&self) {
        self.faults.fail_payment_insert.store(true, Ordering::SeqCst);
    }

    /// Make the next payment insert sleep for `delay` before writing
    pub fn stall_next_payment_insert(&self, delay: Duration) {
        FaultPlan::arm(&self.faults.payment_insert_delay, delay);
    }

    /// Make the next commit sleep for `delay` after its writes became visible
    pub fn stall_next_commit(&self, delay: Duration) {
        FaultPlan::arm(&self.faults.commit_delay, delay);
    }

    /// Sum of all account balances
    pub async fn total_balance(&self) -> Result<Decimal, StoreError> {
        let tables = self.read().await?;
        Ok(tables.accounts.values().map(|row| row.balance).sum())
    }

    async fn read(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        tokio::time::timeout(self.operation_timeout, self.tables.lock())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, StoreError> {
        let tables = tokio::time::timeout(self.operation_timeout, self.tables.clone().lock_owned())
            .await
            .map_err(|_| StoreError::Timeout)?;

        Ok(MemoryTx {
            tables,
            undo: Vec::new(),
            faults: self.faults.clone(),
            finished: false,
        })
    }

    async fn account_by_name(&self, name: &AccountName) -> Result<Option<Account>, StoreError> {
        let tables = self.read().await?;
        Ok(tables
            .names
            .get(name)
            .and_then(|id| tables.accounts.get(id).map(|row| row.to_account(*id))))
    }

    async fn account_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let tables = self.read().await?;
        Ok(tables.accounts.get(&id).map(|row| row.to_account(id)))
    }

    async fn insert_account(
        &self,
        name: &AccountName,
        currency: &str,
    ) -> Result<Account, StoreError> {
        let mut tables = self.read().await?;
        if tables.names.contains_key(name) {
            return Err(StoreError::UniqueViolation {
                constraint: NAME_CONSTRAINT.to_string(),
            });
        }

        tables.last_account_id += 1;
        let id = tables.last_account_id;
        let row = AccountRow {
            name: name.clone(),
            balance: Decimal::ZERO,
            currency: currency.to_string(),
        };
        let account = row.to_account(id);
        tables.accounts.insert(id, row);
        tables.names.insert(name.clone(), id);
        Ok(account)
    }

    async fn delete_account(&self, id: AccountId) -> Result<bool, StoreError> {
        let mut tables = self.read().await?;
        match tables.accounts.remove(&id) {
            Some(row) => {
                tables.names.remove(&row.name);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn accounts(&self, page: Page) -> Result<Vec<Account>, StoreError> {
        let tables = self.read().await?;
        let accounts: Vec<Account> = tables
            .accounts
            .iter()
            .map(|(id, row)| row.to_account(*id))
            .collect();
        Ok(page.slice(&accounts))
    }

    async fn payment_by_id(&self, id: PaymentId) -> Result<Option<Payment>, StoreError> {
        let tables = self.read().await?;
        Ok(tables.payments.get(&id).cloned())
    }

    async fn payments(
        &self,
        filter: PaymentFilter,
        page: Page,
    ) -> Result<Vec<Payment>, StoreError> {
        let tables = self.read().await?;
        let matching: Vec<Payment> = tables
            .payments
            .values()
            .filter(|payment| match filter {
                PaymentFilter::All => true,
                PaymentFilter::Account(id) => payment.involves(id),
            })
            .cloned()
            .collect();
        Ok(page.slice(&matching))
    }

    async fn close(&self) {}
}

enum Undo {
    Balance { id: AccountId, previous: Decimal },
    Payment { id: PaymentId },
}

/// Transaction over the in-memory tables
///
/// Holds the table lock until it is committed, rolled back, or dropped.
pub struct MemoryTx {
    tables: OwnedMutexGuard<Tables>,
    undo: Vec<Undo>,
    faults: Arc<FaultPlan>,
    finished: bool,
}

impl MemoryTx {
    fn revert(&mut self) {
        while let Some(entry) = self.undo.pop() {
            match entry {
                Undo::Balance { id, previous } => {
                    if let Some(row) = self.tables.accounts.get_mut(&id) {
                        row.balance = previous;
                    }
                }
                Undo::Payment { id } => {
                    self.tables.payments.remove(&id);
                }
            }
        }
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if !self.finished {
            self.revert();
        }
    }
}

#[async_trait]
impl StorageTx for MemoryTx {
    async fn lock_balance(&mut self, id: AccountId) -> Result<Option<Decimal>, StoreError> {
        // The whole table set is already held exclusively.
        Ok(self.tables.accounts.get(&id).map(|row| row.balance))
    }

    async fn add_to_balance(
        &mut self,
        id: AccountId,
        delta: Decimal,
    ) -> Result<Decimal, StoreError> {
        let row = self
            .tables
            .accounts
            .get_mut(&id)
            .ok_or(StoreError::RowNotFound {
                table: ACCOUNTS_TABLE,
                id,
            })?;

        let updated = row
            .balance
            .checked_add(delta)
            .ok_or_else(|| StoreError::backend("numeric overflow in balance update"))?;
        if updated < Decimal::ZERO {
            return Err(StoreError::CheckViolation {
                constraint: BALANCE_CONSTRAINT.to_string(),
            });
        }

        let previous = row.balance;
        row.balance = updated;
        self.undo.push(Undo::Balance { id, previous });
        Ok(updated)
    }

    async fn insert_payment(
        &mut self,
        from: Option<AccountId>,
        to: AccountId,
        amount: Decimal,
    ) -> Result<Payment, StoreError> {
        if let Some(delay) = FaultPlan::take(&self.faults.payment_insert_delay) {
            tokio::time::sleep(delay).await;
        }
        if self.faults.fail_payment_insert.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Fault {
                stage: "payment insert",
            });
        }

        // Ids are never reused, even when the insert is rolled back.
        self.tables.last_payment_id += 1;
        let payment = Payment {
            id: self.tables.last_payment_id,
            date: Utc::now(),
            amount,
            from,
            to,
        };
        self.tables.payments.insert(payment.id, payment.clone());
        self.undo.push(Undo::Payment { id: payment.id });
        Ok(payment)
    }

    async fn commit(self) -> Result<(), StoreError> {
        let delay = FaultPlan::take(&self.faults.commit_delay);
        let mut tx = self;
        tx.undo.clear();
        tx.finished = true;
        // Releases the tables: the writes are visible from here on.
        drop(tx);

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        let mut tx = self;
        tx.revert();
        tx.finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(raw: &str) -> AccountName {
        AccountName::parse(raw).unwrap()
    }

    async fn storage_with(names: &[&str]) -> (MemoryStorage, Vec<Account>) {
        let storage = MemoryStorage::default();
        let mut accounts = Vec::new();
        for raw in names {
            accounts.push(storage.insert_account(&name(raw), "usd").await.unwrap());
        }
        (storage, accounts)
    }

    #[tokio::test]
    async fn test_insert_assigns_sequential_ids() {
        let (_, accounts) = storage_with(&["alice", "bobby", "carol"]).await;
        let ids: Vec<AccountId> = accounts.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(accounts.iter().all(|a| a.balance == Decimal::ZERO));
    }

    #[tokio::test]
    async fn test_insert_duplicate_name_violates_unique_constraint() {
        let (storage, _) = storage_with(&["alice"]).await;
        let result = storage.insert_account(&name("alice"), "usd").await;
        assert_eq!(
            result,
            Err(StoreError::UniqueViolation {
                constraint: NAME_CONSTRAINT.to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_delete_frees_name() {
        let (storage, accounts) = storage_with(&["alice"]).await;
        assert!(storage.delete_account(accounts[0].id).await.unwrap());
        assert!(!storage.delete_account(accounts[0].id).await.unwrap());
        assert_eq!(storage.account_by_name(&name("alice")).await.unwrap(), None);

        let again = storage.insert_account(&name("alice"), "usd").await.unwrap();
        assert_eq!(again.id, 2);
    }

    #[tokio::test]
    async fn test_accounts_ordered_by_id_with_window() {
        let (storage, created) = storage_with(&["zeta1", "alpha", "mike1"]).await;
        let all = storage.accounts(Page::ALL).await.unwrap();
        assert_eq!(all, created);

        let window = storage.accounts(Page::bounded(1, 1)).await.unwrap();
        assert_eq!(window, vec![created[1].clone()]);
    }

    #[tokio::test]
    async fn test_commit_keeps_writes() {
        let (storage, accounts) = storage_with(&["alice"]).await;
        let id = accounts[0].id;

        let mut tx = storage.begin().await.unwrap();
        let balance = tx.add_to_balance(id, Decimal::new(10, 0)).await.unwrap();
        let payment = tx.insert_payment(None, id, Decimal::new(10, 0)).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(balance, Decimal::new(10, 0));
        assert_eq!(storage.payment_by_id(payment.id).await.unwrap(), Some(payment));
        assert_eq!(storage.total_balance().await.unwrap(), Decimal::new(10, 0));
    }

    #[tokio::test]
    async fn test_rollback_undoes_writes() {
        let (storage, accounts) = storage_with(&["alice"]).await;
        let id = accounts[0].id;

        let mut tx = storage.begin().await.unwrap();
        tx.add_to_balance(id, Decimal::new(10, 0)).await.unwrap();
        tx.insert_payment(None, id, Decimal::new(10, 0)).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(storage.total_balance().await.unwrap(), Decimal::ZERO);
        assert!(storage.payments(PaymentFilter::All, Page::ALL).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let (storage, accounts) = storage_with(&["alice"]).await;
        let id = accounts[0].id;

        {
            let mut tx = storage.begin().await.unwrap();
            tx.add_to_balance(id, Decimal::new(10, 0)).await.unwrap();
        }

        let account = storage.account_by_id(id).await.unwrap().unwrap();
        assert_eq!(account.balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_negative_balance_violates_check_constraint() {
        let (storage, accounts) = storage_with(&["alice"]).await;
        let mut tx = storage.begin().await.unwrap();
        let result = tx.add_to_balance(accounts[0].id, Decimal::new(-1, 0)).await;
        assert_eq!(
            result,
            Err(StoreError::CheckViolation {
                constraint: BALANCE_CONSTRAINT.to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_missing_row_reported() {
        let (storage, _) = storage_with(&[]).await;
        let mut tx = storage.begin().await.unwrap();
        assert_eq!(tx.lock_balance(42).await.unwrap(), None);
        assert_eq!(
            tx.add_to_balance(42, Decimal::ONE).await,
            Err(StoreError::RowNotFound {
                table: ACCOUNTS_TABLE,
                id: 42
            })
        );
    }

    #[tokio::test]
    async fn test_injected_fault_fires_once() {
        let (storage, accounts) = storage_with(&["alice"]).await;
        storage.fail_next_payment_insert();

        let mut tx = storage.begin().await.unwrap();
        let first = tx.insert_payment(None, accounts[0].id, Decimal::ONE).await;
        assert_eq!(first, Err(StoreError::Fault { stage: "payment insert" }));
        assert!(tx.insert_payment(None, accounts[0].id, Decimal::ONE).await.is_ok());
    }

    #[tokio::test]
    async fn test_stalled_commit_is_visible_before_it_returns() {
        let storage = Arc::new(MemoryStorage::default());
        let alice = storage.insert_account(&name("alice"), "usd").await.unwrap();
        storage.stall_next_commit(Duration::from_millis(500));

        let mut tx = storage.begin().await.unwrap();
        tx.add_to_balance(alice.id, Decimal::TEN).await.unwrap();
        let pending = tokio::spawn(tx.commit());
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(storage.total_balance().await.unwrap(), Decimal::TEN);
        pending.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_operations_time_out_while_transaction_is_open() {
        let storage = MemoryStorage::new(Duration::from_millis(50));
        let _tx = storage.begin().await.unwrap();

        assert_eq!(storage.begin().await.err(), Some(StoreError::Timeout));
        assert_eq!(
            storage.account_by_id(1).await,
            Err(StoreError::Timeout)
        );
    }

    #[tokio::test]
    async fn test_payments_filtered_by_account() {
        let (storage, accounts) = storage_with(&["alice", "bobby", "carol"]).await;
        let (a, b, c) = (accounts[0].id, accounts[1].id, accounts[2].id);

        let mut tx = storage.begin().await.unwrap();
        tx.insert_payment(None, a, Decimal::ONE).await.unwrap();
        tx.insert_payment(Some(a), b, Decimal::ONE).await.unwrap();
        tx.insert_payment(None, c, Decimal::ONE).await.unwrap();
        tx.commit().await.unwrap();

        let for_a = storage.payments(PaymentFilter::Account(a), Page::ALL).await.unwrap();
        let for_b = storage.payments(PaymentFilter::Account(b), Page::ALL).await.unwrap();
        let all = storage.payments(PaymentFilter::All, Page::bounded(1, 5)).await.unwrap();

        assert_eq!(for_a.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(for_b.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2]);
        assert_eq!(all.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2, 3]);
    }
}
