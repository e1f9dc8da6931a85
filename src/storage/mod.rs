//! Storage collaborator boundary
//!
//! The ledger never talks to a database directly. It consumes the narrow
//! transactional interface defined here:
//!
//! - [`Storage`] - point reads, listings, account creation/deletion, and
//!   opening transactions
//! - [`StorageTx`] - the balance and payment writes that must happen
//!   atomically, plus commit/rollback
//!
//! Backends form a closed set wrapped by [`Backend`], chosen once at startup
//! by [`open`]:
//!
//! - `memory` - in-process tables with serializable transactions
//! - `postgres` - PostgreSQL through sqlx (feature `postgres`)
//!
//! # Transaction Contract
//!
//! A transaction returned by [`Storage::begin`] must give the holder
//! exclusive access to any account row it reads with
//! [`StorageTx::lock_balance`] until commit or rollback, so two concurrent
//! debits of the same account can never both observe the pre-debit balance.
//! Dropping a transaction without committing rolls it back.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::config::{BackendKind, LedgerConfig};
use crate::types::{Account, AccountId, AccountName, Page, Payment, PaymentId, StoreError};

pub use memory::{MemoryStorage, MemoryTx};
#[cfg(feature = "postgres")]
pub use postgres::{PgStorage, PgTx};

/// Scope of a payment listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentFilter {
    /// Every payment in the ledger
    All,
    /// Payments where the account is payer or payee
    Account(AccountId),
}

/// Storage operations outside of a mutating transaction
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Transaction handle produced by [`Storage::begin`]
    type Tx: StorageTx;

    /// Open a transaction
    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    /// Look up an account by name
    async fn account_by_name(&self, name: &AccountName) -> Result<Option<Account>, StoreError>;

    /// Look up an account by id
    async fn account_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    /// Insert a new account with a zero balance
    ///
    /// Fails with `StoreError::UniqueViolation` if the name is taken.
    async fn insert_account(
        &self,
        name: &AccountName,
        currency: &str,
    ) -> Result<Account, StoreError>;

    /// Delete an account row, returning whether it existed
    async fn delete_account(&self, id: AccountId) -> Result<bool, StoreError>;

    /// Accounts ordered by id, in one round trip
    async fn accounts(&self, page: Page) -> Result<Vec<Account>, StoreError>;

    /// Look up a payment by id
    async fn payment_by_id(&self, id: PaymentId) -> Result<Option<Payment>, StoreError>;

    /// Payments in scope, ordered by id
    async fn payments(&self, filter: PaymentFilter, page: Page)
        -> Result<Vec<Payment>, StoreError>;

    /// Release backend resources
    async fn close(&self);
}

/// Writes performed inside one all-or-nothing unit
#[async_trait]
pub trait StorageTx: Send {
    /// Read an account balance and hold the row until the transaction ends
    ///
    /// Returns `None` if the account does not exist.
    async fn lock_balance(&mut self, id: AccountId) -> Result<Option<Decimal>, StoreError>;

    /// Add `delta` (possibly negative) to a balance and return the new value
    ///
    /// Fails with `StoreError::RowNotFound` for a missing account and with
    /// `StoreError::CheckViolation` if the balance would become negative.
    async fn add_to_balance(&mut self, id: AccountId, delta: Decimal)
        -> Result<Decimal, StoreError>;

    /// Append a payment; the store assigns its id and date
    async fn insert_payment(
        &mut self,
        from: Option<AccountId>,
        to: AccountId,
        amount: Decimal,
    ) -> Result<Payment, StoreError>;

    /// Make every write of this transaction visible
    async fn commit(self) -> Result<(), StoreError>;

    /// Undo every write of this transaction
    async fn rollback(self) -> Result<(), StoreError>;
}

/// Storage backend chosen at startup
#[derive(Debug)]
pub enum Backend {
    Memory(MemoryStorage),
    #[cfg(feature = "postgres")]
    Postgres(PgStorage),
}

/// Transaction of a [`Backend`]
pub enum BackendTx {
    Memory(MemoryTx),
    #[cfg(feature = "postgres")]
    Postgres(PgTx),
}

/// Open the backend selected by `config`
///
/// # Errors
///
/// Returns `StoreError::Backend` if the backend cannot be reached, or if
/// postgres was requested from a build without the `postgres` feature.
pub async fn open(config: &LedgerConfig) -> Result<Backend, StoreError> {
    match config.backend {
        BackendKind::Memory => Ok(Backend::Memory(MemoryStorage::new(
            config.operation_timeout,
        ))),
        #[cfg(feature = "postgres")]
        BackendKind::Postgres => Ok(Backend::Postgres(PgStorage::connect(config).await?)),
        #[cfg(not(feature = "postgres"))]
        BackendKind::Postgres => Err(StoreError::backend(
            "this build does not include the postgres backend",
        )),
    }
}

/// Dispatch a call to whichever backend variant is active
macro_rules! dispatch {
    ($value:expr, $inner:ident => $call:expr) => {
        match $value {
            Backend::Memory($inner) => $call,
            #[cfg(feature = "postgres")]
            Backend::Postgres($inner) => $call,
        }
    };
}

#[async_trait]
impl Storage for Backend {
    type Tx = BackendTx;

    async fn begin(&self) -> Result<BackendTx, StoreError> {
        match self {
            Backend::Memory(storage) => storage.begin().await.map(BackendTx::Memory),
            #[cfg(feature = "postgres")]
            Backend::Postgres(storage) => storage.begin().await.map(BackendTx::Postgres),
        }
    }

    async fn account_by_name(&self, name: &AccountName) -> Result<Option<Account>, StoreError> {
        dispatch!(self, s => s.account_by_name(name).await)
    }

    async fn account_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        dispatch!(self, s => s.account_by_id(id).await)
    }

    async fn insert_account(
        &self,
        name: &AccountName,
        currency: &str,
    ) -> Result<Account, StoreError> {
        dispatch!(self, s => s.insert_account(name, currency).await)
    }

    async fn delete_account(&self, id: AccountId) -> Result<bool, StoreError> {
        dispatch!(self, s => s.delete_account(id).await)
    }

    async fn accounts(&self, page: Page) -> Result<Vec<Account>, StoreError> {
        dispatch!(self, s => s.accounts(page).await)
    }

    async fn payment_by_id(&self, id: PaymentId) -> Result<Option<Payment>, StoreError> {
        dispatch!(self, s => s.payment_by_id(id).await)
    }

    async fn payments(
        &self,
        filter: PaymentFilter,
        page: Page,
    ) -> Result<Vec<Payment>, StoreError> {
        dispatch!(self, s => s.payments(filter, page).await)
    }

    async fn close(&self) {
        dispatch!(self, s => s.close().await)
    }
}

#[async_trait]
impl StorageTx for BackendTx {
    async fn lock_balance(&mut self, id: AccountId) -> Result<Option<Decimal>, StoreError> {
        match self {
            BackendTx::Memory(tx) => tx.lock_balance(id).await,
            #[cfg(feature = "postgres")]
            BackendTx::Postgres(tx) => tx.lock_balance(id).await,
        }
    }

    async fn add_to_balance(
        &mut self,
        id: AccountId,
        delta: Decimal,
    ) -> Result<Decimal, StoreError> {
        match self {
            BackendTx::Memory(tx) => tx.add_to_balance(id, delta).await,
            #[cfg(feature = "postgres")]
            BackendTx::Postgres(tx) => tx.add_to_balance(id, delta).await,
        }
    }

    async fn insert_payment(
        &mut self,
        from: Option<AccountId>,
        to: AccountId,
        amount: Decimal,
    ) -> Result<Payment, StoreError> {
        match self {
            BackendTx::Memory(tx) => tx.insert_payment(from, to, amount).await,
            #[cfg(feature = "postgres")]
            BackendTx::Postgres(tx) => tx.insert_payment(from, to, amount).await,
        }
    }

    async fn commit(self) -> Result<(), StoreError> {
        match self {
            BackendTx::Memory(tx) => tx.commit().await,
            #[cfg(feature = "postgres")]
            BackendTx::Postgres(tx) => tx.commit().await,
        }
    }

    async fn rollback(self) -> Result<(), StoreError> {
        match self {
            BackendTx::Memory(tx) => tx.rollback().await,
            #[cfg(feature = "postgres")]
            BackendTx::Postgres(tx) => tx.rollback().await,
        }
    }
}
