//! Payment store adapter with read-through caching
//!
//! Payment listings are served from the [`ReadCache`] whenever possible. Each
//! listing scope (one account, or the whole ledger) is cached under a single
//! key holding the full ordered list, and the requested offset/limit window is
//! sliced from it:
//!
//! | Scope | Key | Expiry |
//! |-------|-----|--------|
//! | One account | `payments:account:<id>` | never |
//! | Whole ledger | `payments:all` | never |
//! | One payment | `payment:<id>` | default TTL |
//!
//! # Invalidation
//!
//! Every deposit or transfer arms an [`InvalidationGuard`] for the touched
//! accounts before it starts. The guard invalidates when it is dropped, which
//! happens after the commit returns, after a failure, or when the caller
//! cancels the write while the commit is in flight.
//!
//! Invalidation bumps a generation counter before deleting the keys. A reader
//! that filled the cache re-checks the counter after storing its listing and
//! drops the entry if a write raced with its query, so a listing read before a
//! commit is never left behind after it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::cache::{CacheError, Expiry, ReadCache};
use crate::storage::{PaymentFilter, Storage};
use crate::types::{AccountId, LedgerError, Page, Payment, PaymentId};

/// Value stored in the payment cache
#[derive(Debug, Clone)]
pub enum CachedPayments {
    One(Payment),
    List(Arc<[Payment]>),
}

/// Cache used by [`PaymentStore`]
pub type PaymentCache = ReadCache<CachedPayments>;

fn list_key(filter: PaymentFilter) -> String {
    match filter {
        PaymentFilter::All => "payments:all".to_string(),
        PaymentFilter::Account(id) => format!("payments:account:{id}"),
    }
}

fn payment_key(id: PaymentId) -> String {
    format!("payment:{id}")
}

/// Reads payment history through the cache
#[derive(Debug)]
pub struct PaymentStore<S> {
    storage: Arc<S>,
    cache: Arc<PaymentCache>,
    generation: AtomicU64,
}

impl<S: Storage> PaymentStore<S> {
    pub fn new(storage: Arc<S>, cache: Arc<PaymentCache>) -> Self {
        Self {
            storage,
            cache,
            generation: AtomicU64::new(0),
        }
    }

    /// Look up one payment, caching hits with the default TTL
    pub async fn get_by_id(&self, id: PaymentId) -> Result<Option<Payment>, LedgerError> {
        let key = payment_key(id);
        if let Some(CachedPayments::One(payment)) = self.cache.get(&key) {
            trace!(%key, "cache hit");
            return Ok(Some(payment));
        }

        let payment = self
            .storage
            .payment_by_id(id)
            .await
            .map_err(|e| LedgerError::store("get payment", e))?;

        // Payments are immutable, so a point entry never needs invalidation.
        if let Some(payment) = &payment {
            self.cache
                .set(key, CachedPayments::One(payment.clone()), Expiry::Default);
        }
        Ok(payment)
    }

    /// Payments where `account` is payer or payee, ordered by id
    pub async fn list_for_account(
        &self,
        account: AccountId,
        page: Page,
    ) -> Result<Vec<Payment>, LedgerError> {
        let all = self.scope(PaymentFilter::Account(account)).await?;
        Ok(page.slice(&all))
    }

    /// Every payment in the ledger, ordered by id
    pub async fn list_all(&self, page: Page) -> Result<Vec<Payment>, LedgerError> {
        let all = self.scope(PaymentFilter::All).await?;
        Ok(page.slice(&all))
    }

    async fn scope(&self, filter: PaymentFilter) -> Result<Arc<[Payment]>, LedgerError> {
        let key = list_key(filter);
        if let Some(CachedPayments::List(list)) = self.cache.get(&key) {
            trace!(%key, "cache hit");
            return Ok(list);
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let list: Arc<[Payment]> = self
            .storage
            .payments(filter, Page::ALL)
            .await
            .map_err(|e| LedgerError::store("list payments", e))?
            .into();

        if self.generation.load(Ordering::SeqCst) == generation {
            self.cache
                .set(key.clone(), CachedPayments::List(Arc::clone(&list)), Expiry::Never);
            if self.generation.load(Ordering::SeqCst) != generation {
                let _ = self.cache.delete(&key);
            }
        }
        Ok(list)
    }
}

impl<S> PaymentStore<S> {
    /// Invalidate the listings of `accounts` once the returned guard drops
    pub fn invalidate_on_drop<'a>(
        &'a self,
        accounts: &'a [AccountId],
    ) -> InvalidationGuard<'a, S> {
        InvalidationGuard {
            store: self,
            accounts,
        }
    }

    /// Drop the cached listings of every touched account and the global one
    pub fn invalidate(&self, accounts: &[AccountId]) {
        self.generation.fetch_add(1, Ordering::SeqCst);

        let keys = accounts
            .iter()
            .map(|&id| list_key(PaymentFilter::Account(id)))
            .chain(std::iter::once(list_key(PaymentFilter::All)));

        for key in keys {
            match self.cache.delete(&key) {
                Ok(()) => debug!(%key, "cache entry invalidated"),
                Err(CacheError::KeyNotFound { .. }) => {}
            }
        }
    }
}

/// Pending invalidation of the listings a write touches
#[must_use = "the listings are invalidated when the guard is dropped"]
pub struct InvalidationGuard<'a, S> {
    store: &'a PaymentStore<S>,
    accounts: &'a [AccountId],
}

impl<S> Drop for InvalidationGuard<'_, S> {
    fn drop(&mut self) {
        self.store.invalidate(self.accounts);
    }
}
