//! Postgres-backed storage implementation.
//!
//! Persists accounts and payments in PostgreSQL through a sqlx connection
//! pool. Balance mutations run inside a database transaction that locks the
//! touched account rows with `SELECT ... FOR UPDATE`, so concurrent debits of
//! the same account are serialized by the database.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `UniqueViolation` |
//! | Database (check violation) | `23514` | `CheckViolation` |
//! | Database (serialization failure / deadlock) | `40001` / `40P01` | `Conflict` |
//! | Database (query canceled by statement timeout) | `57014` | `Timeout` |
//! | PoolTimedOut | N/A | `Timeout` |
//! | Anything else | Any other | `Backend` |
//!
//! ## Timeouts
//!
//! Pool acquisition uses the configured operation timeout, and every
//! connection sets `statement_timeout` to the same bound.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::str::FromStr;
use tracing::{info, instrument};

use super::{PaymentFilter, Storage, StorageTx};
use crate::config::LedgerConfig;
use crate::types::{Account, AccountId, AccountName, Page, Payment, PaymentId, StoreError};

/// Schema the backend expects, created by [`PgStorage::ensure_schema`]
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS accounts
(
    id bigserial NOT NULL,
    name character varying(32) NOT NULL,
    balance numeric(22,4) NOT NULL DEFAULT 0,
    currency character varying NOT NULL,
    CONSTRAINT accounts_pk PRIMARY KEY (id),
    CONSTRAINT accounts_name UNIQUE (name),
    CONSTRAINT accounts_balance_non_negative CHECK (balance >= 0)
);
CREATE TABLE IF NOT EXISTS payments
(
    id bigserial NOT NULL,
    "from" bigint NULL,
    "to" bigint NOT NULL,
    amount numeric(22,4) NOT NULL,
    date timestamp with time zone NOT NULL DEFAULT now(),
    CONSTRAINT payments_pk PRIMARY KEY (id),
    CONSTRAINT payments_amount_positive CHECK (amount > 0)
);
CREATE INDEX IF NOT EXISTS payments_from_to_idx ON payments ("from", "to");
"#;

/// Postgres storage backend
#[derive(Debug, Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    /// Connect a pool using the database URL and timeouts from `config`
    pub async fn connect(config: &LedgerConfig) -> Result<Self, StoreError> {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| StoreError::backend("database url is not configured"))?;

        let statement_timeout = config.operation_timeout.as_millis().to_string();
        let options = PgConnectOptions::from_str(url)
            .map_err(map_sqlx_error)?
            .options([("statement_timeout", statement_timeout.as_str())]);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.operation_timeout)
            .connect_with(options)
            .await
            .map_err(map_sqlx_error)?;

        info!(max_connections = config.max_connections, "connected to postgres");
        Ok(Self { pool })
    }

    /// Create the ledger tables if they do not exist yet
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

fn account_from_row(row: &PgRow) -> Result<Account, sqlx::Error> {
    Ok(Account {
        id: row.try_get("id")?,
        name: AccountName::from_stored(row.try_get("name")?),
        balance: row.try_get("balance")?,
        currency: row.try_get("currency")?,
    })
}

fn payment_from_row(row: &PgRow) -> Result<Payment, sqlx::Error> {
    Ok(Payment {
        id: row.try_get("id")?,
        date: row.try_get::<DateTime<Utc>, _>("date")?,
        amount: row.try_get("amount")?,
        from: row.try_get("from")?,
        to: row.try_get("to")?,
    })
}

/// `LIMIT NULL` disables the row cap in Postgres.
fn page_bounds(page: Page) -> (i64, Option<i64>) {
    let offset = i64::try_from(page.offset).unwrap_or(i64::MAX);
    let limit = page.limit.map(|limit| i64::try_from(limit).unwrap_or(i64::MAX));
    (offset, limit)
}

fn map_sqlx_error(error: sqlx::Error) -> StoreError {
    match error {
        sqlx::Error::Database(db) => {
            let constraint = db.constraint().unwrap_or("unknown").to_string();
            match db.code().as_deref() {
                Some("23505") => StoreError::UniqueViolation { constraint },
                Some("23514") => StoreError::CheckViolation { constraint },
                Some("40001") | Some("40P01") => StoreError::Conflict {
                    message: db.message().to_string(),
                },
                Some("57014") => StoreError::Timeout,
                _ => StoreError::backend(db.message()),
            }
        }
        sqlx::Error::PoolTimedOut => StoreError::Timeout,
        other => StoreError::backend(other),
    }
}

#[async_trait]
impl Storage for PgStorage {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx, StoreError> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(PgTx { tx })
    }

    #[instrument(skip(self), fields(name = %name), err)]
    async fn account_by_name(&self, name: &AccountName) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query("SELECT id, name, balance, currency FROM accounts WHERE name = $1")
            .bind(name.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref()
            .map(account_from_row)
            .transpose()
            .map_err(map_sqlx_error)
    }

    async fn account_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query("SELECT id, name, balance, currency FROM accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref()
            .map(account_from_row)
            .transpose()
            .map_err(map_sqlx_error)
    }

    #[instrument(skip(self), fields(name = %name), err)]
    async fn insert_account(
        &self,
        name: &AccountName,
        currency: &str,
    ) -> Result<Account, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO accounts (name, balance, currency)
            VALUES ($1, 0, $2)
            RETURNING id, name, balance, currency
            "#,
        )
        .bind(name.as_str())
        .bind(currency)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        account_from_row(&row).map_err(map_sqlx_error)
    }

    async fn delete_account(&self, id: AccountId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn accounts(&self, page: Page) -> Result<Vec<Account>, StoreError> {
        let (offset, limit) = page_bounds(page);
        let rows = sqlx::query(
            "SELECT id, name, balance, currency FROM accounts ORDER BY id OFFSET $1 LIMIT $2",
        )
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter()
            .map(account_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sqlx_error)
    }

    async fn payment_by_id(&self, id: PaymentId) -> Result<Option<Payment>, StoreError> {
        let row = sqlx::query(r#"SELECT id, "from", "to", amount, date FROM payments WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref()
            .map(payment_from_row)
            .transpose()
            .map_err(map_sqlx_error)
    }

    #[instrument(skip(self), err)]
    async fn payments(
        &self,
        filter: PaymentFilter,
        page: Page,
    ) -> Result<Vec<Payment>, StoreError> {
        let account = match filter {
            PaymentFilter::All => None,
            PaymentFilter::Account(id) => Some(id),
        };
        let (offset, limit) = page_bounds(page);

        let rows = sqlx::query(
            r#"
            SELECT id, "from", "to", amount, date
            FROM payments
            WHERE $1::bigint IS NULL OR "from" = $1 OR "to" = $1
            ORDER BY id
            OFFSET $2
            LIMIT $3
            "#,
        )
        .bind(account)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter()
            .map(payment_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sqlx_error)
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("postgres pool closed");
    }
}

/// Database transaction on a pooled connection
///
/// sqlx rolls the transaction back when it is dropped uncommitted.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StorageTx for PgTx {
    async fn lock_balance(&mut self, id: AccountId) -> Result<Option<Decimal>, StoreError> {
        let row = sqlx::query("SELECT balance FROM accounts WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        row.map(|row| row.try_get::<Decimal, _>("balance"))
            .transpose()
            .map_err(map_sqlx_error)
    }

    async fn add_to_balance(
        &mut self,
        id: AccountId,
        delta: Decimal,
    ) -> Result<Decimal, StoreError> {
        let row = sqlx::query("UPDATE accounts SET balance = balance + $2 WHERE id = $1 RETURNING balance")
            .bind(id)
            .bind(delta)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?
            .ok_or(StoreError::RowNotFound {
                table: "accounts",
                id,
            })?;
        row.try_get::<Decimal, _>("balance").map_err(map_sqlx_error)
    }

    async fn insert_payment(
        &mut self,
        from: Option<AccountId>,
        to: AccountId,
        amount: Decimal,
    ) -> Result<Payment, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO payments ("from", "to", amount, date)
            VALUES ($1, $2, $3, now())
            RETURNING id, "from", "to", amount, date
            "#,
        )
        .bind(from)
        .bind(to)
        .bind(amount)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        payment_from_row(&row).map_err(map_sqlx_error)
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(map_sqlx_error)
    }
}
