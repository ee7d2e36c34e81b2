//! PostgreSQL ledger store.
//!
//! Balances live in `users`, applied transactions in `transactions`. A
//! balance change locks its row with `SELECT ... FOR UPDATE` inside a
//! database transaction, and the transaction record is inserted in that same
//! database transaction, so a uniqueness violation rolls the balance back.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::{PgConnection, Row};
use std::time::Duration;
use tracing::{debug, info};

use super::{LedgerError, LedgerStore, next_balance};
use crate::Amount;
use crate::config::DatabaseConfig;
use crate::model::{TransactionRecord, TxnState, UserId};

const CREATE_USERS: &str = r#"
    CREATE TABLE IF NOT EXISTS users (
        user_id BIGINT PRIMARY KEY,
        balance NUMERIC(12, 2) NOT NULL DEFAULT 0 CHECK (balance >= 0),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#;

const CREATE_TRANSACTIONS: &str = r#"
    CREATE TABLE IF NOT EXISTS transactions (
        id BIGSERIAL PRIMARY KEY,
        transaction_id TEXT UNIQUE NOT NULL,
        user_id BIGINT NOT NULL REFERENCES users (user_id),
        state VARCHAR(10) NOT NULL,
        amount NUMERIC(12, 2) NOT NULL CHECK (amount >= 0),
        source_type TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#;

// Upgrades tables created with the earlier VARCHAR(255)/VARCHAR(50) columns.
const WIDEN_TRANSACTIONS: &str = r#"
    ALTER TABLE transactions
        ALTER COLUMN transaction_id TYPE TEXT,
        ALTER COLUMN source_type TYPE TEXT"#;

/// Ledger store backed by a PostgreSQL connection pool.
///
/// The pool is owned here: opened by [`PgStore::connect`], released by
/// [`PgStore::close`].
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Open a connection pool and check the database answers.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, LedgerError> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.name);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.health_check().await?;

        info!(
            host = %config.host,
            port = config.port,
            database = %config.name,
            "PostgreSQL connection pool established"
        );
        Ok(store)
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `users` and `transactions` tables if they are missing.
    pub async fn migrate(&self) -> Result<(), LedgerError> {
        sqlx::query(CREATE_USERS).execute(&self.pool).await?;
        sqlx::query(CREATE_TRANSACTIONS).execute(&self.pool).await?;
        sqlx::query(WIDEN_TRANSACTIONS).execute(&self.pool).await?;
        debug!("ledger schema ready");
        Ok(())
    }

    /// Close every pooled connection, waiting for checked-out ones.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("PostgreSQL connection pool closed");
    }
}

/// Ids beyond `i64::MAX` cannot exist in a BIGINT column.
fn db_user_id(user: UserId) -> Result<i64, LedgerError> {
    i64::try_from(user).map_err(|_| LedgerError::AccountNotFound(user))
}

/// Read and lock the balance row of `user` for the rest of the database
/// transaction.
async fn lock_balance(conn: &mut PgConnection, user: UserId) -> Result<Amount, LedgerError> {
    let balance: Option<Decimal> =
        sqlx::query_scalar("SELECT balance FROM users WHERE user_id = $1 FOR UPDATE")
            .bind(db_user_id(user)?)
            .fetch_optional(conn)
            .await?;

    balance
        .map(Amount::from_decimal)
        .ok_or(LedgerError::AccountNotFound(user))
}

async fn write_balance(
    conn: &mut PgConnection,
    user: UserId,
    balance: Amount,
) -> Result<(), LedgerError> {
    sqlx::query("UPDATE users SET balance = $1 WHERE user_id = $2")
        .bind(balance.as_decimal())
        .bind(db_user_id(user)?)
        .execute(conn)
        .await?;
    Ok(())
}

async fn insert_record(
    conn: &mut PgConnection,
    record: &TransactionRecord,
) -> Result<(), LedgerError> {
    sqlx::query(
        r#"
        INSERT INTO transactions (transaction_id, user_id, state, amount, source_type, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(&record.transaction_id)
    .bind(db_user_id(record.user_id)?)
    .bind(record.state.as_str())
    .bind(record.amount.as_decimal())
    .bind(&record.source_type)
    .bind(record.created_at)
    .execute(conn)
    .await
    .map_err(|e| insert_error(e, record))?;
    Ok(())
}

/// Translate constraint violations on insert into ledger errors.
fn insert_error(err: sqlx::Error, record: &TransactionRecord) -> LedgerError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return LedgerError::DuplicateTransaction(record.transaction_id.clone());
        }
        if db_err.is_foreign_key_violation() {
            return LedgerError::AccountNotFound(record.user_id);
        }
    }
    LedgerError::StorageUnavailable(err)
}

fn record_from_row(row: &PgRow) -> Result<TransactionRecord, sqlx::Error> {
    let state: String = row.try_get("state")?;
    let state = state
        .parse::<TxnState>()
        .map_err(|s| sqlx::Error::ColumnDecode {
            index: "state".to_string(),
            source: format!("unknown transaction state '{s}'").into(),
        })?;

    Ok(TransactionRecord {
        transaction_id: row.try_get("transaction_id")?,
        user_id: row.try_get::<i64, _>("user_id")? as UserId,
        state,
        amount: Amount::from_decimal(row.try_get("amount")?),
        source_type: row.try_get("source_type")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn get_balance(&self, user: UserId) -> Result<Amount, LedgerError> {
        let balance: Option<Decimal> =
            sqlx::query_scalar("SELECT balance FROM users WHERE user_id = $1")
                .bind(db_user_id(user)?)
                .fetch_optional(&self.pool)
                .await?;

        balance
            .map(Amount::from_decimal)
            .ok_or(LedgerError::AccountNotFound(user))
    }

    async fn find_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<TransactionRecord>, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT transaction_id, user_id, state, amount, source_type, created_at
            FROM transactions WHERE transaction_id = $1
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(record_from_row).transpose()?)
    }

    async fn record_transaction(&self, record: &TransactionRecord) -> Result<(), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        insert_record(&mut conn, record).await
    }

    async fn apply_delta(&self, user: UserId, delta: Amount) -> Result<Amount, LedgerError> {
        // dropping `tx` on any early return rolls back and releases the row lock
        let mut tx = self.pool.begin().await?;

        let balance = lock_balance(&mut tx, user).await?;
        let next = next_balance(user, balance, delta)?;
        write_balance(&mut tx, user, next).await?;

        tx.commit().await?;
        Ok(next)
    }

    async fn ensure_accounts(&self, users: &[UserId]) -> Result<(), LedgerError> {
        let ids = users
            .iter()
            .map(|&user| db_user_id(user))
            .collect::<Result<Vec<_>, _>>()?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO users (user_id, balance)
            SELECT id, 0 FROM UNNEST($1::BIGINT[]) AS id
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(&ids)
        .execute(&self.pool)
        .await?
        .rows_affected();

        debug!(requested = ids.len(), inserted, "accounts provisioned");
        Ok(())
    }

    async fn apply_transaction(&self, record: &TransactionRecord) -> Result<Amount, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let balance = lock_balance(&mut tx, record.user_id).await?;
        let next = next_balance(record.user_id, balance, record.delta())?;
        write_balance(&mut tx, record.user_id, next).await?;
        insert_record(&mut tx, record).await?;

        tx.commit().await?;
        Ok(next)
    }

    async fn health_check(&self) -> Result<(), LedgerError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
