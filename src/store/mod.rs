//! Ledger store: the durable record of balances and applied transactions.
//!
//! The store owns consistency. Every backend must make the read-check-write
//! on one account a single critical section, and must enforce transaction id
//! uniqueness itself rather than relying on the caller's look-up.

use async_trait::async_trait;
use tracing::error;

use crate::Amount;
use crate::model::{TransactionRecord, UserId};

mod error;
pub use error::LedgerError;

mod memory;
pub use memory::MemoryStore;

mod postgres;
pub use postgres::PgStore;

/// Operations a ledger backend provides.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Current balance of `user`.
    async fn get_balance(&self, user: UserId) -> Result<Amount, LedgerError>;

    /// Look up an applied transaction. `Ok(None)` means "not applied yet".
    async fn find_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<TransactionRecord>, LedgerError>;

    /// Persist a transaction record; fails with
    /// [`LedgerError::DuplicateTransaction`] if the id is already taken.
    async fn record_transaction(&self, record: &TransactionRecord) -> Result<(), LedgerError>;

    /// Atomically add `delta` to the balance of `user` and return the new
    /// balance. Nothing is written if the result would be negative.
    async fn apply_delta(&self, user: UserId, delta: Amount) -> Result<Amount, LedgerError>;

    /// Provision zero-balance accounts for `users`; existing accounts are left
    /// untouched.
    async fn ensure_accounts(&self, users: &[UserId]) -> Result<(), LedgerError>;

    /// Apply the record's delta and persist the record as one unit.
    ///
    /// This provided version is NOT atomic: when the insert fails after the
    /// delta committed, the balance has moved without a record. That case is
    /// logged as an error and surfaced to the caller. Backends able to do
    /// better override it.
    async fn apply_transaction(&self, record: &TransactionRecord) -> Result<Amount, LedgerError> {
        let balance = self.apply_delta(record.user_id, record.delta()).await?;

        if let Err(e) = self.record_transaction(record).await {
            error!(
                user = record.user_id,
                txn = %record.transaction_id,
                delta = %record.delta(),
                reason = %e,
                "balance changed but transaction record was not written"
            );
            return Err(e);
        }

        Ok(balance)
    }

    /// Check that the backend is reachable.
    async fn health_check(&self) -> Result<(), LedgerError> {
        Ok(())
    }
}

/// Compute `balance + delta`, rejecting results that are negative or too
/// large to store.
pub(crate) fn next_balance(
    user: UserId,
    balance: Amount,
    delta: Amount,
) -> Result<Amount, LedgerError> {
    let next = balance
        .checked_add(delta)
        .ok_or(LedgerError::BalanceOverflow {
            user,
            balance,
            delta,
        })?;

    if next.is_negative() {
        return Err(LedgerError::InsufficientFunds {
            user,
            balance,
            delta,
        });
    }

    Ok(next)
}
