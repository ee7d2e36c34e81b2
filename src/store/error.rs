//! Error types for ledger store operations.

use thiserror::Error;

use crate::Amount;
use crate::model::UserId;

/// Error returned by every [`LedgerStore`](super::LedgerStore) operation.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("account {0} not found")]
    AccountNotFound(UserId),

    #[error("insufficient funds for account {user}: balance {balance}, delta {delta}")]
    InsufficientFunds {
        user: UserId,
        balance: Amount,
        delta: Amount,
    },

    #[error("balance of account {user} would overflow: balance {balance}, delta {delta}")]
    BalanceOverflow {
        user: UserId,
        balance: Amount,
        delta: Amount,
    },

    #[error("duplicate transaction id {0}")]
    DuplicateTransaction(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] sqlx::Error),
}

impl LedgerError {
    /// Business-rule failures, as opposed to infrastructure failures.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, LedgerError::StorageUnavailable(_))
    }
}
