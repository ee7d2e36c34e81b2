//! Error types for transaction processing.

use thiserror::Error;

use crate::amount::AmountError;
use crate::store::LedgerError;

/// Top-level error returned by
/// [`TransactionProcessor::process`](super::TransactionProcessor::process).
///
/// Every variant except storage failures is a rejection of the request.
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("invalid state value '{0}'")]
    InvalidState(String),

    #[error("missing source type")]
    MissingSourceType,

    #[error("missing transaction id")]
    MissingTransactionId,

    #[error("invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),

    #[error("{0}")]
    Ledger(#[from] LedgerError),
}

impl TransactionError {
    /// True when the request itself was refused, false when the ledger could
    /// not be reached.
    pub fn is_rejection(&self) -> bool {
        match self {
            TransactionError::Ledger(e) => e.is_rejection(),
            _ => true,
        }
    }

    /// Whether a caller should report this as its own mistake (4xx) rather
    /// than a server failure (5xx). A duplicate detected at insert time is a
    /// conflict, not a client error.
    pub fn is_client_error(&self) -> bool {
        match self {
            TransactionError::Ledger(LedgerError::DuplicateTransaction(_)) => false,
            other => other.is_rejection(),
        }
    }
}
