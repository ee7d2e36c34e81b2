//! Core domain types for the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Amount;

/// User (account) identifier, supplied by the caller.
pub type UserId = u64;

/// Whether a transaction credits or debits the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxnState {
    Win,
    Lose,
}

impl TxnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxnState::Win => "win",
            TxnState::Lose => "lose",
        }
    }

    /// Signed balance change for `amount` in this state.
    pub fn delta(&self, amount: Amount) -> Amount {
        match self {
            TxnState::Win => amount,
            TxnState::Lose => -amount,
        }
    }
}

impl FromStr for TxnState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "win" => Ok(TxnState::Win),
            "lose" => Ok(TxnState::Lose),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for TxnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An incoming, not yet validated, transaction submission.
///
/// `state` and `amount` are kept as raw text: validating them is the
/// processor's job.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransactionRequest {
    pub user_id: UserId,
    pub source_type: String,
    pub state: String,
    pub amount: String,
    pub transaction_id: String,
}

/// A transaction as persisted by the store once applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub transaction_id: String,
    pub user_id: UserId,
    pub state: TxnState,
    /// Amount as submitted, never the signed delta.
    pub amount: Amount,
    pub source_type: String,
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn delta(&self) -> Amount {
        self.state.delta(self.amount)
    }
}

/// Successful terminal states of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The transaction was applied; carries the resulting balance.
    Applied { balance: Amount },
    /// A transaction with the same id was applied earlier.
    AlreadyApplied,
}

impl Outcome {
    /// Status text reported to callers.
    pub fn status(&self) -> &'static str {
        match self {
            Outcome::Applied { .. } => "success",
            Outcome::AlreadyApplied => "already processed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_from_str() {
        assert_eq!("win".parse::<TxnState>(), Ok(TxnState::Win));
        assert_eq!("lose".parse::<TxnState>(), Ok(TxnState::Lose));
        assert_eq!("WIN".parse::<TxnState>(), Err("WIN".to_string()));
        assert!("".parse::<TxnState>().is_err());
    }

    #[test]
    fn state_delta_sign() {
        let amount = Amount::from_cents(500);
        assert_eq!(TxnState::Win.delta(amount), Amount::from_cents(500));
        assert_eq!(TxnState::Lose.delta(amount), Amount::from_cents(-500));
    }

    #[test]
    fn record_keeps_unsigned_amount() {
        let record = TransactionRecord {
            transaction_id: "txn-1".to_string(),
            user_id: 1,
            state: TxnState::Lose,
            amount: Amount::from_cents(250),
            source_type: "game".to_string(),
            created_at: Utc::now(),
        };
        assert_eq!(record.amount, Amount::from_cents(250));
        assert_eq!(record.delta(), Amount::from_cents(-250));
    }

    #[test]
    fn outcome_status_text() {
        assert_eq!(
            Outcome::Applied { balance: Amount::ZERO }.status(),
            "success"
        );
        assert_eq!(Outcome::AlreadyApplied.status(), "already processed");
    }
}
