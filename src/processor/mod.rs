//! Transaction processor.
//!
//! Turns a raw [`TransactionRequest`] into exactly one balance change:
//! validate, check whether the id was already applied, then hand the signed
//! delta and the record to the store as one atomic unit. There is no retry
//! here; resubmitting the same request is safe and is the caller's call.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_stream::{Stream, StreamExt};
use tracing::{error, info, warn};

use crate::Amount;
use crate::model::{Outcome, TransactionRecord, TransactionRequest, TxnState, UserId};
use crate::store::{LedgerError, LedgerStore};

mod error;
pub use error::TransactionError;

/// Applies transaction requests against a shared [`LedgerStore`].
///
/// Cheap to clone; clones share the store.
pub struct TransactionProcessor<S> {
    store: Arc<S>,
    max_in_flight: usize,
}

impl<S> Clone for TransactionProcessor<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            max_in_flight: self.max_in_flight,
        }
    }
}

/// Public API
impl<S: LedgerStore + 'static> TransactionProcessor<S> {
    const DEFAULT_MAX_IN_FLIGHT: usize = 64;

    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            max_in_flight: Self::DEFAULT_MAX_IN_FLIGHT,
        }
    }

    /// Limit how many requests [`run`](Self::run) processes at once.
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Current balance of `user`.
    pub async fn balance(&self, user: UserId) -> Result<Amount, TransactionError> {
        Ok(self.store.get_balance(user).await?)
    }

    /// Apply a single transaction request.
    pub async fn process(
        &self,
        request: &TransactionRequest,
    ) -> Result<Outcome, TransactionError> {
        let result = self.apply(request).await;
        Self::log_result(request, &result);
        result
    }

    /// Process every request of `stream`, each on its own task, and tally
    /// the outcomes.
    ///
    /// Requests only share the store; requests for the same account are
    /// serialized by it, others run in parallel. Finished tasks are reaped
    /// as new ones are spawned, so at most `max_in_flight` results are held
    /// at once.
    pub async fn run(
        &self,
        mut stream: impl Stream<Item = TransactionRequest> + Unpin,
    ) -> RunSummary {
        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks = JoinSet::new();
        let mut summary = RunSummary::default();

        while let Some(request) = stream.next().await {
            let permit = Arc::clone(&permits)
                .acquire_owned()
                .await
                .expect("semaphore is never closed");
            let processor = self.clone();

            tasks.spawn(async move {
                let result = processor.process(&request).await;
                drop(permit);
                result
            });

            while let Some(joined) = tasks.try_join_next() {
                summary.tally(joined);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            summary.tally(joined);
        }
        summary
    }
}

/// Outcome counts of a [`TransactionProcessor::run`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub applied: usize,
    pub already_applied: usize,
    /// Refused by validation or the ledger rules; nothing was written.
    pub rejected: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn processed(&self) -> usize {
        self.applied + self.already_applied + self.rejected + self.failed
    }

    fn tally(&mut self, joined: Result<Result<Outcome, TransactionError>, JoinError>) {
        match joined {
            Ok(Ok(Outcome::Applied { .. })) => self.applied += 1,
            Ok(Ok(Outcome::AlreadyApplied)) => self.already_applied += 1,
            Ok(Err(e)) if e.is_rejection() => self.rejected += 1,
            Ok(Err(_)) => self.failed += 1,
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }
}

/// Private API
impl<S: LedgerStore + 'static> TransactionProcessor<S> {
    /// Steps, each terminal on failure:
    /// - source type and id present, state is `win` or `lose`
    /// - amount parses with at most 2 decimals
    /// - id not applied yet, otherwise `AlreadyApplied`
    /// - delta and record applied atomically by the store
    async fn apply(&self, request: &TransactionRequest) -> Result<Outcome, TransactionError> {
        if request.source_type.is_empty() {
            return Err(TransactionError::MissingSourceType);
        }
        if request.transaction_id.is_empty() {
            return Err(TransactionError::MissingTransactionId);
        }

        let state: TxnState = request
            .state
            .parse()
            .map_err(TransactionError::InvalidState)?;
        let amount = Amount::parse(&request.amount)?;

        // Fast path only; the store's uniqueness check is authoritative.
        if self
            .store
            .find_transaction(&request.transaction_id)
            .await?
            .is_some()
        {
            return Ok(Outcome::AlreadyApplied);
        }

        let record = TransactionRecord {
            transaction_id: request.transaction_id.clone(),
            user_id: request.user_id,
            state,
            amount,
            source_type: request.source_type.clone(),
            created_at: Utc::now(),
        };

        let balance = self.store.apply_transaction(&record).await?;
        Ok(Outcome::Applied { balance })
    }

    fn log_result(request: &TransactionRequest, result: &Result<Outcome, TransactionError>) {
        match result {
            Ok(Outcome::Applied { balance }) => {
                info!(
                    user = request.user_id,
                    txn = %request.transaction_id,
                    state = %request.state,
                    amount = %request.amount,
                    balance = %balance,
                    "transaction applied"
                );
            }
            Ok(outcome @ Outcome::AlreadyApplied) => {
                info!(
                    user = request.user_id,
                    txn = %request.transaction_id,
                    "transaction {}",
                    outcome.status()
                );
            }
            Err(e @ TransactionError::Ledger(LedgerError::DuplicateTransaction(_))) => {
                warn!(
                    user = request.user_id,
                    txn = %request.transaction_id,
                    reason = %e,
                    "concurrent submission won the insert, changes rolled back"
                );
            }
            Err(e) if e.is_rejection() => {
                info!(
                    user = request.user_id,
                    txn = %request.transaction_id,
                    reason = %e,
                    "transaction rejected"
                );
            }
            Err(e) => {
                error!(
                    user = request.user_id,
                    txn = %request.transaction_id,
                    reason = %e,
                    "transaction failed"
                );
            }
        }
    }
}
