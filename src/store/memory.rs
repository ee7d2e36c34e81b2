use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use super::{LedgerError, LedgerStore, next_balance};
use crate::Amount;
use crate::model::{TransactionRecord, UserId};

/// In-process ledger store.
///
/// Each account balance sits behind its own mutex, so updates to one account
/// are serialized while different accounts proceed independently. The lock
/// is never held across an await point.
#[derive(Debug, Default)]
pub struct MemoryStore {
    accounts: DashMap<UserId, Arc<Mutex<Amount>>>,
    transactions: DashMap<String, TransactionRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with zero-balance accounts for `users`.
    pub fn with_accounts(users: &[UserId]) -> Self {
        let store = Self::new();
        store.provision(users);
        store
    }

    /// Number of applied transactions.
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    fn provision(&self, users: &[UserId]) {
        for &user in users {
            self.accounts
                .entry(user)
                .or_insert_with(|| Arc::new(Mutex::new(Amount::ZERO)));
        }
    }

    /// Clone the account handle out so the map shard is not held while the
    /// balance lock is.
    fn account(&self, user: UserId) -> Result<Arc<Mutex<Amount>>, LedgerError> {
        self.accounts
            .get(&user)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(LedgerError::AccountNotFound(user))
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn get_balance(&self, user: UserId) -> Result<Amount, LedgerError> {
        let account = self.account(user)?;
        let balance = *account.lock();
        Ok(balance)
    }

    async fn find_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<TransactionRecord>, LedgerError> {
        Ok(self
            .transactions
            .get(transaction_id)
            .map(|entry| entry.value().clone()))
    }

    async fn record_transaction(&self, record: &TransactionRecord) -> Result<(), LedgerError> {
        if !self.accounts.contains_key(&record.user_id) {
            return Err(LedgerError::AccountNotFound(record.user_id));
        }

        match self.transactions.entry(record.transaction_id.clone()) {
            Entry::Occupied(_) => Err(LedgerError::DuplicateTransaction(
                record.transaction_id.clone(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn apply_delta(&self, user: UserId, delta: Amount) -> Result<Amount, LedgerError> {
        let account = self.account(user)?;
        let mut balance = account.lock();

        let next = next_balance(user, *balance, delta)?;
        *balance = next;

        Ok(next)
    }

    async fn ensure_accounts(&self, users: &[UserId]) -> Result<(), LedgerError> {
        self.provision(users);
        debug!(count = users.len(), "accounts provisioned");
        Ok(())
    }

    /// Lock order is always account, then transaction slot. The balance is
    /// written only once the id has been claimed, so a duplicate leaves it
    /// untouched.
    async fn apply_transaction(&self, record: &TransactionRecord) -> Result<Amount, LedgerError> {
        let account = self.account(record.user_id)?;
        let mut balance = account.lock();

        let next = next_balance(record.user_id, *balance, record.delta())?;

        match self.transactions.entry(record.transaction_id.clone()) {
            Entry::Occupied(_) => Err(LedgerError::DuplicateTransaction(
                record.transaction_id.clone(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                *balance = next;
                Ok(next)
            }
        }
    }
}
