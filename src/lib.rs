pub mod amount;
pub mod config;
pub mod csv;
pub mod model;
pub mod processor;
pub mod store;

pub use amount::{Amount, AmountError};
pub use config::LedgerConfig;
pub use model::{Outcome, TransactionRecord, TransactionRequest, TxnState, UserId};
pub use processor::{RunSummary, TransactionError, TransactionProcessor};
pub use store::{LedgerError, LedgerStore, MemoryStore, PgStore};
