//! Replay a csv file of win/lose transactions against the ledger and print
//! the resulting balances.
//!
//! ```bash
//! wager-ledger transactions.csv > balances.csv
//! ```
//!
//! The store and concurrency are configured through `LEDGER_*` variables
//! (see `config.rs`); `RUST_LOG` controls log verbosity (default `warn`).

use std::env;
use std::io;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use thiserror::Error;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wager_ledger::config::{Backend, ConfigError};
use wager_ledger::csv::{CsvError, read_requests, write_balances};
use wager_ledger::{
    LedgerConfig, LedgerError, LedgerStore, MemoryStore, PgStore, TransactionProcessor,
};

#[derive(Debug, Error)]
enum AppError {
    #[error("usage: wager-ledger <transactions.csv>")]
    Usage,
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Ledger(#[from] LedgerError),
    #[error("{0}")]
    Csv(#[from] CsvError),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), AppError> {
    let path = env::args().nth(1).ok_or(AppError::Usage)?;
    if !path.ends_with(".csv") {
        warn!(path, "input file seems to not be a csv file");
    }

    let config = LedgerConfig::from_env()?;

    match config.backend {
        Backend::Memory => replay(Arc::new(MemoryStore::new()), &config, &path).await,
        Backend::Postgres => {
            let store = Arc::new(PgStore::connect(&config.database).await?);
            store.migrate().await?;
            let result = replay(Arc::clone(&store), &config, &path).await;
            store.close().await;
            result
        }
    }
}

async fn replay<S: LedgerStore + 'static>(
    store: Arc<S>,
    config: &LedgerConfig,
    path: &str,
) -> Result<(), AppError> {
    store.ensure_accounts(&config.bootstrap_users).await?;

    let requests = read_requests(Path::new(path))?;
    let processor = TransactionProcessor::new(store).with_max_in_flight(config.max_in_flight);
    let (req_sender, req_receiver) = tokio::sync::mpsc::channel(config.max_in_flight);

    let reader = tokio::task::spawn_blocking(move || {
        for result in requests {
            match result {
                Ok(request) => {
                    if req_sender.blocking_send(request).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    // outcomes are logged by the processor
    let summary = processor.run(ReceiverStream::new(req_receiver)).await;
    if let Err(e) = reader.await {
        warn!(error = %e, "csv reader task failed");
    }

    info!(
        processed = summary.processed(),
        applied = summary.applied,
        already_applied = summary.already_applied,
        rejected = summary.rejected,
        failed = summary.failed,
        "replay finished"
    );

    let mut users = config.bootstrap_users.clone();
    users.sort_unstable();
    users.dedup();

    let mut balances = Vec::with_capacity(users.len());
    for user in users {
        balances.push((user, processor.store().get_balance(user).await?));
    }

    write_balances(io::stdout().lock(), balances)?;
    Ok(())
}
