use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::{Amount, TransactionRequest, UserId};

/// Errors that can occur when reading or writing csv
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("failed to open {path}: {source}")]
    Open { path: String, source: csv::Error },

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("failed to write output: {0}")]
    Write(#[from] csv::Error),

    #[error("failed to flush output: {0}")]
    Flush(#[from] io::Error),
}

#[derive(Debug, Deserialize)]
struct InputRow {
    user_id: UserId,
    source_type: String,
    state: String,
    amount: String,
    transaction_id: String,
}

#[derive(Debug, Serialize)]
struct OutputRow {
    user_id: UserId,
    balance: String,
}

impl From<InputRow> for TransactionRequest {
    fn from(row: InputRow) -> Self {
        TransactionRequest {
            user_id: row.user_id,
            source_type: row.source_type,
            state: row.state,
            amount: row.amount,
            transaction_id: row.transaction_id,
        }
    }
}

/// Read transaction requests from a csv file with the header
/// `user_id,source_type,state,amount,transaction_id`.
///
/// Fields are taken verbatim (after trimming); validating them is left to the
/// processor. The returned iterator does not borrow `path`.
pub fn read_requests(
    path: &Path,
) -> Result<impl Iterator<Item = Result<TransactionRequest, CsvError>> + Send + use<>, CsvError> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| CsvError::Open {
            path: path.display().to_string(),
            source,
        })?;

    Ok(requests_from(reader))
}

fn requests_from(
    reader: csv::Reader<File>,
) -> impl Iterator<Item = Result<TransactionRequest, CsvError>> + Send {
    reader
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            result
                .map(TransactionRequest::from)
                .map_err(|source| CsvError::Parse { line, source })
        })
}

/// Write `user_id,balance` rows, balances with 2 decimals.
pub fn write_balances<W: io::Write>(
    writer: W,
    balances: impl IntoIterator<Item = (UserId, Amount)>,
) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(writer);

    for (user_id, balance) in balances {
        writer.serialize(OutputRow {
            user_id,
            balance: balance.to_string(),
        })?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "user_id,source_type,state,amount,transaction_id\n";

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn read_request() {
        let file = write_csv(&format!("{HEADER}1,game,win,10.50,txn-1\n"));
        let results: Vec<_> = read_requests(file.path()).unwrap().collect();
        assert_eq!(results.len(), 1);

        let request = results.into_iter().next().unwrap().unwrap();
        assert_eq!(
            request,
            TransactionRequest {
                user_id: 1,
                source_type: "game".to_string(),
                state: "win".to_string(),
                amount: "10.50".to_string(),
                transaction_id: "txn-1".to_string(),
            }
        );
    }

    #[test]
    fn read_keeps_amount_text_verbatim() {
        // "10.100" must reach the processor unchanged so it can be rejected
        let file = write_csv(&format!("{HEADER}2,server,lose,10.100,txn-2\n"));
        let request = read_requests(file.path()).unwrap().next().unwrap().unwrap();
        assert_eq!(request.amount, "10.100");
        assert_eq!(request.state, "lose");
    }

    #[test]
    fn read_with_whitespace() {
        let file = write_csv(
            "user_id, source_type, state, amount, transaction_id\n1, game, win, 1.00, txn-1\n",
        );
        let results: Vec<_> = read_requests(file.path()).unwrap().collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
    }

    #[test]
    fn read_returns_error_for_bad_user_id() {
        let file = write_csv(&format!("{HEADER}1,game,win,1.00,txn-1\nabc,game,win,1.00,txn-2\n"));
        let results: Vec<_> = read_requests(file.path()).unwrap().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(CsvError::Parse { line: 3, .. })));
    }

    #[test]
    fn read_missing_file_fails() {
        let result = read_requests(Path::new("/nonexistent/transactions.csv"));
        assert!(matches!(result, Err(CsvError::Open { .. })));
    }

    #[test]
    fn requests_outlive_the_path() {
        let file = write_csv(&format!("{HEADER}1,game,win,1.00,txn-1\n3,game,lose,2.00,txn-2\n"));
        let path = file.path().to_path_buf();
        let requests = read_requests(&path).unwrap();
        drop(path);

        let count = std::thread::spawn(move || requests.filter(Result::is_ok).count())
            .join()
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn write_balances_two_decimals() {
        let mut out = Vec::new();
        write_balances(
            &mut out,
            [(1, Amount::from_cents(500)), (2, Amount::ZERO)],
        )
        .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "user_id,balance\n1,5.00\n2,0.00\n");
    }
}
