//! Already-parsed row representation the pipeline consumes, plus a thin
//! CSV front-end. The pipeline itself is format-agnostic: a row is a
//! key→string map and a column mapping says which key is which.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use thiserror::Error;

pub type RawRecord = HashMap<String, String>;

/// Which record key holds each field of interest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub date: String,
    pub description: String,
    pub amount: String,
    pub sub_description: Option<String>,
    /// Institution's debit/credit hint column, when present.
    pub transaction_type: Option<String>,
}

impl ColumnMapping {
    pub fn new(date: &str, description: &str, amount: &str) -> Self {
        ColumnMapping {
            date: date.to_string(),
            description: description.to_string(),
            amount: amount.to_string(),
            sub_description: None,
            transaction_type: None,
        }
    }

    pub fn with_transaction_type(mut self, key: &str) -> Self {
        self.transaction_type = Some(key.to_string());
        self
    }

    pub fn with_sub_description(mut self, key: &str) -> Self {
        self.sub_description = Some(key.to_string());
        self
    }
}

#[derive(Debug, Error)]
pub enum CsvReadError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("No data rows")]
    NoDataRows,
}

/// Read a headered CSV into key→string records, keyed by header name.
pub fn read_rows<R: Read>(data: R) -> Result<Vec<RawRecord>, CsvReadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data);
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        let row: RawRecord = headers
            .iter()
            .cloned()
            .zip(record.iter().map(|f| f.to_string()))
            .collect();
        rows.push(row);
    }
    if rows.is_empty() {
        return Err(CsvReadError::NoDataRows);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_rows_keys_by_header() {
        let data = b"Date,Description,Amount\n2024-01-15,AMAZON,49.99\n";
        let rows = read_rows(data.as_ref()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["Date"], "2024-01-15");
        assert_eq!(rows[0]["Amount"], "49.99");
    }

    #[test]
    fn read_rows_skips_blank_lines() {
        let data = b"Date,Description,Amount\n2024-01-15,AMAZON,49.99\n,,\n";
        let rows = read_rows(data.as_ref()).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn read_rows_errors_when_empty() {
        let data = b"Date,Description,Amount\n";
        assert!(matches!(
            read_rows(data.as_ref()),
            Err(CsvReadError::NoDataRows)
        ));
    }
}
