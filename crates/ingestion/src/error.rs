// In crates/ingestion/src/error.rs

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A single record could not be turned into a valid value. `record` is 1-based.
    #[error("{path}, record {record}: {reason}")]
    Parse {
        path: PathBuf,
        record: usize,
        reason: String,
    },

    #[error("Unsupported file format: {0} (expected .csv or .json)")]
    UnsupportedFormat(PathBuf),

    #[error("Backtest failed validation: {0}")]
    Invalid(#[from] core_types::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
