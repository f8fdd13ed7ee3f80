// In crates/report-store/src/error.rs

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Report store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode report: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record at {path:?} line {line}: {reason}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Record schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u64, supported: u64 },

    #[error("Strategy id {0:?} cannot be used as a file name")]
    InvalidStrategyId(String),
}

pub type Result<T> = std::result::Result<T, Error>;
