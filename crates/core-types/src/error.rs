// In crates/core-types/src/error.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("trade {index}: exit time {exit} precedes entry time {entry}")]
    ExitBeforeEntry {
        index: usize,
        entry: DateTime<Utc>,
        exit: DateTime<Utc>,
    },

    #[error("trade {index}: {reason}")]
    InvalidTrade { index: usize, reason: String },

    #[error("equity point {index}: timestamp is not strictly after the previous point")]
    NonMonotonicEquity { index: usize },

    #[error("equity point {index}: negative equity {value}")]
    NegativeEquity { index: usize, value: Decimal },

    #[error("invalid timeframe '{0}'")]
    InvalidTimeframe(String),

    #[error("initial capital must be positive, got {0}")]
    InvalidCapital(Decimal),
}

pub type Result<T> = std::result::Result<T, Error>;
