// In crates/ingestion/src/types.rs

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Settings for turning raw backtest files into a `BacktestResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionSettings {
    /// Starting balance used when the equity curve has to be derived from trades.
    pub initial_capital: Decimal,
    /// Fee charged on entry and exit notional when a record carries no `fee`.
    pub fee_rate_bps: f64,
    /// Below this many trades the result is flagged as insufficient.
    pub min_trades: usize,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            initial_capital: dec!(10_000),
            fee_rate_bps: 4.0,
            min_trades: 30,
        }
    }
}

/// Where the trade and (optional) equity records live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacktestSource {
    pub trades: PathBuf,
    pub equity: Option<PathBuf>,
}

impl BacktestSource {
    pub fn new(trades: impl Into<PathBuf>) -> Self {
        Self {
            trades: trades.into(),
            equity: None,
        }
    }

    pub fn with_equity(mut self, equity: impl Into<PathBuf>) -> Self {
        self.equity = Some(equity.into());
        self
    }
}

/// On-disk encodings the loader understands, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Json,
}
