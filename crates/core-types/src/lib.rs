// In crates/core-types/src/lib.rs

pub mod backtest;
pub mod cancel;
pub mod equity;
pub mod error;
pub mod strategy;
pub mod types;
pub mod warning;

// Re-export the most important types for easy access from other crates.
pub use backtest::{BacktestResult, DataSufficiency, RunMetadata};
pub use cancel::CancelToken;
pub use error::{Error, Result};
pub use strategy::{MarketData, MarketSlice, StrategyParams, StrategyRunner};
pub use types::{EquityPoint, Kline, Side, Symbol, Timeframe, Trade};
pub use warning::{Severity, Stage, StageOutput, Warning, WarningKind};
