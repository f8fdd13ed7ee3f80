// In crates/core-types/src/strategy.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{Kline, Symbol, Timeframe, Trade};

/// Named numeric strategy parameters, e.g. `{"fast_period": 12.0}`.
pub type StrategyParams = BTreeMap<String, f64>;

/// One market's full price history, as loaded from a kline file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketData {
    pub symbol: Symbol,
    pub timeframe: Timeframe,
    pub klines: Vec<Kline>,
}

impl MarketData {
    pub fn new(symbol: Symbol, timeframe: Timeframe, klines: Vec<Kline>) -> Self {
        Self {
            symbol,
            timeframe,
            klines,
        }
    }

    pub fn as_slice(&self) -> MarketSlice<'_> {
        MarketSlice::new(&self.symbol, &self.timeframe, &self.klines)
    }
}

/// A view over one market's price history handed to a strategy.
#[derive(Debug, Clone, Copy)]
pub struct MarketSlice<'a> {
    pub symbol: &'a Symbol,
    pub timeframe: &'a Timeframe,
    pub klines: &'a [Kline],
}

impl<'a> MarketSlice<'a> {
    pub fn new(symbol: &'a Symbol, timeframe: &'a Timeframe, klines: &'a [Kline]) -> Self {
        Self {
            symbol,
            timeframe,
            klines,
        }
    }

    /// Narrows the view to `klines[start..end]`.
    pub fn slice(&self, start: usize, end: usize) -> MarketSlice<'a> {
        let end = end.min(self.klines.len());
        let start = start.min(end);
        MarketSlice {
            symbol: self.symbol,
            timeframe: self.timeframe,
            klines: &self.klines[start..end],
        }
    }
}

/// The strategy callback the caller passes into the multi-market tester and
/// walk-forward validator.
///
/// Implementations must be deterministic and free of shared mutable state:
/// the same slice and parameters always yield the same trades, and the
/// validation core calls `run` from several worker threads at once.
pub trait StrategyRunner: Send + Sync {
    /// The name of the strategy, used only for logging.
    fn name(&self) -> &str;

    /// Replays the strategy over `market` and returns the closed trades.
    fn run(&self, market: &MarketSlice<'_>, params: &StrategyParams) -> Vec<Trade>;

    /// Tunes parameters on an in-sample slice. Strategies without tunable
    /// parameters keep the default, which returns `base` unchanged.
    fn optimize(&self, in_sample: &MarketSlice<'_>, base: &StrategyParams) -> StrategyParams {
        let _ = in_sample;
        base.clone()
    }
}
