// In crates/strategies/src/types.rs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What the crossover wants to hold after the current bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    GoLong,
    GoShort,
    Hold,
}

// Parameter names understood by `EmaCrossover`.
pub const FAST_PERIOD: &str = "fast_period";
pub const SLOW_PERIOD: &str = "slow_period";
pub const ALLOW_SHORT: &str = "allow_short";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct EmaCrossoverSettings {
    pub fast_period: usize,
    pub slow_period: usize,
    pub allow_short: bool,
    /// Notional of every entry, in the quote currency.
    pub order_size: Decimal,
    pub fee_rate_bps: Decimal,

    // Candidates tried by the in-sample optimizer.
    pub fast_grid: Vec<usize>,
    pub slow_grid: Vec<usize>,
    /// Candidates producing fewer trades are not ranked.
    pub min_trades_to_rank: usize,
}

impl Default for EmaCrossoverSettings {
    fn default() -> Self {
        Self {
            fast_period: 12,
            slow_period: 26,
            allow_short: true,
            order_size: Decimal::ONE_THOUSAND,
            fee_rate_bps: Decimal::from(4),
            fast_grid: vec![5, 8, 12, 20],
            slow_grid: vec![21, 26, 50, 100],
            min_trades_to_rank: 3,
        }
    }
}
