// In crates/analytics/src/types.rs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Gross profit over gross loss, with typed sentinels for the cases where the
/// ratio does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ProfitFactor {
    Ratio(f64),
    /// At least one winner and no losing trade.
    NoLosses,
    NoTrades,
}

impl ProfitFactor {
    /// A finite number for scoring: `NoLosses` saturates at `cap`.
    pub fn capped(&self, cap: f64) -> f64 {
        match self {
            ProfitFactor::Ratio(r) => r.min(cap),
            ProfitFactor::NoLosses => cap,
            ProfitFactor::NoTrades => 0.0,
        }
    }

    pub fn is_below(&self, threshold: f64) -> bool {
        match self {
            ProfitFactor::Ratio(r) => *r < threshold,
            ProfitFactor::NoLosses => false,
            ProfitFactor::NoTrades => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceInterval {
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Risk-adjusted return statistics for one trade sequence.
///
/// Returns and drawdowns are fractions (0.25 = 25%); money is in the quote currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitMetrics {
    // --- Trade counts ---
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,

    // --- Returns ---
    pub net_pnl: Decimal,
    pub total_return: f64,
    pub annualized_return: f64,
    pub periods_per_year: f64,

    // --- Risk-adjusted ---
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,
    pub max_drawdown: f64,
    pub max_drawdown_duration_secs: i64,
    pub recovery_factor: Option<f64>,

    // --- Trade quality ---
    pub win_rate: f64,
    pub profit_factor: ProfitFactor,
    pub avg_win: Decimal,
    /// Mean losing trade as a positive magnitude.
    pub avg_loss: Decimal,
    pub expectancy: Decimal,
    pub avg_trade_duration_secs: f64,
    /// Share of calendar months that ended with a gain.
    pub monthly_win_ratio: Option<f64>,

    // --- Significance ---
    pub mean_return: f64,
    pub return_std: f64,
    pub return_ci95: ConfidenceInterval,
    pub t_statistic: f64,
    pub p_value: f64,
    pub significant: bool,

    /// Full Kelly fraction, floored at 0 and capped.
    pub kelly_fraction: f64,
    /// 0-100 summary of the numbers above.
    pub quality_score: f64,
}

impl ProfitMetrics {
    pub fn max_drawdown_duration_days(&self) -> f64 {
        self.max_drawdown_duration_secs as f64 / 86_400.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfitabilitySettings {
    /// Annual risk-free rate as a fraction.
    pub risk_free_rate: f64,
    /// Ceiling applied to the Kelly fraction.
    pub kelly_cap: f64,
    /// Two-sided level for the zero-mean t-test.
    pub significance_level: f64,
}

impl Default for ProfitabilitySettings {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.0,
            kelly_cap: 0.25,
            significance_level: 0.05,
        }
    }
}
