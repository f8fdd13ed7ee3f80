// In crates/validation/src/types.rs

use std::collections::BTreeMap;

use analytics::{ConfidenceInterval, ProfitMetrics};
use chrono::{DateTime, Utc};
use core_types::{StrategyParams, Symbol, Timeframe};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Trials below this count do not give stable tail estimates.
pub const MIN_MONTE_CARLO_TRIALS: usize = 1_000;

// --- Regimes ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    Bull,
    Bear,
    Sideways,
    Volatile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityTier {
    Low,
    Medium,
    High,
    Extreme,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeClassification {
    pub regime: MarketRegime,
    pub volatility_tier: VolatilityTier,
    /// First open to last close.
    pub period_return: f64,
    pub annualized_volatility: f64,
}

// --- Multi-market ---

/// One (symbol, timeframe, regime) cell of the market matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketTestResult {
    pub symbol: Symbol,
    pub timeframe: Timeframe,
    /// `None` when the series was too short to classify.
    pub regime: Option<RegimeClassification>,
    pub metrics: ProfitMetrics,
    pub passed: bool,
    pub failure_reasons: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    High,
    Moderate,
    Low,
}

impl Consistency {
    /// Judgement from the coefficient of variation of per-cell Sharpe.
    pub fn from_cv(cv: Option<f64>) -> Self {
        match cv {
            Some(cv) if cv < 0.5 => Consistency::High,
            Some(cv) if cv < 1.0 => Consistency::Moderate,
            _ => Consistency::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RegimePassRate {
    pub cells: usize,
    pub passed: usize,
    pub pass_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiMarketSummary {
    pub cells_tested: usize,
    pub cells_passed: usize,
    pub pass_rate: f64,
    pub mean_sharpe: f64,
    pub median_sharpe: f64,
    pub std_sharpe: f64,
    /// `std / |mean|`; `None` when the mean Sharpe is zero.
    pub coefficient_of_variation: Option<f64>,
    /// Mean Sharpe less a dispersion penalty.
    pub penalized_sharpe: f64,
    pub consistency: Consistency,
    pub regime_pass_rates: BTreeMap<MarketRegime, RegimePassRate>,
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiMarketResult {
    pub cells: Vec<MarketTestResult>,
    pub summary: MultiMarketSummary,
}

// --- Walk-forward ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowMode {
    /// Fixed-length in-sample segment that slides forward.
    Rolling,
    /// In-sample segment always starts at the beginning of the data.
    Anchored,
}

/// Where the walk-forward windows got their trades from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkForwardSource {
    /// Strategy re-run per window over klines, tuned in-sample.
    Replay,
    /// Backtest trades split by time with fixed parameters.
    TradeSplit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardWindow {
    pub index: usize,
    pub in_sample_start: DateTime<Utc>,
    pub in_sample_end: DateTime<Utc>,
    pub out_of_sample_start: DateTime<Utc>,
    pub out_of_sample_end: DateTime<Utc>,
    /// Parameters chosen on the in-sample segment.
    pub params: StrategyParams,
    pub in_sample: ProfitMetrics,
    pub out_of_sample: ProfitMetrics,
    pub degradation: f64,
    pub oos_is_ratio: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardResult {
    pub source: WalkForwardSource,
    pub mode: WindowMode,
    pub windows: Vec<WalkForwardWindow>,
    pub mean_in_sample_sharpe: f64,
    pub mean_out_of_sample_sharpe: f64,
    /// Mean OOS over mean IS Sharpe, floored at 0.
    pub oos_is_ratio: f64,
    pub mean_degradation: f64,
    pub instability: f64,
    /// 0-100, higher means more overfit.
    pub overfitting_score: f64,
    pub overfitting_detected: bool,
    pub pass_rate: f64,
    pub passed: bool,
    pub cancelled: bool,
}

// --- Monte Carlo ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationMode {
    Bootstrap,
    /// Bootstrap plus rotating stress scenarios.
    Stress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressScenario {
    FlashCrash,
    ExtendedDrawdown,
    VolatilitySpike,
}

impl StressScenario {
    pub const ALL: [StressScenario; 3] = [
        StressScenario::FlashCrash,
        StressScenario::ExtendedDrawdown,
        StressScenario::VolatilitySpike,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReturnPercentiles {
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub scenario: StressScenario,
    pub trials: usize,
    pub mean_return: f64,
    pub p5_return: f64,
    pub probability_of_ruin: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloResult {
    pub mode: SimulationMode,
    pub seed: u64,
    /// Trials actually completed; below the configured count when cancelled.
    pub trials: usize,
    pub mean_return: f64,
    pub median_return: f64,
    pub std_return: f64,
    pub percentiles: ReturnPercentiles,
    pub confidence_interval: ConfidenceInterval,
    /// Loss at the 5th percentile, as a positive fraction.
    pub var_95: f64,
    /// Mean loss beyond VaR, as a positive fraction.
    pub cvar_95: f64,
    pub probability_of_profit: f64,
    pub probability_of_ruin: f64,
    pub mean_max_drawdown: f64,
    pub worst_max_drawdown: f64,
    pub robustness_score: f64,
    pub scenarios: Vec<ScenarioSummary>,
    pub cancelled: bool,
}

// --- Settings ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeSettings {
    pub bull_return: f64,
    pub bear_return: f64,
    pub volatile_annualized: f64,
    /// Upper bounds of the Low, Medium and High volatility tiers.
    pub volatility_tiers: [f64; 3],
}

impl Default for RegimeSettings {
    fn default() -> Self {
        Self {
            bull_return: 0.10,
            bear_return: -0.10,
            volatile_annualized: 0.80,
            volatility_tiers: [0.30, 0.60, 1.00],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiMarketSettings {
    pub min_sharpe: f64,
    pub min_quality: f64,
    pub min_trades_per_cell: usize,
    /// Multiplier on Sharpe std in the penalized Sharpe.
    pub dispersion_penalty: f64,
    pub regime: RegimeSettings,
}

impl Default for MultiMarketSettings {
    fn default() -> Self {
        Self {
            min_sharpe: 0.5,
            min_quality: 40.0,
            min_trades_per_cell: 5,
            dispersion_penalty: 0.5,
            regime: RegimeSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForwardSettings {
    pub window_count: usize,
    pub in_sample_ratio: f64,
    pub mode: WindowMode,
    pub min_oos_sharpe: f64,
    pub min_oos_is_ratio: f64,
    pub min_pass_rate: f64,
    pub overfitting_ceiling: f64,
    /// Windows with fewer trades on either side are flagged as thin.
    pub min_trades_per_window: usize,
}

impl Default for WalkForwardSettings {
    fn default() -> Self {
        Self {
            window_count: 5,
            in_sample_ratio: 0.7,
            mode: WindowMode::Rolling,
            min_oos_sharpe: 0.5,
            min_oos_is_ratio: 0.5,
            min_pass_rate: 0.6,
            overfitting_ceiling: 50.0,
            min_trades_per_window: 3,
        }
    }
}

impl WalkForwardSettings {
    pub fn validate(&self) -> Result<()> {
        if self.window_count == 0 {
            return Err(Error::InvalidSettings(
                "walk_forward.window_count must be at least 1".into(),
            ));
        }
        if !(self.in_sample_ratio > 0.0 && self.in_sample_ratio < 1.0) {
            return Err(Error::InvalidSettings(format!(
                "walk_forward.in_sample_ratio must be in (0, 1), got {}",
                self.in_sample_ratio
            )));
        }
        if !(0.0..=100.0).contains(&self.overfitting_ceiling) {
            return Err(Error::InvalidSettings(format!(
                "walk_forward.overfitting_ceiling must be in [0, 100], got {}",
                self.overfitting_ceiling
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloSettings {
    pub trials: usize,
    pub seed: u64,
    pub mode: SimulationMode,
    /// Drawdown at or beyond which a path counts as ruined.
    pub ruin_threshold: f64,
    pub flash_crash_return: f64,
    /// Share of a path's trades touched by the drawdown and spike scenarios.
    pub stress_fraction: f64,
    pub spike_multiplier: f64,
}

impl Default for MonteCarloSettings {
    fn default() -> Self {
        Self {
            trials: 1_000,
            seed: 42,
            mode: SimulationMode::Stress,
            ruin_threshold: 0.5,
            flash_crash_return: -0.15,
            stress_fraction: 0.10,
            spike_multiplier: 2.5,
        }
    }
}

impl MonteCarloSettings {
    pub fn validate(&self) -> Result<()> {
        if self.trials < MIN_MONTE_CARLO_TRIALS {
            return Err(Error::TooFewTrials {
                trials: self.trials,
                minimum: MIN_MONTE_CARLO_TRIALS,
            });
        }
        if !(self.ruin_threshold > 0.0 && self.ruin_threshold <= 1.0) {
            return Err(Error::InvalidSettings(format!(
                "monte_carlo.ruin_threshold must be in (0, 1], got {}",
                self.ruin_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.stress_fraction) {
            return Err(Error::InvalidSettings(format!(
                "monte_carlo.stress_fraction must be in [0, 1], got {}",
                self.stress_fraction
            )));
        }
        Ok(())
    }
}
