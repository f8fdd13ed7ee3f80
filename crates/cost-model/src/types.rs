// In crates/cost-model/src/types.rs

use core_types::Symbol;
use serde::{Deserialize, Serialize};

// --- Classifications ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiquidityTier {
    VeryHigh,
    High,
    Medium,
    Low,
    VeryLow,
}

impl LiquidityTier {
    /// Tier for a 24h traded volume in USD.
    pub fn from_volume(volume_24h_usd: f64) -> Self {
        match volume_24h_usd {
            v if v >= 1e9 => LiquidityTier::VeryHigh,
            v if v >= 1e8 => LiquidityTier::High,
            v if v >= 1e7 => LiquidityTier::Medium,
            v if v >= 1e6 => LiquidityTier::Low,
            _ => LiquidityTier::VeryLow,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalFrequency {
    HighFrequency,
    Intraday,
    Swing,
    Position,
}

impl SignalFrequency {
    pub fn from_trades_per_day(trades_per_day: f64) -> Self {
        match trades_per_day {
            t if t > 50.0 => SignalFrequency::HighFrequency,
            t if t > 5.0 => SignalFrequency::Intraday,
            t if t > 0.2 => SignalFrequency::Swing,
            _ => SignalFrequency::Position,
        }
    }

    /// Spread multiplier: faster strategies cross the spread under more urgency.
    pub fn spread_multiplier(&self) -> f64 {
        match self {
            SignalFrequency::HighFrequency => 1.5,
            SignalFrequency::Intraday => 1.2,
            SignalFrequency::Swing => 1.0,
            SignalFrequency::Position => 0.8,
        }
    }

    /// Share of daily volatility paid as slippage per fill.
    pub fn volatility_factor(&self) -> f64 {
        match self {
            SignalFrequency::HighFrequency => 0.05,
            SignalFrequency::Intraday => 0.03,
            SignalFrequency::Swing => 0.015,
            SignalFrequency::Position => 0.01,
        }
    }
}

/// UTC session bucket an order lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Asia,
    Europe,
    EuUsOverlap,
    Us,
    OffHours,
}

impl TimeOfDay {
    pub const ALL: [TimeOfDay; 5] = [
        TimeOfDay::Asia,
        TimeOfDay::Europe,
        TimeOfDay::EuUsOverlap,
        TimeOfDay::Us,
        TimeOfDay::OffHours,
    ];

    pub fn from_utc_hour(hour: u32) -> Self {
        match hour {
            0..7 => TimeOfDay::Asia,
            7..12 => TimeOfDay::Europe,
            12..16 => TimeOfDay::EuUsOverlap,
            16..21 => TimeOfDay::Us,
            _ => TimeOfDay::OffHours,
        }
    }

    pub fn spread_multiplier(&self) -> f64 {
        match self {
            TimeOfDay::Asia => 1.1,
            TimeOfDay::Europe => 1.0,
            TimeOfDay::EuUsOverlap => 0.9,
            TimeOfDay::Us => 1.0,
            TimeOfDay::OffHours => 1.3,
        }
    }
}

// --- Liquidity ---

/// One row of the liquidity table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityInfo {
    pub symbol: Symbol,
    pub volume_24h_usd: f64,
    /// Measured quoted spread; the tier default applies when absent.
    #[serde(default)]
    pub spread_bps: Option<f64>,
    /// Resting size near the touch; the tier default applies when absent.
    #[serde(default)]
    pub depth_usd: Option<f64>,
}

/// A symbol's liquidity after tier defaults have been applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLiquidity {
    pub tier: LiquidityTier,
    pub spread_bps: f64,
    pub depth_usd: f64,
    /// False when the symbol was missing from the table.
    pub known: bool,
}

// --- Estimates ---

/// Additive slippage components, all in basis points.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SlippageBreakdown {
    pub spread_bps: f64,
    pub impact_bps: f64,
    pub delay_bps: f64,
    pub volatility_bps: f64,
    pub total_bps: f64,
}

/// Expected one-way slippage for an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub symbol: Symbol,
    pub order_size_usd: f64,
    pub breakdown: SlippageBreakdown,
    /// 95% interval around `breakdown.total_bps`.
    pub ci_low_bps: f64,
    pub ci_high_bps: f64,
    pub liquidity: ResolvedLiquidity,
    pub signal_frequency: SignalFrequency,
    pub time_of_day: TimeOfDay,
}

/// Frictions of a whole backtest, built on a typical-order `CostEstimate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioCostEstimate {
    pub per_trade: CostEstimate,
    pub trades_per_day: f64,
    /// Mean fee of one round trip relative to entry notional.
    pub fee_bps: f64,
    /// Two slippage legs plus fees.
    pub round_trip_bps: f64,
    /// Yearly friction as a share of starting capital, in percent.
    pub annual_cost_drag_pct: f64,
    /// Mean gross trade return relative to entry notional.
    pub mean_edge_bps: f64,
    /// `mean_edge_bps / round_trip_bps`; above 1 the edge survives costs.
    pub edge_to_cost_ratio: f64,
}

// --- Execution quality ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionRating {
    Excellent,
    Good,
    Acceptable,
    Poor,
}

impl ExecutionRating {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 85.0 => ExecutionRating::Excellent,
            s if s >= 70.0 => ExecutionRating::Good,
            s if s >= 50.0 => ExecutionRating::Acceptable,
            _ => ExecutionRating::Poor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyPercentiles {
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p99_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftAnalysis {
    pub trades_examined: usize,
    /// Change in slippage per trade, bps. Positive means fills are getting worse.
    pub slope_bps_per_trade: f64,
    pub t_statistic: f64,
    pub p_value: f64,
    pub early_mean_bps: f64,
    pub late_mean_bps: f64,
    pub drifting: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionQuality {
    pub trades_analyzed: usize,
    /// Trades that carried an intended signal price.
    pub trades_with_signal: usize,
    pub fill_rate: Option<f64>,
    /// Mean signed slippage against the signal price; positive is adverse.
    pub avg_slippage_bps: Option<f64>,
    pub latency: Option<LatencyPercentiles>,
    pub temporary_impact_bps: f64,
    pub permanent_impact_bps: f64,
    pub adverse_selection_bps: f64,
    /// `None` when no trade carried execution data.
    pub quality_score: Option<f64>,
    pub rating: Option<ExecutionRating>,
    pub drift: Option<DriftAnalysis>,
}

// --- Settings ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierProfile {
    pub base_spread_bps: f64,
    pub impact_adjustment: f64,
    pub volatility_multiplier: f64,
    /// Relative half-width of the 95% interval, before the 1.96 factor.
    pub uncertainty: f64,
    pub default_depth_usd: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierProfiles {
    pub very_high: TierProfile,
    pub high: TierProfile,
    pub medium: TierProfile,
    pub low: TierProfile,
    pub very_low: TierProfile,
}

impl TierProfiles {
    pub fn get(&self, tier: LiquidityTier) -> &TierProfile {
        match tier {
            LiquidityTier::VeryHigh => &self.very_high,
            LiquidityTier::High => &self.high,
            LiquidityTier::Medium => &self.medium,
            LiquidityTier::Low => &self.low,
            LiquidityTier::VeryLow => &self.very_low,
        }
    }
}

impl Default for TierProfiles {
    fn default() -> Self {
        let profile = |spread, impact, vol, uncertainty, depth| TierProfile {
            base_spread_bps: spread,
            impact_adjustment: impact,
            volatility_multiplier: vol,
            uncertainty,
            default_depth_usd: depth,
        };
        Self {
            very_high: profile(1.0, 0.5, 0.8, 0.15, 5e6),
            high: profile(2.5, 0.8, 1.0, 0.20, 1e6),
            medium: profile(5.0, 1.0, 1.2, 0.25, 2.5e5),
            low: profile(10.0, 1.5, 1.5, 0.35, 5e4),
            very_low: profile(20.0, 2.5, 2.0, 0.50, 1e4),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostModelSettings {
    pub tiers: TierProfiles,
    /// Square-root impact coefficient in bps at one unit of book depth.
    pub impact_coefficient_bps: f64,
    /// Expected signal-to-fill latency.
    pub expected_delay_ms: f64,
    /// Share of volatility over the delay that turns into slippage.
    pub delay_fraction: f64,
    /// Used when neither klines nor trade durations give a volatility estimate.
    pub default_daily_volatility: f64,
    /// Static liquidity table; symbols not listed fall back to `VeryLow`.
    pub liquidity: Vec<LiquidityInfo>,
}

impl Default for CostModelSettings {
    fn default() -> Self {
        Self {
            tiers: TierProfiles::default(),
            impact_coefficient_bps: 10.0,
            expected_delay_ms: 250.0,
            delay_fraction: 0.5,
            default_daily_volatility: 0.03,
            liquidity: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionQualitySettings {
    pub drift_lookback: usize,
    pub drift_min_trades: usize,
    pub drift_p_value: f64,
    /// Trades averaged at each end of the lookback for the early/late comparison.
    pub rolling_window: usize,
    /// Share of adverse slippage treated as permanent impact.
    pub permanent_share: f64,
}

impl Default for ExecutionQualitySettings {
    fn default() -> Self {
        Self {
            drift_lookback: 50,
            drift_min_trades: 20,
            drift_p_value: 0.05,
            rolling_window: 10,
            permanent_share: 0.3,
        }
    }
}
