// In crates/scoring/src/types.rs

use std::fmt;

use analytics::stats;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// --- Pillars & Metrics ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pillar {
    Performance,
    Risk,
    Execution,
    Robustness,
}

impl Pillar {
    pub const ALL: [Pillar; 4] = [
        Pillar::Performance,
        Pillar::Risk,
        Pillar::Execution,
        Pillar::Robustness,
    ];

    /// Points each pillar is worth out of 100.
    pub fn max_points(&self) -> f64 {
        match self {
            Pillar::Performance => 35.0,
            Pillar::Risk => 30.0,
            Pillar::Execution => 20.0,
            Pillar::Robustness => 15.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Sharpe,
    AnnualReturn,
    WinRate,
    Drawdown,
    Consistency,
    RecoveryTime,
    FrequencyFit,
    Latency,
    Slippage,
    OutOfSampleRatio,
    CrossMarket,
}

impl Metric {
    pub const ALL: [Metric; 11] = [
        Metric::Sharpe,
        Metric::AnnualReturn,
        Metric::WinRate,
        Metric::Drawdown,
        Metric::Consistency,
        Metric::RecoveryTime,
        Metric::FrequencyFit,
        Metric::Latency,
        Metric::Slippage,
        Metric::OutOfSampleRatio,
        Metric::CrossMarket,
    ];

    pub fn pillar(&self) -> Pillar {
        match self {
            Metric::Sharpe | Metric::AnnualReturn | Metric::WinRate => Pillar::Performance,
            Metric::Drawdown | Metric::Consistency | Metric::RecoveryTime => Pillar::Risk,
            Metric::FrequencyFit | Metric::Latency | Metric::Slippage => Pillar::Execution,
            Metric::OutOfSampleRatio | Metric::CrossMarket => Pillar::Robustness,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Sharpe => "Sharpe ratio",
            Metric::AnnualReturn => "annualized return",
            Metric::WinRate => "win rate",
            Metric::Drawdown => "max drawdown",
            Metric::Consistency => "monthly consistency",
            Metric::RecoveryTime => "drawdown recovery time",
            Metric::FrequencyFit => "edge-to-cost ratio",
            Metric::Latency => "execution latency",
            Metric::Slippage => "slippage",
            Metric::OutOfSampleRatio => "out-of-sample ratio",
            Metric::CrossMarket => "cross-market pass rate",
        };
        f.write_str(name)
    }
}

// --- Threshold Curves ---

/// Linear ramp from `floor` (0 points) to `target` (full points).
///
/// A target below the floor means lower raw values are better.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdCurve {
    pub floor: f64,
    pub target: f64,
}

impl ThresholdCurve {
    pub const fn new(floor: f64, target: f64) -> Self {
        Self { floor, target }
    }

    /// Fraction of full points earned by `value`, in [0, 1].
    pub fn fraction(&self, value: f64) -> f64 {
        stats::normalize(value, self.floor, self.target)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringCurves {
    pub sharpe: ThresholdCurve,
    pub annual_return: ThresholdCurve,
    pub win_rate: ThresholdCurve,
    pub max_drawdown: ThresholdCurve,
    pub monthly_win_ratio: ThresholdCurve,
    pub drawdown_duration_days: ThresholdCurve,
    pub edge_to_cost: ThresholdCurve,
    pub latency_p90_ms: ThresholdCurve,
    pub slippage_bps: ThresholdCurve,
    pub oos_is_ratio: ThresholdCurve,
    pub cross_market_pass_rate: ThresholdCurve,
}

impl Default for ScoringCurves {
    fn default() -> Self {
        Self {
            sharpe: ThresholdCurve::new(0.0, 2.5),
            annual_return: ThresholdCurve::new(0.0, 0.5),
            win_rate: ThresholdCurve::new(0.35, 0.65),
            max_drawdown: ThresholdCurve::new(0.35, 0.10),
            monthly_win_ratio: ThresholdCurve::new(0.3, 0.8),
            drawdown_duration_days: ThresholdCurve::new(180.0, 30.0),
            edge_to_cost: ThresholdCurve::new(1.0, 5.0),
            latency_p90_ms: ThresholdCurve::new(2_000.0, 100.0),
            slippage_bps: ThresholdCurve::new(50.0, 5.0),
            oos_is_ratio: ThresholdCurve::new(0.2, 0.8),
            cross_market_pass_rate: ThresholdCurve::new(0.2, 0.8),
        }
    }
}

impl ScoringCurves {
    pub fn get(&self, metric: Metric) -> &ThresholdCurve {
        match metric {
            Metric::Sharpe => &self.sharpe,
            Metric::AnnualReturn => &self.annual_return,
            Metric::WinRate => &self.win_rate,
            Metric::Drawdown => &self.max_drawdown,
            Metric::Consistency => &self.monthly_win_ratio,
            Metric::RecoveryTime => &self.drawdown_duration_days,
            Metric::FrequencyFit => &self.edge_to_cost,
            Metric::Latency => &self.latency_p90_ms,
            Metric::Slippage => &self.slippage_bps,
            Metric::OutOfSampleRatio => &self.oos_is_ratio,
            Metric::CrossMarket => &self.cross_market_pass_rate,
        }
    }
}

/// Points per sub-metric. Each pillar's weights must add up to its total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub sharpe: f64,
    pub annual_return: f64,
    pub win_rate: f64,
    pub drawdown: f64,
    pub consistency: f64,
    pub recovery_time: f64,
    pub frequency_fit: f64,
    pub latency: f64,
    pub slippage: f64,
    pub oos_ratio: f64,
    pub cross_market: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            sharpe: 15.0,
            annual_return: 10.0,
            win_rate: 10.0,
            drawdown: 15.0,
            consistency: 10.0,
            recovery_time: 5.0,
            frequency_fit: 10.0,
            latency: 5.0,
            slippage: 5.0,
            oos_ratio: 7.0,
            cross_market: 8.0,
        }
    }
}

impl ScoringWeights {
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Sharpe => self.sharpe,
            Metric::AnnualReturn => self.annual_return,
            Metric::WinRate => self.win_rate,
            Metric::Drawdown => self.drawdown,
            Metric::Consistency => self.consistency,
            Metric::RecoveryTime => self.recovery_time,
            Metric::FrequencyFit => self.frequency_fit,
            Metric::Latency => self.latency,
            Metric::Slippage => self.slippage,
            Metric::OutOfSampleRatio => self.oos_ratio,
            Metric::CrossMarket => self.cross_market,
        }
    }

    pub fn pillar_total(&self, pillar: Pillar) -> f64 {
        Metric::ALL
            .iter()
            .filter(|m| m.pillar() == pillar)
            .map(|m| self.get(*m))
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringSettings {
    pub curves: ScoringCurves,
    pub weights: ScoringWeights,
    /// Latency assumed when trades carry no signal timestamps.
    pub expected_delay_ms: f64,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            curves: ScoringCurves::default(),
            weights: ScoringWeights::default(),
            expected_delay_ms: 250.0,
        }
    }
}

impl ScoringSettings {
    pub fn validate(&self) -> Result<()> {
        for metric in Metric::ALL {
            let weight = self.weights.get(metric);
            if !(weight.is_finite() && weight >= 0.0) {
                return Err(Error::InvalidSettings(format!(
                    "weight for {metric} must be non-negative, got {weight}"
                )));
            }
            let curve = self.curves.get(metric);
            if !(curve.floor.is_finite() && curve.target.is_finite()) || curve.floor == curve.target {
                return Err(Error::InvalidSettings(format!(
                    "curve for {metric} needs distinct finite floor and target"
                )));
            }
        }
        for pillar in Pillar::ALL {
            let total = self.weights.pillar_total(pillar);
            if (total - pillar.max_points()).abs() > 1e-9 {
                return Err(Error::InvalidSettings(format!(
                    "{pillar:?} weights add up to {total}, expected {}",
                    pillar.max_points()
                )));
            }
        }
        Ok(())
    }
}

// --- Scores ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScore {
    pub metric: Metric,
    /// The raw input, when it was available.
    pub raw: Option<f64>,
    pub points: f64,
    pub max_points: f64,
    pub evaluated: bool,
}

impl SubScore {
    /// Share of its points the sub-metric earned.
    pub fn fraction(&self) -> f64 {
        if self.max_points > 0.0 {
            self.points / self.max_points
        } else {
            1.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PillarScore {
    pub pillar: Pillar,
    pub points: f64,
    pub max_points: f64,
    pub components: Vec<SubScore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 90.0 => Grade::A,
            s if s >= 80.0 => Grade::B,
            s if s >= 70.0 => Grade::C,
            s if s >= 60.0 => Grade::D,
            _ => Grade::F,
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub performance: PillarScore,
    pub risk: PillarScore,
    pub execution: PillarScore,
    pub robustness: PillarScore,
    pub total: f64,
    pub grade: Grade,
}

impl ComponentScores {
    pub fn pillars(&self) -> [&PillarScore; 4] {
        [&self.performance, &self.risk, &self.execution, &self.robustness]
    }

    pub fn sub_scores(&self) -> impl Iterator<Item = &SubScore> {
        self.pillars().into_iter().flat_map(|p| p.components.iter())
    }

    pub fn get(&self, metric: Metric) -> Option<&SubScore> {
        self.sub_scores().find(|s| s.metric == metric)
    }
}
