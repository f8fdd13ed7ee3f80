// In crates/readiness/src/types.rs

use analytics::ProfitMetrics;
use core_types::{DataSufficiency, RunMetadata, Warning, WarningKind};
use cost_model::{ExecutionQuality, PortfolioCostEstimate};
use scoring::{ComponentScores, Grade, Metric, ScoringSettings};
use serde::{Deserialize, Serialize};
use validation::{MonteCarloResult, MultiMarketResult, WalkForwardResult};

use crate::error::{Error, Result};

// --- Status ---

/// Lifecycle of a deployment decision. Every report starts in `Evaluating`
/// and moves at most once, into one of the four terminal verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessStatus {
    Evaluating,
    Approved,
    Conditional,
    NeedsImprovement,
    Rejected,
}

/// Why the evaluator settled on its status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StatusReason {
    /// Not enough trades to judge; this is not a rejection.
    Inconclusive { trades: usize, required: usize },
    CriticalFailure { checks: Vec<CriticalCheck> },
    /// Score reached the approval band but unresolved warnings held it back.
    CappedByWarnings { score: f64, warnings: usize },
    ScoreBand { score: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Extreme,
}

impl RiskTier {
    pub const ALL: [RiskTier; 4] = [RiskTier::Low, RiskTier::Medium, RiskTier::High, RiskTier::Extreme];

    pub fn index(&self) -> usize {
        match self {
            RiskTier::Low => 0,
            RiskTier::Medium => 1,
            RiskTier::High => 2,
            RiskTier::Extreme => 3,
        }
    }
}

/// Recommended capital allocation, as fractions of the account.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Sizing {
    pub position_size_fraction: f64,
    pub max_exposure_fraction: f64,
    pub daily_loss_limit_fraction: f64,
    /// The full Kelly fraction the sizing started from.
    pub kelly_fraction: f64,
}

// --- Findings ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticalCheck {
    Drawdown,
    Significance,
    ProfitFactor,
    RuinProbability,
    Overfitting,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalFailure {
    pub check: CriticalCheck,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum RecommendationSource {
    Metric(Metric),
    Critical(CriticalCheck),
    Warning(WarningKind),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub source: RecommendationSource,
    pub message: String,
}

// --- Report ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub total: f64,
    pub grade: Grade,
    /// Absent on reports migrated from before per-pillar scores were kept.
    #[serde(default)]
    pub components: Option<ComponentScores>,
}

/// Every intermediate result the decision was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifacts {
    pub profit: ProfitMetrics,
    #[serde(default)]
    pub cost: Option<PortfolioCostEstimate>,
    #[serde(default)]
    pub execution: Option<ExecutionQuality>,
    #[serde(default)]
    pub multi_market: Option<MultiMarketResult>,
    #[serde(default)]
    pub walk_forward: Option<WalkForwardResult>,
    #[serde(default)]
    pub monte_carlo: Option<MonteCarloResult>,
}

/// The single output of an evaluation. Holds no wall-clock time so the same
/// inputs always produce the same report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessReport {
    pub meta: RunMetadata,
    pub sufficiency: DataSufficiency,
    pub status: ReadinessStatus,
    pub status_reason: StatusReason,
    pub score: Option<ScoreSummary>,
    pub risk_tier: Option<RiskTier>,
    pub sizing: Sizing,
    pub critical_failures: Vec<CriticalFailure>,
    pub recommendations: Vec<Recommendation>,
    pub warnings: Vec<Warning>,
    pub artifacts: Artifacts,
}

impl ReadinessReport {
    pub fn strategy_id(&self) -> &str {
        &self.meta.strategy_id
    }

    pub fn run_id(&self) -> &str {
        &self.meta.run_id
    }

    pub fn total_score(&self) -> Option<f64> {
        self.score.as_ref().map(|s| s.total)
    }

    /// True when the report says "not enough data" rather than giving a verdict.
    pub fn is_inconclusive(&self) -> bool {
        matches!(self.status_reason, StatusReason::Inconclusive { .. })
    }
}

// --- Settings ---

/// Hard gates that reject a strategy whatever its score. `None` disables a check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CriticalChecks {
    pub max_drawdown: Option<f64>,
    pub require_significance: bool,
    pub min_profit_factor: Option<f64>,
    pub max_ruin_probability: Option<f64>,
    pub reject_overfitting: bool,
}

impl Default for CriticalChecks {
    fn default() -> Self {
        Self {
            max_drawdown: Some(0.35),
            require_significance: true,
            min_profit_factor: Some(1.0),
            max_ruin_probability: Some(0.10),
            reject_overfitting: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessSettings {
    pub approve_threshold: f64,
    pub conditional_threshold: f64,
    pub critical: CriticalChecks,
    /// Drawdown upper bounds for the Low, Medium and High tiers.
    pub tier_drawdown_bounds: [f64; 3],
    /// Per-tier multiplier on half-Kelly, indexed Low..Extreme.
    pub tier_scale: [f64; 4],
    pub tier_max_exposure: [f64; 4],
    pub tier_daily_loss_limit: [f64; 4],
    pub max_position_fraction: f64,
    pub conditional_sizing_factor: f64,
    pub scoring: ScoringSettings,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            approve_threshold: 85.0,
            conditional_threshold: 70.0,
            critical: CriticalChecks::default(),
            tier_drawdown_bounds: [0.10, 0.20, 0.30],
            tier_scale: [1.0, 0.75, 0.5, 0.25],
            tier_max_exposure: [1.0, 0.75, 0.5, 0.25],
            tier_daily_loss_limit: [0.03, 0.02, 0.015, 0.01],
            max_position_fraction: 0.10,
            conditional_sizing_factor: 0.5,
            scoring: ScoringSettings::default(),
        }
    }
}

impl ReadinessSettings {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.conditional_threshold)
            || !(0.0..=100.0).contains(&self.approve_threshold)
            || self.conditional_threshold > self.approve_threshold
        {
            return Err(Error::InvalidSettings(format!(
                "thresholds must satisfy 0 <= conditional ({}) <= approve ({}) <= 100",
                self.conditional_threshold, self.approve_threshold
            )));
        }
        if self.tier_drawdown_bounds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::InvalidSettings(
                "tier drawdown bounds must be strictly increasing".to_string(),
            ));
        }
        let fractions = self
            .tier_scale
            .iter()
            .chain(&self.tier_max_exposure)
            .chain(&self.tier_daily_loss_limit)
            .chain([&self.max_position_fraction, &self.conditional_sizing_factor]);
        for value in fractions {
            if !(0.0..=1.0).contains(value) {
                return Err(Error::InvalidSettings(format!(
                    "sizing fractions must lie in [0, 1], got {value}"
                )));
            }
        }
        self.scoring.validate()?;
        Ok(())
    }

    pub fn risk_tier(&self, max_drawdown: f64) -> RiskTier {
        let [low, medium, high] = self.tier_drawdown_bounds;
        match max_drawdown {
            d if d < low => RiskTier::Low,
            d if d < medium => RiskTier::Medium,
            d if d < high => RiskTier::High,
            _ => RiskTier::Extreme,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_tier_bands() {
        let settings = ReadinessSettings::default();
        assert_eq!(settings.risk_tier(0.05), RiskTier::Low);
        assert_eq!(settings.risk_tier(0.10), RiskTier::Medium);
        assert_eq!(settings.risk_tier(0.183), RiskTier::Medium);
        assert_eq!(settings.risk_tier(0.25), RiskTier::High);
        assert_eq!(settings.risk_tier(0.30), RiskTier::Extreme);
    }

    #[test]
    fn default_settings_validate() {
        assert!(ReadinessSettings::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let settings = ReadinessSettings {
            approve_threshold: 60.0,
            ..ReadinessSettings::default()
        };
        assert!(matches!(settings.validate(), Err(Error::InvalidSettings(_))));
    }

    #[test]
    fn rejects_unordered_tier_bounds() {
        let settings = ReadinessSettings {
            tier_drawdown_bounds: [0.2, 0.1, 0.3],
            ..ReadinessSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn scoring_errors_propagate() {
        let mut settings = ReadinessSettings::default();
        settings.scoring.weights.sharpe = 20.0;
        assert!(matches!(settings.validate(), Err(Error::Scoring(_))));
    }
}
