// In crates/readiness/src/learner.rs

use scoring::ScoringSettings;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::{ReadinessReport, ReadinessStatus};

/// How a deployed strategy actually performed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveOutcome {
    pub strategy_id: String,
    pub run_id: String,
    pub live_sharpe: f64,
    pub live_max_drawdown: f64,
    pub days_live: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerSettings {
    /// Relative step applied when live results fall short.
    pub tighten_step: f64,
    /// Relative step applied when live results hold up. Kept small.
    pub relax_step: f64,
    pub sharpe_target_bounds: (f64, f64),
    pub drawdown_target_bounds: (f64, f64),
    /// Live Sharpe below `backtest * tolerance`, or live drawdown above
    /// `backtest / tolerance`, counts as a shortfall.
    pub shortfall_tolerance: f64,
    pub min_days_live: u32,
}

impl Default for LearnerSettings {
    fn default() -> Self {
        Self {
            tighten_step: 0.10,
            relax_step: 0.02,
            sharpe_target_bounds: (1.0, 4.0),
            drawdown_target_bounds: (0.05, 0.20),
            shortfall_tolerance: 0.5,
            min_days_live: 30,
        }
    }
}

impl LearnerSettings {
    pub fn validate(&self) -> Result<()> {
        let steps_ok = (0.0..1.0).contains(&self.tighten_step) && (0.0..1.0).contains(&self.relax_step);
        let bounds_ok = self.sharpe_target_bounds.0 < self.sharpe_target_bounds.1
            && self.drawdown_target_bounds.0 < self.drawdown_target_bounds.1;
        let tolerance_ok = self.shortfall_tolerance > 0.0 && self.shortfall_tolerance <= 1.0;
        if steps_ok && bounds_ok && tolerance_ok {
            Ok(())
        } else {
            Err(Error::InvalidSettings(format!("invalid learner settings: {self:?}")))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Tightened,
    Relaxed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Adjustment {
    pub direction: Direction,
    pub sharpe_target: f64,
    pub drawdown_target: f64,
}

/// Feedback loop from live results to the next run's scoring thresholds.
///
/// The caller owns the learner and decides when to feed the proposal back
/// into configuration; nothing here is shared between evaluations.
#[derive(Debug, Clone)]
pub struct ThresholdLearner {
    settings: LearnerSettings,
    current: ScoringSettings,
    observations: usize,
}

impl ThresholdLearner {
    pub fn new(settings: LearnerSettings, current: ScoringSettings) -> Result<Self> {
        settings.validate()?;
        current.validate()?;
        Ok(Self {
            settings,
            current,
            observations: 0,
        })
    }

    /// Folds one live outcome into the proposal. Returns `None` when the pair
    /// carries no signal: mismatched ids, a strategy that was never deployed,
    /// or too short a live period.
    pub fn observe(&mut self, report: &ReadinessReport, outcome: &LiveOutcome) -> Option<Adjustment> {
        if report.strategy_id() != outcome.strategy_id || report.run_id() != outcome.run_id {
            debug!(strategy = %outcome.strategy_id, run = %outcome.run_id, "Outcome does not match report");
            return None;
        }
        if !matches!(report.status, ReadinessStatus::Approved | ReadinessStatus::Conditional) {
            return None;
        }
        if outcome.days_live < self.settings.min_days_live || report.score.is_none() {
            return None;
        }

        let profit = &report.artifacts.profit;
        let tolerance = self.settings.shortfall_tolerance;
        let shortfall = outcome.live_sharpe < profit.sharpe * tolerance
            || outcome.live_max_drawdown > profit.max_drawdown / tolerance;

        let (sharpe_lo, sharpe_hi) = self.settings.sharpe_target_bounds;
        let (dd_lo, dd_hi) = self.settings.drawdown_target_bounds;
        let curves = &mut self.current.curves;
        let direction = if shortfall {
            let step = self.settings.tighten_step;
            curves.sharpe.target = (curves.sharpe.target * (1.0 + step)).clamp(sharpe_lo, sharpe_hi);
            curves.max_drawdown.target = (curves.max_drawdown.target * (1.0 - step)).clamp(dd_lo, dd_hi);
            Direction::Tightened
        } else {
            let step = self.settings.relax_step;
            curves.sharpe.target = (curves.sharpe.target * (1.0 - step)).clamp(sharpe_lo, sharpe_hi);
            curves.max_drawdown.target = (curves.max_drawdown.target * (1.0 + step)).clamp(dd_lo, dd_hi);
            Direction::Relaxed
        };
        self.observations += 1;

        let adjustment = Adjustment {
            direction,
            sharpe_target: curves.sharpe.target,
            drawdown_target: curves.max_drawdown.target,
        };
        info!(
            direction = ?direction,
            sharpe_target = adjustment.sharpe_target,
            drawdown_target = adjustment.drawdown_target,
            live_sharpe = outcome.live_sharpe,
            "Scoring thresholds adjusted"
        );
        Some(adjustment)
    }

    pub fn observations(&self) -> usize {
        self.observations
    }

    /// The settings the next evaluation should use.
    pub fn proposal(&self) -> &ScoringSettings {
        &self.current
    }

    pub fn into_settings(self) -> ScoringSettings {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Artifacts, ScoreSummary, Sizing, StatusReason};
    use analytics::{ConfidenceInterval, ProfitFactor, ProfitMetrics};
    use core_types::{DataSufficiency, RunMetadata, Symbol, Timeframe};
    use rust_decimal::Decimal;
    use scoring::Grade;

    fn report(status: ReadinessStatus) -> ReadinessReport {
        let profit = ProfitMetrics {
            total_trades: 120,
            winning_trades: 70,
            losing_trades: 50,
            net_pnl: Decimal::new(5_000, 0),
            total_return: 0.5,
            annualized_return: 0.3,
            periods_per_year: 365.25,
            sharpe: 2.0,
            sortino: 2.8,
            calmar: 2.0,
            max_drawdown: 0.15,
            max_drawdown_duration_secs: 20 * 86_400,
            recovery_factor: Some(3.3),
            win_rate: 70.0 / 120.0,
            profit_factor: ProfitFactor::Ratio(1.9),
            avg_win: Decimal::new(150, 0),
            avg_loss: Decimal::new(110, 0),
            expectancy: Decimal::new(41, 0),
            avg_trade_duration_secs: 3_600.0,
            monthly_win_ratio: Some(0.7),
            mean_return: 0.004,
            return_std: 0.02,
            return_ci95: ConfidenceInterval { lower: 0.0004, upper: 0.0076 },
            t_statistic: 2.2,
            p_value: 0.03,
            significant: true,
            kelly_fraction: 0.2,
            quality_score: 70.0,
        };
        ReadinessReport {
            meta: RunMetadata {
                strategy_id: "ema_crossover".to_string(),
                run_id: "run-7".to_string(),
                symbol: Symbol::from("ETHUSDT"),
                timeframe: Timeframe::parse("4h").unwrap(),
            },
            sufficiency: DataSufficiency::Sufficient,
            status,
            status_reason: StatusReason::ScoreBand { score: 86.0 },
            score: Some(ScoreSummary { total: 86.0, grade: Grade::B, components: None }),
            risk_tier: None,
            sizing: Sizing::default(),
            critical_failures: Vec::new(),
            recommendations: Vec::new(),
            warnings: Vec::new(),
            artifacts: Artifacts {
                profit,
                cost: None,
                execution: None,
                multi_market: None,
                walk_forward: None,
                monte_carlo: None,
            },
        }
    }

    fn outcome(live_sharpe: f64, live_max_drawdown: f64) -> LiveOutcome {
        LiveOutcome {
            strategy_id: "ema_crossover".to_string(),
            run_id: "run-7".to_string(),
            live_sharpe,
            live_max_drawdown,
            days_live: 90,
        }
    }

    fn learner() -> ThresholdLearner {
        ThresholdLearner::new(LearnerSettings::default(), ScoringSettings::default()).unwrap()
    }

    #[test]
    fn live_shortfall_tightens_targets() {
        let mut learner = learner();
        let adj = learner.observe(&report(ReadinessStatus::Approved), &outcome(0.6, 0.12)).unwrap();

        assert_eq!(adj.direction, Direction::Tightened);
        assert!((adj.sharpe_target - 2.75).abs() < 1e-12);
        assert!((adj.drawdown_target - 0.09).abs() < 1e-12);
        assert_eq!(learner.proposal().curves.sharpe.target, adj.sharpe_target);
        assert!(learner.proposal().validate().is_ok());
    }

    #[test]
    fn deep_live_drawdown_counts_as_shortfall() {
        let mut learner = learner();
        let adj = learner.observe(&report(ReadinessStatus::Conditional), &outcome(1.9, 0.35)).unwrap();
        assert_eq!(adj.direction, Direction::Tightened);
    }

    #[test]
    fn good_live_results_relax_slowly() {
        let mut learner = learner();
        let adj = learner.observe(&report(ReadinessStatus::Approved), &outcome(1.8, 0.14)).unwrap();

        assert_eq!(adj.direction, Direction::Relaxed);
        assert!((adj.sharpe_target - 2.45).abs() < 1e-12);
        assert!((adj.drawdown_target - 0.102).abs() < 1e-12);
    }

    #[test]
    fn targets_stay_within_bounds() {
        let mut learner = learner();
        for _ in 0..50 {
            learner.observe(&report(ReadinessStatus::Approved), &outcome(0.1, 0.5));
        }
        let curves = &learner.proposal().curves;
        assert_eq!(curves.sharpe.target, 4.0);
        assert_eq!(curves.max_drawdown.target, 0.05);
        assert_eq!(learner.observations(), 50);
    }

    #[test]
    fn ignores_unusable_pairs() {
        let mut learner = learner();
        assert!(learner.observe(&report(ReadinessStatus::Rejected), &outcome(0.1, 0.5)).is_none());

        let mut other_run = outcome(0.1, 0.5);
        other_run.run_id = "run-8".to_string();
        assert!(learner.observe(&report(ReadinessStatus::Approved), &other_run).is_none());

        let mut short = outcome(0.1, 0.5);
        short.days_live = 3;
        assert!(learner.observe(&report(ReadinessStatus::Approved), &short).is_none());

        assert_eq!(learner.into_settings(), ScoringSettings::default());
    }
}
