// In crates/scoring/src/scorer.rs

use analytics::ProfitMetrics;
use core_types::{Stage, StageOutput, Warning, WarningKind};
use cost_model::{ExecutionQuality, PortfolioCostEstimate};
use tracing::debug;
use validation::{MultiMarketSummary, WalkForwardResult};

use crate::error::Result;
use crate::types::{ComponentScores, Grade, Metric, Pillar, PillarScore, ScoringSettings, SubScore};

/// Everything the scorer reads. Only profitability is mandatory; the other
/// stages may have been skipped.
#[derive(Debug, Clone, Copy)]
pub struct ScoringInputs<'a> {
    pub profit: &'a ProfitMetrics,
    pub cost: Option<&'a PortfolioCostEstimate>,
    pub execution: Option<&'a ExecutionQuality>,
    pub walk_forward: Option<&'a WalkForwardResult>,
    pub multi_market: Option<&'a MultiMarketSummary>,
}

/// Deterministic weighted reducer over the stage outputs.
#[derive(Debug, Clone)]
pub struct ComprehensiveScorer {
    settings: ScoringSettings,
}

impl ComprehensiveScorer {
    pub fn new(settings: ScoringSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &ScoringSettings {
        &self.settings
    }

    pub fn score(&self, inputs: &ScoringInputs<'_>) -> StageOutput<ComponentScores> {
        let subs: Vec<SubScore> = Metric::ALL
            .iter()
            .map(|m| self.sub_score(*m, self.raw_value(*m, inputs)))
            .collect();

        let pillar = |p: Pillar| {
            let components: Vec<SubScore> =
                subs.iter().filter(|s| s.metric.pillar() == p).copied().collect();
            PillarScore {
                pillar: p,
                points: components.iter().map(|s| s.points).sum(),
                max_points: p.max_points(),
                components,
            }
        };
        let performance = pillar(Pillar::Performance);
        let risk = pillar(Pillar::Risk);
        let execution = pillar(Pillar::Execution);
        let robustness = pillar(Pillar::Robustness);
        let total = performance.points + risk.points + execution.points + robustness.points;

        let mut warnings = Vec::new();
        let skipped: Vec<String> = subs
            .iter()
            .filter(|s| !s.evaluated)
            .map(|s| s.metric.to_string())
            .collect();
        if !skipped.is_empty() {
            warnings.push(Warning::new(
                Stage::Scoring,
                WarningKind::StageSkipped,
                format!("not evaluated, scored 0: {}", skipped.join(", ")),
            ));
        }

        debug!(
            total,
            performance = performance.points,
            risk = risk.points,
            execution = execution.points,
            robustness = robustness.points,
            "Component scores computed."
        );
        let scores = ComponentScores {
            performance,
            risk,
            execution,
            robustness,
            total,
            grade: Grade::from_score(total),
        };
        StageOutput::with_warnings(scores, warnings)
    }

    fn sub_score(&self, metric: Metric, raw: Option<f64>) -> SubScore {
        let max_points = self.settings.weights.get(metric);
        let raw = raw.filter(|v| v.is_finite());
        let points = raw.map_or(0.0, |v| max_points * self.settings.curves.get(metric).fraction(v));
        SubScore {
            metric,
            raw,
            points,
            max_points,
            evaluated: raw.is_some(),
        }
    }

    fn raw_value(&self, metric: Metric, inputs: &ScoringInputs<'_>) -> Option<f64> {
        let p = inputs.profit;
        let traded = p.total_trades > 0;
        match metric {
            Metric::Sharpe => traded.then_some(p.sharpe),
            Metric::AnnualReturn => traded.then_some(p.annualized_return),
            Metric::WinRate => traded.then_some(p.win_rate),
            Metric::Drawdown => traded.then_some(p.max_drawdown),
            Metric::Consistency => p.monthly_win_ratio.filter(|_| traded),
            Metric::RecoveryTime => traded.then(|| p.max_drawdown_duration_days()),
            Metric::FrequencyFit => inputs.cost.map(|c| c.edge_to_cost_ratio),
            Metric::Latency => Some(
                inputs
                    .execution
                    .and_then(|e| e.latency)
                    .map_or(self.settings.expected_delay_ms, |l| l.p90_ms),
            ),
            Metric::Slippage => inputs
                .cost
                .map(|c| c.per_trade.breakdown.total_bps)
                .or_else(|| inputs.execution.and_then(|e| e.avg_slippage_bps).map(|s| s.max(0.0))),
            Metric::OutOfSampleRatio => inputs
                .walk_forward
                .filter(|w| !w.windows.is_empty())
                .map(|w| w.oos_is_ratio),
            Metric::CrossMarket => inputs
                .multi_market
                .filter(|m| m.cells_tested > 0)
                .map(|m| m.pass_rate),
        }
    }
}

impl Default for ComprehensiveScorer {
    fn default() -> Self {
        Self {
            settings: ScoringSettings::default(),
        }
    }
}
