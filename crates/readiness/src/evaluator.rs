// In crates/readiness/src/evaluator.rs

use std::collections::BTreeSet;

use analytics::ProfitMetrics;
use core_types::{DataSufficiency, RunMetadata, Severity, Stage, Warning, WarningKind};
use scoring::{ComponentScores, ComprehensiveScorer, Metric, ScoringInputs, SubScore};
use tracing::{debug, info, info_span};

use crate::error::Result;
use crate::types::{
    Artifacts, CriticalCheck, CriticalFailure, ReadinessReport, ReadinessSettings,
    ReadinessStatus, Recommendation, RecommendationSource, RiskTier, ScoreSummary, Sizing,
    StatusReason,
};

/// Sub-metrics earning less than this share of their points get a recommendation.
const UNDERPERFORMING_FRACTION: f64 = 0.5;

/// Turns the stage artifacts into a deployment verdict.
///
/// Holds only configuration, so evaluating the same inputs twice yields the
/// same report.
#[derive(Debug, Clone)]
pub struct ReadinessEvaluator {
    settings: ReadinessSettings,
    scorer: ComprehensiveScorer,
}

impl ReadinessEvaluator {
    pub fn new(settings: ReadinessSettings) -> Result<Self> {
        settings.validate()?;
        let scorer = ComprehensiveScorer::new(settings.scoring.clone())?;
        Ok(Self { settings, scorer })
    }

    pub fn settings(&self) -> &ReadinessSettings {
        &self.settings
    }

    pub fn evaluate(
        &self,
        meta: RunMetadata,
        sufficiency: DataSufficiency,
        artifacts: Artifacts,
        mut warnings: Vec<Warning>,
    ) -> Result<ReadinessReport> {
        let _span = info_span!("readiness", strategy = %meta.strategy_id, run = %meta.run_id).entered();
        let status = ReadinessStatus::Evaluating;

        // 1. Not enough trades: report the gap instead of a verdict.
        if let DataSufficiency::Insufficient { trades, required } = sufficiency {
            if !warnings.iter().any(|w| w.kind == WarningKind::InsufficientData) {
                warnings.push(Warning::new(
                    Stage::Readiness,
                    WarningKind::InsufficientData,
                    format!("{trades} trades recorded, {required} needed for a verdict"),
                ));
            }
            info!(trades, required, "Evaluation inconclusive");
            let recommendations = warning_recommendations(&warnings);
            return Ok(ReadinessReport {
                meta,
                sufficiency,
                status,
                status_reason: StatusReason::Inconclusive { trades, required },
                score: None,
                risk_tier: None,
                sizing: Sizing {
                    kelly_fraction: artifacts.profit.kelly_fraction,
                    ..Sizing::default()
                },
                critical_failures: Vec::new(),
                recommendations,
                warnings,
                artifacts,
            });
        }

        // 2. Score.
        let scored = self.scorer.score(&ScoringInputs {
            profit: &artifacts.profit,
            cost: artifacts.cost.as_ref(),
            execution: artifacts.execution.as_ref(),
            walk_forward: artifacts.walk_forward.as_ref(),
            multi_market: artifacts.multi_market.as_ref().map(|m| &m.summary),
        });
        warnings.extend(scored.warnings);
        let components = scored.value;
        let total = components.total;

        // 3. Hard gates, then score bands.
        let critical_failures = self.critical_failures(&artifacts);
        let unresolved = warnings
            .iter()
            .filter(|w| w.severity == Severity::Warning)
            .count();
        let (verdict, status_reason) = if !critical_failures.is_empty() {
            let checks = critical_failures.iter().map(|f| f.check).collect();
            (ReadinessStatus::Rejected, StatusReason::CriticalFailure { checks })
        } else if total >= self.settings.approve_threshold {
            if unresolved > 0 {
                (
                    ReadinessStatus::Conditional,
                    StatusReason::CappedByWarnings { score: total, warnings: unresolved },
                )
            } else {
                (ReadinessStatus::Approved, StatusReason::ScoreBand { score: total })
            }
        } else if total >= self.settings.conditional_threshold {
            (ReadinessStatus::Conditional, StatusReason::ScoreBand { score: total })
        } else {
            (ReadinessStatus::NeedsImprovement, StatusReason::ScoreBand { score: total })
        };
        let status = status.transition(verdict)?;

        // 4. Risk tier and sizing.
        let risk_tier = self.settings.risk_tier(artifacts.profit.max_drawdown);
        let sizing = self.sizing(status, risk_tier, &artifacts.profit);

        // 5. Recommendations.
        let mut recommendations = metric_recommendations(&components);
        recommendations.extend(critical_failures.iter().map(|f| Recommendation {
            source: RecommendationSource::Critical(f.check),
            message: format!("{} {}", f.message, critical_advice(f.check)),
        }));
        recommendations.extend(warning_recommendations(&warnings));

        info!(
            score = total,
            grade = %components.grade,
            status = ?status,
            tier = ?risk_tier,
            critical = critical_failures.len(),
            warnings = warnings.len(),
            "Readiness evaluated"
        );

        Ok(ReadinessReport {
            meta,
            sufficiency,
            status,
            status_reason,
            score: Some(ScoreSummary {
                total,
                grade: components.grade,
                components: Some(components),
            }),
            risk_tier: Some(risk_tier),
            sizing,
            critical_failures,
            recommendations,
            warnings,
            artifacts,
        })
    }

    fn critical_failures(&self, artifacts: &Artifacts) -> Vec<CriticalFailure> {
        let checks = &self.settings.critical;
        let profit = &artifacts.profit;
        let mut failures = Vec::new();

        if let Some(ceiling) = checks.max_drawdown {
            if profit.max_drawdown > ceiling {
                failures.push(CriticalFailure {
                    check: CriticalCheck::Drawdown,
                    message: format!(
                        "Max drawdown {:.1}% exceeds the {:.1}% ceiling.",
                        profit.max_drawdown * 100.0,
                        ceiling * 100.0
                    ),
                });
            }
        }
        if checks.require_significance && !profit.significant {
            failures.push(CriticalFailure {
                check: CriticalCheck::Significance,
                message: format!(
                    "Mean trade return is not statistically significant (p = {:.3}).",
                    profit.p_value
                ),
            });
        }
        if let Some(floor) = checks.min_profit_factor {
            if profit.profit_factor.is_below(floor) {
                failures.push(CriticalFailure {
                    check: CriticalCheck::ProfitFactor,
                    message: format!(
                        "Profit factor {:.2} is below {floor:.2}.",
                        profit.profit_factor.capped(f64::MAX)
                    ),
                });
            }
        }
        if let (Some(ceiling), Some(mc)) = (checks.max_ruin_probability, &artifacts.monte_carlo) {
            if mc.probability_of_ruin > ceiling {
                failures.push(CriticalFailure {
                    check: CriticalCheck::RuinProbability,
                    message: format!(
                        "Probability of ruin {:.1}% exceeds {:.1}%.",
                        mc.probability_of_ruin * 100.0,
                        ceiling * 100.0
                    ),
                });
            }
        }
        if checks.reject_overfitting {
            if let Some(wf) = artifacts.walk_forward.as_ref().filter(|wf| wf.overfitting_detected) {
                failures.push(CriticalFailure {
                    check: CriticalCheck::Overfitting,
                    message: format!(
                        "Walk-forward overfitting score {:.1} is above the ceiling.",
                        wf.overfitting_score
                    ),
                });
            }
        }

        for failure in &failures {
            debug!(check = ?failure.check, "Critical check failed");
        }
        failures
    }

    fn sizing(&self, status: ReadinessStatus, tier: RiskTier, profit: &ProfitMetrics) -> Sizing {
        let kelly_fraction = profit.kelly_fraction;
        let factor = match status {
            ReadinessStatus::Approved => 1.0,
            ReadinessStatus::Conditional => self.settings.conditional_sizing_factor,
            _ => {
                return Sizing {
                    kelly_fraction,
                    ..Sizing::default()
                };
            }
        };
        let i = tier.index();
        let half_kelly = kelly_fraction.max(0.0) / 2.0;
        let position = (half_kelly * self.settings.tier_scale[i]).min(self.settings.max_position_fraction);
        Sizing {
            position_size_fraction: position * factor,
            max_exposure_fraction: self.settings.tier_max_exposure[i] * factor,
            daily_loss_limit_fraction: self.settings.tier_daily_loss_limit[i],
            kelly_fraction,
        }
    }
}

impl Default for ReadinessEvaluator {
    fn default() -> Self {
        let settings = ReadinessSettings::default();
        Self {
            scorer: ComprehensiveScorer::default(),
            settings,
        }
    }
}

// --- Recommendations ---

fn metric_recommendations(components: &ComponentScores) -> Vec<Recommendation> {
    components
        .sub_scores()
        .filter(|s| s.fraction() < UNDERPERFORMING_FRACTION)
        .map(|s| Recommendation {
            source: RecommendationSource::Metric(s.metric),
            message: metric_message(s),
        })
        .collect()
}

fn metric_message(sub: &SubScore) -> String {
    if !sub.evaluated {
        return format!(
            "{} could not be evaluated ({:.1}/{:.1} points); supply the missing input.",
            sub.metric, sub.points, sub.max_points
        );
    }
    let advice = match sub.metric {
        Metric::Sharpe => "Filter low-conviction entries to lift risk-adjusted returns.",
        Metric::AnnualReturn => "Returns are thin; revisit trade selection or position sizing.",
        Metric::WinRate => "Tighten entry criteria or revisit stop placement.",
        Metric::Drawdown => "Add protective stops or cut exposure in adverse regimes.",
        Metric::Consistency => "Too many losing months; check for dependence on one regime.",
        Metric::RecoveryTime => "Drawdowns recover slowly; consider volatility-scaled sizing.",
        Metric::FrequencyFit => "Edge is small next to trading costs; trade less often or aim for larger moves.",
        Metric::Latency => "Shorten the signal-to-fill path.",
        Metric::Slippage => "Use passive orders or move to more liquid markets.",
        Metric::OutOfSampleRatio => "Out-of-sample results lag in-sample; reduce free parameters.",
        Metric::CrossMarket => "The edge does not carry to other markets; check for curve fitting.",
    };
    format!(
        "{} earned {:.1}/{:.1} points. {advice}",
        sub.metric, sub.points, sub.max_points
    )
}

fn critical_advice(check: CriticalCheck) -> &'static str {
    match check {
        CriticalCheck::Drawdown => "Reduce leverage or add a portfolio-level stop before redeploying.",
        CriticalCheck::Significance => "Gather more trades or simplify the signal until the edge is measurable.",
        CriticalCheck::ProfitFactor => "Losses outweigh gains; the strategy needs a new edge.",
        CriticalCheck::RuinProbability => "Cut position size until simulated ruin becomes rare.",
        CriticalCheck::Overfitting => "Re-tune on fewer parameters and re-run walk-forward validation.",
    }
}

fn warning_recommendations(warnings: &[Warning]) -> Vec<Recommendation> {
    let kinds: BTreeSet<WarningKind> = warnings.iter().map(|w| w.kind).collect();
    kinds
        .into_iter()
        .map(|kind| {
            let message = match kind {
                WarningKind::InsufficientData => "Collect more trades before relying on these statistics.",
                WarningKind::UnknownLiquidity => "Add the symbol to the liquidity table; costs assumed the worst tier.",
                WarningKind::Degenerate => "Some statistics fell back to sentinels; inspect the trade list.",
                WarningKind::ExecutionDrift => "Fill quality is deteriorating; review recent executions.",
                WarningKind::Overfitting => "Walk-forward results point to overfitting.",
                WarningKind::HighDispersion => "Results vary widely across markets; narrow the deployment universe.",
                WarningKind::Cancelled => "Evaluation was cancelled; rerun for complete results.",
                WarningKind::StageSkipped => "Some stages were skipped; provide market data for full coverage.",
            };
            Recommendation {
                source: RecommendationSource::Warning(kind),
                message: message.to_string(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use analytics::{ConfidenceInterval, ProfitFactor};
    use core_types::{Symbol, Timeframe};
    use cost_model::{
        CostModelSettings, LiquidityInfo, PortfolioCostEstimate, SignalFrequency,
        SlippageEstimator, TimeOfDay,
    };
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;
    use validation::{
        Consistency, MultiMarketResult, MultiMarketSummary, WalkForwardResult, WalkForwardSource,
        WindowMode,
    };

    fn meta() -> RunMetadata {
        RunMetadata {
            strategy_id: "ema_crossover".to_string(),
            run_id: "run-1".to_string(),
            symbol: Symbol::from("BTCUSDT"),
            timeframe: Timeframe::parse("1h").unwrap(),
        }
    }

    fn strong_metrics() -> ProfitMetrics {
        ProfitMetrics {
            total_trades: 200,
            winning_trades: 140,
            losing_trades: 60,
            net_pnl: dec!(12000),
            total_return: 1.2,
            annualized_return: 0.6,
            periods_per_year: 365.25,
            sharpe: 3.0,
            sortino: 4.0,
            calmar: 7.5,
            max_drawdown: 0.08,
            max_drawdown_duration_secs: 10 * 86_400,
            recovery_factor: Some(15.0),
            win_rate: 0.7,
            profit_factor: ProfitFactor::Ratio(3.1),
            avg_win: dec!(120),
            avg_loss: dec!(80),
            expectancy: dec!(60),
            avg_trade_duration_secs: 7_200.0,
            monthly_win_ratio: Some(0.9),
            mean_return: 0.006,
            return_std: 0.015,
            return_ci95: ConfidenceInterval { lower: 0.004, upper: 0.008 },
            t_statistic: 5.6,
            p_value: 0.0001,
            significant: true,
            kelly_fraction: 0.4,
            quality_score: 90.0,
        }
    }

    fn cost() -> PortfolioCostEstimate {
        let settings = CostModelSettings {
            liquidity: vec![LiquidityInfo {
                symbol: Symbol::from("BTCUSDT"),
                volume_24h_usd: 2e10,
                spread_bps: None,
                depth_usd: None,
            }],
            ..Default::default()
        };
        let per_trade = SlippageEstimator::from_settings(settings)
            .estimate(&Symbol::from("BTCUSDT"), 5_000.0, SignalFrequency::Swing, 0.03, TimeOfDay::Europe)
            .unwrap()
            .value;
        PortfolioCostEstimate {
            round_trip_bps: 2.0 * per_trade.breakdown.total_bps + 8.0,
            per_trade,
            trades_per_day: 0.5,
            fee_bps: 8.0,
            annual_cost_drag_pct: 3.0,
            mean_edge_bps: 60.0,
            edge_to_cost_ratio: 6.0,
        }
    }

    fn walk_forward(overfitting_detected: bool) -> WalkForwardResult {
        WalkForwardResult {
            source: WalkForwardSource::TradeSplit,
            mode: WindowMode::Rolling,
            windows: vec![validation::WalkForwardWindow {
                index: 0,
                in_sample_start: chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
                in_sample_end: chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
                out_of_sample_start: chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
                out_of_sample_end: chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
                params: BTreeMap::new(),
                in_sample: strong_metrics(),
                out_of_sample: strong_metrics(),
                degradation: 0.1,
                oos_is_ratio: 0.9,
                passed: true,
            }],
            mean_in_sample_sharpe: 3.0,
            mean_out_of_sample_sharpe: 2.7,
            oos_is_ratio: 0.9,
            mean_degradation: 0.1,
            instability: 0.05,
            overfitting_score: if overfitting_detected { 70.0 } else { 10.0 },
            overfitting_detected,
            pass_rate: 1.0,
            passed: !overfitting_detected,
            cancelled: false,
        }
    }

    fn multi_market() -> MultiMarketResult {
        MultiMarketResult {
            cells: Vec::new(),
            summary: MultiMarketSummary {
                cells_tested: 10,
                cells_passed: 9,
                pass_rate: 0.9,
                mean_sharpe: 2.0,
                median_sharpe: 2.0,
                std_sharpe: 0.3,
                coefficient_of_variation: Some(0.15),
                penalized_sharpe: 1.85,
                consistency: Consistency::High,
                regime_pass_rates: BTreeMap::new(),
                cancelled: false,
            },
        }
    }

    fn strong_artifacts() -> Artifacts {
        Artifacts {
            profit: strong_metrics(),
            cost: Some(cost()),
            execution: None,
            multi_market: Some(multi_market()),
            walk_forward: Some(walk_forward(false)),
            monte_carlo: None,
        }
    }

    fn evaluate(artifacts: Artifacts, warnings: Vec<Warning>) -> ReadinessReport {
        ReadinessEvaluator::default()
            .evaluate(meta(), DataSufficiency::Sufficient, artifacts, warnings)
            .unwrap()
    }

    #[test]
    fn strong_strategy_is_approved_with_capped_sizing() {
        let report = evaluate(strong_artifacts(), Vec::new());

        assert_eq!(report.status, ReadinessStatus::Approved);
        assert!(report.total_score().unwrap() >= 85.0);
        assert_eq!(report.risk_tier, Some(RiskTier::Low));
        // Half-Kelly 0.2 is capped at 10% of the account.
        assert!((report.sizing.position_size_fraction - 0.10).abs() < 1e-12);
        assert_eq!(report.sizing.max_exposure_fraction, 1.0);
        assert_eq!(report.sizing.daily_loss_limit_fraction, 0.03);
    }

    #[test]
    fn unresolved_warnings_cap_approval_at_conditional() {
        let warning = Warning::new(Stage::CostModel, WarningKind::UnknownLiquidity, "DOGEXYZ unknown");
        let report = evaluate(strong_artifacts(), vec![warning]);

        assert_eq!(report.status, ReadinessStatus::Conditional);
        assert!(matches!(report.status_reason, StatusReason::CappedByWarnings { warnings: 1, .. }));
        assert!((report.sizing.position_size_fraction - 0.05).abs() < 1e-12);
        assert_eq!(report.sizing.max_exposure_fraction, 0.5);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.source == RecommendationSource::Warning(WarningKind::UnknownLiquidity)));
    }

    #[test]
    fn informational_warnings_do_not_block_approval() {
        let warning = Warning::new(Stage::Profitability, WarningKind::Degenerate, "sortino sentinel");
        let report = evaluate(strong_artifacts(), vec![warning]);
        assert_eq!(report.status, ReadinessStatus::Approved);
    }

    #[test]
    fn critical_failure_overrides_a_high_score() {
        let mut artifacts = strong_artifacts();
        artifacts.profit.max_drawdown = 0.42;
        artifacts.walk_forward = Some(walk_forward(true));
        let report = evaluate(artifacts, Vec::new());

        assert_eq!(report.status, ReadinessStatus::Rejected);
        let checks: Vec<_> = report.critical_failures.iter().map(|f| f.check).collect();
        assert_eq!(checks, vec![CriticalCheck::Drawdown, CriticalCheck::Overfitting]);
        assert_eq!(report.risk_tier, Some(RiskTier::Extreme));
        assert_eq!(report.sizing.position_size_fraction, 0.0);
        assert_eq!(report.sizing.max_exposure_fraction, 0.0);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.source == RecommendationSource::Critical(CriticalCheck::Drawdown)));
    }

    #[test]
    fn disabled_checks_do_not_fire() {
        let mut settings = ReadinessSettings::default();
        settings.critical.require_significance = false;
        let evaluator = ReadinessEvaluator::new(settings).unwrap();
        let mut artifacts = strong_artifacts();
        artifacts.profit.significant = false;

        let report = evaluator
            .evaluate(meta(), DataSufficiency::Sufficient, artifacts, Vec::new())
            .unwrap();
        assert!(report.critical_failures.is_empty());
    }

    #[test]
    fn insufficient_data_stays_evaluating_without_a_score() {
        let mut artifacts = strong_artifacts();
        artifacts.profit.total_trades = 0;
        let report = ReadinessEvaluator::default()
            .evaluate(
                meta(),
                DataSufficiency::Insufficient { trades: 0, required: 30 },
                artifacts,
                Vec::new(),
            )
            .unwrap();

        assert_eq!(report.status, ReadinessStatus::Evaluating);
        assert!(report.is_inconclusive());
        assert!(report.score.is_none());
        assert!(report.critical_failures.is_empty());
        assert_eq!(report.sizing.position_size_fraction, 0.0);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].kind, WarningKind::InsufficientData);
    }

    #[test]
    fn weak_metrics_get_targeted_recommendations() {
        let mut artifacts = strong_artifacts();
        artifacts.profit.sharpe = 0.5;
        artifacts.profit.win_rate = 0.4;
        let report = evaluate(artifacts, Vec::new());

        let metrics: Vec<Metric> = report
            .recommendations
            .iter()
            .filter_map(|r| match r.source {
                RecommendationSource::Metric(m) => Some(m),
                _ => None,
            })
            .collect();
        assert_eq!(metrics, vec![Metric::Sharpe, Metric::WinRate]);
        assert!(report.recommendations[0].message.starts_with("Sharpe ratio earned"));
    }

    #[test]
    fn low_score_needs_improvement() {
        let mut artifacts = strong_artifacts();
        artifacts.cost = None;
        artifacts.walk_forward = None;
        artifacts.multi_market = None;
        artifacts.profit.sharpe = 0.8;
        let report = evaluate(artifacts, Vec::new());

        assert_eq!(report.status, ReadinessStatus::NeedsImprovement);
        assert_eq!(report.sizing, Sizing { kelly_fraction: 0.4, ..Sizing::default() });
    }

    #[test]
    fn evaluation_is_idempotent() {
        let evaluator = ReadinessEvaluator::default();
        let run = || {
            evaluator
                .evaluate(meta(), DataSufficiency::Sufficient, strong_artifacts(), Vec::new())
                .unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn report_survives_json_round_trip() {
        let report = evaluate(strong_artifacts(), Vec::new());
        let json = serde_json::to_string(&report).unwrap();
        let back: ReadinessReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
