// In crates/pipeline/src/pipeline.rs

use std::sync::Arc;

use analytics::ProfitabilityAnalyzer;
use core_types::{BacktestResult, CancelToken, Stage, StageOutput, Warning, WarningKind};
use cost_model::{
    ExecutionQualityAnalyzer, LiquiditySource, SlippageEstimator, StaticLiquidityTable,
    daily_volatility_from_klines,
};
use rayon::{ThreadPool, ThreadPoolBuilder};
use readiness::{Artifacts, ReadinessEvaluator, ReadinessReport};
use tracing::{debug, info, info_span};
use validation::{MonteCarloSimulator, MultiMarketResult, MultiMarketTester, WalkForwardResult, WalkForwardValidator};

use crate::error::Result;
use crate::types::{MarketInput, PipelineSettings, WalkForwardData};

/// Runs every stage over one backtest and reduces them to a `ReadinessReport`.
///
/// Stages after profitability only read the backtest, so they fan out on the
/// pipeline's own rayon pool. A pipeline can be shared across threads and
/// reused for any number of evaluations.
pub struct Pipeline {
    settings: PipelineSettings,
    pool: ThreadPool,
    liquidity: Arc<dyn LiquiditySource>,
    analyzer: ProfitabilityAnalyzer,
    execution: ExecutionQualityAnalyzer,
    multi_market: MultiMarketTester,
    walk_forward: WalkForwardValidator,
    monte_carlo: MonteCarloSimulator,
    evaluator: ReadinessEvaluator,
}

impl Pipeline {
    /// Builds a pipeline whose liquidity lookups come from `settings.cost_model.liquidity`.
    pub fn new(settings: PipelineSettings) -> Result<Self> {
        let table = StaticLiquidityTable::new(settings.cost_model.liquidity.clone());
        Self::with_liquidity_source(settings, Arc::new(table))
    }

    /// Builds a pipeline that resolves liquidity through an injected source.
    pub fn with_liquidity_source(
        settings: PipelineSettings,
        liquidity: Arc<dyn LiquiditySource>,
    ) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(settings.worker_threads)
            .thread_name(|i| format!("pipeline-worker-{i}"))
            .build()?;
        let analyzer = ProfitabilityAnalyzer::new(settings.profitability.clone());

        Ok(Self {
            pool,
            liquidity,
            execution: ExecutionQualityAnalyzer::new(settings.execution_quality.clone()),
            multi_market: MultiMarketTester::new(settings.multi_market.clone(), analyzer.clone()),
            walk_forward: WalkForwardValidator::new(settings.walk_forward.clone(), analyzer.clone())?,
            monte_carlo: MonteCarloSimulator::new(settings.monte_carlo.clone())?,
            evaluator: ReadinessEvaluator::new(settings.readiness.clone())?,
            analyzer,
            settings,
        })
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Evaluates one backtest. Identical inputs give identical reports.
    ///
    /// Cancellation never fails the call: stages stop between units of work
    /// and the report carries their partial aggregates with `Cancelled` warnings.
    pub fn evaluate(
        &self,
        backtest: &BacktestResult,
        market: &MarketInput,
        cancel: &CancelToken,
    ) -> Result<ReadinessReport> {
        self.pool.install(|| self.run_stages(backtest, market, cancel))
    }

    /// `evaluate` on tokio's blocking pool, for async callers.
    pub async fn evaluate_async(
        self: Arc<Self>,
        backtest: Arc<BacktestResult>,
        market: MarketInput,
        cancel: CancelToken,
    ) -> Result<ReadinessReport> {
        tokio::task::spawn_blocking(move || self.evaluate(&backtest, &market, &cancel)).await?
    }

    fn run_stages(
        &self,
        backtest: &BacktestResult,
        market: &MarketInput,
        cancel: &CancelToken,
    ) -> Result<ReadinessReport> {
        let meta = backtest.meta();
        let _span = info_span!("evaluate", strategy = %meta.strategy_id, run = %meta.run_id).entered();
        info!(
            trades = backtest.trades().len(),
            datasets = market.datasets.len(),
            runner = market.runner.as_ref().map(|r| r.name()),
            "Starting evaluation."
        );

        // --- 1. Profitability ---
        let profit = self.analyzer.analyze(backtest);

        // --- 2. Independent stages ---
        let ((cost, execution), (multi_market, (walk_forward, monte_carlo))) = rayon::join(
            || {
                rayon::join(
                    || self.cost_stage(backtest, market),
                    || self.execution.analyze(backtest.trades()),
                )
            },
            || {
                rayon::join(
                    || self.multi_market_stage(backtest, market, cancel),
                    || {
                        rayon::join(
                            || self.walk_forward_stage(backtest, market, cancel),
                            || self.monte_carlo.run(backtest, cancel),
                        )
                    },
                )
            },
        );
        let cost = cost?;

        // --- 3. Collect warnings in stage order ---
        let mut warnings = Vec::new();
        warnings.extend(profit.warnings);
        warnings.extend(cost.warnings);
        warnings.extend(execution.warnings);
        warnings.extend(multi_market.warnings);
        warnings.extend(walk_forward.warnings);
        warnings.extend(monte_carlo.warnings);
        debug!(warnings = warnings.len(), "Stages finished.");

        // --- 4. Verdict ---
        let artifacts = Artifacts {
            profit: profit.value,
            cost: cost.value,
            execution: Some(execution.value),
            multi_market: multi_market.value,
            walk_forward: walk_forward.value,
            monte_carlo: monte_carlo.value,
        };
        let report = self
            .evaluator
            .evaluate(meta.clone(), backtest.sufficiency(), artifacts, warnings)?;
        info!(
            status = ?report.status,
            score = report.total_score(),
            "Evaluation complete."
        );
        Ok(report)
    }

    fn cost_stage(
        &self,
        backtest: &BacktestResult,
        market: &MarketInput,
    ) -> Result<StageOutput<Option<cost_model::PortfolioCostEstimate>>> {
        // A fresh estimator per evaluation keeps the liquidity cache scoped to it.
        let estimator = SlippageEstimator::new(self.settings.cost_model.clone(), Arc::clone(&self.liquidity));
        let volatility = market
            .dataset(backtest.symbol(), backtest.timeframe())
            .and_then(daily_volatility_from_klines);
        Ok(estimator.estimate_backtest(backtest, volatility)?)
    }

    fn multi_market_stage(
        &self,
        backtest: &BacktestResult,
        market: &MarketInput,
        cancel: &CancelToken,
    ) -> StageOutput<Option<MultiMarketResult>> {
        let Some(runner) = &market.runner else {
            return skipped(Stage::MultiMarket, "no strategy runner supplied");
        };
        if market.datasets.is_empty() {
            return skipped(Stage::MultiMarket, "no market datasets supplied");
        }
        self.multi_market
            .run(
                runner.as_ref(),
                &market.base_params,
                &market.datasets,
                backtest.initial_capital(),
                cancel,
            )
            .map(Some)
    }

    fn walk_forward_stage(
        &self,
        backtest: &BacktestResult,
        market: &MarketInput,
        cancel: &CancelToken,
    ) -> StageOutput<Option<WalkForwardResult>> {
        let dataset = match (&market.walk_forward, &market.runner) {
            (WalkForwardData::TradeSplit, _) | (_, None) => None,
            (WalkForwardData::Primary, Some(runner)) => market
                .dataset(backtest.symbol(), backtest.timeframe())
                .map(|data| (runner, data)),
            (WalkForwardData::Dataset { symbol, timeframe }, Some(runner)) => {
                match market.dataset(symbol, timeframe) {
                    Some(data) => Some((runner, data)),
                    None => {
                        let mut output = self.walk_forward.run_trade_split(backtest, cancel);
                        output.warnings.push(Warning::new(
                            Stage::WalkForward,
                            WarningKind::StageSkipped,
                            format!("no {symbol} {timeframe} dataset; split the backtest trades instead"),
                        ));
                        return output;
                    }
                }
            }
        };

        match dataset {
            Some((runner, data)) => self.walk_forward.run_replay(
                runner.as_ref(),
                &market.base_params,
                data,
                backtest.initial_capital(),
                cancel,
            ),
            None => {
                debug!("Walk-forward falls back to splitting backtest trades.");
                self.walk_forward.run_trade_split(backtest, cancel)
            }
        }
    }
}

fn skipped<T>(stage: Stage, reason: &str) -> StageOutput<Option<T>> {
    StageOutput::with_warnings(None, vec![Warning::new(stage, WarningKind::StageSkipped, reason)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_stage_settings_fail_construction() {
        let mut settings = PipelineSettings::default();
        settings.monte_carlo.trials = 10;
        assert!(matches!(
            Pipeline::new(settings),
            Err(crate::Error::Validation(validation::Error::TooFewTrials { .. }))
        ));
    }

    #[test]
    fn worker_threads_bound_the_pool() {
        let settings = PipelineSettings {
            worker_threads: 2,
            ..PipelineSettings::default()
        };
        let pipeline = Pipeline::new(settings).unwrap();
        assert_eq!(pipeline.pool.current_num_threads(), 2);
    }
}
