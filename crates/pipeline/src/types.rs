// In crates/pipeline/src/types.rs

use std::fmt;
use std::sync::Arc;

use analytics::ProfitabilitySettings;
use core_types::{MarketData, StrategyParams, StrategyRunner, Symbol, Timeframe};
use cost_model::{CostModelSettings, ExecutionQualitySettings};
use readiness::ReadinessSettings;
use serde::{Deserialize, Serialize};
use validation::{MonteCarloSettings, MultiMarketSettings, WalkForwardSettings};

/// Everything one `Pipeline` needs, one section per stage.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Size of the rayon pool; 0 lets rayon pick one thread per core.
    pub worker_threads: usize,
    pub profitability: ProfitabilitySettings,
    pub cost_model: CostModelSettings,
    pub execution_quality: ExecutionQualitySettings,
    pub multi_market: MultiMarketSettings,
    pub walk_forward: WalkForwardSettings,
    pub monte_carlo: MonteCarloSettings,
    pub readiness: ReadinessSettings,
}

/// Which data the walk-forward validator works from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum WalkForwardData {
    /// Replay the dataset matching the backtest's symbol and timeframe.
    #[default]
    Primary,
    Dataset { symbol: Symbol, timeframe: Timeframe },
    /// Split the backtest's own trades; needs no runner or klines.
    TradeSplit,
}

/// Market-side inputs to an evaluation.
#[derive(Clone, Default)]
pub struct MarketInput {
    pub datasets: Vec<MarketData>,
    pub runner: Option<Arc<dyn StrategyRunner>>,
    pub base_params: StrategyParams,
    pub walk_forward: WalkForwardData,
}

impl MarketInput {
    pub fn new(datasets: Vec<MarketData>) -> Self {
        Self {
            datasets,
            ..Self::default()
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn StrategyRunner>, base_params: StrategyParams) -> Self {
        self.runner = Some(runner);
        self.base_params = base_params;
        self
    }

    pub fn with_walk_forward(mut self, walk_forward: WalkForwardData) -> Self {
        self.walk_forward = walk_forward;
        self
    }

    pub fn dataset(&self, symbol: &Symbol, timeframe: &Timeframe) -> Option<&MarketData> {
        self.datasets
            .iter()
            .find(|m| &m.symbol == symbol && &m.timeframe == timeframe)
    }
}

impl fmt::Debug for MarketInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarketInput")
            .field("datasets", &self.datasets.len())
            .field("runner", &self.runner.as_ref().map(|r| r.name().to_string()))
            .field("base_params", &self.base_params)
            .field("walk_forward", &self.walk_forward)
            .finish()
    }
}
