// In crates/app-config/src/types.rs

use analytics::ProfitabilitySettings;
use cost_model::{CostModelSettings, ExecutionQualitySettings, LiquidityInfo};
use ingestion::IngestionSettings;
use pipeline::PipelineSettings;
use readiness::{LearnerSettings, ReadinessSettings};
use report_store::StoreSettings;
use rust_decimal::Decimal;
use scoring::ScoringSettings;
use serde::{Deserialize, Serialize};
use strategies::EmaCrossoverSettings;
use validation::{MonteCarloSettings, MultiMarketSettings, WalkForwardSettings};

use crate::error::{Error, Result};

/// The full application configuration. Every section is optional in the
/// files and falls back to its defaults.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub app: AppSettings,
    pub ingestion: IngestionSettings,
    pub profitability: ProfitabilitySettings,
    pub cost_model: CostModelSettings,
    pub execution_quality: ExecutionQualitySettings,
    pub multi_market: MultiMarketSettings,
    pub walk_forward: WalkForwardSettings,
    pub monte_carlo: MonteCarloSettings,
    /// Curves and weights; this section replaces `readiness.scoring`.
    pub scoring: ScoringSettings,
    pub readiness: ReadinessSettings,
    pub learner: LearnerSettings,
    pub store: StoreSettings,
    pub strategy: EmaCrossoverSettings,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    /// The environment the application is running in (e.g., "development", "production").
    pub environment: String,
    /// Default level for the log filter.
    pub log_level: String,
    /// Rayon pool size per pipeline; 0 means one per core.
    pub worker_threads: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            log_level: "info".to_string(),
            worker_threads: 0,
        }
    }
}

/// Contents of a standalone liquidity table file.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct LiquidityFile {
    #[serde(default)]
    pub symbols: Vec<LiquidityInfo>,
}

impl Settings {
    /// Checks cross-field constraints the individual sections cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.ingestion.initial_capital <= Decimal::ZERO {
            return Err(invalid("ingestion", "initial_capital must be positive"));
        }
        if self.ingestion.min_trades == 0 {
            return Err(invalid("ingestion", "min_trades must be at least 1"));
        }
        self.walk_forward.validate().map_err(|e| invalid("walk_forward", e))?;
        self.monte_carlo.validate().map_err(|e| invalid("monte_carlo", e))?;
        self.scoring.validate().map_err(|e| invalid("scoring", e))?;
        self.readiness_settings()
            .validate()
            .map_err(|e| invalid("readiness", e))?;
        self.learner.validate().map_err(|e| invalid("learner", e))?;
        if self.strategy.fast_period == 0 || self.strategy.fast_period >= self.strategy.slow_period {
            return Err(invalid("strategy", "fast_period must be positive and below slow_period"));
        }
        Ok(())
    }

    pub fn readiness_settings(&self) -> ReadinessSettings {
        ReadinessSettings {
            scoring: self.scoring.clone(),
            ..self.readiness.clone()
        }
    }

    /// The slice of configuration one evaluation pipeline runs on.
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            worker_threads: self.app.worker_threads,
            profitability: self.profitability.clone(),
            cost_model: self.cost_model.clone(),
            execution_quality: self.execution_quality.clone(),
            multi_market: self.multi_market.clone(),
            walk_forward: self.walk_forward.clone(),
            monte_carlo: self.monte_carlo.clone(),
            readiness: self.readiness_settings(),
        }
    }
}

fn invalid(section: &'static str, reason: impl std::fmt::Display) -> Error {
    Error::Invalid {
        section,
        reason: reason.to_string(),
    }
}
