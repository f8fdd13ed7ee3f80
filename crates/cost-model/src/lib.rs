// In crates/cost-model/src/lib.rs

pub mod error;
pub mod execution_quality;
pub mod liquidity;
pub mod slippage;
pub mod types;

// Re-export the most important types for easy access.
pub use error::{Error, Result};
pub use execution_quality::ExecutionQualityAnalyzer;
pub use liquidity::{LiquidityCache, LiquiditySource, StaticLiquidityTable};
pub use slippage::{SlippageEstimator, daily_volatility_from_klines};
pub use types::{
    CostEstimate, CostModelSettings, ExecutionQuality, ExecutionQualitySettings, ExecutionRating,
    LiquidityInfo, LiquidityTier, PortfolioCostEstimate, SignalFrequency, SlippageBreakdown,
    TimeOfDay,
};
