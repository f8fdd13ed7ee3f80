// In crates/analytics/src/lib.rs

pub mod drawdown;
pub mod engine;
pub mod stats;
pub mod types;

// Re-export the most important types for easy access.
pub use engine::{ProfitabilityAnalyzer, kelly_fraction};
pub use types::{ConfidenceInterval, ProfitFactor, ProfitMetrics, ProfitabilitySettings};
