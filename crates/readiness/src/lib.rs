// In crates/readiness/src/lib.rs

pub mod error;
pub mod evaluator;
pub mod learner;
pub mod state;
pub mod types;

// Re-export the most important types for easy access.
pub use error::{Error, Result};
pub use evaluator::ReadinessEvaluator;
pub use learner::{Adjustment, Direction, LearnerSettings, LiveOutcome, ThresholdLearner};
pub use types::{
    Artifacts, CriticalCheck, CriticalChecks, CriticalFailure, ReadinessReport,
    ReadinessSettings, ReadinessStatus, Recommendation, RecommendationSource, RiskTier,
    ScoreSummary, Sizing, StatusReason,
};
