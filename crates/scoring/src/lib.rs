// In crates/scoring/src/lib.rs

pub mod error;
pub mod scorer;
pub mod types;

// Re-export the most important types for easy access.
pub use error::{Error, Result};
pub use scorer::{ComprehensiveScorer, ScoringInputs};
pub use types::{
    ComponentScores, Grade, Metric, Pillar, PillarScore, ScoringCurves, ScoringSettings,
    ScoringWeights, SubScore, ThresholdCurve,
};
