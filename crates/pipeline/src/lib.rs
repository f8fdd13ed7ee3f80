// In crates/pipeline/src/lib.rs

pub mod error;
pub mod pipeline;
pub mod types;

// Re-export the most important types for easy access.
pub use error::{Error, Result};
pub use pipeline::Pipeline;
pub use types::{MarketInput, PipelineSettings, WalkForwardData};
