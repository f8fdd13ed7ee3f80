// In crates/strategies/src/lib.rs

//! Reference strategies that plug into the validation core through
//! `core_types::StrategyRunner`.

pub mod error;
pub mod ma_crossover;
pub mod types;

// Re-export the most important types for easy access.
pub use error::{Error, Result};
pub use ma_crossover::EmaCrossover;
pub use types::{EmaCrossoverSettings, Signal};
