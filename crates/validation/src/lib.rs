// In crates/validation/src/lib.rs

pub mod error;
pub mod monte_carlo;
pub mod multi_market;
pub mod regime;
pub mod types;
pub mod walk_forward;

// Re-export the most important types for easy access.
pub use error::{Error, Result};
pub use monte_carlo::MonteCarloSimulator;
pub use multi_market::MultiMarketTester;
pub use walk_forward::WalkForwardValidator;
pub use types::*;
