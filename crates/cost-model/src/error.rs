// In crates/cost-model/src/error.rs

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Order size must be positive, got {0}")]
    InvalidOrderSize(f64),

    #[error("Volatility must be a finite, non-negative fraction, got {0}")]
    InvalidVolatility(f64),

    #[error("Invalid cost model settings: {0}")]
    InvalidSettings(String),
}

pub type Result<T> = std::result::Result<T, Error>;
