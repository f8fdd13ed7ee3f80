// In crates/validation/src/error.rs

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Monte Carlo needs at least {minimum} trials, {trials} configured")]
    TooFewTrials { trials: usize, minimum: usize },

    #[error("Invalid validation settings: {0}")]
    InvalidSettings(String),
}

pub type Result<T> = std::result::Result<T, Error>;
