// In crates/readiness/src/error.rs

use thiserror::Error;

use crate::types::ReadinessStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Readiness status cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        from: ReadinessStatus,
        to: ReadinessStatus,
    },

    #[error("Invalid readiness settings: {0}")]
    InvalidSettings(String),

    #[error(transparent)]
    Scoring(#[from] scoring::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
