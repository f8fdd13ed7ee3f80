// In crates/pipeline/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to build the worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Cost model failed: {0}")]
    CostModel(#[from] cost_model::Error),

    #[error("Validation settings rejected: {0}")]
    Validation(#[from] validation::Error),

    #[error("Readiness evaluation failed: {0}")]
    Readiness(#[from] readiness::Error),

    #[error("Evaluation task did not complete: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;
