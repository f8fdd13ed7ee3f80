// In crates/strategies/src/error.rs

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid strategy parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
