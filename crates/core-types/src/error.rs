// In crates/core-types/src/error.rs

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// An inbound payload could not be turned into a typed value.
    #[error("Malformed signal payload: {0}")]
    MalformedSignal(String),

    #[error("Invalid strategy configuration `{tier}`: {reason}")]
    InvalidStrategy { tier: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
