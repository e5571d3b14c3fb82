// In crates/engine/src/error.rs

use thiserror::Error;

/// Everything a command sent to the book owner can fail with.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Rejected(#[from] risk::Rejection),

    #[error("Sizing failed: {0}")]
    Sizing(#[from] risk::Error),

    #[error("Book refused the command: {0}")]
    Book(#[from] execution::Error),

    #[error(transparent)]
    InvalidStrategy(#[from] core_types::Error),

    #[error("The book owner task has stopped")]
    ChannelClosed,
}

/// The taxonomy callers branch on. Every [`Error`] maps to exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Policy,
    InsufficientBalance,
    InvariantViolation,
    ChannelClosed,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Rejected(rejection) => match rejection.kind() {
                risk::RejectionKind::Validation => ErrorKind::Validation,
                risk::RejectionKind::Policy => ErrorKind::Policy,
            },
            Error::Sizing(risk::Error::InsufficientBalance { .. }) => ErrorKind::InsufficientBalance,
            Error::Sizing(risk::Error::InvalidParameters(_)) => ErrorKind::Validation,
            Error::Book(e) if e.is_invariant_violation() => ErrorKind::InvariantViolation,
            Error::Book(execution::Error::InsufficientBalance { .. }) => ErrorKind::InsufficientBalance,
            Error::Book(_) => ErrorKind::Validation,
            Error::InvalidStrategy(_) => ErrorKind::Validation,
            Error::ChannelClosed => ErrorKind::ChannelClosed,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
