// In crates/execution/src/error.rs

use core_types::{PositionId, Symbol};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Insufficient balance: {required} required, {available} available")]
    InsufficientBalance { required: Decimal, available: Decimal },

    #[error("A position is already open for {0}")]
    DuplicateSymbol(Symbol),

    #[error("Open position limit reached ({limit})")]
    CapacityExceeded { limit: usize },

    #[error("Unknown position {0}")]
    UnknownPosition(PositionId),

    #[error("Invalid price {price} for {symbol}")]
    InvalidPrice { symbol: Symbol, price: Decimal },

    #[error("Ledger amounts must be positive, got {0}")]
    InvalidAmount(Decimal),

    #[error("Amount {0} is outside what the account can hold")]
    OutOfRange(Decimal),
}

impl Error {
    /// Errors that mean the command raced with another one and must be
    /// abandoned, as opposed to ordinary account or input problems.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Error::DuplicateSymbol(_) | Error::CapacityExceeded { .. } | Error::UnknownPosition(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
