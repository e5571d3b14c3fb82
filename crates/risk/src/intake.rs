//! Filtering of inbound signals against the active strategy tier.
//!
//! Intake is a pure function of the signal, the tier and a read-only view of
//! the book. Checks run in a fixed order so that a signal failing several of
//! them is always rejected for the same reason: shape validation first, then
//! confidence, direction, duplicate symbol and capacity.

use core_types::{Side, Signal, SignalPayload, StrategyConfig, Symbol};
use rust_decimal::Decimal;
use thiserror::Error;

/// The slice of book state intake needs to see.
pub trait BookView {
    /// Whether an open position exists for `symbol`.
    fn has_open(&self, symbol: &Symbol) -> bool;

    /// Number of currently open positions.
    fn open_count(&self) -> usize;
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    #[error("Signal confidence ({confidence:.2}) is below threshold ({threshold:.2})")]
    BelowConfidenceThreshold { confidence: f64, threshold: f64 },

    #[error("{0} signals are disabled for the active strategy")]
    DirectionDisabled(Side),

    #[error("A position is already open for {0}")]
    SymbolAlreadyOpen(Symbol),

    #[error("Open position limit reached ({open}/{limit})")]
    CapacityExceeded { open: usize, limit: usize },
}

/// Which side of the error taxonomy a rejection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    Validation,
    Policy,
}

impl Rejection {
    pub fn kind(&self) -> RejectionKind {
        match self {
            Rejection::InvalidSignal(_) => RejectionKind::Validation,
            _ => RejectionKind::Policy,
        }
    }
}

/// Decides whether `signal` may proceed to sizing.
///
/// Returns the signal unchanged when accepted.
pub fn accept<'s, B>(
    signal: &'s Signal,
    config: &StrategyConfig,
    book: &B,
) -> Result<&'s Signal, Rejection>
where
    B: BookView + ?Sized,
{
    validate(signal)?;

    if signal.confidence < config.min_confidence {
        return Err(Rejection::BelowConfidenceThreshold {
            confidence: signal.confidence,
            threshold: config.min_confidence,
        });
    }
    if !config.allows(signal.direction) {
        return Err(Rejection::DirectionDisabled(signal.direction));
    }
    if book.has_open(&signal.symbol) {
        return Err(Rejection::SymbolAlreadyOpen(signal.symbol.clone()));
    }
    let open = book.open_count();
    if open >= config.max_open_positions {
        return Err(Rejection::CapacityExceeded {
            open,
            limit: config.max_open_positions,
        });
    }

    Ok(signal)
}

/// Converts a raw payload and runs it through [`accept`].
pub fn accept_payload<B>(
    payload: SignalPayload,
    config: &StrategyConfig,
    book: &B,
) -> Result<Signal, Rejection>
where
    B: BookView + ?Sized,
{
    let signal =
        Signal::try_from(payload).map_err(|e| Rejection::InvalidSignal(e.to_string()))?;
    accept(&signal, config, book)?;
    Ok(signal)
}

fn validate(signal: &Signal) -> Result<(), Rejection> {
    let invalid = |reason: String| Err(Rejection::InvalidSignal(reason));

    if signal.symbol.0.trim().is_empty() {
        return invalid("symbol is empty".into());
    }
    if !signal.confidence.is_finite() || !(0.0..=100.0).contains(&signal.confidence) {
        return invalid(format!("confidence {} is outside 0..=100", signal.confidence));
    }
    if signal.entry_price <= Decimal::ZERO {
        return invalid(format!("entry price {} must be positive", signal.entry_price));
    }

    let sign = signal.direction.sign();
    if let Some(stop) = signal.stop_loss {
        // The stop must sit on the losing side of entry.
        if stop <= Decimal::ZERO || (stop - signal.entry_price) * sign >= Decimal::ZERO {
            return invalid(format!(
                "stop loss {stop} is not below entry for a {} signal",
                signal.direction
            ));
        }
    }
    if let Some(target) = signal.take_profit {
        if target <= Decimal::ZERO || (target - signal.entry_price) * sign <= Decimal::ZERO {
            return invalid(format!(
                "take profit {target} is not beyond entry for a {} signal",
                signal.direction
            ));
        }
    }
    Ok(())
}
