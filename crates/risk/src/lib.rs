// In crates/risk/src/lib.rs

use core_types::{Account, Signal, StrategyConfig};

pub mod banded_sizer;
pub mod error;
pub mod intake;
pub mod types;

// Re-export public types
pub use banded_sizer::BandedRiskSizer;
pub use error::{Error, Result};
pub use intake::{BookView, Rejection, RejectionKind};
pub use types::{ConfidenceBand, ProposedPosition, RiskLevel};

/// The universal interface for a position sizing module.
///
/// A `PositionSizer` turns an accepted `Signal` into a fully parameterized
/// `ProposedPosition`: margin, leverage, size, liquidation price and exit
/// ladder. Implementations must be deterministic in their inputs.
pub trait PositionSizer: Send + Sync {
    /// The name of the sizing model.
    fn name(&self) -> &'static str;

    /// Sizes a signal against the current account state.
    ///
    /// # Arguments
    ///
    /// * `signal`: A signal that already passed intake.
    /// * `account`: The account snapshot the margin is drawn from.
    /// * `config`: The active strategy tier.
    ///
    /// # Returns
    ///
    /// * `Ok(ProposedPosition)`: the position to hand to the book.
    /// * `Err(Error::InsufficientBalance)`: the margin exceeds the free balance.
    fn size(
        &self,
        signal: &Signal,
        account: &Account,
        config: &StrategyConfig,
    ) -> Result<ProposedPosition>;
}
