// In crates/risk/src/types.rs

use core_types::{Side, Symbol};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

/// Qualitative risk attached to a confidence band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Confidence bands, highest first. A signal belongs to the highest band whose
/// lower bound its confidence meets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ConfidenceBand {
    /// `confidence < 85`
    Speculative,
    /// `85 <= confidence < 90`
    Moderate,
    /// `90 <= confidence < 95`
    Strong,
    /// `confidence >= 95`
    Elite,
}

/// The parameters a band resolves to for a particular confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandParameters {
    pub leverage: u8,
    /// Recommended share of the balance for the position, in percent.
    pub position_ratio: Decimal,
    pub safety_factor: Decimal,
    pub risk_level: RiskLevel,
    pub stop_loss_required: bool,
}

impl ConfidenceBand {
    pub fn for_confidence(confidence: f64) -> Self {
        if confidence >= 95.0 {
            ConfidenceBand::Elite
        } else if confidence >= 90.0 {
            ConfidenceBand::Strong
        } else if confidence >= 85.0 {
            ConfidenceBand::Moderate
        } else {
            ConfidenceBand::Speculative
        }
    }

    /// The confidence interval the band's ranges are interpolated over.
    pub fn span(self) -> (f64, f64) {
        match self {
            ConfidenceBand::Elite => (95.0, 100.0),
            ConfidenceBand::Strong => (90.0, 95.0),
            ConfidenceBand::Moderate => (85.0, 90.0),
            ConfidenceBand::Speculative => (0.0, 85.0),
        }
    }

    pub fn risk_level(self) -> RiskLevel {
        match self {
            ConfidenceBand::Elite | ConfidenceBand::Strong => RiskLevel::Low,
            ConfidenceBand::Moderate => RiskLevel::Medium,
            ConfidenceBand::Speculative => RiskLevel::High,
        }
    }

    pub fn stop_loss_required(self) -> bool {
        matches!(self, ConfidenceBand::Moderate | ConfidenceBand::Speculative)
    }

    /// `(low, high)` of the position ratio range, in percent.
    pub(crate) fn position_ratio_range(self) -> (Decimal, Decimal) {
        match self {
            ConfidenceBand::Elite => (dec!(20), dec!(25)),
            ConfidenceBand::Strong => (dec!(15), dec!(20)),
            ConfidenceBand::Moderate => (dec!(10), dec!(15)),
            ConfidenceBand::Speculative => (dec!(5), dec!(8)),
        }
    }

    pub(crate) fn safety_factor_range(self) -> (Decimal, Decimal) {
        match self {
            ConfidenceBand::Elite => (dec!(8), dec!(9)),
            ConfidenceBand::Strong => (dec!(7), dec!(8)),
            ConfidenceBand::Moderate => (dec!(6), dec!(7)),
            ConfidenceBand::Speculative => (dec!(4), dec!(5)),
        }
    }

    /// Leverage is 20 / 15 / 10 by band; the moderate band steps from 10x to
    /// 15x at its midpoint.
    pub fn leverage(self, confidence: f64) -> u8 {
        match self {
            ConfidenceBand::Elite => 20,
            ConfidenceBand::Strong => 15,
            ConfidenceBand::Moderate if confidence >= 87.5 => 15,
            ConfidenceBand::Moderate | ConfidenceBand::Speculative => 10,
        }
    }
}

/// A fully parameterized position, ready to be committed to the book.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProposedPosition {
    pub symbol: Symbol,
    pub direction: Side,
    pub confidence: f64,
    pub band: ConfidenceBand,
    pub risk_level: RiskLevel,
    pub entry_price: Decimal,
    pub size_units: Decimal,
    pub margin_amount: Decimal,
    pub leverage: u8,
    pub liquidation_price: Decimal,
    pub first_take_profit: Decimal,
    pub second_take_profit: Decimal,
    pub stop_loss: Option<Decimal>,
    pub stop_loss_required: bool,
    pub position_ratio: Decimal,
    pub safety_factor: Decimal,
}
