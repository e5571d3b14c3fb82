// In crates/execution/src/margin.rs

use core_types::Position;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Policy mapping a position and its unrealized PnL to the maintenance
/// margin ratio, in percent. Implementations must be non-decreasing as the
/// PnL falls toward the liquidation loss.
pub trait MarginCurve: Send + Sync {
    fn name(&self) -> &'static str;

    fn ratio(&self, position: &Position, unrealized_pnl: Decimal) -> Decimal;
}

/// Maintenance margin over remaining equity.
///
/// Maintenance margin is `maintenance_rate * margin`; with the default 5% it
/// matches the 95% liquidation buffer, so the ratio starts at 5% at entry and
/// reaches 100% exactly at the liquidation price.
#[derive(Debug, Clone, Copy)]
pub struct EquityRatioCurve {
    maintenance_rate: Decimal,
}

impl Default for EquityRatioCurve {
    fn default() -> Self {
        Self { maintenance_rate: dec!(0.05) }
    }
}

impl EquityRatioCurve {
    pub fn new(maintenance_rate: Decimal) -> Self {
        Self { maintenance_rate }
    }
}

impl MarginCurve for EquityRatioCurve {
    fn name(&self) -> &'static str {
        "EquityRatioCurve"
    }

    fn ratio(&self, position: &Position, unrealized_pnl: Decimal) -> Decimal {
        let Some(maintenance) = position.margin_amount.checked_mul(self.maintenance_rate) else {
            return dec!(100);
        };
        // Only a gain can overflow the sum, and it leaves nothing at risk.
        let Some(equity) = position.margin_amount.checked_add(unrealized_pnl) else {
            return Decimal::ZERO;
        };
        if equity <= maintenance {
            return dec!(100);
        }
        (maintenance / equity * dec!(100)).min(dec!(100)).round_dp(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_types::{PositionId, PositionStatus, Side, Symbol};

    fn position(margin: Decimal) -> Position {
        Position {
            id: PositionId(1),
            symbol: Symbol::from("BTCUSDT"),
            direction: Side::Long,
            entry_price: dec!(100),
            mark_price: dec!(100),
            size_units: dec!(2),
            margin_amount: margin,
            leverage: 10,
            liquidation_price: dec!(90.5),
            stop_loss: None,
            first_take_profit: dec!(105),
            second_take_profit: dec!(112),
            confidence_at_open: 90.0,
            unrealized_pnl: Decimal::ZERO,
            unrealized_pnl_percent: Decimal::ZERO,
            maintenance_margin_ratio: Decimal::ZERO,
            status: PositionStatus::Open,
            version: 1,
            opened_at: Utc::now(),
            closed_at: None,
        }
    }

    #[test]
    fn test_equity_ratio_bounds() {
        let curve = EquityRatioCurve::default();
        let pos = position(dec!(20));

        assert_eq!(curve.ratio(&pos, Decimal::ZERO), dec!(5));
        assert_eq!(curve.ratio(&pos, dec!(-10)), dec!(10));
        assert_eq!(curve.ratio(&pos, dec!(-19)), dec!(100));
        assert_eq!(curve.ratio(&pos, dec!(-50)), dec!(100));
    }

    #[test]
    fn test_overflowing_gain_is_zero_ratio() {
        let curve = EquityRatioCurve::default();
        assert_eq!(curve.ratio(&position(Decimal::MAX), Decimal::MAX), Decimal::ZERO);
    }
}
