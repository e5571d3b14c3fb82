// In crates/risk/src/banded_sizer.rs

use crate::types::{BandParameters, ConfidenceBand, ProposedPosition};
use crate::{Error, PositionSizer, Result};
use core_types::{Account, Signal, StrategyConfig};
use num_traits::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Share of the margin that may be lost before a position is liquidated.
pub const LIQUIDATION_BUFFER: Decimal = dec!(0.95);

/// Default take-profit distances when the signal does not carry one.
const FIRST_TAKE_PROFIT: Decimal = dec!(0.05);
const SECOND_TAKE_PROFIT: Decimal = dec!(0.12);

/// A fixed-fraction sizer whose leverage and exit ladder are chosen by the
/// signal's confidence band.
///
/// The margin committed to every trade is `risk_per_trade_percent` of the free
/// balance; confidence only selects leverage, the liquidation distance and the
/// advisory ratios reported alongside the position.
#[derive(Debug, Default, Clone, Copy)]
pub struct BandedRiskSizer;

impl BandedRiskSizer {
    pub fn new() -> Self {
        Self
    }

    /// Resolves the ranged parameters of a band for one confidence value by
    /// interpolating on the confidence's position inside the band.
    pub fn band_parameters(band: ConfidenceBand, confidence: f64) -> Result<BandParameters> {
        let (low, high) = band.span();
        let fraction = ((confidence - low) / (high - low)).clamp(0.0, 1.0);
        let t = Decimal::from_f64(fraction).ok_or_else(|| {
            Error::InvalidParameters(format!("confidence {confidence} is not a finite number"))
        })?;

        let lerp = |(from, to): (Decimal, Decimal)| (from + (to - from) * t).round_dp(2);

        Ok(BandParameters {
            leverage: band.leverage(confidence),
            position_ratio: lerp(band.position_ratio_range()),
            safety_factor: lerp(band.safety_factor_range()),
            risk_level: band.risk_level(),
            stop_loss_required: band.stop_loss_required(),
        })
    }
}

impl PositionSizer for BandedRiskSizer {
    fn name(&self) -> &'static str {
        "BandedRiskSizer"
    }

    fn size(
        &self,
        signal: &Signal,
        account: &Account,
        config: &StrategyConfig,
    ) -> Result<ProposedPosition> {
        // --- Margin ---
        let risk_percent = Decimal::from_f64(config.risk_per_trade_percent).ok_or_else(|| {
            Error::InvalidParameters(format!(
                "risk_per_trade_percent {} is not a finite number",
                config.risk_per_trade_percent
            ))
        })?;
        let risk_amount = account
            .balance
            .checked_mul(risk_percent)
            .ok_or_else(|| out_of_range("risk amount"))?
            / dec!(100);

        if risk_amount > account.balance {
            return Err(Error::InsufficientBalance {
                required: risk_amount,
                available: account.balance,
            });
        }
        if risk_amount <= Decimal::ZERO {
            return Err(Error::InvalidParameters(format!(
                "risk amount must be positive, got {risk_amount}"
            )));
        }
        if signal.entry_price <= Decimal::ZERO {
            return Err(Error::InvalidParameters(format!(
                "entry price must be positive, got {}",
                signal.entry_price
            )));
        }

        // --- Band parameters ---
        let band = ConfidenceBand::for_confidence(signal.confidence);
        let params = Self::band_parameters(band, signal.confidence)?;
        let leverage = Decimal::from(params.leverage);

        // --- Size & liquidation ---
        let entry = signal.entry_price;
        let sign = signal.direction.sign();
        let margin_amount = risk_amount;
        let size_units = margin_amount
            .checked_mul(leverage)
            .and_then(|notional| notional.checked_div(entry))
            .ok_or_else(|| out_of_range("position size"))?;
        let liquidation_price = scaled(
            entry,
            dec!(1) - sign * LIQUIDATION_BUFFER / leverage,
            "liquidation price",
        )?;

        // --- Exit ladder ---
        let (first_take_profit, second_take_profit) = match signal.take_profit {
            // Keep the 5% / 12% proportion of the default ladder.
            Some(tp) => {
                let second = tp
                    .checked_sub(entry)
                    .and_then(|distance| distance.checked_mul(SECOND_TAKE_PROFIT / FIRST_TAKE_PROFIT))
                    .and_then(|distance| entry.checked_add(distance))
                    .ok_or_else(|| out_of_range("second take-profit"))?;
                (tp, second)
            }
            None => (
                scaled(entry, dec!(1) + sign * FIRST_TAKE_PROFIT, "take-profit")?,
                scaled(entry, dec!(1) + sign * SECOND_TAKE_PROFIT, "take-profit")?,
            ),
        };

        // A required stop defaults to half the liquidation distance.
        let stop_loss = match signal.stop_loss {
            Some(stop) => Some(stop),
            None if params.stop_loss_required => Some(scaled(
                entry,
                dec!(1) - sign * LIQUIDATION_BUFFER / dec!(2) / leverage,
                "stop-loss",
            )?),
            None => None,
        };

        Ok(ProposedPosition {
            symbol: signal.symbol.clone(),
            direction: signal.direction,
            confidence: signal.confidence,
            band,
            risk_level: params.risk_level,
            entry_price: entry,
            size_units,
            margin_amount,
            leverage: params.leverage,
            liquidation_price,
            first_take_profit,
            second_take_profit,
            stop_loss,
            stop_loss_required: params.stop_loss_required,
            position_ratio: params.position_ratio,
            safety_factor: params.safety_factor,
        })
    }
}

fn out_of_range(what: &str) -> Error {
    Error::InvalidParameters(format!("{what} does not fit in a decimal"))
}

fn scaled(price: Decimal, factor: Decimal, what: &str) -> Result<Decimal> {
    price.checked_mul(factor).ok_or_else(|| out_of_range(what))
}
