// In crates/core-types/src/types.rs

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A trading pair symbol, e.g. "BTCUSDT".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Symbol(value.to_string())
    }
}

/// The direction of a signal or position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// `1` for longs, `-1` for shorts. Multiplying a price move by this gives the
    /// move as seen by the position holder.
    pub fn sign(self) -> Decimal {
        match self {
            Side::Long => dec!(1),
            Side::Short => dec!(-1),
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "long" | "buy" => Some(Side::Long),
            "short" | "sell" => Some(Side::Short),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => f.write_str("Long"),
            Side::Short => f.write_str("Short"),
        }
    }
}

/// A validated, confidence-scored trade recommendation produced by the
/// market analysis service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub symbol: Symbol,
    pub direction: Side,
    /// Confidence score in the range `0..=100`.
    pub confidence: f64,
    pub entry_price: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

/// The loosely-typed shape signals arrive in from the outside world.
///
/// Every field is optional here; turning a payload into a [`Signal`] is the
/// only way it can enter the engine.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalPayload {
    pub symbol: Option<String>,
    pub direction: Option<String>,
    pub confidence: Option<f64>,
    pub entry_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

fn price_field(name: &str, value: f64) -> Result<Decimal> {
    Decimal::from_f64(value)
        .ok_or_else(|| Error::MalformedSignal(format!("{name} is not a finite number")))
}

impl TryFrom<SignalPayload> for Signal {
    type Error = Error;

    fn try_from(payload: SignalPayload) -> Result<Self> {
        let symbol = payload
            .symbol
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::MalformedSignal("missing symbol".into()))?;
        let direction = payload
            .direction
            .as_deref()
            .ok_or_else(|| Error::MalformedSignal("missing direction".into()))
            .and_then(|raw| {
                Side::parse(raw)
                    .ok_or_else(|| Error::MalformedSignal(format!("unknown direction `{raw}`")))
            })?;
        let confidence = payload
            .confidence
            .ok_or_else(|| Error::MalformedSignal("missing confidence".into()))?;
        let entry_price = payload
            .entry_price
            .ok_or_else(|| Error::MalformedSignal("missing entry price".into()))
            .and_then(|p| price_field("entry price", p))?;

        Ok(Signal {
            symbol: Symbol(symbol.trim().to_string()),
            direction,
            confidence,
            entry_price,
            stop_loss: payload.stop_loss.map(|p| price_field("stop loss", p)).transpose()?,
            take_profit: payload
                .take_profit
                .map(|p| price_field("take profit", p))
                .transpose()?,
            timestamp: payload.timestamp.unwrap_or_else(Utc::now),
        })
    }
}

/// A single mark price observation from the price feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceTick {
    pub symbol: Symbol,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Identifier assigned by the position book, monotonically increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionId(pub u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PositionStatus {
    Open,
    Closed,
}

/// Why a position left the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CloseReason {
    Manual,
    Liquidated,
    StopLoss,
    TakeProfit,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseReason::Manual => "Manual",
            CloseReason::Liquidated => "Liquidated",
            CloseReason::StopLoss => "StopLoss",
            CloseReason::TakeProfit => "TakeProfit",
        };
        f.write_str(s)
    }
}

/// A leveraged position tracked by the book.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub id: PositionId,
    pub symbol: Symbol,
    pub direction: Side,
    pub entry_price: Decimal,
    /// The most recent price the position was revalued at.
    pub mark_price: Decimal,
    pub size_units: Decimal,
    pub margin_amount: Decimal,
    pub leverage: u8,
    pub liquidation_price: Decimal,
    pub stop_loss: Option<Decimal>,
    pub first_take_profit: Decimal,
    pub second_take_profit: Decimal,
    pub confidence_at_open: f64,
    pub unrealized_pnl: Decimal,
    pub unrealized_pnl_percent: Decimal,
    pub maintenance_margin_ratio: Decimal,
    pub status: PositionStatus,
    /// Sequence number of the last lifecycle event emitted for this position.
    pub version: u64,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// PnL the position would realize if closed at `price`, or `None` when
    /// it does not fit in a `Decimal`.
    pub fn pnl_at(&self, price: Decimal) -> Option<Decimal> {
        price
            .checked_sub(self.entry_price)?
            .checked_mul(self.size_units)?
            .checked_mul(self.direction.sign())
    }

    /// True once `price` has reached or moved beyond the liquidation price.
    pub fn is_liquidated_at(&self, price: Decimal) -> bool {
        match self.direction {
            Side::Long => price <= self.liquidation_price,
            Side::Short => price >= self.liquidation_price,
        }
    }
}

/// The archived, terminal record of a position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedPosition {
    pub position: Position,
    pub exit_price: Decimal,
    pub realized_pnl: Decimal,
    pub reason: CloseReason,
    pub closed_at: DateTime<Utc>,
}

/// The virtual trading account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    /// Free balance; margin of open positions is not included.
    pub balance: Decimal,
    pub reserved_margin: Decimal,
    pub total_realized_pnl: Decimal,
    /// Number of settled (closed) positions.
    pub total_trades: u32,
}

impl Account {
    pub fn new(balance: Decimal) -> Self {
        Self {
            balance,
            reserved_margin: Decimal::ZERO,
            total_realized_pnl: Decimal::ZERO,
            total_trades: 0,
        }
    }

    /// Balance plus margin currently locked in open positions.
    pub fn equity(&self) -> Decimal {
        self.balance + self.reserved_margin
    }
}
