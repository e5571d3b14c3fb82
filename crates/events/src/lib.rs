// In crates/events/src/lib.rs

use chrono::{DateTime, Utc};
use core_types::{CloseReason, PositionId, Side, Symbol};
use rust_decimal::Decimal;
use serde::Serialize;

pub mod bus;

pub use bus::{DeliveryError, Deduplicator, EventBus, HandlerResult, Subscription};

/// Emitted once when a position is committed to the book.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionOpened {
    pub position_id: PositionId,
    pub symbol: Symbol,
    pub direction: Side,
    pub entry_price: Decimal,
    pub margin_amount: Decimal,
    pub leverage: u8,
    pub version: u64,
    pub at: DateTime<Utc>,
}

/// Emitted on every revaluation of an open position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionRevalued {
    pub position_id: PositionId,
    pub symbol: Symbol,
    pub mark_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub unrealized_pnl_percent: Decimal,
    pub maintenance_margin_ratio: Decimal,
    pub version: u64,
    pub at: DateTime<Utc>,
}

/// Emitted once when a position is settled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionClosed {
    pub position_id: PositionId,
    pub symbol: Symbol,
    pub exit_price: Decimal,
    pub realized_pnl: Decimal,
    pub reason: CloseReason,
    pub version: u64,
    pub at: DateTime<Utc>,
}

/// The top-level event enum handed to subscribers.
/// `tag` and `content` are used by serde for clean JSON representation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum LifecycleEvent {
    PositionOpened(PositionOpened),
    PositionRevalued(PositionRevalued),
    PositionClosed(PositionClosed),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Opened,
    Revalued,
    Closed,
}

/// Identity of a delivery; subscribers dedupe on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub event_type: EventType,
    pub position_id: PositionId,
    pub version: u64,
}

impl LifecycleEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            LifecycleEvent::PositionOpened(_) => EventType::Opened,
            LifecycleEvent::PositionRevalued(_) => EventType::Revalued,
            LifecycleEvent::PositionClosed(_) => EventType::Closed,
        }
    }

    pub fn symbol(&self) -> &Symbol {
        match self {
            LifecycleEvent::PositionOpened(e) => &e.symbol,
            LifecycleEvent::PositionRevalued(e) => &e.symbol,
            LifecycleEvent::PositionClosed(e) => &e.symbol,
        }
    }

    pub fn position_id(&self) -> PositionId {
        match self {
            LifecycleEvent::PositionOpened(e) => e.position_id,
            LifecycleEvent::PositionRevalued(e) => e.position_id,
            LifecycleEvent::PositionClosed(e) => e.position_id,
        }
    }

    pub fn version(&self) -> u64 {
        match self {
            LifecycleEvent::PositionOpened(e) => e.version,
            LifecycleEvent::PositionRevalued(e) => e.version,
            LifecycleEvent::PositionClosed(e) => e.version,
        }
    }

    pub fn key(&self) -> EventKey {
        EventKey {
            event_type: self.event_type(),
            position_id: self.position_id(),
            version: self.version(),
        }
    }
}
