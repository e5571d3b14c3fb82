// In crates/execution/src/types.rs

use chrono::{DateTime, Utc};
use core_types::{Account, ClosedPosition, Position, PositionId};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LedgerEntryKind {
    /// Margin moved from the free balance into reserve on open.
    MarginDebit,
    /// Margin released and PnL realized on close.
    Settlement,
}

/// One line of the ledger's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub position_id: PositionId,
    pub kind: LedgerEntryKind,
    /// Signed change applied to the free balance.
    pub amount: Decimal,
    pub realized_pnl: Decimal,
    pub balance_after: Decimal,
    pub at: DateTime<Utc>,
}

/// A point-in-time copy of the book for readers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookSnapshot {
    pub account: Account,
    pub open_positions: Vec<Position>,
    pub closed_positions: Vec<ClosedPosition>,
    pub taken_at: DateTime<Utc>,
}

impl BookSnapshot {
    pub fn empty(account: Account) -> Self {
        Self {
            account,
            open_positions: Vec::new(),
            closed_positions: Vec::new(),
            taken_at: Utc::now(),
        }
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        self.open_positions.iter().map(|p| p.unrealized_pnl).sum()
    }
}
