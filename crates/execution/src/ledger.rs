// In crates/execution/src/ledger.rs

use crate::types::{LedgerEntry, LedgerEntryKind};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use core_types::{Account, PositionId};
use rust_decimal::Decimal;

/// Owns the account balance and realized PnL.
///
/// `debit` is the only operation that can fail on balance; the book calls it
/// inside the same step that commits the position, so an open either both
/// reserves margin and records the position or does neither.
#[derive(Debug, Clone)]
pub struct Ledger {
    account: Account,
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    pub fn new(initial_balance: Decimal) -> Self {
        Self {
            account: Account::new(initial_balance),
            entries: Vec::new(),
        }
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn balance(&self) -> Decimal {
        self.account.balance
    }

    /// The audit trail, oldest first.
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Moves `amount` of margin from the free balance into reserve.
    pub fn debit(&mut self, position_id: PositionId, amount: Decimal, at: DateTime<Utc>) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount(amount));
        }
        if amount > self.account.balance {
            return Err(Error::InsufficientBalance {
                required: amount,
                available: self.account.balance,
            });
        }

        self.account.balance -= amount;
        self.account.reserved_margin += amount;
        self.record(position_id, LedgerEntryKind::MarginDebit, -amount, Decimal::ZERO, at);
        Ok(())
    }

    /// Adds `amount` to the free balance.
    pub fn credit(&mut self, amount: Decimal) -> Result<()> {
        self.account.balance = self
            .account
            .balance
            .checked_add(amount)
            .ok_or(Error::OutOfRange(amount))?;
        Ok(())
    }

    /// Releases a position's margin and books its realized PnL.
    ///
    /// The balance grows by exactly `margin + realized_pnl`. Returns the new
    /// balance. Nothing changes when any of the totals would overflow.
    pub fn settle(
        &mut self,
        position_id: PositionId,
        margin: Decimal,
        realized_pnl: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Decimal> {
        let amount = margin.checked_add(realized_pnl).ok_or(Error::OutOfRange(realized_pnl))?;
        let balance = self.account.balance.checked_add(amount).ok_or(Error::OutOfRange(amount))?;
        let total_realized_pnl = self
            .account
            .total_realized_pnl
            .checked_add(realized_pnl)
            .ok_or(Error::OutOfRange(realized_pnl))?;
        debug_assert!(balance >= Decimal::ZERO, "settlement would drive the balance negative");

        self.account.reserved_margin -= margin;
        self.account.balance = balance;
        self.account.total_realized_pnl = total_realized_pnl;
        self.account.total_trades += 1;
        self.record(position_id, LedgerEntryKind::Settlement, amount, realized_pnl, at);
        Ok(self.account.balance)
    }

    fn record(
        &mut self,
        position_id: PositionId,
        kind: LedgerEntryKind,
        amount: Decimal,
        realized_pnl: Decimal,
        at: DateTime<Utc>,
    ) {
        self.entries.push(LedgerEntry {
            position_id,
            kind,
            amount,
            realized_pnl,
            balance_after: self.account.balance,
            at,
        });
    }
}
