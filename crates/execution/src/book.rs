// In crates/execution/src/book.rs

use crate::margin::{EquityRatioCurve, MarginCurve};
use crate::types::BookSnapshot;
use crate::{Error, Ledger, Result};
use chrono::{DateTime, Utc};
use core_types::{
    Account, CloseReason, ClosedPosition, Position, PositionId, PositionStatus, Side, Symbol,
};
use events::{LifecycleEvent, PositionClosed, PositionOpened, PositionRevalued};
use risk::{BookView, ProposedPosition};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, HashMap};

/// Money amounts are kept at this many decimal places once realized.
const MONEY_DP: u32 = 8;

/// The authoritative store of open and closed positions.
///
/// The book is a plain single-threaded value; serializing access to it is the
/// owner's job. Every mutating call either fully applies or leaves the book
/// and its ledger untouched, and returns the lifecycle events to publish.
pub struct PositionBook {
    ledger: Ledger,
    open: BTreeMap<PositionId, Position>,
    open_by_symbol: HashMap<Symbol, PositionId>,
    closed: BTreeMap<PositionId, ClosedPosition>,
    next_id: u64,
    margin_curve: Box<dyn MarginCurve>,
    protective_exits: bool,
}

impl PositionBook {
    pub fn new(initial_balance: Decimal) -> Self {
        Self::with_margin_curve(initial_balance, Box::new(EquityRatioCurve::default()))
    }

    pub fn with_margin_curve(initial_balance: Decimal, margin_curve: Box<dyn MarginCurve>) -> Self {
        Self {
            ledger: Ledger::new(initial_balance),
            open: BTreeMap::new(),
            open_by_symbol: HashMap::new(),
            closed: BTreeMap::new(),
            next_id: 1,
            margin_curve,
            protective_exits: false,
        }
    }

    /// Whether revaluation closes positions at their stop-loss and final
    /// take-profit levels.
    pub fn set_protective_exits(&mut self, enabled: bool) {
        self.protective_exits = enabled;
    }

    pub fn account(&self) -> &Account {
        self.ledger.account()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn position(&self, id: PositionId) -> Option<&Position> {
        self.open.get(&id)
    }

    pub fn closed_position(&self, id: PositionId) -> Option<&ClosedPosition> {
        self.closed.get(&id)
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.open.values()
    }

    pub fn open_symbols(&self) -> Vec<Symbol> {
        self.open.values().map(|p| p.symbol.clone()).collect()
    }

    pub fn snapshot(&self) -> BookSnapshot {
        BookSnapshot {
            account: self.ledger.account().clone(),
            open_positions: self.open.values().cloned().collect(),
            closed_positions: self.closed.values().cloned().collect(),
            taken_at: Utc::now(),
        }
    }

    /// Commits a sized position and debits its margin.
    ///
    /// The duplicate-symbol and capacity invariants are checked again here,
    /// at commit time, whatever intake saw earlier.
    pub fn open(
        &mut self,
        proposed: &ProposedPosition,
        max_open_positions: usize,
        at: DateTime<Utc>,
    ) -> Result<(PositionId, LifecycleEvent)> {
        // --- 1. Invariants ---
        if self.open_by_symbol.contains_key(&proposed.symbol) {
            return Err(Error::DuplicateSymbol(proposed.symbol.clone()));
        }
        if self.open.len() >= max_open_positions {
            return Err(Error::CapacityExceeded { limit: max_open_positions });
        }

        // --- 2. Margin ---
        let id = PositionId(self.next_id);
        self.ledger.debit(id, proposed.margin_amount, at)?;
        self.next_id += 1;

        // --- 3. Record ---
        let mut position = Position {
            id,
            symbol: proposed.symbol.clone(),
            direction: proposed.direction,
            entry_price: proposed.entry_price,
            mark_price: proposed.entry_price,
            size_units: proposed.size_units,
            margin_amount: proposed.margin_amount,
            leverage: proposed.leverage,
            liquidation_price: proposed.liquidation_price,
            stop_loss: proposed.stop_loss,
            first_take_profit: proposed.first_take_profit,
            second_take_profit: proposed.second_take_profit,
            confidence_at_open: proposed.confidence,
            unrealized_pnl: Decimal::ZERO,
            unrealized_pnl_percent: Decimal::ZERO,
            maintenance_margin_ratio: Decimal::ZERO,
            status: PositionStatus::Open,
            version: 1,
            opened_at: at,
            closed_at: None,
        };
        position.maintenance_margin_ratio = self.margin_curve.ratio(&position, Decimal::ZERO);

        tracing::info!(
            position_id = %id,
            symbol = %position.symbol,
            direction = %position.direction,
            entry_price = %position.entry_price,
            margin = %position.margin_amount,
            leverage = position.leverage,
            liquidation_price = %position.liquidation_price.round_dp(MONEY_DP),
            "Position opened."
        );

        let event = LifecycleEvent::PositionOpened(PositionOpened {
            position_id: id,
            symbol: position.symbol.clone(),
            direction: position.direction,
            entry_price: position.entry_price,
            margin_amount: position.margin_amount,
            leverage: position.leverage,
            version: position.version,
            at,
        });
        self.open_by_symbol.insert(position.symbol.clone(), id);
        self.open.insert(id, position);
        Ok((id, event))
    }

    /// Revalues the open position on `symbol`, if any, at `price`.
    ///
    /// A price at or beyond the liquidation price closes the position as
    /// `Liquidated` before returning; with protective exits enabled, reaching
    /// the stop-loss or the final take-profit closes it too. A price whose
    /// PnL does not fit in a `Decimal` is refused and changes nothing.
    pub fn revalue(
        &mut self,
        symbol: &Symbol,
        price: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Vec<LifecycleEvent>> {
        if price <= Decimal::ZERO {
            return Err(Error::InvalidPrice { symbol: symbol.clone(), price });
        }
        let Some(&id) = self.open_by_symbol.get(symbol) else {
            return Ok(Vec::new());
        };
        let Some(position) = self.open.get_mut(&id) else {
            return Err(Error::UnknownPosition(id));
        };

        let invalid_price = || Error::InvalidPrice { symbol: symbol.clone(), price };
        let unrealized_pnl = position.pnl_at(price).ok_or_else(invalid_price)?.round_dp(MONEY_DP);
        let unrealized_pnl_percent = unrealized_pnl
            .checked_div(position.margin_amount)
            .and_then(|ratio| ratio.checked_mul(dec!(100)))
            .ok_or_else(invalid_price)?
            .round_dp(4);

        position.mark_price = price;
        position.unrealized_pnl = unrealized_pnl;
        position.unrealized_pnl_percent = unrealized_pnl_percent;
        position.maintenance_margin_ratio = self.margin_curve.ratio(position, unrealized_pnl);
        position.version += 1;

        tracing::debug!(
            position_id = %id,
            symbol = %symbol,
            mark_price = %price,
            unrealized_pnl = %position.unrealized_pnl,
            margin_ratio = %position.maintenance_margin_ratio,
            "Position revalued."
        );

        let mut events = vec![LifecycleEvent::PositionRevalued(PositionRevalued {
            position_id: id,
            symbol: symbol.clone(),
            mark_price: price,
            unrealized_pnl: position.unrealized_pnl,
            unrealized_pnl_percent: position.unrealized_pnl_percent,
            maintenance_margin_ratio: position.maintenance_margin_ratio,
            version: position.version,
            at,
        })];

        let exit = if position.is_liquidated_at(price) {
            // Liquidations fill at the liquidation price; the loss is capped
            // at the liquidation buffer of the margin.
            Some((position.liquidation_price, CloseReason::Liquidated))
        } else if self.protective_exits {
            protective_exit(position, price)
        } else {
            None
        };

        if let Some((exit_price, reason)) = exit {
            if reason == CloseReason::Liquidated {
                tracing::warn!(
                    position_id = %id,
                    symbol = %symbol,
                    mark_price = %price,
                    liquidation_price = %exit_price,
                    "Liquidation price reached! Force-closing position."
                );
            }
            let (_, closed_event) = self.settle(id, exit_price, reason, at)?;
            events.push(closed_event);
        }

        Ok(events)
    }

    /// Closes a position at its last mark price.
    ///
    /// Closing an already closed position returns the archived record and no
    /// event, leaving the ledger untouched.
    pub fn close(
        &mut self,
        id: PositionId,
        reason: CloseReason,
        at: DateTime<Utc>,
    ) -> Result<(ClosedPosition, Option<LifecycleEvent>)> {
        if let Some(closed) = self.closed.get(&id) {
            return Ok((closed.clone(), None));
        }
        let mark_price = self
            .open
            .get(&id)
            .map(|p| p.mark_price)
            .ok_or(Error::UnknownPosition(id))?;

        let (closed, event) = self.settle(id, mark_price, reason, at)?;
        Ok((closed, Some(event)))
    }

    fn settle(
        &mut self,
        id: PositionId,
        exit_price: Decimal,
        reason: CloseReason,
        at: DateTime<Utc>,
    ) -> Result<(ClosedPosition, LifecycleEvent)> {
        let position = self.open.get(&id).ok_or(Error::UnknownPosition(id))?;
        let realized_pnl = position
            .pnl_at(exit_price)
            .ok_or_else(|| Error::InvalidPrice { symbol: position.symbol.clone(), price: exit_price })?
            .round_dp(MONEY_DP);
        let balance = self.ledger.settle(id, position.margin_amount, realized_pnl, at)?;

        let Some(mut position) = self.open.remove(&id) else {
            return Err(Error::UnknownPosition(id));
        };
        self.open_by_symbol.remove(&position.symbol);

        position.status = PositionStatus::Closed;
        position.closed_at = Some(at);
        position.version += 1;

        tracing::info!(
            position_id = %id,
            symbol = %position.symbol,
            %reason,
            exit_price = %exit_price,
            realized_pnl = %realized_pnl,
            balance = %balance,
            "Position closed."
        );

        let event = LifecycleEvent::PositionClosed(PositionClosed {
            position_id: id,
            symbol: position.symbol.clone(),
            exit_price,
            realized_pnl,
            reason,
            version: position.version,
            at,
        });
        let closed = ClosedPosition {
            position,
            exit_price,
            realized_pnl,
            reason,
            closed_at: at,
        };
        self.closed.insert(id, closed.clone());
        Ok((closed, event))
    }
}

fn protective_exit(position: &Position, price: Decimal) -> Option<(Decimal, CloseReason)> {
    let (stop_hit, target_hit) = match position.direction {
        Side::Long => (
            position.stop_loss.is_some_and(|stop| price <= stop),
            price >= position.second_take_profit,
        ),
        Side::Short => (
            position.stop_loss.is_some_and(|stop| price >= stop),
            price <= position.second_take_profit,
        ),
    };
    if stop_hit {
        Some((price, CloseReason::StopLoss))
    } else if target_hit {
        Some((price, CloseReason::TakeProfit))
    } else {
        None
    }
}

impl BookView for PositionBook {
    fn has_open(&self, symbol: &Symbol) -> bool {
        self.open_by_symbol.contains_key(symbol)
    }

    fn open_count(&self) -> usize {
        self.open.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{DirectionsEnabled, Signal, StrategyConfig};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use risk::banded_sizer::LIQUIDATION_BUFFER;
    use risk::{BandedRiskSizer, PositionSizer};

    fn config(risk: f64) -> StrategyConfig {
        StrategyConfig {
            name: "test".into(),
            min_confidence: 0.0,
            max_open_positions: 3,
            risk_per_trade_percent: risk,
            directions_enabled: DirectionsEnabled::default(),
            protective_exits: false,
        }
    }

    fn propose(book: &PositionBook, symbol: &str, confidence: f64, direction: Side) -> ProposedPosition {
        let signal = Signal {
            symbol: Symbol::from(symbol),
            direction,
            confidence,
            entry_price: dec!(43000),
            stop_loss: None,
            take_profit: None,
            timestamp: Utc::now(),
        };
        BandedRiskSizer::new()
            .size(&signal, book.account(), &config(2.0))
            .unwrap()
    }

    #[test]
    fn test_open_debits_margin_and_emits_event() {
        let mut book = PositionBook::new(dec!(100000));
        let proposed = propose(&book, "BTCUSDT", 96.0, Side::Long);
        let (id, event) = book.open(&proposed, 3, Utc::now()).unwrap();

        assert_eq!(id, PositionId(1));
        assert_eq!(book.account().balance, dec!(98000));
        assert_eq!(book.account().reserved_margin, dec!(2000));
        assert_eq!(event.version(), 1);
        match event {
            LifecycleEvent::PositionOpened(e) => {
                assert_eq!(e.leverage, 20);
                assert_eq!(e.margin_amount, dec!(2000));
            }
            other => panic!("unexpected event {other:?}"),
        }
        let position = book.position(id).unwrap();
        assert_eq!(position.maintenance_margin_ratio, dec!(5));
        assert!(book.has_open(&Symbol::from("BTCUSDT")));
    }

    #[test]
    fn test_duplicate_symbol_rejected_at_commit() {
        let mut book = PositionBook::new(dec!(100000));
        let first = propose(&book, "BTCUSDT", 96.0, Side::Long);
        book.open(&first, 3, Utc::now()).unwrap();
        let balance = book.account().balance;

        let second = propose(&book, "BTCUSDT", 91.0, Side::Short);
        let err = book.open(&second, 3, Utc::now()).unwrap_err();

        assert_eq!(err, Error::DuplicateSymbol(Symbol::from("BTCUSDT")));
        assert!(err.is_invariant_violation());
        assert_eq!(book.account().balance, balance);
        assert_eq!(book.open_count(), 1);
    }

    #[test]
    fn test_capacity_ceiling() {
        let mut book = PositionBook::new(dec!(100000));
        for symbol in ["BTCUSDT", "ETHUSDT"] {
            let proposed = propose(&book, symbol, 96.0, Side::Long);
            book.open(&proposed, 2, Utc::now()).unwrap();
        }
        let proposed = propose(&book, "SOLUSDT", 96.0, Side::Long);
        assert_eq!(
            book.open(&proposed, 2, Utc::now()).unwrap_err(),
            Error::CapacityExceeded { limit: 2 }
        );
        assert_eq!(book.open_count(), 2);
    }

    #[test]
    fn test_insufficient_balance_leaves_book_untouched() {
        let mut book = PositionBook::new(dec!(1000));
        let mut proposed = propose(&book, "BTCUSDT", 96.0, Side::Long);
        proposed.margin_amount = dec!(1500);

        let err = book.open(&proposed, 3, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { .. }));
        assert_eq!(book.account().balance, dec!(1000));
        assert_eq!(book.open_count(), 0);
        assert!(book.ledger().entries().is_empty());

        // The id was not consumed by the failed open.
        let proposed = propose(&book, "BTCUSDT", 96.0, Side::Long);
        let (id, _) = book.open(&proposed, 3, Utc::now()).unwrap();
        assert_eq!(id, PositionId(1));
    }

    #[test]
    fn test_revalue_computes_pnl() {
        let mut book = PositionBook::new(dec!(100000));
        let proposed = propose(&book, "BTCUSDT", 96.0, Side::Long);
        let (id, _) = book.open(&proposed, 3, Utc::now()).unwrap();

        let events = book.revalue(&Symbol::from("BTCUSDT"), dec!(44000), Utc::now()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].version(), 2);

        let position = book.position(id).unwrap();
        assert_eq!(position.unrealized_pnl.round_dp(2), dec!(930.23));
        assert_eq!(position.unrealized_pnl_percent, dec!(46.5116));
        assert!(position.maintenance_margin_ratio < dec!(5));

        // Other symbols are not touched.
        assert!(book.revalue(&Symbol::from("ETHUSDT"), dec!(1), Utc::now()).unwrap().is_empty());
        assert!(matches!(
            book.revalue(&Symbol::from("BTCUSDT"), dec!(0), Utc::now()),
            Err(Error::InvalidPrice { .. })
        ));
    }

    #[test]
    fn test_liquidation_is_monotonic_and_forced() {
        let mut book = PositionBook::new(dec!(100000));
        let proposed = propose(&book, "BTCUSDT", 96.0, Side::Long);
        let (id, _) = book.open(&proposed, 3, Utc::now()).unwrap();
        let symbol = Symbol::from("BTCUSDT");

        let mut previous_ratio = Decimal::ZERO;
        let mut price = dec!(43000);
        while book.position(id).is_some() {
            price -= dec!(250);
            let events = book.revalue(&symbol, price, Utc::now()).unwrap();
            if let Some(position) = book.position(id) {
                assert!(position.maintenance_margin_ratio >= previous_ratio);
                previous_ratio = position.maintenance_margin_ratio;
            } else {
                assert_eq!(events.len(), 2);
                assert!(price <= dec!(40957.5));
            }
        }

        let closed = book.closed_position(id).unwrap();
        assert_eq!(closed.reason, CloseReason::Liquidated);
        assert_eq!(closed.position.status, PositionStatus::Closed);
        assert_eq!(closed.exit_price, dec!(40957.5));
        assert_eq!(closed.realized_pnl, dec!(-1900));
        assert_eq!(book.account().balance, dec!(98100));
        assert_eq!(book.account().reserved_margin, dec!(0));
    }

    #[test]
    fn test_short_liquidation_on_upward_gap() {
        let mut book = PositionBook::new(dec!(100000));
        let proposed = propose(&book, "ETHUSDT", 92.0, Side::Short);
        let (id, _) = book.open(&proposed, 3, Utc::now()).unwrap();

        let events = book.revalue(&Symbol::from("ETHUSDT"), dec!(60000), Utc::now()).unwrap();
        assert!(matches!(
            events.last(),
            Some(LifecycleEvent::PositionClosed(PositionClosed { reason: CloseReason::Liquidated, .. }))
        ));
        assert_eq!(book.closed_position(id).unwrap().realized_pnl, dec!(-1900));
        assert!(book.account().balance >= Decimal::ZERO);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut book = PositionBook::new(dec!(100000));
        let proposed = propose(&book, "BTCUSDT", 96.0, Side::Long);
        let (id, _) = book.open(&proposed, 3, Utc::now()).unwrap();
        book.revalue(&Symbol::from("BTCUSDT"), dec!(43500), Utc::now()).unwrap();

        let (first, event) = book.close(id, CloseReason::Manual, Utc::now()).unwrap();
        assert!(event.is_some());
        let balance = book.account().balance;
        let entries = book.ledger().entries().len();

        let (second, event) = book.close(id, CloseReason::Manual, Utc::now()).unwrap();
        assert!(event.is_none());
        assert_eq!(first, second);
        assert_eq!(book.account().balance, balance);
        assert_eq!(book.ledger().entries().len(), entries);
        assert_eq!(book.account().total_trades, 1);

        assert_eq!(
            book.close(PositionId(99), CloseReason::Manual, Utc::now()).unwrap_err(),
            Error::UnknownPosition(PositionId(99))
        );
    }

    #[test]
    fn test_balance_conservation_over_random_ticks() {
        let mut rng = StdRng::seed_from_u64(42);
        let symbol = Symbol::from("BTCUSDT");

        for round in 0..50 {
            let mut book = PositionBook::new(dec!(100000));
            let side = if round % 2 == 0 { Side::Long } else { Side::Short };
            let proposed = propose(&book, "BTCUSDT", rng.gen_range(70.0..100.0), side);
            let before_open = book.account().balance;
            let (id, _) = book.open(&proposed, 3, Utc::now()).unwrap();

            for _ in 0..rng.gen_range(0..20) {
                // Stay within 4% of entry, inside every band's liquidation distance.
                let bps: i64 = rng.gen_range(-400..=400);
                let price = dec!(43000) * (dec!(1) + Decimal::new(bps, 4));
                book.revalue(&symbol, price, Utc::now()).unwrap();
            }

            let (closed, _) = book.close(id, CloseReason::Manual, Utc::now()).unwrap();
            assert_eq!(book.account().balance, before_open + closed.realized_pnl);
            assert_eq!(book.account().total_realized_pnl, closed.realized_pnl);
        }
    }

    #[test]
    fn test_protective_exits() {
        let mut book = PositionBook::new(dec!(100000));
        book.set_protective_exits(true);
        let symbol = Symbol::from("BTCUSDT");

        // Speculative band: stop defaults half-way to liquidation (40957.5).
        let proposed = propose(&book, "BTCUSDT", 80.0, Side::Long);
        let (id, _) = book.open(&proposed, 3, Utc::now()).unwrap();
        book.revalue(&symbol, dec!(40900), Utc::now()).unwrap();
        let closed = book.closed_position(id).unwrap();
        assert_eq!(closed.reason, CloseReason::StopLoss);
        assert_eq!(closed.exit_price, dec!(40900));

        let proposed = propose(&book, "BTCUSDT", 96.0, Side::Long);
        let (id, _) = book.open(&proposed, 3, Utc::now()).unwrap();
        book.revalue(&symbol, dec!(48200), Utc::now()).unwrap();
        assert_eq!(book.closed_position(id).unwrap().reason, CloseReason::TakeProfit);
        assert!(book.closed_position(id).unwrap().realized_pnl > Decimal::ZERO);
    }

    #[test]
    fn test_snapshot_copies_state() {
        let mut book = PositionBook::new(dec!(100000));
        let proposed = propose(&book, "BTCUSDT", 96.0, Side::Long);
        let (id, _) = book.open(&proposed, 3, Utc::now()).unwrap();
        book.close(id, CloseReason::Manual, Utc::now()).unwrap();
        let proposed = propose(&book, "ETHUSDT", 90.0, Side::Short);
        book.open(&proposed, 3, Utc::now()).unwrap();

        let snapshot = book.snapshot();
        assert_eq!(snapshot.open_positions.len(), 1);
        assert_eq!(snapshot.closed_positions.len(), 1);
        assert_eq!(snapshot.account, *book.account());
    }

    #[test]
    fn test_liquidation_at_exact_price() {
        for (symbol, side) in [("BTCUSDT", Side::Long), ("ETHUSDT", Side::Short)] {
            let mut book = PositionBook::new(dec!(100000));
            let proposed = propose(&book, symbol, 96.0, side);
            let (id, _) = book.open(&proposed, 3, Utc::now()).unwrap();

            let events = book
                .revalue(&Symbol::from(symbol), proposed.liquidation_price, Utc::now())
                .unwrap();
            assert_eq!(events.len(), 2);

            let closed = book.closed_position(id).unwrap();
            assert_eq!(closed.reason, CloseReason::Liquidated);
            assert_eq!(closed.exit_price, proposed.liquidation_price);
            assert_eq!(closed.realized_pnl, -LIQUIDATION_BUFFER * proposed.margin_amount);
            assert_eq!(book.account().balance, dec!(98100));
        }
    }

    #[test]
    fn test_overflowing_price_is_refused() {
        let mut book = PositionBook::new(dec!(100000));
        let mut proposed = propose(&book, "BTCUSDT", 96.0, Side::Long);
        proposed.size_units = dec!(1000);
        let (id, _) = book.open(&proposed, 3, Utc::now()).unwrap();
        let before = book.position(id).unwrap().clone();

        let err = book.revalue(&Symbol::from("BTCUSDT"), Decimal::MAX, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::InvalidPrice { .. }));
        assert_eq!(*book.position(id).unwrap(), before);

        // The book keeps working afterwards.
        book.revalue(&Symbol::from("BTCUSDT"), dec!(43100), Utc::now()).unwrap();
        let (closed, _) = book.close(id, CloseReason::Manual, Utc::now()).unwrap();
        assert_eq!(closed.realized_pnl, dec!(100000));
        assert_eq!(book.account().balance, dec!(200000));
    }
}
