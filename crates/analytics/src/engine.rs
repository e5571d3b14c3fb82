use crate::types::{BucketPerformance, PerformanceSummary};
use core_types::{CloseReason, ClosedPosition};
use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use std::collections::HashMap;

/// The engine responsible for calculating performance metrics from settled positions.
#[derive(Default)]
pub struct AnalyticsEngine;

impl AnalyticsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculates a performance summary from the closed positions of a session.
    pub fn calculate(&self, initial_balance: Decimal, closed: &[ClosedPosition]) -> PerformanceSummary {
        let mut summary = PerformanceSummary::new();
        if closed.is_empty() {
            return summary; // Nothing settled yet.
        }

        // --- Totals ---
        summary.total_trades = closed.len() as u32;
        summary.net_pnl = closed.iter().map(|c| c.realized_pnl).sum();
        if initial_balance > dec!(0) {
            summary.net_pnl_percentage =
                (summary.net_pnl / initial_balance).to_f64().unwrap_or(0.0) * 100.0;
        }

        // --- Win rate & profit factor ---
        let winners: Vec<&ClosedPosition> = closed.iter().filter(|c| c.realized_pnl > dec!(0)).collect();
        let losers: Vec<&ClosedPosition> = closed.iter().filter(|c| c.realized_pnl < dec!(0)).collect();
        summary.wins = winners.len() as u32;
        summary.losses = losers.len() as u32;
        summary.win_rate = (summary.wins as f64 / summary.total_trades as f64) * 100.0;

        summary.gross_profit = winners.iter().map(|c| c.realized_pnl).sum();
        summary.gross_loss = losers.iter().map(|c| c.realized_pnl).sum::<Decimal>().abs();
        summary.profit_factor = if summary.gross_loss > dec!(0) {
            (summary.gross_profit / summary.gross_loss).to_f64().unwrap_or(0.0)
        } else if summary.gross_profit > dec!(0) {
            f64::INFINITY // Pure profit
        } else {
            0.0
        };

        summary.expectancy = summary.net_pnl / Decimal::from(closed.len());

        // --- Holding time ---
        let total_secs: i64 = closed
            .iter()
            .map(|c| (c.closed_at - c.position.opened_at).num_seconds())
            .sum();
        summary.avg_holding_secs = total_secs as f64 / closed.len() as f64;

        // --- Close reasons ---
        for c in closed {
            *summary.by_reason.entry(c.reason.to_string()).or_default() += 1;
        }
        summary.liquidations = closed
            .iter()
            .filter(|c| c.reason == CloseReason::Liquidated)
            .count() as u32;

        // --- Confidence-bucketed performance ---
        let mut buckets: HashMap<&'static str, Vec<&ClosedPosition>> = HashMap::new();
        for c in closed {
            let bucket = match c.position.confidence_at_open {
                x if x >= 95.0 => "95-100",
                x if x >= 90.0 => "90-95",
                x if x >= 85.0 => "85-90",
                _ => "0-85",
            };
            buckets.entry(bucket).or_default().push(c);
        }
        for (name, trades) in buckets {
            let wins = trades.iter().filter(|c| c.realized_pnl > dec!(0)).count();
            summary.by_confidence.insert(
                name.to_string(),
                BucketPerformance {
                    trades: trades.len() as u32,
                    net_pnl: trades.iter().map(|c| c.realized_pnl).sum(),
                    win_rate: (wins as f64 / trades.len() as f64) * 100.0,
                },
            );
        }

        summary
    }
}
