// In crates/analytics/src/types.rs

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// Simplified statistics for one slice of the closed trades.
#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct BucketPerformance {
    pub trades: u32,
    pub net_pnl: Decimal,
    pub win_rate: f64,
}

/// Performance of a trading session, computed from its closed positions.
#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct PerformanceSummary {
    pub total_trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub win_rate: f64,
    pub net_pnl: Decimal,
    pub net_pnl_percentage: f64,
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    pub profit_factor: f64,
    /// Average realized PnL per trade.
    pub expectancy: Decimal,
    pub avg_holding_secs: f64,
    pub liquidations: u32,

    // Keyed by close reason / confidence band label.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub by_reason: BTreeMap<String, u32>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub by_confidence: BTreeMap<String, BucketPerformance>,
}

impl PerformanceSummary {
    /// Creates a new, empty summary.
    pub fn new() -> Self {
        Self::default()
    }
}
