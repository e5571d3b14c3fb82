// In app/src/report.rs

use crate::tracing_layer::RecentLog;
use analytics::{AnalyticsEngine, PerformanceSummary};
use execution::BookSnapshot;
use rust_decimal::Decimal;

/// Prints the end-of-session summary to stdout.
pub fn print_session_report(initial_balance: Decimal, snapshot: &BookSnapshot, recent: &RecentLog) {
    let summary = AnalyticsEngine::new().calculate(initial_balance, &snapshot.closed_positions);
    let account = &snapshot.account;

    println!("\n--- Session Complete ---");
    println!("------------------------");
    println!(
        "Balance: {:.2} -> {:.2} | Realized P&L: {:.2} | Trades: {}",
        initial_balance, account.balance, account.total_realized_pnl, account.total_trades
    );
    print_summary(&summary);

    if let Ok(lines) = recent.lock() {
        if !lines.is_empty() {
            println!("\nRecent warnings:");
            for line in lines.iter() {
                println!("  {line}");
            }
        }
    }
    println!("------------------------");
}

fn print_summary(summary: &PerformanceSummary) {
    if summary.total_trades == 0 {
        println!("No positions were closed.");
        return;
    }

    println!(
        "  - P&L: ${:.2} ({:.2}%) | Win rate: {:.1}% ({}W/{}L) | Profit factor: {:.2}",
        summary.net_pnl,
        summary.net_pnl_percentage,
        summary.win_rate,
        summary.wins,
        summary.losses,
        summary.profit_factor,
    );
    println!(
        "  - Gross profit: ${:.2} | Gross loss: ${:.2} | Expectancy: ${:.2}/trade",
        summary.gross_profit, summary.gross_loss, summary.expectancy
    );
    println!(
        "  - Avg holding: {:.0}s | Liquidations: {}",
        summary.avg_holding_secs, summary.liquidations
    );

    println!("\nBy close reason:");
    for (reason, count) in &summary.by_reason {
        println!("  {reason:<11} {count}");
    }
    println!("\nBy confidence:");
    for (bucket, performance) in &summary.by_confidence {
        println!(
            "  {bucket:<7} trades: {:<4} P&L: ${:<12.2} win rate: {:.1}%",
            performance.trades, performance.net_pnl, performance.win_rate
        );
    }
}
