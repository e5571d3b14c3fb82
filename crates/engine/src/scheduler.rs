// In crates/engine/src/scheduler.rs

use crate::{BookHandle, ErrorKind, Result};
use chrono::{DateTime, Utc};
use core_types::{PriceTick, Symbol};
use events::LifecycleEvent;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};

/// A source of mark prices.
pub trait PriceFeed: Send {
    /// Current prices for `symbols`, observed at `at`. Symbols the feed does
    /// not know are left out.
    fn ticks(&mut self, symbols: &[Symbol], at: DateTime<Utc>) -> Vec<PriceTick>;
}

/// Periodically revalues every open position through the book owner.
pub struct RevaluationScheduler<F> {
    handle: BookHandle,
    feed: F,
    period: Duration,
}

impl<F: PriceFeed> RevaluationScheduler<F> {
    pub fn new(handle: BookHandle, feed: F, period: Duration) -> Self {
        Self { handle, feed, period }
    }

    /// Fans a single tick out to the open position on its symbol.
    pub async fn on_tick(&self, tick: PriceTick) -> Result<Vec<LifecycleEvent>> {
        self.handle.on_tick(tick).await
    }

    /// One revaluation pass over the currently open symbols. Returns how many
    /// ticks were applied.
    ///
    /// A tick the book refuses is logged and skipped; only a stopped book
    /// owner ends the pass with an error.
    pub async fn run_once(&mut self, at: DateTime<Utc>) -> Result<usize> {
        let snapshot = self.handle.snapshot().await?;
        let symbols: Vec<Symbol> = snapshot
            .open_positions
            .iter()
            .map(|p| p.symbol.clone())
            .collect();

        let mut applied = 0;
        for tick in self.feed.ticks(&symbols, at) {
            let symbol = tick.symbol.clone();
            match self.handle.on_tick(tick).await {
                Ok(_) => applied += 1,
                Err(e) if e.kind() == ErrorKind::ChannelClosed => return Err(e),
                Err(e) => tracing::warn!(%symbol, error = %e, "Tick refused by the book."),
            }
        }
        Ok(applied)
    }

    /// Runs passes every period until `shutdown` flips to true or its sender
    /// is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        tracing::info!(period = ?self.period, "Revaluation scheduler started.");
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once(Utc::now()).await?;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Revaluation scheduler stopped.");
                        return Ok(());
                    }
                }
            }
        }
    }
}
