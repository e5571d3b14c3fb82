// In crates/engine/src/lib.rs

pub mod actor;
pub mod error;
pub mod scheduler;
pub mod task;

pub use actor::{BookActor, BookHandle};
pub use error::{Error, ErrorKind, Result};
pub use scheduler::{PriceFeed, RevaluationScheduler};
pub use task::{SignalSource, SignalTask};

use anyhow::Context;
use app_config::Settings;
use chrono::{DateTime, Utc};
use core_types::StrategyConfig;
use events::EventBus;
use execution::{BookSnapshot, PositionBook};
use futures::future;
use risk::BandedRiskSizer;
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::sync::watch;

/// Wires the book owner, the revaluation scheduler and the signal task
/// together for one session.
pub struct Engine {
    strategy: StrategyConfig,
    initial_balance: Decimal,
    revaluation_period: Duration,
    signal_interval: Duration,
    command_buffer: usize,
    bus: EventBus,
}

impl Engine {
    pub fn from_settings(settings: &Settings, bus: EventBus) -> anyhow::Result<Self> {
        Ok(Self {
            strategy: settings.active_strategy()?,
            initial_balance: settings.initial_balance()?,
            revaluation_period: Duration::from_millis(settings.engine.revaluation_period_ms),
            signal_interval: Duration::from_millis(settings.simulation.signal_interval_ms),
            command_buffer: settings.engine.command_buffer,
            bus,
        })
    }

    fn start_book(&self) -> Result<(BookHandle, tokio::task::JoinHandle<()>)> {
        BookActor::spawn(
            PositionBook::new(self.initial_balance),
            self.strategy.clone(),
            Box::new(BandedRiskSizer::new()),
            self.bus.clone(),
            self.command_buffer,
        )
    }

    /// Runs the timer-driven session until `shutdown` fires, then flattens
    /// the book and returns its final state.
    pub async fn run<F, S>(
        &self,
        feed: F,
        source: S,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<BookSnapshot>
    where
        F: PriceFeed + 'static,
        S: SignalSource + 'static,
    {
        tracing::info!(tier = %self.strategy.name, "Starting engine session.");
        let (handle, owner) = self.start_book()?;

        let scheduler = RevaluationScheduler::new(handle.clone(), feed, self.revaluation_period);
        let signals = SignalTask::new(handle.clone(), source, self.signal_interval);
        let task_handles = vec![
            tokio::spawn(scheduler.run(shutdown.clone())),
            tokio::spawn(signals.run(shutdown)),
        ];

        // Both loops only return on shutdown or when the book owner is gone.
        for result in future::join_all(task_handles).await {
            result.context("engine task panicked")??;
        }

        let snapshot = flatten(&handle, Utc::now()).await?;
        drop(handle);
        owner.await.context("book owner panicked")?;
        Ok(snapshot)
    }

    /// Runs `steps` rounds of revaluation then signal intake against a
    /// simulated clock, with no timers involved.
    ///
    /// Each step advances the clock by the signal interval, so the same feed,
    /// source and seed always produce the same session.
    pub async fn simulate<F, S>(
        &self,
        feed: F,
        source: S,
        steps: u64,
        start: DateTime<Utc>,
    ) -> anyhow::Result<BookSnapshot>
    where
        F: PriceFeed,
        S: SignalSource,
    {
        tracing::info!(tier = %self.strategy.name, steps, "Starting simulated session.");
        let (handle, owner) = self.start_book()?;
        let mut scheduler = RevaluationScheduler::new(handle.clone(), feed, self.revaluation_period);
        let mut signals = SignalTask::new(handle.clone(), source, self.signal_interval);

        let step_length = chrono::Duration::from_std(self.signal_interval)?;
        let mut now = start;
        for _ in 0..steps {
            scheduler.run_once(now).await?;
            signals.step(now).await?;
            now += step_length;
        }

        let (submitted, opened) = signals.counts();
        tracing::info!(submitted, opened, "Simulated session finished.");

        let snapshot = flatten(&handle, now).await?;
        drop((handle, scheduler, signals));
        owner.await.context("book owner panicked")?;
        Ok(snapshot)
    }
}

/// Manually closes whatever is still open and returns the final snapshot.
async fn flatten(handle: &BookHandle, at: DateTime<Utc>) -> Result<BookSnapshot> {
    let open = handle.snapshot().await?.open_positions;
    if !open.is_empty() {
        tracing::info!(count = open.len(), "Closing remaining positions at session end.");
    }
    for position in open {
        handle.close_at(position.id, at).await?;
    }
    handle.snapshot().await
}
