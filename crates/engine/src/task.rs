// In crates/engine/src/task.rs

use crate::{BookHandle, ErrorKind, Result};
use chrono::{DateTime, Utc};
use core_types::{PositionId, SignalPayload};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};

/// Anything that produces raw trading signals.
pub trait SignalSource: Send {
    /// The next signal, if one is ready at `at`.
    fn poll(&mut self, at: DateTime<Utc>) -> Option<SignalPayload>;
}

/// A long-running task that forwards signals from a source to the book.
pub struct SignalTask<S> {
    handle: BookHandle,
    source: S,
    period: Duration,
    submitted: u64,
    opened: u64,
}

impl<S: SignalSource> SignalTask<S> {
    pub fn new(handle: BookHandle, source: S, period: Duration) -> Self {
        Self {
            handle,
            source,
            period,
            submitted: 0,
            opened: 0,
        }
    }

    /// Polls the source once and submits what it yields.
    ///
    /// Rejections and sizing failures are normal outcomes and come back as
    /// `Ok(None)`; only a stopped book owner is an error.
    pub async fn step(&mut self, at: DateTime<Utc>) -> Result<Option<PositionId>> {
        let Some(payload) = self.source.poll(at) else {
            return Ok(None);
        };
        self.submitted += 1;

        match self.handle.submit_payload(payload).await {
            Ok(id) => {
                self.opened += 1;
                Ok(Some(id))
            }
            Err(e) if e.kind() == ErrorKind::ChannelClosed => Err(e),
            Err(e) => {
                tracing::debug!(error = %e, kind = ?e.kind(), "Signal did not open a position.");
                Ok(None)
            }
        }
    }

    /// (signals submitted, positions opened) so far.
    pub fn counts(&self) -> (u64, u64) {
        (self.submitted, self.opened)
    }

    /// The main, long-running loop. Ends when `shutdown` flips to true or its
    /// sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        tracing::info!(period = ?self.period, "Signal task started.");
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.step(Utc::now()).await?;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        let (submitted, opened) = self.counts();
                        tracing::info!(submitted, opened, "Signal task stopped.");
                        return Ok(());
                    }
                }
            }
        }
    }
}
