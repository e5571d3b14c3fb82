// In crates/engine/src/actor.rs

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use core_types::{
    CloseReason, ClosedPosition, PositionId, PriceTick, Signal, SignalPayload, StrategyConfig,
};
use events::{EventBus, LifecycleEvent};
use execution::{BookSnapshot, PositionBook};
use risk::{PositionSizer, Rejection, intake};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// The requests the book owner serves, one at a time.
enum Command {
    SubmitSignal {
        signal: Signal,
        reply: oneshot::Sender<Result<PositionId>>,
    },
    Tick {
        tick: PriceTick,
        reply: oneshot::Sender<Result<Vec<LifecycleEvent>>>,
    },
    Close {
        id: PositionId,
        at: DateTime<Utc>,
        reply: oneshot::Sender<Result<ClosedPosition>>,
    },
    SetStrategy {
        config: StrategyConfig,
        reply: oneshot::Sender<Result<()>>,
    },
    Snapshot {
        reply: oneshot::Sender<BookSnapshot>,
    },
}

/// The single writer of a [`PositionBook`].
///
/// Every mutation of the book and its ledger happens inside this task, so
/// intake, sizing and the commit of a position can never interleave with a
/// revaluation or another open.
pub struct BookActor {
    book: PositionBook,
    strategy: StrategyConfig,
    sizer: Box<dyn PositionSizer>,
    bus: EventBus,
    snapshots: watch::Sender<BookSnapshot>,
    commands: mpsc::Receiver<Command>,
}

impl BookActor {
    /// Spawns the owner task and returns the handle used to talk to it.
    ///
    /// The task stops once every handle has been dropped.
    pub fn spawn(
        mut book: PositionBook,
        strategy: StrategyConfig,
        sizer: Box<dyn PositionSizer>,
        bus: EventBus,
        buffer: usize,
    ) -> Result<(BookHandle, JoinHandle<()>)> {
        strategy.validate()?;
        book.set_protective_exits(strategy.protective_exits);

        let (command_tx, command_rx) = mpsc::channel(buffer.max(1));
        let (snapshot_tx, snapshot_rx) = watch::channel(book.snapshot());
        let actor = Self {
            book,
            strategy,
            sizer,
            bus,
            snapshots: snapshot_tx,
            commands: command_rx,
        };

        tracing::info!(
            tier = %actor.strategy.name,
            sizer = actor.sizer.name(),
            balance = %actor.book.account().balance,
            "Starting book owner."
        );
        let join = tokio::spawn(actor.run());
        Ok((
            BookHandle {
                commands: command_tx,
                snapshots: snapshot_rx,
            },
            join,
        ))
    }

    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            self.handle(command);
        }
        tracing::info!(
            open = self.book.open_positions().count(),
            balance = %self.book.account().balance,
            "All book handles dropped. Book owner stopped."
        );
    }

    fn handle(&mut self, command: Command) {
        // A caller that stopped waiting for its reply is not an error.
        match command {
            Command::SubmitSignal { signal, reply } => {
                let result = self.submit(signal);
                self.publish_snapshot();
                let _ = reply.send(result);
            }
            Command::Tick { tick, reply } => {
                let result = self
                    .book
                    .revalue(&tick.symbol, tick.price, tick.timestamp)
                    .map_err(Error::from);
                if let Ok(events) = &result {
                    for event in events {
                        self.bus.publish(event.clone());
                    }
                }
                self.publish_snapshot();
                let _ = reply.send(result);
            }
            Command::Close { id, at, reply } => {
                let result = self.close(id, at);
                self.publish_snapshot();
                let _ = reply.send(result);
            }
            Command::SetStrategy { config, reply } => {
                let _ = reply.send(self.set_strategy(config));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.book.snapshot());
            }
        }
    }

    /// Intake, sizing and commit, in one step.
    fn submit(&mut self, signal: Signal) -> Result<PositionId> {
        if let Err(rejection) = intake::accept(&signal, &self.strategy, &self.book) {
            tracing::warn!(
                symbol = %signal.symbol,
                direction = %signal.direction,
                confidence = signal.confidence,
                reason = %rejection,
                "Signal rejected."
            );
            return Err(rejection.into());
        }

        let proposed = self
            .sizer
            .size(&signal, self.book.account(), &self.strategy)
            .inspect_err(|e| tracing::warn!(symbol = %signal.symbol, error = %e, "Sizing failed."))?;
        tracing::debug!(
            symbol = %proposed.symbol,
            band = ?proposed.band,
            risk_level = ?proposed.risk_level,
            leverage = proposed.leverage,
            margin = %proposed.margin_amount,
            "Signal accepted and sized."
        );

        let (id, event) = self
            .book
            .open(&proposed, self.strategy.max_open_positions, signal.timestamp)?;
        self.bus.publish(event);
        Ok(id)
    }

    fn close(&mut self, id: PositionId, at: DateTime<Utc>) -> Result<ClosedPosition> {
        let (closed, event) = self.book.close(id, CloseReason::Manual, at)?;
        if let Some(event) = event {
            self.bus.publish(event);
        }
        Ok(closed)
    }

    fn set_strategy(&mut self, config: StrategyConfig) -> Result<()> {
        config.validate()?;
        tracing::info!(
            from = %self.strategy.name,
            to = %config.name,
            min_confidence = config.min_confidence,
            max_open_positions = config.max_open_positions,
            "Switching strategy tier."
        );
        self.book.set_protective_exits(config.protective_exits);
        self.strategy = config;
        Ok(())
    }

    fn publish_snapshot(&self) {
        self.snapshots.send_replace(self.book.snapshot());
    }
}

/// Cheap, cloneable access to a running [`BookActor`].
#[derive(Clone)]
pub struct BookHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<BookSnapshot>,
}

impl BookHandle {
    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| Error::ChannelClosed)?;
        response.await.map_err(|_| Error::ChannelClosed)
    }

    /// Runs a signal through intake and sizing and opens the position.
    pub async fn submit_signal(&self, signal: Signal) -> Result<PositionId> {
        self.request(|reply| Command::SubmitSignal { signal, reply })
            .await?
    }

    /// Like [`submit_signal`](Self::submit_signal), for a raw payload.
    pub async fn submit_payload(&self, payload: SignalPayload) -> Result<PositionId> {
        let signal = Signal::try_from(payload).map_err(|e| {
            let rejection = Rejection::InvalidSignal(e.to_string());
            tracing::warn!(reason = %rejection, "Signal rejected.");
            rejection
        })?;
        self.submit_signal(signal).await
    }

    /// Revalues the tick's symbol. Returns the events that were published.
    pub async fn on_tick(&self, tick: PriceTick) -> Result<Vec<LifecycleEvent>> {
        self.request(|reply| Command::Tick { tick, reply }).await?
    }

    /// Closes a position manually at its last mark price.
    pub async fn close(&self, id: PositionId) -> Result<ClosedPosition> {
        self.close_at(id, Utc::now()).await
    }

    /// Like [`close`](Self::close), stamped with a caller-supplied time.
    pub async fn close_at(&self, id: PositionId, at: DateTime<Utc>) -> Result<ClosedPosition> {
        self.request(|reply| Command::Close { id, at, reply }).await?
    }

    pub async fn set_strategy(&self, config: StrategyConfig) -> Result<()> {
        self.request(|reply| Command::SetStrategy { config, reply })
            .await?
    }

    /// A snapshot taken by the owner after every command queued before it.
    pub async fn snapshot(&self) -> Result<BookSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// The latest published snapshot, without queueing behind writers.
    pub fn latest_snapshot(&self) -> BookSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe_snapshots(&self) -> watch::Receiver<BookSnapshot> {
        self.snapshots.clone()
    }
}
