// In crates/events/src/bus.rs

use crate::{EventType, LifecycleEvent};
use core_types::PositionId;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use thiserror::Error;
use tokio::sync::mpsc;

/// Returned by a handler that could not process an event; the bus will
/// deliver the same event again.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Delivery failed: {0}")]
pub struct DeliveryError(pub String);

pub type HandlerResult = std::result::Result<(), DeliveryError>;

type Handler = Box<dyn FnMut(&LifecycleEvent) -> HandlerResult + Send>;

const DEFAULT_MAX_REDELIVERIES: u32 = 3;

struct Shared {
    subscribers: Mutex<BTreeMap<u64, Arc<Mutex<Handler>>>>,
    next_id: AtomicU64,
    // Held for the whole fan-out of one event so deliveries never interleave.
    delivery: Mutex<()>,
    max_redeliveries: u32,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process publisher of position lifecycle events.
///
/// Events reach every subscriber in the order they were published, which
/// covers the per-symbol ordering consumers rely on. Delivery is
/// at-least-once: a handler that returns an error sees the same event again,
/// up to `max_redeliveries` extra times, so handlers must be idempotent on
/// [`EventKey`](crate::EventKey). Handlers run on the publishing thread and
/// must not publish.
#[derive(Clone)]
pub struct EventBus {
    shared: Arc<Shared>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REDELIVERIES)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("max_redeliveries", &self.shared.max_redeliveries)
            .finish()
    }
}

impl EventBus {
    pub fn new(max_redeliveries: u32) -> Self {
        Self {
            shared: Arc::new(Shared {
                subscribers: Mutex::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
                delivery: Mutex::new(()),
                max_redeliveries,
            }),
        }
    }

    /// Registers a handler. Keep the returned [`Subscription`] to unsubscribe.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(&LifecycleEvent) -> HandlerResult + Send + 'static,
    {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let handler: Handler = Box::new(handler);
        lock(&self.shared.subscribers).insert(id, Arc::new(Mutex::new(handler)));
        tracing::debug!(subscription = id, "Event subscriber registered.");
        Subscription {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Forwards every event into an unbounded channel, for async consumers.
    pub fn subscribe_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<LifecycleEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |event| {
            // A dropped receiver cannot be helped by redelivery.
            let _ = tx.send(event.clone());
            Ok(())
        });
        (subscription, rx)
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.shared.subscribers).len()
    }

    /// Delivers `event` to every current subscriber.
    ///
    /// Returns how many subscribers acknowledged it. A subscriber that keeps
    /// failing after all redeliveries is logged and skipped.
    pub fn publish(&self, event: LifecycleEvent) -> usize {
        let _delivery = lock(&self.shared.delivery);
        let handlers: Vec<(u64, Arc<Mutex<Handler>>)> = lock(&self.shared.subscribers)
            .iter()
            .map(|(id, handler)| (*id, Arc::clone(handler)))
            .collect();

        let mut acknowledged = 0;
        for (id, handler) in handlers {
            let mut handler = lock(&handler);
            let mut attempt = 0;
            loop {
                match (*handler)(&event) {
                    Ok(()) => {
                        acknowledged += 1;
                        break;
                    }
                    Err(e) if attempt < self.shared.max_redeliveries => {
                        attempt += 1;
                        tracing::warn!(
                            subscription = id,
                            key = ?event.key(),
                            attempt,
                            error = %e,
                            "Subscriber rejected event, redelivering."
                        );
                    }
                    Err(e) => {
                        tracing::error!(
                            subscription = id,
                            key = ?event.key(),
                            error = %e,
                            "Subscriber failed after all redeliveries. Skipping."
                        );
                        break;
                    }
                }
            }
        }
        acknowledged
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    shared: Weak<Shared>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Removes the handler. Returns false if the bus is gone or the handler
    /// was already removed.
    pub fn unsubscribe(self) -> bool {
        match self.shared.upgrade() {
            Some(shared) => {
                let removed = lock(&shared.subscribers).remove(&self.id).is_some();
                tracing::debug!(subscription = self.id, removed, "Event subscriber removed.");
                removed
            }
            None => false,
        }
    }
}

/// How many closed positions a [`Deduplicator`] keeps refusing events for.
const CLOSED_MEMORY: usize = 1024;

/// Remembers which deliveries a subscriber has already applied.
///
/// Versions only grow per position, so the highest one seen stands in for
/// every earlier [`EventKey`](crate::EventKey). A close drops that entry and
/// moves the id to a bounded list of recently closed positions.
#[derive(Debug, Default)]
pub struct Deduplicator {
    latest: HashMap<PositionId, u64>,
    closed: HashSet<PositionId>,
    closed_order: VecDeque<PositionId>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// True the first time an event's key is seen.
    pub fn first_sight(&mut self, event: &LifecycleEvent) -> bool {
        let id = event.position_id();
        if self.closed.contains(&id) {
            return false;
        }
        let version = event.version();
        if self.latest.get(&id).is_some_and(|&seen| version <= seen) {
            return false;
        }

        if event.event_type() == EventType::Closed {
            self.latest.remove(&id);
            self.remember_closed(id);
        } else {
            self.latest.insert(id, version);
        }
        true
    }

    /// Positions currently tracked by version, i.e. not yet seen closing.
    pub fn tracked(&self) -> usize {
        self.latest.len()
    }

    fn remember_closed(&mut self, id: PositionId) {
        if self.closed_order.len() >= CLOSED_MEMORY {
            if let Some(oldest) = self.closed_order.pop_front() {
                self.closed.remove(&oldest);
            }
        }
        self.closed.insert(id);
        self.closed_order.push_back(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PositionClosed, PositionOpened, PositionRevalued};
    use chrono::Utc;
    use core_types::{CloseReason, Side, Symbol};
    use rust_decimal_macros::dec;
    use std::sync::atomic::AtomicU32;

    fn opened(id: u64, symbol: &str) -> LifecycleEvent {
        LifecycleEvent::PositionOpened(PositionOpened {
            position_id: PositionId(id),
            symbol: Symbol::from(symbol),
            direction: Side::Long,
            entry_price: dec!(100),
            margin_amount: dec!(10),
            leverage: 10,
            version: 1,
            at: Utc::now(),
        })
    }

    fn revalued(id: u64, symbol: &str, version: u64) -> LifecycleEvent {
        LifecycleEvent::PositionRevalued(PositionRevalued {
            position_id: PositionId(id),
            symbol: Symbol::from(symbol),
            mark_price: dec!(101),
            unrealized_pnl: dec!(1),
            unrealized_pnl_percent: dec!(10),
            maintenance_margin_ratio: dec!(4.5),
            version,
            at: Utc::now(),
        })
    }

    fn closed(id: u64, symbol: &str, version: u64) -> LifecycleEvent {
        LifecycleEvent::PositionClosed(PositionClosed {
            position_id: PositionId(id),
            symbol: Symbol::from(symbol),
            exit_price: dec!(99),
            realized_pnl: dec!(-1),
            reason: CloseReason::Manual,
            version,
            at: Utc::now(),
        })
    }

    #[test]
    fn test_events_arrive_in_publication_order() {
        let bus = EventBus::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = bus.subscribe(move |event| {
            sink.lock().unwrap().push((event.symbol().clone(), event.version()));
            Ok(())
        });

        bus.publish(opened(1, "BTCUSDT"));
        bus.publish(opened(2, "ETHUSDT"));
        for version in 2..6 {
            bus.publish(revalued(1, "BTCUSDT", version));
            bus.publish(revalued(2, "ETHUSDT", version));
        }

        let seen = seen.lock().unwrap();
        for symbol in ["BTCUSDT", "ETHUSDT"] {
            let versions: Vec<u64> = seen
                .iter()
                .filter(|(s, _)| s.0 == symbol)
                .map(|(_, v)| *v)
                .collect();
            assert_eq!(versions, vec![1, 2, 3, 4, 5]);
        }
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::default();
        let count = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&count);
        let sub = bus.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(bus.publish(opened(1, "BTCUSDT")), 1);
        assert!(sub.unsubscribe());
        assert_eq!(bus.publish(opened(2, "BTCUSDT")), 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_failed_delivery_is_retried_and_deduped() {
        let bus = EventBus::new(3);
        let attempts = Arc::new(AtomicU32::new(0));
        let applied = Arc::new(AtomicU32::new(0));
        let (a, b) = (Arc::clone(&attempts), Arc::clone(&applied));
        let mut dedup = Deduplicator::new();

        let _sub = bus.subscribe(move |event| {
            let n = a.fetch_add(1, Ordering::SeqCst);
            if dedup.first_sight(event) {
                b.fetch_add(1, Ordering::SeqCst);
            }
            // Apply, then fail the ack twice: a lost acknowledgement.
            if n < 2 {
                return Err(DeliveryError("ack lost".into()));
            }
            Ok(())
        });

        assert_eq!(bus.publish(opened(1, "BTCUSDT")), 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(applied.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_exhausted_subscriber_does_not_block_others() {
        let bus = EventBus::new(1);
        let failing_attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&failing_attempts);
        let _failing = bus.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(DeliveryError("down".into()))
        });
        let (_sub, mut rx) = bus.subscribe_channel();

        assert_eq!(bus.publish(opened(1, "BTCUSDT")), 1);
        assert_eq!(failing_attempts.load(Ordering::SeqCst), 2);
        assert_eq!(rx.try_recv().unwrap().position_id(), PositionId(1));
    }

    #[tokio::test]
    async fn test_channel_subscription() {
        let bus = EventBus::default();
        let (_sub, mut rx) = bus.subscribe_channel();

        bus.publish(opened(7, "SOLUSDT"));
        bus.publish(revalued(7, "SOLUSDT", 2));

        assert_eq!(rx.recv().await.unwrap().version(), 1);
        assert_eq!(rx.recv().await.unwrap().version(), 2);
    }

    #[test]
    fn test_deduplicator_forgets_closed_positions() {
        let mut dedup = Deduplicator::new();
        assert!(dedup.first_sight(&opened(1, "BTCUSDT")));
        for version in 2..=4 {
            assert!(dedup.first_sight(&revalued(1, "BTCUSDT", version)));
        }
        assert!(!dedup.first_sight(&revalued(1, "BTCUSDT", 3)));
        assert!(dedup.first_sight(&opened(2, "ETHUSDT")));
        assert_eq!(dedup.tracked(), 2);

        let close = closed(1, "BTCUSDT", 5);
        assert!(dedup.first_sight(&close));
        assert_eq!(dedup.tracked(), 1);
        assert!(!dedup.first_sight(&close));
        assert!(!dedup.first_sight(&revalued(1, "BTCUSDT", 6)));
    }
}
