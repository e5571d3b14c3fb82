// In app/src/tracing_layer.rs

use std::collections::VecDeque;
use std::fmt::Write;
use std::sync::{Arc, Mutex};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;

const RECENT_CAPACITY: usize = 20;

/// The most recent log lines captured by [`RecentLogLayer`], oldest first.
pub type RecentLog = Arc<Mutex<VecDeque<String>>>;

/// Keeps the last few log lines in memory so the session report can show
/// them. Attach it behind a level filter to choose what is kept.
pub struct RecentLogLayer {
    cache: RecentLog,
}

impl RecentLogLayer {
    pub fn new() -> (Self, RecentLog) {
        let cache: RecentLog = Arc::new(Mutex::new(VecDeque::with_capacity(RECENT_CAPACITY)));
        (Self { cache: cache.clone() }, cache)
    }
}

impl<S> Layer<S> for RecentLogLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        let line = format!("{:<5} {}{}", event.metadata().level(), visitor.message, visitor.fields);

        let Ok(mut cache) = self.cache.lock() else {
            return;
        };
        if cache.len() >= RECENT_CAPACITY {
            cache.pop_front();
        }
        cache.push_back(line);
    }
}

/// Renders an event as its message followed by `key=value` pairs.
#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl tracing::field::Visit for LineVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }
}
