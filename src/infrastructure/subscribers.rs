// Per-kind subscriber lists for stream events
use crate::domain::stream_event::{EventKind, StreamEvent};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

pub type EventHandler = Arc<dyn Fn(&StreamEvent) -> anyhow::Result<()> + Send + Sync>;

/// Box a closure as an [`EventHandler`]
pub fn handler<F>(f: F) -> EventHandler
where
    F: Fn(&StreamEvent) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<EventKind, Vec<(SubscriptionId, EventHandler)>>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, kind: EventKind, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push((id, handler));
        id
    }

    /// Returns false if `id` was not registered for `kind`
    pub fn unregister(&self, kind: EventKind, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = handlers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(registered, _)| *registered != id);
        list.len() != before
    }

    /// Invoke every handler registered for the event's kind, in registration
    /// order. A failing or panicking handler is logged and skipped.
    pub fn dispatch(&self, event: &StreamEvent) -> usize {
        let kind = event.kind();
        // Snapshot so handlers may subscribe/unsubscribe while running
        let handlers: Vec<EventHandler> = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        for handler in &handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(?kind, error = %e, "event handler failed"),
                Err(_) => tracing::error!(?kind, "event handler panicked"),
            }
        }

        handlers.len()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }
}
