//! Event Dispatcher
//!
//! Publish/subscribe fan-out of [`StreamEvent`]s to consumers, two ways:
//!
//! - **Handlers**: callbacks registered per [`EventTopic`], invoked
//!   synchronously and in registration order on the connection manager task
//! - **Broadcast channel**: a tokio broadcast receiver per async consumer that
//!   sees every event; lagging receivers lose the oldest events only
//!
//! Handlers must not block; they run on the task that owns the connection.
//! A handler that panics is logged and skipped so the rest of the fan-out
//! (and the connection) carries on.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::domain::events::{EventTopic, StreamEvent};

/// Default capacity of the event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Registered event callback.
pub type EventHandler = Arc<dyn Fn(&StreamEvent) + Send + Sync>;

/// Identifies a registered handler for [`EventDispatcher::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Topic-keyed handler registry plus a broadcast channel.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use market_stream_client::domain::events::{EventTopic, StreamEvent};
/// use market_stream_client::infrastructure::broadcast::EventDispatcher;
///
/// let dispatcher = EventDispatcher::default();
/// let seen = Arc::new(AtomicUsize::new(0));
///
/// let counter = seen.clone();
/// let id = dispatcher.on(EventTopic::Offline, move |_| {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
///
/// dispatcher.emit(&StreamEvent::Offline);
/// assert!(dispatcher.off(&EventTopic::Offline, id));
/// dispatcher.emit(&StreamEvent::Offline);
///
/// assert_eq!(seen.load(Ordering::SeqCst), 1);
/// ```
pub struct EventDispatcher {
    handlers: RwLock<HashMap<EventTopic, Vec<(HandlerId, EventHandler)>>>,
    next_id: AtomicU64,
    events_tx: broadcast::Sender<StreamEvent>,
}

impl EventDispatcher {
    /// Create a dispatcher whose broadcast channel holds `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            events_tx: broadcast::channel(capacity.max(1)).0,
        }
    }

    /// Register a handler for `topic`.
    pub fn on<F>(&self, topic: EventTopic, handler: F) -> HandlerId
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handler: EventHandler = Arc::new(handler);
        self.handlers
            .write()
            .entry(topic)
            .or_default()
            .push((id, handler));
        id
    }

    /// Remove a handler. Returns `true` if it was registered for `topic`.
    pub fn off(&self, topic: &EventTopic, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let Some(list) = handlers.get_mut(topic) else {
            return false;
        };

        let before = list.len();
        list.retain(|(handler_id, _)| *handler_id != id);
        let removed = list.len() != before;

        if list.is_empty() {
            handlers.remove(topic);
        }

        removed
    }

    /// Get a receiver for every event emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.events_tx.subscribe()
    }

    /// Publish an event to handlers of its topic and to broadcast receivers.
    ///
    /// Handlers are copied out before invocation, so a handler may register
    /// or remove handlers without deadlocking. Returns how many handlers
    /// panicked; the remaining handlers and receivers still see the event.
    pub fn emit(&self, event: &StreamEvent) -> usize {
        let handlers: Vec<EventHandler> = self
            .handlers
            .read()
            .get(&event.topic())
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        let mut panicked = 0;
        for handler in handlers {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(event))) {
                panicked += 1;
                tracing::error!(
                    topic = %event.topic(),
                    panic = panic_message(payload.as_ref()),
                    "Event handler panicked"
                );
            }
        }

        // No receivers is fine
        let _ = self.events_tx.send(event.clone());
        panicked
    }

    /// Number of handlers registered for `topic`.
    #[must_use]
    pub fn handler_count(&self, topic: &EventTopic) -> usize {
        self.handlers.read().get(topic).map_or(0, Vec::len)
    }

    /// Number of live broadcast receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.events_tx.receiver_count()
    }

    /// Remove every handler.
    pub fn clear(&self) {
        self.handlers.write().clear();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers: usize = self.handlers.read().values().map(Vec::len).sum();
        f.debug_struct("EventDispatcher")
            .field("handlers", &handlers)
            .field("receivers", &self.receiver_count())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
