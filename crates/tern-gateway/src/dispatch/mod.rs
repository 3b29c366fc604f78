//! Event dispatcher
//!
//! Fans decoded events out to registered listeners on a dedicated task, so a
//! listener that blocks, errors, or panics never stalls the connection's read
//! loop. Listeners for one event type run in registration order; delivery
//! order across events matches socket arrival order.

use crate::events::{Event, EventType};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tern_common::ListenerError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A registered event listener
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Handle one event
    ///
    /// Errors are caught at the dispatch boundary and logged; they never
    /// reach the connection or other listeners.
    async fn on_event(&self, event: &Event) -> Result<(), ListenerError>;
}

/// Handle identifying a registration, used for unregistering and in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Configuration for the event dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Capacity of the channel between the read loop and the dispatch task
    pub buffer: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { buffer: 256 }
    }
}

type ListenerTable = DashMap<EventType, Vec<(ListenerId, Arc<dyn EventListener>)>>;

/// Delivers events to registered listeners in arrival order
pub struct EventDispatcher {
    listeners: Arc<ListenerTable>,
    registered_types: Arc<DashMap<u64, EventType>>,
    next_id: AtomicU64,
    tx: mpsc::Sender<Event>,
}

impl EventDispatcher {
    /// Create the dispatcher and spawn its delivery task
    ///
    /// The task drains the event channel until the token is cancelled and the
    /// channel is closed.
    #[must_use]
    pub fn new(config: DispatcherConfig, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(config.buffer);
        let listeners: Arc<ListenerTable> = Arc::new(DashMap::new());

        tokio::spawn(Self::run(Arc::clone(&listeners), rx, cancel));

        Self {
            listeners,
            registered_types: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            tx,
        }
    }

    /// Register a listener for an event type
    pub fn register(&self, event_type: EventType, listener: Arc<dyn EventListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.registered_types.insert(id.0, event_type.clone());
        self.listeners.entry(event_type).or_default().push((id, listener));
        id
    }

    /// Remove a listener; returns whether it was registered
    pub fn unregister(&self, id: ListenerId) -> bool {
        let Some((_, event_type)) = self.registered_types.remove(&id.0) else {
            return false;
        };
        if let Some(mut entry) = self.listeners.get_mut(&event_type) {
            entry.retain(|(registered, _)| *registered != id);
        }
        true
    }

    /// Channel feeding the dispatch task; the connection's read loop holds
    /// the other end
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<Event> {
        self.tx.clone()
    }

    async fn run(
        listeners: Arc<ListenerTable>,
        mut rx: mpsc::Receiver<Event>,
        cancel: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            Self::deliver(&listeners, Arc::new(event)).await;
        }
        tracing::debug!("Event dispatch task stopped");
    }

    async fn deliver(listeners: &ListenerTable, event: Arc<Event>) {
        // snapshot so registration during delivery cannot deadlock the shard
        let targets: Vec<(ListenerId, Arc<dyn EventListener>)> = listeners
            .get(&event.event_type)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        for (id, listener) in targets {
            let task_event = Arc::clone(&event);
            // each invocation runs in its own task so a panic is contained
            let invocation =
                tokio::spawn(async move { listener.on_event(&task_event).await });

            match invocation.await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    tracing::error!(
                        listener = %id,
                        event_type = %event.event_type,
                        sequence = event.sequence,
                        %error,
                        "Listener returned an error"
                    );
                }
                Err(join_error) => {
                    tracing::error!(
                        listener = %id,
                        event_type = %event.event_type,
                        sequence = event.sequence,
                        panicked = join_error.is_panic(),
                        "Listener aborted"
                    );
                }
            }
        }
    }
}
