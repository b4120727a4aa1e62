//! Listeners notified when an asynchronous call completes.

use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::event::CallEvent;

/// Error returned by a listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The listener could not handle the event.
    #[error("Listener failed: {0}")]
    Failed(String),

    /// The listener's downstream receiver is gone.
    #[error("Listener channel closed")]
    ChannelClosed,
}

/// Receives the terminal event of a call.
///
/// Called on the call's background task, never on the thread that started
/// the call.
pub trait CallListener: Send + Sync {
    fn on_event(&self, event: &CallEvent) -> Result<(), ListenerError>;
}

impl<F> CallListener for F
where
    F: Fn(&CallEvent) -> Result<(), ListenerError> + Send + Sync,
{
    fn on_event(&self, event: &CallEvent) -> Result<(), ListenerError> {
        self(event)
    }
}

/// Forwards events into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    sender: mpsc::UnboundedSender<Arc<CallEvent>>,
}

impl ChannelListener {
    /// Create a listener and the receiver it feeds.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Arc<CallEvent>>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl CallListener for ChannelListener {
    fn on_event(&self, event: &CallEvent) -> Result<(), ListenerError> {
        self.sender
            .send(Arc::new(event.clone()))
            .map_err(|_| ListenerError::ChannelClosed)
    }
}

/// Handle for removing a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A frozen copy of a listener set, in registration order.
pub type ListenerSnapshot = Arc<[Arc<dyn CallListener>]>;

/// Thread-safe, ordered listener registry.
#[derive(Default)]
pub struct ListenerSet {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn CallListener>)>>,
    next_id: AtomicU64,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener after all existing ones.
    pub fn add<L: CallListener + 'static>(&self, listener: L) -> ListenerId {
        self.add_arc(Arc::new(listener))
    }

    /// Register a shared listener.
    pub fn add_arc(&self, listener: Arc<dyn CallListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    /// Unregister a listener. Returns whether it was registered.
    ///
    /// Calls already started keep notifying it.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    /// Freeze the current listeners.
    pub fn snapshot(&self) -> ListenerSnapshot {
        self.listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("len", &self.len())
            .finish()
    }
}
