//! Asynchronous calls with listener notification.
//!
//! Each call runs on its own Tokio task. The listener set is frozen when the
//! call starts: listeners registered afterwards are not told about it, and
//! listeners removed afterwards still are.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use switchyard_core::*;
//!
//! # async fn run(transport: impl Transport + 'static, descriptor: Descriptor) -> Result<()> {
//! let caller = AsyncCaller::new(transport).with_source("inventory-client");
//! caller.add_listener(|event: &CallEvent| -> std::result::Result<(), ListenerError> {
//!     tracing::info!(success = event.is_success(), "inventory call finished");
//!     Ok(())
//! });
//!
//! let handle = caller.call(descriptor, CallConfig::default(), CallRequest::empty())?;
//! let event = handle.wait().await?;
//! assert!(handle.state().is_terminal());
//! # Ok(())
//! # }
//! ```
//!
//! Calls cannot be cancelled once running; a transport that never returns
//! keeps its call pending forever.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error};
use uuid::Uuid;

use crate::config::CallConfig;
use crate::descriptor::Descriptor;
use crate::engine::{CallResult, FailoverEngine};
use crate::error::{DispatchError, Result};
use crate::event::CallEvent;
use crate::listener::{CallListener, ListenerId, ListenerSet, ListenerSnapshot};
use crate::transport::{CallRequest, Transport};

/// Lifecycle of one asynchronous call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Spawned, not yet started.
    Pending,
    /// Attempts in progress.
    Running,
    /// A target answered.
    Succeeded,
    /// Every attempt failed.
    Failed,
}

impl CallState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Succeeded | CallState::Failed)
    }
}

#[derive(Debug, Clone)]
struct Progress {
    state: CallState,
    event: Option<Arc<CallEvent>>,
    delivered: bool,
}

/// Handle to a call running in the background.
#[derive(Debug, Clone)]
pub struct CallHandle {
    id: Uuid,
    progress: watch::Receiver<Progress>,
    listener_failures: Arc<AtomicUsize>,
}

impl CallHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> CallState {
        self.progress.borrow().state
    }

    /// Number of listeners that returned an error or panicked.
    pub fn listener_failures(&self) -> usize {
        self.listener_failures.load(Ordering::Acquire)
    }

    /// Wait until the call has finished and its listeners were notified.
    ///
    /// May be called any number of times; once the call is done it returns
    /// immediately with the same event.
    pub async fn wait(&self) -> Result<Arc<CallEvent>> {
        let mut progress = self.progress.clone();
        let done = progress
            .wait_for(|p| p.delivered)
            .await
            .map_err(|_| DispatchError::Aborted(format!("call {} ended without an outcome", self.id)))?;

        done.event
            .clone()
            .ok_or_else(|| DispatchError::Aborted(format!("call {} produced no event", self.id)))
    }
}

/// Runs failover calls on background tasks and notifies listeners.
pub struct AsyncCaller<T> {
    engine: Arc<FailoverEngine<T>>,
    source: Arc<str>,
    listeners: ListenerSet,
    runtime: Option<Handle>,
}

impl<T: Transport + 'static> AsyncCaller<T> {
    /// Create a caller over a transport.
    pub fn new(transport: T) -> Self {
        Self::from_engine(Arc::new(FailoverEngine::new(transport)))
    }

    /// Create a caller sharing an existing engine.
    pub fn from_engine(engine: Arc<FailoverEngine<T>>) -> Self {
        Self {
            engine,
            source: Arc::from("switchyard"),
            listeners: ListenerSet::new(),
            runtime: None,
        }
    }

    /// Name reported as the source of this caller's events.
    pub fn with_source(mut self, source: impl AsRef<str>) -> Self {
        self.source = Arc::from(source.as_ref());
        self
    }

    /// Spawn calls on `handle` instead of the ambient runtime.
    ///
    /// Needed when calls are started from threads outside any runtime.
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn engine(&self) -> &Arc<FailoverEngine<T>> {
        &self.engine
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn listeners(&self) -> &ListenerSet {
        &self.listeners
    }

    /// Register a listener for calls started from now on.
    pub fn add_listener<L: CallListener + 'static>(&self, listener: L) -> ListenerId {
        self.listeners.add(listener)
    }

    /// Unregister a listener. Calls already started still notify it.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Start a call notifying the currently registered listeners.
    ///
    /// Returns immediately. Without a runtime set through
    /// [`with_runtime`](Self::with_runtime) this fails with
    /// [`DispatchError::NoRuntime`] outside a Tokio runtime.
    pub fn call(
        &self,
        descriptor: impl Into<Arc<Descriptor>>,
        config: impl Into<Arc<CallConfig>>,
        request: impl Into<Arc<CallRequest>>,
    ) -> Result<CallHandle> {
        let snapshot = self.listeners.snapshot();
        self.spawn(descriptor.into(), config.into(), request.into(), snapshot)
    }

    /// Start a call notifying exactly `listeners`, in order.
    pub fn call_with_listeners(
        &self,
        descriptor: impl Into<Arc<Descriptor>>,
        config: impl Into<Arc<CallConfig>>,
        request: impl Into<Arc<CallRequest>>,
        listeners: Vec<Arc<dyn CallListener>>,
    ) -> Result<CallHandle> {
        self.spawn(
            descriptor.into(),
            config.into(),
            request.into(),
            listeners.into(),
        )
    }

    /// Run a call in the background and wait for its outcome.
    ///
    /// No listeners are notified.
    pub async fn call_blocking(
        &self,
        descriptor: impl Into<Arc<Descriptor>>,
        config: impl Into<Arc<CallConfig>>,
        request: impl Into<Arc<CallRequest>>,
    ) -> Result<CallResult> {
        let handle = self.spawn(
            descriptor.into(),
            config.into(),
            request.into(),
            Arc::from(Vec::new()),
        )?;
        let event = handle.wait().await?;
        Arc::unwrap_or_clone(event)
            .into_outcome()
            .map_err(DispatchError::from)
    }

    fn spawn(
        &self,
        descriptor: Arc<Descriptor>,
        config: Arc<CallConfig>,
        request: Arc<CallRequest>,
        listeners: ListenerSnapshot,
    ) -> Result<CallHandle> {
        let runtime = match &self.runtime {
            Some(handle) => handle.clone(),
            None => Handle::try_current().map_err(|e| DispatchError::NoRuntime(e.to_string()))?,
        };

        let id = Uuid::new_v4();
        let (progress, receiver) = watch::channel(Progress {
            state: CallState::Pending,
            event: None,
            delivered: false,
        });
        let listener_failures = Arc::new(AtomicUsize::new(0));

        let engine = Arc::clone(&self.engine);
        let source = Arc::clone(&self.source);
        let failures = Arc::clone(&listener_failures);

        debug!(call_id = %id, descriptor = %descriptor, listeners = listeners.len(), "Spawning call");

        let task = async move {
            progress.send_modify(|p| p.state = CallState::Running);

            let started = Instant::now();
            let outcome = engine
                .call(&descriptor, config, Arc::clone(&request))
                .await;
            let event = Arc::new(CallEvent::from_outcome(
                id,
                source,
                request,
                started.elapsed(),
                outcome,
            ));

            let state = if event.is_success() {
                CallState::Succeeded
            } else {
                CallState::Failed
            };
            progress.send_modify(|p| {
                p.state = state;
                p.event = Some(Arc::clone(&event));
            });

            notify(&listeners, &event, &failures);
            progress.send_modify(|p| p.delivered = true);
        };

        runtime.spawn(task);

        Ok(CallHandle {
            id,
            progress: receiver,
            listener_failures,
        })
    }
}

/// Deliver `event` to each listener in order. A failing listener does not
/// stop the ones after it.
fn notify(listeners: &[Arc<dyn CallListener>], event: &CallEvent, failures: &AtomicUsize) {
    for (index, listener) in listeners.iter().enumerate() {
        match std::panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                failures.fetch_add(1, Ordering::AcqRel);
                error!(
                    listener = index,
                    event = event.event_name(),
                    call_id = %event.metadata().call_id,
                    error = %e,
                    "Listener failed"
                );
            }
            Err(_) => {
                failures.fetch_add(1, Ordering::AcqRel);
                error!(
                    listener = index,
                    event = event.event_name(),
                    call_id = %event.metadata().call_id,
                    "Listener panicked"
                );
            }
        }
    }
}
