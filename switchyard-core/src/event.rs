//! Call outcome events delivered to listeners.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::engine::CallResult;
use crate::error::CallError;
use crate::transport::CallRequest;

/// Identity of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event ID
    pub id: Uuid,

    /// Id of the call that produced the event
    pub call_id: Uuid,

    /// Timestamp when event was created
    pub timestamp: DateTime<Utc>,
}

impl EventMetadata {
    /// Create metadata for an event of `call_id`.
    pub fn new(call_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            call_id,
            timestamp: Utc::now(),
        }
    }
}

/// A call finished successfully.
#[derive(Debug, Clone)]
pub struct CallSucceededEvent {
    pub metadata: EventMetadata,
    /// Name of the caller that issued the call.
    pub source: Arc<str>,
    pub request: Arc<CallRequest>,
    /// Wall-clock duration of the whole call.
    pub duration: Duration,
    pub result: CallResult,
}

/// Every attempt of a call failed.
#[derive(Debug, Clone)]
pub struct CallFailedEvent {
    pub metadata: EventMetadata,
    /// Name of the caller that issued the call.
    pub source: Arc<str>,
    pub request: Arc<CallRequest>,
    /// Wall-clock duration of the whole call.
    pub duration: Duration,
    pub error: CallError,
}

/// The terminal outcome of an asynchronous call.
///
/// Constructed once and shared read-only with every listener.
#[derive(Debug, Clone)]
pub enum CallEvent {
    Succeeded(CallSucceededEvent),
    Failed(CallFailedEvent),
}

impl CallEvent {
    pub(crate) fn from_outcome(
        call_id: Uuid,
        source: Arc<str>,
        request: Arc<CallRequest>,
        duration: Duration,
        outcome: Result<CallResult, CallError>,
    ) -> Self {
        let metadata = EventMetadata::new(call_id);
        match outcome {
            Ok(result) => CallEvent::Succeeded(CallSucceededEvent {
                metadata,
                source,
                request,
                duration,
                result,
            }),
            Err(error) => CallEvent::Failed(CallFailedEvent {
                metadata,
                source,
                request,
                duration,
                error,
            }),
        }
    }

    /// Event name, for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            CallEvent::Succeeded(_) => "call_succeeded",
            CallEvent::Failed(_) => "call_failed",
        }
    }

    pub fn metadata(&self) -> &EventMetadata {
        match self {
            CallEvent::Succeeded(e) => &e.metadata,
            CallEvent::Failed(e) => &e.metadata,
        }
    }

    pub fn source(&self) -> &str {
        match self {
            CallEvent::Succeeded(e) => &e.source,
            CallEvent::Failed(e) => &e.source,
        }
    }

    pub fn request(&self) -> &Arc<CallRequest> {
        match self {
            CallEvent::Succeeded(e) => &e.request,
            CallEvent::Failed(e) => &e.request,
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            CallEvent::Succeeded(e) => e.duration,
            CallEvent::Failed(e) => e.duration,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CallEvent::Succeeded(_))
    }

    pub fn result(&self) -> Option<&CallResult> {
        match self {
            CallEvent::Succeeded(e) => Some(&e.result),
            CallEvent::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&CallError> {
        match self {
            CallEvent::Succeeded(_) => None,
            CallEvent::Failed(e) => Some(&e.error),
        }
    }

    /// Convert into the call's outcome.
    pub fn into_outcome(self) -> Result<CallResult, CallError> {
        match self {
            CallEvent::Succeeded(e) => Ok(e.result),
            CallEvent::Failed(e) => Err(e.error),
        }
    }
}
