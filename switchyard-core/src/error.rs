//! Failure taxonomy, the per-call failure chain, and crate errors.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::descriptor::Target;
use crate::transport::CallRequest;

/// Result type for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Classification of a single failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The scheme is not in the allow-list.
    UnsupportedProtocol,
    /// No connection could be established; the request was never sent.
    ConnectionRefused,
    /// Connected, but no response arrived within the read or total timeout.
    SocketTimeOut,
    /// A response arrived with a status outside the acceptable range.
    StatusCode(u16),
    /// Any transport failure not otherwise classified.
    Other,
}

impl FailureKind {
    /// Whether the remote side may already have acted on the request,
    /// absent better knowledge from the transport.
    pub fn default_possibly_processed(&self) -> bool {
        match self {
            Self::UnsupportedProtocol => false,
            Self::ConnectionRefused => false,
            Self::SocketTimeOut => true,
            Self::StatusCode(code) => (200..=299).contains(code),
            Self::Other => false,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedProtocol => write!(f, "unsupported protocol"),
            Self::ConnectionRefused => write!(f, "connection refused"),
            Self::SocketTimeOut => write!(f, "socket timed out"),
            Self::StatusCode(code) => write!(f, "unexpected status {}", code),
            Self::Other => write!(f, "transport error"),
        }
    }
}

/// One failed attempt, linked to the attempts that followed it.
///
/// A chain is built by the failover engine in attempt order: the head is the
/// first target that was tried, and `next` walks through every later failure.
#[derive(Debug, Clone)]
pub struct CallError {
    target: Target,
    request: Arc<CallRequest>,
    duration: Option<Duration>,
    kind: FailureKind,
    possibly_processed: bool,
    message: String,
    next: Option<Box<CallError>>,
}

impl CallError {
    /// Create a single, unlinked failure record.
    pub fn new(
        target: Target,
        request: Arc<CallRequest>,
        duration: Option<Duration>,
        kind: FailureKind,
        possibly_processed: bool,
        message: impl Into<String>,
    ) -> Self {
        Self {
            target,
            request,
            duration,
            kind,
            possibly_processed,
            message: message.into(),
            next: None,
        }
    }

    /// Build a chain from records in attempt order.
    ///
    /// Returns `None` for an empty list.
    pub fn chain(records: Vec<CallError>) -> Option<CallError> {
        records.into_iter().rev().fold(None, |next, mut record| {
            record.next = next.map(Box::new);
            Some(record)
        })
    }

    /// The target attempted. Never a group.
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// The original request, shared with every other record of the call.
    pub fn request(&self) -> &Arc<CallRequest> {
        &self.request
    }

    /// Elapsed time of the attempt, `None` if it failed before timing completed.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Elapsed milliseconds, or `-1` when the duration is unknown.
    pub fn duration_ms(&self) -> i64 {
        self.duration
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(-1)
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// Whether the remote side may have executed the request's side effects.
    pub fn possibly_processed(&self) -> bool {
        self.possibly_processed
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The failure of the next attempted target, if any.
    pub fn next(&self) -> Option<&CallError> {
        self.next.as_deref()
    }

    /// Iterate over this record and every following one, in attempt order.
    pub fn iter(&self) -> Iter<'_> {
        Iter { current: Some(self) }
    }

    /// Number of records in the chain starting here.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// A chain always holds at least its head.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The final attempt's failure.
    pub fn last(&self) -> &CallError {
        self.iter().last().unwrap_or(self)
    }

    /// Targets in attempt order.
    pub fn targets(&self) -> Vec<&Target> {
        self.iter().map(CallError::target).collect()
    }

    /// True if any attempt in the chain may have been processed remotely.
    pub fn any_possibly_processed(&self) -> bool {
        self.iter().any(CallError::possibly_processed)
    }

    /// One-line description of this record alone.
    pub fn summary(&self) -> String {
        let elapsed = match self.duration {
            Some(d) => format!("{}ms", d.as_millis()),
            None => "unknown time".to_string(),
        };
        let mut summary = format!(
            "call to {} failed after {}: {}",
            self.target.address(),
            elapsed,
            self.kind
        );
        if !self.message.is_empty() {
            summary.push_str(" (");
            summary.push_str(&self.message);
            summary.push(')');
        }
        if self.possibly_processed {
            summary.push_str(" [possibly processed]");
        }
        summary
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())?;
        if let Some(next) = &self.next {
            write!(f, "; then: {}", next)?;
        }
        Ok(())
    }
}

impl std::error::Error for CallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.next
            .as_deref()
            .map(|next| next as &(dyn std::error::Error + 'static))
    }
}

/// Iterator over a failure chain.
pub struct Iter<'a> {
    current: Option<&'a CallError>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a CallError;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        self.current = current.next.as_deref();
        Some(current)
    }
}

impl<'a> IntoIterator for &'a CallError {
    type Item = &'a CallError;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Errors raised while describing or running calls.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The address could not be parsed.
    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress {
        /// The rejected address.
        address: String,
        /// Parser message.
        reason: String,
    },

    /// The address scheme is not in the allow-list.
    #[error("Unsupported protocol '{scheme}' in address '{address}'")]
    UnsupportedProtocol {
        /// The rejected scheme.
        scheme: String,
        /// The full address.
        address: String,
    },

    /// A group was built without members.
    #[error("Endpoint group must contain at least one member")]
    EmptyGroup,

    /// A timeout was negative.
    #[error("Invalid {name} timeout: {value}ms (must be >= 0)")]
    InvalidTimeout {
        /// Which timeout.
        name: &'static str,
        /// The rejected value.
        value: i64,
    },

    /// A header name or value is not valid HTTP.
    #[error("Invalid header '{0}'")]
    InvalidHeader(String),

    /// Settings could not be loaded.
    #[error("Settings error: {0}")]
    Settings(String),

    /// Every attempt of a call failed.
    #[error("Call failed: {0}")]
    Call(#[from] CallError),

    /// The background call ended without producing an outcome.
    #[error("Call aborted: {0}")]
    Aborted(String),

    /// No Tokio runtime was available to run a background call.
    #[error("No Tokio runtime to run call on: {0}")]
    NoRuntime(String),
}

impl From<toml::de::Error> for DispatchError {
    fn from(err: toml::de::Error) -> Self {
        DispatchError::Settings(format!("TOML parse error: {}", err))
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::Settings(format!("JSON parse error: {}", err))
    }
}

impl From<std::io::Error> for DispatchError {
    fn from(err: std::io::Error) -> Self {
        DispatchError::Settings(format!("Failed to read file: {}", err))
    }
}
