//! The transport seam: performing one request against one target.
//!
//! The core never does I/O itself. Everything network-facing goes through a
//! [`Transport`], which performs exactly one exchange and reports either a raw
//! response or a classified [`TransportError`].

use async_trait::async_trait;
use bytes::Bytes;
use http::HeaderMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;

use crate::config::AttemptConfig;
use crate::descriptor::Target;
use crate::error::FailureKind;

/// An already-encoded request payload.
///
/// Shared by reference between attempts, events, and failure records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallRequest {
    body: Bytes,
    content_type: Option<String>,
    path: Option<String>,
}

impl CallRequest {
    /// A request carrying `body`.
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    /// A request without a body.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Set the content type of the body.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Set a path resolved against each target's address.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }
}

/// The raw response handed back to the payload decoder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

/// A failed exchange, classified by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    kind: FailureKind,
    message: String,
    possibly_processed: Option<bool>,
    untimed: bool,
}

impl TransportError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            possibly_processed: None,
            untimed: false,
        }
    }

    pub fn connection_refused(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ConnectionRefused, message)
    }

    pub fn timed_out(message: impl Into<String>) -> Self {
        Self::new(FailureKind::SocketTimeOut, message)
    }

    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::new(FailureKind::StatusCode(code), message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Other, message)
    }

    /// The transport knows the request never reached the remote side.
    pub fn not_processed(mut self) -> Self {
        self.possibly_processed = Some(false);
        self
    }

    /// The transport knows the remote side may have acted on the request.
    pub fn maybe_processed(mut self) -> Self {
        self.possibly_processed = Some(true);
        self
    }

    /// The attempt failed before its duration could be measured.
    pub fn untimed(mut self) -> Self {
        self.untimed = true;
        self
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The transport's override, falling back to the kind's default.
    pub fn possibly_processed(&self) -> bool {
        self.possibly_processed
            .unwrap_or_else(|| self.kind.default_possibly_processed())
    }

    pub fn is_untimed(&self) -> bool {
        self.untimed
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for TransportError {}

/// Performs one request against one target.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Run a single exchange, honoring the timeouts in `config`.
    async fn perform(
        &self,
        target: &Target,
        config: &AttemptConfig,
        request: &CallRequest,
    ) -> Result<RawResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn perform(
        &self,
        target: &Target,
        config: &AttemptConfig,
        request: &CallRequest,
    ) -> Result<RawResponse, TransportError> {
        (**self).perform(target, config, request).await
    }
}

/// A [`Transport`] backed by a closure.
///
/// ```rust
/// use switchyard_core::{FnTransport, RawResponse, TransportError};
///
/// let transport = FnTransport::new(|target, _config, _request| {
///     let host = target.url().host_str().unwrap_or_default().to_string();
///     async move {
///         if host == "down.example" {
///             Err(TransportError::connection_refused("connection refused"))
///         } else {
///             Ok(RawResponse::new(200, "ok"))
///         }
///     }
/// });
/// ```
pub struct FnTransport<F, Fut> {
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnTransport<F, Fut>
where
    F: Fn(&Target, &AttemptConfig, &CallRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<RawResponse, TransportError>> + Send,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _fut: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut> Transport for FnTransport<F, Fut>
where
    F: Fn(&Target, &AttemptConfig, &CallRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<RawResponse, TransportError>> + Send,
{
    async fn perform(
        &self,
        target: &Target,
        config: &AttemptConfig,
        request: &CallRequest,
    ) -> Result<RawResponse, TransportError> {
        (self.f)(target, config, request).await
    }
}
