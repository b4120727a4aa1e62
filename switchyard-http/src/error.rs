//! HTTP transport error types.

use thiserror::Error;

/// Result type for HTTP transport setup.
pub type Result<T> = std::result::Result<T, HttpTransportError>;

/// Errors raised while setting up the transport.
///
/// Failures of individual attempts are reported as
/// [`TransportError`](switchyard_core::TransportError) instead.
#[derive(Debug, Error)]
pub enum HttpTransportError {
    /// The underlying client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),
}
