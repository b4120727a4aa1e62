//! # Switchyard Core
//!
//! Resilient remote-call dispatch: describe where a call may go, then let the
//! failover engine try each candidate in turn until one answers.
//!
//! ## Features
//!
//! - **Endpoint Descriptors**: single targets or ordered/random groups, nested freely
//! - **Failover Engine**: first success wins, every failure is recorded in order
//! - **Failure Taxonomy**: each failure says whether the remote side may have acted
//! - **Async Calls**: background calls with listener notification and joinable handles
//! - **Settings**: TOML/JSON/environment configuration of schemes, timeouts and endpoints
//!
//! The engine performs no I/O itself. It drives a [`Transport`], which
//! performs exactly one exchange against one target.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use switchyard_core::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<()> {
//! let transport = FnTransport::new(|target: &Target, _: &AttemptConfig, _: &CallRequest| {
//!     let healthy = target.url().host_str() == Some("backup.example");
//!     async move {
//!         if healthy {
//!             Ok(RawResponse::new(200, "pong"))
//!         } else {
//!             Err(TransportError::connection_refused("connection refused"))
//!         }
//!     }
//! });
//!
//! let protocols = ProtocolSet::default();
//! let descriptor: Descriptor = Group::ordered(vec![
//!     Target::parse("http://primary.example", &protocols)?.into(),
//!     Target::parse("http://backup.example", &protocols)?.into(),
//! ])?
//! .into();
//!
//! let engine = FailoverEngine::new(transport);
//! let result = engine
//!     .call(&descriptor, Arc::new(CallConfig::default()), Arc::new(CallRequest::empty()))
//!     .await?;
//!
//! assert_eq!(result.attempts, 2);
//! assert_eq!(result.prior_failures.unwrap().kind(), FailureKind::ConnectionRefused);
//! # Ok(())
//! # }
//! ```

mod async_call;
mod config;
mod descriptor;
mod engine;
mod error;
mod event;
mod listener;
mod settings;
mod transport;

pub use async_call::{AsyncCaller, CallHandle, CallState};
pub use config::{AttemptConfig, CallConfig, CallConfigBuilder, CallMethod};
pub use descriptor::{Descriptor, DescriptorSpec, Group, ProtocolSet, Selection, Target, TargetBuilder};
pub use engine::{CallResult, FailoverEngine};
pub use error::{CallError, DispatchError, FailureKind, Iter as CallErrorIter, Result};
pub use event::{CallEvent, CallFailedEvent, CallSucceededEvent, EventMetadata};
pub use listener::{
    CallListener, ChannelListener, ListenerError, ListenerId, ListenerSet, ListenerSnapshot,
};
pub use settings::{DispatchSettings, ENV_PREFIX};
pub use transport::{CallRequest, FnTransport, RawResponse, Transport, TransportError};

/// Prelude for common imports.
///
/// ```
/// use switchyard_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::async_call::{AsyncCaller, CallHandle, CallState};
    pub use crate::config::{CallConfig, CallMethod};
    pub use crate::descriptor::{Descriptor, Group, ProtocolSet, Selection, Target};
    pub use crate::engine::{CallResult, FailoverEngine};
    pub use crate::error::{CallError, DispatchError, FailureKind, Result};
    pub use crate::event::CallEvent;
    pub use crate::listener::{CallListener, ListenerError};
    pub use crate::transport::{CallRequest, RawResponse, Transport, TransportError};
}
