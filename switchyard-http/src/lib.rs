//! # Switchyard HTTP
//!
//! A [`Transport`](switchyard_core::Transport) that performs each attempt as an
//! HTTP exchange via `reqwest`.
//!
//! ## Failure Mapping
//!
//! | reqwest error           | Failure kind        | Possibly processed |
//! |-------------------------|---------------------|--------------------|
//! | connection refused      | `ConnectionRefused` | no                 |
//! | timeout while connecting| `SocketTimeOut`     | no                 |
//! | timeout after connecting| `SocketTimeOut`     | yes                |
//! | request build failure   | `Other` (untimed)   | no                 |
//! | anything else           | `Other`             | no                 |
//!
//! Responses outside the configured accept range become `StatusCode` failures
//! in the engine.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use switchyard_core::prelude::*;
//! use switchyard_http::HttpTransport;
//!
//! # async fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let protocols = ProtocolSet::default();
//! let descriptor: Descriptor = Group::random(vec![
//!     Target::parse("http://billing-a.internal:8080", &protocols)?.into(),
//!     Target::parse("http://billing-b.internal:8080", &protocols)?.into(),
//! ])?
//! .into();
//!
//! let engine = FailoverEngine::new(HttpTransport::default_transport()?);
//! let config = CallConfig::builder()
//!     .header("Accept", "application/json")
//!     .build()?;
//! let result = engine
//!     .call(
//!         &descriptor,
//!         Arc::new(config),
//!         Arc::new(CallRequest::empty().with_path("/invoices")),
//!     )
//!     .await?;
//!
//! println!("{} answered with {}", result.target, result.response.status);
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod transport;

pub use config::{HttpTransportConfig, HttpTransportConfigBuilder};
pub use error::{HttpTransportError, Result};
pub use transport::{HttpTransport, classify, http_method};
