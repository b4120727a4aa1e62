// Switchyard - resilient remote-call dispatch for Rust
//
// Describe where a call may go as a tree of targets and groups, and let the
// failover engine walk it until one target answers.

// Re-export core functionality
pub use switchyard_core::*;

// Re-export optional crates
#[cfg(feature = "http")]
pub use switchyard_http;

#[cfg(feature = "log")]
pub use switchyard_log;

// Prelude for common imports
pub mod prelude {
    pub use switchyard_core::prelude::*;

    pub use switchyard_core::{ChannelListener, DispatchSettings};

    #[cfg(feature = "http")]
    pub use switchyard_http::{HttpTransport, HttpTransportConfig};
}
