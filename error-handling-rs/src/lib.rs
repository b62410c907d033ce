//! # Error Handling Framework
//!
//! Shared error vocabulary and runtime plumbing for the remediation core:
//!
//! - `ErrorKind`, the recovery-oriented taxonomy every crate error maps onto
//! - structured logging initialisation on top of `tracing-subscriber`
//! - a cloneable shutdown signal that long-running tasks listen on

pub mod logging;
pub mod shutdown;
pub mod types;

pub use logging::{init_logging, LoggingConfig};
pub use shutdown::{ShutdownListener, ShutdownSignal};
pub use types::{Classify, ErrorKind};
