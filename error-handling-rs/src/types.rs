//! # Error Taxonomy
//!
//! Crates keep their own `thiserror` enums; this module gives them a common
//! classification so callers can decide on recovery without matching on
//! every concrete variant.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How an error should be handled by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// A configured bound was reached (pending approvals, running investigations).
    Capacity,
    /// Unknown approval, finding or session identifier.
    NotFound,
    /// Operation not valid in the record's current state.
    State,
    /// The record outlived its deadline.
    Expired,
    /// A deadline elapsed while waiting on an external collaborator.
    Timeout,
    /// Fix verification was inconclusive.
    VerificationUnknown,
    /// Fix verification errored or reported the issue still present.
    VerificationFailed,
    /// A command matched the vetoed pattern set.
    Blocked,
    /// The owning component is shutting down.
    Shutdown,
    /// Disk read or write failed.
    Persistence,
    /// Caller-supplied input was rejected.
    Validation,
    /// An injected collaborator reported a failure.
    External,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Capacity => "capacity",
            ErrorKind::NotFound => "not_found",
            ErrorKind::State => "state",
            ErrorKind::Expired => "expired",
            ErrorKind::Timeout => "timeout",
            ErrorKind::VerificationUnknown => "verification_unknown",
            ErrorKind::VerificationFailed => "verification_failed",
            ErrorKind::Blocked => "blocked",
            ErrorKind::Shutdown => "shutdown",
            ErrorKind::Persistence => "persistence",
            ErrorKind::Validation => "validation",
            ErrorKind::External => "external",
        }
    }

    /// Whether retrying the same call later may succeed without intervention.
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::Capacity | ErrorKind::Timeout | ErrorKind::Persistence)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Maps a concrete error onto the shared taxonomy.
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}
