//! # Command Safety
//!
//! Stateless predicates over shell command strings and the guardrail policy
//! built on them.
//!
//! - [`classifier`]: blocked (vetoed) and read-only detection, command classes
//! - [`sensitive`]: credential and secret path detection
//! - [`redaction`]: scrubbing secrets out of tool output
//! - [`guardrails`]: risk grading, command validation and the approval gate

pub mod classifier;
pub mod guardrails;
pub mod redaction;
pub mod sensitive;

pub use classifier::{classify_command, is_blocked_command, is_read_only_command, CommandClass};
pub use guardrails::{GuardrailViolation, Guardrails, MAX_VALIDATED_COMMAND_LENGTH};
pub use redaction::redact_sensitive_text;
pub use sensitive::{command_touches_sensitive_path, is_sensitive_path};

/// Lowercases and collapses runs of whitespace so pattern checks do not
/// depend on spacing or case.
pub(crate) fn normalize_command(command: &str) -> String {
    command
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
