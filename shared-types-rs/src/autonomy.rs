// shared-types-rs/src/autonomy.rs
// Autonomy levels govern whether a proposed fix runs, queues, or waits.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Policy label controlling how far the remediation loop may act on its own.
///
/// Labels arrive as free-form strings from configuration and callers. Anything
/// that is not one of the four known labels maps to [`AutonomyLevel::Unknown`],
/// which the guardrails treat like `approval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutonomyLevel {
    /// Observe only; fixes are never executed.
    Monitor,
    /// Every fix waits for a human decision.
    Approval,
    /// Non-critical fixes run automatically.
    Assisted,
    /// Any non-destructive fix runs automatically.
    Full,
    #[serde(other)]
    Unknown,
}

impl AutonomyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutonomyLevel::Monitor => "monitor",
            AutonomyLevel::Approval => "approval",
            AutonomyLevel::Assisted => "assisted",
            AutonomyLevel::Full => "full",
            AutonomyLevel::Unknown => "unknown",
        }
    }

    /// Whether the planner may call write tools on its own during an investigation.
    pub fn is_autonomous(&self) -> bool {
        matches!(self, AutonomyLevel::Full)
    }
}

impl Default for AutonomyLevel {
    fn default() -> Self {
        AutonomyLevel::Approval
    }
}

impl fmt::Display for AutonomyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for AutonomyLevel {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "monitor" => AutonomyLevel::Monitor,
            "approval" => AutonomyLevel::Approval,
            "assisted" => AutonomyLevel::Assisted,
            "full" => AutonomyLevel::Full,
            _ => AutonomyLevel::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_labels_case_insensitively() {
        assert_eq!(AutonomyLevel::from("FULL"), AutonomyLevel::Full);
        assert_eq!(AutonomyLevel::from(" assisted "), AutonomyLevel::Assisted);
        assert_eq!(AutonomyLevel::from("monitor"), AutonomyLevel::Monitor);
    }

    #[test]
    fn empty_and_unrecognised_labels_are_unknown() {
        assert_eq!(AutonomyLevel::from(""), AutonomyLevel::Unknown);
        assert_eq!(AutonomyLevel::from("controlled"), AutonomyLevel::Unknown);
    }

    #[test]
    fn only_full_is_autonomous() {
        assert!(AutonomyLevel::Full.is_autonomous());
        assert!(!AutonomyLevel::Assisted.is_autonomous());
        assert!(!AutonomyLevel::Unknown.is_autonomous());
    }
}
