// shared-types-rs/src/finding.rs
// Findings are produced by the planner and stored elsewhere; the remediation
// core only reads them and mirrors investigation progress back onto them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity the planner assigned to a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingSeverity {
    Info,
    Watch,
    Warning,
    Critical,
    #[serde(other)]
    Unknown,
}

impl FindingSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingSeverity::Info => "info",
            FindingSeverity::Watch => "watch",
            FindingSeverity::Warning => "warning",
            FindingSeverity::Critical => "critical",
            FindingSeverity::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FindingSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for FindingSeverity {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => FindingSeverity::Info,
            "watch" => FindingSeverity::Watch,
            "warning" => FindingSeverity::Warning,
            "critical" => FindingSeverity::Critical,
            _ => FindingSeverity::Unknown,
        }
    }
}

/// Lifecycle state of an investigation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationStatus {
    Pending,
    Running,
    Completed,
    Failed,
    NeedsAttention,
}

impl InvestigationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestigationStatus::Pending => "pending",
            InvestigationStatus::Running => "running",
            InvestigationStatus::Completed => "completed",
            InvestigationStatus::Failed => "failed",
            InvestigationStatus::NeedsAttention => "needs_attention",
        }
    }

    /// Completed, failed and needs-attention sessions are finished; pending
    /// and running ones may still move.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InvestigationStatus::Completed | InvestigationStatus::Failed | InvestigationStatus::NeedsAttention
        )
    }
}

impl fmt::Display for InvestigationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal classification of an investigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationOutcome {
    Resolved,
    FixQueued,
    FixExecuted,
    FixFailed,
    FixVerified,
    FixVerificationFailed,
    FixVerificationUnknown,
    NeedsAttention,
    CannotFix,
    TimedOut,
}

impl InvestigationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestigationOutcome::Resolved => "resolved",
            InvestigationOutcome::FixQueued => "fix_queued",
            InvestigationOutcome::FixExecuted => "fix_executed",
            InvestigationOutcome::FixFailed => "fix_failed",
            InvestigationOutcome::FixVerified => "fix_verified",
            InvestigationOutcome::FixVerificationFailed => "fix_verification_failed",
            InvestigationOutcome::FixVerificationUnknown => "fix_verification_unknown",
            InvestigationOutcome::NeedsAttention => "needs_attention",
            InvestigationOutcome::CannotFix => "cannot_fix",
            InvestigationOutcome::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for InvestigationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An issue the planner identified about one resource.
///
/// The `investigation_*` and `last_investigated_at` fields are mirrors the
/// orchestrator keeps in sync; the authoritative session lives in the
/// investigation store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub severity: FindingSeverity,
    pub category: String,
    pub resource_id: String,
    pub resource_name: String,
    pub resource_type: String,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub evidence: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub recommendation: String,
    pub detected_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investigation_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investigation_status: Option<InvestigationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investigation_outcome: Option<InvestigationOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_investigated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub investigation_attempts: u32,
}

impl Finding {
    pub fn new(
        id: impl Into<String>,
        severity: FindingSeverity,
        resource_type: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            severity,
            category: String::new(),
            resource_id: String::new(),
            resource_name: String::new(),
            resource_type: resource_type.into(),
            title: title.into(),
            description: String::new(),
            evidence: String::new(),
            recommendation: String::new(),
            detected_at: Utc::now(),
            investigation_session_id: None,
            investigation_status: None,
            investigation_outcome: None,
            last_investigated_at: None,
            investigation_attempts: 0,
        }
    }

    pub fn is_investigation_running(&self) -> bool {
        self.investigation_status == Some(InvestigationStatus::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serializes_as_snake_case() {
        let json = serde_json::to_string(&InvestigationOutcome::FixVerificationUnknown).unwrap();
        assert_eq!(json, "\"fix_verification_unknown\"");
        assert_eq!(InvestigationOutcome::TimedOut.to_string(), "timed_out");
    }

    #[test]
    fn unknown_severity_deserializes_to_unknown() {
        let severity: FindingSeverity = serde_json::from_str("\"emergency\"").unwrap();
        assert_eq!(severity, FindingSeverity::Unknown);
        assert_eq!(FindingSeverity::from("Critical"), FindingSeverity::Critical);
    }

    #[test]
    fn mirror_fields_default_when_absent() {
        let json = r#"{
            "id": "f-1",
            "severity": "warning",
            "category": "performance",
            "resource_id": "vm-100",
            "resource_name": "web",
            "resource_type": "vm",
            "title": "High CPU",
            "description": "CPU pegged",
            "detected_at": "2024-01-01T00:00:00Z"
        }"#;
        let finding: Finding = serde_json::from_str(json).unwrap();
        assert_eq!(finding.investigation_attempts, 0);
        assert!(finding.investigation_status.is_none());
        assert!(!finding.is_investigation_running());
    }
}
