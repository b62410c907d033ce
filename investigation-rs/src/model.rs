// investigation-rs/src/model.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_types::{InvestigationOutcome, InvestigationStatus, RiskLevel};

/// Most commands a single proposed fix may carry.
pub const MAX_COMMANDS_PER_FIX: usize = 10;

/// Longest accepted proposed command, in bytes.
pub const MAX_COMMAND_LENGTH: usize = 2000;

/// A remediation proposed by an investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub id: String,
    pub description: String,
    /// Executed in order; at most [`MAX_COMMANDS_PER_FIX`].
    pub commands: Vec<String>,
    /// Host the commands run on; `"local"` when the planner named none.
    pub target_host: String,
    pub risk_level: RiskLevel,
    pub destructive: bool,
    pub rationale: String,
}

impl Fix {
    pub fn new(commands: Vec<String>, target_host: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self {
            id: shared_types::new_id(),
            description: "Proposed fix from investigation".to_string(),
            commands,
            target_host: target_host.into(),
            risk_level: RiskLevel::Medium,
            destructive: false,
            rationale: rationale.into(),
        }
    }
}

/// One bounded planner conversation about one finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationSession {
    pub id: String,
    pub finding_id: String,
    /// Planner session the conversation runs in.
    pub session_id: String,
    pub status: InvestigationStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub turn_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<InvestigationOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_fix: Option<Fix>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default)]
    pub tools_available: Vec<String>,
    #[serde(default)]
    pub tools_used: Vec<String>,
    #[serde(default)]
    pub evidence_ids: Vec<String>,
}

impl InvestigationSession {
    pub fn new(finding_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            id: shared_types::new_id(),
            finding_id: finding_id.into(),
            session_id: session_id.into(),
            status: InvestigationStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            turn_count: 0,
            outcome: None,
            proposed_fix: None,
            approval_id: None,
            summary: String::new(),
            error: String::new(),
            tools_available: Vec::new(),
            tools_used: Vec::new(),
            evidence_ids: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            InvestigationStatus::Pending | InvestigationStatus::Running
        )
    }
}
