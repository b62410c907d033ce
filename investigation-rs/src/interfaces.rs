// investigation-rs/src/interfaces.rs
// Narrow capability traits the orchestrator is wired with. Everything that
// touches the outside world (planner, remote execution, verification,
// findings persistence, approval queue) comes in through here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_types::{AutonomyLevel, Finding, InvestigationOutcome, RiskLevel};

use approval_store::{ApprovalError, ApprovalStore, NewApprovalRequest};
use error_handling::{Classify, ErrorKind};

/// Licence feature gating unattended fix execution.
pub const FEATURE_AI_AUTOFIX: &str = "ai_autofix";

/// Approval type recorded for fixes queued by an investigation.
pub const APPROVAL_TYPE_INVESTIGATION_FIX: &str = "investigation_fix";

/// Planner errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlannerError {
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("investigation cancelled by shutdown")]
    Cancelled,

    #[error("stream error: {0}")]
    Stream(String),

    #[error("{0}")]
    Other(String),
}

impl PlannerError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, PlannerError::DeadlineExceeded)
            || self.to_string().contains("context deadline exceeded")
    }
}

impl Classify for PlannerError {
    fn kind(&self) -> ErrorKind {
        match self {
            _ if self.is_timeout() => ErrorKind::Timeout,
            PlannerError::Cancelled => ErrorKind::Shutdown,
            _ => ErrorKind::External,
        }
    }
}

/// One streaming call into the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub prompt: String,
    pub session_id: String,
    /// Agentic turn limit for this call.
    pub max_turns: u32,
    /// Per-call autonomy override; `None` uses the planner default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autonomous_mode: Option<bool>,
}

/// Events delivered by [`Planner::execute_stream`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PlannerEvent {
    Content { text: String },
    ToolStart { id: String, name: String },
    ToolEnd { id: String, name: String },
    Error { message: String },
    Done,
}

/// A stored planner conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerMessage {
    pub id: String,
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// LLM planner driving the investigation conversation.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn create_session(&self) -> Result<String, PlannerError>;

    /// Runs one request, delivering events to `on_event` on the calling
    /// task until the stream ends. Dropping the future cancels the call.
    async fn execute_stream(
        &self,
        request: ExecuteRequest,
        on_event: &mut (dyn FnMut(PlannerEvent) + Send),
    ) -> Result<(), PlannerError>;

    async fn get_messages(&self, session_id: &str) -> Result<Vec<PlannerMessage>, PlannerError>;

    async fn delete_session(&self, session_id: &str) -> Result<(), PlannerError>;

    /// Tools the planner would offer for `prompt`. Best-effort.
    async fn list_available_tools(&self, prompt: &str) -> Vec<String>;
}

/// Result of one executed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub output: String,
    pub exit_code: i32,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct ExecutorError(pub String);

/// Runs fix commands on a target host.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute_command(
        &self,
        command: &str,
        target_host: &str,
    ) -> Result<CommandOutput, ExecutorError>;
}

/// Verification errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum VerifyError {
    /// The check could not tell whether the issue is gone.
    #[error("verification inconclusive: {0}")]
    Unknown(String),

    #[error("{0}")]
    Failed(String),
}

impl Classify for VerifyError {
    fn kind(&self) -> ErrorKind {
        match self {
            VerifyError::Unknown(_) => ErrorKind::VerificationUnknown,
            VerifyError::Failed(_) => ErrorKind::VerificationFailed,
        }
    }
}

/// Re-checks a finding after its fix ran.
#[async_trait]
pub trait FixVerifier: Send + Sync {
    /// `Ok(true)` when the issue is gone.
    async fn verify_fix_resolved(&self, finding: &Finding) -> Result<bool, VerifyError>;
}

/// Where findings live. The orchestrator only mirrors investigation fields.
pub trait FindingsStore: Send + Sync {
    fn get(&self, id: &str) -> Option<Finding>;
    fn update(&self, finding: &Finding) -> bool;
}

/// A fix handed to the approval queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixApproval {
    pub id: String,
    #[serde(rename = "type")]
    pub approval_type: String,
    pub finding_id: String,
    pub session_id: String,
    pub description: String,
    /// Newline-joined fix commands.
    pub command: String,
    pub target_host: String,
    pub risk_level: RiskLevel,
    pub created_at: DateTime<Utc>,
}

/// Queue accepting fixes that need a human decision.
pub trait ApprovalQueue: Send + Sync {
    fn queue_fix(&self, approval: &FixApproval) -> Result<(), ApprovalError>;
}

impl ApprovalQueue for ApprovalStore {
    fn queue_fix(&self, approval: &FixApproval) -> Result<(), ApprovalError> {
        let request = NewApprovalRequest::new(approval.command.clone())
            .with_id(approval.id.clone())
            .with_execution(approval.session_id.clone())
            .with_tool(approval.approval_type.clone())
            .with_target("host", approval.target_host.clone(), approval.target_host.clone())
            .with_context(format!("{} (finding {})", approval.description, approval.finding_id))
            .with_risk(approval.risk_level);
        self.create(request).map(|_| ())
    }
}

/// Discovered infrastructure layout (where services run, how to reach them).
pub trait InfrastructureContextProvider: Send + Sync {
    fn infrastructure_context(&self) -> String;
}

/// Live autonomy setting, re-read before a fix is acted on.
pub trait AutonomyLevelProvider: Send + Sync {
    fn current_autonomy_level(&self) -> AutonomyLevel;
    fn is_full_mode_unlocked(&self) -> bool;
}

pub trait LicenseChecker: Send + Sync {
    fn has_feature(&self, feature: &str) -> bool;
}

/// Receives outcome events for an external metrics pipeline.
pub trait MetricsCallback: Send + Sync {
    fn record_investigation_outcome(&self, outcome: InvestigationOutcome);
    /// `result` is one of `verified`, `failed`, `unknown`, `error`.
    fn record_fix_verification(&self, result: &str);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approval_store::{ApprovalStatus, ApprovalStoreConfig};

    #[test]
    fn planner_events_use_type_and_data() {
        let event: PlannerEvent =
            serde_json::from_str(r#"{"type":"tool_end","data":{"id":"t1","name":"get_logs"}}"#).unwrap();
        assert_eq!(
            event,
            PlannerEvent::ToolEnd {
                id: "t1".into(),
                name: "get_logs".into()
            }
        );
        let done: PlannerEvent = serde_json::from_str(r#"{"type":"done"}"#).unwrap();
        assert_eq!(done, PlannerEvent::Done);
    }

    #[test]
    fn timeout_detection_matches_message() {
        assert!(PlannerError::DeadlineExceeded.is_timeout());
        assert!(PlannerError::Other("rpc: context deadline exceeded".into()).is_timeout());
        assert!(!PlannerError::Stream("rate limited".into()).is_timeout());
        assert_eq!(PlannerError::DeadlineExceeded.kind(), ErrorKind::Timeout);
        assert_eq!(PlannerError::Cancelled.kind(), ErrorKind::Shutdown);
    }

    #[test]
    fn approval_store_adapter_maps_fix_fields() {
        let store = ApprovalStore::new(ApprovalStoreConfig::new("/unused").with_persistence_disabled()).unwrap();
        let approval = FixApproval {
            id: "approval-1".into(),
            approval_type: APPROVAL_TYPE_INVESTIGATION_FIX.into(),
            finding_id: "finding-1".into(),
            session_id: "chat-1".into(),
            description: "Proposed fix from investigation".into(),
            command: "systemctl restart app".into(),
            target_host: "web-01".into(),
            risk_level: RiskLevel::High,
            created_at: Utc::now(),
        };
        store.queue_fix(&approval).unwrap();

        let queued = store.get("approval-1").unwrap();
        assert_eq!(queued.status, ApprovalStatus::Pending);
        assert_eq!(queued.execution_id, "chat-1");
        assert_eq!(queued.tool_id, "investigation_fix");
        assert_eq!(queued.target_id, "web-01");
        assert_eq!(queued.risk_level, RiskLevel::High);
        assert_eq!(queued.command, "systemctl restart app");
    }
}
