// approval-store-rs/src/model.rs
// Records held by the approval store. Serialized field names are camelCase,
// matching the persisted ai_approvals.json / ai_executions.json layout.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shared_types::RiskLevel;

/// Lifecycle state of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
    Expired,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Denied => "denied",
            ApprovalStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A command awaiting a human decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub id: String,
    /// Groups approvals raised by the same planner execution.
    #[serde(default)]
    pub execution_id: String,
    #[serde(default)]
    pub tool_id: String,
    pub command: String,
    /// host, container, vm, node, ...
    #[serde(default)]
    pub target_type: String,
    #[serde(default)]
    pub target_id: String,
    #[serde(default)]
    pub target_name: String,
    /// Why the planner wants to run the command.
    #[serde(default)]
    pub context: String,
    pub risk_level: RiskLevel,
    pub status: ApprovalStatus,
    pub requested_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub decided_by: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub deny_reason: String,
    /// SHA-256 over `command|targetType|targetId`; binds the approval to
    /// exactly one command on one target.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command_hash: String,
    /// Set once the approval has been spent.
    #[serde(default, skip_serializing_if = "is_false")]
    pub consumed: bool,
}

impl ApprovalRequest {
    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }

    /// Pending but already past its deadline.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && now > self.expires_at
    }
}

/// Input to [`crate::ApprovalStore::create`].
///
/// Unset optional fields are filled in by the store: a fresh ID, an expiry of
/// `now + default_timeout`, an assessed risk level and the command hash.
#[derive(Debug, Clone, Default)]
pub struct NewApprovalRequest {
    pub id: Option<String>,
    pub execution_id: String,
    pub tool_id: String,
    pub command: String,
    pub target_type: String,
    pub target_id: String,
    pub target_name: String,
    pub context: String,
    pub risk_level: Option<RiskLevel>,
    pub expires_at: Option<DateTime<Utc>>,
    pub command_hash: Option<String>,
}

impl NewApprovalRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_execution(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = execution_id.into();
        self
    }

    pub fn with_tool(mut self, tool_id: impl Into<String>) -> Self {
        self.tool_id = tool_id.into();
        self
    }

    pub fn with_target(
        mut self,
        target_type: impl Into<String>,
        target_id: impl Into<String>,
        target_name: impl Into<String>,
    ) -> Self {
        self.target_type = target_type.into();
        self.target_id = target_id.into();
        self.target_name = target_name.into();
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk_level = Some(risk);
        self
    }

    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

/// Planner conversation state parked while a tool call waits for approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionState {
    pub id: String,
    #[serde(default)]
    pub original_request: Map<String, Value>,
    #[serde(default)]
    pub messages: Vec<Map<String, Value>>,
    #[serde(default)]
    pub pending_tool_call: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Input to [`crate::ApprovalStore::store_execution`].
#[derive(Debug, Clone, Default)]
pub struct NewExecutionState {
    pub id: String,
    pub original_request: Map<String, Value>,
    pub messages: Vec<Map<String, Value>>,
    pub pending_tool_call: Map<String, Value>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Record counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStats {
    pub pending: usize,
    pub approved: usize,
    pub denied: usize,
    pub expired: usize,
    pub executions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample() -> ApprovalRequest {
        let now = Utc::now();
        ApprovalRequest {
            id: "a-1".into(),
            execution_id: "exec-1".into(),
            tool_id: "run_command".into(),
            command: "systemctl restart nginx".into(),
            target_type: "host".into(),
            target_id: "web-01".into(),
            target_name: "web-01".into(),
            context: "nginx is down".into(),
            risk_level: RiskLevel::Medium,
            status: ApprovalStatus::Pending,
            requested_at: now,
            expires_at: now + Duration::minutes(5),
            decided_at: None,
            decided_by: String::new(),
            deny_reason: String::new(),
            command_hash: String::new(),
            consumed: false,
        }
    }

    #[test]
    fn serializes_camel_case_and_omits_empty_decision_fields() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["executionId"], "exec-1");
        assert_eq!(json["targetType"], "host");
        assert_eq!(json["riskLevel"], "medium");
        assert_eq!(json["status"], "pending");
        assert!(json.get("decidedAt").is_none());
        assert!(json.get("denyReason").is_none());
        assert!(json.get("consumed").is_none());
    }

    #[test]
    fn pending_past_deadline_is_expired() {
        let req = sample();
        assert!(!req.is_expired_at(Utc::now()));
        assert!(req.is_expired_at(req.expires_at + Duration::seconds(1)));

        let mut approved = sample();
        approved.status = ApprovalStatus::Approved;
        assert!(!approved.is_expired_at(approved.expires_at + Duration::seconds(1)));
    }
}
