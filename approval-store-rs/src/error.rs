use chrono::{DateTime, Utc};
use error_handling::{Classify, ErrorKind};

use crate::model::ApprovalStatus;

/// Approval store errors.
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error("data directory is required")]
    MissingDataDir,

    #[error("maximum pending approvals ({0}) reached")]
    Capacity(usize),

    #[error("approval request not found: {0}")]
    NotFound(String),

    #[error("approval request is not pending (status: {0})")]
    NotPending(ApprovalStatus),

    #[error("approval request {id} has expired (expires_at: {expires_at})")]
    Expired {
        id: String,
        expires_at: DateTime<Utc>,
    },

    #[error("approval request is not approved (status: {0})")]
    NotApproved(ApprovalStatus),

    #[error("approval request {0} has already been consumed")]
    AlreadyConsumed(String),

    #[error("approval command mismatch - this approval is for a different command/target")]
    CommandMismatch,

    #[error("execution ID is required")]
    MissingExecutionId,
}

impl Classify for ApprovalError {
    fn kind(&self) -> ErrorKind {
        match self {
            ApprovalError::MissingDataDir
            | ApprovalError::MissingExecutionId
            | ApprovalError::CommandMismatch => ErrorKind::Validation,
            ApprovalError::Capacity(_) => ErrorKind::Capacity,
            ApprovalError::NotFound(_) => ErrorKind::NotFound,
            ApprovalError::NotPending(_)
            | ApprovalError::NotApproved(_)
            | ApprovalError::AlreadyConsumed(_) => ErrorKind::State,
            ApprovalError::Expired { .. } => ErrorKind::Expired,
        }
    }
}

pub type Result<T> = std::result::Result<T, ApprovalError>;
