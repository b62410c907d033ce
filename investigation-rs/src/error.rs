// investigation-rs/src/error.rs

use error_handling::{Classify, ErrorKind};
use shared_types::PersistError;

use crate::interfaces::PlannerError;

#[derive(Debug, thiserror::Error)]
pub enum InvestigationError {
    #[error("orchestrator is shutting down")]
    ShuttingDown,

    #[error("maximum concurrent investigations reached ({0})")]
    Capacity(usize),

    #[error("failed to create chat session: {0}")]
    SessionCreate(#[source] PlannerError),

    #[error("investigation failed: {0}")]
    Failed(#[source] PlannerError),

    #[error("findings store not configured")]
    FindingsStoreNotConfigured,

    #[error("finding not found: {0}")]
    FindingNotFound(String),

    #[error("investigation already running for finding {0}")]
    AlreadyRunning(String),

    #[error("investigation not found: {0}")]
    NotFound(String),

    #[error("shutdown timed out with {0} investigations still running")]
    ShutdownTimeout(usize),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

impl InvestigationError {
    /// True when the planner conversation ran past its deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, InvestigationError::Failed(err) if err.is_timeout())
    }
}

impl Classify for InvestigationError {
    fn kind(&self) -> ErrorKind {
        match self {
            InvestigationError::ShuttingDown => ErrorKind::Shutdown,
            InvestigationError::Capacity(_) => ErrorKind::Capacity,
            InvestigationError::SessionCreate(err) | InvestigationError::Failed(err) => err.kind(),
            InvestigationError::FindingsStoreNotConfigured => ErrorKind::Validation,
            InvestigationError::FindingNotFound(_) | InvestigationError::NotFound(_) => {
                ErrorKind::NotFound
            }
            InvestigationError::AlreadyRunning(_) => ErrorKind::State,
            InvestigationError::ShutdownTimeout(_) => ErrorKind::Timeout,
            InvestigationError::Persist(_) => ErrorKind::Persistence,
        }
    }
}

pub type Result<T> = std::result::Result<T, InvestigationError>;
