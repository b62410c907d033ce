//! # Investigation
//!
//! Runs one bounded planner conversation per finding, classifies the verdict
//! and, depending on autonomy, queues the proposed fix for approval or runs
//! and verifies it.
//!
//! - [`InvestigationStore`] keeps sessions indexed by finding and persists
//!   them to `investigations.json`.
//! - [`InvestigationOrchestrator`] enforces the concurrency cap, the planner
//!   deadline and the safety gates, and cancels in-flight work on shutdown.
//! - [`parse_investigation_summary`] reads the `PROPOSED_FIX:` /
//!   `TARGET_HOST:` / `CANNOT_FIX:` / `NEEDS_ATTENTION:` markers.

pub mod config;
pub mod error;
pub mod interfaces;
pub mod model;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod store;

pub use config::InvestigationConfig;
pub use error::{InvestigationError, Result};
pub use interfaces::{
    ApprovalQueue, AutonomyLevelProvider, CommandExecutor, CommandOutput, ExecuteRequest,
    ExecutorError, FindingsStore, FixApproval, FixVerifier, InfrastructureContextProvider,
    LicenseChecker, MetricsCallback, Planner, PlannerError, PlannerEvent, PlannerMessage,
    VerifyError, APPROVAL_TYPE_INVESTIGATION_FIX, FEATURE_AI_AUTOFIX,
};
pub use model::{Fix, InvestigationSession, MAX_COMMANDS_PER_FIX, MAX_COMMAND_LENGTH};
pub use orchestrator::InvestigationOrchestrator;
pub use parser::{parse_investigation_summary, strip_code_fences, ParsedSummary};
pub use prompt::build_investigation_prompt;
pub use store::{InvestigationStore, INVESTIGATIONS_FILE};
