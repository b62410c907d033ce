//! # Shared Types
//!
//! Domain vocabulary shared by the approval store, the investigation
//! orchestrator and the patrol stream: findings and their investigation
//! mirror fields, autonomy levels, risk grades, and the debounced JSON
//! persistence used by the stores.

pub mod autonomy;
pub mod finding;
pub mod persistence;
pub mod risk;

pub use autonomy::AutonomyLevel;
pub use finding::{Finding, FindingSeverity, InvestigationOutcome, InvestigationStatus};
pub use persistence::{read_json_file, write_json_file, DebouncedSaver, PersistError};
pub use risk::RiskLevel;

/// Generates a fresh random identifier in the canonical hyphenated form.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
