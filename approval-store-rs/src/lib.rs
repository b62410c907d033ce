//! # Approval Store
//!
//! Persistent, capacity-bounded registry of commands awaiting a human
//! decision, plus the planner execution state parked alongside them.
//!
//! Requests move `pending → approved | denied | expired`. Decided records are
//! kept for a day, then purged by the sweeper started with
//! [`ApprovalStore::start_cleanup`]. Approvals are bound to their command by a
//! SHA-256 hash and can be consumed once.

pub mod error;
pub mod global;
pub mod model;
pub mod risk;
pub mod store;

pub use error::{ApprovalError, Result};
pub use global::{clear_global_store, global_store, set_global_store};
pub use model::{
    ApprovalRequest, ApprovalStats, ApprovalStatus, ExecutionState, NewApprovalRequest,
    NewExecutionState,
};
pub use risk::{assess_risk_level, compute_command_hash};
pub use store::{ApprovalStore, ApprovalStoreConfig, APPROVALS_FILE, EXECUTIONS_FILE};

#[cfg(test)]
mod tests;
