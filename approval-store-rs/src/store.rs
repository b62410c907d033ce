// approval-store-rs/src/store.rs
// In-memory approval registry with debounced whole-file persistence.
//
// Implementation notes:
// - One RwLock guards both maps; query paths take the read lock.
// - Mutations re-arm the debounce timer only after the state lock has been
//   released; the save itself snapshots under the read lock and writes
//   outside it, serialized by `write_lock`.
// - Persistence failures are logged; the in-memory maps stay authoritative.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use chrono::Utc;
use error_handling::ShutdownListener;
use metrics::counter;
use shared_types::{read_json_file, write_json_file, DebouncedSaver};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{ApprovalError, Result};
use crate::model::{
    ApprovalRequest, ApprovalStats, ApprovalStatus, ExecutionState, NewApprovalRequest,
    NewExecutionState,
};
use crate::risk::{assess_risk_level, compute_command_hash, truncate_command};

pub const APPROVALS_FILE: &str = "ai_approvals.json";
pub const EXECUTIONS_FILE: &str = "ai_executions.json";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const DEFAULT_MAX_APPROVALS: usize = 100;
const DEFAULT_SAVE_DEBOUNCE: Duration = Duration::from_secs(5);
const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);
const DECIDED_RETENTION_HOURS: i64 = 24;
const FILE_MODE: u32 = 0o600;

/// Approval store configuration.
#[derive(Debug, Clone)]
pub struct ApprovalStoreConfig {
    pub data_dir: PathBuf,
    /// Lifetime of a request (and of a parked execution) when the caller
    /// sets no expiry.
    pub default_timeout: Duration,
    /// Maximum simultaneously pending requests.
    pub max_approvals: usize,
    /// Skip load and save entirely (tests, ephemeral flows).
    pub disable_persistence: bool,
    pub save_debounce: Duration,
    pub cleanup_interval: Duration,
}

impl ApprovalStoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            default_timeout: DEFAULT_TIMEOUT,
            max_approvals: DEFAULT_MAX_APPROVALS,
            disable_persistence: false,
            save_debounce: DEFAULT_SAVE_DEBOUNCE,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }

    /// Reads `APPROVAL_DATA_DIR`, `APPROVAL_TIMEOUT_SECS`,
    /// `APPROVAL_MAX_PENDING` and `APPROVAL_DISABLE_PERSISTENCE`.
    pub fn from_env() -> Self {
        config_rs::load_dotenv();
        let data_dir = config_rs::env_string("APPROVAL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(config_rs::data_dir);

        Self {
            default_timeout: config_rs::env_duration_secs("APPROVAL_TIMEOUT_SECS", DEFAULT_TIMEOUT),
            max_approvals: config_rs::env_parse("APPROVAL_MAX_PENDING", DEFAULT_MAX_APPROVALS),
            disable_persistence: config_rs::env_bool("APPROVAL_DISABLE_PERSISTENCE", false),
            ..Self::new(data_dir)
        }
    }

    pub fn with_persistence_disabled(mut self) -> Self {
        self.disable_persistence = true;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_max_approvals(mut self, max: usize) -> Self {
        self.max_approvals = max;
        self
    }

    // Zero values fall back to the defaults.
    fn normalized(mut self) -> Self {
        if self.default_timeout.is_zero() {
            self.default_timeout = DEFAULT_TIMEOUT;
        }
        if self.max_approvals == 0 {
            self.max_approvals = DEFAULT_MAX_APPROVALS;
        }
        if self.save_debounce.is_zero() {
            self.save_debounce = DEFAULT_SAVE_DEBOUNCE;
        }
        if self.cleanup_interval.is_zero() {
            self.cleanup_interval = DEFAULT_CLEANUP_INTERVAL;
        }
        self
    }
}

#[derive(Default)]
struct State {
    approvals: HashMap<String, ApprovalRequest>,
    executions: HashMap<String, ExecutionState>,
}

struct Inner {
    config: ApprovalStoreConfig,
    default_timeout: chrono::Duration,
    state: RwLock<State>,
    saver: DebouncedSaver,
    write_lock: Mutex<()>,
}

impl Inner {
    fn read_state(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self) -> bool {
        !self.config.disable_persistence
    }

    fn load(&self) {
        let mut state = self.write_state();

        let approvals_path = self.config.data_dir.join(APPROVALS_FILE);
        match read_json_file::<Vec<ApprovalRequest>>(&approvals_path) {
            Ok(Some(approvals)) => {
                for approval in approvals {
                    state.approvals.insert(approval.id.clone(), approval);
                }
            }
            Ok(None) => {}
            Err(err) => warn!(path = %approvals_path.display(), error = %err, "Failed to load approvals, starting fresh"),
        }

        let executions_path = self.config.data_dir.join(EXECUTIONS_FILE);
        match read_json_file::<Vec<ExecutionState>>(&executions_path) {
            Ok(Some(executions)) => {
                for execution in executions {
                    state.executions.insert(execution.id.clone(), execution);
                }
            }
            Ok(None) => {}
            Err(err) => warn!(path = %executions_path.display(), error = %err, "Failed to load execution states, starting fresh"),
        }

        debug!(
            approvals = state.approvals.len(),
            executions = state.executions.len(),
            "Loaded approval store"
        );
    }

    fn save(&self) {
        if !self.persist() {
            return;
        }
        let _write = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let (approvals, executions) = {
            let state = self.read_state();
            (
                state.approvals.values().cloned().collect::<Vec<_>>(),
                state.executions.values().cloned().collect::<Vec<_>>(),
            )
        };

        let approvals_path = self.config.data_dir.join(APPROVALS_FILE);
        if let Err(err) = write_json_file(&approvals_path, &approvals, FILE_MODE) {
            error!(path = %approvals_path.display(), error = %err, "Failed to save approvals");
        }
        let executions_path = self.config.data_dir.join(EXECUTIONS_FILE);
        if let Err(err) = write_json_file(&executions_path, &executions, FILE_MODE) {
            error!(path = %executions_path.display(), error = %err, "Failed to save execution states");
        }
    }
}

/// Registry of approval requests and parked execution states.
///
/// Cheap to clone; clones share the same maps.
#[derive(Clone)]
pub struct ApprovalStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ApprovalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalStore")
            .field("data_dir", &self.inner.config.data_dir)
            .field("max_approvals", &self.inner.config.max_approvals)
            .finish()
    }
}

impl ApprovalStore {
    /// Opens the store, loading any previously persisted records.
    ///
    /// Unreadable or corrupt files are logged and skipped.
    pub fn new(config: ApprovalStoreConfig) -> Result<Self> {
        if config.data_dir.as_os_str().is_empty() {
            return Err(ApprovalError::MissingDataDir);
        }
        let config = config.normalized();
        let default_timeout = chrono::Duration::from_std(config.default_timeout)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));

        let inner = Arc::new(Inner {
            saver: DebouncedSaver::new(config.save_debounce),
            default_timeout,
            state: RwLock::new(State::default()),
            write_lock: Mutex::new(()),
            config,
        });
        if inner.persist() {
            inner.load();
        }

        Ok(Self { inner })
    }

    pub fn config(&self) -> &ApprovalStoreConfig {
        &self.inner.config
    }

    // Must not be called while holding the state lock.
    fn schedule_save(&self) {
        if !self.inner.persist() {
            return;
        }
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner.saver.schedule(move || {
            if let Some(inner) = weak.upgrade() {
                inner.save();
            }
        });
    }

    /// Registers a new pending request.
    pub fn create(&self, req: NewApprovalRequest) -> Result<ApprovalRequest> {
        let created = {
            let mut state = self.inner.write_state();

            let pending = state.approvals.values().filter(|a| a.is_pending()).count();
            if pending >= self.inner.config.max_approvals {
                warn!(pending, max = self.inner.config.max_approvals, "Approval capacity reached");
                return Err(ApprovalError::Capacity(self.inner.config.max_approvals));
            }

            let now = Utc::now();
            let risk_level = req
                .risk_level
                .unwrap_or_else(|| assess_risk_level(&req.command, &req.target_type));
            let command_hash = req
                .command_hash
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| compute_command_hash(&req.command, &req.target_type, &req.target_id));

            let approval = ApprovalRequest {
                id: req
                    .id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(shared_types::new_id),
                execution_id: req.execution_id,
                tool_id: req.tool_id,
                command: req.command,
                target_type: req.target_type,
                target_id: req.target_id,
                target_name: req.target_name,
                context: req.context,
                risk_level,
                status: ApprovalStatus::Pending,
                requested_at: now,
                expires_at: req.expires_at.unwrap_or(now + self.inner.default_timeout),
                decided_at: None,
                decided_by: String::new(),
                deny_reason: String::new(),
                command_hash,
                consumed: false,
            };
            state.approvals.insert(approval.id.clone(), approval.clone());
            approval
        };
        self.schedule_save();

        counter!("approval_requests_created_total", 1, "risk" => created.risk_level.as_str());
        info!(
            id = %created.id,
            command = %truncate_command(&created.command, 50),
            risk = %created.risk_level,
            "Created approval request"
        );
        Ok(created)
    }

    /// Returns a copy of the request. A pending request past its deadline is
    /// reported as expired; the stored record is left for the sweeper.
    pub fn get(&self, id: &str) -> Option<ApprovalRequest> {
        let state = self.inner.read_state();
        let mut approval = state.approvals.get(id)?.clone();
        if approval.is_expired_at(Utc::now()) {
            approval.status = ApprovalStatus::Expired;
        }
        Some(approval)
    }

    /// Live pending requests, oldest first.
    pub fn get_pending(&self) -> Vec<ApprovalRequest> {
        let now = Utc::now();
        let state = self.inner.read_state();
        let mut pending: Vec<_> = state
            .approvals
            .values()
            .filter(|a| a.is_pending() && !a.is_expired_at(now))
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        pending
    }

    /// Every request raised by one execution, oldest first, skipping pending
    /// requests that have already lapsed.
    pub fn get_by_execution(&self, execution_id: &str) -> Vec<ApprovalRequest> {
        let now = Utc::now();
        let state = self.inner.read_state();
        let mut matching: Vec<_> = state
            .approvals
            .values()
            .filter(|a| a.execution_id == execution_id && !a.is_expired_at(now))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        matching
    }

    /// Approves a pending request. Approving an already-approved request
    /// succeeds and leaves the original decision untouched.
    pub fn approve(&self, id: &str, username: &str) -> Result<ApprovalRequest> {
        let outcome = {
            let mut state = self.inner.write_state();
            let approval = state
                .approvals
                .get_mut(id)
                .ok_or_else(|| ApprovalError::NotFound(id.to_string()))?;

            if approval.status == ApprovalStatus::Approved {
                return Ok(approval.clone());
            }
            if approval.status != ApprovalStatus::Pending {
                return Err(ApprovalError::NotPending(approval.status));
            }

            let now = Utc::now();
            if now > approval.expires_at {
                approval.status = ApprovalStatus::Expired;
                Err(ApprovalError::Expired {
                    id: id.to_string(),
                    expires_at: approval.expires_at,
                })
            } else {
                approval.status = ApprovalStatus::Approved;
                approval.decided_at = Some(now);
                approval.decided_by = username.to_string();
                Ok(approval.clone())
            }
        };
        self.schedule_save();

        match &outcome {
            Ok(approval) => {
                counter!("approval_decisions_total", 1, "decision" => "approved");
                info!(
                    id = %id,
                    by = %username,
                    command = %truncate_command(&approval.command, 50),
                    "Approval request approved"
                );
            }
            Err(err) => {
                counter!("approval_decisions_total", 1, "decision" => "expired");
                warn!(id = %id, error = %err, "Approval arrived after expiry");
            }
        }
        outcome
    }

    /// Denies a pending request.
    pub fn deny(&self, id: &str, username: &str, reason: &str) -> Result<ApprovalRequest> {
        let denied = {
            let mut state = self.inner.write_state();
            let approval = state
                .approvals
                .get_mut(id)
                .ok_or_else(|| ApprovalError::NotFound(id.to_string()))?;
            if approval.status != ApprovalStatus::Pending {
                return Err(ApprovalError::NotPending(approval.status));
            }

            approval.status = ApprovalStatus::Denied;
            approval.decided_at = Some(Utc::now());
            approval.decided_by = username.to_string();
            approval.deny_reason = reason.to_string();
            approval.clone()
        };
        self.schedule_save();

        counter!("approval_decisions_total", 1, "decision" => "denied");
        info!(id = %id, by = %username, reason = %reason, "Approval request denied");
        Ok(denied)
    }

    /// Spends an approval on the exact command and target it was granted
    /// for. An approval can be consumed once.
    #[instrument(skip(self, command), fields(approval_id = %id))]
    pub fn consume_approval(
        &self,
        id: &str,
        command: &str,
        target_type: &str,
        target_id: &str,
    ) -> Result<ApprovalRequest> {
        let outcome = {
            let mut state = self.inner.write_state();
            let approval = state
                .approvals
                .get_mut(id)
                .ok_or_else(|| ApprovalError::NotFound(id.to_string()))?;

            if approval.status != ApprovalStatus::Approved {
                return Err(ApprovalError::NotApproved(approval.status));
            }
            if approval.consumed {
                return Err(ApprovalError::AlreadyConsumed(id.to_string()));
            }

            if Utc::now() > approval.expires_at {
                approval.status = ApprovalStatus::Expired;
                Err(ApprovalError::Expired {
                    id: id.to_string(),
                    expires_at: approval.expires_at,
                })
            } else {
                let actual = compute_command_hash(command, target_type, target_id);
                if !approval.command_hash.is_empty() && approval.command_hash != actual {
                    warn!(
                        id = %id,
                        expected_hash = %approval.command_hash,
                        actual_hash = %actual,
                        "Approval command hash mismatch - possible replay attack"
                    );
                    return Err(ApprovalError::CommandMismatch);
                }
                approval.consumed = true;
                Ok(approval.clone())
            }
        };
        self.schedule_save();

        if outcome.is_ok() {
            info!(id = %id, command = %truncate_command(command, 50), "Approval consumed successfully");
        }
        outcome
    }

    /// Parks planner state until the pending tool call is decided.
    pub fn store_execution(&self, state: NewExecutionState) -> Result<ExecutionState> {
        if state.id.is_empty() {
            return Err(ApprovalError::MissingExecutionId);
        }

        let now = Utc::now();
        let execution = ExecutionState {
            id: state.id,
            original_request: state.original_request,
            messages: state.messages,
            pending_tool_call: state.pending_tool_call,
            created_at: now,
            expires_at: state.expires_at.unwrap_or(now + self.inner.default_timeout),
        };
        self.inner
            .write_state()
            .executions
            .insert(execution.id.clone(), execution.clone());
        self.schedule_save();

        debug!(id = %execution.id, "Stored execution state");
        Ok(execution)
    }

    /// Returns the parked state unless it has expired.
    pub fn get_execution(&self, id: &str) -> Option<ExecutionState> {
        let state = self.inner.read_state();
        state
            .executions
            .get(id)
            .filter(|e| Utc::now() <= e.expires_at)
            .cloned()
    }

    pub fn delete_execution(&self, id: &str) {
        self.inner.write_state().executions.remove(id);
        self.schedule_save();
    }

    /// Expires lapsed pending requests, purges decided and expired requests
    /// older than 24 hours and drops expired execution states. Returns how many records changed.
    pub fn cleanup_expired(&self) -> usize {
        let cleaned = {
            let mut state = self.inner.write_state();
            let now = Utc::now();
            let mut cleaned = 0;

            for approval in state.approvals.values_mut() {
                if approval.is_expired_at(now) {
                    approval.status = ApprovalStatus::Expired;
                    cleaned += 1;
                }
            }

            let cutoff = now - chrono::Duration::hours(DECIDED_RETENTION_HOURS);
            let before = state.approvals.len();
            // Lapsed requests were never decided; their deadline stands in.
            state
                .approvals
                .retain(|_, a| a.is_pending() || a.decided_at.unwrap_or(a.expires_at) >= cutoff);
            cleaned += before - state.approvals.len();

            let before = state.executions.len();
            state.executions.retain(|_, e| now <= e.expires_at);
            cleaned += before - state.executions.len();

            cleaned
        };

        if cleaned > 0 {
            self.schedule_save();
        }
        cleaned
    }

    pub fn stats(&self) -> ApprovalStats {
        let state = self.inner.read_state();
        let mut stats = ApprovalStats {
            executions: state.executions.len(),
            ..Default::default()
        };
        for approval in state.approvals.values() {
            match approval.status {
                ApprovalStatus::Pending => stats.pending += 1,
                ApprovalStatus::Approved => stats.approved += 1,
                ApprovalStatus::Denied => stats.denied += 1,
                ApprovalStatus::Expired => stats.expired += 1,
            }
        }
        stats
    }

    /// Writes both files now, cancelling any pending debounced save.
    pub fn flush(&self) {
        self.inner.saver.cancel();
        self.inner.save();
    }

    /// Spawns the periodic sweeper. It stops when `shutdown` fires or the
    /// store is dropped.
    pub fn start_cleanup(&self, mut shutdown: ShutdownListener) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.config.cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = shutdown.triggered() => {
                        debug!("Approval store cleanup loop stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else {
                            return;
                        };
                        let cleaned = ApprovalStore { inner }.cleanup_expired();
                        if cleaned > 0 {
                            debug!(count = cleaned, "Cleaned up expired approval items");
                        }
                    }
                }
            }
        })
    }
}
