// investigation-rs/src/store.rs
// Investigation session registry with a finding-ID index and debounced
// persistence to <dir>/investigations.json.
//
// Implementation notes:
// - One Mutex guards the session map and the finding index.
// - Every accessor returns owned copies; internal records never escape.
// - Mutations re-arm a single 5 s timer after releasing the lock. The save
//   snapshots under the lock and writes outside it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::Utc;
use shared_types::{
    read_json_file, write_json_file, DebouncedSaver, InvestigationOutcome, InvestigationStatus,
    PersistError,
};
use tracing::{debug, error, info, warn};

use crate::model::{Fix, InvestigationSession};

pub const INVESTIGATIONS_FILE: &str = "investigations.json";

const DEFAULT_SAVE_DEBOUNCE: Duration = Duration::from_secs(5);
const FILE_MODE: u32 = 0o644;

/// Sessions without a completion time older than this are considered stuck,
/// whatever `max_age` a cleanup pass is given.
const STUCK_SESSION_CUTOFF_MINUTES: i64 = 20;

#[derive(Default)]
struct State {
    sessions: HashMap<String, InvestigationSession>,
    by_finding: HashMap<String, Vec<String>>,
}

impl State {
    fn insert(&mut self, session: InvestigationSession) {
        let ids = self.by_finding.entry(session.finding_id.clone()).or_default();
        if !ids.contains(&session.id) {
            ids.push(session.id.clone());
        }
        self.sessions.insert(session.id.clone(), session);
    }

    fn remove(&mut self, id: &str) -> Option<InvestigationSession> {
        let session = self.sessions.remove(id)?;
        if let Some(ids) = self.by_finding.get_mut(&session.finding_id) {
            ids.retain(|other| other != id);
            if ids.is_empty() {
                self.by_finding.remove(&session.finding_id);
            }
        }
        Some(session)
    }
}

struct Inner {
    data_dir: Option<PathBuf>,
    state: Mutex<State>,
    saver: DebouncedSaver,
    write_lock: Mutex<()>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn file_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join(INVESTIGATIONS_FILE))
    }

    fn save(&self) -> Result<(), PersistError> {
        let Some(path) = self.file_path() else {
            return Ok(());
        };
        let _write = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut sessions: Vec<InvestigationSession> = self.lock().sessions.values().cloned().collect();
        sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at));

        write_json_file(&path, &sessions, FILE_MODE)?;
        debug!(count = sessions.len(), path = %path.display(), "Saved investigations");
        Ok(())
    }
}

/// Registry of investigation sessions.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct InvestigationStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for InvestigationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvestigationStore")
            .field("data_dir", &self.inner.data_dir)
            .field("sessions", &self.len())
            .finish()
    }
}

impl InvestigationStore {
    /// Opens a store persisting under `data_dir`, or a purely in-memory store
    /// when `None`. A corrupt file is logged and the store starts empty.
    pub fn new(data_dir: Option<PathBuf>) -> Self {
        Self::with_debounce(data_dir, DEFAULT_SAVE_DEBOUNCE)
    }

    pub fn with_debounce(data_dir: Option<PathBuf>, debounce: Duration) -> Self {
        let store = Self {
            inner: Arc::new(Inner {
                data_dir,
                state: Mutex::new(State::default()),
                saver: DebouncedSaver::new(debounce),
                write_lock: Mutex::new(()),
            }),
        };
        store.load();
        store
    }

    fn load(&self) {
        let Some(path) = self.inner.file_path() else {
            return;
        };
        match read_json_file::<Vec<InvestigationSession>>(&path) {
            Ok(Some(sessions)) => {
                let mut state = self.inner.lock();
                for session in sessions {
                    state.insert(session);
                }
                info!(count = state.sessions.len(), "Loaded investigations");
            }
            Ok(None) => {}
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Failed to load investigations, starting fresh");
            }
        }
    }

    // Must not be called while holding the state lock.
    fn schedule_save(&self) {
        if self.inner.data_dir.is_none() {
            return;
        }
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner.saver.schedule(move || {
            if let Some(inner) = weak.upgrade() {
                if let Err(err) = inner.save() {
                    error!(error = %err, "Failed to save investigations");
                }
            }
        });
    }

    // Applies `f` to one session; schedules a save when it existed.
    fn modify<R>(&self, id: &str, f: impl FnOnce(&mut InvestigationSession) -> R) -> Option<R> {
        let result = {
            let mut state = self.inner.lock();
            state.sessions.get_mut(id).map(f)
        };
        if result.is_some() {
            self.schedule_save();
        }
        result
    }

    /// Registers a new pending session for `finding_id`.
    pub fn create(&self, finding_id: &str, session_id: &str) -> InvestigationSession {
        let session = InvestigationSession::new(finding_id, session_id);
        self.inner.lock().insert(session.clone());
        self.schedule_save();
        session
    }

    pub fn get(&self, id: &str) -> Option<InvestigationSession> {
        self.inner.lock().sessions.get(id).cloned()
    }

    /// Every session for a finding, oldest first.
    pub fn get_by_finding(&self, finding_id: &str) -> Vec<InvestigationSession> {
        let state = self.inner.lock();
        let mut sessions: Vec<_> = state
            .by_finding
            .get(finding_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.sessions.get(id).cloned())
            .collect();
        sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        sessions
    }

    /// The most recently started session for a finding.
    pub fn get_latest_by_finding(&self, finding_id: &str) -> Option<InvestigationSession> {
        let state = self.inner.lock();
        state
            .by_finding
            .get(finding_id)?
            .iter()
            .filter_map(|id| state.sessions.get(id))
            .max_by_key(|s| s.started_at)
            .cloned()
    }

    pub fn get_running(&self) -> Vec<InvestigationSession> {
        let state = self.inner.lock();
        state
            .sessions
            .values()
            .filter(|s| s.status == InvestigationStatus::Running)
            .cloned()
            .collect()
    }

    pub fn get_all(&self) -> Vec<InvestigationSession> {
        let mut sessions: Vec<_> = self.inner.lock().sessions.values().cloned().collect();
        sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        sessions
    }

    /// Replaces a stored session. Returns false for unknown IDs.
    pub fn update(&self, session: &InvestigationSession) -> bool {
        let updated = {
            let mut state = self.inner.lock();
            let same_finding = state
                .sessions
                .get(&session.id)
                .map(|existing| existing.finding_id == session.finding_id);
            match same_finding {
                Some(true) => {
                    state.sessions.insert(session.id.clone(), session.clone());
                    true
                }
                // Moved to another finding: re-index.
                Some(false) => {
                    state.remove(&session.id);
                    state.insert(session.clone());
                    true
                }
                None => false,
            }
        };
        if updated {
            self.schedule_save();
        }
        updated
    }

    pub fn update_status(&self, id: &str, status: InvestigationStatus) -> bool {
        self.modify(id, |s| s.status = status).is_some()
    }

    pub fn set_outcome(&self, id: &str, outcome: InvestigationOutcome) -> bool {
        self.modify(id, |s| s.outcome = Some(outcome)).is_some()
    }

    /// Marks the session completed with its outcome, summary and fix.
    pub fn complete(
        &self,
        id: &str,
        outcome: InvestigationOutcome,
        summary: &str,
        fix: Option<Fix>,
    ) -> bool {
        self.modify(id, |s| {
            s.status = InvestigationStatus::Completed;
            s.completed_at = Some(Utc::now());
            s.outcome = Some(outcome);
            s.summary = summary.to_string();
            s.proposed_fix = fix;
        })
        .is_some()
    }

    pub fn fail(&self, id: &str, error: &str) -> bool {
        self.modify(id, |s| {
            s.status = InvestigationStatus::Failed;
            s.completed_at = Some(Utc::now());
            s.error = error.to_string();
        })
        .is_some()
    }

    /// Returns the new turn count, or `None` for unknown IDs.
    pub fn increment_turn_count(&self, id: &str) -> Option<u32> {
        self.modify(id, |s| {
            s.turn_count += 1;
            s.turn_count
        })
    }

    pub fn set_approval_id(&self, id: &str, approval_id: &str) -> bool {
        self.modify(id, |s| s.approval_id = Some(approval_id.to_string()))
            .is_some()
    }

    pub fn delete(&self, id: &str) -> bool {
        let removed = self.inner.lock().remove(id).is_some();
        if removed {
            self.schedule_save();
        }
        removed
    }

    pub fn count_running(&self) -> usize {
        self.inner
            .lock()
            .sessions
            .values()
            .filter(|s| s.status == InvestigationStatus::Running)
            .count()
    }

    /// Sessions whose fix was executed.
    pub fn count_fixed(&self) -> usize {
        self.inner
            .lock()
            .sessions
            .values()
            .filter(|s| s.outcome == Some(InvestigationOutcome::FixExecuted))
            .count()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops finished sessions (completed, failed or needs-attention) that
    /// ended more than `max_age` ago
    /// and stuck sessions (never finished, started over 20 minutes ago).
    /// Returns the number removed.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let removed = {
            let mut state = self.inner.lock();
            let now = Utc::now();
            let age_cutoff = chrono::Duration::from_std(max_age)
                .map(|age| now - age)
                .unwrap_or(now);
            let stuck_cutoff = now - chrono::Duration::minutes(STUCK_SESSION_CUTOFF_MINUTES);

            let expired: Vec<String> = state
                .sessions
                .values()
                .filter(|s| match s.completed_at {
                    Some(completed_at) => s.status.is_terminal() && completed_at < age_cutoff,
                    None => s.started_at < stuck_cutoff,
                })
                .map(|s| s.id.clone())
                .collect();
            for id in &expired {
                state.remove(id);
            }
            expired.len()
        };

        if removed > 0 {
            info!(removed, "Cleaned up old investigations");
            self.schedule_save();
        }
        removed
    }

    /// Evicts the oldest finished sessions until at most `max` remain.
    /// Pending and running sessions are never evicted. Returns the number
    /// removed.
    pub fn enforce_size_limit(&self, max: usize) -> usize {
        let removed = {
            let mut state = self.inner.lock();
            if state.sessions.len() <= max {
                return 0;
            }
            let excess = state.sessions.len() - max;

            let mut finished: Vec<_> = state
                .sessions
                .values()
                .filter(|s| !s.is_active())
                .filter_map(|s| s.completed_at.map(|at| (at, s.id.clone())))
                .collect();
            finished.sort();

            let victims: Vec<String> = finished.into_iter().take(excess).map(|(_, id)| id).collect();
            for id in &victims {
                state.remove(id);
            }
            victims.len()
        };

        if removed > 0 {
            info!(removed, max, "Evicted investigations over size limit");
            self.schedule_save();
        }
        removed
    }

    /// Cancels the debounce timer and writes immediately.
    pub fn force_save(&self) -> Result<(), PersistError> {
        self.inner.saver.cancel();
        self.inner.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn backdate(store: &InvestigationStore, id: &str, started_mins: i64, completed_mins: Option<i64>) {
        let mut session = store.get(id).unwrap();
        session.started_at = Utc::now() - chrono::Duration::minutes(started_mins);
        session.completed_at = completed_mins.map(|m| Utc::now() - chrono::Duration::minutes(m));
        assert!(store.update(&session));
    }

    #[test]
    fn get_returns_independent_copy() {
        let store = InvestigationStore::new(None);
        let created = store.create("finding-1", "chat-1");

        let fix = Fix::new(vec!["systemctl restart app".into()], "local", "restart it");
        store.complete(&created.id, InvestigationOutcome::FixQueued, "summary", Some(fix));

        let mut copy = store.get(&created.id).unwrap();
        copy.proposed_fix.as_mut().unwrap().commands.push("rm -rf /".into());
        copy.summary.push_str(" tampered");

        let stored = store.get(&created.id).unwrap();
        assert_eq!(stored.proposed_fix.unwrap().commands, vec!["systemctl restart app"]);
        assert_eq!(stored.summary, "summary");
        assert_eq!(stored.status, InvestigationStatus::Completed);
        assert!(stored.completed_at.is_some());
    }

    #[test]
    fn latest_by_finding_uses_start_time() {
        let store = InvestigationStore::new(None);
        let older = store.create("finding-1", "chat-1");
        let newer = store.create("finding-1", "chat-2");
        store.create("finding-2", "chat-3");
        backdate(&store, &older.id, 10, None);

        assert_eq!(store.get_by_finding("finding-1").len(), 2);
        assert_eq!(store.get_latest_by_finding("finding-1").unwrap().id, newer.id);
        assert!(store.get_latest_by_finding("unknown").is_none());
    }

    #[test]
    fn counters_track_status_and_outcome() {
        let store = InvestigationStore::new(None);
        let a = store.create("f-a", "c-a");
        let b = store.create("f-b", "c-b");
        store.update_status(&a.id, InvestigationStatus::Running);
        store.update_status(&b.id, InvestigationStatus::Running);
        assert_eq!(store.count_running(), 2);
        assert_eq!(store.get_running().len(), 2);

        store.complete(&a.id, InvestigationOutcome::FixExecuted, "done", None);
        store.fail(&b.id, "boom");
        assert_eq!(store.count_running(), 0);
        assert_eq!(store.count_fixed(), 1);
        assert_eq!(store.get(&b.id).unwrap().error, "boom");

        assert_eq!(store.increment_turn_count(&a.id), Some(1));
        assert_eq!(store.increment_turn_count(&a.id), Some(2));
        assert_eq!(store.increment_turn_count("missing"), None);
        assert!(store.set_approval_id(&a.id, "approval-1"));
        assert_eq!(store.get(&a.id).unwrap().approval_id.as_deref(), Some("approval-1"));
    }

    #[test]
    fn cleanup_drops_old_and_stuck_sessions() {
        let store = InvestigationStore::new(None);
        let old_done = store.create("f-1", "c-1");
        let fresh_done = store.create("f-1", "c-2");
        let stuck = store.create("f-2", "c-3");
        let running = store.create("f-3", "c-4");

        store.complete(&old_done.id, InvestigationOutcome::CannotFix, "", None);
        store.complete(&fresh_done.id, InvestigationOutcome::CannotFix, "", None);
        backdate(&store, &old_done.id, 180, Some(120));
        backdate(&store, &stuck.id, 30, None);
        store.update_status(&running.id, InvestigationStatus::Running);

        assert_eq!(store.cleanup(Duration::from_secs(3600)), 2);
        assert!(store.get(&old_done.id).is_none());
        assert!(store.get(&stuck.id).is_none());
        assert!(store.get(&fresh_done.id).is_some());
        assert!(store.get(&running.id).is_some());

        // The finding-2 index entry emptied and was dropped.
        assert!(store.get_by_finding("f-2").is_empty());
        assert_eq!(store.get_by_finding("f-1").len(), 1);
    }

    #[test]
    fn cleanup_ages_out_sessions_left_needing_attention() {
        let store = InvestigationStore::new(None);
        let flagged = store.create("f-1", "c-1");
        let recent = store.create("f-2", "c-2");

        for id in [&flagged.id, &recent.id] {
            let mut session = store.get(id).unwrap();
            session.status = InvestigationStatus::NeedsAttention;
            session.completed_at = Some(Utc::now());
            assert!(store.update(&session));
        }
        backdate(&store, &flagged.id, 180, Some(120));

        assert_eq!(store.cleanup(Duration::from_secs(3600)), 1);
        assert!(store.get(&flagged.id).is_none());
        assert!(store.get(&recent.id).is_some());
    }

    #[test]
    fn size_limit_never_evicts_active_sessions() {
        let store = InvestigationStore::new(None);
        let mut finished = Vec::new();
        for i in 0..4 {
            let s = store.create(&format!("f-{i}"), "c");
            store.complete(&s.id, InvestigationOutcome::CannotFix, "", None);
            backdate(&store, &s.id, 60, Some(50 - i as i64));
            finished.push(s.id);
        }
        for i in 0..3 {
            let s = store.create(&format!("active-{i}"), "c");
            store.update_status(&s.id, InvestigationStatus::Running);
        }

        assert_eq!(store.enforce_size_limit(5), 2);
        assert_eq!(store.len(), 5);
        // Oldest completions go first.
        assert!(store.get(&finished[0]).is_none());
        assert!(store.get(&finished[1]).is_none());
        assert!(store.get(&finished[3]).is_some());

        // Only active sessions left above the bound: nothing more to evict.
        assert_eq!(store.enforce_size_limit(1), 2);
        assert_eq!(store.count_running(), 3);
    }

    #[test]
    fn force_save_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = InvestigationStore::new(Some(dir.path().to_path_buf()));
        let s = store.create("finding-1", "chat-1");
        store.complete(
            &s.id,
            InvestigationOutcome::FixQueued,
            "PROPOSED_FIX: df -h",
            Some(Fix::new(vec!["df -h".into()], "local", "")),
        );
        store.force_save().unwrap();

        let reopened = InvestigationStore::new(Some(dir.path().to_path_buf()));
        assert_eq!(reopened.get(&s.id), store.get(&s.id));
        assert_eq!(reopened.get_latest_by_finding("finding-1").unwrap().id, s.id);
    }

    #[cfg(unix)]
    #[test]
    fn investigations_file_is_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = InvestigationStore::new(Some(dir.path().to_path_buf()));
        store.create("finding-1", "chat-1");
        store.force_save().unwrap();

        let mode = std::fs::metadata(dir.path().join(INVESTIGATIONS_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(INVESTIGATIONS_FILE), b"not json").unwrap();
        let store = InvestigationStore::new(Some(dir.path().to_path_buf()));
        assert!(store.is_empty());
    }

    async fn wait_for_file(path: &std::path::Path) {
        for _ in 0..500 {
            if path.exists() {
                return;
            }
            tokio::task::yield_now().await;
            std::thread::sleep(Duration::from_millis(2));
        }
        panic!("{} was never written", path.display());
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_updates_writes_once_after_debounce() {
        let dir = TempDir::new().unwrap();
        let store = InvestigationStore::new(Some(dir.path().to_path_buf()));
        let path = dir.path().join(INVESTIGATIONS_FILE);

        let s = store.create("finding-1", "chat-1");
        for _ in 0..20 {
            store.increment_turn_count(&s.id);
        }
        assert!(!path.exists());

        tokio::time::sleep(Duration::from_secs(6)).await;
        wait_for_file(&path).await;
        let saved: Vec<InvestigationSession> = read_json_file(&path).unwrap().unwrap();
        assert_eq!(saved[0].turn_count, 20);
    }
}
