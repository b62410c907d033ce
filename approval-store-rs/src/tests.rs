use std::time::Duration;

use chrono::Utc;
use error_handling::{Classify, ErrorKind, ShutdownSignal};
use serde_json::json;
use shared_types::{write_json_file, RiskLevel};
use tempfile::TempDir;

use super::*;

fn memory_store() -> ApprovalStore {
    ApprovalStore::new(ApprovalStoreConfig::new("/unused").with_persistence_disabled()).unwrap()
}

fn restart_request() -> NewApprovalRequest {
    NewApprovalRequest::new("systemctl restart nginx")
        .with_execution("exec-1")
        .with_tool("run_command")
        .with_target("host", "web-01", "web-01")
        .with_context("nginx is not answering health checks")
}

#[test]
fn new_store_requires_data_dir() {
    let err = ApprovalStore::new(ApprovalStoreConfig::new("")).unwrap_err();
    assert!(matches!(err, ApprovalError::MissingDataDir));
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn zero_limits_fall_back_to_defaults() {
    let store = ApprovalStore::new(
        ApprovalStoreConfig::new("/unused")
            .with_persistence_disabled()
            .with_default_timeout(Duration::ZERO)
            .with_max_approvals(0),
    )
    .unwrap();

    assert_eq!(store.config().max_approvals, 100);
    assert_eq!(store.config().default_timeout, Duration::from_secs(300));
}

#[test]
fn create_fills_defaults() {
    let store = memory_store();
    let created = store.create(restart_request()).unwrap();

    assert!(!created.id.is_empty());
    assert_eq!(created.status, ApprovalStatus::Pending);
    assert_eq!(created.risk_level, RiskLevel::Medium);
    assert_eq!(created.expires_at - created.requested_at, chrono::Duration::minutes(5));
    assert_eq!(
        created.command_hash,
        compute_command_hash("systemctl restart nginx", "host", "web-01")
    );
    assert_eq!(store.get(&created.id), Some(created));
}

#[test]
fn caller_supplied_risk_and_id_are_kept() {
    let store = memory_store();
    let created = store
        .create(restart_request().with_id("fixed-id").with_risk(RiskLevel::Low))
        .unwrap();
    assert_eq!(created.id, "fixed-id");
    assert_eq!(created.risk_level, RiskLevel::Low);
}

#[test]
fn pending_count_never_exceeds_capacity() {
    let store = ApprovalStore::new(
        ApprovalStoreConfig::new("/unused")
            .with_persistence_disabled()
            .with_max_approvals(5),
    )
    .unwrap();

    let mut rejected = 0;
    for i in 0..20 {
        match store.create(NewApprovalRequest::new(format!("echo {i}"))) {
            Ok(_) => {}
            Err(err) => {
                assert!(matches!(err, ApprovalError::Capacity(5)));
                assert_eq!(err.kind(), ErrorKind::Capacity);
                rejected += 1;
            }
        }
        assert!(store.get_pending().len() <= 5);
    }
    assert_eq!(rejected, 15);

    // Deciding one frees a slot.
    let first = store.get_pending().remove(0);
    store.deny(&first.id, "alice", "not now").unwrap();
    assert!(store.create(NewApprovalRequest::new("echo again")).is_ok());
    assert!(store.create(NewApprovalRequest::new("echo over")).is_err());
}

#[test]
fn approve_is_idempotent() {
    let store = memory_store();
    let created = store.create(restart_request()).unwrap();

    let first = store.approve(&created.id, "alice").unwrap();
    assert_eq!(first.status, ApprovalStatus::Approved);
    assert_eq!(first.decided_by, "alice");
    let decided_at = first.decided_at;
    assert!(decided_at.is_some());

    let second = store.approve(&created.id, "bob").unwrap();
    assert_eq!(second.decided_at, decided_at);
    assert_eq!(second.decided_by, "alice");
}

#[test]
fn approve_unknown_is_not_found() {
    let store = memory_store();
    let err = store.approve("missing", "alice").unwrap_err();
    assert!(matches!(err, ApprovalError::NotFound(_)));
    assert_eq!(err.to_string(), "approval request not found: missing");
}

#[test]
fn approve_after_expiry_transitions_to_expired() {
    let store = memory_store();
    let created = store
        .create(restart_request().with_expires_at(Utc::now() - chrono::Duration::seconds(1)))
        .unwrap();

    let err = store.approve(&created.id, "alice").unwrap_err();
    assert!(matches!(err, ApprovalError::Expired { .. }));
    assert_eq!(err.kind(), ErrorKind::Expired);
    assert_eq!(store.stats().expired, 1);

    let err = store.approve(&created.id, "alice").unwrap_err();
    assert!(matches!(err, ApprovalError::NotPending(ApprovalStatus::Expired)));
}

#[test]
fn deny_rejects_every_non_pending_state() {
    let store = memory_store();

    let approved = store.create(restart_request()).unwrap();
    store.approve(&approved.id, "alice").unwrap();
    let denied = store.create(restart_request()).unwrap();
    store.deny(&denied.id, "alice", "risky").unwrap();
    let expired = store
        .create(restart_request().with_expires_at(Utc::now() - chrono::Duration::seconds(1)))
        .unwrap();
    store.cleanup_expired();

    for id in [&approved.id, &denied.id, &expired.id] {
        let err = store.deny(id, "bob", "again").unwrap_err();
        assert!(matches!(err, ApprovalError::NotPending(_)), "{id}: {err}");
        assert_eq!(err.kind(), ErrorKind::State);
    }

    let record = store.get(&denied.id).unwrap();
    assert_eq!(record.deny_reason, "risky");
    assert_eq!(record.decided_by, "alice");
}

#[test]
fn lapsed_pending_reads_as_expired_until_swept() {
    let store = memory_store();
    let live = store.create(restart_request()).unwrap();
    let lapsed = store
        .create(restart_request().with_expires_at(Utc::now() - chrono::Duration::seconds(1)))
        .unwrap();

    assert_eq!(store.get(&lapsed.id).unwrap().status, ApprovalStatus::Expired);
    assert_eq!(store.stats().pending, 2);

    let pending: Vec<_> = store.get_pending().into_iter().map(|a| a.id).collect();
    assert_eq!(pending, vec![live.id.clone()]);
    let by_execution: Vec<_> = store.get_by_execution("exec-1").into_iter().map(|a| a.id).collect();
    assert_eq!(by_execution, vec![live.id]);

    assert_eq!(store.cleanup_expired(), 1);
    let stats = store.stats();
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.expired, 1);
}

#[test]
fn cleanup_purges_decisions_older_than_a_day() {
    let dir = TempDir::new().unwrap();
    let now = Utc::now();
    let old = now - chrono::Duration::hours(25);

    let stale = json!([
        {
            "id": "old-approved",
            "command": "df -h",
            "riskLevel": "low",
            "status": "approved",
            "requestedAt": old,
            "expiresAt": old + chrono::Duration::minutes(5),
            "decidedAt": old,
            "decidedBy": "alice"
        },
        {
            "id": "recent-denied",
            "command": "df -h",
            "riskLevel": "low",
            "status": "denied",
            "requestedAt": now,
            "expiresAt": now + chrono::Duration::minutes(5),
            "decidedAt": now,
            "decidedBy": "alice"
        },
        {
            "id": "lapsed",
            "command": "df -h",
            "riskLevel": "low",
            "status": "pending",
            "requestedAt": old,
            "expiresAt": old + chrono::Duration::minutes(5)
        }
    ]);
    write_json_file(&dir.path().join(APPROVALS_FILE), &stale, 0o600).unwrap();
    let executions = json!([
        {
            "id": "old-exec",
            "createdAt": old,
            "expiresAt": old + chrono::Duration::minutes(5)
        }
    ]);
    write_json_file(&dir.path().join(EXECUTIONS_FILE), &executions, 0o600).unwrap();

    let store = ApprovalStore::new(ApprovalStoreConfig::new(dir.path())).unwrap();
    assert_eq!(store.stats().executions, 1);
    assert!(store.get_execution("old-exec").is_none());

    // old-approved purged, lapsed expired then purged, old-exec dropped.
    assert!(store.cleanup_expired() >= 3);
    let now = Utc::now();
    let cutoff = now - chrono::Duration::hours(24);
    assert!(store.get("old-approved").is_none());
    assert!(store.get("recent-denied").is_some());
    for approval in store.get_by_execution("") {
        assert!(!(approval.is_pending() && approval.expires_at < now));
        assert!(approval.is_pending() || approval.decided_at.map(|d| d >= cutoff).unwrap_or(true));
    }
    assert_eq!(store.stats().executions, 0);
}

#[test]
fn flush_then_reload_round_trips() {
    let dir = TempDir::new().unwrap();
    let store = ApprovalStore::new(ApprovalStoreConfig::new(dir.path())).unwrap();

    let a = store.create(restart_request()).unwrap();
    let b = store.create(NewApprovalRequest::new("df -h")).unwrap();
    store.approve(&a.id, "alice").unwrap();
    let execution = store
        .store_execution(NewExecutionState {
            id: "exec-1".into(),
            original_request: json!({"prompt": "check nginx"}).as_object().cloned().unwrap(),
            messages: vec![json!({"role": "user", "content": "hi"}).as_object().cloned().unwrap()],
            pending_tool_call: json!({"name": "run_command"}).as_object().cloned().unwrap(),
            expires_at: None,
        })
        .unwrap();
    store.flush();

    let reopened = ApprovalStore::new(ApprovalStoreConfig::new(dir.path())).unwrap();
    let mut before = vec![store.get(&a.id).unwrap(), store.get(&b.id).unwrap()];
    let mut after = vec![reopened.get(&a.id).unwrap(), reopened.get(&b.id).unwrap()];
    before.sort_by(|x, y| x.id.cmp(&y.id));
    after.sort_by(|x, y| x.id.cmp(&y.id));
    assert_eq!(before, after);
    assert_eq!(reopened.get_execution("exec-1"), Some(execution));
    assert_eq!(reopened.stats(), store.stats());
}

#[cfg(unix)]
#[test]
fn persisted_files_are_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let store = ApprovalStore::new(ApprovalStoreConfig::new(dir.path())).unwrap();
    store.create(restart_request()).unwrap();
    store.flush();

    for name in [APPROVALS_FILE, EXECUTIONS_FILE] {
        let mode = std::fs::metadata(dir.path().join(name)).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600, "{name}");
    }
}

#[test]
fn corrupt_files_start_empty() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(APPROVALS_FILE), b"[{broken").unwrap();

    let store = ApprovalStore::new(ApprovalStoreConfig::new(dir.path())).unwrap();
    assert_eq!(store.stats(), ApprovalStats::default());
}

#[test]
fn consume_is_single_use_and_command_bound() {
    let store = memory_store();
    let created = store.create(restart_request()).unwrap();

    let err = store
        .consume_approval(&created.id, "systemctl restart nginx", "host", "web-01")
        .unwrap_err();
    assert!(matches!(err, ApprovalError::NotApproved(ApprovalStatus::Pending)));

    store.approve(&created.id, "alice").unwrap();

    let err = store
        .consume_approval(&created.id, "systemctl restart nginx", "host", "web-02")
        .unwrap_err();
    assert!(matches!(err, ApprovalError::CommandMismatch));

    let consumed = store
        .consume_approval(&created.id, "systemctl restart nginx", "host", "web-01")
        .unwrap();
    assert!(consumed.consumed);

    let err = store
        .consume_approval(&created.id, "systemctl restart nginx", "host", "web-01")
        .unwrap_err();
    assert!(matches!(err, ApprovalError::AlreadyConsumed(_)));
}

#[test]
fn execution_state_requires_id_and_expires() {
    let store = memory_store();
    let err = store.store_execution(NewExecutionState::default()).unwrap_err();
    assert!(matches!(err, ApprovalError::MissingExecutionId));

    store
        .store_execution(NewExecutionState {
            id: "stale".into(),
            expires_at: Some(Utc::now() - chrono::Duration::seconds(1)),
            ..Default::default()
        })
        .unwrap();
    assert!(store.get_execution("stale").is_none());

    store
        .store_execution(NewExecutionState {
            id: "live".into(),
            ..Default::default()
        })
        .unwrap();
    assert!(store.get_execution("live").is_some());
    store.delete_execution("live");
    assert!(store.get_execution("live").is_none());
}

#[test]
fn global_handle_is_replaceable() {
    let store = memory_store();
    let created = store.create(restart_request()).unwrap();

    set_global_store(store);
    let global = global_store().unwrap();
    assert!(global.get(&created.id).is_some());

    clear_global_store();
    assert!(global_store().is_none());
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
async fn mutations_are_persisted_after_debounce() {
    let dir = TempDir::new().unwrap();
    let store = ApprovalStore::new(ApprovalStoreConfig::new(dir.path())).unwrap();
    let path = dir.path().join(APPROVALS_FILE);

    for i in 0..5 {
        store.create(NewApprovalRequest::new(format!("echo {i}"))).unwrap();
    }
    assert!(!path.exists());

    tokio::time::sleep(Duration::from_secs(6)).await;
    wait_for_file(&path).await;
    let saved: Vec<ApprovalRequest> = shared_types::read_json_file(&path).unwrap().unwrap();
    assert_eq!(saved.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn sweeper_expires_and_stops_on_shutdown() {
    let store = memory_store();
    store
        .create(restart_request().with_expires_at(Utc::now() - chrono::Duration::seconds(1)))
        .unwrap();

    let shutdown = ShutdownSignal::new();
    let handle = store.start_cleanup(shutdown.subscribe());

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(store.stats().expired, 1);

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("sweeper did not stop")
        .unwrap();
}
