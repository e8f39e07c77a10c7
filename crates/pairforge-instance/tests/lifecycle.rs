//! Integration tests for the instance lifecycle over the loopback protocol.

use std::sync::Arc;
use std::time::Duration;

use pairforge_instance::{
    CreateOutcome, InstanceConfig, InstanceError, InstanceManager, InstanceStatus,
};
use pairforge_session::{
    Identity, LoopbackProtocol, SessionError, SessionHandle, SessionStore,
};

// =========================================================================
// Helpers
// =========================================================================

fn manager_with(protocol: LoopbackProtocol) -> InstanceManager<LoopbackProtocol> {
    InstanceManager::new(SessionStore::in_memory(), protocol, InstanceConfig::default())
}

fn manager_with_store(
    store: SessionStore,
    protocol: LoopbackProtocol,
) -> InstanceManager<LoopbackProtocol> {
    InstanceManager::new(store, protocol, InstanceConfig::default())
}

fn manager() -> (InstanceManager<LoopbackProtocol>, LoopbackProtocol) {
    let protocol = LoopbackProtocol::new();
    (manager_with(protocol.clone()), protocol)
}

async fn create_pending(manager: &InstanceManager<LoopbackProtocol>, user_id: &str) -> String {
    match manager.create(user_id).await.expect("create should succeed") {
        CreateOutcome::Pending { pairing_code } => pairing_code,
        CreateOutcome::AlreadyConnected => panic!("expected a pending instance"),
    }
}

/// Polls `status` until it reports `want`, letting the listener task run.
async fn wait_for_status(
    manager: &InstanceManager<LoopbackProtocol>,
    user_id: &str,
    want: InstanceStatus,
) {
    for _ in 0..200 {
        let report = manager.status(user_id).await.expect("instance should exist");
        if report.status == want {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("{user_id} never reached {want}");
}

// =========================================================================
// Create and pair
// =========================================================================

#[tokio::test]
async fn test_create_scan_send_end_to_end() {
    let (manager, protocol) = manager();

    let code = create_pending(&manager, "alice").await;
    assert!(code.starts_with("2@"));

    let report = manager.status("alice").await.unwrap();
    assert_eq!(report.status, InstanceStatus::QrPending);
    assert_eq!(report.pairing_code, code);

    protocol.scan(&code, "5511888888888").await.unwrap();
    wait_for_status(&manager, "alice", InstanceStatus::Connected).await;

    let report = manager.status("alice").await.unwrap();
    assert!(report.pairing_code.is_empty());
    assert_eq!(report.phone, "5511888888888");

    let message_id = manager.send("alice", "5511999999999", "hi").await.unwrap();
    let sent = protocol.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].id, message_id);
    assert_eq!(sent[0].to, "5511999999999");
    assert_eq!(sent[0].text, "hi");
}

#[tokio::test]
async fn test_create_twice_when_connected_returns_already_connected() {
    let (manager, protocol) = manager();
    let code = create_pending(&manager, "alice").await;
    protocol.scan(&code, "5511888888888").await.unwrap();
    wait_for_status(&manager, "alice", InstanceStatus::Connected).await;
    let created_at = manager.status("alice").await.unwrap().created_at;

    let outcome = manager.create("alice").await.unwrap();

    assert_eq!(outcome, CreateOutcome::AlreadyConnected);
    assert_eq!(protocol.sessions_opened(), 1);
    let report = manager.status("alice").await.unwrap();
    assert_eq!(report.status, InstanceStatus::Connected);
    assert_eq!(report.created_at, created_at);
}

#[tokio::test]
async fn test_create_trims_user_id() {
    let (manager, _protocol) = manager();

    create_pending(&manager, "  alice ").await;

    assert!(manager.status("alice").await.is_ok());
}

#[tokio::test]
async fn test_create_blank_user_id_is_invalid() {
    let (manager, protocol) = manager();

    let err = manager.create("   ").await.unwrap_err();

    assert!(matches!(err, InstanceError::InvalidRequest(_)));
    assert_eq!(protocol.sessions_opened(), 0);
}

#[tokio::test]
async fn test_create_replaces_instance_with_transport_down() {
    let (manager, protocol) = manager();
    let first = create_pending(&manager, "alice").await;
    let old = manager.registry().get("alice").await.unwrap();
    old.handle().disconnect().await;

    let second = create_pending(&manager, "alice").await;

    assert_ne!(first, second);
    assert_eq!(protocol.sessions_opened(), 2);
    assert_eq!(protocol.live_sessions(), 1);
    let current = manager.registry().get("alice").await.unwrap();
    assert!(!Arc::ptr_eq(&old, &current));
}

// =========================================================================
// Ghost sessions
// =========================================================================

#[tokio::test]
async fn test_create_ghost_session_is_replaced_with_fresh_code() {
    let store = SessionStore::in_memory();
    let protocol = LoopbackProtocol::new();
    let manager = manager_with_store(store.clone(), protocol.clone());
    protocol.inject_ghosts(1);

    let code = create_pending(&manager, "alice").await;

    assert!(code.starts_with("2@"));
    assert_eq!(protocol.sessions_opened(), 2);
    assert_eq!(protocol.live_sessions(), 1);
    let report = manager.status("alice").await.unwrap();
    assert_eq!(report.status, InstanceStatus::QrPending);

    let stale = Identity::primary("stale");
    let records = store.stored_devices().await.unwrap();
    assert!(
        records.iter().all(|r| r.identity.as_ref() != Some(&stale)),
        "ghost identity survived recovery: {records:?}"
    );
    // The replacement device is unpaired, so nothing is stored at all.
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_create_persistent_ghost_is_stale_session() {
    let (manager, protocol) = manager();
    protocol.inject_ghosts(2);

    let err = manager.create("alice").await.unwrap_err();

    assert!(matches!(err, InstanceError::StaleSession(ref id) if id == "alice"));
    assert_eq!(protocol.sessions_opened(), 2);
    assert_eq!(protocol.live_sessions(), 0);
    assert_eq!(manager.count().await, 0);
}

// =========================================================================
// Failures while provisioning
// =========================================================================

#[tokio::test]
async fn test_create_without_code_times_out_and_disconnects() {
    let protocol = LoopbackProtocol::new();
    protocol.withhold_codes(true);
    let manager = InstanceManager::new(
        SessionStore::in_memory(),
        protocol.clone(),
        InstanceConfig {
            pairing_timeout: Duration::from_millis(50),
        },
    );

    let err = manager.create("alice").await.unwrap_err();

    assert!(matches!(err, InstanceError::PairingTimeout { ref user_id, .. } if user_id == "alice"));
    assert_eq!(protocol.sessions_opened(), 1);
    assert_eq!(protocol.live_sessions(), 0);
    assert!(matches!(
        manager.status("alice").await,
        Err(InstanceError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_create_connect_failure_is_upstream() {
    let (manager, protocol) = manager();
    protocol.fail_next_connects(1);

    let err = manager.create("alice").await.unwrap_err();

    assert!(matches!(
        err,
        InstanceError::Upstream(SessionError::ConnectFailed(_))
    ));
    assert_eq!(protocol.live_sessions(), 0);
    assert_eq!(manager.count().await, 0);

    // The next attempt goes through normally.
    create_pending(&manager, "alice").await;
}

// =========================================================================
// Listener-driven updates
// =========================================================================

#[tokio::test]
async fn test_rotated_code_is_reported_by_status() {
    let (manager, protocol) = manager();
    let first = create_pending(&manager, "alice").await;

    let second = protocol.rotate(&first).unwrap();

    for _ in 0..200 {
        if manager.status("alice").await.unwrap().pairing_code == second {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("rotated code never reported");
}

#[tokio::test]
async fn test_expired_code_reports_disconnected() {
    let (manager, protocol) = manager();
    let code = create_pending(&manager, "alice").await;

    protocol.expire(&code).unwrap();
    wait_for_status(&manager, "alice", InstanceStatus::Disconnected).await;

    let report = manager.status("alice").await.unwrap();
    assert!(report.pairing_code.is_empty());
}

#[tokio::test]
async fn test_create_after_expired_code_issues_new_code() {
    let (manager, protocol) = manager();
    let first = create_pending(&manager, "alice").await;
    protocol.expire(&first).unwrap();
    wait_for_status(&manager, "alice", InstanceStatus::Disconnected).await;

    let outcome = manager.create("alice").await.unwrap();

    let CreateOutcome::Pending { pairing_code } = outcome else {
        panic!("expected a fresh code, got {outcome:?}");
    };
    assert_ne!(pairing_code, first);
    assert_eq!(protocol.live_sessions(), 1);
    let report = manager.status("alice").await.unwrap();
    assert_eq!(report.status, InstanceStatus::QrPending);
    assert_eq!(report.pairing_code, pairing_code);
}

// =========================================================================
// Logout, send, list
// =========================================================================

#[tokio::test]
async fn test_logout_removes_instance_and_allows_fresh_create() {
    let (manager, protocol) = manager();
    create_pending(&manager, "alice").await;

    manager.logout("alice").await.unwrap();

    assert_eq!(protocol.live_sessions(), 0);
    assert!(matches!(
        manager.status("alice").await,
        Err(InstanceError::NotFound(_))
    ));
    create_pending(&manager, "alice").await;
    assert_eq!(manager.count().await, 1);
}

#[tokio::test]
async fn test_repeated_create_logout_releases_sessions() {
    let (manager, protocol) = manager();

    for _ in 0..50 {
        create_pending(&manager, "alice").await;
        manager.logout("alice").await.unwrap();
    }

    assert_eq!(manager.count().await, 0);
    assert_eq!(protocol.sessions_opened(), 50);
    assert_eq!(protocol.live_sessions(), 0);
    // Listener tasks may still hold the last instance for a moment.
    for _ in 0..200 {
        if protocol.retained_sessions() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("{} sessions still retained", protocol.retained_sessions());
}

#[tokio::test]
async fn test_file_store_keeps_only_paired_devices() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::open_dir(dir.path()).await.unwrap();
    let protocol = LoopbackProtocol::new();
    let manager = manager_with_store(store.clone(), protocol.clone());

    for _ in 0..5 {
        create_pending(&manager, "alice").await;
        manager.logout("alice").await.unwrap();
    }
    let code = create_pending(&manager, "bob").await;
    protocol.expire(&code).unwrap();
    wait_for_status(&manager, "bob", InstanceStatus::Disconnected).await;
    protocol.withhold_codes(true);
    let timed_out = InstanceManager::new(
        store.clone(),
        protocol.clone(),
        InstanceConfig {
            pairing_timeout: Duration::from_millis(20),
        },
    );
    assert!(timed_out.create("dave").await.is_err());
    protocol.withhold_codes(false);

    let code = create_pending(&manager, "carol").await;
    protocol.scan(&code, "5511777777777").await.unwrap();
    wait_for_status(&manager, "carol", InstanceStatus::Connected).await;

    let records = store.stored_devices().await.unwrap();
    assert_eq!(records.len(), 1, "unexpected records: {records:?}");
    assert_eq!(records[0].identity, Some(Identity::primary("5511777777777")));
}

#[tokio::test]
async fn test_lookups_trim_user_id() {
    let (manager, _protocol) = manager();
    create_pending(&manager, "alice").await;

    assert!(manager.status(" alice ").await.is_ok());
    assert!(matches!(
        manager.send(" alice", "5511999999999", "hi").await,
        Err(InstanceError::Upstream(SessionError::SendFailed(_)))
    ));
    manager.logout("alice  ").await.unwrap();
    assert_eq!(manager.count().await, 0);
}

#[tokio::test]
async fn test_logout_unknown_is_not_found() {
    let (manager, _protocol) = manager();

    let err = manager.logout("nobody").await.unwrap_err();

    assert!(matches!(err, InstanceError::NotFound(ref id) if id == "nobody"));
}

#[tokio::test]
async fn test_send_unknown_instance_is_not_connected() {
    let (manager, protocol) = manager();

    let err = manager.send("nobody", "5511999999999", "hi").await.unwrap_err();

    assert!(matches!(err, InstanceError::NotConnected(_)));
    assert!(protocol.sent_messages().is_empty());
}

#[tokio::test]
async fn test_send_blank_fields_are_invalid() {
    let (manager, _protocol) = manager();
    create_pending(&manager, "alice").await;

    assert!(matches!(
        manager.send("alice", "  ", "hi").await,
        Err(InstanceError::InvalidRequest(_))
    ));
    assert!(matches!(
        manager.send("alice", "5511999999999", "").await,
        Err(InstanceError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn test_send_before_pairing_is_upstream() {
    let (manager, _protocol) = manager();
    create_pending(&manager, "alice").await;

    let err = manager.send("alice", "5511999999999", "hi").await.unwrap_err();

    assert!(matches!(
        err,
        InstanceError::Upstream(SessionError::SendFailed(_))
    ));
}

#[tokio::test]
async fn test_list_reports_every_instance_sorted() {
    let (manager, protocol) = manager();
    create_pending(&manager, "carol").await;
    let code = create_pending(&manager, "alice").await;
    protocol.scan(&code, "5511888888888").await.unwrap();
    wait_for_status(&manager, "alice", InstanceStatus::Connected).await;

    let list = manager.list().await;

    let rows: Vec<_> = list
        .iter()
        .map(|s| (s.user_id.as_str(), s.status, s.phone.as_str()))
        .collect();
    assert_eq!(
        rows,
        [
            ("alice", InstanceStatus::Connected, "5511888888888"),
            ("carol", InstanceStatus::QrPending, ""),
        ]
    );
}

// =========================================================================
// Concurrency
// =========================================================================

#[tokio::test]
async fn test_concurrent_creates_keep_one_instance() {
    let (manager, protocol) = manager();

    let (a, b) = tokio::join!(manager.create("alice"), manager.create("alice"));

    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(manager.count().await, 1);
    assert_eq!(protocol.live_sessions(), 1);
}

#[tokio::test]
async fn test_concurrent_creates_for_different_users() {
    let (manager, protocol) = manager();

    let (a, b, c) = tokio::join!(
        manager.create("alice"),
        manager.create("bob"),
        manager.create("carol")
    );

    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(manager.count().await, 3);
    assert_eq!(protocol.live_sessions(), 3);
}
