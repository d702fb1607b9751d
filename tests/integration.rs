//! Integration tests for Glyphgate
//!
//! End-to-end flows through the engines, the matrix and a live session,
//! against the in-memory store. The Postgres flow at the bottom is ignored
//! unless a test database is provided.

use glyphgate::auth::AllowSet;
use glyphgate::engine::{BulkEngine, ErrorKind, GrantEngine};
use glyphgate::matrix::{Cell, Interaction, MatrixProjector};
use glyphgate::storage::{MemoryStore, PostgresConfig, PostgresStore, RelationStore, StorageError};
use glyphgate::sync::{PermissionSession, SessionState, SyncConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn memory_engine() -> (Arc<MemoryStore>, GrantEngine) {
    let store = Arc::new(MemoryStore::new());
    let engine = GrantEngine::new(store.clone());
    (store, engine)
}

fn letters(allowed: AllowSet) -> String {
    allowed.iter().collect()
}

#[tokio::test]
async fn test_grant_and_revoke_are_idempotent() {
    let (store, engine) = memory_engine();
    engine.add_subject("alice", &[]).await.unwrap();

    engine.grant_one("alice", 'A').await.unwrap();
    engine.grant_one("alice", 'A').await.unwrap();
    assert_eq!(store.grant_count(), 1);
    assert_eq!(letters(engine.allow_set("alice").await.unwrap()), "A");

    // Never granted, and a token that does not exist at all
    engine.revoke_one("alice", 'B').await.unwrap();
    engine.add_token('C').await.unwrap();
    engine.revoke_one("alice", 'C').await.unwrap();
    assert_eq!(letters(engine.allow_set("alice").await.unwrap()), "A");

    engine.revoke_one("alice", 'A').await.unwrap();
    engine.revoke_one("alice", 'A').await.unwrap();
    assert!(engine.allow_set("alice").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_grant_never_creates_subjects() {
    let (_, engine) = memory_engine();

    let err = engine.grant_one("ghost", 'A').await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(engine.list_subjects().await.unwrap().is_empty());

    let err = engine.revoke_one("ghost", 'A').await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_single_item_validation() {
    let (_, engine) = memory_engine();
    engine.add_subject("alice", &[]).await.unwrap();

    let long = "x".repeat(257);
    assert_eq!(
        engine.add_subject(&long, &[]).await.unwrap_err().kind(),
        ErrorKind::Validation
    );
    assert_eq!(
        engine.add_subject("bob", &['1']).await.unwrap_err().kind(),
        ErrorKind::Validation
    );
    assert_eq!(
        engine.grant_one("alice", '#').await.unwrap_err().kind(),
        ErrorKind::Validation
    );
    assert_eq!(
        engine.rename_subject("alice", "  ").await.unwrap_err().kind(),
        ErrorKind::Validation
    );

    assert_eq!(engine.list_subjects().await.unwrap().len(), 1);
    assert!(engine.list_tokens().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_subject_cascades() {
    let (store, engine) = memory_engine();
    engine.add_subject("alice", &['A', 'B']).await.unwrap();
    engine.add_subject("bob", &['A']).await.unwrap();

    let alice = store.find_subject("alice").await.unwrap();
    engine.delete_subject("alice").await.unwrap();

    assert!(matches!(
        store.granted_tokens(alice).await,
        Err(StorageError::NotFound(_))
    ));
    assert_eq!(
        engine.allow_set("alice").await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(store.grant_count(), 1);

    // Tokens outlive their subjects
    assert_eq!(engine.list_tokens().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_delete_token_cascades() {
    let (_, engine) = memory_engine();
    engine.add_subject("alice", &['A', 'B']).await.unwrap();
    engine.add_subject("bob", &['B']).await.unwrap();

    engine.delete_token('B').await.unwrap();

    assert_eq!(letters(engine.allow_set("alice").await.unwrap()), "A");
    assert!(engine.allow_set("bob").await.unwrap().is_empty());
    assert_eq!(
        engine.delete_token('B').await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[tokio::test]
async fn test_rename_token_conflict() {
    let (_, engine) = memory_engine();
    engine.add_subject("alice", &['A']).await.unwrap();
    engine.add_subject("bob", &['B']).await.unwrap();

    let err = engine.rename_token('A', 'B').await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(letters(engine.allow_set("alice").await.unwrap()), "A");
    assert_eq!(letters(engine.allow_set("bob").await.unwrap()), "B");

    engine.rename_token('A', 'A').await.unwrap();

    // Grants follow the token through a rename
    engine.rename_token('A', 'Z').await.unwrap();
    assert_eq!(letters(engine.allow_set("alice").await.unwrap()), "Z");
}

#[tokio::test]
async fn test_rename_subject() {
    let (_, engine) = memory_engine();
    engine.add_subject("alice", &['A']).await.unwrap();
    engine.add_subject("bob", &[]).await.unwrap();

    assert_eq!(
        engine.rename_subject("alice", "bob").await.unwrap_err().kind(),
        ErrorKind::Conflict
    );
    engine.rename_subject("alice", "alice").await.unwrap();

    engine.rename_subject("alice", "carol").await.unwrap();
    assert_eq!(letters(engine.allow_set("carol").await.unwrap()), "A");
    assert_eq!(
        engine.allow_set("alice").await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[tokio::test]
async fn test_toggle_twice_is_identity() {
    let (_, engine) = memory_engine();
    engine.add_subject("alice", &['A']).await.unwrap();

    for token in ['A', 'B'] {
        let before = engine.has_grant("alice", token).await.unwrap();
        let first = engine.toggle("alice", token).await.unwrap();
        let second = engine.toggle("alice", token).await.unwrap();

        assert_eq!(first, !before);
        assert_eq!(second, before);
        assert_eq!(engine.has_grant("alice", token).await.unwrap(), before);
    }
}

#[tokio::test]
async fn test_grant_all_and_revoke_all() {
    let (_, engine) = memory_engine();
    engine.add_subject("alice", &['A']).await.unwrap();
    engine.add_subject("bob", &['B', 'C']).await.unwrap();

    assert_eq!(engine.grant_all("alice").await.unwrap(), 2);
    assert_eq!(letters(engine.allow_set("alice").await.unwrap()), "ABC");

    assert_eq!(engine.revoke_all("bob").await.unwrap(), 2);
    assert!(engine.allow_set("bob").await.unwrap().is_empty());
    assert_eq!(letters(engine.allow_set("alice").await.unwrap()), "ABC");
}

#[tokio::test]
async fn test_bulk_grant_or_create() {
    let (_, engine) = memory_engine();
    engine.add_subject("alice", &[]).await.unwrap();
    let bulk = BulkEngine::from_engine(&engine);

    let report = bulk.grant_or_create("alice\n\nbob", "A B").await.unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(report.granted, 1);
    assert!(report.failures.is_empty());
    assert_eq!(letters(engine.allow_set("alice").await.unwrap()), "AB");
    assert_eq!(letters(engine.allow_set("bob").await.unwrap()), "AB");

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(
        json,
        serde_json::json!({ "created": 1, "granted": 1, "failures": [] })
    );
}

#[tokio::test]
async fn test_bulk_grant_with_empty_token_list() {
    let (_, engine) = memory_engine();
    engine.add_subject("alice", &['A']).await.unwrap();
    let bulk = BulkEngine::from_engine(&engine);

    let report = bulk.grant_or_create("alice\nbob", "").await.unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(report.granted, 0);
    assert!(engine.allow_set("bob").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_bulk_revoke_of_unknown_token() {
    let (_, engine) = memory_engine();
    engine.add_subject("alice", &['A']).await.unwrap();
    let bulk = BulkEngine::from_engine(&engine);

    let report = bulk.revoke("alice", "Z").await.unwrap();
    assert_eq!(report.removed, 0);
    assert!(report.is_clean());

    let report = bulk.revoke("alice", "A Z").await.unwrap();
    assert_eq!(report.removed, 1);
    assert!(report.is_clean());
    assert!(engine.list_tokens().await.unwrap().iter().all(|t| t.value != 'Z'));
}

#[tokio::test]
async fn test_bulk_validation_rejects_whole_batch() {
    let (store, engine) = memory_engine();
    let bulk = BulkEngine::from_engine(&engine);

    let list = format!("alice\n{}\nbob", "x".repeat(257));
    let err = bulk.grant_or_create(&list, "A").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = bulk.grant_or_create("alice", "A 1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert!(engine.list_subjects().await.unwrap().is_empty());
    assert!(engine.list_tokens().await.unwrap().is_empty());
    assert_eq!(store.grant_count(), 0);
}

#[tokio::test]
async fn test_bulk_delete() {
    let (store, engine) = memory_engine();
    let bulk = BulkEngine::from_engine(&engine);
    bulk.grant_or_create("alice\nbob\ncarol", "A B").await.unwrap();

    let report = bulk.delete("alice\ncarol").await.unwrap();

    assert_eq!(report.deleted, 2);
    assert!(report.is_clean());
    let names: Vec<String> = engine
        .list_subjects()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, vec!["bob"]);
    assert_eq!(store.grant_count(), 2);
}

#[tokio::test]
async fn test_matrix_build_and_interact() {
    let (_, engine) = memory_engine();
    engine.add_subject("alice", &['A']).await.unwrap();
    engine.add_subject("bob", &['B']).await.unwrap();
    let projector = MatrixProjector::new(engine.clone());

    let matrix = projector.build().await.unwrap();
    assert_eq!(matrix.subjects(), &["alice".to_string(), "bob".to_string()]);
    assert_eq!(matrix.tokens(), &['A', 'B']);
    assert_eq!(matrix.cell(0, 0), Some(&Cell::Corner));
    assert_eq!(matrix.cell(0, 2), Some(&Cell::TokenHeader('B')));
    assert_eq!(matrix.cell(2, 0), Some(&Cell::SubjectHeader("bob".to_string())));
    assert_eq!(matrix.cell(2, 1), Some(&Cell::Denied));
    assert_eq!(matrix.cell(2, 2), Some(&Cell::Granted));

    // Headers and out-of-range cells do nothing
    assert_eq!(
        projector.interact(&matrix, 0, 1).await.unwrap(),
        Interaction::Ignored
    );
    assert_eq!(
        projector.interact(&matrix, 9, 9).await.unwrap(),
        Interaction::Ignored
    );

    match projector.interact(&matrix, 2, 1).await.unwrap() {
        Interaction::Toggled {
            subject,
            token,
            granted,
            matrix,
        } => {
            assert_eq!(subject, "bob");
            assert_eq!(token, 'A');
            assert!(granted);
            assert_eq!(matrix.cell(2, 1), Some(&Cell::Granted));
        }
        Interaction::Ignored => panic!("data cell was ignored"),
    }

    assert!(engine.has_grant("bob", 'A').await.unwrap());
}

#[tokio::test]
async fn test_matrix_render() {
    let (_, engine) = memory_engine();
    engine.add_subject("al", &['A']).await.unwrap();
    engine.add_subject("bob", &[]).await.unwrap();

    let matrix = MatrixProjector::new(engine).build().await.unwrap();
    let rendered = matrix.render();
    let lines: Vec<&str> = rendered.lines().collect();

    assert_eq!(lines.len(), 3);
    assert!(lines[0].ends_with(" A"));
    assert!(lines[1].starts_with("al "));
    assert!(lines[1].ends_with('✓'));
    assert!(lines[2].ends_with('✗'));
}

#[tokio::test(start_paused = true)]
async fn test_session_converges_on_external_changes() {
    let (store, engine) = memory_engine();
    engine.add_subject("alice", &['A']).await.unwrap();

    let session = PermissionSession::new(store, SyncConfig::new());
    let notifications = Arc::new(AtomicUsize::new(0));
    let counter = notifications.clone();
    session.on_change(move |allowed, delta| {
        assert!(!delta.is_empty());
        assert!(allowed.allows('A'));
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let mut state = session.state_receiver();
    session.authenticate("alice").await.unwrap();
    assert_eq!(*state.borrow_and_update(), SessionState::Active);

    assert_eq!(session.filter("ABC abc"), "A ");

    // Another administrator grants B
    engine.grant_one("alice", 'B').await.unwrap();
    tokio::time::sleep(Duration::from_millis(2100)).await;

    assert_eq!(letters(session.allow_set()), "AB");
    assert_eq!(session.filter("ABC abc"), "AB ");
    assert_eq!(notifications.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(notifications.load(Ordering::SeqCst), 1);

    session.end();
    assert_eq!(*state.borrow_and_update(), SessionState::Terminated);
    assert_eq!(session.filter("ABC"), "");
}

#[tokio::test(start_paused = true)]
async fn test_sessions_are_independent() {
    let (store, engine) = memory_engine();
    engine.add_subject("alice", &['A']).await.unwrap();
    engine.add_subject("bob", &['B']).await.unwrap();

    let config = SyncConfig::new().poll_interval(Duration::from_millis(500));
    let alice = PermissionSession::new(store.clone(), config.clone());
    let bob = PermissionSession::new(store, config);
    alice.authenticate("alice").await.unwrap();
    bob.authenticate("bob").await.unwrap();
    assert_ne!(alice.id(), bob.id());

    engine.grant_one("bob", 'C').await.unwrap();
    alice.end();
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert!(alice.allow_set().is_empty());
    assert_eq!(letters(bob.allow_set()), "BC");
    assert_eq!(bob.state(), SessionState::Active);
}

/// Runs the main flows against a real database
#[tokio::test]
#[ignore = "requires GLYPHGATE_TEST_DATABASE_URL"]
async fn test_postgres_flow() {
    let url = std::env::var("GLYPHGATE_TEST_DATABASE_URL")
        .expect("GLYPHGATE_TEST_DATABASE_URL must be set");
    let config = PostgresConfig::from_url(&url).expect("invalid test database URL");
    let store = Arc::new(PostgresStore::new(config).await.unwrap());
    store.health_check().await.unwrap();
    assert_eq!(store.backend_name(), "postgres");

    let engine = GrantEngine::new(store.clone());
    let bulk = BulkEngine::from_engine(&engine);
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let alice = format!("alice-{}", suffix);
    let bob = format!("bob-{}", suffix);

    engine.add_subject(&alice, &['ж']).await.unwrap();
    let report = bulk
        .grant_or_create(&format!("{}\n{}", alice, bob), "ж ф")
        .await
        .unwrap();
    assert_eq!(report.created, 1);
    assert_eq!(report.granted, 1);
    assert!(report.is_clean());
    assert!(engine.has_grant(&bob, 'ф').await.unwrap());

    assert_eq!(
        engine.rename_subject(&alice, &bob).await.unwrap_err().kind(),
        ErrorKind::Conflict
    );

    let bob_id = store.find_subject(&bob).await.unwrap();
    engine.delete_subject(&bob).await.unwrap();
    assert!(matches!(
        store.granted_tokens(bob_id).await,
        Err(StorageError::NotFound(_))
    ));

    engine.delete_subject(&alice).await.unwrap();
}
