//! Integration tests for the file-backed event store.
//!
//! Exercises the JSONL wire format against real temp files, including the
//! failure-shape taxonomy: missing, array-shaped, partially and wholly
//! corrupt stores.

use chrono::Utc;

use hindsight::error::StoreError;
use hindsight::store::{
    AnnotationCreated, BoxType, Event, EventStore, FileStore, SessionContext,
};

fn sample_context() -> SessionContext {
    SessionContext {
        session_id: Some("s1".to_string()),
        turn_number: Some(1),
        git_remote: Some("git@github.com:x/repo.git".to_string()),
        git_branch: Some("main".to_string()),
    }
}

fn sample_event(turn: u64) -> Event {
    let context = SessionContext {
        turn_number: Some(turn),
        ..sample_context()
    };
    Event::AnnotationCreated(
        AnnotationCreated::new(BoxType::Decision, Utc::now(), context)
            .with_field("what", "kept the v1 endpoint"),
    )
}

#[tokio::test]
async fn test_append_creates_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("deeper").join("events.jsonl");
    let store = FileStore::new(&path);

    store.append(&sample_event(1)).await.unwrap();
    assert!(path.exists());
}

#[tokio::test]
async fn test_append_then_read_all_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path().join("events.jsonl"));

    store.append(&sample_event(1)).await.unwrap();
    store.append(&sample_event(2)).await.unwrap();
    store.append(&sample_event(3)).await.unwrap();

    let outcome = store.read_all().await.unwrap();
    assert_eq!(outcome.records.len(), 3);
    assert_eq!(outcome.skipped_lines, 0);
    // Log order is preserved.
    assert_eq!(outcome.records[0]["id"], "sess_s1_1");
    assert_eq!(outcome.records[2]["id"], "sess_s1_3");
}

#[tokio::test]
async fn test_missing_store_reads_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path().join("never-written.jsonl"));

    let outcome = store.read_all().await.unwrap();
    assert!(outcome.records.is_empty());
    assert_eq!(outcome.skipped_lines, 0);
}

#[tokio::test]
async fn test_unparseable_lines_are_skipped_and_counted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let store = FileStore::new(&path);
    store.append(&sample_event(1)).await.unwrap();

    // Simulate a torn write followed by a good append.
    let mut content = std::fs::read_to_string(&path).unwrap();
    content.push_str("{\"event\":\"AnnotationCrea\n");
    std::fs::write(&path, content).unwrap();
    store.append(&sample_event(2)).await.unwrap();

    let outcome = store.read_all().await.unwrap();
    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.skipped_lines, 1);
}

#[tokio::test]
async fn test_array_shaped_store_is_its_own_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    std::fs::write(&path, "[{\"event\":\"AnnotationCreated\"}]\n").unwrap();

    let err = FileStore::new(&path).read_all().await.unwrap_err();
    assert!(matches!(err, StoreError::ArrayShaped { .. }));
}

#[tokio::test]
async fn test_wholly_unparseable_store_is_corrupt_not_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    std::fs::write(&path, "### log rotated ###\nbinary soup\n").unwrap();

    let err = FileStore::new(&path).read_all().await.unwrap_err();
    match err {
        StoreError::Corrupt { lines, parsed, .. } => {
            assert_eq!(lines, 2);
            assert_eq!(parsed, 0);
        }
        other => panic!("expected Corrupt, got {other}"),
    }
}

#[tokio::test]
async fn test_legacy_lines_read_alongside_tagged_events() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    std::fs::write(
        &path,
        "{\"ts\":\"2026-01-01T00:00:00Z\",\"type\":\"Warning\",\"fields\":{\"risk\":\"x\"}}\n",
    )
    .unwrap();
    let store = FileStore::new(&path);
    store.append(&sample_event(1)).await.unwrap();

    let outcome = store.read_all().await.unwrap();
    assert_eq!(outcome.records.len(), 2);
    // The legacy line has no discriminator; decoding happens at projection.
    assert!(outcome.records[0].get("event").is_none());
    assert_eq!(outcome.records[1]["event"], "AnnotationCreated");
}
