//! Tests for the record store - append-only per-project persistence

use chrono::{Duration, Utc};
use dev_session_monitor::{AnalysisResult, Record, RecordPayload, RecordStore};

#[test]
fn test_append_load_round_trip() {
    // Given: a record with a full payload
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::new_for_test(dir.path());
    let analysis = AnalysisResult {
        current_state: "重构存储层".to_string(),
        files_changed: vec!["src/store.rs".to_string()],
        current_approach: vec!["先写测试".to_string()],
        issues: vec!["缺少并发用例".to_string()],
        solutions: vec!["补充 loom 风格测试".to_string()],
        best_practices: vec!["追加式写入".to_string()],
    };
    let record = Record::interaction("sess-1", analysis.clone());

    // When: appending and loading back
    store.append("demo", record).unwrap();
    let loaded = store.load_all("demo").unwrap();

    // Then: the payload survives the round trip identically
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].session_id, "sess-1");
    match &loaded[0].payload {
        RecordPayload::Interaction {
            current_state,
            files_changed,
            issues,
            ..
        } => {
            assert_eq!(current_state, &analysis.current_state);
            assert_eq!(files_changed, &analysis.files_changed);
            assert_eq!(issues, &analysis.issues);
        }
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[test]
fn test_load_missing_project_returns_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::new_for_test(dir.path());

    let records = store.load_all("never-written").unwrap();
    assert!(records.is_empty());
}

#[test]
fn test_load_recent_filters_by_window() {
    // Given: one old record and one fresh record
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::new_for_test(dir.path());

    let old = Record::user_note("s", "old note").with_timestamp(Utc::now() - Duration::minutes(10));
    let fresh = Record::user_note("s", "fresh note");
    store.append("demo", old).unwrap();
    store.append("demo", fresh).unwrap();

    // When: loading a 5 minute window
    let recent = store.load_recent("demo", Duration::minutes(5)).unwrap();

    // Then: only the fresh record is inside the window
    assert_eq!(recent.len(), 1);
    match &recent[0].payload {
        RecordPayload::UserNote { content, .. } => assert_eq!(content, "fresh note"),
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[test]
fn test_user_note_metadata_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::new_for_test(dir.path());

    let note = Record::user_note("s", "remember the edge case")
        .with_metadata("project", "demo")
        .with_priority("high")
        .with_status("open");
    store.append("demo", note).unwrap();

    let loaded = store.load_all("demo").unwrap();
    match &loaded[0].payload {
        RecordPayload::UserNote {
            metadata,
            priority,
            status,
            ..
        } => {
            assert_eq!(metadata.get("project").unwrap(), "demo");
            assert_eq!(priority.as_deref(), Some("high"));
            assert_eq!(status.as_deref(), Some("open"));
        }
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[test]
fn test_session_lifecycle() {
    // Given: an open session
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::new_for_test(dir.path());
    let session = store.open_session("demo", "ship v1").unwrap();
    assert!(session.is_open());
    assert_eq!(store.current_session("demo").unwrap().unwrap().id, session.id);

    // When: closing it
    let closed = store.close_session("demo").unwrap().unwrap();

    // Then: the session has an end time and no session remains open
    assert_eq!(closed.id, session.id);
    assert!(!closed.is_open());
    assert!(store.current_session("demo").unwrap().is_none());
}

#[test]
fn test_ensure_open_session_continues_existing() {
    // A session left open by a crashed process is continued, not duplicated
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::new_for_test(dir.path());

    let first = store.ensure_open_session("demo", "goal").unwrap();
    let second = store.ensure_open_session("demo", "goal").unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(store.list_sessions("demo").unwrap().len(), 1);
}
