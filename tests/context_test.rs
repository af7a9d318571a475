//! Tests for context aggregation - priority ordering and graceful degradation

use chrono::{Duration, Utc};
use dev_session_monitor::{build_context, AnalysisResult, Record, RecordStore};

#[test]
fn test_demo_scenario_ordering() {
    // Given: project "demo" with one interaction from 2 minutes ago
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::new_for_test(dir.path());
    let analysis = AnalysisResult {
        current_state: "debugging the loop".to_string(),
        issues: vec!["race condition".to_string()],
        ..Default::default()
    };
    let record = Record::interaction("sess-1", analysis)
        .with_timestamp(Utc::now() - Duration::minutes(2));
    store.append("demo", record).unwrap();

    // When: building context with a 5 minute window
    let pinned = vec!["use tabs not spaces".to_string()];
    let context = build_context(&store, "demo", "ship v1", &pinned, Duration::minutes(5));
    let rendered = context.render();

    // Then: reminder first, the interaction's issue next, the goal last
    let reminder_pos = rendered.find("use tabs not spaces").unwrap();
    let issue_pos = rendered.find("race condition").unwrap();
    let goal_pos = rendered.find("ship v1").unwrap();
    assert!(reminder_pos < issue_pos);
    assert!(issue_pos < goal_pos);
}

#[test]
fn test_records_rendered_in_chronological_order() {
    // Given: records appended newest-first
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::new_for_test(dir.path());
    let newer = Record::user_note("s", "second step").with_timestamp(Utc::now());
    let older =
        Record::user_note("s", "first step").with_timestamp(Utc::now() - Duration::minutes(3));
    store.append("demo", newer).unwrap();
    store.append("demo", older).unwrap();

    // When: building context
    let context = build_context(&store, "demo", "", &[], Duration::minutes(5));
    let rendered = context.render();

    // Then: rendering is chronological regardless of append order
    let first_pos = rendered.find("first step").unwrap();
    let second_pos = rendered.find("second step").unwrap();
    assert!(first_pos < second_pos);
}

#[test]
fn test_window_excludes_old_records() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::new_for_test(dir.path());
    let stale =
        Record::user_note("s", "ancient history").with_timestamp(Utc::now() - Duration::hours(2));
    store.append("demo", stale).unwrap();

    let context = build_context(&store, "demo", "goal", &[], Duration::minutes(5));

    assert!(context.recent_records.is_empty());
    assert!(!context.render().contains("ancient history"));
}

#[test]
fn test_degrades_when_store_unavailable() {
    // Given: a records path that cannot be read (a directory in its place)
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::new_for_test(dir.path());
    let records_path = dir.path().join("projects").join("demo").join("records.jsonl");
    std::fs::create_dir_all(&records_path).unwrap();

    // When: building context
    let pinned = vec!["check the logs".to_string()];
    let context = build_context(&store, "demo", "ship v1", &pinned, Duration::minutes(5));

    // Then: aggregation degrades to reminders + goal instead of failing
    assert!(context.recent_records.is_empty());
    let rendered = context.render();
    assert!(rendered.contains("check the logs"));
    assert!(rendered.contains("ship v1"));
}

#[test]
fn test_empty_goal_renders_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::new_for_test(dir.path());

    let context = build_context(&store, "demo", "", &[], Duration::minutes(5));

    assert!(context.render().contains("未设置项目目标"));
}
