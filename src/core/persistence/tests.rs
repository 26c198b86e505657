use super::*;
use crate::core::message::Message;
use tempfile::TempDir;

fn sample_state() -> PersistedState {
    let mut first = Session::new(ProfileSnapshot::new("Default", "Be helpful."));
    first.push_message(Message::user("Hello"));
    first.push_message(Message::assistant("Hi there"));
    first.assign_title("Greeting".into(), Utc::now());

    let mut second = Session::new(ProfileSnapshot::new("Coder", "Write Rust."));
    second.push_message(Message::user("Explain lifetimes"));
    second.push_message(Message::error("Cannot reach the server"));

    PersistedState {
        schema_version: CURRENT_SCHEMA_VERSION,
        active_session_id: Some(second.id),
        sessions: vec![first, second],
    }
}

fn has_pending_save(gateway: &PersistenceGateway) -> bool {
    gateway
        .pending
        .as_ref()
        .is_some_and(|token| !token.is_cancelled())
}

fn quarantined_files(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .expect("read dir")
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.to_string_lossy().contains(".corrupt-"))
        .collect()
}

#[test]
fn missing_file_starts_empty() {
    let dir = TempDir::new().expect("temp dir");
    let outcome = load_state(&dir.path().join("sessions.json"));
    assert_eq!(outcome.source, LoadSource::Missing);
    assert!(outcome.state.sessions.is_empty());
    assert_eq!(outcome.state.active_session_id, None);
}

#[test]
fn round_trip_preserves_sessions_and_active_pointer() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("nested").join("sessions.json");
    let state = sample_state();

    write_state_atomic(&path, &state).expect("write");
    let outcome = load_state(&path);

    assert_eq!(outcome.source, LoadSource::Current);
    assert_eq!(outcome.state, state);
}

#[test]
fn envelope_uses_iso8601_and_camel_case_keys() {
    let state = sample_state();
    let value = serde_json::to_value(&state).expect("serialize");
    assert_eq!(value["schemaVersion"], CURRENT_SCHEMA_VERSION);
    assert!(value["activeSessionID"].is_string());
    let session = &value["sessions"][0];
    assert!(session["createdAt"].as_str().expect("string").contains('T'));
    assert_eq!(session["profileSnapshot"]["profileName"], "Default");
    assert_eq!(session["profileSnapshot"]["systemPromptText"], "Be helpful.");
    assert!(session.get("isSending").is_none());
}

#[test]
fn truncated_file_is_quarantined_not_deleted() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("sessions.json");
    fs::write(&path, r#"{"schemaVersion":2,"sessions":[{"id":"#).expect("write");

    let outcome = load_state(&path);

    assert!(outcome.state.sessions.is_empty());
    assert!(!path.exists());
    let moved = quarantined_files(dir.path());
    assert_eq!(moved.len(), 1);
    assert_eq!(
        outcome.source,
        LoadSource::Quarantined {
            moved_to: Some(moved[0].clone())
        }
    );
    let preserved = fs::read_to_string(&moved[0]).expect("read quarantined");
    assert!(preserved.starts_with(r#"{"schemaVersion":2"#));
}

#[test]
fn empty_session_list_is_treated_as_corrupt() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("sessions.json");
    fs::write(&path, r#"{"schemaVersion":2,"activeSessionID":null,"sessions":[]}"#)
        .expect("write");

    let outcome = load_state(&path);
    assert!(matches!(outcome.source, LoadSource::Quarantined { .. }));
    assert_eq!(quarantined_files(dir.path()).len(), 1);
}

#[test]
fn legacy_numeric_timestamps_are_decoded_and_flagged_for_upgrade() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("sessions.json");
    let session_id = Uuid::new_v4();
    let legacy = serde_json::json!({
        "schemaVersion": LEGACY_SCHEMA_VERSION,
        "activeSessionID": session_id,
        "sessions": [{
            "id": session_id,
            "createdAt": 0.0,
            "lastActivityAt": 86400.5,
            "profileSnapshot": { "profileName": "Default", "systemPromptText": "Hi" },
            "messages": [{
                "id": Uuid::new_v4(),
                "role": "user",
                "content": "Hello",
                "createdAt": 60.0
            }],
            "title": null
        }]
    });
    fs::write(&path, legacy.to_string()).expect("write");

    let outcome = load_state(&path);

    assert!(outcome.needs_upgrade());
    assert_eq!(outcome.state.schema_version, CURRENT_SCHEMA_VERSION);
    let session = &outcome.state.sessions[0];
    assert_eq!(session.created_at.to_rfc3339(), "2001-01-01T00:00:00+00:00");
    assert_eq!(session.last_activity_at.timestamp(), REFERENCE_EPOCH_UNIX_SECS + 86400);
    assert_eq!(session.last_activity_at.timestamp_subsec_millis(), 500);
    assert_eq!(session.messages[0].content, "Hello");
    assert_eq!(outcome.state.active_session_id, Some(session_id));
}

#[test]
fn reference_timestamps_outside_the_calendar_are_rejected() {
    assert!(legacy::reference_timestamp(f64::NAN).is_none());
    assert!(legacy::reference_timestamp(f64::INFINITY).is_none());
    assert!(legacy::reference_timestamp(1e30).is_none());
    assert!(legacy::reference_timestamp(-1e30).is_none());
    assert!(legacy::reference_timestamp(i64::MAX as f64 - 1.0).is_none());

    let parsed = legacy::reference_timestamp(-0.25).expect("before the reference date");
    assert_eq!(parsed.timestamp(), REFERENCE_EPOCH_UNIX_SECS - 1);
    assert_eq!(parsed.timestamp_subsec_millis(), 750);
}

#[test]
fn legacy_file_with_huge_timestamp_is_quarantined() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("sessions.json");
    let session_id = Uuid::new_v4();
    let legacy = serde_json::json!({
        "schemaVersion": LEGACY_SCHEMA_VERSION,
        "activeSessionID": session_id,
        "sessions": [{
            "id": session_id,
            "createdAt": 1e30,
            "lastActivityAt": 0.0,
            "profileSnapshot": { "profileName": "Default", "systemPromptText": "Hi" },
            "messages": [],
            "title": null
        }]
    });
    fs::write(&path, legacy.to_string()).expect("write");

    let outcome = load_state(&path);

    assert!(outcome.state.sessions.is_empty());
    assert!(matches!(
        &outcome.source,
        LoadSource::Quarantined { moved_to: Some(moved) } if moved.exists()
    ));
    assert!(!path.exists());
    assert_eq!(quarantined_files(dir.path()).len(), 1);
}

#[test]
fn dangling_active_pointer_heals_to_most_recent_session() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("sessions.json");
    let mut state = sample_state();
    state.sessions[0].last_activity_at = Utc::now() + chrono::Duration::hours(1);
    let most_recent = state.sessions[0].id;
    state.active_session_id = Some(Uuid::new_v4());
    write_state_atomic(&path, &state).expect("write");

    let outcome = load_state(&path);
    assert_eq!(outcome.state.active_session_id, Some(most_recent));
}

#[test]
fn missing_active_pointer_heals_to_first_on_ties() {
    let mut state = sample_state();
    let stamp = Utc::now();
    for session in &mut state.sessions {
        session.last_activity_at = stamp;
    }
    state.active_session_id = None;
    state.heal_active_session();
    assert_eq!(state.active_session_id, Some(state.sessions[0].id));
}

#[tokio::test]
async fn schedule_save_coalesces_bursts_into_latest_snapshot() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("sessions.json");
    let mut gateway = PersistenceGateway::new(&path, Duration::from_millis(50));

    let mut state = sample_state();
    gateway.schedule_save(state.clone());
    state.sessions[0].title = Some("Renamed".into());
    gateway.schedule_save(state.clone());
    assert!(has_pending_save(&gateway));
    assert!(!path.exists());

    tokio::time::sleep(Duration::from_millis(300)).await;

    let outcome = load_state(&path);
    assert_eq!(outcome.state, state);
}

#[tokio::test]
async fn save_now_cancels_pending_debounced_write() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("sessions.json");
    let mut gateway = PersistenceGateway::new(&path, Duration::from_millis(100));

    let stale = sample_state();
    gateway.schedule_save(stale.clone());

    let mut fresh = stale.clone();
    fresh.sessions.remove(0);
    gateway.save_now(fresh.clone()).await.expect("join");
    assert!(!has_pending_save(&gateway));

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(load_state(&path).state, fresh);
}

#[tokio::test]
async fn older_generation_never_overwrites_newer_write() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("sessions.json");
    let gateway = PersistenceGateway::new(&path, Duration::from_millis(10));

    let newer = sample_state();
    let mut older = newer.clone();
    older.sessions.truncate(1);

    assert!(gateway.writer.write(newer.clone(), 2).await.expect("write"));
    assert!(!gateway.writer.write(older, 1).await.expect("write"));
    assert_eq!(load_state(&path).state, newer);
}

#[tokio::test]
async fn flush_writes_synchronously() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("sessions.json");
    let mut gateway = PersistenceGateway::new(&path, Duration::from_secs(60));

    let state = sample_state();
    gateway.schedule_save(state.clone());
    gateway.flush(state.clone()).await.expect("flush");

    assert!(!has_pending_save(&gateway));
    assert_eq!(load_state(&path).state, state);
}
