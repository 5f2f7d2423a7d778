//! Reattachment behavior: disk markers are adopted only when every
//! verification gate passes, and only dead-PID markers are collected.

mod common;

use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;

use common::{FakeProcessTable, ScriptedClassifier};
use happyd::{hash_command, DaemonConfig, MarkerStore, SessionMarker, Supervisor};

fn config(dir: &TempDir) -> DaemonConfig {
    DaemonConfig::from_env().with_home_dir(dir.path())
}

fn write_marker(dir: &TempDir, pid: u32, session_id: &str, command_hash: Option<&str>) {
    let store = MarkerStore::new(
        dir.path().join("daemon-sessions"),
        dir.path().to_path_buf(),
    );
    store
        .write(&SessionMarker {
            pid,
            happy_session_id: session_id.to_string(),
            happy_home_dir: dir.path().to_path_buf(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            flavor: None,
            started_by: None,
            cwd: None,
            process_command_hash: command_hash.map(String::from),
            process_command: None,
            metadata: None,
        })
        .unwrap();
}

fn marker_exists(dir: &TempDir, pid: u32) -> bool {
    dir.path()
        .join(format!("daemon-sessions/pid-{}.json", pid))
        .exists()
}

#[test]
fn test_empty_marker_directory_adopts_nothing() {
    let dir = TempDir::new().unwrap();
    let supervisor = Supervisor::builder(config(&dir)).build();

    let outcome = supervisor.reattach();
    assert_eq!(outcome.adopted, 0);
    assert_eq!(outcome.eligible, 0);
    assert!(supervisor.list_sessions().is_empty());
}

#[test]
fn test_verified_marker_is_adopted() {
    let dir = TempDir::new().unwrap();
    let command = "claude --resume sess_a";
    write_marker(&dir, 4321, "sess_a", Some(&hash_command(command)));

    let classifier = Arc::new(ScriptedClassifier::new());
    classifier.set(4321, "daemon-spawned-session", command);
    let supervisor = Supervisor::builder(config(&dir))
        .classifier(classifier)
        .process_control(Arc::new(FakeProcessTable::new(&[4321])))
        .build();

    let outcome = supervisor.reattach();
    assert_eq!(outcome.adopted, 1);
    assert_eq!(outcome.eligible, 1);

    let sessions = supervisor.list_sessions();
    assert_eq!(sessions.len(), 1);
    let adopted = &sessions[0];
    assert_eq!(adopted.pid, 4321);
    assert!(adopted.reattached_from_disk_marker);
    assert_eq!(adopted.happy_session_id.as_deref(), Some("sess_a"));
    assert_eq!(
        adopted.process_command_hash.as_deref(),
        Some(hash_command(command).as_str())
    );
    assert_eq!(adopted.started_by, "reattached");
}

#[test]
fn test_hash_mismatch_skips_but_keeps_marker() {
    let dir = TempDir::new().unwrap();
    write_marker(&dir, 4321, "sess_a", Some(&hash_command("claude --resume sess_a")));

    // The PID is alive but another session process occupies it now.
    let classifier = Arc::new(ScriptedClassifier::new());
    classifier.set(4321, "daemon-spawned-session", "some-other-command");
    let supervisor = Supervisor::builder(config(&dir))
        .classifier(classifier)
        .process_control(Arc::new(FakeProcessTable::new(&[4321])))
        .build();

    let outcome = supervisor.reattach();
    assert_eq!(outcome.adopted, 0);
    assert_eq!(outcome.eligible, 1);
    assert!(supervisor.list_sessions().is_empty());
    assert!(marker_exists(&dir, 4321));
}

#[test]
fn test_dead_pid_marker_is_garbage_collected() {
    let dir = TempDir::new().unwrap();
    write_marker(&dir, 5000, "sess_dead", Some("deadbeef"));

    let supervisor = Supervisor::builder(config(&dir))
        .process_control(Arc::new(FakeProcessTable::new(&[])))
        .build();

    let outcome = supervisor.reattach();
    assert_eq!(outcome.adopted, 0);
    assert_eq!(outcome.eligible, 0);
    assert!(!marker_exists(&dir, 5000));
}

#[test]
fn test_disallowed_process_kind_is_not_eligible() {
    let dir = TempDir::new().unwrap();
    let command = "bash -l";
    write_marker(&dir, 60, "sess_b", Some(&hash_command(command)));

    let classifier = Arc::new(ScriptedClassifier::new());
    classifier.set(60, "bash", command);
    let supervisor = Supervisor::builder(config(&dir))
        .classifier(classifier)
        .process_control(Arc::new(FakeProcessTable::new(&[60])))
        .build();

    let outcome = supervisor.reattach();
    assert_eq!(outcome.adopted, 0);
    assert_eq!(outcome.eligible, 0);
    assert!(marker_exists(&dir, 60));
}

#[test]
fn test_marker_without_hash_is_never_adopted() {
    let dir = TempDir::new().unwrap();
    write_marker(&dir, 70, "sess_c", None);

    let classifier = Arc::new(ScriptedClassifier::new());
    classifier.set(70, "user-session", "claude");
    let supervisor = Supervisor::builder(config(&dir))
        .classifier(classifier)
        .process_control(Arc::new(FakeProcessTable::new(&[70])))
        .build();

    let outcome = supervisor.reattach();
    assert_eq!(outcome.adopted, 0);
    assert_eq!(outcome.eligible, 1);
    assert!(supervisor.list_sessions().is_empty());
}

#[test]
fn test_markers_from_other_home_are_ignored() {
    let dir = TempDir::new().unwrap();
    let other = TempDir::new().unwrap();
    // Marker written under our markers dir but namespaced to another home.
    let store = MarkerStore::new(
        dir.path().join("daemon-sessions"),
        other.path().to_path_buf(),
    );
    store
        .write(&SessionMarker {
            pid: 80,
            happy_session_id: "sess_foreign".to_string(),
            happy_home_dir: other.path().to_path_buf(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            flavor: None,
            started_by: None,
            cwd: None,
            process_command_hash: Some("abc".to_string()),
            process_command: None,
            metadata: None,
        })
        .unwrap();

    let classifier = Arc::new(ScriptedClassifier::new());
    classifier.set(80, "user-session", "claude");
    let supervisor = Supervisor::builder(config(&dir))
        .classifier(classifier)
        .process_control(Arc::new(FakeProcessTable::new(&[80])))
        .build();

    let outcome = supervisor.reattach();
    assert_eq!(outcome.adopted, 0);
    assert_eq!(outcome.eligible, 0);
}
