//! In-memory session registry.
//!
//! The live map from PID to tracked session; single source of truth while
//! the daemon runs. Owned by one daemon process and mutated only from its
//! cooperative tasks, so a plain mutex held across no await points is
//! enough. Markers on disk are a projection of this map, never the other
//! way around (except during startup reattachment).

use std::collections::HashMap;
use std::sync::Mutex;

/// Provenance string for sessions this daemon spawned itself.
pub const STARTED_BY_DAEMON: &str = "daemon";

/// Default provenance for sessions adopted from disk markers.
pub const STARTED_BY_REATTACHED: &str = "reattached";

/// Default provenance for sessions that reported in without being spawned
/// by the daemon.
pub const STARTED_BY_EXTERNAL: &str = "started outside daemon";

/// A live, supervised session process.
#[derive(Debug, Clone)]
pub struct TrackedSession {
    pub pid: u32,
    /// `"daemon"` for our own spawns, else a free-form provenance string.
    pub started_by: String,
    /// Set once the subprocess self-reports through the webhook.
    pub happy_session_id: Option<String>,
    /// Fingerprint of the command line at last confirmation; required
    /// before any by-PID signal to a process we don't hold a handle for.
    pub process_command_hash: Option<String>,
    /// True while the daemon's exit-monitor task holds the OS child
    /// handle; enables direct signal delivery without the safety gate.
    pub owns_child: bool,
    /// `session:window` identifier when running inside tmux.
    pub tmux_session_ref: Option<String>,
    /// Entries adopted from disk markers are never trusted for
    /// unconditional kill, whatever later reports say about them.
    pub reattached_from_disk_marker: bool,
    pub directory_created: bool,
    /// Informational note surfaced to the caller, e.g. why a tmux launch
    /// fell back to a direct spawn.
    pub message: Option<String>,
    /// Free-form metadata from the session's last self-report.
    pub metadata: Option<serde_json::Value>,
}

impl TrackedSession {
    pub fn daemon_spawned(pid: u32) -> Self {
        Self {
            pid,
            started_by: STARTED_BY_DAEMON.to_string(),
            happy_session_id: None,
            process_command_hash: None,
            owns_child: false,
            tmux_session_ref: None,
            reattached_from_disk_marker: false,
            directory_created: false,
            message: None,
            metadata: None,
        }
    }

    pub fn external(pid: u32, started_by: impl Into<String>) -> Self {
        Self {
            started_by: started_by.into(),
            ..Self::daemon_spawned(pid)
        }
    }
}

/// PID-keyed map of tracked sessions.
pub struct SessionRegistry {
    inner: Mutex<HashMap<u32, TrackedSession>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, session: TrackedSession) {
        self.lock().insert(session.pid, session);
    }

    pub fn get(&self, pid: u32) -> Option<TrackedSession> {
        self.lock().get(&pid).cloned()
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.lock().contains_key(&pid)
    }

    /// Linear scan is fine here; session counts are bounded by however
    /// many interactive agents a person runs at once.
    pub fn find_by_session_id(&self, happy_session_id: &str) -> Option<TrackedSession> {
        self.lock()
            .values()
            .find(|s| s.happy_session_id.as_deref() == Some(happy_session_id))
            .cloned()
    }

    /// Apply `update` to the entry for `pid`, if present.
    pub fn update<F>(&self, pid: u32, update: F) -> bool
    where
        F: FnOnce(&mut TrackedSession),
    {
        let mut map = self.lock();
        match map.get_mut(&pid) {
            Some(session) => {
                update(session);
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, pid: u32) -> Option<TrackedSession> {
        self.lock().remove(&pid)
    }

    pub fn snapshot(&self) -> Vec<TrackedSession> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u32, TrackedSession>> {
        // A poisoned registry means a panic mid-update; the map itself is
        // still structurally sound, so recover rather than cascade.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let registry = SessionRegistry::new();
        registry.insert(TrackedSession::daemon_spawned(100));
        assert!(registry.contains(100));
        assert_eq!(registry.get(100).unwrap().started_by, STARTED_BY_DAEMON);
        assert!(registry.get(200).is_none());
    }

    #[test]
    fn test_find_by_session_id() {
        let registry = SessionRegistry::new();
        let mut session = TrackedSession::daemon_spawned(100);
        session.happy_session_id = Some("sess_1".to_string());
        registry.insert(session);

        assert_eq!(registry.find_by_session_id("sess_1").unwrap().pid, 100);
        assert!(registry.find_by_session_id("sess_2").is_none());
    }

    #[test]
    fn test_update_in_place() {
        let registry = SessionRegistry::new();
        registry.insert(TrackedSession::daemon_spawned(100));

        let updated = registry.update(100, |s| {
            s.happy_session_id = Some("sess_1".to_string());
        });
        assert!(updated);
        assert_eq!(
            registry.get(100).unwrap().happy_session_id.as_deref(),
            Some("sess_1")
        );

        assert!(!registry.update(999, |_| {}));
    }

    #[test]
    fn test_remove_and_snapshot() {
        let registry = SessionRegistry::new();
        registry.insert(TrackedSession::daemon_spawned(1));
        registry.insert(TrackedSession::external(2, "terminal"));
        assert_eq!(registry.len(), 2);

        let removed = registry.remove(1).unwrap();
        assert_eq!(removed.pid, 1);
        assert_eq!(registry.snapshot().len(), 1);
    }
}
