//! Stop and exit handling.
//!
//! Two termination paths with very different trust levels: daemon-owned
//! children are signaled directly (the unreaped child handle pins the PID,
//! so it cannot have been reused), while external or reattached sessions
//! must pass the PID safety gate first. Refusal is silent-safe; under
//! uncertainty the correct action is no action.

use chrono::Utc;
use tracing::{debug, info, warn};

use happyd_proto::{SessionEndEvent, SessionExit, EXIT_OBSERVED_BY_DAEMON};

use crate::safety::is_pid_safe;
use crate::supervisor::Supervisor;

impl Supervisor {
    /// Handle a `stopSession` request. Returns whether a termination
    /// signal was actually sent.
    ///
    /// `session_id` is normally a happy session id; a `PID-<n>` literal is
    /// accepted as a fallback for sessions that never confirmed one.
    pub async fn stop_session(&self, session_id: &str) -> bool {
        let session = match self.registry.find_by_session_id(session_id) {
            Some(session) => session,
            None => match parse_pid_literal(session_id).and_then(|pid| self.registry.get(pid)) {
                Some(session) => session,
                None => {
                    debug!(session_id, "stop requested for unknown session");
                    return false;
                }
            },
        };
        let pid = session.pid;

        // A held child handle is the only authority that bypasses the
        // safety gate: the unreaped child pins the PID, and delivery goes
        // through that handle. Everything else, including an owned entry
        // whose handle is already gone, re-verifies the PID first.
        let handle_delivered = session.owns_child && self.signal_owned_child(pid);
        if handle_delivered {
            info!(pid, session_id, "session stop delivered through child handle");
            self.registry.remove(pid);
            return true;
        }

        let safe = is_pid_safe(
            self.classifier.as_ref(),
            pid,
            session.process_command_hash.as_deref(),
        );
        let verifiable =
            session.process_command_hash.is_some() || !session.reattached_from_disk_marker;
        if !safe || !verifiable {
            warn!(
                pid,
                session_id,
                reattached = session.reattached_from_disk_marker,
                "refusing to signal unverified pid"
            );
            return false;
        }

        if !self.process.terminate(pid) {
            warn!(pid, session_id, "termination signal was not delivered");
        }
        info!(pid, session_id, "session stop signaled by pid");

        // Removed immediately after signaling; external PIDs are simply
        // not tracked further.
        self.registry.remove(pid);
        self.run_cleanup(pid);
        if let Err(e) = self.markers.remove(pid) {
            warn!(pid, error = %e, "failed to remove marker after stop");
        }
        true
    }

    /// React to a daemon-owned child's exit: report upstream when the
    /// session has a confirmed id, then tear down awaiter, cleanup
    /// callback, registry entry, and marker.
    pub async fn on_child_exited(&self, pid: u32, code: Option<i32>, signal: Option<i32>) {
        self.awaiters.resolve(pid, crate::rendezvous::SpawnSignal::ChildExited { code, signal });

        let session = self.registry.remove(pid);
        match session.as_ref().and_then(|s| s.happy_session_id.as_deref()) {
            Some(sid) => {
                info!(pid, session_id = %sid, ?code, ?signal, "tracked child exited");
                let event = SessionEndEvent {
                    sid: sid.to_string(),
                    time: Utc::now().timestamp_millis(),
                    exit: SessionExit {
                        observed_by: EXIT_OBSERVED_BY_DAEMON.to_string(),
                        pid,
                        reason: if signal.is_some() { "signal" } else { "exit" }.to_string(),
                        code,
                        signal,
                    },
                };
                self.control_plane.emit_session_end(event).await;
            }
            None => {
                // The control plane has no record to update for a session
                // that never confirmed an id.
                debug!(pid, ?code, ?signal, "unconfirmed child exited, not reporting upstream");
            }
        }

        self.run_cleanup(pid);
        if let Err(e) = self.markers.remove(pid) {
            warn!(pid, error = %e, "failed to remove marker after child exit");
        }
    }
}

/// Parse the `PID-<n>` literal fallback form of a session id.
fn parse_pid_literal(session_id: &str) -> Option<u32> {
    session_id.strip_prefix("PID-")?.parse().ok()
}
