//! Startup reattachment.
//!
//! Runs once, before the daemon accepts requests: every disk marker is a
//! claim about a PID, and every step here is a veto gate on that claim.
//! Any uncertainty answers "do not adopt"; the only destructive action is
//! garbage-collecting markers whose PID is provably dead.

use tracing::{debug, info, warn};

use crate::classify::is_allowed_kind;
use crate::command_hash::hash_command;
use crate::registry::{TrackedSession, STARTED_BY_REATTACHED};
use crate::supervisor::Supervisor;

/// Counters from one reattachment pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReattachOutcome {
    /// Markers that became registry entries.
    pub adopted: usize,
    /// Alive markers whose process classified as one of ours (before the
    /// hash checks).
    pub eligible: usize,
}

impl Supervisor {
    /// Cross-check every disk marker against the live process table and
    /// adopt the ones that verify.
    pub fn reattach(&self) -> ReattachOutcome {
        let mut adopted = 0;
        let mut eligible = 0;

        for marker in self.markers.list_all() {
            let pid = marker.pid;

            if !self.process.is_alive(pid) {
                debug!(pid, session_id = %marker.happy_session_id, "marker pid is dead, collecting marker");
                if let Err(e) = self.markers.remove(pid) {
                    warn!(pid, error = %e, "failed to remove stale marker");
                }
                continue;
            }

            let Some(observed) = self.classifier.classify(pid) else {
                debug!(pid, "alive but unclassifiable, not adopting");
                continue;
            };
            if !is_allowed_kind(&observed.kind) {
                debug!(pid, kind = %observed.kind, "not a session process, not adopting");
                continue;
            }
            eligible += 1;

            let Some(expected_hash) = &marker.process_command_hash else {
                debug!(pid, "marker carries no command hash, not adopting");
                continue;
            };
            if &hash_command(&observed.command) != expected_hash {
                // PID reuse: another process occupies this PID now. The
                // marker stays; only dead PIDs get their markers collected.
                warn!(pid, session_id = %marker.happy_session_id, "command hash mismatch, not adopting");
                continue;
            }

            if self.registry.contains(pid) {
                debug!(pid, "already tracked, skipping marker");
                continue;
            }

            let mut session = TrackedSession::external(
                pid,
                marker
                    .started_by
                    .clone()
                    .unwrap_or_else(|| STARTED_BY_REATTACHED.to_string()),
            );
            session.happy_session_id = Some(marker.happy_session_id.clone());
            session.process_command_hash = Some(expected_hash.clone());
            session.reattached_from_disk_marker = true;
            info!(pid, session_id = %marker.happy_session_id, "adopted session from marker");
            self.registry.insert(session);
            adopted += 1;
        }

        ReattachOutcome { adopted, eligible }
    }
}
