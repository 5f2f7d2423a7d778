//! Webhook ingest.
//!
//! The only writer of confirmed session identity. A subprocess announces
//! itself here once its agent CLI has finished initializing; the report is
//! reconciled with the registry, any pending spawn awaiter, and the marker
//! store.

use chrono::Utc;
use tracing::{debug, info, warn};

use happyd_proto::SessionReport;

use crate::command_hash::hash_command;
use crate::marker::SessionMarker;
use crate::registry::{TrackedSession, STARTED_BY_EXTERNAL};
use crate::rendezvous::SpawnSignal;
use crate::supervisor::Supervisor;

impl Supervisor {
    /// Handle a subprocess self-report.
    ///
    /// Reports from another home-directory namespace or without a PID are
    /// rejected outright. Everything after registry reconciliation is
    /// best-effort; a failed marker write degrades reattach recall, never
    /// the report itself.
    pub async fn on_session_report(&self, report: SessionReport) {
        if report.happy_home_dir != self.config.home_dir {
            warn!(
                session_id = %report.session_id,
                reported_home = %report.happy_home_dir.display(),
                "ignoring session report from another daemon home"
            );
            return;
        }
        let Some(pid) = report.host_pid else {
            warn!(session_id = %report.session_id, "ignoring session report without a pid");
            return;
        };

        match self.registry.get(pid) {
            Some(existing) if existing.reattached_from_disk_marker => {
                // Refresh identity but keep the kill-protection flag; a
                // reattached entry is never promoted to unconditionally
                // killable by anything it says about itself.
                self.registry.update(pid, |session| {
                    session.happy_session_id = Some(report.session_id.clone());
                    session.metadata = report.metadata.clone();
                    if let Some(started_by) = &report.started_by {
                        session.started_by = started_by.clone();
                    }
                });
                debug!(pid, session_id = %report.session_id, "refreshed reattached session");
            }
            Some(_) => {
                self.registry.update(pid, |session| {
                    session.happy_session_id = Some(report.session_id.clone());
                    session.metadata = report.metadata.clone();
                });
                if self.awaiters.resolve(
                    pid,
                    SpawnSignal::WebhookConfirmed {
                        session_id: report.session_id.clone(),
                    },
                ) {
                    debug!(pid, session_id = %report.session_id, "resolved pending spawn");
                }
            }
            None => {
                let started_by = report
                    .started_by
                    .clone()
                    .unwrap_or_else(|| STARTED_BY_EXTERNAL.to_string());
                info!(
                    pid,
                    session_id = %report.session_id,
                    started_by = %started_by,
                    "registering externally started session"
                );
                let mut session = TrackedSession::external(pid, started_by);
                session.happy_session_id = Some(report.session_id.clone());
                session.metadata = report.metadata.clone();
                self.registry.insert(session);
            }
        }

        self.refresh_marker(pid, &report);
    }

    /// Classify the PID for a fresh command fingerprint and persist the
    /// marker. Advisory durability: failures are logged and swallowed.
    fn refresh_marker(&self, pid: u32, report: &SessionReport) {
        let classified = self.classifier.classify(pid);
        let (command_hash, command) = match classified {
            Some(observed) => (Some(hash_command(&observed.command)), Some(observed.command)),
            None => {
                debug!(pid, "could not classify reporting process for marker fingerprint");
                (None, None)
            }
        };

        if let Some(hash) = &command_hash {
            self.registry.update(pid, |session| {
                session.process_command_hash = Some(hash.clone());
            });
        }

        let started_by = self.registry.get(pid).map(|s| s.started_by);
        let marker = SessionMarker {
            pid,
            happy_session_id: report.session_id.clone(),
            happy_home_dir: self.config.home_dir.clone(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            flavor: report.flavor,
            started_by,
            cwd: report.cwd.clone(),
            process_command_hash: command_hash,
            process_command: command,
            metadata: report.metadata.clone(),
        };
        if let Err(e) = self.markers.write(&marker) {
            warn!(pid, error = %e, "failed to persist session marker");
        }
    }
}
