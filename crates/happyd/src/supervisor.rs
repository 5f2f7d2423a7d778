//! The session supervisor.
//!
//! One `Supervisor` instance owns all mutable daemon state: the in-memory
//! registry, the marker store, the pending spawn awaiters, and per-PID
//! cleanup callbacks. Handlers (spawn, webhook, stop, reattach) are
//! methods on this struct rather than free functions over globals, so
//! tests construct fresh instances with mock collaborators.

use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::process::Child;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use happyd_proto::SessionEndEvent;

use crate::classify::ProcessClassifier;
use crate::config::DaemonConfig;
use crate::error::DaemonError;
use crate::lock::DaemonLock;
use crate::marker::MarkerStore;
use crate::process::{ProcessControl, UnixProcessControl};
use crate::reattach::ReattachOutcome;
use crate::registry::{SessionRegistry, TrackedSession};
use crate::rendezvous::SpawnAwaiters;
use crate::spawn::{CommandPlanner, DefaultResumeSupport, VendorResumeSupport};
use crate::tmux::TmuxControl;

/// Outbound channel to the remote control plane.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Notify the control plane that a supervised session's process ended.
    async fn emit_session_end(&self, event: SessionEndEvent);
}

/// Control plane that drops events on the floor; used when the daemon runs
/// without an upstream connection and in tests.
pub struct NullControlPlane;

#[async_trait]
impl ControlPlane for NullControlPlane {
    async fn emit_session_end(&self, event: SessionEndEvent) {
        debug!(sid = %event.sid, pid = event.exit.pid, "session end (no control plane attached)");
    }
}

/// Classifier that can identify nothing. The safety gate treats every PID
/// as unsafe under it, so a misconfigured supervisor refuses to signal
/// rather than guessing.
pub struct DenyAllClassifier;

impl ProcessClassifier for DenyAllClassifier {
    fn classify(&self, _pid: u32) -> Option<crate::classify::ClassifiedProcess> {
        None
    }
}

type Cleanup = Box<dyn FnOnce() + Send>;

pub struct Supervisor {
    pub(crate) config: DaemonConfig,
    pub(crate) registry: SessionRegistry,
    pub(crate) markers: MarkerStore,
    pub(crate) awaiters: SpawnAwaiters,
    cleanups: Mutex<HashMap<u32, Cleanup>>,
    kill_switches: Mutex<HashMap<u32, oneshot::Sender<()>>>,
    pub(crate) classifier: Arc<dyn ProcessClassifier>,
    pub(crate) process: Arc<dyn ProcessControl>,
    pub(crate) tmux: Arc<dyn TmuxControl>,
    pub(crate) planner: Arc<dyn CommandPlanner>,
    pub(crate) resume_support: Arc<dyn VendorResumeSupport>,
    pub(crate) control_plane: Arc<dyn ControlPlane>,
    shutting_down: AtomicBool,
}

impl Supervisor {
    pub fn builder(config: DaemonConfig) -> SupervisorBuilder {
        SupervisorBuilder::new(config)
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Prepare the home directory, take the singleton lock, and adopt any
    /// still-running sessions from disk markers. Must complete before the
    /// daemon accepts spawn or stop requests. The returned lock guards the
    /// home directory for the daemon's lifetime.
    pub fn startup(&self) -> Result<(DaemonLock, ReattachOutcome), DaemonError> {
        fs::create_dir_all(&self.config.home_dir)
            .map_err(|e| DaemonError::HomeSetup(e.to_string()))?;
        fs::create_dir_all(self.config.markers_dir())
            .map_err(|e| DaemonError::HomeSetup(e.to_string()))?;

        let lock = DaemonLock::acquire(&self.config.lock_path())?;
        let outcome = self.reattach();
        info!(
            adopted = outcome.adopted,
            eligible = outcome.eligible,
            "daemon startup complete"
        );
        Ok((lock, outcome))
    }

    /// Snapshot of every tracked session, for listing.
    pub fn list_sessions(&self) -> Vec<TrackedSession> {
        self.registry.snapshot()
    }

    /// Begin daemon shutdown. Children keep running; their markers stay on
    /// disk so the next daemon generation reattaches to them.
    pub fn request_shutdown(&self) {
        if !self.shutting_down.swap(true, Ordering::SeqCst) {
            info!(
                tracked = self.registry.len(),
                "shutdown requested, leaving session processes running"
            );
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Register a cleanup callback to run when `pid`'s child exits or is
    /// stopped. Replaces any previous callback for the PID.
    pub(crate) fn register_cleanup(&self, pid: u32, cleanup: Cleanup) {
        self.lock_cleanups().insert(pid, cleanup);
    }

    /// Remove and run the cleanup callback for `pid`, if any.
    pub(crate) fn run_cleanup(&self, pid: u32) {
        if let Some(cleanup) = self.lock_cleanups().remove(&pid) {
            cleanup();
        }
    }

    /// Watch a daemon-owned child until it exits, then feed the exit into
    /// the stop/exit handling path. Holding the `Child` here keeps the
    /// process unreaped, which pins the PID against reuse for as long as
    /// the session is tracked; termination requests from the stop path
    /// arrive through the kill switch and are delivered through this same
    /// handle, never by a raw PID signal.
    pub(crate) fn monitor_child(self: &Arc<Self>, pid: u32, mut child: Child) {
        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();
        self.lock_kill_switches().insert(pid, kill_tx);

        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            let waited = tokio::select! {
                status = child.wait() => status,
                _ = &mut kill_rx => {
                    if let Err(e) = child.start_kill() {
                        warn!(pid, error = %e, "failed to kill owned child");
                    }
                    child.wait().await
                }
            };
            supervisor.lock_kill_switches().remove(&pid);

            let (code, signal) = match waited {
                Ok(status) => (status.code(), exit_signal(&status)),
                Err(e) => {
                    warn!(pid, error = %e, "failed to await child exit");
                    (None, None)
                }
            };
            supervisor.on_child_exited(pid, code, signal).await;
        });
    }

    /// Request termination of a daemon-owned child through its held
    /// handle. Returns false when no handle exists for `pid` (the child
    /// already exited, or it was never ours); callers must then fall back
    /// to the safety-gated by-PID path.
    pub(crate) fn signal_owned_child(&self, pid: u32) -> bool {
        match self.lock_kill_switches().remove(&pid) {
            Some(kill_tx) => kill_tx.send(()).is_ok(),
            None => false,
        }
    }

    fn lock_cleanups(&self) -> std::sync::MutexGuard<'_, HashMap<u32, Cleanup>> {
        self.cleanups.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_kill_switches(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<u32, oneshot::Sender<()>>> {
        self.kill_switches.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

/// Wires a [`Supervisor`] together. Every collaborator has a conservative
/// default so partial wiring degrades to inaction, never to unsafe action.
pub struct SupervisorBuilder {
    config: DaemonConfig,
    classifier: Arc<dyn ProcessClassifier>,
    process: Arc<dyn ProcessControl>,
    tmux: Option<Arc<dyn TmuxControl>>,
    planner: Option<Arc<dyn CommandPlanner>>,
    resume_support: Arc<dyn VendorResumeSupport>,
    control_plane: Arc<dyn ControlPlane>,
}

impl SupervisorBuilder {
    pub fn new(config: DaemonConfig) -> Self {
        Self {
            config,
            classifier: Arc::new(DenyAllClassifier),
            process: Arc::new(UnixProcessControl),
            tmux: None,
            planner: None,
            resume_support: Arc::new(DefaultResumeSupport),
            control_plane: Arc::new(NullControlPlane),
        }
    }

    pub fn classifier(mut self, classifier: Arc<dyn ProcessClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn process_control(mut self, process: Arc<dyn ProcessControl>) -> Self {
        self.process = process;
        self
    }

    pub fn tmux(mut self, tmux: Arc<dyn TmuxControl>) -> Self {
        self.tmux = Some(tmux);
        self
    }

    pub fn planner(mut self, planner: Arc<dyn CommandPlanner>) -> Self {
        self.planner = Some(planner);
        self
    }

    pub fn resume_support(mut self, resume_support: Arc<dyn VendorResumeSupport>) -> Self {
        self.resume_support = resume_support;
        self
    }

    pub fn control_plane(mut self, control_plane: Arc<dyn ControlPlane>) -> Self {
        self.control_plane = control_plane;
        self
    }

    pub fn build(self) -> Arc<Supervisor> {
        let markers = MarkerStore::new(self.config.markers_dir(), self.config.home_dir.clone());
        Arc::new(Supervisor {
            markers,
            registry: SessionRegistry::new(),
            awaiters: SpawnAwaiters::new(),
            cleanups: Mutex::new(HashMap::new()),
            kill_switches: Mutex::new(HashMap::new()),
            classifier: self.classifier,
            process: self.process,
            tmux: self
                .tmux
                .unwrap_or_else(|| Arc::new(crate::tmux::TmuxUnavailable)),
            planner: self
                .planner
                .unwrap_or_else(|| Arc::new(crate::spawn::AgentCommandPlanner)),
            resume_support: self.resume_support,
            control_plane: self.control_plane,
            shutting_down: AtomicBool::new(false),
            config: self.config,
        })
    }
}
