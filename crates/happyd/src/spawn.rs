//! Spawn orchestration.
//!
//! `spawn_session` is the longest path through the daemon: validate the
//! request, resolve the environment, pick a launch strategy (tmux or
//! direct), start the process, then hold the caller's result open until
//! the subprocess self-reports through the webhook, the child dies, or the
//! rendezvous times out. Failures are `SpawnResult` values; nothing on
//! this path propagates an error across the daemon boundary.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use chrono::Utc;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};
use uuid::Uuid;

use happyd_proto::{AgentFlavor, SpawnErrorCode, SpawnResult};

use crate::env_layers::{self, EnvLayer};
use crate::registry::TrackedSession;
use crate::rendezvous::SpawnSignal;
use crate::safety::is_pid_safe;
use crate::supervisor::Supervisor;
use crate::tmux::{self, TmuxTarget};

/// Encryption variants the daemon accepts when resuming a session.
pub const KNOWN_ENCRYPTION_VARIANTS: &[&str] = &["legacy", "dataKey"];

/// Points the subprocess at its attach file.
pub const ATTACH_FILE_ENV: &str = "HAPPY_SESSION_ATTACH_FILE";

/// Set on the subprocess when a requested tmux launch fell back to a
/// direct spawn, carrying the reason, so the CLI can report the degraded
/// launch to the user.
pub const TMUX_FALLBACK_ENV: &str = "HAPPY_TMUX_FALLBACK_REASON";

/// A `spawnSession` request as received from the control plane.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub flavor: AgentFlavor,
    pub cwd: PathBuf,
    /// Arguments passed through to the agent CLI untranslated.
    pub agent_args: Vec<String>,
    /// Caller-supplied profile environment; `${VAR}` references are
    /// expanded against the daemon's own environment before layering.
    pub env: HashMap<String, String>,
    pub existing_session_id: Option<String>,
    pub vendor_resume_token: Option<String>,
    pub encryption_key: Option<String>,
    pub encryption_variant: Option<String>,
    /// True when the caller already approved creating a missing `cwd`.
    pub approved_directory_creation: bool,
    pub use_tmux: bool,
    /// Explicit tmux session name; empty or absent means "resolve one".
    pub tmux_session: Option<String>,
}

impl SpawnRequest {
    pub fn new(flavor: AgentFlavor, cwd: impl Into<PathBuf>) -> Self {
        Self {
            flavor,
            cwd: cwd.into(),
            agent_args: Vec::new(),
            env: HashMap::new(),
            existing_session_id: None,
            vendor_resume_token: None,
            encryption_key: None,
            encryption_variant: None,
            approved_directory_creation: false,
            use_tmux: false,
            tmux_session: None,
        }
    }
}

/// Turns a spawn request into the argv tokens that launch the agent CLI.
///
/// Vendor-specific flag translation lives behind this trait; the daemon
/// only ever sees opaque tokens.
pub trait CommandPlanner: Send + Sync {
    /// `tokens[0]` is the program, the rest its arguments.
    fn plan(&self, request: &SpawnRequest) -> Vec<String>;
}

/// Launches the agent CLI by its flavor name with the caller's arguments
/// passed through as-is.
pub struct AgentCommandPlanner;

impl CommandPlanner for AgentCommandPlanner {
    fn plan(&self, request: &SpawnRequest) -> Vec<String> {
        let mut tokens = vec![request.flavor.as_str().to_string()];
        tokens.extend(request.agent_args.iter().cloned());
        tokens
    }
}

/// Per-agent predicate for vendor-level resume tokens.
pub trait VendorResumeSupport: Send + Sync {
    fn supports_resume(&self, flavor: AgentFlavor) -> bool;
}

/// Claude resume is stable; the other vendors' resume flows are still
/// experimental and stay disabled.
pub struct DefaultResumeSupport;

impl VendorResumeSupport for DefaultResumeSupport {
    fn supports_resume(&self, flavor: AgentFlavor) -> bool {
        matches!(flavor, AgentFlavor::Claude)
    }
}

struct Launched {
    pid: u32,
    child: Option<Child>,
    tmux_ref: Option<String>,
    /// Caller-visible launch note, e.g. the tmux fallback reason.
    message: Option<String>,
}

impl Supervisor {
    /// Handle a `spawnSession` request end to end.
    ///
    /// Returns only after the spawned process has confirmed itself through
    /// the webhook, exited, or run out the webhook-wait clock. Validation
    /// and environment failures return before any process is created.
    pub async fn spawn_session(self: &Arc<Self>, request: SpawnRequest) -> SpawnResult {
        if self.is_shutting_down() {
            return SpawnResult::error(
                SpawnErrorCode::SpawnValidationFailed,
                "daemon is shutting down",
            );
        }

        let bad_names = env_layers::invalid_var_names(&request.env);
        if !bad_names.is_empty() {
            return SpawnResult::error(
                SpawnErrorCode::InvalidEnvironmentVariables,
                format!(
                    "invalid environment variable names: {}",
                    bad_names.join(", ")
                ),
            );
        }

        if request.vendor_resume_token.is_some()
            && !self.resume_support.supports_resume(request.flavor)
        {
            return SpawnResult::error(
                SpawnErrorCode::ResumeNotSupported,
                format!("{} does not support resuming sessions", request.flavor),
            );
        }

        if let Some(session_id) = &request.existing_session_id {
            // Idempotency: a live, hash-verified process already carries
            // this session; re-verified at the moment of use, not from
            // cached state.
            if let Some(tracked) = self.registry.find_by_session_id(session_id) {
                if self.process.is_alive(tracked.pid)
                    && is_pid_safe(
                        self.classifier.as_ref(),
                        tracked.pid,
                        tracked.process_command_hash.as_deref(),
                    )
                {
                    info!(
                        pid = tracked.pid,
                        session_id = %session_id,
                        "session already running, skipping duplicate spawn"
                    );
                    return SpawnResult::Success {
                        session_id: session_id.clone(),
                    };
                }
            }

            let has_key = matches!(request.encryption_key.as_deref(), Some(key) if !key.is_empty());
            if !has_key {
                return SpawnResult::error(
                    SpawnErrorCode::ResumeMissingEncryptionKey,
                    format!("resuming session {} requires an encryption key", session_id),
                );
            }
            match request.encryption_variant.as_deref() {
                Some(variant) if KNOWN_ENCRYPTION_VARIANTS.contains(&variant) => {}
                other => {
                    return SpawnResult::error(
                        SpawnErrorCode::ResumeUnsupportedEncryptionVariant,
                        format!(
                            "unsupported encryption variant {:?} (known: {})",
                            other.unwrap_or("<none>"),
                            KNOWN_ENCRYPTION_VARIANTS.join(", ")
                        ),
                    );
                }
            }
        }

        let directory_created = match self.ensure_working_directory(&request) {
            Ok(created) => created,
            Err(result) => return result,
        };

        let mut env = match self.layered_environment(&request) {
            Ok(env) => env,
            Err(result) => return result,
        };

        let attach_file = self.write_attach_file(&request);
        if let Some(path) = &attach_file {
            env.insert(ATTACH_FILE_ENV.to_string(), path.display().to_string());
        }

        let launched = match self.launch(&request, &mut env).await {
            Ok(launched) => launched,
            Err(result) => {
                remove_attach_file(attach_file.as_deref());
                return result;
            }
        };

        let pid = launched.pid;
        let mut session = TrackedSession::daemon_spawned(pid);
        session.owns_child = launched.child.is_some();
        session.tmux_session_ref = launched.tmux_ref;
        session.directory_created = directory_created;
        session.message = launched.message;
        self.registry.insert(session);

        if let Some(path) = attach_file {
            self.register_cleanup(
                pid,
                Box::new(move || remove_attach_file(Some(path.as_path()))),
            );
        }

        // Awaiter first, then the exit monitor, so a fast-dying child
        // resolves the rendezvous instead of racing past it.
        let rendezvous = self.awaiters.register(pid);
        if let Some(child) = launched.child {
            self.monitor_child(pid, child);
        }

        match tokio::time::timeout(self.config.webhook_timeout, rendezvous).await {
            Ok(Ok(SpawnSignal::WebhookConfirmed { session_id })) => {
                info!(pid, session_id = %session_id, "spawned session confirmed");
                SpawnResult::Success { session_id }
            }
            Ok(Ok(SpawnSignal::ChildExited { code, signal })) => {
                // The exit handler already tore down registry, marker, and
                // attach state for this PID.
                warn!(pid, ?code, ?signal, "child exited before session webhook");
                SpawnResult::error(
                    SpawnErrorCode::ChildExitedBeforeWebhook,
                    format!("process {} exited before reporting a session", pid),
                )
            }
            Ok(Err(_)) => SpawnResult::error(
                SpawnErrorCode::Unexpected,
                "spawn awaiter dropped without a signal",
            ),
            Err(_) => {
                self.awaiters.cancel(pid);
                warn!(pid, timeout = ?self.config.webhook_timeout, "session webhook never arrived");
                SpawnResult::error(
                    SpawnErrorCode::SessionWebhookTimeout,
                    format!(
                        "process {} did not report a session within {} seconds",
                        pid,
                        self.config.webhook_timeout.as_secs()
                    ),
                )
            }
        }
    }

    /// Make sure `request.cwd` exists, asking for approval before creating
    /// it. Returns whether a directory was created.
    fn ensure_working_directory(&self, request: &SpawnRequest) -> Result<bool, SpawnResult> {
        if request.cwd.is_dir() {
            return Ok(false);
        }
        if request.cwd.exists() {
            return Err(SpawnResult::error(
                SpawnErrorCode::DirectoryCreateFailed,
                format!(
                    "{} exists but is not a directory",
                    request.cwd.display()
                ),
            ));
        }
        if !request.approved_directory_creation {
            return Err(SpawnResult::RequestToApproveDirectoryCreation {
                directory: request.cwd.clone(),
            });
        }
        match fs::create_dir_all(&request.cwd) {
            Ok(()) => Ok(true),
            Err(e) => Err(SpawnResult::error(
                SpawnErrorCode::DirectoryCreateFailed,
                describe_mkdir_failure(&request.cwd, &e),
            )),
        }
    }

    /// Build the subprocess environment: auth, then expanded profile
    /// variables, then auth again so profile data can never shadow
    /// credentials.
    fn layered_environment(
        &self,
        request: &SpawnRequest,
    ) -> Result<HashMap<String, String>, SpawnResult> {
        let auth = EnvLayer::new("auth", self.config.auth_env.clone());
        let profile = EnvLayer::new(
            "profile",
            env_layers::expand_references(&request.env, |name| std::env::var(name).ok()),
        );
        let mut env = env_layers::merge_layers(&[auth.clone(), profile, auth]);

        let dangling = env_layers::unexpanded_auth_vars(&env, &self.config.auth_var_names);
        if !dangling.is_empty() {
            return Err(SpawnResult::error(
                SpawnErrorCode::AuthEnvUnexpanded,
                format!(
                    "auth variables still contain unexpanded references: {}",
                    dangling.join(", ")
                ),
            ));
        }

        env.insert(
            "HAPPY_HOME_DIR".to_string(),
            self.config.home_dir.display().to_string(),
        );
        Ok(env)
    }

    /// Best-effort: write the per-session attach file the subprocess reads
    /// at startup. Returns `None` (and logs) on failure; spawning proceeds
    /// without one.
    fn write_attach_file(&self, request: &SpawnRequest) -> Option<PathBuf> {
        let dir = self.config.attach_dir();
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!(dir = %dir.display(), error = %e, "failed to create attach directory");
            return None;
        }
        let path = dir.join(format!("attach-{}.json", Uuid::new_v4().simple()));
        let body = serde_json::json!({
            "flavor": request.flavor.as_str(),
            "cwd": request.cwd,
            "createdAt": Utc::now().to_rfc3339(),
        });
        match serde_json::to_vec(&body) {
            Ok(bytes) => {
                if let Err(e) = fs::write(&path, bytes) {
                    warn!(path = %path.display(), error = %e, "failed to write attach file");
                    return None;
                }
                Some(path)
            }
            Err(e) => {
                warn!(error = %e, "failed to serialize attach file");
                None
            }
        }
    }

    /// Launch the agent process, preferring tmux when requested and
    /// available and falling back to a direct spawn otherwise.
    async fn launch(
        &self,
        request: &SpawnRequest,
        env: &mut HashMap<String, String>,
    ) -> Result<Launched, SpawnResult> {
        let tokens = self.planner.plan(request);
        if tokens.is_empty() {
            return Err(SpawnResult::error(
                SpawnErrorCode::SpawnValidationFailed,
                "command planner produced no launch tokens",
            ));
        }

        let mut launch_message = None;
        if request.use_tmux && self.tmux.available().await {
            let session_name = tmux::resolve_session_name(
                self.tmux.as_ref(),
                request.tmux_session.as_deref(),
                &self.config.default_tmux_session,
                self.config.tmux_discovery_budget,
            )
            .await;
            let target = TmuxTarget {
                session: session_name,
                window: tmux::window_name(request.flavor, Utc::now()),
            };

            let fallback_reason = match self.tmux.spawn_in_window(&tokens, &target, env).await {
                Ok(outcome) => match outcome.pid {
                    Some(pid) => {
                        info!(pid, target = %target.reference(), "session launched in tmux");
                        return Ok(Launched {
                            pid,
                            child: None,
                            tmux_ref: Some(target.reference()),
                            message: None,
                        });
                    }
                    None => "tmux spawn reported no pid".to_string(),
                },
                Err(e) => format!("tmux spawn failed: {}", e),
            };

            warn!(reason = %fallback_reason, "falling back to direct spawn");
            launch_message = Some(fallback_reason.clone());
            env.insert(TMUX_FALLBACK_ENV.to_string(), fallback_reason);
        }

        let mut command = Command::new(&tokens[0]);
        command
            .args(&tokens[1..])
            .envs(env.iter())
            .current_dir(&request.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return Err(SpawnResult::error(
                    SpawnErrorCode::SpawnFailed,
                    format!("failed to launch {}: {}", tokens[0], e),
                ));
            }
        };

        match child.id() {
            Some(pid) => Ok(Launched {
                pid,
                child: Some(child),
                tmux_ref: None,
                message: launch_message,
            }),
            None => {
                // Exited between spawn and the pid query; nothing to track.
                if let Err(e) = child.start_kill() {
                    debug!(error = %e, "kill on pid-less child failed");
                }
                Err(SpawnResult::error(
                    SpawnErrorCode::SpawnNoPid,
                    format!("launcher returned no pid for {}", tokens[0]),
                ))
            }
        }
    }
}

pub(crate) fn remove_attach_file(path: Option<&std::path::Path>) {
    let Some(path) = path else { return };
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!(path = %path.display(), error = %e, "failed to remove attach file");
        }
    }
}

fn describe_mkdir_failure(path: &std::path::Path, e: &std::io::Error) -> String {
    match e.raw_os_error() {
        Some(libc::EACCES) => format!("permission denied creating {}", path.display()),
        Some(libc::ENOTDIR) => format!(
            "a component of {} exists and is not a directory",
            path.display()
        ),
        Some(libc::ENOSPC) => format!("disk full while creating {}", path.display()),
        Some(libc::EROFS) => format!("read-only filesystem, cannot create {}", path.display()),
        _ => format!("failed to create {}: {}", path.display(), e),
    }
}
