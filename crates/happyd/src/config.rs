use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 15;
const DEFAULT_TMUX_DISCOVERY_MILLIS: u64 = 400;
const DEFAULT_TMUX_SESSION: &str = "happy";

/// Directory under the daemon home where per-PID session markers live.
pub const MARKERS_DIR_NAME: &str = "daemon-sessions";

/// Lock file enforcing one daemon per home directory.
pub const LOCK_FILE_NAME: &str = "daemon.lock";

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Home directory of this daemon instance; namespaces markers and the
    /// lock file so parallel stacks (dev vs. prod) never cross-adopt.
    pub home_dir: PathBuf,
    /// How long a spawn waits for the subprocess to self-report.
    pub webhook_timeout: Duration,
    /// Budget for tmux session-name discovery before falling back.
    pub tmux_discovery_budget: Duration,
    /// Session name used when no tmux session can be resolved.
    pub default_tmux_session: String,
    /// Protected authentication environment, always applied and never
    /// shadowable by profile variables.
    pub auth_env: HashMap<String, String>,
    /// Variable names checked for unexpanded `${...}` references after
    /// layering; defaults to the keys of `auth_env`.
    pub auth_var_names: Vec<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        let home_dir = env::var("HAPPY_HOME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_home_dir());

        Self {
            home_dir,
            webhook_timeout: Duration::from_secs(
                env::var("HAPPY_WEBHOOK_TIMEOUT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_WEBHOOK_TIMEOUT_SECS),
            ),
            tmux_discovery_budget: Duration::from_millis(
                env::var("HAPPY_TMUX_DISCOVERY_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_TMUX_DISCOVERY_MILLIS),
            ),
            default_tmux_session: env::var("HAPPY_TMUX_SESSION")
                .unwrap_or_else(|_| DEFAULT_TMUX_SESSION.to_string()),
            auth_env: HashMap::new(),
            auth_var_names: Vec::new(),
        }
    }

    pub fn markers_dir(&self) -> PathBuf {
        self.home_dir.join(MARKERS_DIR_NAME)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.home_dir.join(LOCK_FILE_NAME)
    }

    /// Scratch directory for per-session attach files.
    pub fn attach_dir(&self) -> PathBuf {
        self.home_dir.join("tmp")
    }

    pub fn with_home_dir(mut self, home_dir: impl AsRef<Path>) -> Self {
        self.home_dir = home_dir.as_ref().to_path_buf();
        self
    }

    pub fn with_webhook_timeout(mut self, timeout: Duration) -> Self {
        self.webhook_timeout = timeout;
        self
    }

    pub fn with_tmux_discovery_budget(mut self, budget: Duration) -> Self {
        self.tmux_discovery_budget = budget;
        self
    }

    pub fn with_auth_env(mut self, auth_env: HashMap<String, String>) -> Self {
        if self.auth_var_names.is_empty() {
            self.auth_var_names = auth_env.keys().cloned().collect();
        }
        self.auth_env = auth_env;
        self
    }

    pub fn with_auth_var_names(mut self, names: Vec<String>) -> Self {
        self.auth_var_names = names;
        self
    }
}

fn default_home_dir() -> PathBuf {
    let home = env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"));
    home.join(".happy")
}
