//! tmux launch collaborator.
//!
//! The daemon prefers launching sessions inside tmux when asked so they
//! survive daemon restarts visibly. The wrapper's shell invocation lives
//! outside this crate; here we own the trait, target-name construction,
//! and "which session did the user mean" resolution.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use happyd_proto::AgentFlavor;

/// One row from `listSessions`.
#[derive(Debug, Clone)]
pub struct TmuxSessionRow {
    pub name: String,
    pub attached: bool,
    /// Epoch seconds of the session's last attach.
    pub last_attached: i64,
}

/// Result of spawning a window.
#[derive(Debug, Clone)]
pub struct TmuxSpawnOutcome {
    pub pid: Option<u32>,
    pub session_name: String,
    pub window_name: String,
}

/// Target window for a spawn.
#[derive(Debug, Clone)]
pub struct TmuxTarget {
    pub session: String,
    pub window: String,
}

impl TmuxTarget {
    /// `session:window` form recorded on the tracked session.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.session, self.window)
    }
}

/// External tmux wrapper the daemon talks to.
#[async_trait]
pub trait TmuxControl: Send + Sync {
    /// Whether tmux is usable at all right now.
    async fn available(&self) -> bool;

    async fn list_sessions(&self) -> std::io::Result<Vec<TmuxSessionRow>>;

    /// Spawn `tokens` in a new window at `target`, with `env` applied as
    /// window-scoped variables.
    async fn spawn_in_window(
        &self,
        tokens: &[String],
        target: &TmuxTarget,
        env: &HashMap<String, String>,
    ) -> std::io::Result<TmuxSpawnOutcome>;
}

/// Stand-in used when no tmux wrapper is wired up; every spawn falls back
/// to a direct process launch.
pub struct TmuxUnavailable;

#[async_trait]
impl TmuxControl for TmuxUnavailable {
    async fn available(&self) -> bool {
        false
    }

    async fn list_sessions(&self) -> std::io::Result<Vec<TmuxSessionRow>> {
        Err(std::io::Error::other("tmux support not configured"))
    }

    async fn spawn_in_window(
        &self,
        _tokens: &[String],
        _target: &TmuxTarget,
        _env: &HashMap<String, String>,
    ) -> std::io::Result<TmuxSpawnOutcome> {
        Err(std::io::Error::other("tmux support not configured"))
    }
}

/// Build a window name from the launch timestamp and agent subcommand,
/// e.g. `happy-20260829T142501-claude`.
pub fn window_name(agent: AgentFlavor, now: DateTime<Utc>) -> String {
    format!("happy-{}-{}", now.format("%Y%m%dT%H%M%S"), agent.as_str())
}

/// Resolve the tmux session a spawn should target.
///
/// An explicit non-empty name wins. Otherwise the most-recently-attached
/// existing session is chosen; when discovery fails, times out, or finds
/// nothing, the fixed default name is used.
pub async fn resolve_session_name(
    tmux: &dyn TmuxControl,
    requested: Option<&str>,
    default_name: &str,
    budget: Duration,
) -> String {
    if let Some(name) = requested {
        if !name.is_empty() {
            return name.to_string();
        }
    }

    let rows = match tokio::time::timeout(budget, tmux.list_sessions()).await {
        Ok(Ok(rows)) => rows,
        Ok(Err(e)) => {
            debug!(error = %e, "tmux session discovery failed, using default");
            return default_name.to_string();
        }
        Err(_) => {
            debug!("tmux session discovery timed out, using default");
            return default_name.to_string();
        }
    };

    rows.into_iter()
        .max_by_key(|row| row.last_attached)
        .map(|row| row.name)
        .unwrap_or_else(|| default_name.to_string())
}
