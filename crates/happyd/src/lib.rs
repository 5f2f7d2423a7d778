//! happyd - session supervision daemon for agent CLI subprocesses.
//!
//! Supervises Claude/Codex/Gemini/OpenCode CLI processes on behalf of a
//! remote control plane: spawns them (directly or inside tmux), confirms
//! each spawn through a webhook rendezvous, persists per-PID markers so
//! still-running sessions survive daemon restarts, and refuses to signal
//! any PID it cannot positively re-identify.

#![deny(clippy::all)]

pub mod classify;
pub mod command_hash;
pub mod config;
pub mod env_layers;
pub mod error;
pub mod lock;
pub mod marker;
pub mod process;
pub mod reattach;
pub mod registry;
pub mod rendezvous;
pub mod safety;
pub mod spawn;
pub mod stop;
pub mod supervisor;
pub mod telemetry;
pub mod tmux;
mod webhook;

pub use classify::{ClassifiedProcess, ProcessClassifier, ALLOWED_SESSION_KINDS};
pub use command_hash::hash_command;
pub use config::DaemonConfig;
pub use error::{DaemonError, MarkerError};
pub use lock::DaemonLock;
pub use marker::{MarkerStore, SessionMarker};
pub use process::{ProcessControl, UnixProcessControl};
pub use reattach::ReattachOutcome;
pub use registry::{SessionRegistry, TrackedSession};
pub use safety::is_pid_safe;
pub use spawn::{CommandPlanner, SpawnRequest, VendorResumeSupport};
pub use supervisor::{ControlPlane, NullControlPlane, Supervisor, SupervisorBuilder};
pub use telemetry::{init_tracing, TelemetryGuard};
pub use tmux::{TmuxControl, TmuxSessionRow, TmuxSpawnOutcome, TmuxTarget};

pub use happyd_proto::{
    AgentFlavor, SessionEndEvent, SessionExit, SessionReport, SpawnErrorCode, SpawnResult,
    EXIT_OBSERVED_BY_DAEMON,
};
