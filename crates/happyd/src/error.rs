//! Daemon error types.
//!
//! Two families: `DaemonError` for startup/lifecycle failures that abort
//! the daemon, and `MarkerError` for marker-store I/O. Spawn failures are
//! not errors at all; they travel as `SpawnResult::Error` values.

use thiserror::Error;

/// Daemon startup and lifecycle errors.
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Another daemon instance is already running for this home directory")]
    AlreadyRunning,
    #[error("Failed to acquire daemon lock: {0}")]
    LockFailed(String),
    #[error("Failed to prepare daemon home directory: {0}")]
    HomeSetup(String),
}

/// Marker-store I/O errors.
///
/// Marker persistence is best-effort durability; call sites log these and
/// continue rather than propagating them into spawn/stop results.
#[derive(Error, Debug)]
pub enum MarkerError {
    #[error("Marker I/O failed during {operation}: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("Marker serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

impl MarkerError {
    pub fn io(operation: &'static str, source: std::io::Error) -> Self {
        MarkerError::Io { operation, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_error_display_includes_operation() {
        let err = MarkerError::io(
            "rename",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("rename"));
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_daemon_error_display() {
        assert_eq!(
            DaemonError::AlreadyRunning.to_string(),
            "Another daemon instance is already running for this home directory"
        );
    }
}
