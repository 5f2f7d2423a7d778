//! Stable error codes for spawn results.
//!
//! These codes cross the daemon boundary and are matched on by downstream
//! consumers (mobile/web app via the sync service), so they must never be
//! renamed once shipped.

use serde::{Deserialize, Serialize};

/// Stable, machine-matchable error codes returned by `spawnSession`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpawnErrorCode {
    DirectoryCreateFailed,
    ResumeNotSupported,
    ResumeMissingEncryptionKey,
    ResumeUnsupportedEncryptionVariant,
    SessionWebhookTimeout,
    ChildExitedBeforeWebhook,
    SpawnNoPid,
    SpawnFailed,
    AuthEnvUnexpanded,
    SpawnValidationFailed,
    InvalidEnvironmentVariables,
    Unexpected,
}

impl SpawnErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpawnErrorCode::DirectoryCreateFailed => "DIRECTORY_CREATE_FAILED",
            SpawnErrorCode::ResumeNotSupported => "RESUME_NOT_SUPPORTED",
            SpawnErrorCode::ResumeMissingEncryptionKey => "RESUME_MISSING_ENCRYPTION_KEY",
            SpawnErrorCode::ResumeUnsupportedEncryptionVariant => {
                "RESUME_UNSUPPORTED_ENCRYPTION_VARIANT"
            }
            SpawnErrorCode::SessionWebhookTimeout => "SESSION_WEBHOOK_TIMEOUT",
            SpawnErrorCode::ChildExitedBeforeWebhook => "CHILD_EXITED_BEFORE_WEBHOOK",
            SpawnErrorCode::SpawnNoPid => "SPAWN_NO_PID",
            SpawnErrorCode::SpawnFailed => "SPAWN_FAILED",
            SpawnErrorCode::AuthEnvUnexpanded => "AUTH_ENV_UNEXPANDED",
            SpawnErrorCode::SpawnValidationFailed => "SPAWN_VALIDATION_FAILED",
            SpawnErrorCode::InvalidEnvironmentVariables => "INVALID_ENVIRONMENT_VARIABLES",
            SpawnErrorCode::Unexpected => "UNEXPECTED",
        }
    }

    /// Returns the error category for programmatic handling.
    pub fn category(&self) -> ErrorCategory {
        match self {
            SpawnErrorCode::ResumeNotSupported
            | SpawnErrorCode::ResumeMissingEncryptionKey
            | SpawnErrorCode::ResumeUnsupportedEncryptionVariant
            | SpawnErrorCode::SpawnValidationFailed
            | SpawnErrorCode::InvalidEnvironmentVariables => ErrorCategory::Validation,
            SpawnErrorCode::DirectoryCreateFailed | SpawnErrorCode::AuthEnvUnexpanded => {
                ErrorCategory::Environment
            }
            SpawnErrorCode::SessionWebhookTimeout
            | SpawnErrorCode::ChildExitedBeforeWebhook
            | SpawnErrorCode::SpawnNoPid
            | SpawnErrorCode::SpawnFailed => ErrorCategory::Lifecycle,
            SpawnErrorCode::Unexpected => ErrorCategory::Internal,
        }
    }

    /// Whether retrying the same request may succeed without caller changes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SpawnErrorCode::SessionWebhookTimeout
                | SpawnErrorCode::SpawnFailed
                | SpawnErrorCode::Unexpected
        )
    }
}

impl std::fmt::Display for SpawnErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse failure category used by callers that do not match exact codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad input; the request itself must change before retrying.
    Validation,
    /// Filesystem or environment problem on the daemon host.
    Environment,
    /// Subprocess lifecycle failure (spawn, exit, webhook wait).
    Lifecycle,
    /// Internal daemon error.
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Environment => "environment",
            ErrorCategory::Lifecycle => "lifecycle",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
