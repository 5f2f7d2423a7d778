//! Control-plane facing data types.
//!
//! Everything here is serialized as camelCase JSON because the sync service
//! and the mobile/web clients share that convention.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error_codes::SpawnErrorCode;

/// The `observedBy` tag the daemon stamps on exits it witnessed itself.
pub const EXIT_OBSERVED_BY_DAEMON: &str = "daemon-child-exit";

/// Supported agent CLIs the daemon knows how to supervise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentFlavor {
    Claude,
    Codex,
    Gemini,
    Opencode,
}

impl AgentFlavor {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentFlavor::Claude => "claude",
            AgentFlavor::Codex => "codex",
            AgentFlavor::Gemini => "gemini",
            AgentFlavor::Opencode => "opencode",
        }
    }
}

impl std::fmt::Display for AgentFlavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AgentFlavor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude" => Ok(AgentFlavor::Claude),
            "codex" => Ok(AgentFlavor::Codex),
            "gemini" => Ok(AgentFlavor::Gemini),
            "opencode" => Ok(AgentFlavor::Opencode),
            other => Err(format!("unknown agent flavor: {}", other)),
        }
    }
}

/// Discriminated result of a `spawnSession` request.
///
/// This is the only shape the spawn path ever returns across the daemon
/// boundary; failures are values here, never propagated errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SpawnResult {
    #[serde(rename_all = "camelCase")]
    Success { session_id: String },
    #[serde(rename_all = "camelCase")]
    RequestToApproveDirectoryCreation { directory: PathBuf },
    #[serde(rename_all = "camelCase")]
    Error {
        error_code: SpawnErrorCode,
        error_message: String,
    },
}

impl SpawnResult {
    pub fn error(code: SpawnErrorCode, message: impl Into<String>) -> Self {
        SpawnResult::Error {
            error_code: code,
            error_message: message.into(),
        }
    }
}

/// A subprocess's self-report, delivered through the session webhook once
/// the agent CLI has finished initializing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    /// The session id the subprocess registered with the control plane.
    pub session_id: String,
    /// The reporting process's own OS pid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_pid: Option<u32>,
    /// Home directory namespace of the stack the subprocess belongs to.
    pub happy_home_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor: Option<AgentFlavor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Exit details attached to a [`SessionEndEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionExit {
    pub observed_by: String,
    pub pid: u32,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
}

/// Outbound notification that a supervised session's process ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEndEvent {
    pub sid: String,
    /// Milliseconds since the Unix epoch, as observed by the daemon.
    pub time: i64,
    pub exit: SessionExit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_result_success_shape() {
        let result = SpawnResult::Success {
            session_id: "sess_1".into(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["type"], "success");
        assert_eq!(json["sessionId"], "sess_1");
    }

    #[test]
    fn test_spawn_result_error_shape() {
        let result = SpawnResult::error(SpawnErrorCode::SpawnNoPid, "no pid from launcher");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["errorCode"], "SPAWN_NO_PID");
        assert_eq!(json["errorMessage"], "no pid from launcher");
    }

    #[test]
    fn test_spawn_result_directory_approval_shape() {
        let result = SpawnResult::RequestToApproveDirectoryCreation {
            directory: PathBuf::from("/work/new-project"),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["type"], "requestToApproveDirectoryCreation");
        assert_eq!(json["directory"], "/work/new-project");
    }

    #[test]
    fn test_session_report_parses_minimal_payload() {
        let report: SessionReport = serde_json::from_str(
            r#"{"sessionId":"sess_9","happyHomeDir":"/home/u/.happy","hostPid":4321}"#,
        )
        .unwrap();
        assert_eq!(report.session_id, "sess_9");
        assert_eq!(report.host_pid, Some(4321));
        assert!(report.flavor.is_none());
    }

    #[test]
    fn test_session_end_event_roundtrip() {
        let event = SessionEndEvent {
            sid: "sess_2".into(),
            time: 1_756_400_000_000,
            exit: SessionExit {
                observed_by: EXIT_OBSERVED_BY_DAEMON.into(),
                pid: 999,
                reason: "exit".into(),
                code: Some(0),
                signal: None,
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: SessionEndEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_agent_flavor_parse() {
        assert_eq!("claude".parse::<AgentFlavor>(), Ok(AgentFlavor::Claude));
        assert!("vim".parse::<AgentFlavor>().is_err());
    }
}
