//! Durable per-PID session markers.
//!
//! Markers are the crash-recovery projection of the in-memory registry:
//! one JSON file per PID under `daemon-sessions/`, written atomically
//! (temp file then rename) so a crash mid-write never leaves a
//! half-written marker visible under its final name. Markers are always
//! allowed to be stale or wrong; every reader re-verifies against the live
//! process table before trusting one.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use happyd_proto::AgentFlavor;

use crate::error::MarkerError;

/// On-disk record describing one supervised session process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMarker {
    pub pid: u32,
    pub happy_session_id: String,
    /// Namespace guard: markers whose home dir differs from the running
    /// daemon's belong to another stack and are never loaded.
    pub happy_home_dir: PathBuf,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor: Option<AgentFlavor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_command_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Store of per-PID marker files for one daemon home directory.
pub struct MarkerStore {
    dir: PathBuf,
    home_dir: PathBuf,
}

impl MarkerStore {
    pub fn new(dir: PathBuf, home_dir: PathBuf) -> Self {
        Self { dir, home_dir }
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    fn path_for(&self, pid: u32) -> PathBuf {
        self.dir.join(format!("pid-{}.json", pid))
    }

    /// Write (or refresh) the marker for `marker.pid`.
    ///
    /// Merges with any existing marker for the same PID so `created_at`
    /// survives rewrites; `updated_at` always reflects this write. The
    /// write goes to a temp file first and is renamed into place; if the
    /// rename fails because the destination exists, the destination is
    /// unlinked and the rename retried.
    pub fn write(&self, marker: &SessionMarker) -> Result<(), MarkerError> {
        fs::create_dir_all(&self.dir).map_err(|e| MarkerError::io("create_dir", e))?;

        let path = self.path_for(marker.pid);
        let mut merged = marker.clone();
        if let Some(existing) = self.read_one(&path) {
            merged.created_at = existing.created_at;
        }
        merged.updated_at = Utc::now();

        let tmp = self.dir.join(format!(
            ".pid-{}.json.{}.tmp",
            marker.pid,
            Uuid::new_v4().simple()
        ));
        let json = serde_json::to_vec_pretty(&merged)?;

        if let Err(e) = fs::write(&tmp, &json) {
            let _ = fs::remove_file(&tmp);
            return Err(MarkerError::io("write_temp", e));
        }

        if let Err(rename_err) = fs::rename(&tmp, &path) {
            // Some filesystems refuse to rename over an existing file.
            let fallback = fs::remove_file(&path).and_then(|_| fs::rename(&tmp, &path));
            if let Err(e) = fallback {
                let _ = fs::remove_file(&tmp);
                debug!(pid = marker.pid, first = %rename_err, "marker rename fallback failed");
                return Err(MarkerError::io("rename", e));
            }
        }

        Ok(())
    }

    /// Delete the marker for `pid`; an already-absent file counts as success.
    pub fn remove(&self, pid: u32) -> Result<(), MarkerError> {
        match fs::remove_file(self.path_for(pid)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MarkerError::io("remove", e)),
        }
    }

    /// Read every marker in the store that belongs to this daemon's home
    /// directory. Corrupt or foreign files are skipped with a diagnostic,
    /// never fatal to the listing.
    pub fn list_all(&self) -> Vec<SessionMarker> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "failed to read markers directory");
                return Vec::new();
            }
        };

        let mut markers = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(marker) = self.read_one(&path) else {
                continue;
            };
            if marker.happy_home_dir != self.home_dir {
                debug!(
                    path = %path.display(),
                    marker_home = %marker.happy_home_dir.display(),
                    "skipping marker from another daemon home"
                );
                continue;
            }
            markers.push(marker);
        }
        markers
    }

    fn read_one(&self, path: &Path) -> Option<SessionMarker> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read marker file");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(marker) => Some(marker),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unparseable marker file");
                None
            }
        }
    }
}
