//! Process classification contract.
//!
//! The daemon never trusts a bare PID. Before signaling or adopting a
//! process it asks a classifier what currently lives at that PID and only
//! proceeds when the answer is recognizably one of our session processes.

/// What a classifier observed at a PID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedProcess {
    /// Process type tag, e.g. `daemon-spawned-session`.
    pub kind: String,
    /// The observed command line, exactly as captured.
    pub command: String,
}

/// Inspects a live PID and reports what kind of process occupies it.
///
/// Returns `None` when the process does not exist or cannot be inspected.
pub trait ProcessClassifier: Send + Sync {
    fn classify(&self, pid: u32) -> Option<ClassifiedProcess>;
}

/// Process type tags the daemon is willing to treat as session processes.
///
/// Intentionally conservative: anything unrecognized is rejected, trading
/// false negatives (refuse to act) for never acting on the wrong process.
pub const ALLOWED_SESSION_KINDS: &[&str] = &[
    "daemon-spawned-session",
    "user-session",
    "dev-daemon-spawned",
    "dev-session",
];

/// Whether a classified type tag belongs to the session allow-set.
pub fn is_allowed_kind(kind: &str) -> bool {
    ALLOWED_SESSION_KINDS.contains(&kind)
}
