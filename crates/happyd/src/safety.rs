//! PID safety gate.
//!
//! Single choke point consulted before any signal is sent to a PID the
//! daemon does not hold a live child handle for. Every uncertainty answers
//! "unsafe"; the caller's correct reaction to `false` is inaction.

use tracing::debug;

use crate::classify::{is_allowed_kind, ProcessClassifier};
use crate::command_hash::hash_command;

/// Decides whether `pid` currently looks like a legitimate session process.
///
/// When `expected_hash` is given, the observed command line must hash to
/// exactly that value; a mismatch means another process now occupies the
/// PID and the answer is `false`.
pub fn is_pid_safe(
    classifier: &dyn ProcessClassifier,
    pid: u32,
    expected_hash: Option<&str>,
) -> bool {
    let Some(observed) = classifier.classify(pid) else {
        debug!(pid, "pid not classifiable, treating as unsafe");
        return false;
    };

    if !is_allowed_kind(&observed.kind) {
        debug!(pid, kind = %observed.kind, "pid is not a session process");
        return false;
    }

    if let Some(expected) = expected_hash {
        let observed_hash = hash_command(&observed.command);
        if observed_hash != expected {
            debug!(pid, "command hash mismatch, pid likely reused");
            return false;
        }
    }

    true
}
