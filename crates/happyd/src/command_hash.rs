//! Command-line fingerprinting for PID-reuse safety.
//!
//! The hash is taken over the exact command-line string as observed; no
//! whitespace or argument normalization happens here. Callers must hash the
//! same representation they originally captured, or verification will fail
//! closed.

use sha2::{Digest, Sha256};

/// Returns the lowercase hex sha-256 digest of `command_line`.
pub fn hash_command(command_line: &str) -> String {
    hex::encode(Sha256::digest(command_line.as_bytes()))
}
