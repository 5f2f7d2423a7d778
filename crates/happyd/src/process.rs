//! OS process primitives.
//!
//! Liveness probing and signal delivery sit behind a trait so the stop and
//! reattach paths can be exercised in tests without real victim processes.

/// Minimal process control surface the supervisor needs from the OS.
pub trait ProcessControl: Send + Sync {
    /// Probe whether a PID currently exists (signal 0).
    fn is_alive(&self, pid: u32) -> bool;

    /// Deliver SIGTERM to a PID. Returns true if the signal was sent.
    fn terminate(&self, pid: u32) -> bool;
}

/// libc-backed implementation used in production.
pub struct UnixProcessControl;

#[cfg(unix)]
impl ProcessControl for UnixProcessControl {
    fn is_alive(&self, pid: u32) -> bool {
        if unsafe { libc::kill(pid as i32, 0) } == 0 {
            return true;
        }
        // EPERM means the process exists but is not ours to signal; for
        // liveness that still counts as alive.
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }

    fn terminate(&self, pid: u32) -> bool {
        unsafe { libc::kill(pid as i32, libc::SIGTERM) == 0 }
    }
}
