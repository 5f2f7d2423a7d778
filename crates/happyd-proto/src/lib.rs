//! Shared types crossing the daemon boundary: spawn results, stable error
//! codes, the webhook session report, and the session-end event.

#![deny(clippy::all)]

pub mod error_codes;
mod types;

pub use error_codes::ErrorCategory;
pub use error_codes::SpawnErrorCode;
pub use types::AgentFlavor;
pub use types::SessionEndEvent;
pub use types::SessionExit;
pub use types::SessionReport;
pub use types::SpawnResult;
pub use types::EXIT_OBSERVED_BY_DAEMON;
