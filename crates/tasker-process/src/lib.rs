//! tasker-process — OS process plumbing for scheduled tasks.
//!
//! - [`launcher`]: start a command with stdout/stderr appended to a log file
//! - [`reaper`]: terminate a process and every descendant it spawned
//! - [`probe`]: liveness and process-tree queries by pid

pub mod error;
pub mod launcher;
pub mod probe;
pub mod reaper;

pub use error::{ProcessError, Result};
pub use launcher::{launch, split_command, ProcessHandle};
pub use reaper::{ProcessReaper, TerminationReport, DEFAULT_GRACE_PERIOD};
