//! Error types for the tasker-process crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    /// The executable could not be started or its log file could not be opened.
    #[error("failed to launch `{command}`: {reason}")]
    Launch { command: String, reason: String },

    /// No live process with this pid. Callers that only want the process gone
    /// treat this as success.
    #[error("process {0} not found")]
    NotFound(u32),

    /// The command string contained no executable.
    #[error("command is empty")]
    EmptyCommand,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessError {
    pub fn launch(command: &str, reason: impl ToString) -> Self {
        Self::Launch {
            command: command.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, ProcessError>;
