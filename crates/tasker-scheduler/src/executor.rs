use std::path::Path;

use async_trait::async_trait;
use tasker_process::{launch, ProcessError};

/// Result of one completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// `None` when the child was ended by a signal.
    pub exit_code: Option<i32>,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs a command to completion with its output appended to `output_log`.
#[async_trait]
pub trait RunExecutor: Send + Sync {
    async fn execute(&self, command: &str, output_log: &Path) -> Result<RunOutcome, ProcessError>;
}

/// Runs commands as real child processes and waits for them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

#[async_trait]
impl RunExecutor for ProcessExecutor {
    async fn execute(&self, command: &str, output_log: &Path) -> Result<RunOutcome, ProcessError> {
        let mut handle = launch(command, output_log)?;
        let status = handle.wait().await?;
        Ok(RunOutcome {
            exit_code: status.code(),
        })
    }
}
