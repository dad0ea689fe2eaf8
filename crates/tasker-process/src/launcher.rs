//! Start a task's command as a child process.
//!
//! The command line is split on whitespace only. There is no quoting or
//! escaping: `echo "a b"` runs `echo` with the two arguments `"a` and `b"`.

use std::fs::OpenOptions;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::error::{ProcessError, Result};

/// Split `command` into the executable and its arguments.
pub fn split_command(command: &str) -> Result<(&str, Vec<&str>)> {
    let mut parts = command.split_whitespace();
    let program = parts.next().ok_or(ProcessError::EmptyCommand)?;
    Ok((program, parts.collect()))
}

/// A launched child process.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: u32,
    child: Child,
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Exit status if the child has already finished, without blocking.
    pub fn try_status(&mut self) -> Result<Option<ExitStatus>> {
        Ok(self.child.try_wait()?)
    }

    pub fn is_alive(&mut self) -> Result<bool> {
        Ok(self.try_status()?.is_none())
    }

    /// Block until the child exits.
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        let status = self.child.wait().await?;
        debug!(pid = self.pid, ?status, "child exited");
        Ok(status)
    }
}

/// Start `command` with both output streams appended to `log_path`.
///
/// Fails with [`ProcessError::Launch`] when the log cannot be opened or the
/// executable cannot be started, and with [`ProcessError::EmptyCommand`]
/// when there is nothing to run.
pub fn launch(command: &str, log_path: &Path) -> Result<ProcessHandle> {
    let (program, args) = split_command(command)?;

    let stdout = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|e| {
            ProcessError::launch(command, format!("cannot open log {}: {e}", log_path.display()))
        })?;
    let stderr = stdout
        .try_clone()
        .map_err(|e| ProcessError::launch(command, format!("cannot share log handle: {e}")))?;

    let child = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .spawn()
        .map_err(|e| ProcessError::launch(command, e))?;

    let pid = child
        .id()
        .ok_or_else(|| ProcessError::launch(command, "child exited before its pid was read"))?;

    info!(pid, program, log = %log_path.display(), "launched");
    Ok(ProcessHandle { pid, child })
}
