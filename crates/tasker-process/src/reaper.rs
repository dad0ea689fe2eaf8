//! Terminate a process together with the tree it spawned.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{ProcessError, Result};
use crate::probe;

/// How long descendants get between SIGTERM and SIGKILL.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);

const POLL_STEP: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminationReport {
    pub pid: u32,
    /// Descendants that were signalled.
    pub descendants: Vec<u32>,
    /// Descendants still alive after the grace period, which were force-killed.
    pub forced: Vec<u32>,
}

#[derive(Debug, Clone, Copy)]
pub struct ProcessReaper {
    grace: Duration,
}

impl Default for ProcessReaper {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_PERIOD)
    }
}

impl ProcessReaper {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    pub fn grace_period(&self) -> Duration {
        self.grace
    }

    /// Terminate `pid` and all of its descendants.
    ///
    /// 1. [`ProcessError::NotFound`] if `pid` is not a live process.
    /// 2. Freeze the parent (SIGSTOP) so it cannot react to its children
    ///    dying or start new ones.
    /// 3. SIGTERM every descendant, picking up late arrivals while waiting.
    /// 4. Wait up to the grace period, then SIGKILL survivors.
    /// 5. SIGTERM then SIGKILL the parent itself, unconditionally.
    pub async fn terminate(&self, pid: u32) -> Result<TerminationReport> {
        if !probe::is_running(pid) {
            return Err(ProcessError::NotFound(pid));
        }

        #[cfg(unix)]
        signal::stop(pid);

        let mut descendants = Vec::new();
        let mut alive = Vec::new();
        let deadline = Instant::now() + self.grace;
        loop {
            for child in probe::descendants(pid) {
                if !descendants.contains(&child) {
                    signal::terminate(child);
                    descendants.push(child);
                    alive.push(child);
                }
            }
            alive.retain(|&p| probe::is_running(p));
            if alive.is_empty() || Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(POLL_STEP).await;
        }
        debug!(pid, count = descendants.len(), "descendants signalled");
        for &child in &alive {
            warn!(pid = child, "descendant ignored SIGTERM, killing");
            signal::kill(child);
        }

        signal::terminate(pid);
        signal::kill(pid);
        #[cfg(not(unix))]
        signal::kill_tree(pid);

        info!(pid, descendants = descendants.len(), forced = alive.len(), "process terminated");
        Ok(TerminationReport {
            pid,
            descendants,
            forced: alive,
        })
    }
}

#[cfg(unix)]
mod signal {
    fn send(pid: u32, sig: libc::c_int) {
        if !crate::probe::signalable(pid) {
            return;
        }
        // SAFETY: pid is positive, so this addresses exactly one process.
        // ESRCH for an already-gone process is expected and ignored.
        unsafe {
            libc::kill(pid as libc::pid_t, sig);
        }
    }

    pub fn terminate(pid: u32) {
        send(pid, libc::SIGTERM);
    }

    pub fn kill(pid: u32) {
        send(pid, libc::SIGKILL);
    }

    pub fn stop(pid: u32) {
        send(pid, libc::SIGSTOP);
    }
}

#[cfg(not(unix))]
mod signal {
    use std::process::Command;

    fn taskkill(args: &[&str]) {
        let _ = Command::new("taskkill").args(args).output();
    }

    pub fn terminate(pid: u32) {
        taskkill(&["/PID", &pid.to_string()]);
    }

    pub fn kill(pid: u32) {
        taskkill(&["/F", "/PID", &pid.to_string()]);
    }

    pub fn kill_tree(pid: u32) {
        taskkill(&["/F", "/T", "/PID", &pid.to_string()]);
    }
}
