//! Entry point of a worker process: one process per submitted task.
//!
//! The submitter re-executes the `tasker` binary as `tasker worker ...` with
//! the task serialized as JSON. The worker opens its own database connection
//! and runs the scheduling loop until the task finishes or it is signalled.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use tokio::sync::watch;
use tracing::{info, warn};

use tasker_scheduler::{
    ProcessExecutor, ScheduledTask, SchedulerWorker, SystemClock, TaskRunLogger, WorkerExit,
};
use tasker_stats::StatsTracker;
use tasker_store::SqliteRepository;

use crate::error::Result;

/// Name of the hidden subcommand that runs a worker.
pub const WORKER_SUBCOMMAND: &str = "worker";

#[derive(Debug, Clone, Args)]
pub struct WorkerArgs {
    /// SQLite database holding the registry and the stats ledger.
    #[arg(long)]
    pub db: PathBuf,
    /// Directory of per-job log files.
    #[arg(long)]
    pub logs: PathBuf,
    #[arg(long, default_value_t = tasker_core::config::DEFAULT_POLL_INTERVAL_MS)]
    pub poll_ms: u64,
    /// The task, as JSON.
    #[arg(long)]
    pub task: String,
}

impl WorkerArgs {
    /// Command-line arguments (after the executable) that reproduce `self`.
    pub fn to_args(&self) -> Vec<OsString> {
        vec![
            WORKER_SUBCOMMAND.into(),
            "--db".into(),
            self.db.clone().into(),
            "--logs".into(),
            self.logs.clone().into(),
            "--poll-ms".into(),
            self.poll_ms.to_string().into(),
            "--task".into(),
            self.task.clone().into(),
        ]
    }
}

/// Run the task described by `args` to completion.
pub async fn run(args: WorkerArgs) -> Result<WorkerExit> {
    let task = ScheduledTask::from_json(&args.task)?;
    let job = task.job_name.clone();
    info!(job_name = %job, pid = std::process::id(), "worker process starting");

    let repo = SqliteRepository::open(&args.db)?;
    repo.init()?;
    let stats = StatsTracker::spawn(repo)?;
    let logger = TaskRunLogger::new(&args.logs, &job);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("termination signal received");
        let _ = shutdown_tx.send(true);
    });

    let worker = SchedulerWorker::new(
        task,
        SystemClock,
        ProcessExecutor,
        logger,
        stats,
        Duration::from_millis(args.poll_ms.max(1)),
    )?;
    let exit = worker.run(shutdown_rx).await?;
    info!(job_name = %job, runs = exit.runs, reason = ?exit.reason, "worker process exiting");
    Ok(exit)
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!("cannot listen for SIGTERM: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = term.recv() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(subcommand)]
        cmd: Cmd,
    }

    #[derive(clap::Subcommand)]
    enum Cmd {
        Worker(WorkerArgs),
    }

    #[test]
    fn args_round_trip_through_the_command_line() {
        let args = WorkerArgs {
            db: "/tmp/p.db".into(),
            logs: "/tmp/logs".into(),
            poll_ms: 250,
            task: r#"{"job_name":"Rhea"}"#.into(),
        };
        let mut argv: Vec<OsString> = vec!["tasker".into()];
        argv.extend(args.to_args());

        let Cmd::Worker(parsed) = Harness::parse_from(argv).cmd;
        assert_eq!(parsed.db, args.db);
        assert_eq!(parsed.poll_ms, 250);
        assert_eq!(parsed.task, args.task);
    }
}
