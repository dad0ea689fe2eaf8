//! `TaskService`: the operations a front end calls.
//!
//! submit / kill / list_tasks / read_log, plus the ledger views and a one-off
//! trial run.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::{DateTime, Local, NaiveDateTime};
use tracing::{info, warn};

use tasker_core::{JobName, TaskId, TaskRecord, TaskerConfig};
use tasker_process::{probe, split_command, ProcessError, ProcessReaper, TerminationReport};
use tasker_scheduler::runlog::{execution_log_path, output_log_path};
use tasker_scheduler::{schedule, ScheduleSpec, ScheduledTask};
use tasker_stats::StatsTracker;
use tasker_store::{OrEmpty, Repository, SaveMode, SqliteRepository};

use crate::error::{Result, ServiceError};
use crate::worker::WorkerArgs;

/// Diagnostic log that every worker process writes its stderr to.
pub const WORKER_LOG_FILE: &str = "tasker-worker.log";
/// Output file of `try_command`, overwritten on every trial.
pub const TRIAL_OUTPUT_FILE: &str = "stdout.txt";

/// Captured result of [`TaskService::try_command`].
#[derive(Debug, Clone)]
pub struct TrialRun {
    pub exit_code: Option<i32>,
    pub output: Vec<String>,
}

pub struct TaskService {
    config: TaskerConfig,
    registry: SqliteRepository,
    stats: StatsTracker,
    reaper: ProcessReaper,
    worker_exe: PathBuf,
}

impl TaskService {
    /// Create resource folders, open the database and create both collections.
    pub fn open(config: TaskerConfig) -> Result<Self> {
        config.ensure_dirs()?;
        let registry = SqliteRepository::open(&config.storage.path)?;
        registry.init()?;
        let stats = StatsTracker::spawn(SqliteRepository::open(&config.storage.path)?)?;
        let worker_exe = std::env::current_exe()?;
        info!(db = %config.storage.path.display(), logs = %config.logs.dir.display(), "task service ready");

        Ok(Self {
            reaper: ProcessReaper::new(config.scheduler.grace_period()),
            config,
            registry,
            stats,
            worker_exe,
        })
    }

    /// Use `exe` instead of the current executable when spawning workers.
    pub fn with_worker_exe(mut self, exe: impl Into<PathBuf>) -> Self {
        self.worker_exe = exe.into();
        self
    }

    pub fn config(&self) -> &TaskerConfig {
        &self.config
    }

    pub fn stats(&self) -> &StatsTracker {
        &self.stats
    }

    /// `max(existing task_id) + 1`, or 1 for an empty registry.
    pub fn next_task_id(&self) -> Result<TaskId> {
        Ok(self.registry.next_task_id()?)
    }

    /// Start a worker process for `command` and register it.
    ///
    /// The schedule and the executable are checked before anything is
    /// spawned. If registration fails the new worker is terminated again.
    pub async fn submit(
        &self,
        command: &str,
        job_name: JobName,
        schedule_spec: ScheduleSpec,
        task_id: TaskId,
    ) -> Result<TaskRecord> {
        TaskId::new(task_id.get())?;
        schedule::validate(&schedule_spec)?;
        preflight(command)?;

        let task = ScheduledTask {
            job_name: job_name.clone(),
            command: command.to_string(),
            schedule: schedule_spec,
        };
        let pid = self.spawn_worker(&task)?;

        let record = TaskRecord {
            task_id,
            created: Local::now().naive_local(),
            process_id: pid,
            job_name: job_name.to_string(),
            command: command.to_string(),
            last_update: None,
            running: None,
        };
        if let Err(e) = self.registry.save_tasks(std::slice::from_ref(&record), SaveMode::Append) {
            warn!(%task_id, pid, "registration failed, stopping worker: {e}");
            if let Err(kill_err) = self.reaper.terminate(pid).await {
                warn!(pid, "could not stop unregistered worker: {kill_err}");
            }
            return Err(e.into());
        }

        info!(%task_id, pid, job_name = %job_name, "task submitted");
        Ok(record)
    }

    /// Terminate a registered worker and everything it launched.
    ///
    /// Pids that no registry row owns are refused with
    /// [`ServiceError::UnregisteredProcess`]. `Ok(None)` when the worker was
    /// already gone.
    pub async fn kill(&self, pid: u32) -> Result<Option<TerminationReport>> {
        let registered = self
            .registry
            .load_tasks()
            .or_empty()?
            .iter()
            .any(|t| t.process_id == pid);
        if !registered {
            warn!(pid, "refusing to kill a process that is not a task worker");
            return Err(ServiceError::UnregisteredProcess(pid));
        }

        match self.reaper.terminate(pid).await {
            Ok(report) => Ok(Some(report)),
            Err(ProcessError::NotFound(_)) => {
                info!(pid, "kill requested for a process that already exited");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Registry rows with `running` and `last_update` derived at read time.
    pub fn list_tasks(&self) -> Result<Vec<TaskRecord>> {
        let mut tasks = self.registry.load_tasks().or_empty()?;
        for task in &mut tasks {
            task.running = Some(probe::is_running(task.process_id));
            task.last_update = JobName::parse(&task.job_name)
                .ok()
                .and_then(|job| modified_at(&execution_log_path(&self.config.logs.dir, &job)));
        }
        Ok(tasks)
    }

    /// Lines of `{job}.txt`; `None` if the job has not logged anything yet.
    pub fn read_log(&self, job: &JobName) -> Result<Option<Vec<String>>> {
        read_lines(&execution_log_path(&self.config.logs.dir, job))
    }

    /// Lines of `{job}_stdout.txt`; `None` if it does not exist yet.
    pub fn read_output(&self, job: &JobName) -> Result<Option<Vec<String>>> {
        read_lines(&output_log_path(&self.config.logs.dir, job))
    }

    /// Run `command` once in the foreground, capturing its output in
    /// `{logs}/stdout.txt`. Nothing is registered or recorded.
    pub async fn try_command(&self, command: &str) -> Result<TrialRun> {
        let path = self.config.logs.dir.join(TRIAL_OUTPUT_FILE);
        File::create(&path)?;
        let mut handle = tasker_process::launch(command, &path)?;
        let status = handle.wait().await?;
        Ok(TrialRun {
            exit_code: status.code(),
            output: read_lines(&path)?.unwrap_or_default(),
        })
    }

    fn spawn_worker(&self, task: &ScheduledTask) -> Result<u32> {
        let args = WorkerArgs {
            db: self.config.storage.path.clone(),
            logs: self.config.logs.dir.clone(),
            poll_ms: self.config.scheduler.poll_interval_ms,
            task: task.to_json()?,
        };
        let stderr = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.config.logs.dir.join(WORKER_LOG_FILE))?;

        let mut cmd = Command::new(&self.worker_exe);
        cmd.args(args.to_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr));
        // Keep workers out of the submitter's process group so a Ctrl-C
        // in the front end does not reach them.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let child = cmd
            .spawn()
            .map_err(|e| ProcessError::launch(&task.command, format!("cannot start worker: {e}")))?;
        Ok(child.id())
    }
}

/// Reject commands whose executable cannot be found.
fn preflight(command: &str) -> Result<()> {
    let (program, _) = split_command(command)?;
    which::which(program)
        .map(|_| ())
        .map_err(|e| ServiceError::Process(ProcessError::launch(command, e)))
}

fn modified_at(path: &Path) -> Option<NaiveDateTime> {
    let mtime = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Local>::from(mtime).naive_local())
}

fn read_lines(path: &Path) -> Result<Option<Vec<String>>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text.lines().map(str::to_string).collect())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
