use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use tasker_stats::{round_duration, StatsTracker};

use crate::clock::Clock;
use crate::error::WorkerError;
use crate::executor::RunExecutor;
use crate::runlog::TaskRunLogger;
use crate::schedule;
use crate::types::ScheduledTask;

/// Where a worker is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Waiting for `next_fire`.
    Armed { next_fire: NaiveDateTime },
    /// A run is in flight.
    Running,
    /// A one-shot task has completed its run.
    Terminated,
}

/// Why [`SchedulerWorker::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Completed,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    pub runs: u64,
    pub reason: StopReason,
}

/// Drives one task: waits for each fire time, runs the command to
/// completion, logs and records it, then re-arms. Runs never overlap.
pub struct SchedulerWorker<C, E> {
    task: ScheduledTask,
    clock: C,
    executor: E,
    logger: TaskRunLogger,
    stats: StatsTracker,
    poll_interval: Duration,
    state: WorkerState,
    runs: u64,
}

impl<C: Clock, E: RunExecutor> SchedulerWorker<C, E> {
    /// Validates the schedule and arms the first fire time.
    pub fn new(
        task: ScheduledTask,
        clock: C,
        executor: E,
        logger: TaskRunLogger,
        stats: StatsTracker,
        poll_interval: Duration,
    ) -> Result<Self, WorkerError> {
        let next_fire = schedule::compute_first_fire(&task.schedule, clock.now())?;
        Ok(Self {
            task,
            clock,
            executor,
            logger,
            stats,
            poll_interval,
            state: WorkerState::Armed { next_fire },
            runs: 0,
        })
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Loop until a one-shot task is done or `shutdown` turns true.
    ///
    /// A dropped shutdown sender counts as a shutdown request. A log write
    /// failure or a launch failure ends the loop with an error; a stats
    /// failure is only logged.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<WorkerExit, WorkerError> {
        let job = self.task.job_name.clone();
        info!(job_name = %job, command = %self.task.command, state = ?self.state, "worker started");

        loop {
            let next_fire = match self.state {
                WorkerState::Armed { next_fire } => next_fire,
                WorkerState::Running | WorkerState::Terminated => break,
            };
            if *shutdown.borrow() {
                return Ok(self.exit(StopReason::Shutdown));
            }

            let now = self.clock.now();
            if schedule::is_due(&self.task.schedule, next_fire, now) {
                self.state = WorkerState::Running;
                self.run_once().await?;
                self.state = match schedule::advance(&self.task.schedule, next_fire)? {
                    Some(next_fire) => {
                        debug!(job_name = %job, %next_fire, "re-armed");
                        WorkerState::Armed { next_fire }
                    }
                    None => WorkerState::Terminated,
                };
                continue;
            }

            tokio::select! {
                _ = self.clock.sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(self.exit(StopReason::Shutdown));
                    }
                }
            }
        }

        info!(job_name = %job, runs = self.runs, "worker finished");
        Ok(self.exit(StopReason::Completed))
    }

    async fn run_once(&mut self) -> Result<(), WorkerError> {
        let command = self.task.command.as_str();
        let job = self.task.job_name.as_str();

        self.logger.started(self.clock.now(), command)?;
        let started = Instant::now();

        let outcome = match self.executor.execute(command, self.logger.output_log()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(job_name = job, "run failed to start: {e}");
                if let Err(log_err) = self.logger.failed(self.clock.now(), command, &e.to_string()) {
                    warn!(job_name = job, "could not record failure: {log_err}");
                }
                return Err(WorkerError::Launch(e));
            }
        };

        let duration = round_duration(started.elapsed().as_secs_f64());
        self.logger
            .finished(self.clock.now(), command, outcome.exit_code, duration)?;
        self.runs += 1;
        info!(job_name = job, exit_code = ?outcome.exit_code, duration, "run finished");

        if let Err(e) = self.stats.record(job, command, duration).await {
            warn!(job_name = job, "stats not recorded: {e}");
        }
        Ok(())
    }

    fn exit(&self, reason: StopReason) -> WorkerExit {
        WorkerExit {
            runs: self.runs,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::executor::RunOutcome;
    use crate::types::{Frequency, ScheduleSpec, TimeUnit};
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeDelta};
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tasker_core::JobName;
    use tasker_process::ProcessError;
    use tasker_store::SqliteRepository;

    #[derive(Clone, Default)]
    struct CountingExecutor {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl RunExecutor for CountingExecutor {
        async fn execute(&self, _: &str, _: &Path) -> Result<RunOutcome, ProcessError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RunOutcome { exit_code: Some(0) })
        }
    }

    struct FailingExecutor;

    #[async_trait]
    impl RunExecutor for FailingExecutor {
        async fn execute(&self, command: &str, _: &Path) -> Result<RunOutcome, ProcessError> {
            Err(ProcessError::launch(command, "No such file or directory"))
        }
    }

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn task(schedule: ScheduleSpec) -> ScheduledTask {
        ScheduledTask {
            job_name: JobName::parse("Mimas-test").unwrap(),
            command: "echo hi".into(),
            schedule,
        }
    }

    fn stats() -> StatsTracker {
        StatsTracker::spawn(SqliteRepository::open_in_memory().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn once_runs_exactly_once_and_terminates() {
        let dir = tempfile::tempdir().unwrap();
        let t = task(ScheduleSpec::now(Frequency::Once, t0()));
        let logger = TaskRunLogger::new(dir.path(), &t.job_name);
        let exec = CountingExecutor::default();
        let stats = stats();
        let (_tx, rx) = watch::channel(false);

        let worker = SchedulerWorker::new(
            t,
            ManualClock::new(t0()),
            exec.clone(),
            logger.clone(),
            stats.clone(),
            Duration::from_secs(1),
        )
        .unwrap();
        let exit = worker.run(rx).await.unwrap();

        assert_eq!(exit, WorkerExit { runs: 1, reason: StopReason::Completed });
        assert_eq!(exec.calls.load(Ordering::SeqCst), 1);
        let log = std::fs::read_to_string(logger.execution_log()).unwrap();
        assert_eq!(log.matches(" Executed ").count(), 1);
        assert_eq!(stats.ledger().await.unwrap()[0].executions, 1);
    }

    #[tokio::test]
    async fn scheduled_once_waits_for_start() {
        let dir = tempfile::tempdir().unwrap();
        let start = t0() + TimeDelta::minutes(10);
        let t = task(ScheduleSpec::scheduled(Frequency::Once, start));
        let clock = ManualClock::new(t0());
        let (_tx, rx) = watch::channel(false);

        let worker = SchedulerWorker::new(
            t.clone(),
            clock.clone(),
            CountingExecutor::default(),
            TaskRunLogger::new(dir.path(), &t.job_name),
            stats(),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(worker.state(), WorkerState::Armed { next_fire: start });

        worker.run(rx).await.unwrap();
        assert!(clock.now() >= start);
    }

    #[tokio::test]
    async fn interval_fires_again_after_one_interval() {
        let dir = tempfile::tempdir().unwrap();
        let every_minute = Frequency::Interval {
            unit: TimeUnit::Minutes,
            quantity: 1,
        };
        let t = task(ScheduleSpec::now(every_minute, t0()));
        let clock = ManualClock::new(t0());
        let exec = CountingExecutor::default();
        let stats = stats();
        let (tx, rx) = watch::channel(false);

        let worker = SchedulerWorker::new(
            t.clone(),
            clock.clone(),
            exec.clone(),
            TaskRunLogger::new(dir.path(), &t.job_name),
            stats.clone(),
            Duration::from_secs(1),
        )
        .unwrap();
        let handle = tokio::spawn(worker.run(rx));

        while clock.now() < t0() + TimeDelta::seconds(61) {
            tokio::task::yield_now().await;
        }
        tx.send(true).unwrap();
        let exit = handle.await.unwrap().unwrap();

        assert_eq!(exit.reason, StopReason::Shutdown);
        assert!(exit.runs >= 2, "runs = {}", exit.runs);
        assert!(exec.calls.load(Ordering::SeqCst) >= 2);
        assert!(stats.ledger().await.unwrap()[0].executions >= 2);
    }

    #[tokio::test]
    async fn shutdown_before_first_fire_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let t = task(ScheduleSpec::scheduled(Frequency::Once, t0() + TimeDelta::days(1)));
        let exec = CountingExecutor::default();
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let worker = SchedulerWorker::new(
            t.clone(),
            ManualClock::new(t0()),
            exec.clone(),
            TaskRunLogger::new(dir.path(), &t.job_name),
            stats(),
            Duration::from_secs(1),
        )
        .unwrap();
        let exit = worker.run(rx).await.unwrap();
        assert_eq!(exit, WorkerExit { runs: 0, reason: StopReason::Shutdown });
        assert_eq!(exec.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn launch_failure_stops_worker_and_is_logged() {
        let dir = tempfile::tempdir().unwrap();
        let t = task(ScheduleSpec::now(Frequency::Once, t0()));
        let logger = TaskRunLogger::new(dir.path(), &t.job_name);
        let (_tx, rx) = watch::channel(false);

        let worker = SchedulerWorker::new(
            t,
            ManualClock::new(t0()),
            FailingExecutor,
            logger.clone(),
            stats(),
            Duration::from_secs(1),
        )
        .unwrap();
        let err = worker.run(rx).await.unwrap_err();
        assert!(matches!(err, WorkerError::Launch(_)));
        let log = std::fs::read_to_string(logger.execution_log()).unwrap();
        assert!(log.contains(" Failed echo hi"));
    }

    #[tokio::test]
    async fn unwritable_log_stops_worker_before_running() {
        let dir = tempfile::tempdir().unwrap();
        let t = task(ScheduleSpec::now(Frequency::Once, t0()));
        let exec = CountingExecutor::default();
        let (_tx, rx) = watch::channel(false);

        let worker = SchedulerWorker::new(
            t.clone(),
            ManualClock::new(t0()),
            exec.clone(),
            TaskRunLogger::new(&dir.path().join("missing"), &t.job_name),
            stats(),
            Duration::from_secs(1),
        )
        .unwrap();
        assert!(matches!(worker.run(rx).await, Err(WorkerError::Log { .. })));
        assert_eq!(exec.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_schedule_is_rejected_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let t = task(ScheduleSpec::now(Frequency::Daily { weekdays: vec![] }, t0()));
        let result = SchedulerWorker::new(
            t.clone(),
            ManualClock::new(t0()),
            CountingExecutor::default(),
            TaskRunLogger::new(dir.path(), &t.job_name),
            stats(),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(WorkerError::Schedule(_))));
    }
}
