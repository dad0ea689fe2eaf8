#![cfg(unix)]

use std::time::Duration;

use chrono::{Local, TimeDelta};
use tasker_core::JobName;
use tasker_scheduler::{
    Frequency, ProcessExecutor, ScheduleSpec, ScheduledTask, SchedulerWorker, StopReason,
    SystemClock, TaskRunLogger, TimeUnit,
};
use tasker_stats::StatsTracker;
use tasker_store::SqliteRepository;
use tokio::sync::watch;

#[tokio::test]
async fn once_task_runs_real_command_and_captures_output() {
    let dir = tempfile::tempdir().unwrap();
    let job = JobName::parse("Dione-e2e").unwrap();
    let stats = StatsTracker::spawn(SqliteRepository::open_in_memory().unwrap()).unwrap();
    let logger = TaskRunLogger::new(dir.path(), &job);
    let (_tx, rx) = watch::channel(false);

    let task = ScheduledTask {
        job_name: job,
        command: "echo hello-from-task".into(),
        schedule: ScheduleSpec::now(Frequency::Once, Local::now().naive_local()),
    };
    let worker = SchedulerWorker::new(
        task,
        SystemClock,
        ProcessExecutor,
        logger.clone(),
        stats.clone(),
        Duration::from_millis(50),
    )
    .unwrap();

    let exit = worker.run(rx).await.unwrap();
    assert_eq!(exit.runs, 1);
    assert_eq!(exit.reason, StopReason::Completed);

    let output = std::fs::read_to_string(logger.output_log()).unwrap();
    assert!(output.contains("Executed echo hello-from-task"));
    assert!(output.ends_with("hello-from-task\n"));

    let execution = std::fs::read_to_string(logger.execution_log()).unwrap();
    assert!(execution.contains("Finished echo hello-from-task (exit 0,"));

    let row = &stats.ledger().await.unwrap()[0];
    assert_eq!(row.task_name, "Dione-e2e");
    assert_eq!(row.executions, 1);
}

#[tokio::test]
async fn scheduled_task_in_the_future_can_be_shut_down() {
    let dir = tempfile::tempdir().unwrap();
    let job = JobName::parse("Tethys-idle").unwrap();
    let stats = StatsTracker::spawn(SqliteRepository::open_in_memory().unwrap()).unwrap();
    let (tx, rx) = watch::channel(false);

    let task = ScheduledTask {
        job_name: job.clone(),
        command: "true".into(),
        schedule: ScheduleSpec::scheduled(
            Frequency::Interval {
                unit: TimeUnit::Hours,
                quantity: 1,
            },
            Local::now().naive_local() + TimeDelta::hours(1),
        ),
    };
    let worker = SchedulerWorker::new(
        task,
        SystemClock,
        ProcessExecutor,
        TaskRunLogger::new(dir.path(), &job),
        stats,
        Duration::from_secs(1),
    )
    .unwrap();
    let handle = tokio::spawn(worker.run(rx));

    tokio::time::sleep(Duration::from_millis(100)).await;
    tx.send(true).unwrap();
    // The poll sleep is interrupted, so this returns well before one second.
    let exit = tokio::time::timeout(Duration::from_millis(900), handle)
        .await
        .expect("worker ignored shutdown")
        .unwrap()
        .unwrap();
    assert_eq!(exit.runs, 0);
    assert_eq!(exit.reason, StopReason::Shutdown);
}
