//! Per-job execution logs.
//!
//! `{dir}/{job}.txt` holds one marker line per event. `{dir}/{job}_stdout.txt`
//! gets the same start markers, each preceded by a delimiter line, followed by
//! whatever the command printed.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tasker_core::{JobName, DATE_FORMAT};

use crate::error::WorkerError;

/// Marker written when a run starts.
pub const EXECUTED: &str = "Executed";
pub const FINISHED: &str = "Finished";
pub const FAILED: &str = "Failed";

pub fn execution_log_path(dir: &Path, job: &JobName) -> PathBuf {
    dir.join(format!("{job}.txt"))
}

pub fn output_log_path(dir: &Path, job: &JobName) -> PathBuf {
    dir.join(format!("{job}_stdout.txt"))
}

fn delimiter() -> String {
    format!("\n{}\n", "=".repeat(70))
}

#[derive(Debug, Clone)]
pub struct TaskRunLogger {
    execution_log: PathBuf,
    output_log: PathBuf,
}

impl TaskRunLogger {
    pub fn new(dir: &Path, job: &JobName) -> Self {
        Self {
            execution_log: execution_log_path(dir, job),
            output_log: output_log_path(dir, job),
        }
    }

    pub fn execution_log(&self) -> &Path {
        &self.execution_log
    }

    /// Where the command's stdout/stderr go.
    pub fn output_log(&self) -> &Path {
        &self.output_log
    }

    /// `<ts> Executed <command>` in both files.
    pub fn started(&self, at: NaiveDateTime, command: &str) -> Result<(), WorkerError> {
        let line = marker(at, EXECUTED, command);
        append(&self.execution_log, &line)?;
        append(&self.output_log, &format!("{}{line}", delimiter()))
    }

    pub fn finished(
        &self,
        at: NaiveDateTime,
        command: &str,
        exit_code: Option<i32>,
        duration: f64,
    ) -> Result<(), WorkerError> {
        let exit = exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string());
        let detail = format!("{command} (exit {exit}, {duration:.2}s)");
        append(&self.execution_log, &marker(at, FINISHED, &detail))
    }

    pub fn failed(&self, at: NaiveDateTime, command: &str, reason: &str) -> Result<(), WorkerError> {
        append(
            &self.execution_log,
            &marker(at, FAILED, &format!("{command} ({reason})")),
        )
    }
}

fn marker(at: NaiveDateTime, msg: &str, command: &str) -> String {
    format!("{} {msg} {command}\n", at.format(DATE_FORMAT))
}

fn append(path: &Path, text: &str) -> Result<(), WorkerError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut f| f.write_all(text.as_bytes()))
        .map_err(|source| WorkerError::Log {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(7, 8, 9)
            .unwrap()
    }

    #[test]
    fn started_marker_goes_to_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let job = JobName::parse("Titan-0001").unwrap();
        let log = TaskRunLogger::new(dir.path(), &job);

        log.started(ts(), "echo hi").unwrap();
        log.started(ts(), "echo hi").unwrap();

        let exec = std::fs::read_to_string(dir.path().join("Titan-0001.txt")).unwrap();
        assert_eq!(
            exec,
            "2024-05-06 07:08:09 Executed echo hi\n2024-05-06 07:08:09 Executed echo hi\n"
        );

        let out = std::fs::read_to_string(dir.path().join("Titan-0001_stdout.txt")).unwrap();
        assert_eq!(out.matches(&"=".repeat(70)).count(), 2);
        assert!(out.ends_with("Executed echo hi\n"));
    }

    #[test]
    fn finished_marker_has_exit_and_duration() {
        let dir = tempfile::tempdir().unwrap();
        let job = JobName::parse("j").unwrap();
        let log = TaskRunLogger::new(dir.path(), &job);

        log.finished(ts(), "sleep 1", Some(0), 1.004).unwrap();
        log.finished(ts(), "sleep 1", None, 0.5).unwrap();
        let exec = std::fs::read_to_string(log.execution_log()).unwrap();
        let lines: Vec<_> = exec.lines().collect();
        assert_eq!(lines[0], "2024-05-06 07:08:09 Finished sleep 1 (exit 0, 1.00s)");
        assert_eq!(lines[1], "2024-05-06 07:08:09 Finished sleep 1 (exit signal, 0.50s)");
    }

    #[test]
    fn unwritable_log_is_a_log_error() {
        let dir = tempfile::tempdir().unwrap();
        let log = TaskRunLogger::new(&dir.path().join("gone"), &JobName::parse("j").unwrap());
        assert!(matches!(log.started(ts(), "x"), Err(WorkerError::Log { .. })));
    }
}
