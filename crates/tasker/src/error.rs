use thiserror::Error;

use tasker_core::CoreError;
use tasker_process::ProcessError;
use tasker_scheduler::{ScheduleError, WorkerError};
use tasker_stats::StatsError;
use tasker_store::StoreError;

/// Errors surfaced by [`crate::TaskService`] and the worker entrypoint.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid job name {name:?}: {reason}")]
    InvalidJobName { name: String, reason: String },

    #[error("Invalid task id {0}: must be 1 or greater")]
    InvalidTaskId(i64),

    /// Kill requested for a pid that no registered task owns.
    #[error("Process {0} is not a registered task worker")]
    UnregisteredProcess(u32),

    /// Rejected before any worker process exists.
    #[error("Invalid schedule: {0}")]
    Schedule(#[from] ScheduleError),

    /// Launch failure or process-not-found.
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Stats error: {0}")]
    Stats(#[from] StatsError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CoreError> for ServiceError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Config(msg) => Self::Config(msg),
            CoreError::InvalidJobName { name, reason } => Self::InvalidJobName { name, reason },
            CoreError::InvalidTaskId(id) => Self::InvalidTaskId(id),
            CoreError::Io(io) => Self::Io(io),
        }
    }
}

impl ServiceError {
    /// Short error code printed by the CLI.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::InvalidJobName { .. } => "INVALID_JOB_NAME",
            Self::InvalidTaskId(_) => "INVALID_TASK_ID",
            Self::UnregisteredProcess(_) => "UNREGISTERED_PROCESS",
            Self::Schedule(_) => "SCHEDULE_ERROR",
            Self::Process(ProcessError::NotFound(_)) => "PROCESS_NOT_FOUND",
            Self::Process(_) => "LAUNCH_ERROR",
            Self::Storage(_) | Self::Stats(_) => "STORAGE_ERROR",
            Self::Worker(_) => "WORKER_ERROR",
            Self::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
