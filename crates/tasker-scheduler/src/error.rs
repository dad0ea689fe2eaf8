use std::path::PathBuf;

use thiserror::Error;

use crate::types::TimeUnit;

/// A recurrence definition that cannot produce fire times.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("every {quantity} {unit} is out of range (1..={max})")]
    QuantityOutOfRange { unit: TimeUnit, quantity: u32, max: u32 },

    #[error("daily schedule needs at least one weekday")]
    NoWeekdays,

    #[error("fire time out of the representable date range")]
    OutOfRange,

    #[error("invalid schedule: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    /// A worker that cannot write its execution log stops.
    #[error("cannot write execution log {}: {source}", path.display())]
    Log {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("run could not be started: {0}")]
    Launch(#[from] tasker_process::ProcessError),
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
