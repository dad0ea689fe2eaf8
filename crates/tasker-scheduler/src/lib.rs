//! `tasker-scheduler` — fire-time calculation and the per-task worker loop.
//!
//! # Frequencies
//!
//! | Variant    | Fires                                              |
//! |------------|----------------------------------------------------|
//! | `Once`     | a single time, at `start` or immediately           |
//! | `Interval` | every N minutes / hours / days / weeks             |
//! | `Daily`    | once a day at the start time, listed weekdays only |
//!
//! A [`SchedulerWorker`] runs inside its own OS process, one per task. It
//! sleeps in short polls until the next fire time, runs the command to
//! completion through a [`RunExecutor`], writes markers with
//! [`TaskRunLogger`] and reports the duration to the stats ledger.

pub mod clock;
pub mod error;
pub mod executor;
pub mod runlog;
pub mod schedule;
pub mod types;
pub mod worker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ScheduleError, WorkerError};
pub use executor::{ProcessExecutor, RunExecutor, RunOutcome};
pub use runlog::TaskRunLogger;
pub use types::{ExecutionMode, Frequency, ScheduleSpec, ScheduledTask, TimeUnit};
pub use worker::{SchedulerWorker, StopReason, WorkerExit, WorkerState};
