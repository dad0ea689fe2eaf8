//! `tasker` — submit shell commands on a schedule, each driven by its own
//! worker process, and inspect the registry, logs and run statistics.

pub mod app;
pub mod error;
pub mod worker;

pub use app::{TaskService, TrialRun};
pub use error::{Result, ServiceError};
pub use worker::WorkerArgs;
