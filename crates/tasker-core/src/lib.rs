//! `tasker-core` — data model, configuration and errors shared by every
//! tasker crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::TaskerConfig;
pub use error::{CoreError, Result};
pub use types::{JobName, StatsRecord, TaskId, TaskRecord, DATE_FORMAT};
