//! `tasker-stats` — the per-task-name execution ledger.
//!
//! [`StatsTracker`] owns the repository on a dedicated writer thread and
//! applies one update at a time, so updates from the same process never race.
//! Updates from different worker processes are serialized by the
//! transactional upsert in [`tasker_store::Repository::update_stats`].

pub mod error;
pub mod ledger;
pub mod tracker;

pub use error::{Result, StatsError};
pub use ledger::{apply_run, round_duration, sort_by_executions, LedgerSummary, NO_TASKS};
pub use tracker::StatsTracker;
