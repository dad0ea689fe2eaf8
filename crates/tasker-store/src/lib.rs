//! `tasker-store` — durable storage for the task registry and the stats ledger.
//!
//! Two collections live in one SQLite file:
//!
//! | Collection      | Key         | Written by                          |
//! |-----------------|-------------|-------------------------------------|
//! | `processes`     | `task_id`   | the submitter, once per task        |
//! | `process_stats` | `task_name` | the stats tracker, once per run     |
//!
//! Loading a collection that was never created yields
//! [`StoreError::CollectionMissing`], which callers map to "empty" through
//! [`OrEmpty::or_empty`]. Every other error is a real storage failure.

pub mod db;
pub mod error;
pub mod repository;

pub use db::Collection;
pub use error::{OrEmpty, Result, StoreError};
pub use repository::{Repository, SaveMode, SqliteRepository};
