use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("storage error: {0}")]
    Store(#[from] tasker_store::StoreError),

    #[error("failed to start stats writer: {0}")]
    Spawn(#[from] std::io::Error),

    /// The writer task has stopped; no further updates can be applied.
    #[error("stats writer is not running")]
    Closed,
}

pub type Result<T> = std::result::Result<T, StatsError>;
