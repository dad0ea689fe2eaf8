use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid job name {name:?}: {reason}")]
    InvalidJobName { name: String, reason: String },

    #[error("Invalid task id {0}: must be 1 or greater")]
    InvalidTaskId(i64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Short error code, stable across releases, printed by the CLI.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Config(_) => "CONFIG_ERROR",
            CoreError::InvalidJobName { .. } => "INVALID_JOB_NAME",
            CoreError::InvalidTaskId(_) => "INVALID_TASK_ID",
            CoreError::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
