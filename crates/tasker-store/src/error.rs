use thiserror::Error;

use crate::db::Collection;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The collection has not been created yet. Not a failure: it reads as empty.
    #[error("collection does not exist yet: {0}")]
    CollectionMissing(Collection),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored value could not be decoded back into its typed form.
    #[error("corrupt {collection} row: {reason}")]
    Corrupt { collection: Collection, reason: String },

    #[error("database connection lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Maps the "collection does not exist yet" condition to an empty table.
pub trait OrEmpty<T> {
    fn or_empty(self) -> Result<Vec<T>>;
}

impl<T> OrEmpty<T> for Result<Vec<T>> {
    fn or_empty(self) -> Result<Vec<T>> {
        match self {
            Err(StoreError::CollectionMissing(_)) => Ok(Vec::new()),
            other => other,
        }
    }
}
