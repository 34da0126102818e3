//! Handle-level errors.

use thiserror::Error;

use crate::storage::StorageError;

/// Result type for handle operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors raised by a [`Db`](super::Db) handle.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A plugin with this name is already installed on the handle.
    #[error("plugin already registered: {0}")]
    PluginRegistered(String),

    #[error("callback name must not be empty")]
    EmptyCallbackName,

    /// commit/rollback on a handle that is not transactional.
    #[error("handle is not in a transaction")]
    NotInTransaction,

    /// begin on a handle that is already transactional.
    #[error("handle is already in transaction {0}")]
    AlreadyInTransaction(String),
}

impl DbError {
    /// Check if the underlying storage reported a missing table or row.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::Storage(e) if e.is_not_found())
    }

    /// Check if the underlying storage reported a uniqueness conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DbError::Storage(e) if e.is_conflict())
    }
}
