//! Storage layer error types.

use thiserror::Error;

use crate::storage::engine::FailPoint;
use crate::storage::types::{InvalidNameError, RowKey, TableName};

/// The main error type for storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// the requested table was not found
    #[error("table not found: {0}")]
    TableNotFound(TableName),

    /// the table already exists
    #[error("table already exists: {0}")]
    TableAlreadyExists(TableName),

    /// the requested row was not found
    #[error("row not found: table={table}, key={key}")]
    RowNotFound { table: TableName, key: RowKey },

    /// the row already exists (duplicate primary key)
    #[error("row already exists: table={table}, key={key}")]
    RowAlreadyExists { table: TableName, key: RowKey },

    /// invalid table name or row key
    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),

    /// the row data doesn't have the expected shape
    #[error("schema violation: {0}")]
    SchemaViolation(String),

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// raw statement not understood by the engine
    #[error("unsupported statement: {0}")]
    UnsupportedStatement(String),

    /// the transaction was already committed or rolled back
    #[error("transaction {txn_id} is closed")]
    TxnClosed { txn_id: String },

    /// an armed fail point fired
    #[error("injected failure at {0}")]
    InjectedFailure(FailPoint),

    /// internal error that shouldn't happen
    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::TableNotFound(_) | StorageError::RowNotFound { .. }
        )
    }

    /// check if this error is a uniqueness conflict
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StorageError::TableAlreadyExists(_) | StorageError::RowAlreadyExists { .. }
        )
    }
}

/// result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
