//! Transaction error types.

use thiserror::Error;

use crate::db::DbError;

/// Result type for transaction operations.
pub type TxnResult<T> = Result<T, TxnError>;

/// Errors raised by [`TxnProvider`](super::TxnProvider).
///
/// Callbacks may use their own error type as long as it converts from this
/// one; the provider only ever creates the variants below.
#[derive(Debug, Error)]
pub enum TxnError {
    /// The provider was built without a storage handle.
    #[error("transaction provider has no storage handle")]
    Unconfigured,

    /// The storage handle refused to begin a transaction.
    #[error("failed to begin transaction: {0}")]
    Begin(#[source] DbError),

    /// Commit failed after the callback succeeded.
    #[error("failed to commit transaction: {0}")]
    Commit(#[source] DbError),

    /// The callback panicked; the transaction was rolled back.
    #[error("db transaction panic: {message} at {location}, stack: \n{backtrace}")]
    Panicked {
        message: String,
        /// `file:line:column` of the panic.
        location: String,
        backtrace: String,
    },

    /// A data-access error raised inside the callback.
    #[error("{0}")]
    Db(#[from] DbError),

    /// The callback asked for the transaction to be abandoned.
    #[error("transaction aborted: {0}")]
    Aborted(String),
}

impl TxnError {
    /// Convenience constructor for [`TxnError::Aborted`].
    pub fn aborted(reason: impl Into<String>) -> Self {
        TxnError::Aborted(reason.into())
    }

    /// Check if this error came from a panicking callback.
    pub fn is_panic(&self) -> bool {
        matches!(self, TxnError::Panicked { .. })
    }

    /// Check if the callback succeeded but the commit did not.
    pub fn is_commit_failure(&self) -> bool {
        matches!(self, TxnError::Commit(_))
    }
}
