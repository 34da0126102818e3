//! Storage layer.
//!
//! A small in-memory table/row engine standing in for a real database driver.
//! It provides what the transaction layer needs from a backend: a connection
//! source per statement, and transactions that can be begun, committed and
//! rolled back.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      MemoryEngine                           │
//! │        (committed tables, stats, fail points)               │
//! └─────────────────────────────────────────────────────────────┘
//!                 │                           │
//!                 ▼                           ▼
//!          ┌─────────────┐             ┌─────────────┐
//!          │ PooledConn  │             │   TxConn    │
//!          │(auto-commit)│             │ (snapshot + │
//!          └─────────────┘             │   journal)  │
//!                 │                    └─────────────┘
//!                 └─────────────┬─────────────┘
//!                               ▼
//!                        dyn ConnPool
//! ```

mod conn;
mod engine;
mod error;
mod operation;
mod row;
mod types;

pub use conn::{ConnPool, PooledConn, TxConn};
pub use engine::{EngineStats, FailPoint, MemoryEngine};
pub use error::{StorageError, StorageResult};
pub use operation::{OpKind, Operation, Outcome, RawStatement};
pub use row::Row;
pub use types::{InvalidNameError, RowKey, TableName};
