//! In-memory storage engine.
//!
//! The engine owns the committed table data. Two kinds of connections run
//! operations against it:
//!
//! - [`PooledConn`] executes each operation directly on committed data
//!   (auto-commit).
//! - [`TxConn`] works on a private snapshot taken at begin and records every
//!   successful write in a journal. Commit replays the journal against the
//!   latest committed data and publishes the result in one step; rollback
//!   throws the snapshot away.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::storage::conn::{ConnPool, PooledConn, TxConn};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::operation::{Operation, Tables};
use crate::storage::row::Row;
use crate::storage::types::{RowKey, TableName};

/// One-shot failure that can be armed on the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Begin,
    Commit,
    Rollback,
}

impl fmt::Display for FailPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailPoint::Begin => write!(f, "begin"),
            FailPoint::Commit => write!(f, "commit"),
            FailPoint::Rollback => write!(f, "rollback"),
        }
    }
}

/// Transaction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub begun: u64,
    pub committed: u64,
    pub rolled_back: u64,
}

impl EngineStats {
    /// Transactions begun but not yet ended.
    pub fn open(&self) -> u64 {
        self.begun - self.committed - self.rolled_back
    }
}

pub(crate) struct EngineInner {
    pub(crate) tables: RwLock<Tables>,
    stats: Mutex<EngineStats>,
    armed: Mutex<HashSet<FailPoint>>,
}

impl EngineInner {
    /// Fire `point` if it is armed, disarming it.
    pub(crate) fn check(&self, point: FailPoint) -> StorageResult<()> {
        if self.armed.lock().remove(&point) {
            return Err(StorageError::InjectedFailure(point));
        }
        Ok(())
    }

    pub(crate) fn record(&self, f: impl FnOnce(&mut EngineStats)) {
        f(&mut self.stats.lock());
    }
}

/// Shared in-memory engine. Cloning shares the same data.
#[derive(Clone)]
pub struct MemoryEngine {
    inner: Arc<EngineInner>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EngineInner {
                tables: RwLock::new(Tables::new()),
                stats: Mutex::new(EngineStats::default()),
                armed: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Auto-commit connection onto committed data.
    pub fn pool(&self) -> Arc<dyn ConnPool> {
        Arc::new(PooledConn::new(self.inner.clone()))
    }

    /// Start a transaction on a snapshot of the committed data.
    pub fn begin(&self) -> StorageResult<Arc<TxConn>> {
        self.inner.check(FailPoint::Begin)?;
        let snapshot = self.inner.tables.read().clone();
        self.inner.record(|s| s.begun += 1);
        Ok(Arc::new(TxConn::new(self.inner.clone(), snapshot)))
    }

    /// Arm a one-shot failure for the next call reaching `point`.
    pub fn fail_next(&self, point: FailPoint) {
        self.inner.armed.lock().insert(point);
    }

    pub fn stats(&self) -> EngineStats {
        *self.inner.stats.lock()
    }

    // ==================== Committed-state inspection ====================

    pub fn table_exists(&self, table: &TableName) -> bool {
        self.inner.tables.read().contains_key(table)
    }

    /// Read a committed row.
    pub fn read_row(&self, table: &TableName, key: &RowKey) -> StorageResult<Option<Row>> {
        Operation::Row {
            table: table.clone(),
            key: key.clone(),
        }
        .read(&self.inner.tables.read())?
        .into_row()
    }

    /// Scan committed rows of a table.
    pub fn scan(&self, table: &TableName) -> StorageResult<Vec<Row>> {
        Operation::Query {
            table: table.clone(),
        }
        .read(&self.inner.tables.read())?
        .into_rows()
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("tables", &self.inner.tables.read().len())
            .field("stats", &self.stats())
            .finish()
    }
}
