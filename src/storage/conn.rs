//! Connections: where an operation actually runs.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use ulid::Ulid;

use crate::storage::engine::{EngineInner, FailPoint};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::operation::{Operation, Outcome, Tables};

/// A connection source that executes operations.
///
/// Every statement carries one of these; routing a statement into a
/// transaction means swapping its connection source.
pub trait ConnPool: Send + Sync + fmt::Debug {
    /// Execute one operation.
    fn execute(&self, op: &Operation) -> StorageResult<Outcome>;

    /// Id of the transaction this connection belongs to, if any.
    fn transaction_id(&self) -> Option<&str> {
        None
    }
}

/// Auto-commit connection onto the engine's committed data.
pub struct PooledConn {
    engine: Arc<EngineInner>,
}

impl PooledConn {
    pub(crate) fn new(engine: Arc<EngineInner>) -> Self {
        Self { engine }
    }
}

impl ConnPool for PooledConn {
    fn execute(&self, op: &Operation) -> StorageResult<Outcome> {
        if op.kind().is_write() {
            op.apply(&mut self.engine.tables.write())
        } else {
            op.read(&self.engine.tables.read())
        }
    }
}

impl fmt::Debug for PooledConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PooledConn")
    }
}

struct TxState {
    workspace: Tables,
    journal: Vec<Operation>,
}

/// Connection bound to one in-progress transaction.
pub struct TxConn {
    id: String,
    started_at: DateTime<Utc>,
    engine: Arc<EngineInner>,
    /// `None` once committed or rolled back.
    state: Mutex<Option<TxState>>,
}

impl TxConn {
    pub(crate) fn new(engine: Arc<EngineInner>, snapshot: Tables) -> Self {
        Self {
            id: Ulid::new().to_string().to_lowercase(),
            started_at: Utc::now(),
            engine,
            state: Mutex::new(Some(TxState {
                workspace: snapshot,
                journal: Vec::new(),
            })),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().is_none()
    }

    /// Number of writes recorded so far.
    pub fn pending_writes(&self) -> usize {
        self.state.lock().as_ref().map_or(0, |s| s.journal.len())
    }

    fn closed(&self) -> StorageError {
        StorageError::TxnClosed {
            txn_id: self.id.clone(),
        }
    }

    /// Publish the journal. The transaction is closed whatever the outcome.
    pub fn commit(&self) -> StorageResult<()> {
        let state = self.state.lock().take().ok_or_else(|| self.closed())?;

        let result = self.engine.check(FailPoint::Commit).and_then(|()| {
            let mut tables = self.engine.tables.write();
            let mut next = tables.clone();
            for op in &state.journal {
                op.apply(&mut next)?;
            }
            *tables = next;
            Ok(())
        });

        match result {
            Ok(()) => self.engine.record(|s| s.committed += 1),
            Err(_) => self.engine.record(|s| s.rolled_back += 1),
        }
        result
    }

    /// Discard the journal. The transaction is closed whatever the outcome.
    pub fn rollback(&self) -> StorageResult<()> {
        self.state.lock().take().ok_or_else(|| self.closed())?;
        self.engine.record(|s| s.rolled_back += 1);
        self.engine.check(FailPoint::Rollback)
    }
}

impl ConnPool for TxConn {
    fn execute(&self, op: &Operation) -> StorageResult<Outcome> {
        let mut guard = self.state.lock();
        let state = guard.as_mut().ok_or_else(|| self.closed())?;

        if !op.kind().is_write() {
            return op.read(&state.workspace);
        }
        let outcome = op.apply(&mut state.workspace)?;
        state.journal.push(op.clone());
        Ok(outcome)
    }

    fn transaction_id(&self) -> Option<&str> {
        Some(&self.id)
    }
}

impl fmt::Debug for TxConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxConn")
            .field("id", &self.id)
            .field("started_at", &self.started_at)
            .field("closed", &self.state.try_lock().map(|s| s.is_none()))
            .finish()
    }
}
