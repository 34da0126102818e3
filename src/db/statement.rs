//! The in-flight statement seen by hooks.

use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::identity::HandleId;
use crate::storage::{ConnPool, OpKind, Operation};

/// One data-access call on its way to a connection.
///
/// Before-hooks receive the statement mutably and may replace
/// [`conn_pool`](Statement::conn_pool); the operation then runs on whatever
/// connection source is left there.
pub struct Statement {
    /// Context supplied by the caller.
    pub context: Context,
    /// Connection the operation will execute on.
    pub conn_pool: Arc<dyn ConnPool>,
    /// The operation itself.
    pub operation: Operation,
    handle: HandleId,
}

impl Statement {
    pub(crate) fn new(
        handle: HandleId,
        context: Context,
        conn_pool: Arc<dyn ConnPool>,
        operation: Operation,
    ) -> Self {
        Self {
            context,
            conn_pool,
            operation,
            handle,
        }
    }

    pub fn kind(&self) -> OpKind {
        self.operation.kind()
    }

    /// Identity of the handle that issued this statement.
    pub fn handle(&self) -> HandleId {
        self.handle
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("handle", &self.handle)
            .field("kind", &self.kind())
            .field("conn_pool", &self.conn_pool)
            .field("context", &self.context)
            .finish()
    }
}
