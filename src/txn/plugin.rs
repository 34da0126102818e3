//! Connection routing.
//!
//! [`TxnRoutingPlugin`] installs a [`RouteHook`] ahead of every other
//! before-hook on all six pipelines of a handle. For each statement the hook
//! looks for a transaction bound to its handle in the statement's context and,
//! if there is one, points the statement at the transaction's connection.
//! Ordinary data-access calls therefore join the caller's transaction without
//! taking a transaction parameter.

use tracing::trace;

use crate::db::{Db, DbResult, Plugin, Statement};
use crate::identity::{identity_of, HandleId};
use crate::storage::OpKind;
use crate::txn::binding;

/// Registration name of the routing hook and plugin.
pub const PLUGIN_NAME: &str = "txnscope:transaction-routing";

/// Plugin installing [`RouteHook`] on a handle.
#[derive(Debug, Clone, Copy, Default)]
pub struct TxnRoutingPlugin;

impl TxnRoutingPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl Plugin for TxnRoutingPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn initialize(&self, db: &Db) -> DbResult<()> {
        let hook = RouteHook::new(identity_of(Some(db)));
        for kind in OpKind::ALL {
            db.callback()
                .processor(kind)
                .before("*")
                .register(PLUGIN_NAME, move |stmt| hook.route(stmt))?;
        }
        Ok(())
    }
}

/// Redirects statements onto the connection of the transaction bound to
/// one handle.
#[derive(Debug, Clone, Copy)]
pub struct RouteHook {
    key: HandleId,
}

impl RouteHook {
    /// A hook for `key`. With [`HandleId::NONE`] the hook never routes.
    pub fn new(key: HandleId) -> Self {
        Self { key }
    }

    pub fn key(&self) -> HandleId {
        self.key
    }

    /// Route `stmt` into the bound transaction, if there is one.
    pub fn route(&self, stmt: &mut Statement) {
        if self.key.is_none() {
            return;
        }
        let Some(txn) = binding::lookup(&stmt.context, self.key) else {
            return;
        };
        stmt.conn_pool = txn.conn_pool();
        trace!(
            target: "txnscope::txn",
            handle = %self.key,
            kind = %stmt.kind(),
            txn = stmt.conn_pool.transaction_id().unwrap_or("-"),
            "statement routed into transaction"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::db::DbError;
    use crate::storage::{MemoryEngine, Operation, RawStatement, TableName};
    use crate::txn::binding::bind;

    fn statement(db: &Db, ctx: Context) -> Statement {
        Statement::new(
            db.id(),
            ctx,
            db.conn_pool(),
            Operation::Raw(RawStatement::Truncate(TableName::new("t").unwrap())),
        )
    }

    #[test]
    fn test_routes_when_bound() {
        let db = Db::open(MemoryEngine::new());
        let tx = db.begin().unwrap();
        let ctx = bind(&Context::background(), db.id(), tx.clone());

        let mut stmt = statement(&db, ctx);
        assert_eq!(stmt.handle(), db.id());
        RouteHook::new(db.id()).route(&mut stmt);

        let expected = tx.transaction().map(|t| t.id().to_string());
        assert_eq!(stmt.conn_pool.transaction_id().map(str::to_string), expected);
    }

    #[test]
    fn test_passthrough_when_unbound() {
        let db = Db::open(MemoryEngine::new());
        let mut stmt = statement(&db, Context::background());
        RouteHook::new(db.id()).route(&mut stmt);
        assert!(stmt.conn_pool.transaction_id().is_none());
    }

    #[test]
    fn test_unbound_hook_is_noop() {
        let db = Db::open(MemoryEngine::new());
        let ctx = bind(&Context::background(), db.id(), db.begin().unwrap());
        let mut stmt = statement(&db, ctx);
        RouteHook::new(HandleId::NONE).route(&mut stmt);
        assert!(stmt.conn_pool.transaction_id().is_none());
    }

    #[test]
    fn test_ignores_other_handles_binding() {
        let engine = MemoryEngine::new();
        let a = Db::open(engine.clone());
        let b = Db::open(engine);
        let ctx = bind(&Context::background(), a.id(), a.begin().unwrap());

        let mut stmt = statement(&b, ctx);
        RouteHook::new(b.id()).route(&mut stmt);
        assert!(stmt.conn_pool.transaction_id().is_none());
    }

    #[test]
    fn test_registers_first_on_every_pipeline() {
        let db = Db::open(MemoryEngine::new());
        db.callback().update().register("audit", |_| {}).unwrap();
        db.use_plugin(TxnRoutingPlugin::new()).unwrap();

        for kind in OpKind::ALL {
            let names = db.callback().processor(kind).names();
            assert_eq!(names.first().map(String::as_str), Some(PLUGIN_NAME), "{kind}");
        }
        assert_eq!(db.callback().update().names(), vec![PLUGIN_NAME.to_string(), "audit".to_string()]);

        assert!(matches!(
            db.use_plugin(TxnRoutingPlugin::new()),
            Err(DbError::PluginRegistered(_))
        ));
    }
}
