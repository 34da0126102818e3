//! The storage handle.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::context::Context;
use crate::db::callbacks::{run_before, CallbackRegistry, Callbacks};
use crate::db::error::{DbError, DbResult};
use crate::db::plugin::Plugin;
use crate::db::statement::Statement;
use crate::identity::HandleId;
use crate::storage::{
    ConnPool, MemoryEngine, Operation, Outcome, RawStatement, Row, RowKey, TableName, TxConn,
};

/// Handle configuration options.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Name used in log output.
    pub name: String,
    /// Log every statement at debug level.
    pub verbose: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            verbose: false,
        }
    }
}

impl DbConfig {
    /// Create a configuration with the given handle name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set verbose flag.
    pub fn verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }
}

struct DbInner {
    id: HandleId,
    config: DbConfig,
    engine: MemoryEngine,
    callbacks: RwLock<Callbacks>,
    plugins: Mutex<Vec<String>>,
}

/// A configured connection to a storage engine.
///
/// Clones share identity, configuration and callbacks. A handle returned by
/// [`Db::begin`] shares them too, but executes on its own transaction
/// connection until committed or rolled back.
#[derive(Clone)]
pub struct Db {
    inner: Arc<DbInner>,
    conn: Arc<dyn ConnPool>,
    txn: Option<Arc<TxConn>>,
}

impl Db {
    /// Open a handle with default configuration.
    pub fn open(engine: MemoryEngine) -> Self {
        Self::open_with_config(engine, DbConfig::default())
    }

    pub fn open_with_config(engine: MemoryEngine, config: DbConfig) -> Self {
        let id = HandleId::next();
        debug!(target: "txnscope::db", handle = %id, name = %config.name, "handle opened");
        Self {
            conn: engine.pool(),
            txn: None,
            inner: Arc::new(DbInner {
                id,
                config,
                engine,
                callbacks: RwLock::new(Callbacks::new()),
                plugins: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> HandleId {
        self.inner.id
    }

    pub fn config(&self) -> &DbConfig {
        &self.inner.config
    }

    pub fn engine(&self) -> &MemoryEngine {
        &self.inner.engine
    }

    /// Connection source statements on this handle start out with.
    pub fn conn_pool(&self) -> Arc<dyn ConnPool> {
        self.conn.clone()
    }

    pub fn is_transaction(&self) -> bool {
        self.txn.is_some()
    }

    /// The transaction connection, for a handle returned by [`Db::begin`].
    pub fn transaction(&self) -> Option<&Arc<TxConn>> {
        self.txn.as_ref()
    }

    // ==================== Extension ====================

    /// Access the before-hook pipelines.
    pub fn callback(&self) -> CallbackRegistry<'_> {
        CallbackRegistry::new(&self.inner.callbacks, self.inner.id)
    }

    /// Install a plugin. Each plugin name may be installed once per handle.
    pub fn use_plugin<P: Plugin>(&self, plugin: P) -> DbResult<()> {
        let name = plugin.name().to_string();
        {
            let mut plugins = self.inner.plugins.lock();
            if plugins.contains(&name) {
                return Err(DbError::PluginRegistered(name));
            }
            plugins.push(name.clone());
        }

        if let Err(e) = plugin.initialize(self) {
            self.inner.plugins.lock().retain(|p| p != &name);
            return Err(e);
        }
        debug!(target: "txnscope::db", handle = %self.inner.id, plugin = %name, "plugin installed");
        Ok(())
    }

    /// Names of installed plugins.
    pub fn plugins(&self) -> Vec<String> {
        self.inner.plugins.lock().clone()
    }

    // ==================== Transaction Control ====================

    /// Begin a transaction, returning a transactional handle.
    pub fn begin(&self) -> DbResult<Db> {
        if let Some(txn) = &self.txn {
            return Err(DbError::AlreadyInTransaction(txn.id().to_string()));
        }
        let txn = self.inner.engine.begin()?;
        debug!(target: "txnscope::db", handle = %self.inner.id, txn = txn.id(), "begin");
        Ok(Db {
            inner: self.inner.clone(),
            conn: txn.clone(),
            txn: Some(txn),
        })
    }

    pub fn commit(&self) -> DbResult<()> {
        let txn = self.txn.as_ref().ok_or(DbError::NotInTransaction)?;
        txn.commit()?;
        debug!(target: "txnscope::db", handle = %self.inner.id, txn = txn.id(), "commit");
        Ok(())
    }

    pub fn rollback(&self) -> DbResult<()> {
        let txn = self.txn.as_ref().ok_or(DbError::NotInTransaction)?;
        txn.rollback()?;
        debug!(target: "txnscope::db", handle = %self.inner.id, txn = txn.id(), "rollback");
        Ok(())
    }

    // ==================== Data Access ====================

    /// Insert a new row.
    pub fn create(&self, ctx: &Context, table: &TableName, row: Row) -> DbResult<()> {
        let op = Operation::Create {
            table: table.clone(),
            row,
        };
        self.run(ctx, op)?.into_affected()?;
        Ok(())
    }

    /// Merge `row`'s columns into the stored row with the same key.
    pub fn update(&self, ctx: &Context, table: &TableName, row: Row) -> DbResult<()> {
        let op = Operation::Update {
            table: table.clone(),
            row,
        };
        self.run(ctx, op)?.into_affected()?;
        Ok(())
    }

    /// Delete a row. Returns the number of rows removed.
    pub fn delete(&self, ctx: &Context, table: &TableName, key: &RowKey) -> DbResult<usize> {
        let op = Operation::Delete {
            table: table.clone(),
            key: key.clone(),
        };
        Ok(self.run(ctx, op)?.into_affected()?)
    }

    /// Execute a raw statement (see [`RawStatement::parse`]).
    pub fn exec(&self, ctx: &Context, sql: &str) -> DbResult<usize> {
        let op = Operation::Raw(RawStatement::parse(sql)?);
        Ok(self.run(ctx, op)?.into_affected()?)
    }

    /// All rows of a table.
    pub fn find(&self, ctx: &Context, table: &TableName) -> DbResult<Vec<Row>> {
        let op = Operation::Query {
            table: table.clone(),
        };
        Ok(self.run(ctx, op)?.into_rows()?)
    }

    /// A single row by key.
    pub fn row(&self, ctx: &Context, table: &TableName, key: &RowKey) -> DbResult<Option<Row>> {
        let op = Operation::Row {
            table: table.clone(),
            key: key.clone(),
        };
        Ok(self.run(ctx, op)?.into_row()?)
    }

    fn run(&self, ctx: &Context, operation: Operation) -> DbResult<Outcome> {
        let mut stmt = Statement::new(self.inner.id, ctx.clone(), self.conn.clone(), operation);
        run_before(&self.inner.callbacks, &mut stmt);

        if self.inner.config.verbose {
            debug!(
                target: "txnscope::db",
                handle = %self.inner.id,
                name = %self.inner.config.name,
                kind = %stmt.kind(),
                txn = stmt.conn_pool.transaction_id().unwrap_or("-"),
                "execute"
            );
        }
        Ok(stmt.conn_pool.execute(&stmt.operation)?)
    }
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("id", &self.inner.id)
            .field("name", &self.inner.config.name)
            .field("txn", &self.txn.as_ref().map(|t| t.id()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn users() -> TableName {
        TableName::new("users").unwrap()
    }

    fn row(key: &str) -> Row {
        Row::from_value(RowKey::new(key).unwrap(), json!({"name": key})).unwrap()
    }

    fn setup() -> (Db, Context) {
        let db = Db::open_with_config(MemoryEngine::new(), DbConfig::new("test").verbose(true));
        let ctx = Context::background();
        db.exec(&ctx, "CREATE TABLE users").unwrap();
        (db, ctx)
    }

    #[test]
    fn test_crud_on_pool() {
        let (db, ctx) = setup();
        let table = users();
        assert_eq!(db.config().name, "test");
        assert!(db.config().verbose);

        db.create(&ctx, &table, row("a")).unwrap();
        db.create(&ctx, &table, row("b")).unwrap();
        assert!(db.create(&ctx, &table, row("a")).unwrap_err().is_conflict());

        db.update(&ctx, &table, Row::from_value(RowKey::new("a").unwrap(), json!({"age": 3})).unwrap())
            .unwrap();
        let a = db.row(&ctx, &table, &RowKey::new("a").unwrap()).unwrap().unwrap();
        assert_eq!(a.get("age"), Some(&json!(3)));
        assert_eq!(a.version, 2);

        assert_eq!(db.delete(&ctx, &table, &RowKey::new("b").unwrap()).unwrap(), 1);
        assert_eq!(db.find(&ctx, &table).unwrap().len(), 1);
        assert_eq!(db.exec(&ctx, "DELETE FROM users").unwrap(), 1);
        db.exec(&ctx, "DROP TABLE users").unwrap();
        assert!(!db.engine().table_exists(&table));
    }

    #[test]
    fn test_begin_commit_rollback() {
        let (db, ctx) = setup();
        let table = users();

        let tx = db.begin().unwrap();
        assert!(tx.is_transaction());
        assert_eq!(tx.id(), db.id());
        tx.create(&ctx, &table, row("a")).unwrap();
        assert!(db.find(&ctx, &table).unwrap().is_empty());
        tx.commit().unwrap();
        assert_eq!(db.find(&ctx, &table).unwrap().len(), 1);

        let tx = db.begin().unwrap();
        tx.create(&ctx, &table, row("b")).unwrap();
        tx.rollback().unwrap();
        assert_eq!(db.find(&ctx, &table).unwrap().len(), 1);
    }

    #[test]
    fn test_transaction_control_misuse() {
        let (db, _ctx) = setup();
        assert!(matches!(db.commit(), Err(DbError::NotInTransaction)));
        assert!(matches!(db.rollback(), Err(DbError::NotInTransaction)));

        let tx = db.begin().unwrap();
        assert!(matches!(tx.begin(), Err(DbError::AlreadyInTransaction(_))));
        tx.commit().unwrap();
        assert!(matches!(tx.commit(), Err(DbError::Storage(_))));
    }

    #[test]
    fn test_hook_can_reroute_statement() {
        let (db, ctx) = setup();
        let table = users();
        let tx = db.begin().unwrap();
        let conn = tx.conn_pool();

        db.callback()
            .create()
            .register("reroute", move |stmt| stmt.conn_pool = conn.clone())
            .unwrap();

        // Issued on the plain handle, executed on the transaction.
        db.create(&ctx, &table, row("a")).unwrap();
        assert!(db.engine().scan(&table).unwrap().is_empty());
        tx.commit().unwrap();
        assert_eq!(db.engine().scan(&table).unwrap().len(), 1);
    }

    struct Named(&'static str);

    impl Plugin for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn initialize(&self, db: &Db) -> DbResult<()> {
            if self.0.is_empty() {
                return Err(DbError::EmptyCallbackName);
            }
            db.callback().query().register(self.0, |_| {})
        }
    }

    #[test]
    fn test_use_plugin_once() {
        let (db, _ctx) = setup();
        db.use_plugin(Named("p1")).unwrap();
        assert!(matches!(db.use_plugin(Named("p1")), Err(DbError::PluginRegistered(_))));
        assert_eq!(db.plugins(), vec!["p1".to_string()]);
        assert_eq!(db.callback().query().names(), vec!["p1".to_string()]);

        // A failed initialize leaves no trace in the registry.
        assert!(db.use_plugin(Named("")).is_err());
        assert_eq!(db.plugins(), vec!["p1".to_string()]);
    }
}
