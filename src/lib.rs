//! txnscope - context-scoped, reentrant transactions
//!
//! This crate lets application code group data-access calls spread over many
//! functions into one atomic unit of work, without passing a transaction
//! handle through every signature. A [`TxnProvider`] runs a callback in a
//! transaction (or joins the one already in the [`Context`]), and a routing
//! hook moves every statement issued under that context onto the
//! transaction's connection.
//!
//! # Example
//!
//! ```no_run
//! use txnscope::{Context, Db, MemoryEngine, Row, RowKey, TableName, TxnError, TxnProvider, TxnRoutingPlugin};
//!
//! let db = Db::open(MemoryEngine::new());
//! db.use_plugin(TxnRoutingPlugin::new()).unwrap();
//! let provider = TxnProvider::new(db.clone());
//!
//! let ctx = Context::background();
//! db.exec(&ctx, "CREATE TABLE users").unwrap();
//! let users = TableName::new("users").unwrap();
//!
//! provider
//!     .run_in_transaction(&ctx, |ctx| {
//!         let row = Row::from_value(RowKey::new("1").unwrap(), serde_json::json!({"name": "Alice"}))
//!             .map_err(|e| TxnError::aborted(e.to_string()))?;
//!         db.create(ctx, &users, row)?;
//!         Ok(())
//!     })
//!     .unwrap();
//! ```

pub mod context;
pub mod db;
pub mod identity;
pub mod storage;
pub mod txn;

pub use context::{Context, ContextKey};
pub use db::{Db, DbConfig, DbError, DbResult, Plugin, Statement};
pub use identity::{identity_of, HandleId};
pub use storage::{MemoryEngine, Row, RowKey, TableName};
pub use txn::{
    ProviderConfig, Transactional, TxnError, TxnProvider, TxnResult, TxnRoutingPlugin, PLUGIN_NAME,
};
