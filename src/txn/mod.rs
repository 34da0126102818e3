//! Context-scoped transactions.
//!
//! Two pieces cooperate through a shared handle identity:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TxnProvider                            │
//! │   (join or begin; bind txn into ctx; commit / rollback)     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ ctx carries Txn(handle id) → txn
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │             callback: ordinary Db calls with ctx            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ every statement
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │          RouteHook (installed by TxnRoutingPlugin)          │
//! │      (swap statement's connection for the txn's one)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use txnscope::{Context, Db, MemoryEngine, TxnProvider, TxnRoutingPlugin};
//!
//! let db = Db::open(MemoryEngine::new());
//! db.use_plugin(TxnRoutingPlugin::new())?;
//! let provider = TxnProvider::new(db.clone());
//!
//! provider.run_in_transaction(&Context::background(), |ctx| {
//!     db.create(ctx, &users, alice)?;
//!     accounts_service.open_for(ctx, &alice_key)?; // joins the same transaction
//!     Ok(())
//! })?;
//! ```

mod binding;
mod error;
mod panic;
mod plugin;
mod provider;

pub use binding::lookup;
pub use error::{TxnError, TxnResult};
pub use plugin::{RouteHook, TxnRoutingPlugin, PLUGIN_NAME};
pub use provider::{ProviderConfig, Transactional, TxnInfo, TxnProvider};
