//! Transaction provider - the entry point for units of work.
//!
//! [`TxnProvider::transaction`] runs a callback inside a transaction on one
//! storage handle:
//!
//! - If the context already carries a transaction for that handle, the
//!   callback simply runs with the same context (join). Nothing is begun,
//!   committed or rolled back at this level.
//! - Otherwise a transaction is begun, bound into a child context, and the
//!   callback runs with that context (root). Success commits; an error or a
//!   panic rolls back.
//!
//! Bindings are keyed by handle identity, so providers over different
//! handles never join each other's transactions, even through one context.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::context::Context;
use crate::db::{Db, DbError};
use crate::identity::{identity_of, HandleId};
use crate::txn::binding;
use crate::txn::error::{TxnError, TxnResult};
use crate::txn::panic::{Guard, PanicSite};

/// Provider configuration options.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Attach a stack trace to errors converted from callback panics.
    pub capture_backtrace: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            capture_backtrace: true,
        }
    }
}

impl ProviderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set capture_backtrace flag.
    pub fn capture_backtrace(mut self, value: bool) -> Self {
        self.capture_backtrace = value;
        self
    }
}

/// What the provider knows about a root transaction.
#[derive(Debug, Clone)]
pub struct TxnInfo {
    pub id: String,
    pub handle: HandleId,
    pub started_at: DateTime<Utc>,
}

type RollbackObserver = Arc<dyn Fn(&TxnInfo, &DbError) + Send + Sync>;

/// Runs units of work in transactions on one storage handle.
///
/// Cheap to clone; clones behave identically.
#[derive(Clone)]
pub struct TxnProvider {
    db: Option<Db>,
    id: HandleId,
    config: ProviderConfig,
    on_rollback_error: Option<RollbackObserver>,
}

impl TxnProvider {
    /// Create a provider for `db`. Pass `None` for an unconfigured provider,
    /// whose root transactions fail with [`TxnError::Unconfigured`].
    pub fn new(db: impl Into<Option<Db>>) -> Self {
        Self::with_config(db, ProviderConfig::default())
    }

    pub fn with_config(db: impl Into<Option<Db>>, config: ProviderConfig) -> Self {
        let db = db.into();
        Self {
            id: identity_of(db.as_ref()),
            db,
            config,
            on_rollback_error: None,
        }
    }

    /// Observe rollback failures, which are otherwise only logged.
    pub fn on_rollback_error<F>(mut self, observer: F) -> Self
    where
        F: Fn(&TxnInfo, &DbError) + Send + Sync + 'static,
    {
        self.on_rollback_error = Some(Arc::new(observer));
        self
    }

    /// Identity of the wrapped handle.
    pub fn handle_id(&self) -> HandleId {
        self.id
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Check if `ctx` already carries a transaction for this provider's handle.
    pub fn in_transaction(&self, ctx: &Context) -> bool {
        binding::lookup(ctx, self.id).is_some()
    }

    /// Run `f` in a transaction, joining one already bound in `ctx`.
    ///
    /// Returns `Ok` only if `f` succeeded and, when this call began the
    /// transaction, the commit succeeded. A panic inside `f` is caught,
    /// rolled back and returned as [`TxnError::Panicked`].
    pub fn transaction<T, E, F>(&self, ctx: &Context, f: F) -> Result<T, E>
    where
        F: FnOnce(&Context) -> Result<T, E>,
        E: From<TxnError>,
    {
        if self.in_transaction(ctx) {
            debug!(target: "txnscope::txn", handle = %self.id, "joining active transaction");
            return f(ctx);
        }

        let db = self.db.as_ref().ok_or(TxnError::Unconfigured)?;
        let txn = db.begin().map_err(TxnError::Begin)?;
        let info = self.info(&txn);
        debug!(target: "txnscope::txn", handle = %info.handle, txn = %info.id, "transaction started");

        let child = binding::bind(ctx, self.id, txn.clone());
        let guard = Guard::enter(self.config.capture_backtrace);
        let result = match panic::catch_unwind(AssertUnwindSafe(|| f(&child))) {
            Ok(result) => result,
            Err(payload) => Err(E::from(self.panicked(guard.take(payload), &info))),
        };
        drop(guard);
        drop(child);

        match result {
            Ok(value) => {
                txn.commit().map_err(TxnError::Commit)?;
                debug!(
                    target: "txnscope::txn",
                    handle = %info.handle,
                    txn = %info.id,
                    elapsed_ms = (Utc::now() - info.started_at).num_milliseconds(),
                    "transaction committed"
                );
                Ok(value)
            }
            Err(err) => {
                self.rollback(&txn, &info);
                Err(err)
            }
        }
    }

    /// [`transaction`](Self::transaction) for callbacks returning no value.
    pub fn run_in_transaction<F>(&self, ctx: &Context, f: F) -> TxnResult<()>
    where
        F: FnOnce(&Context) -> TxnResult<()>,
    {
        self.transaction(ctx, f)
    }

    /// Roll back, reporting but never returning a failure.
    fn rollback(&self, txn: &Db, info: &TxnInfo) {
        match txn.rollback() {
            Ok(()) => {
                debug!(target: "txnscope::txn", handle = %info.handle, txn = %info.id, "transaction rolled back");
            }
            Err(e) => {
                warn!(
                    target: "txnscope::txn",
                    handle = %info.handle,
                    txn = %info.id,
                    error = %e,
                    "rollback failed"
                );
                if let Some(observer) = &self.on_rollback_error {
                    (observer.as_ref())(info, &e);
                }
            }
        }
    }

    fn panicked(&self, site: PanicSite, info: &TxnInfo) -> TxnError {
        warn!(
            target: "txnscope::txn",
            handle = %info.handle,
            txn = %info.id,
            location = %site.location,
            "callback panicked"
        );
        TxnError::Panicked {
            message: site.message,
            location: site.location,
            backtrace: site.backtrace,
        }
    }

    fn info(&self, txn: &Db) -> TxnInfo {
        match txn.transaction() {
            Some(conn) => TxnInfo {
                id: conn.id().to_string(),
                handle: self.id,
                started_at: conn.started_at(),
            },
            None => TxnInfo {
                id: "-".to_string(),
                handle: self.id,
                started_at: Utc::now(),
            },
        }
    }
}

/// A unit-of-work runner.
///
/// Services hold an `Arc<dyn Transactional>` rather than a concrete
/// provider, so tests can substitute a runner that needs no storage.
pub trait Transactional: Send + Sync {
    /// Run `f` in a transaction, joining one already bound in `ctx`.
    fn run_in_transaction(
        &self,
        ctx: &Context,
        f: &mut dyn FnMut(&Context) -> TxnResult<()>,
    ) -> TxnResult<()>;
}

impl Transactional for TxnProvider {
    fn run_in_transaction(
        &self,
        ctx: &Context,
        f: &mut dyn FnMut(&Context) -> TxnResult<()>,
    ) -> TxnResult<()> {
        self.transaction(ctx, f)
    }
}

impl fmt::Debug for TxnProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxnProvider")
            .field("handle", &self.id)
            .field("configured", &self.db.is_some())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FailPoint, MemoryEngine, Row, RowKey, TableName};
    use crate::txn::plugin::TxnRoutingPlugin;
    use parking_lot::Mutex;
    use serde_json::json;

    fn users() -> TableName {
        TableName::new("users").unwrap()
    }

    fn row(key: &str) -> Row {
        Row::from_value(RowKey::new(key).unwrap(), json!({"name": key})).unwrap()
    }

    fn open(engine: &MemoryEngine) -> (Db, TxnProvider) {
        let db = Db::open(engine.clone());
        db.use_plugin(TxnRoutingPlugin::new()).unwrap();
        let provider = TxnProvider::new(db.clone());
        (db, provider)
    }

    fn setup() -> (MemoryEngine, Db, TxnProvider) {
        let engine = MemoryEngine::new();
        let (db, provider) = open(&engine);
        db.exec(&Context::background(), "CREATE TABLE users").unwrap();
        (engine, db, provider)
    }

    fn keys(engine: &MemoryEngine) -> Vec<String> {
        engine
            .scan(&users())
            .unwrap()
            .into_iter()
            .map(|r| r.key.as_str().to_string())
            .collect()
    }

    #[test]
    fn test_commit_on_success() {
        let (engine, db, provider) = setup();
        let ctx = Context::background();

        provider
            .run_in_transaction(&ctx, |ctx| {
                db.create(ctx, &users(), row("a"))?;
                // Uncommitted work is invisible outside the transaction.
                assert!(engine.scan(&users()).unwrap().is_empty());
                db.create(ctx, &users(), row("b"))?;
                Ok(())
            })
            .unwrap();

        assert_eq!(keys(&engine), vec!["a", "b"]);
        assert_eq!(engine.stats().committed, 1);
    }

    #[test]
    fn test_rollback_on_error() {
        let (engine, db, provider) = setup();
        let err = provider
            .run_in_transaction(&Context::background(), |ctx| {
                db.create(ctx, &users(), row("a"))?;
                Err(TxnError::aborted("first rollback"))
            })
            .unwrap_err();

        assert!(matches!(err, TxnError::Aborted(_)));
        assert!(keys(&engine).is_empty());
        assert_eq!(engine.stats().rolled_back, 1);
    }

    #[test]
    fn test_nested_same_handle_joins() {
        let (engine, db, provider) = setup();
        provider
            .run_in_transaction(&Context::background(), |ctx| {
                db.create(ctx, &users(), row("a"))?;
                provider.run_in_transaction(ctx, |ctx| {
                    assert!(provider.in_transaction(ctx));
                    db.create(ctx, &users(), row("b"))?;
                    Ok(())
                })
            })
            .unwrap();

        assert_eq!(keys(&engine), vec!["a", "b"]);
        let stats = engine.stats();
        assert_eq!((stats.begun, stats.committed), (1, 1));
    }

    #[test]
    fn test_swallowed_inner_error_does_not_roll_back_outer() {
        let (engine, db, provider) = setup();
        provider
            .run_in_transaction(&Context::background(), |ctx| {
                db.create(ctx, &users(), row("a"))?;
                let inner = provider.run_in_transaction(ctx, |ctx| {
                    db.create(ctx, &users(), row("b"))?;
                    Err(TxnError::aborted("inner"))
                });
                assert!(inner.is_err());
                Ok(())
            })
            .unwrap();

        // The join frame does not roll back; its write rides on the outer commit.
        assert_eq!(keys(&engine), vec!["a", "b"]);
    }

    #[test]
    fn test_join_propagates_error_unchanged() {
        let (_engine, _db, provider) = setup();
        let err = provider
            .run_in_transaction(&Context::background(), |ctx| {
                provider.run_in_transaction(ctx, |_| Err(TxnError::aborted("inner")))
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "transaction aborted: inner");
    }

    #[test]
    fn test_distinct_handles_are_independent() {
        let (engine, db1, provider1) = setup();
        let (db2, provider2) = open(&engine);

        let err = provider1
            .run_in_transaction(&Context::background(), |ctx| {
                db1.create(ctx, &users(), row("a"))?;
                provider2.run_in_transaction(ctx, |ctx| {
                    db2.create(ctx, &users(), row("b"))?;
                    Ok(())
                })?;
                Err(TxnError::aborted("provider1 rollback"))
            })
            .unwrap_err();

        assert!(matches!(err, TxnError::Aborted(_)));
        assert_eq!(keys(&engine), vec!["b"]);
        let stats = engine.stats();
        assert_eq!((stats.begun, stats.committed, stats.rolled_back), (2, 1, 1));
    }

    #[test]
    fn test_panic_rolls_back() {
        let (engine, db, provider) = setup();
        let err = provider
            .run_in_transaction(&Context::background(), |ctx| {
                db.create(ctx, &users(), row("a"))?;
                panic!("exploded mid-transaction");
            })
            .unwrap_err();

        match &err {
            TxnError::Panicked { message, .. } => assert_eq!(message, "exploded mid-transaction"),
            other => panic!("expected panic error, got {other:?}"),
        }
        assert!(err.to_string().contains("exploded mid-transaction"));
        assert!(keys(&engine).is_empty());
        assert_eq!(engine.stats().rolled_back, 1);
    }

    #[test]
    fn test_panic_without_backtrace() {
        let engine = MemoryEngine::new();
        let db = Db::open(engine);
        let provider =
            TxnProvider::with_config(db, ProviderConfig::new().capture_backtrace(false));
        assert!(!provider.config().capture_backtrace);

        let err = provider
            .run_in_transaction(&Context::background(), |_| panic!("{}", 42))
            .unwrap_err();
        match err {
            TxnError::Panicked {
                message,
                location,
                backtrace,
            } => {
                assert_eq!(message, "42");
                assert!(location.starts_with(file!()), "{location}");
                assert!(backtrace.is_empty());
            }
            other => panic!("expected panic error, got {other:?}"),
        }
    }

    fn reserve_stock(_ctx: &Context) -> TxnResult<()> {
        let shelves: Vec<u32> = Vec::new();
        match shelves.first() {
            Some(_) => Ok(()),
            None => panic!("no shelf to reserve from"),
        }
    }

    #[test]
    fn test_panic_reports_faulting_frame() {
        let (_engine, _db, provider) = setup();
        assert!(provider.config().capture_backtrace);

        let err = provider
            .run_in_transaction(&Context::background(), reserve_stock)
            .unwrap_err();
        let TxnError::Panicked {
            location,
            backtrace,
            ..
        } = &err
        else {
            panic!("expected panic error, got {err:?}");
        };
        assert!(location.starts_with(file!()), "{location}");
        assert!(backtrace.contains("reserve_stock"), "{backtrace}");
        assert!(err.to_string().contains(location.as_str()));
    }

    #[test]
    fn test_unconfigured_provider() {
        let provider = TxnProvider::new(None::<Db>);
        assert!(provider.handle_id().is_none());

        let mut called = false;
        let err = provider
            .run_in_transaction(&Context::background(), |_| {
                called = true;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, TxnError::Unconfigured));
        assert!(!called);
    }

    #[test]
    fn test_begin_failure() {
        let (engine, _db, provider) = setup();
        engine.fail_next(FailPoint::Begin);

        let err = provider
            .run_in_transaction(&Context::background(), |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, TxnError::Begin(_)));
    }

    #[test]
    fn test_commit_failure_is_returned() {
        let (engine, db, provider) = setup();
        engine.fail_next(FailPoint::Commit);

        let err = provider
            .run_in_transaction(&Context::background(), |ctx| {
                db.create(ctx, &users(), row("a"))?;
                Ok(())
            })
            .unwrap_err();
        assert!(err.is_commit_failure());
        assert!(keys(&engine).is_empty());
    }

    #[test]
    fn test_rollback_failure_does_not_mask_error() {
        let (engine, db, provider) = setup();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let observed = seen.clone();
        let provider = provider.on_rollback_error(move |info, e| {
            observed.lock().push((info.handle, e.to_string()));
        });
        engine.fail_next(FailPoint::Rollback);

        let err = provider
            .run_in_transaction(&Context::background(), |ctx| {
                db.create(ctx, &users(), row("a"))?;
                Err(TxnError::aborted("original"))
            })
            .unwrap_err();

        assert_eq!(err.to_string(), "transaction aborted: original");
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, db.id());
        assert!(seen[0].1.contains("rollback"));
    }

    #[test]
    fn test_returns_callback_value() {
        let (_engine, db, provider) = setup();
        let count: Result<usize, TxnError> =
            provider.transaction(&Context::background(), |ctx| {
                db.create(ctx, &users(), row("a"))?;
                Ok(db.find(ctx, &users())?.len())
            });
        assert_eq!(count.unwrap(), 1);
    }

    #[test]
    fn test_outside_scope_uses_default_connection() {
        let (engine, db, _provider) = setup();
        db.create(&Context::background(), &users(), row("free")).unwrap();
        assert_eq!(keys(&engine), vec!["free"]);
        assert_eq!(engine.stats().begun, 0);
    }

    #[test]
    fn test_leaked_context_cannot_reuse_transaction() {
        let (_engine, db, provider) = setup();
        let mut leaked = None;
        provider
            .run_in_transaction(&Context::background(), |ctx| {
                leaked = Some(ctx.clone());
                Ok(())
            })
            .unwrap();

        let err = db
            .create(&leaked.unwrap(), &users(), row("late"))
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Storage(crate::storage::StorageError::TxnClosed { .. })
        ));
    }
}
