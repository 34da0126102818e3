//! Active transaction bindings carried in a [`Context`].

use std::sync::Arc;

use crate::context::{Context, ContextKey};
use crate::db::Db;
use crate::identity::HandleId;

/// Find the transactional handle bound to `id` in `ctx`.
///
/// The sentinel id never matches, and a value of the wrong type under the
/// key counts as absent.
pub fn lookup(ctx: &Context, id: HandleId) -> Option<Arc<Db>> {
    if id.is_none() {
        return None;
    }
    ctx.value::<Db>(&ContextKey::Txn(id))
}

/// Derive a child of `ctx` binding `txn` to `id`.
pub(crate) fn bind(ctx: &Context, id: HandleId, txn: Db) -> Context {
    ctx.with_value(ContextKey::Txn(id), txn)
}
