//! Handle identity.
//!
//! Every [`Db`] handle gets a process-unique [`HandleId`] when it is opened.
//! The id namespaces transaction bindings in a [`Context`](crate::context::Context),
//! so two handles sharing one context never see each other's transactions.
//!
//! Ids come from a monotonically increasing counter and are never reused,
//! not even after the handle that owned one has been dropped.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::db::Db;

/// Stable, comparable identity of a storage handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct HandleId(u64);

impl HandleId {
    /// Sentinel for "no handle". Never matches a binding lookup.
    pub const NONE: HandleId = HandleId(0);

    /// Allocate the next id.
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        HandleId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Check if this is the sentinel id.
    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    /// Raw counter value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "db#-")
        } else {
            write!(f, "db#{}", self.0)
        }
    }
}

/// Identity of a handle, or [`HandleId::NONE`] when there is no handle.
pub fn identity_of(db: Option<&Db>) -> HandleId {
    db.map(Db::id).unwrap_or(HandleId::NONE)
}
