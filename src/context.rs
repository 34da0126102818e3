//! Ambient request context.
//!
//! A [`Context`] is an immutable chain of key/value pairs. Extending it with
//! [`Context::with_value`] returns a new context that shares the parent's
//! chain; the parent never changes. Lookups walk from the newest entry back to
//! the root, so an inner binding shadows an outer one for the same key.
//!
//! ```text
//!   background ──► Named("request_id") ──► Txn(db#1) ──► Txn(db#2)
//!                                             ▲              ▲
//!                                        ctx handed to    ctx handed to
//!                                        db#1 callback    db#2 callback
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::identity::HandleId;

/// Key of a context entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContextKey {
    /// Active transaction binding for a storage handle.
    Txn(HandleId),
    /// Application-defined value.
    Named(&'static str),
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextKey::Txn(id) => write!(f, "txn:{}", id),
            ContextKey::Named(name) => write!(f, "{}", name),
        }
    }
}

struct Node {
    key: ContextKey,
    value: Arc<dyn Any + Send + Sync>,
    parent: Option<Arc<Node>>,
}

/// Immutable, cheaply clonable request context.
#[derive(Clone, Default)]
pub struct Context {
    head: Option<Arc<Node>>,
}

impl Context {
    /// The empty root context.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a child context carrying `value` under `key`.
    pub fn with_value<T>(&self, key: ContextKey, value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            head: Some(Arc::new(Node {
                key,
                value: Arc::new(value),
                parent: self.head.clone(),
            })),
        }
    }

    /// Look up the innermost value stored under `key`.
    ///
    /// Returns `None` if the key is absent or if the innermost value for the
    /// key is not a `T`. Outer entries for the same key are not consulted.
    pub fn value<T>(&self, key: &ContextKey) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let node = self.find(key)?;
        node.value.clone().downcast::<T>().ok()
    }

    /// Check if any entry exists for `key`, whatever its type.
    pub fn contains(&self, key: &ContextKey) -> bool {
        self.find(key).is_some()
    }

    /// Number of entries in the chain.
    pub fn depth(&self) -> usize {
        self.iter().count()
    }

    fn find(&self, key: &ContextKey) -> Option<&Node> {
        self.iter().find(|node| &node.key == key)
    }

    fn iter(&self) -> impl Iterator<Item = &Node> {
        std::iter::successors(self.head.as_deref(), |node| node.parent.as_deref())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("keys", &self.iter().map(|n| n.key.to_string()).collect::<Vec<_>>())
            .finish()
    }
}
