//! Named before-hook pipelines, one per operation kind.
//!
//! Hooks are registered by name through a small builder:
//!
//! ```ignore
//! db.callback()
//!     .create()
//!     .before("*")
//!     .register("audit:stamp", |stmt| { /* inspect or rewrite stmt */ })?;
//! ```
//!
//! `before("*")` places a hook ahead of every hook not registered that way;
//! `before("name")` places it directly ahead of `name`; a plain `register`
//! appends. Registering an existing name replaces the old hook.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use crate::db::error::{DbError, DbResult};
use crate::db::statement::Statement;
use crate::identity::HandleId;
use crate::storage::OpKind;

/// A before-hook.
pub type Hook = Arc<dyn Fn(&mut Statement) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Position {
    First,
    Before(String),
    Last,
}

struct Entry {
    name: String,
    hook: Hook,
    first: bool,
}

#[derive(Default)]
struct Processor {
    entries: Vec<Entry>,
}

impl Processor {
    /// Insert `hook`, returning true if it replaced a hook of the same name.
    fn register(&mut self, name: &str, position: Position, hook: Hook) -> bool {
        let replaced = match self.entries.iter().position(|e| e.name == name) {
            Some(i) => {
                self.entries.remove(i);
                true
            }
            None => false,
        };

        let (index, first) = match &position {
            Position::First => (self.entries.iter().take_while(|e| e.first).count(), true),
            Position::Before(target) => match self.entries.iter().position(|e| &e.name == target) {
                Some(i) => (i, self.entries[i].first),
                None => (self.entries.len(), false),
            },
            Position::Last => (self.entries.len(), false),
        };

        self.entries.insert(
            index,
            Entry {
                name: name.to_string(),
                hook,
                first,
            },
        );
        replaced
    }

    fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.name != name);
        self.entries.len() != before
    }
}

/// All pipelines of one handle.
pub(crate) struct Callbacks {
    processors: HashMap<OpKind, Processor>,
}

impl Callbacks {
    pub(crate) fn new() -> Self {
        Self {
            processors: OpKind::ALL
                .iter()
                .map(|kind| (*kind, Processor::default()))
                .collect(),
        }
    }

    fn processor_mut(&mut self, kind: OpKind) -> &mut Processor {
        self.processors.entry(kind).or_default()
    }

    fn hooks(&self, kind: OpKind) -> Vec<Hook> {
        self.processors
            .get(&kind)
            .map(|p| p.entries.iter().map(|e| e.hook.clone()).collect())
            .unwrap_or_default()
    }

    fn names(&self, kind: OpKind) -> Vec<String> {
        self.processors
            .get(&kind)
            .map(|p| p.entries.iter().map(|e| e.name.clone()).collect())
            .unwrap_or_default()
    }
}

/// Run the before-hooks for `stmt`'s kind in order.
///
/// Hooks are snapshotted first so a hook may register further hooks
/// without deadlocking; those take effect from the next statement.
pub(crate) fn run_before(callbacks: &RwLock<Callbacks>, stmt: &mut Statement) {
    let hooks = callbacks.read().hooks(stmt.kind());
    for hook in hooks {
        (*hook)(stmt);
    }
}

/// Entry point returned by [`Db::callback`](super::Db::callback).
pub struct CallbackRegistry<'a> {
    callbacks: &'a RwLock<Callbacks>,
    handle: HandleId,
}

impl<'a> CallbackRegistry<'a> {
    pub(crate) fn new(callbacks: &'a RwLock<Callbacks>, handle: HandleId) -> Self {
        Self { callbacks, handle }
    }

    pub fn processor(&self, kind: OpKind) -> ProcessorRef<'a> {
        ProcessorRef {
            callbacks: self.callbacks,
            handle: self.handle,
            kind,
        }
    }

    pub fn create(&self) -> ProcessorRef<'a> {
        self.processor(OpKind::Create)
    }

    pub fn update(&self) -> ProcessorRef<'a> {
        self.processor(OpKind::Update)
    }

    pub fn delete(&self) -> ProcessorRef<'a> {
        self.processor(OpKind::Delete)
    }

    pub fn raw(&self) -> ProcessorRef<'a> {
        self.processor(OpKind::Raw)
    }

    pub fn query(&self) -> ProcessorRef<'a> {
        self.processor(OpKind::Query)
    }

    pub fn row(&self) -> ProcessorRef<'a> {
        self.processor(OpKind::Row)
    }
}

/// The pipeline of one operation kind.
pub struct ProcessorRef<'a> {
    callbacks: &'a RwLock<Callbacks>,
    handle: HandleId,
    kind: OpKind,
}

impl<'a> ProcessorRef<'a> {
    /// Position the next registration ahead of `target` (`"*"` for all).
    pub fn before(self, target: &str) -> CallbackBuilder<'a> {
        let position = if target == "*" {
            Position::First
        } else {
            Position::Before(target.to_string())
        };
        CallbackBuilder {
            processor: self,
            position,
        }
    }

    /// Append a hook at the end of the pipeline.
    pub fn register<F>(self, name: &str, hook: F) -> DbResult<()>
    where
        F: Fn(&mut Statement) + Send + Sync + 'static,
    {
        self.insert(name, Position::Last, Arc::new(hook))
    }

    /// Remove a hook by name. Returns false if it was not registered.
    pub fn remove(&self, name: &str) -> bool {
        self.callbacks.write().processor_mut(self.kind).remove(name)
    }

    /// Registered hook names, in execution order.
    pub fn names(&self) -> Vec<String> {
        self.callbacks.read().names(self.kind)
    }

    fn insert(&self, name: &str, position: Position, hook: Hook) -> DbResult<()> {
        if name.is_empty() {
            return Err(DbError::EmptyCallbackName);
        }
        let replaced = self
            .callbacks
            .write()
            .processor_mut(self.kind)
            .register(name, position, hook);
        if replaced {
            warn!(
                target: "txnscope::db",
                handle = %self.handle,
                kind = %self.kind,
                callback = name,
                "callback already registered, replacing"
            );
        }
        Ok(())
    }
}

/// A positioned registration.
pub struct CallbackBuilder<'a> {
    processor: ProcessorRef<'a>,
    position: Position,
}

impl CallbackBuilder<'_> {
    pub fn register<F>(self, name: &str, hook: F) -> DbResult<()>
    where
        F: Fn(&mut Statement) + Send + Sync + 'static,
    {
        self.processor.insert(name, self.position, Arc::new(hook))
    }
}
