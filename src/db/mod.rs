//! Storage handles and their operation pipelines.
//!
//! A [`Db`] issues create / update / delete / raw / query / row operations.
//! Each operation becomes a [`Statement`] that runs through the handle's
//! before-hooks for its kind, then executes on the statement's connection
//! source. Hooks may rewrite that connection source; this is the extension
//! point transaction routing is built on.

mod callbacks;
mod error;
mod handle;
mod plugin;
mod statement;

pub use callbacks::{CallbackBuilder, CallbackRegistry, Hook, ProcessorRef};
pub use error::{DbError, DbResult};
pub use handle::{Db, DbConfig};
pub use plugin::Plugin;
pub use statement::Statement;
