//! Plugins: named bundles of callbacks installed on a handle.

use crate::db::error::DbResult;
use crate::db::handle::Db;

/// An extension installed once per handle with [`Db::use_plugin`].
pub trait Plugin: Send + Sync {
    /// Globally unique plugin name.
    fn name(&self) -> &str;

    /// Register the plugin's callbacks on `db`.
    fn initialize(&self, db: &Db) -> DbResult<()>;
}
