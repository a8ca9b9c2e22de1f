//! # atrium
//!
//! A Django-style query engine for Rust.
//!
//! This is the meta-crate that re-exports the sub-crates for convenient
//! access. Depend on `atrium` to get everything, or on the individual crates
//! for finer-grained control.
//!
//! ```no_run
//! use atrium::prelude::*;
//!
//! # fn main() -> AtriumResult<()> {
//! let settings = atrium::core::settings_loader::from_toml_file_with_env("atrium.toml")?;
//! atrium::core::logging::setup_logging(&settings);
//! let db = atrium::open_database(&settings.database)?;
//! # let _ = db;
//! # Ok(())
//! # }
//! ```

/// Settings, module registry, logging setup, and error types.
pub use atrium_core as core;

/// The query engine: models, `Q` filters, `QuerySet`, `Manager`, and sessions.
pub use atrium_db as db;

/// Database backends: `SQLite`.
pub use atrium_db_backends as db_backends;

pub use atrium_db::q;

/// The types most applications need.
pub mod prelude {
    pub use atrium_core::{AtriumError, AtriumResult, Settings};
    pub use atrium_db::fields::{FieldDef, FieldType, OnDelete};
    pub use atrium_db::model::{Model, ModelMeta};
    pub use atrium_db::query::{Fetched, Manager, QuerySet, Row, Q};
    pub use atrium_db::relations::RelationDef;
    pub use atrium_db::session::{Database, SessionOptions};
    pub use atrium_db::value::Value;
}

#[cfg(feature = "sqlite")]
use atrium_core::{AtriumError, AtriumResult, DatabaseSettings};

/// Opens a [`Database`](atrium_db::Database) for the configured provider.
///
/// # Errors
///
/// [`AtriumError::ImproperlyConfigured`] for a provider without a compiled-in
/// backend.
#[cfg(feature = "sqlite")]
pub fn open_database(settings: &DatabaseSettings) -> AtriumResult<atrium_db::Database> {
    match settings.provider.as_str() {
        "sqlite" => {
            let connector = atrium_db_backends::SqliteConnector::from_settings(settings)?;
            Ok(atrium_db::Database::new(connector))
        }
        other => Err(AtriumError::ImproperlyConfigured(format!(
            "No backend available for database provider '{other}'"
        ))),
    }
}
