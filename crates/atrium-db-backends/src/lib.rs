//! # atrium-db-backends
//!
//! Database backend implementations for the atrium query engine. Each backend
//! implements the blocking [`BlockingExecutor`](atrium_db::BlockingExecutor)
//! and async [`DbExecutor`](atrium_db::DbExecutor) traits, and a connector
//! implements [`ConnectionFactory`](atrium_db::ConnectionFactory) so that a
//! [`Database`](atrium_db::Database) can open one connection per session.
//!
//! Supported backends:
//! - `SQLite` (feature `sqlite`, on by default)

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteBackend, SqliteConnector};
