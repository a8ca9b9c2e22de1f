//! Core error types for the atrium framework.
//!
//! This module provides the error enum [`AtriumError`] shared by every crate in
//! the workspace. It covers query-construction errors (unknown lookups, bad
//! lookup values, unresolvable relationship paths), schema resolution errors,
//! lookup result errors, database errors, and configuration errors.

use thiserror::Error;

/// Boxed error type used as the `source()` of [`AtriumError::InvalidLookupValue`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The primary error type for the atrium framework.
///
/// Every message names the offending lookup key, relationship path and/or
/// model so that a failing `filter` call can be traced back to its argument.
#[derive(Error, Debug)]
pub enum AtriumError {
    // ── Query construction ───────────────────────────────────────────

    /// The suffix of a lookup key is not in the lookup table.
    #[error("Unsupported lookup '{lookup}' in '{key}'")]
    UnsupportedLookup {
        /// The full lookup key as written by the caller.
        key: String,
        /// The offending suffix.
        lookup: String,
    },

    /// The value supplied to a lookup cannot build a predicate.
    #[error("Invalid value for lookup '{lookup}' in '{key}': {source}")]
    InvalidLookupValue {
        /// The full lookup key as written by the caller.
        key: String,
        /// The lookup suffix that rejected the value.
        lookup: String,
        /// The underlying cause.
        #[source]
        source: BoxError,
    },

    /// A non-final path segment is not a relationship on the current model.
    #[error("'{model}' has no relationship '{name}' (while resolving '{path}')")]
    UnknownRelationship {
        /// The model the segment was looked up on.
        model: String,
        /// The offending segment.
        name: String,
        /// The full relationship path.
        path: String,
    },

    /// The final path segment is not a column on the current model.
    #[error("'{model}' has no attribute '{name}' (while resolving '{path}')")]
    UnknownAttribute {
        /// The model the segment was looked up on.
        model: String,
        /// The offending segment.
        name: String,
        /// The full relationship path.
        path: String,
    },

    // ── Schema resolution ────────────────────────────────────────────

    /// A foreign key target without an explicit column must have exactly one primary key.
    #[error("'{model}' must have exactly one primary key to be a foreign key target, found {count}")]
    AmbiguousPrimaryKey {
        /// The target model label.
        model: String,
        /// The number of primary key columns found.
        count: usize,
    },

    /// No model is registered under the given module and name.
    #[error("Model '{module}.{model}' is not registered (known modules: {})", known.join(", "))]
    ModelNotFound {
        /// The requested module label.
        module: String,
        /// The requested model name.
        model: String,
        /// The module labels that do have registered models.
        known: Vec<String>,
    },

    /// A relationship target string has an unsupported shape.
    #[error("Invalid relationship target: {0}")]
    InvalidTarget(String),

    // ── Lookup results ───────────────────────────────────────────────

    /// A query expected exactly one row but found none.
    #[error("Object does not exist: {0}")]
    NotFound(String),

    /// A query expected exactly one row but found several.
    #[error("Multiple objects returned when one expected: {0}")]
    MultipleResults(String),

    // ── Database ─────────────────────────────────────────────────────

    /// A generic database error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A database integrity constraint was violated.
    #[error("Integrity error: {0}")]
    IntegrityError(String),

    /// An operational database error (connection failure, lock poisoning, etc.).
    #[error("Operational error: {0}")]
    OperationalError(String),

    /// A transaction could not be started, committed or rolled back.
    #[error("Transaction error: {0}")]
    TransactionError(String),

    // ── Configuration ────────────────────────────────────────────────

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The framework is improperly configured.
    #[error("Improperly configured: {0}")]
    ImproperlyConfigured(String),

    // ── Serialization ────────────────────────────────────────────────

    /// An error occurred during serialization or deserialization.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // ── IO ───────────────────────────────────────────────────────────

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AtriumError {
    /// Returns `true` for errors raised while building a query, before any
    /// statement reaches the database.
    pub const fn is_query_construction(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedLookup { .. }
                | Self::InvalidLookupValue { .. }
                | Self::UnknownRelationship { .. }
                | Self::UnknownAttribute { .. }
        )
    }
}

/// A convenience type alias for `Result<T, AtriumError>`.
pub type AtriumResult<T> = Result<T, AtriumError>;
