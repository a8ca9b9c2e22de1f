//! # atrium-core
//!
//! Core types, settings, module registry, and error types for the atrium framework.
//! This crate has no framework dependencies and provides the foundation for all other crates.
//!
//! ## Modules
//!
//! - [`error`] - Error types and result aliases
//! - [`utils`] - Text helpers used for table naming
//! - [`settings`] - Framework settings and global configuration
//! - [`settings_loader`] - Loading settings from TOML/JSON and `ATRIUM_*` variables
//! - [`modules`] - Installed module registry
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod logging;
pub mod modules;
pub mod settings;
pub mod settings_loader;
pub mod utils;

// Re-export the most commonly used types at the crate root.
pub use error::{AtriumError, AtriumResult};
pub use settings::{DatabaseSettings, Settings, SETTINGS};
