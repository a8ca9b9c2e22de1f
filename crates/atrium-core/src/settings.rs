//! Settings system for the atrium framework.
//!
//! This module provides the [`Settings`] struct, which holds all framework configuration,
//! and [`LazySettings`], a globally-accessible, lazily-initialized settings instance.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::{AtriumError, AtriumResult};

/// Database connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// The database provider: `sqlite` or `postgresql`.
    pub provider: String,
    /// The database name (or file path for `SQLite`).
    pub name: String,
    /// The database host.
    pub host: String,
    /// The database port (0 means the provider default).
    pub port: u16,
    /// The database user.
    pub user: String,
    /// The database password.
    pub password: String,
    /// Additional provider-specific options.
    pub options: HashMap<String, String>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            provider: "sqlite".to_string(),
            name: "db.sqlite3".to_string(),
            host: String::new(),
            port: 0,
            user: String::new(),
            password: String::new(),
            options: HashMap::new(),
        }
    }
}

impl DatabaseSettings {
    /// Renders the connection URL for these settings.
    ///
    /// # Examples
    ///
    /// ```
    /// use atrium_core::settings::DatabaseSettings;
    ///
    /// let db = DatabaseSettings::default();
    /// assert_eq!(db.url().unwrap(), "sqlite:///db.sqlite3");
    /// ```
    pub fn url(&self) -> AtriumResult<String> {
        match self.provider.as_str() {
            "sqlite" => Ok(format!("sqlite:///{}", self.name)),
            "postgresql" => {
                let mut url = String::from("postgresql://");
                if !self.user.is_empty() {
                    url.push_str(&self.user);
                    if !self.password.is_empty() {
                        url.push(':');
                        url.push_str(&self.password);
                    }
                    url.push('@');
                }
                url.push_str(if self.host.is_empty() { "127.0.0.1" } else { &self.host });
                if self.port != 0 {
                    url.push_str(&format!(":{}", self.port));
                }
                url.push('/');
                url.push_str(&self.name);
                Ok(url)
            }
            other => Err(AtriumError::ImproperlyConfigured(format!(
                "Unsupported database provider '{other}' (supported: sqlite, postgresql)"
            ))),
        }
    }
}

/// The complete set of framework settings.
///
/// Use [`SETTINGS`] to access the global instance.
///
/// # Examples
///
/// ```
/// use atrium_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert!(settings.debug);
/// assert_eq!(settings.database.provider, "sqlite");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // ── General ──────────────────────────────────────────────────────

    /// Whether debug mode is enabled.
    pub debug: bool,
    /// The human-readable project name.
    pub project_name: String,
    /// The project version string.
    pub project_version: String,

    // ── Database ─────────────────────────────────────────────────────

    /// The database connection.
    pub database: DatabaseSettings,

    // ── Modules ──────────────────────────────────────────────────────

    /// Dotted names of the installed modules.
    pub installed_modules: Vec<String>,

    // ── Logging ──────────────────────────────────────────────────────

    /// The log filter (e.g. "info", "debug", "atrium_db=debug").
    pub log_level: String,

    // ── Escape hatch ─────────────────────────────────────────────────

    /// Custom settings that don't fit into the above categories.
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: true,
            project_name: "Atrium Project".to_string(),
            project_version: "0.0.1".to_string(),
            database: DatabaseSettings::default(),
            installed_modules: Vec::new(),
            log_level: "info".to_string(),
            extra: HashMap::new(),
        }
    }
}

/// A lazily-initialized, globally-accessible settings container.
///
/// Call [`configure`](LazySettings::configure) once at startup to set the
/// settings, then use [`get`](LazySettings::get) to access them.
pub struct LazySettings {
    inner: OnceLock<Settings>,
}

impl Default for LazySettings {
    fn default() -> Self {
        Self::new()
    }
}

impl LazySettings {
    /// Creates a new, unconfigured `LazySettings`.
    pub const fn new() -> Self {
        Self {
            inner: OnceLock::new(),
        }
    }

    /// Configures the global settings. Must be called exactly once.
    ///
    /// # Panics
    ///
    /// Panics if settings have already been configured.
    pub fn configure(&self, settings: Settings) {
        self.inner
            .set(settings)
            .expect("Settings have already been configured");
    }

    /// Returns a reference to the configured settings.
    ///
    /// # Panics
    ///
    /// Panics if settings have not been configured.
    pub fn get(&self) -> &Settings {
        self.inner
            .get()
            .expect("Settings have not been configured. Call SETTINGS.configure() first.")
    }

    /// Returns the configured settings, or `ImproperlyConfigured` if
    /// [`configure`](LazySettings::configure) has not been called yet.
    pub fn try_get(&self) -> AtriumResult<&Settings> {
        self.inner.get().ok_or_else(|| {
            AtriumError::ImproperlyConfigured("Settings have not been configured".to_string())
        })
    }

    /// Returns `true` if settings have been configured.
    pub fn is_configured(&self) -> bool {
        self.inner.get().is_some()
    }
}

/// The global settings instance.
///
/// Call `SETTINGS.configure(settings)` once at application startup, then
/// access settings via `SETTINGS.get()` anywhere in the framework.
pub static SETTINGS: LazySettings = LazySettings::new();
