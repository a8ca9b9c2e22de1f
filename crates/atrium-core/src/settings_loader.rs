//! Settings loading from configuration files.
//!
//! This module provides functions to load [`Settings`] from TOML and JSON
//! sources and to apply environment variable overrides.
//!
//! ## Loading Order
//!
//! 1. Start with default settings.
//! 2. Load from a TOML or JSON file (overriding defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `ATRIUM_DEBUG` | `debug` |
//! | `ATRIUM_PROJECT_NAME` | `project_name` |
//! | `ATRIUM_LOG_LEVEL` | `log_level` |
//! | `ATRIUM_INSTALLED_MODULES` | `installed_modules` (comma-separated) |
//! | `ATRIUM_DB_PROVIDER` | `database.provider` |
//! | `ATRIUM_DB_NAME` | `database.name` |
//! | `ATRIUM_DB_HOST` | `database.host` |
//! | `ATRIUM_DB_PORT` | `database.port` |
//! | `ATRIUM_DB_USER` | `database.user` |
//! | `ATRIUM_DB_PASSWORD` | `database.password` |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use atrium_core::settings_loader;
//!
//! let settings = settings_loader::from_toml_file_with_env("config/settings.toml").unwrap();
//! ```

use std::path::Path;

use crate::error::AtriumError;
use crate::settings::Settings;

/// Loads settings from a TOML string.
///
/// Any fields not present in the TOML keep their default values.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or cannot be deserialized.
pub fn from_toml_str(toml_str: &str) -> Result<Settings, AtriumError> {
    // Deserialize into a generic value first, then merge over the defaults so
    // that partial documents keep every unspecified default.
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| AtriumError::ConfigurationError(format!("Failed to parse TOML: {e}")))?;

    merge_over_defaults(toml_to_json(toml_value), "TOML")
}

/// Loads settings from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML is malformed.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Settings, AtriumError> {
    let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
        AtriumError::ConfigurationError(format!(
            "Failed to read TOML file '{}': {e}",
            path.as_ref().display()
        ))
    })?;
    from_toml_str(&content)
}

/// Loads settings from a TOML file and then applies environment variable overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML is malformed.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<Settings, AtriumError> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from a JSON string.
///
/// # Errors
///
/// Returns an error if the JSON is malformed or cannot be deserialized.
pub fn from_json_str(json_str: &str) -> Result<Settings, AtriumError> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| AtriumError::ConfigurationError(format!("Failed to parse JSON: {e}")))?;

    merge_over_defaults(json_value, "JSON")
}

/// Loads settings from just environment variables (starting from defaults).
pub fn from_env() -> Settings {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings);
    settings
}

/// Applies `ATRIUM_*` environment variable overrides to a settings struct.
///
/// Boolean values accept "true"/"1"/"yes"; anything else is false. Unparseable
/// ports are ignored.
pub fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(val) = std::env::var("ATRIUM_DEBUG") {
        settings.debug = matches!(val.to_lowercase().as_str(), "true" | "1" | "yes");
    }

    if let Ok(val) = std::env::var("ATRIUM_PROJECT_NAME") {
        settings.project_name = val;
    }

    if let Ok(val) = std::env::var("ATRIUM_LOG_LEVEL") {
        settings.log_level = val;
    }

    if let Ok(val) = std::env::var("ATRIUM_INSTALLED_MODULES") {
        settings.installed_modules = val
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    let db = &mut settings.database;

    if let Ok(val) = std::env::var("ATRIUM_DB_PROVIDER") {
        db.provider = val;
    }

    if let Ok(val) = std::env::var("ATRIUM_DB_NAME") {
        db.name = val;
    }

    if let Ok(val) = std::env::var("ATRIUM_DB_HOST") {
        db.host = val;
    }

    if let Ok(val) = std::env::var("ATRIUM_DB_PORT") {
        if let Ok(port) = val.parse::<u16>() {
            db.port = port;
        }
    }

    if let Ok(val) = std::env::var("ATRIUM_DB_USER") {
        db.user = val;
    }

    if let Ok(val) = std::env::var("ATRIUM_DB_PASSWORD") {
        db.password = val;
    }
}

// ============================================================
// Helpers
// ============================================================

fn merge_over_defaults(value: serde_json::Value, format: &str) -> Result<Settings, AtriumError> {
    let default_json = serde_json::to_value(Settings::default()).map_err(|e| {
        AtriumError::ConfigurationError(format!("Failed to serialize default settings: {e}"))
    })?;

    let merged = merge_json(default_json, value);
    serde_json::from_value(merged).map_err(|e| {
        AtriumError::ConfigurationError(format!("Failed to deserialize settings from {format}: {e}"))
    })
}

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => {
            let map: serde_json::Map<String, serde_json::Value> = table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect();
            serde_json::Value::Object(map)
        }
    }
}

/// Deep-merges two JSON values. The `override_val` takes precedence.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = if let Some(base_v) = base_map.remove(&key) {
                    merge_json(base_v, override_v)
                } else {
                    override_v
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── TOML loading ────────────────────────────────────────────────

    #[test]
    fn test_from_toml_str_basic() {
        let toml = r#"
            project_name = "Blog"
            debug = false
            log_level = "atrium_db=debug"
        "#;
        let settings = from_toml_str(toml).unwrap();
        assert_eq!(settings.project_name, "Blog");
        assert!(!settings.debug);
        assert_eq!(settings.log_level, "atrium_db=debug");
        // Defaults preserved
        assert_eq!(settings.database.provider, "sqlite");
    }

    #[test]
    fn test_from_toml_str_partial_database() {
        let toml = r#"
            [database]
            name = "/var/lib/blog.sqlite3"
        "#;
        let settings = from_toml_str(toml).unwrap();
        assert_eq!(settings.database.name, "/var/lib/blog.sqlite3");
        assert_eq!(settings.database.provider, "sqlite");
        assert_eq!(settings.database.port, 0);
    }

    #[test]
    fn test_from_toml_str_postgres_database() {
        let toml = r#"
            [database]
            provider = "postgresql"
            name = "blog"
            user = "app"
            password = "pw"
            host = "localhost"
            port = 5432
        "#;
        let settings = from_toml_str(toml).unwrap();
        assert_eq!(
            settings.database.url().unwrap(),
            "postgresql://app:pw@localhost:5432/blog"
        );
    }

    #[test]
    fn test_from_toml_str_installed_modules() {
        let toml = r#"
            installed_modules = ["project.auth", "project.posts"]
        "#;
        let settings = from_toml_str(toml).unwrap();
        assert_eq!(settings.installed_modules, vec!["project.auth", "project.posts"]);
    }

    #[test]
    fn test_from_toml_str_empty() {
        let settings = from_toml_str("").unwrap();
        assert!(settings.debug);
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_from_toml_str_invalid() {
        let result = from_toml_str("[[invalid toml content");
        assert!(matches!(result, Err(AtriumError::ConfigurationError(_))));
    }

    #[test]
    fn test_from_toml_str_wrong_type() {
        let result = from_toml_str("debug = \"maybe\"");
        assert!(result.is_err());
    }

    // ── JSON loading ────────────────────────────────────────────────

    #[test]
    fn test_from_json_str_basic() {
        let json = r#"{
            "project_name": "json-project",
            "database": {"name": "json.sqlite3"}
        }"#;
        let settings = from_json_str(json).unwrap();
        assert_eq!(settings.project_name, "json-project");
        assert_eq!(settings.database.name, "json.sqlite3");
        assert_eq!(settings.database.provider, "sqlite");
    }

    #[test]
    fn test_from_json_str_invalid() {
        assert!(from_json_str("{invalid json").is_err());
    }

    // ── File loading ────────────────────────────────────────────────

    #[test]
    fn test_from_toml_file() {
        let dir = std::env::temp_dir().join("atrium_test_toml");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("test_settings.toml");
        std::fs::write(&path, "project_name = \"file-project\"\ndebug = false\n").unwrap();

        let settings = from_toml_file(&path).unwrap();
        assert_eq!(settings.project_name, "file-project");
        assert!(!settings.debug);

        std::fs::remove_file(&path).ok();
        std::fs::remove_dir(&dir).ok();
    }

    #[test]
    fn test_from_toml_file_missing() {
        let result = from_toml_file("/nonexistent/path/settings.toml");
        assert!(result.is_err());
    }

    // ── Environment variable overrides ──────────────────────────────

    #[test]
    fn test_apply_env_overrides_database() {
        let mut settings = Settings::default();
        std::env::set_var("ATRIUM_DB_HOST", "db.example.com");
        std::env::set_var("ATRIUM_DB_PORT", "6543");
        apply_env_overrides(&mut settings);
        assert_eq!(settings.database.host, "db.example.com");
        assert_eq!(settings.database.port, 6543);
        std::env::remove_var("ATRIUM_DB_HOST");
        std::env::remove_var("ATRIUM_DB_PORT");
    }

    #[test]
    fn test_apply_env_overrides_installed_modules() {
        let mut settings = Settings::default();
        std::env::set_var("ATRIUM_INSTALLED_MODULES", "project.auth, project.posts,");
        apply_env_overrides(&mut settings);
        assert_eq!(settings.installed_modules, vec!["project.auth", "project.posts"]);
        std::env::remove_var("ATRIUM_INSTALLED_MODULES");
    }

    #[test]
    fn test_apply_env_overrides_user() {
        let mut settings = Settings::default();
        std::env::set_var("ATRIUM_DB_USER", "reader");
        apply_env_overrides(&mut settings);
        assert_eq!(settings.database.user, "reader");
        assert_eq!(settings.database.port, 0);
        std::env::remove_var("ATRIUM_DB_USER");
    }

    #[test]
    fn test_merge_json_nested() {
        let base = serde_json::json!({"a": {"b": 1, "c": 2}, "d": 3});
        let over = serde_json::json!({"a": {"b": 10}});
        let merged = merge_json(base, over);
        assert_eq!(merged, serde_json::json!({"a": {"b": 10, "c": 2}, "d": 3}));
    }
}
