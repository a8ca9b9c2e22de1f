//! Installed module registry.
//!
//! A module is a unit of the project (e.g. `project.auth`) that owns models.
//! Its label is the last component of its dotted name and namespaces the
//! module's models and tables. The [`ModuleRegistry`] is built from
//! `Settings::installed_modules` and answers which module a dotted path
//! belongs to.

use std::collections::HashMap;

use crate::error::{AtriumError, AtriumResult};

/// Configuration for an installed module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleConfig {
    name: String,
    label: String,
}

impl ModuleConfig {
    /// Creates a config whose label is the last component of `name`.
    ///
    /// # Examples
    ///
    /// ```
    /// use atrium_core::modules::ModuleConfig;
    ///
    /// let config = ModuleConfig::new("project.auth").unwrap();
    /// assert_eq!(config.label(), "auth");
    /// ```
    pub fn new(name: impl Into<String>) -> AtriumResult<Self> {
        let name = name.into();
        let label = name.rsplit('.').next().unwrap_or(&name).to_string();
        Self::with_label(name, label)
    }

    /// Creates a config with an explicit label.
    ///
    /// The label must be a valid identifier (ASCII letters, digits and
    /// underscores, not starting with a digit).
    pub fn with_label(name: impl Into<String>, label: impl Into<String>) -> AtriumResult<Self> {
        let name = name.into();
        let label = label.into();
        if !is_identifier(&label) {
            return Err(AtriumError::ImproperlyConfigured(format!(
                "The module label '{label}' of '{name}' is not a valid identifier"
            )));
        }
        Ok(Self { name, label })
    }

    /// Returns the full dotted name of the module.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the short label of the module.
    pub fn label(&self) -> &str {
        &self.label
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// The central registry of installed modules.
///
/// Modules are registered via [`register`](ModuleRegistry::register) and then
/// [`populate`](ModuleRegistry::populate) is called once to freeze the registry.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: Vec<ModuleConfig>,
    labels: HashMap<String, usize>,
    ready: bool,
}

impl ModuleRegistry {
    /// Creates a new, empty `ModuleRegistry`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds and populates a registry from dotted module names, typically
    /// `Settings::installed_modules`.
    pub fn from_installed<S: AsRef<str>>(installed: &[S]) -> AtriumResult<Self> {
        let mut registry = Self::new();
        for name in installed {
            registry.register(ModuleConfig::new(name.as_ref())?)?;
        }
        registry.populate()?;
        Ok(registry)
    }

    /// Registers a module.
    ///
    /// Fails with `ImproperlyConfigured` if the label is already taken or the
    /// registry has been populated.
    pub fn register(&mut self, config: ModuleConfig) -> AtriumResult<()> {
        if self.ready {
            return Err(AtriumError::ImproperlyConfigured(format!(
                "Cannot register module '{}' after the registry has been populated",
                config.name
            )));
        }
        if self.labels.contains_key(&config.label) {
            return Err(AtriumError::ImproperlyConfigured(format!(
                "Module labels aren't unique, duplicates: {}",
                config.label
            )));
        }

        tracing::debug!(module = %config.name, label = %config.label, "registering module");
        self.labels.insert(config.label.clone(), self.modules.len());
        self.modules.push(config);
        Ok(())
    }

    /// Returns the configuration for the module with the given label.
    pub fn get_module_config(&self, label: &str) -> Option<&ModuleConfig> {
        self.labels.get(label).map(|&idx| &self.modules[idx])
    }

    /// Returns all registered module configurations in registration order.
    pub fn get_module_configs(&self) -> &[ModuleConfig] {
        &self.modules
    }

    /// Returns the module that contains the given dotted path.
    ///
    /// When several modules match (nested modules), the one with the longest
    /// name wins.
    pub fn containing_module(&self, path: &str) -> Option<&ModuleConfig> {
        self.modules
            .iter()
            .filter(|m| {
                path == m.name
                    || path
                        .strip_prefix(m.name.as_str())
                        .is_some_and(|rest| rest.starts_with('.'))
            })
            .max_by_key(|m| m.name.len())
    }

    /// Freezes the registry.
    pub fn populate(&mut self) -> AtriumResult<()> {
        if self.ready {
            return Err(AtriumError::ImproperlyConfigured(
                "ModuleRegistry has already been populated".to_string(),
            ));
        }
        self.ready = true;
        Ok(())
    }

    /// Returns `true` if the registry has been populated.
    pub const fn is_ready(&self) -> bool {
        self.ready
    }
}
