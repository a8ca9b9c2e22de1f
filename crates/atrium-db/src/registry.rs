//! Global model registry.
//!
//! Relationship targets are written as `"module.Model"` strings and resolved
//! here, so models must be registered before a query traverses them.
//! Registration is idempotent for the same metadata; registering a different
//! model under an existing `(module, name)` is a configuration error.

use std::collections::{BTreeSet, HashMap};
use std::sync::{OnceLock, RwLock};

use atrium_core::{AtriumError, AtriumResult};

use crate::model::{Model, ModelMeta};

type ModelKey = (&'static str, &'static str);

fn registry() -> &'static RwLock<HashMap<ModelKey, &'static ModelMeta>> {
    static REGISTRY: OnceLock<RwLock<HashMap<ModelKey, &'static ModelMeta>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

fn poisoned<T>(_: T) -> AtriumError {
    AtriumError::OperationalError("model registry lock poisoned".to_string())
}

/// Registers a model's metadata under `(module_label, model_name)`.
///
/// # Errors
///
/// Returns [`AtriumError::ImproperlyConfigured`] if a different model is
/// already registered under the same key.
pub fn register_model(meta: &'static ModelMeta) -> AtriumResult<()> {
    let mut models = registry().write().map_err(poisoned)?;
    let key = (meta.module_label, meta.model_name);
    match models.get(&key) {
        Some(existing) if std::ptr::eq(*existing, meta) => {
            tracing::warn!(model = %meta.label(), "Model was already registered");
            Ok(())
        }
        Some(existing) => Err(AtriumError::ImproperlyConfigured(format!(
            "Conflicting '{}' models in module '{}' (tables '{}' and '{}')",
            meta.model_name, meta.module_label, existing.db_table, meta.db_table
        ))),
        None => {
            tracing::debug!(model = %meta.label(), table = %meta.db_table, "Registered model");
            models.insert(key, meta);
            Ok(())
        }
    }
}

/// Registers the metadata of `M`.
pub fn register<M: Model>() -> AtriumResult<()> {
    register_model(M::meta())
}

/// Looks up a registered model.
///
/// # Errors
///
/// Returns [`AtriumError::ModelNotFound`] listing the modules that do have
/// registered models.
pub fn get_model(module_label: &str, model_name: &str) -> AtriumResult<&'static ModelMeta> {
    let models = registry().read().map_err(poisoned)?;
    models
        .iter()
        .find(|((module, name), _)| *module == module_label && *name == model_name)
        .map(|(_, meta)| *meta)
        .ok_or_else(|| AtriumError::ModelNotFound {
            module: module_label.to_string(),
            model: model_name.to_string(),
            known: known_modules(&models),
        })
}

fn known_modules(models: &HashMap<ModelKey, &'static ModelMeta>) -> Vec<String> {
    models
        .keys()
        .map(|(module, _)| (*module).to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Returns the sorted labels of modules with at least one registered model.
pub fn registered_modules() -> AtriumResult<Vec<String>> {
    let models = registry().read().map_err(poisoned)?;
    Ok(known_modules(&models))
}

/// Returns the models registered for a module, sorted by model name.
pub fn get_models(module_label: &str) -> AtriumResult<Vec<&'static ModelMeta>> {
    let models = registry().read().map_err(poisoned)?;
    let mut found: Vec<&'static ModelMeta> = models
        .iter()
        .filter(|((module, _), _)| *module == module_label)
        .map(|(_, meta)| *meta)
        .collect();
    found.sort_by_key(|meta| meta.model_name);
    Ok(found)
}
