//! Name-based lookup of model declarations and shared filters.
//!
//! # Responsibility
//! - Resolve related models by name when records walk associations.
//! - Provide named filters that model declarations refer to.
//!
//! # Invariants
//! - Model and filter names are non-blank and unique.
//! - Named filters referenced by a model resolve at registration time, so
//!   registered models only carry function filters.

use crate::model::definition::ModelDef;
use crate::model::filter::{Filter, FilterFn};
use log::debug;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Registration/lookup errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    InvalidName(String),
    DuplicateName(String),
    ModelNotFound(String),
    FilterNotFound { model: String, filter: String },
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(value) => write!(f, "registry name is invalid: `{value}`"),
            Self::DuplicateName(value) => write!(f, "name already registered: {value}"),
            Self::ModelNotFound(value) => write!(f, "model not registered: {value}"),
            Self::FilterNotFound { model, filter } => {
                write!(f, "model `{model}` refers to unknown filter `{filter}`")
            }
        }
    }
}

impl Error for RegistryError {}

/// Model and filter registry.
#[derive(Default, Clone)]
pub struct ModelRegistry {
    models: BTreeMap<String, Arc<ModelDef>>,
    filters: BTreeMap<String, FilterFn>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("models", &self.models.keys().collect::<Vec<_>>())
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a reusable filter. Register filters before the models
    /// that name them.
    pub fn register_filter(
        &mut self,
        name: &str,
        filter: impl Fn(&serde_json::Value) -> serde_json::Value + Send + Sync + 'static,
    ) -> Result<(), RegistryError> {
        let name = normalize_name(name)?;
        if self.filters.contains_key(name.as_str()) {
            return Err(RegistryError::DuplicateName(name));
        }
        self.filters.insert(name, Arc::new(filter));
        Ok(())
    }

    /// Registers one model and returns its shared handle.
    pub fn register(&mut self, mut def: ModelDef) -> Result<Arc<ModelDef>, RegistryError> {
        let name = normalize_name(def.name())?;
        if self.models.contains_key(name.as_str()) {
            return Err(RegistryError::DuplicateName(name));
        }

        for (_, filter) in def.filters_mut() {
            let Filter::Named(filter_name) = &*filter else {
                continue;
            };
            let resolved = self.filters.get(filter_name.trim()).cloned().ok_or_else(|| {
                RegistryError::FilterNotFound {
                    model: name.clone(),
                    filter: filter_name.clone(),
                }
            })?;
            *filter = Filter::Func(resolved);
        }

        def.name = name.clone();
        let def = Arc::new(def);
        self.models.insert(name.clone(), Arc::clone(&def));
        debug!("event=model_register module=registry status=ok model={name}");
        Ok(def)
    }

    pub fn has(&self, name: &str) -> bool {
        self.models.contains_key(name.trim())
    }

    pub fn get(&self, name: &str) -> Option<Arc<ModelDef>> {
        self.models.get(name.trim()).cloned()
    }

    /// Like `get`, but a missing model is an error.
    pub fn require(&self, name: &str) -> Result<Arc<ModelDef>, RegistryError> {
        self.get(name)
            .ok_or_else(|| RegistryError::ModelNotFound(name.trim().to_string()))
    }

    pub fn filter(&self, name: &str) -> Option<FilterFn> {
        self.filters.get(name.trim()).cloned()
    }

    /// Sorted model names.
    pub fn model_names(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

fn normalize_name(value: &str) -> Result<String, RegistryError> {
    let trimmed = value.trim();
    let valid = !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(RegistryError::InvalidName(value.to_string()));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::{ModelRegistry, RegistryError};
    use crate::model::definition::ModelDef;
    use crate::model::filter::Filter;
    use serde_json::Value;

    #[test]
    fn registers_and_resolves_models_by_trimmed_name() {
        let mut registry = ModelRegistry::new();
        registry
            .register(ModelDef::builder("User").build())
            .expect("model should register");

        assert!(registry.has(" User "));
        assert!(registry.get("User").is_some());
        assert_eq!(registry.model_names(), vec!["User".to_string()]);
    }

    #[test]
    fn rejects_invalid_and_duplicate_names() {
        let mut registry = ModelRegistry::new();
        let invalid = registry.register(ModelDef::builder("User Profile").build());
        assert!(matches!(invalid, Err(RegistryError::InvalidName(_))));
        let blank = registry.register(ModelDef::builder("  ").build());
        assert!(matches!(blank, Err(RegistryError::InvalidName(_))));

        registry
            .register(ModelDef::builder("User").build())
            .expect("first registration");
        let duplicate = registry.register(ModelDef::builder("User").build());
        assert!(matches!(duplicate, Err(RegistryError::DuplicateName(_))));
    }

    #[test]
    fn require_reports_missing_model() {
        let registry = ModelRegistry::new();
        let err = registry.require("Ghost").expect_err("missing model");
        assert_eq!(err, RegistryError::ModelNotFound("Ghost".to_string()));
    }

    #[test]
    fn named_filters_resolve_on_registration() {
        let mut registry = ModelRegistry::new();
        registry
            .register_filter("trim", |value: &Value| {
                Value::String(value.as_str().unwrap_or_default().trim().to_string())
            })
            .expect("filter should register");

        let def = registry
            .register(
                ModelDef::builder("User")
                    .read_filter("name", Filter::named("trim"))
                    .build(),
            )
            .expect("model should register");
        assert!(matches!(def.read_filters()[0].1, Filter::Func(_)));

        let err = registry
            .register(
                ModelDef::builder("Post")
                    .write_filter("title", Filter::named("slugify"))
                    .build(),
            )
            .expect_err("unknown filter");
        assert!(matches!(err, RegistryError::FilterNotFound { .. }));
    }
}
