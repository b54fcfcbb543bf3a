//! Declarative read/write filters over record properties.
//!
//! # Responsibility
//! - Rewrite single property values addressed by dotted paths
//!   (`address.city`) before a record reads or writes them.
//!
//! # Invariants
//! - A filter never creates a property: absent paths are skipped.
//! - Named filters must be resolved through `ModelRegistry` before use;
//!   unresolved ones are skipped with a warning.

use log::warn;
use serde_json::{Map, Value};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Value transformation applied by a filter.
pub type FilterFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// One filter: either a function or the name of a registry-provided filter.
#[derive(Clone)]
pub enum Filter {
    Func(FilterFn),
    Named(String),
}

impl Filter {
    pub fn func(f: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        Self::Func(Arc::new(f))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }
}

impl Debug for Filter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Func(_) => f.write_str("Filter::Func(..)"),
            Self::Named(name) => write!(f, "Filter::Named({name:?})"),
        }
    }
}

/// Ordered filter declarations keyed by property path.
pub type FilterSet = Vec<(String, Filter)>;

/// Applies `filters` in declaration order to `properties`.
pub fn apply_filters(filters: &[(String, Filter)], properties: &mut Map<String, Value>) {
    for (path, filter) in filters {
        let Some(slot) = lookup_mut(properties, path) else {
            continue;
        };
        match filter {
            Filter::Func(f) => {
                let next = f(slot);
                *slot = next;
            }
            Filter::Named(name) => {
                warn!(
                    "event=filter_apply module=model status=skipped reason=unresolved \
                     filter={name} path={path}"
                );
            }
        }
    }
}

fn lookup_mut<'a>(properties: &'a mut Map<String, Value>, path: &str) -> Option<&'a mut Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = properties.get_mut(first)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get_mut(segment)?,
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
