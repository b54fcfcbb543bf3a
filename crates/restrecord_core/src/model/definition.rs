//! Model declarations.
//!
//! # Responsibility
//! - Describe one backend entity: identity, URLs, attribute whitelist,
//!   defaults, validation rules, filters and associations.
//! - Provide a builder so declarations read top-down like a class body.
//!
//! # Invariants
//! - A `ModelDef` is immutable once built; records share it through `Arc`.
//! - Association names are unique per model.

use crate::model::filter::{Filter, FilterSet};
use crate::model::naming::lcfirst;
use crate::model::record::Record;
use crate::sync::request::SyncOptions;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Default name of the identifier attribute.
pub const DEFAULT_ID_ATTRIBUTE: &str = "id";

/// Custom validation rule: `(field value, rule parameter) -> passes`.
pub type ValidatorFn = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

/// Response post-processing hook: turns a raw body into record properties.
pub type ParseFn = Arc<dyn Fn(Value, &SyncOptions) -> Value + Send + Sync>;

/// Computed error message.
pub type MessageFn = Arc<dyn Fn(&MessageContext<'_>) -> String + Send + Sync>;

/// Inputs available to a computed error message.
#[derive(Debug, Clone, Copy)]
pub struct MessageContext<'a> {
    pub field: &'a str,
    pub value: Option<&'a Value>,
    pub rule_value: Option<&'a Value>,
    pub record: Option<&'a Record>,
}

/// Validation message declaration.
///
/// `Text` supports the named placeholders `%(fieldName)s`, `%(fieldValue)s`
/// and `%(validationValue)s`.
#[derive(Clone)]
pub enum ErrorMessage {
    Text(String),
    Func(MessageFn),
}

impl ErrorMessage {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn func(f: impl Fn(&MessageContext<'_>) -> String + Send + Sync + 'static) -> Self {
        Self::Func(Arc::new(f))
    }
}

impl Debug for ErrorMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => write!(f, "ErrorMessage::Text({text:?})"),
            Self::Func(_) => f.write_str("ErrorMessage::Func(..)"),
        }
    }
}

/// Relationship kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    /// To-one: this record holds the foreign key of its parent.
    BelongsTo,
    /// To-many: children hold this record's identifier.
    HasMany,
}

/// Per-association options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssociationOptions {
    /// Foreign-key attribute name.
    pub key: Option<String>,
    /// Model to instantiate when it differs from the association name.
    pub model: Option<String>,
    /// Join model for many-to-many relations.
    pub through: Option<String>,
    /// Slot name override for belongs-to parents.
    pub singular: Option<String>,
    /// Delete removed members with one request.
    pub batch: bool,
    /// Members travel inside the parent payload; no child requests.
    pub parent_managed: bool,
}

impl AssociationOptions {
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_through(mut self, through: impl Into<String>) -> Self {
        self.through = Some(through.into());
        self
    }

    pub fn with_singular(mut self, singular: impl Into<String>) -> Self {
        self.singular = Some(singular.into());
        self
    }

    pub fn batched(mut self) -> Self {
        self.batch = true;
        self
    }

    pub fn parent_managed(mut self) -> Self {
        self.parent_managed = true;
        self
    }
}

/// One declared association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationDef {
    pub name: String,
    pub kind: AssociationKind,
    pub options: AssociationOptions,
}

impl AssociationDef {
    /// Slot holding the parent record of a belongs-to association.
    pub fn parent_slot(&self) -> String {
        lcfirst(self.options.singular.as_deref().unwrap_or(&self.name))
    }

    /// Name of the model the association targets directly.
    pub fn target_model(&self) -> &str {
        self.options.model.as_deref().unwrap_or(&self.name)
    }

    /// Model whose records populate the collection (join model for `through`).
    pub fn member_model(&self) -> &str {
        self.options
            .through
            .as_deref()
            .unwrap_or_else(|| self.target_model())
    }
}

/// Ordered rule declarations for one field.
pub type FieldRules = Vec<(String, Value)>;

/// Declaration of one backend entity.
#[derive(Clone)]
pub struct ModelDef {
    pub(crate) name: String,
    pub(crate) plural: Option<String>,
    pub(crate) id_attribute: String,
    pub(crate) url_root: Option<String>,
    pub(crate) url_resource: Option<String>,
    pub(crate) attributes: Option<Vec<String>>,
    pub(crate) defaults: Map<String, Value>,
    pub(crate) empty_values: Vec<Value>,
    pub(crate) validations: BTreeMap<String, FieldRules>,
    pub(crate) validators: BTreeMap<String, ValidatorFn>,
    pub(crate) messages: BTreeMap<String, ErrorMessage>,
    pub(crate) field_translations: BTreeMap<String, String>,
    pub(crate) read_filters: FilterSet,
    pub(crate) write_filters: FilterSet,
    pub(crate) parser: Option<ParseFn>,
    pub(crate) associations: Vec<AssociationDef>,
}

impl ModelDef {
    pub fn builder(name: impl Into<String>) -> ModelDefBuilder {
        ModelDefBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plural(&self) -> Option<&str> {
        self.plural.as_deref()
    }

    /// Name used for collections of this model: plural, else model name.
    pub fn collection_name(&self) -> &str {
        self.plural.as_deref().unwrap_or(&self.name)
    }

    pub fn id_attribute(&self) -> &str {
        &self.id_attribute
    }

    pub fn url_root(&self) -> Option<&str> {
        self.url_root.as_deref()
    }

    pub fn url_resource(&self) -> Option<&str> {
        self.url_resource.as_deref()
    }

    pub fn attributes(&self) -> Option<&[String]> {
        self.attributes.as_deref()
    }

    pub fn defaults(&self) -> &Map<String, Value> {
        &self.defaults
    }

    pub fn empty_values(&self) -> &[Value] {
        &self.empty_values
    }

    pub fn validations(&self) -> &BTreeMap<String, FieldRules> {
        &self.validations
    }

    pub fn rules_for(&self, field: &str) -> Option<&FieldRules> {
        self.validations.get(field)
    }

    pub fn validator(&self, rule: &str) -> Option<&ValidatorFn> {
        self.validators.get(rule)
    }

    pub fn message(&self, rule: &str) -> Option<&ErrorMessage> {
        self.messages.get(rule)
    }

    pub fn field_label<'a>(&'a self, field: &'a str) -> &'a str {
        self.field_translations
            .get(field)
            .map(String::as_str)
            .unwrap_or(field)
    }

    pub fn read_filters(&self) -> &[(String, Filter)] {
        &self.read_filters
    }

    pub fn write_filters(&self) -> &[(String, Filter)] {
        &self.write_filters
    }

    /// Runs the response parser, or returns `data` unchanged.
    pub fn parse(&self, data: Value, options: &SyncOptions) -> Value {
        match &self.parser {
            Some(parser) => parser(data, options),
            None => data,
        }
    }

    pub fn associations(&self) -> &[AssociationDef] {
        &self.associations
    }

    pub fn association(&self, name: &str) -> Option<&AssociationDef> {
        self.associations.iter().find(|assoc| assoc.name == name)
    }

    /// Whether `attribute` names an association or a join model, ignoring case.
    pub fn attribute_in_association(&self, attribute: &str) -> bool {
        let attribute = attribute.to_lowercase();
        self.associations.iter().any(|assoc| {
            assoc.name.to_lowercase() == attribute
                || assoc
                    .options
                    .through
                    .as_deref()
                    .is_some_and(|through| through.to_lowercase() == attribute)
        })
    }

    pub(crate) fn filters_mut(&mut self) -> impl Iterator<Item = &mut (String, Filter)> {
        self.read_filters
            .iter_mut()
            .chain(self.write_filters.iter_mut())
    }
}

impl Debug for ModelDef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelDef")
            .field("name", &self.name)
            .field("plural", &self.plural)
            .field("id_attribute", &self.id_attribute)
            .field("url_root", &self.url_root)
            .field("url_resource", &self.url_resource)
            .field("attributes", &self.attributes)
            .field("validations", &self.validations)
            .field("validators", &self.validators.keys().collect::<Vec<_>>())
            .field("associations", &self.associations)
            .finish_non_exhaustive()
    }
}

/// Builder for `ModelDef`.
#[derive(Debug, Clone)]
pub struct ModelDefBuilder {
    def: ModelDef,
}

impl ModelDefBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            def: ModelDef {
                name: name.into(),
                plural: None,
                id_attribute: DEFAULT_ID_ATTRIBUTE.to_string(),
                url_root: None,
                url_resource: None,
                attributes: None,
                defaults: Map::new(),
                empty_values: vec![Value::String(String::new()), Value::Null],
                validations: BTreeMap::new(),
                validators: BTreeMap::new(),
                messages: BTreeMap::new(),
                field_translations: BTreeMap::new(),
                read_filters: Vec::new(),
                write_filters: Vec::new(),
                parser: None,
                associations: Vec::new(),
            },
        }
    }

    pub fn plural(mut self, plural: impl Into<String>) -> Self {
        self.def.plural = Some(plural.into());
        self
    }

    pub fn id_attribute(mut self, name: impl Into<String>) -> Self {
        self.def.id_attribute = name.into();
        self
    }

    pub fn url_root(mut self, url_root: impl Into<String>) -> Self {
        self.def.url_root = Some(url_root.into());
        self
    }

    /// Suffix appended to the URL root, also used as the nested collection
    /// path under a parent record.
    pub fn url_resource(mut self, resource: impl Into<String>) -> Self {
        self.def.url_resource = Some(resource.into());
        self
    }

    /// Restricts change tracking to these attribute names.
    pub fn attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.def.attributes = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn default_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.def.defaults.insert(name.into(), value);
        self
    }

    /// Replaces the values `notEmpty: true` treats as empty.
    pub fn empty_values(mut self, values: Vec<Value>) -> Self {
        self.def.empty_values = values;
        self
    }

    /// Adds `rule` with parameter `value` to `field`.
    pub fn validate(
        mut self,
        field: impl Into<String>,
        rule: impl Into<String>,
        value: Value,
    ) -> Self {
        self.def
            .validations
            .entry(field.into())
            .or_default()
            .push((rule.into(), value));
        self
    }

    pub fn validator(
        mut self,
        rule: impl Into<String>,
        f: impl Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.def.validators.insert(rule.into(), Arc::new(f));
        self
    }

    pub fn message(mut self, rule: impl Into<String>, message: ErrorMessage) -> Self {
        self.def.messages.insert(rule.into(), message);
        self
    }

    pub fn translate_field(mut self, field: impl Into<String>, label: impl Into<String>) -> Self {
        self.def.field_translations.insert(field.into(), label.into());
        self
    }

    pub fn read_filter(mut self, path: impl Into<String>, filter: Filter) -> Self {
        self.def.read_filters.push((path.into(), filter));
        self
    }

    pub fn write_filter(mut self, path: impl Into<String>, filter: Filter) -> Self {
        self.def.write_filters.push((path.into(), filter));
        self
    }

    pub fn parser(
        mut self,
        f: impl Fn(Value, &SyncOptions) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.def.parser = Some(Arc::new(f));
        self
    }

    pub fn belongs_to(self, entity: impl Into<String>, options: AssociationOptions) -> Self {
        self.associate(entity.into(), AssociationKind::BelongsTo, options)
    }

    pub fn has_many(self, entity: impl Into<String>, options: AssociationOptions) -> Self {
        self.associate(entity.into(), AssociationKind::HasMany, options)
    }

    fn associate(
        mut self,
        name: String,
        kind: AssociationKind,
        options: AssociationOptions,
    ) -> Self {
        // Redeclaring an association replaces it.
        self.def.associations.retain(|assoc| assoc.name != name);
        self.def.associations.push(AssociationDef { name, kind, options });
        self
    }

    pub fn build(self) -> ModelDef {
        self.def
    }
}
