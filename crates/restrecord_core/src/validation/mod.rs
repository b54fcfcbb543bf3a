//! Field validation.
//!
//! # Responsibility
//! - Evaluate the per-field rule sets declared on a model against the current
//!   attribute values of a record.
//! - Render error messages from model-level templates and translations.
//!
//! # Invariants
//! - `required`, `notEmpty` and `indexErrors` are reserved rule names; every
//!   other rule resolves to a model validator, and unknown rules are ignored.
//! - A field appears in the error map only when it has at least one error.
//! - `validate_field` only touches the entry of the field it validates.

mod message;

pub use message::interpolate;

use crate::model::definition::{ErrorMessage, FieldRules, MessageContext};
use crate::model::record::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const RULE_REQUIRED: &str = "required";
pub const RULE_NOT_EMPTY: &str = "notEmpty";
pub const RULE_INDEX_ERRORS: &str = "indexErrors";

const DEFAULT_REQUIRED_MESSAGE: &str = "is required";
const DEFAULT_INVALID_MESSAGE: &str = "is invalid";

/// Errors of one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldErrors {
    List(Vec<String>),
    /// Per-element errors keyed by array index (or object key).
    Indexed(BTreeMap<String, Vec<String>>),
}

impl FieldErrors {
    /// Every message, flattened in key order.
    pub fn messages(&self) -> Vec<&str> {
        match self {
            Self::List(messages) => messages.iter().map(String::as_str).collect(),
            Self::Indexed(by_index) => by_index
                .values()
                .flat_map(|messages| messages.iter().map(String::as_str))
                .collect(),
        }
    }
}

/// Field-keyed validation errors.
pub type ErrorMap = BTreeMap<String, FieldErrors>;

impl Record {
    pub fn errors(&self) -> &ErrorMap {
        &self.errors
    }

    /// True when no field has errors.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn is_field_valid(&self, field: &str) -> bool {
        !self.errors.contains_key(field)
    }

    /// Re-validates every field with declared rules.
    pub fn validate(&mut self) -> bool {
        self.errors.clear();
        let fields = self.def().validations().keys().cloned().collect::<Vec<_>>();
        for field in fields {
            self.validate_field(&field);
        }
        self.is_valid()
    }

    /// Re-validates one field and reports whether it is valid.
    pub fn validate_field(&mut self, field: &str) -> bool {
        self.errors.remove(field);
        if let Some(errors) = self.field_errors(field) {
            self.errors.insert(field.to_string(), errors);
        }
        self.is_field_valid(field)
    }

    fn field_errors(&self, field: &str) -> Option<FieldErrors> {
        let def = self.def();
        let rules = def.rules_for(field)?;

        let Some(value) = self.get(field).filter(|value| !value.is_null()) else {
            let required = rule_value(rules, RULE_REQUIRED).filter(|value| is_truthy(value))?;
            return Some(FieldErrors::List(vec![self.required_message(field, required)]));
        };

        let elements: Vec<(String, &Value)> = match value {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| (index.to_string(), item))
                .collect(),
            Value::Object(map) => map.iter().map(|(key, item)| (key.clone(), item)).collect(),
            scalar => vec![("0".to_string(), scalar)],
        };

        let empty_values: Option<Vec<Value>> = match rule_value(rules, RULE_NOT_EMPTY) {
            Some(Value::Bool(true)) => Some(def.empty_values().to_vec()),
            Some(Value::Array(values)) => Some(values.clone()),
            Some(other) if is_truthy(other) => Some(vec![other.clone()]),
            _ => None,
        };
        let indexed = rule_value(rules, RULE_INDEX_ERRORS).is_some_and(is_truthy);

        let mut flat = Vec::new();
        let mut by_index = BTreeMap::new();
        let mut all_empty = true;
        for (index, element) in elements {
            if empty_values
                .as_ref()
                .is_some_and(|empties| empties.contains(element))
            {
                continue;
            }
            all_empty = false;
            let errors = self.apply_rules(field, element, rules);
            if indexed {
                if !errors.is_empty() {
                    by_index.insert(index, errors);
                }
            } else {
                flat.extend(errors);
            }
        }

        if all_empty && empty_values.is_some() {
            flat.push(self.error_message(field, RULE_NOT_EMPTY));
        }

        if !by_index.is_empty() {
            Some(FieldErrors::Indexed(by_index))
        } else if !flat.is_empty() {
            Some(FieldErrors::List(flat))
        } else {
            None
        }
    }

    fn apply_rules(&self, field: &str, element: &Value, rules: &FieldRules) -> Vec<String> {
        let def = self.def();
        rules
            .iter()
            .filter(|(rule, _)| !is_reserved(rule))
            .filter_map(|(rule, param)| {
                let validator = def.validator(rule)?;
                (!validator(element, param)).then(|| self.error_message(field, rule))
            })
            .collect()
    }

    /// Message for `rule` failing on `field`.
    pub fn error_message(&self, field: &str, rule: &str) -> String {
        let def = self.def();
        let rule_value = def
            .rules_for(field)
            .and_then(|rules| rule_value(rules, rule));
        let context = MessageContext {
            field,
            value: self.get(field),
            rule_value,
            record: Some(self),
        };
        match def.message(rule) {
            Some(ErrorMessage::Func(f)) => f(&context),
            Some(ErrorMessage::Text(template)) => {
                interpolate(template, def.field_label(field), context.value, rule_value)
            }
            None => DEFAULT_INVALID_MESSAGE.to_string(),
        }
    }

    fn required_message(&self, field: &str, required: &Value) -> String {
        if let Some(message) = required.get("message").and_then(Value::as_str) {
            return message.to_string();
        }
        let def = self.def();
        match def.message(RULE_REQUIRED) {
            Some(ErrorMessage::Func(f)) => f(&MessageContext {
                field,
                value: None,
                rule_value: Some(required),
                record: Some(self),
            }),
            Some(ErrorMessage::Text(template)) => {
                interpolate(template, def.field_label(field), None, Some(required))
            }
            None => DEFAULT_REQUIRED_MESSAGE.to_string(),
        }
    }
}

fn rule_value<'a>(rules: &'a FieldRules, rule: &str) -> Option<&'a Value> {
    rules
        .iter()
        .find(|(name, _)| name == rule)
        .map(|(_, value)| value)
}

fn is_reserved(rule: &str) -> bool {
    matches!(rule, RULE_REQUIRED | RULE_NOT_EMPTY | RULE_INDEX_ERRORS)
}

/// JSON truthiness: `false`, `null`, `0` and `""` are false.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
