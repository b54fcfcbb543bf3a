//! `sprintf`-style named placeholders for validation messages.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%\((\w+)\)s|%%").expect("valid placeholder regex"));

/// Fills `%(fieldName)s`, `%(fieldValue)s` and `%(validationValue)s`.
///
/// `%%` renders a literal `%`; unknown placeholders are left as written.
pub fn interpolate(
    template: &str,
    field_name: &str,
    field_value: Option<&Value>,
    validation_value: Option<&Value>,
) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures<'_>| match caps.get(1).map(|m| m.as_str()) {
            None => "%".to_string(),
            Some("fieldName") => field_name.to_string(),
            Some("fieldValue") => display_value(field_value),
            Some("validationValue") => display_value(validation_value),
            Some(_) => caps[0].to_string(),
        })
        .into_owned()
}

fn display_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}
