//! Key and slot naming helpers shared by records and associations.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static CAMEL_BOUNDARY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[-_])(\w)").expect("valid camel boundary regex"));

/// Converts `snake_case` / `kebab-case` wire keys into `UpperCamelCase`.
///
/// The first character is upper-cased as well, so `user_roles` becomes
/// `UserRoles`. Association matching compares case-insensitively, which makes
/// the leading case irrelevant there.
pub fn to_camel_case(value: &str) -> String {
    CAMEL_BOUNDARY_RE
        .replace_all(value, |caps: &Captures<'_>| caps[1].to_uppercase())
        .into_owned()
}

/// Lower-cases the first character.
pub fn lcfirst(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
