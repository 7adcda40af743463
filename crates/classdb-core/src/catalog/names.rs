//! Class and property name rules.

use crate::error::{Error, Result};

/// Characters that may not appear in a class name.
const INVALID_CLASS_CHARS: &[char] = &[':'];

/// Characters that may not appear in a property name.
const INVALID_PROPERTY_CHARS: &[char] = &[':', ',', ';', ' ', '='];

/// Strip the backtick quoting used by the query language.
pub fn decode_class_name(name: &str) -> &str {
    name.strip_prefix('`')
        .and_then(|n| n.strip_suffix('`'))
        .unwrap_or(name)
}

/// Registry key for a class name: trimmed, unquoted, lower-cased.
pub fn normalize(name: &str) -> String {
    decode_class_name(name.trim()).trim().to_lowercase()
}

/// Validate a class name and return it trimmed and unquoted.
pub fn check_class_name(name: &str) -> Result<String> {
    let name = decode_class_name(name.trim()).trim();
    if name.is_empty() {
        return Err(Error::Schema("class name is empty".to_string()));
    }
    if let Some(c) = name.chars().find(|c| INVALID_CLASS_CHARS.contains(c)) {
        return Err(Error::Schema(format!(
            "invalid class name found. Character '{}' cannot be used in class name '{}'",
            c, name
        )));
    }
    Ok(name.to_string())
}

/// Validate a property name and return it trimmed.
pub fn check_property_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::Schema("property name is null or empty".to_string()));
    }
    if let Some(c) = name.chars().find(|c| INVALID_PROPERTY_CHARS.contains(c)) {
        return Err(Error::Schema(format!(
            "invalid property name found. Character '{}' cannot be used in property name '{}'",
            c, name
        )));
    }
    Ok(name.to_string())
}
