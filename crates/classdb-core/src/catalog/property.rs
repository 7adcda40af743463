//! Property metadata.

use crate::error::{Error, Result};
use crate::storage::document::PropertyDocument;
use crate::types::PropertyType;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::collections::BTreeMap;

/// Collations understood by the index layer.
pub const COLLATES: &[&str] = &["default", "ci"];

/// Metadata of one property declared on a class.
///
/// Name and type mirror the global property entry the descriptor points at;
/// both change only through the catalog, which re-interns the entry.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub(crate) global_id: u32,
    pub(crate) name: String,
    pub(crate) property_type: PropertyType,
    pub(crate) linked_type: Option<PropertyType>,
    pub(crate) linked_class: Option<String>,
    pub(crate) mandatory: bool,
    pub(crate) not_null: bool,
    pub(crate) readonly: bool,
    pub(crate) min: Option<String>,
    pub(crate) max: Option<String>,
    pub(crate) default_value: Option<String>,
    pub(crate) regexp: Option<String>,
    pub(crate) collate: String,
    pub(crate) description: Option<String>,
    pub(crate) custom_fields: BTreeMap<String, String>,
}

impl PropertyDescriptor {
    pub(crate) fn new(global_id: u32, name: &str, property_type: PropertyType) -> Self {
        Self {
            global_id,
            name: name.to_string(),
            property_type,
            linked_type: None,
            linked_class: None,
            mandatory: false,
            not_null: false,
            readonly: false,
            min: None,
            max: None,
            default_value: None,
            regexp: None,
            collate: "default".to_string(),
            description: None,
            custom_fields: BTreeMap::new(),
        }
    }

    /// Id of the backing global property.
    pub fn global_id(&self) -> u32 {
        self.global_id
    }

    /// Property name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Property type.
    pub fn property_type(&self) -> PropertyType {
        self.property_type
    }

    /// Element type of an embedded collection.
    pub fn linked_type(&self) -> Option<PropertyType> {
        self.linked_type
    }

    /// Class of linked or embedded records.
    pub fn linked_class(&self) -> Option<&str> {
        self.linked_class.as_deref()
    }

    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    pub fn is_not_null(&self) -> bool {
        self.not_null
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn min(&self) -> Option<&str> {
        self.min.as_deref()
    }

    pub fn max(&self) -> Option<&str> {
        self.max.as_deref()
    }

    pub fn default_value(&self) -> Option<&str> {
        self.default_value.as_deref()
    }

    pub fn regexp(&self) -> Option<&str> {
        self.regexp.as_deref()
    }

    pub fn collate(&self) -> &str {
        &self.collate
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Custom attribute value.
    pub fn custom(&self, name: &str) -> Option<&str> {
        self.custom_fields.get(name).map(String::as_str)
    }

    /// All custom attributes.
    pub fn custom_fields(&self) -> &BTreeMap<String, String> {
        &self.custom_fields
    }

    pub(crate) fn set_min(&mut self, min: Option<String>) -> Result<()> {
        if let Some(value) = &min {
            validate_limit(self.property_type, value)?;
        }
        self.min = min;
        Ok(())
    }

    pub(crate) fn set_max(&mut self, max: Option<String>) -> Result<()> {
        if let Some(value) = &max {
            validate_limit(self.property_type, value)?;
        }
        self.max = max;
        Ok(())
    }

    pub(crate) fn set_default_value(&mut self, value: Option<String>) -> Result<()> {
        if let Some(value) = &value {
            validate_default(self.property_type, value)?;
        }
        self.default_value = value;
        Ok(())
    }

    pub(crate) fn set_regexp(&mut self, pattern: Option<String>) -> Result<()> {
        if let Some(pattern) = &pattern {
            Regex::new(pattern).map_err(|e| {
                Error::InvalidArgument(format!("invalid regexp '{}': {}", pattern, e))
            })?;
        }
        self.regexp = pattern;
        Ok(())
    }

    pub(crate) fn set_description(&mut self, description: Option<String>) {
        self.description = description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
    }

    pub(crate) fn set_custom(&mut self, name: &str, value: Option<&str>) {
        match value {
            Some(value) if !value.eq_ignore_ascii_case("null") => {
                self.custom_fields.insert(name.to_string(), value.to_string());
            }
            _ => {
                self.custom_fields.remove(name);
            }
        }
    }

    pub(crate) fn to_document(&self) -> PropertyDocument {
        PropertyDocument {
            name: self.name.clone(),
            type_id: self.property_type.id(),
            global_id: Some(self.global_id),
            mandatory: self.mandatory,
            readonly: self.readonly,
            not_null: self.not_null,
            default_value: self.default_value.clone(),
            min: self.min.clone(),
            max: self.max.clone(),
            regexp: self.regexp.clone(),
            linked_type: self.linked_type.map(PropertyType::id),
            linked_class: self.linked_class.clone(),
            custom_fields: self.custom_fields.clone(),
            collate: self.collate.clone(),
            description: self.description.clone(),
        }
    }
}

/// Normalize and check a collation name.
pub(crate) fn check_collate(collate: &str) -> Result<String> {
    let collate = collate.trim().to_lowercase();
    if COLLATES.contains(&collate.as_str()) {
        Ok(collate)
    } else {
        Err(Error::InvalidArgument(format!("unknown collate '{}'", collate)))
    }
}

fn parses_as_date(value: &str) -> bool {
    value.parse::<i64>().is_ok() || NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

fn parses_as_datetime(value: &str) -> bool {
    value.parse::<i64>().is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").is_ok()
        || DateTime::parse_from_rfc3339(value).is_ok()
        || NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

fn parses_as_number(property_type: PropertyType, value: &str) -> Option<bool> {
    Some(match property_type {
        PropertyType::Byte => value.parse::<i8>().is_ok(),
        PropertyType::Short => value.parse::<i16>().is_ok(),
        PropertyType::Integer => value.parse::<i32>().is_ok(),
        PropertyType::Long => value.parse::<i64>().is_ok(),
        PropertyType::Float => value.parse::<f32>().is_ok(),
        PropertyType::Double | PropertyType::Decimal => value.parse::<f64>().is_ok(),
        PropertyType::Date => parses_as_date(value),
        PropertyType::DateTime => parses_as_datetime(value),
        _ => return None,
    })
}

/// Check a `min`/`max` bound.
///
/// Length-bounded types take an integer length; numeric and date types take
/// a value of their own type.
pub(crate) fn validate_limit(property_type: PropertyType, value: &str) -> Result<()> {
    let value = value.trim();
    let ok = match property_type {
        PropertyType::String | PropertyType::Binary => value.parse::<i32>().is_ok(),
        ty if ty.is_multi_value() => value.parse::<i32>().is_ok(),
        ty => parses_as_number(ty, value).unwrap_or(true),
    };
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "'{}' is not a valid limit for a property of type {}",
            value, property_type
        )))
    }
}

/// Check a default value against the property type.
pub(crate) fn validate_default(property_type: PropertyType, value: &str) -> Result<()> {
    let value = value.trim();
    let ok = match property_type {
        PropertyType::Boolean => value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false"),
        ty => parses_as_number(ty, value).unwrap_or(true),
    };
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "'{}' is not a valid default for a property of type {}",
            value, property_type
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits() {
        assert!(validate_limit(PropertyType::String, "10").is_ok());
        assert!(validate_limit(PropertyType::String, "ten").is_err());
        assert!(validate_limit(PropertyType::LinkList, "3").is_ok());
        assert!(validate_limit(PropertyType::Byte, "300").is_err());
        assert!(validate_limit(PropertyType::Double, "2.5").is_ok());
        assert!(validate_limit(PropertyType::Date, "2024-02-29").is_ok());
        assert!(validate_limit(PropertyType::Date, "2023-02-29").is_err());
        assert!(validate_limit(PropertyType::DateTime, "2024-01-01 10:00:00").is_ok());
        assert!(validate_limit(PropertyType::Link, "anything").is_ok());
    }

    #[test]
    fn test_defaults() {
        assert!(validate_default(PropertyType::Boolean, "TRUE").is_ok());
        assert!(validate_default(PropertyType::Boolean, "yes").is_err());
        assert!(validate_default(PropertyType::Integer, "12").is_ok());
        assert!(validate_default(PropertyType::String, "anything").is_ok());
    }

    #[test]
    fn test_collate() {
        assert_eq!(check_collate(" CI ").unwrap(), "ci");
        assert!(check_collate("klingon").is_err());
    }

    #[test]
    fn test_attribute_setters() {
        let mut prop = PropertyDescriptor::new(0, "age", PropertyType::Integer);
        prop.set_min(Some("0".into())).unwrap();
        assert!(prop.set_max(Some("old".into())).is_err());
        assert_eq!(prop.max(), None);
        assert!(prop.set_regexp(Some("[".into())).is_err());
        prop.set_regexp(Some("^[0-9]+$".into())).unwrap();

        prop.set_custom("unit", Some("years"));
        assert_eq!(prop.custom("unit"), Some("years"));
        prop.set_custom("unit", Some("null"));
        assert_eq!(prop.custom("unit"), None);

        prop.set_description(Some("   ".into()));
        assert_eq!(prop.description(), None);
    }

    #[test]
    fn test_to_document() {
        let mut prop = PropertyDescriptor::new(7, "tags", PropertyType::EmbeddedSet);
        prop.linked_type = Some(PropertyType::String);
        let doc = prop.to_document();
        assert_eq!(doc.global_id, Some(7));
        assert_eq!(doc.type_id, PropertyType::EmbeddedSet.id());
        assert_eq!(doc.linked_type, Some(PropertyType::String.id()));
    }
}
