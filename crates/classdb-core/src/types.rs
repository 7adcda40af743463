//! Core type definitions for the catalog.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a physical collection (storage location).
pub type CollectionId = i32;

/// Sentinel collection id carried by abstract classes.
pub const NOT_EXISTENT_COLLECTION_ID: CollectionId = -1;

/// Identity of a persisted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Arena slot of a class inside the catalog.
///
/// Slots are never reused, so an id stays valid (or empty) for the
/// lifetime of the catalog state it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassId(pub(crate) usize);

impl ClassId {
    /// Arena index of this class.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Property types supported by the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PropertyType {
    /// Boolean value.
    Boolean,
    /// 32-bit signed integer.
    Integer,
    /// 16-bit signed integer.
    Short,
    /// 64-bit signed integer.
    Long,
    /// 32-bit floating point.
    Float,
    /// 64-bit floating point.
    Double,
    /// Date with time.
    DateTime,
    /// UTF-8 string.
    String,
    /// Binary data.
    Binary,
    /// Embedded document.
    Embedded,
    /// List of embedded values.
    EmbeddedList,
    /// Set of embedded values.
    EmbeddedSet,
    /// Map of embedded values.
    EmbeddedMap,
    /// Link to another record.
    Link,
    /// List of links.
    LinkList,
    /// Set of links.
    LinkSet,
    /// Map of links.
    LinkMap,
    /// 8-bit signed integer.
    Byte,
    /// Date without time.
    Date,
    /// Arbitrary precision decimal.
    Decimal,
    /// Bag of links.
    LinkBag,
}

impl PropertyType {
    /// Every property type, ordered by persisted id.
    pub const ALL: [PropertyType; 21] = [
        PropertyType::Boolean,
        PropertyType::Integer,
        PropertyType::Short,
        PropertyType::Long,
        PropertyType::Float,
        PropertyType::Double,
        PropertyType::DateTime,
        PropertyType::String,
        PropertyType::Binary,
        PropertyType::Embedded,
        PropertyType::EmbeddedList,
        PropertyType::EmbeddedSet,
        PropertyType::EmbeddedMap,
        PropertyType::Link,
        PropertyType::LinkList,
        PropertyType::LinkSet,
        PropertyType::LinkMap,
        PropertyType::Byte,
        PropertyType::Date,
        PropertyType::Decimal,
        PropertyType::LinkBag,
    ];

    /// Persisted numeric id of this type.
    pub fn id(self) -> i32 {
        match self {
            PropertyType::Boolean => 0,
            PropertyType::Integer => 1,
            PropertyType::Short => 2,
            PropertyType::Long => 3,
            PropertyType::Float => 4,
            PropertyType::Double => 5,
            PropertyType::DateTime => 6,
            PropertyType::String => 7,
            PropertyType::Binary => 8,
            PropertyType::Embedded => 9,
            PropertyType::EmbeddedList => 10,
            PropertyType::EmbeddedSet => 11,
            PropertyType::EmbeddedMap => 12,
            PropertyType::Link => 13,
            PropertyType::LinkList => 14,
            PropertyType::LinkSet => 15,
            PropertyType::LinkMap => 16,
            PropertyType::Byte => 17,
            PropertyType::Date => 19,
            PropertyType::Decimal => 21,
            PropertyType::LinkBag => 22,
        }
    }

    /// Look up a type by its persisted id.
    pub fn from_id(id: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|ty| ty.id() == id)
    }

    /// Upper-case name used in messages and the query language.
    pub fn name(self) -> &'static str {
        match self {
            PropertyType::Boolean => "BOOLEAN",
            PropertyType::Integer => "INTEGER",
            PropertyType::Short => "SHORT",
            PropertyType::Long => "LONG",
            PropertyType::Float => "FLOAT",
            PropertyType::Double => "DOUBLE",
            PropertyType::DateTime => "DATETIME",
            PropertyType::String => "STRING",
            PropertyType::Binary => "BINARY",
            PropertyType::Embedded => "EMBEDDED",
            PropertyType::EmbeddedList => "EMBEDDEDLIST",
            PropertyType::EmbeddedSet => "EMBEDDEDSET",
            PropertyType::EmbeddedMap => "EMBEDDEDMAP",
            PropertyType::Link => "LINK",
            PropertyType::LinkList => "LINKLIST",
            PropertyType::LinkSet => "LINKSET",
            PropertyType::LinkMap => "LINKMAP",
            PropertyType::Byte => "BYTE",
            PropertyType::Date => "DATE",
            PropertyType::Decimal => "DECIMAL",
            PropertyType::LinkBag => "LINKBAG",
        }
    }

    /// Parse a type name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        Self::ALL.iter().copied().find(|ty| ty.name() == upper)
    }

    /// Types whose stored values can be read as this type.
    ///
    /// Always contains the type itself.
    pub fn castable_from(self) -> &'static [PropertyType] {
        use PropertyType::*;
        match self {
            Byte => &[Byte, Boolean],
            Short => &[Short, Boolean, Byte],
            Integer => &[Integer, Boolean, Byte, Short],
            Long => &[Long, Boolean, Byte, Short, Integer],
            Float => &[Float, Boolean, Byte, Short, Integer],
            Double => &[Double, Boolean, Byte, Short, Integer, Long, Float],
            Decimal => &[Decimal, Boolean, Byte, Short, Integer, Long, Float, Double],
            LinkList => &[LinkList, LinkSet],
            EmbeddedList => &[EmbeddedList, EmbeddedSet],
            Boolean => &[Boolean],
            DateTime => &[DateTime],
            String => &[String],
            Binary => &[Binary],
            Embedded => &[Embedded],
            EmbeddedSet => &[EmbeddedSet],
            EmbeddedMap => &[EmbeddedMap],
            Link => &[Link],
            LinkSet => &[LinkSet],
            LinkMap => &[LinkMap],
            Date => &[Date],
            LinkBag => &[LinkBag],
        }
    }

    /// Whether values of `other` can be read as this type.
    pub fn is_castable_from(self, other: PropertyType) -> bool {
        self.castable_from().contains(&other)
    }

    /// Whether a linked type may be declared on a property of this type.
    pub fn supports_linked_type(self) -> bool {
        matches!(
            self,
            PropertyType::EmbeddedList | PropertyType::EmbeddedSet | PropertyType::EmbeddedMap
        )
    }

    /// Whether a linked class may be declared on a property of this type.
    pub fn supports_linked_class(self) -> bool {
        matches!(
            self,
            PropertyType::Link
                | PropertyType::LinkList
                | PropertyType::LinkSet
                | PropertyType::LinkMap
                | PropertyType::LinkBag
                | PropertyType::Embedded
                | PropertyType::EmbeddedList
                | PropertyType::EmbeddedSet
                | PropertyType::EmbeddedMap
        )
    }

    /// Whether this type holds a collection of values.
    pub fn is_multi_value(self) -> bool {
        matches!(
            self,
            PropertyType::EmbeddedList
                | PropertyType::EmbeddedSet
                | PropertyType::EmbeddedMap
                | PropertyType::LinkList
                | PropertyType::LinkSet
                | PropertyType::LinkMap
                | PropertyType::LinkBag
        )
    }

    /// Whether this type references other records.
    pub fn is_link(self) -> bool {
        matches!(
            self,
            PropertyType::Link
                | PropertyType::LinkList
                | PropertyType::LinkSet
                | PropertyType::LinkMap
                | PropertyType::LinkBag
        )
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
