//! Relationship type vocabulary.
//!
//! The vocabulary is open: any non-empty type name can be stored. A closed
//! subset is known to the validator and traversal engine; everything else
//! lands in [`RelType::Other`] and is passed through untouched, so an unknown
//! type can never match a rule written for a known one.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::Error;

/// Relationship type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RelType {
    InstanceOf,
    HasProperty,
    Causes,
    InteractsWith,
    Contains,
    IsPartOf,
    Precedes,
    SpatiallyRelatesTo,
    HasSubcategory,
    /// Any type outside the known subset, normalized to upper case.
    Other(String),
}

/// Coarse grouping of relationship types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelClass {
    Classification,
    Causal,
    Spatial,
    Temporal,
    Compositional,
    Interactional,
    Attributive,
    Taxonomic,
    Unclassified,
}

impl RelType {
    pub const KNOWN: [RelType; 9] = [
        RelType::InstanceOf,
        RelType::HasProperty,
        RelType::Causes,
        RelType::InteractsWith,
        RelType::Contains,
        RelType::IsPartOf,
        RelType::Precedes,
        RelType::SpatiallyRelatesTo,
        RelType::HasSubcategory,
    ];

    /// Parse a type name, case-insensitively.
    ///
    /// Fails only on an empty name or one containing whitespace.
    pub fn parse(name: &str) -> crate::Result<Self> {
        let trimmed = name.trim();
        if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
            return Err(Error::validation("type", format!("Invalid relationship type: '{name}'")));
        }
        let upper = trimmed.to_ascii_uppercase();
        Ok(match upper.as_str() {
            "INSTANCE_OF" => RelType::InstanceOf,
            "HAS_PROPERTY" => RelType::HasProperty,
            "CAUSES" => RelType::Causes,
            "INTERACTS_WITH" => RelType::InteractsWith,
            "CONTAINS" => RelType::Contains,
            "IS_PART_OF" => RelType::IsPartOf,
            "PRECEDES" => RelType::Precedes,
            "SPATIALLY_RELATES_TO" => RelType::SpatiallyRelatesTo,
            "HAS_SUBCATEGORY" => RelType::HasSubcategory,
            _ => RelType::Other(upper),
        })
    }

    pub fn as_str(&self) -> &str {
        match self {
            RelType::InstanceOf => "INSTANCE_OF",
            RelType::HasProperty => "HAS_PROPERTY",
            RelType::Causes => "CAUSES",
            RelType::InteractsWith => "INTERACTS_WITH",
            RelType::Contains => "CONTAINS",
            RelType::IsPartOf => "IS_PART_OF",
            RelType::Precedes => "PRECEDES",
            RelType::SpatiallyRelatesTo => "SPATIALLY_RELATES_TO",
            RelType::HasSubcategory => "HAS_SUBCATEGORY",
            RelType::Other(name) => name,
        }
    }

    pub fn class(&self) -> RelClass {
        match self {
            RelType::InstanceOf => RelClass::Classification,
            RelType::HasProperty => RelClass::Attributive,
            RelType::Causes => RelClass::Causal,
            RelType::InteractsWith => RelClass::Interactional,
            RelType::Contains | RelType::IsPartOf => RelClass::Compositional,
            RelType::Precedes => RelClass::Temporal,
            RelType::SpatiallyRelatesTo => RelClass::Spatial,
            RelType::HasSubcategory => RelClass::Taxonomic,
            RelType::Other(_) => RelClass::Unclassified,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, RelType::Other(_))
    }
}

impl RelClass {
    /// Known relationship types in this class.
    pub fn members(self) -> Vec<RelType> {
        RelType::KNOWN.into_iter().filter(|t| t.class() == self).collect()
    }
}

impl fmt::Display for RelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelType {
    type Err = Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        RelType::parse(s)
    }
}

impl Serialize for RelType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RelType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        RelType::parse(&raw).map_err(serde::de::Error::custom)
    }
}
