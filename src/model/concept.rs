//! Concept — a typed node representing an abstract unit of knowledge.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Node, PropertyMap, Value};
use crate::{Error, Result};

/// Property keys owned by the Concept schema. Everything else on a Concept
/// node is carried through in [`Concept::extra`].
pub mod keys {
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const DESCRIPTION: &str = "description";
    pub const QUALITY: &str = "quality";
    pub const MODALITY: &str = "modality";
    pub const STABILITY_STATUS: &str = "stability_status";
    pub const CONFIDENCE_SCORE: &str = "confidence_score";
    pub const CREATED_AT: &str = "created_at";
    pub const UPDATED_AT: &str = "updated_at";

    pub const SCHEMA: [&str; 9] = [
        ID, NAME, DESCRIPTION, QUALITY, MODALITY,
        STABILITY_STATUS, CONFIDENCE_SCORE, CREATED_AT, UPDATED_AT,
    ];
}

// ============================================================================
// Quality / Modality
// ============================================================================

/// Kantian quality of a concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    Reality,
    Negation,
    Limitation,
}

impl Quality {
    pub const ALL: [Quality; 3] = [Quality::Reality, Quality::Negation, Quality::Limitation];

    pub fn as_str(self) -> &'static str {
        match self {
            Quality::Reality => "Reality",
            Quality::Negation => "Negation",
            Quality::Limitation => "Limitation",
        }
    }
}

impl FromStr for Quality {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        Quality::ALL.into_iter().find(|q| q.as_str() == s).ok_or(())
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kantian modality of a concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modality {
    #[serde(rename = "Possibility/Impossibility")]
    Possibility,
    #[serde(rename = "Existence/Non-existence")]
    Existence,
    #[serde(rename = "Necessity/Contingency")]
    Necessity,
}

impl Modality {
    pub const ALL: [Modality; 3] = [Modality::Possibility, Modality::Existence, Modality::Necessity];

    pub fn as_str(self) -> &'static str {
        match self {
            Modality::Possibility => "Possibility/Impossibility",
            Modality::Existence => "Existence/Non-existence",
            Modality::Necessity => "Necessity/Contingency",
        }
    }
}

impl FromStr for Modality {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        Modality::ALL.into_iter().find(|m| m.as_str() == s).ok_or(())
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Concept record
// ============================================================================

/// A persisted Concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub quality: Option<Quality>,
    pub modality: Option<Modality>,
    pub stability_status: String,
    pub confidence_score: f64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Attributes outside the Concept schema, carried through unchanged.
    #[serde(flatten)]
    pub extra: PropertyMap,
}

impl Concept {
    /// Shape a stored node into a Concept.
    ///
    /// A node without `id` or `name`, or with an out-of-vocabulary
    /// `quality`/`modality`, is a stored record that violates the schema and
    /// is reported as an inconsistency rather than papered over.
    pub fn from_node(node: &Node) -> Result<Self> {
        let props = &node.properties;
        let text = |key: &str| props.get(key).and_then(Value::as_str).map(str::to_owned);

        let id = text(keys::ID)
            .ok_or_else(|| Error::InternalInconsistency(format!("concept node {} has no id", node.id)))?;
        let name = text(keys::NAME)
            .ok_or_else(|| Error::InternalInconsistency(format!("concept {id} has no name")))?;

        let quality = match text(keys::QUALITY) {
            Some(q) => Some(q.parse::<Quality>().map_err(|_| {
                Error::InternalInconsistency(format!("concept {id} has stored quality '{q}'"))
            })?),
            None => None,
        };
        let modality = match text(keys::MODALITY) {
            Some(m) => Some(m.parse::<Modality>().map_err(|_| {
                Error::InternalInconsistency(format!("concept {id} has stored modality '{m}'"))
            })?),
            None => None,
        };

        let extra = props
            .iter()
            .filter(|(k, _)| !keys::SCHEMA.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            description: text(keys::DESCRIPTION),
            quality,
            modality,
            stability_status: text(keys::STABILITY_STATUS).unwrap_or_default(),
            confidence_score: props.get(keys::CONFIDENCE_SCORE).and_then(Value::as_float).unwrap_or_default(),
            created_at: props.get(keys::CREATED_AT).and_then(Value::as_datetime),
            updated_at: props.get(keys::UPDATED_AT).and_then(Value::as_datetime),
            id,
            name,
            extra,
        })
    }

    pub fn get_extra(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

// ============================================================================
// NewConcept builder
// ============================================================================

/// Typed builder for the attribute map handed to `ConceptStore::create`.
#[derive(Debug, Clone, Default)]
pub struct NewConcept {
    attrs: PropertyMap,
}

impl NewConcept {
    pub fn new(name: impl Into<String>) -> Self {
        let mut attrs = PropertyMap::new();
        attrs.insert(keys::NAME.into(), Value::String(name.into()));
        Self { attrs }
    }

    pub fn description(self, description: impl Into<String>) -> Self {
        self.attr(keys::DESCRIPTION, description.into())
    }

    pub fn quality(self, quality: Quality) -> Self {
        self.attr(keys::QUALITY, quality.as_str())
    }

    pub fn modality(self, modality: Modality) -> Self {
        self.attr(keys::MODALITY, modality.as_str())
    }

    pub fn stability_status(self, status: impl Into<String>) -> Self {
        self.attr(keys::STABILITY_STATUS, status.into())
    }

    pub fn confidence(self, score: f64) -> Self {
        self.attr(keys::CONFIDENCE_SCORE, score)
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn into_attrs(self) -> PropertyMap {
        self.attrs
    }
}

impl From<NewConcept> for PropertyMap {
    fn from(c: NewConcept) -> Self {
        c.into_attrs()
    }
}
