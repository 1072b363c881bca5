//! # Validation Engine
//!
//! Pure rule predicates over attribute maps. Every Concept and Relationship
//! write passes through here before reaching the backend, for create and
//! for update alike.
//!
//! The first violation found is returned; violations are not aggregated.

use crate::model::concept::keys;
use crate::model::{Modality, PropertyMap, PropertyMapExt, Quality, RelType, Value};
use crate::{Error, Result};

// ============================================================================
// Vocabularies
// ============================================================================

/// Units accepted on a spatial `distance`.
pub const ALLOWED_SPATIAL_UNITS: [&str; 7] = [
    "meters", "kilometers", "miles", "feet", "inches", "centimeters", "millimeters",
];

/// Values accepted for a spatial `relation_type`.
pub const ALLOWED_SPATIAL_RELATIONS: [&str; 13] = [
    "near", "far", "contains", "within", "overlaps", "intersects", "disjoint",
    "above", "below", "left", "right", "front", "back",
];

/// Relationship property keys.
pub mod rel_keys {
    pub const CONFIDENCE_SCORE: &str = "confidence_score";
    pub const CREATED_AT: &str = "created_at";
    pub const UPDATED_AT: &str = "updated_at";
    pub const SOURCE_INFORMATION: &str = "source_information";
    pub const DISTANCE: &str = "distance";
    pub const SPATIAL_UNIT: &str = "spatial_unit";
    pub const RELATION_TYPE: &str = "relation_type";
    pub const SPATIAL_DIMENSION: &str = "spatial_dimension";
    pub const TEMPORAL_DISTANCE: &str = "temporal_distance";
    pub const TEMPORAL_UNIT: &str = "temporal_unit";
    pub const TEMPORAL_ORDER: &str = "temporal_order";
}

fn reject(field: &str, message: String) -> Error {
    tracing::warn!(field, %message, "validation rejected");
    Error::validation(field, message)
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{s}'"),
        other => format!("{other} ({})", other.type_name()),
    }
}

// ============================================================================
// Concepts
// ============================================================================

/// Check the enumerated and ranged Concept attributes.
///
/// Absent (or NULL) attributes pass; `name` is only checked when present.
/// `description` and `stability_status` must be strings.
pub fn validate_concept(attrs: &PropertyMap) -> Result<()> {
    if let Some(value) = attrs.get(keys::NAME).filter(|v| !v.is_null()) {
        if !value.as_str().is_some_and(|s| !s.trim().is_empty()) {
            return Err(reject(keys::NAME, format!("name must be a non-empty string, got {}", describe(value))));
        }
    }

    for key in [keys::DESCRIPTION, keys::STABILITY_STATUS] {
        if let Some(value) = attrs.get(key).filter(|v| !v.is_null()) {
            if value.as_str().is_none() {
                return Err(reject(key, format!("{key} must be a string, got {}", describe(value))));
            }
        }
    }

    if let Some(value) = attrs.get(keys::QUALITY).filter(|v| !v.is_null()) {
        let ok = value.as_str().is_some_and(|s| s.parse::<Quality>().is_ok());
        if !ok {
            return Err(reject(
                keys::QUALITY,
                format!("invalid quality {}; allowed: {}", describe(value), join(Quality::ALL.map(Quality::as_str))),
            ));
        }
    }

    if let Some(value) = attrs.get(keys::MODALITY).filter(|v| !v.is_null()) {
        let ok = value.as_str().is_some_and(|s| s.parse::<Modality>().is_ok());
        if !ok {
            return Err(reject(
                keys::MODALITY,
                format!("invalid modality {}; allowed: {}", describe(value), join(Modality::ALL.map(Modality::as_str))),
            ));
        }
    }

    validate_confidence(attrs)
}

/// Rules for a brand-new Concept: `name` is required, then `validate_concept`.
pub fn validate_new_concept(attrs: &PropertyMap) -> Result<()> {
    if !attrs.has(keys::NAME) {
        return Err(reject(keys::NAME, "name is required".into()));
    }
    validate_concept(attrs)
}

/// Reject deltas that touch server-owned Concept attributes.
pub fn check_immutable(delta: &PropertyMap, immutable: &[&str]) -> Result<()> {
    match immutable.iter().find(|key| delta.contains_key(**key)) {
        Some(key) => Err(reject(key, format!("{key} cannot be changed"))),
        None => Ok(()),
    }
}

// ============================================================================
// Relationships
// ============================================================================

/// Check a relationship's properties, dispatching on its type.
///
/// `confidence_score` is range-checked for every type. Types without
/// specific rules pass through.
pub fn validate_relationship(rel_type: &RelType, props: &PropertyMap) -> Result<()> {
    validate_confidence(props)?;
    match rel_type {
        RelType::SpatiallyRelatesTo => validate_spatial(props),
        _ => Ok(()),
    }
}

/// HAS_SUBCATEGORY edges belong to the taxonomy and are never written
/// through the Relationship Store.
pub fn check_store_type(rel_type: &RelType) -> Result<()> {
    if *rel_type == RelType::HasSubcategory {
        return Err(reject(
            "type",
            format!("{rel_type} is managed by the taxonomy and cannot be written directly"),
        ));
    }
    Ok(())
}

/// Only classification edges may point at a Subcategory.
pub fn check_subcategory_target(rel_type: &RelType) -> Result<()> {
    if *rel_type != RelType::InstanceOf {
        return Err(reject(
            "type",
            format!("only {} may target a subcategory, got {rel_type}", RelType::InstanceOf),
        ));
    }
    Ok(())
}

fn validate_spatial(props: &PropertyMap) -> Result<()> {
    use rel_keys::*;

    if props.has(DISTANCE) && !props.has(SPATIAL_UNIT) {
        return Err(reject(SPATIAL_UNIT, "spatial_unit is required when distance is given".into()));
    }
    if let Some(unit) = props.get(SPATIAL_UNIT).filter(|v| !v.is_null()) {
        if !unit.as_str().is_some_and(|u| ALLOWED_SPATIAL_UNITS.contains(&u)) {
            return Err(reject(
                SPATIAL_UNIT,
                format!("invalid spatial unit {}; allowed: {}", describe(unit), join(ALLOWED_SPATIAL_UNITS)),
            ));
        }
    }
    if let Some(relation) = props.get(RELATION_TYPE).filter(|v| !v.is_null()) {
        if !relation.as_str().is_some_and(|r| ALLOWED_SPATIAL_RELATIONS.contains(&r)) {
            return Err(reject(
                RELATION_TYPE,
                format!("invalid spatial relation {}; allowed: {}", describe(relation), join(ALLOWED_SPATIAL_RELATIONS)),
            ));
        }
    }
    Ok(())
}

// ============================================================================
// Shared
// ============================================================================

fn validate_confidence(attrs: &PropertyMap) -> Result<()> {
    let Some(value) = attrs.get(keys::CONFIDENCE_SCORE).filter(|v| !v.is_null()) else {
        return Ok(());
    };
    match value.as_float() {
        Some(score) if (0.0..=1.0).contains(&score) => Ok(()),
        _ => Err(reject(
            keys::CONFIDENCE_SCORE,
            format!("confidence_score must be a number in [0, 1], got {}", describe(value)),
        )),
    }
}

fn join<const N: usize>(items: [&str; N]) -> String {
    items.join(", ")
}
