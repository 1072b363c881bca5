//! # Ontology Model
//!
//! Clean DTOs for the concept graph. These types cross every boundary:
//! storage ↔ stores ↔ traversal ↔ caller.
//!
//! Design rule: this module is pure data — no I/O, no state, no async.

pub mod node;
pub mod relationship;
pub mod rel_type;
pub mod path;
pub mod value;
pub mod property_map;
pub mod concept;
pub mod taxonomy;

pub use node::{Node, NodeId};
pub use relationship::{Relationship, RelationshipRecord, RelId, Direction, Page};
pub use rel_type::{RelType, RelClass};
pub use path::{Path, PathEdge, RawPath, RawSegment};
pub use value::Value;
pub use property_map::{PropertyMap, PropertyMapExt, props};
pub use concept::{Concept, NewConcept, Quality, Modality};
pub use taxonomy::{Category, Subcategory, NewCategory, NewSubcategory};

/// Node labels used by the ontology.
pub mod labels {
    pub const CATEGORY: &str = "Category";
    pub const SUBCATEGORY: &str = "Subcategory";
    pub const CONCEPT: &str = "Concept";
}
