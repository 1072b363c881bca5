//! Path — query-time result of a bounded traversal. Never persisted.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::{Concept, Node, PropertyMap, RelId, RelType, Relationship, Value};

/// One element of the flat sequence a path search yields:
/// `[node₀, edge₁, node₁, edge₂, node₂, …]`. Edges keep their stored
/// orientation, which may run against the walk.
#[derive(Debug, Clone, PartialEq)]
pub enum RawSegment {
    Node(Node),
    Edge(Relationship),
}

/// A raw path as the backend emits it. Depth is bounded (≤ 5 hops by
/// default), so eleven segments stay inline.
pub type RawPath = SmallVec<[RawSegment; 11]>;

/// Edge of a reconstructed path, as stored: `source_id` is the Concept the
/// relationship leaves, whichever way the walk crossed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathEdge {
    pub rel_id: RelId,
    pub source_id: String,
    #[serde(rename = "type")]
    pub rel_type: RelType,
    pub target_id: String,
    pub properties: PropertyMap,
}

impl PathEdge {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// `(source_id, type, target_id)`.
    pub fn triple(&self) -> (&str, &RelType, &str) {
        (&self.source_id, &self.rel_type, &self.target_id)
    }
}

/// Distinct visited Concepts (first-seen order) plus edges in traversal order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub nodes: Vec<Concept>,
    pub edges: Vec<PathEdge>,
}

impl Path {
    /// Number of hops.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn start(&self) -> Option<&Concept> {
        self.nodes.first()
    }

    /// Concept the walk ends on.
    pub fn end(&self) -> Option<&Concept> {
        if self.edges.is_empty() {
            return None;
        }
        let mut tip = self.start()?.id.as_str();
        for edge in &self.edges {
            tip = if edge.source_id == tip { &edge.target_id } else { &edge.source_id };
        }
        self.nodes.iter().find(|c| c.id == tip)
    }

    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.iter().map(|c| c.name.as_str()).collect()
    }
}
