//! # Traversal Engine
//!
//! Bounded-depth path search and path reconstruction.
//!
//! The backend answers a path query with flat alternating sequences
//! `[node₀, edgeType₁, node₁, edgeType₂, node₂, …]`. Each sequence is checked
//! for shape and turned into a [`Path`]; a sequence that does not have the
//! expected shape is dropped, never repaired.
//!
//! Every query is bounded: depth must be at least one hop and at most
//! `TraversalLimits::max_depth`, and a result cap always applies.

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

use crate::config::OntologyConfig;
use crate::model::concept::keys;
use crate::model::{
    labels, Concept, Direction, NodeId, Page, Path, PathEdge, PropertyMap, RawPath, RawSegment, RelClass,
    RelId, RelType, RelationshipRecord, Value,
};
use crate::relationships::record_from;
use crate::storage::{find_unique, ExpandDepth, StorageBackend};
use crate::tx::{in_tx, TxMode};
use crate::{Error, Result};

// ============================================================================
// Path reconstruction
// ============================================================================

/// Turn one raw alternating sequence into a [`Path`].
///
/// Nodes are registered once each, keyed by Concept identity; one edge is
/// emitted per `(node, edge, node)` triple, in sequence order, with the
/// relationship's stored source and target.
///
/// Fails with `MalformedPath` if the sequence is shorter than one hop, has
/// an even length, does not alternate node/edge, holds a node that is not a
/// Concept, or holds an edge that does not join its two neighbors.
pub fn reconstruct_path(raw: &[RawSegment]) -> Result<Path> {
    if raw.len() < 3 || raw.len() % 2 == 0 {
        return Err(Error::MalformedPath(format!(
            "expected an odd number of segments (at least 3), got {}",
            raw.len()
        )));
    }

    // node id -> Concept id, for resolving edge endpoints
    let mut walk: Vec<(NodeId, String)> = Vec::with_capacity(raw.len() / 2 + 1);
    let mut seen = HashSet::with_capacity(raw.len() / 2 + 1);
    let mut nodes = Vec::new();
    for (i, segment) in raw.iter().enumerate().step_by(2) {
        let RawSegment::Node(node) = segment else {
            return Err(Error::MalformedPath(format!("segment {i} should be a node")));
        };
        let concept = Concept::from_node(node)
            .map_err(|e| Error::MalformedPath(format!("segment {i} is not a concept: {e}")))?;
        walk.push((node.id, concept.id.clone()));
        if seen.insert(concept.id.clone()) {
            nodes.push(concept);
        }
    }

    let mut edges = Vec::with_capacity(raw.len() / 2);
    for (hop, segment) in raw.iter().skip(1).step_by(2).enumerate() {
        let at = hop * 2 + 1;
        let RawSegment::Edge(rel) = segment else {
            return Err(Error::MalformedPath(format!("segment {at} should be an edge")));
        };
        let (prev, next) = (&walk[hop], &walk[hop + 1]);
        let (source, target) = if rel.src == prev.0 && rel.dst == next.0 {
            (prev, next)
        } else if rel.src == next.0 && rel.dst == prev.0 {
            (next, prev)
        } else {
            return Err(Error::MalformedPath(format!(
                "segment {at} ({}) does not join nodes {} and {}",
                rel.id, prev.0, next.0
            )));
        };
        let rel_type = RelType::parse(&rel.rel_type)
            .map_err(|_| Error::MalformedPath(format!("segment {at} has edge type '{}'", rel.rel_type)))?;
        edges.push(PathEdge {
            rel_id: rel.id,
            source_id: source.1.clone(),
            rel_type,
            target_id: target.1.clone(),
            properties: rel.properties.clone(),
        });
    }

    Ok(Path { nodes, edges })
}

// ============================================================================
// Queries
// ============================================================================

/// A bounded path query. Depth and limit default from `TraversalLimits`.
#[derive(Debug, Clone, PartialEq)]
pub struct TraversalQuery {
    pub start: String,
    pub rel_types: Vec<RelType>,
    pub direction: Direction,
    pub depth: Option<usize>,
    pub limit: Option<usize>,
}

impl TraversalQuery {
    /// Outgoing paths of any type from the Concept `start`.
    pub fn from(start: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            rel_types: Vec::new(),
            direction: Direction::Outgoing,
            depth: None,
            limit: None,
        }
    }

    pub fn rel_type(mut self, rel_type: RelType) -> Self {
        self.rel_types.push(rel_type);
        self
    }

    /// Follow every known type of a relationship class.
    pub fn class(mut self, class: RelClass) -> Self {
        self.rel_types.extend(class.members());
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn depth(mut self, depth: usize) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A Concept one hop away, with the edge that reaches it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub concept: Concept,
    pub rel_id: RelId,
    #[serde(rename = "type")]
    pub rel_type: RelType,
    /// `Outgoing` when the edge leaves the queried Concept.
    pub direction: Direction,
    pub properties: PropertyMap,
}

impl Neighbor {
    /// Edge confidence. A missing score sorts last.
    pub fn confidence(&self) -> f64 {
        self.properties
            .get(keys::CONFIDENCE_SCORE)
            .and_then(Value::as_float)
            .unwrap_or(f64::MIN)
    }
}

// ============================================================================
// Engine
// ============================================================================

pub struct TraversalEngine<'g, B: StorageBackend> {
    backend: &'g B,
    config: &'g OntologyConfig,
}

impl<'g, B: StorageBackend> TraversalEngine<'g, B> {
    pub fn new(backend: &'g B, config: &'g OntologyConfig) -> Self {
        Self { backend, config }
    }

    /// Run a path query. An unknown start Concept yields no paths.
    pub async fn paths(&self, query: &TraversalQuery) -> Result<Vec<Path>> {
        let depth = self.config.traversal.resolve_depth(query.depth)?;
        let limit = self.config.traversal.resolve_results(query.limit)?;
        let rel_types: Vec<&str> = query.rel_types.iter().map(RelType::as_str).collect();

        let raws = in_tx!(self.backend, TxMode::ReadOnly, |tx| self
            .expand_from(&tx, &query.start, query.direction, &rel_types, depth, limit)
            .await)?;

        let mut paths = Vec::with_capacity(raws.len());
        for raw in raws {
            match reconstruct_path(&raw) {
                Ok(path) => paths.push(path),
                Err(err) => tracing::warn!(start = %query.start, error = %err, "dropping malformed path"),
            }
        }
        tracing::debug!(start = %query.start, depth, found = paths.len(), "traversal");
        Ok(paths)
    }

    async fn expand_from(
        &self,
        tx: &B::Tx,
        start: &str,
        direction: Direction,
        rel_types: &[&str],
        depth: usize,
        limit: usize,
    ) -> Result<Vec<RawPath>> {
        let Some(node) = find_unique(self.backend, tx, labels::CONCEPT, keys::ID, start).await? else {
            return Ok(Vec::new());
        };
        self.backend
            .expand(
                tx,
                node.id,
                direction,
                rel_types,
                Some(labels::CONCEPT),
                ExpandDepth::Range { min: 1, max: depth },
                limit,
            )
            .await
    }

    /// What `start` causes, directly or through a chain of CAUSES edges.
    pub async fn causal_chain(
        &self,
        start: &str,
        depth: impl Into<Option<usize>>,
        limit: impl Into<Option<usize>>,
    ) -> Result<Vec<Path>> {
        self.typed_paths(start, RelType::Causes, depth.into(), limit.into()).await
    }

    /// Containment hierarchy below `start` (CONTAINS).
    pub async fn hierarchy(
        &self,
        start: &str,
        depth: impl Into<Option<usize>>,
        limit: impl Into<Option<usize>>,
    ) -> Result<Vec<Path>> {
        self.typed_paths(start, RelType::Contains, depth.into(), limit.into()).await
    }

    /// Wholes that `start` is part of (IS_PART_OF).
    pub async fn membership(
        &self,
        start: &str,
        depth: impl Into<Option<usize>>,
        limit: impl Into<Option<usize>>,
    ) -> Result<Vec<Path>> {
        self.typed_paths(start, RelType::IsPartOf, depth.into(), limit.into()).await
    }

    async fn typed_paths(
        &self,
        start: &str,
        rel_type: RelType,
        depth: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Vec<Path>> {
        let query = TraversalQuery {
            depth,
            limit,
            ..TraversalQuery::from(start).rel_type(rel_type)
        };
        self.paths(&query).await
    }

    // ========================================================================
    // Neighbor lookups
    // ========================================================================

    /// HAS_PROPERTY targets of `concept`, most confident first.
    pub async fn properties_of(&self, concept: &str, limit: impl Into<Option<usize>>) -> Result<Vec<Neighbor>> {
        self.neighbors(concept, RelType::HasProperty, Direction::Outgoing, limit.into()).await
    }

    /// Concepts interacting with `concept` in either direction.
    pub async fn interacting(&self, concept: &str, limit: impl Into<Option<usize>>) -> Result<Vec<Neighbor>> {
        self.neighbors(concept, RelType::InteractsWith, Direction::Both, limit.into()).await
    }

    /// Concepts before (`Incoming`) or after (`Outgoing`) `concept` via PRECEDES.
    pub async fn temporal(&self, concept: &str, limit: impl Into<Option<usize>>) -> Result<Vec<Neighbor>> {
        self.neighbors(concept, RelType::Precedes, Direction::Both, limit.into()).await
    }

    /// Concepts spatially related to `concept` in either direction.
    pub async fn spatial(&self, concept: &str, limit: impl Into<Option<usize>>) -> Result<Vec<Neighbor>> {
        self.neighbors(concept, RelType::SpatiallyRelatesTo, Direction::Both, limit.into()).await
    }

    /// One-hop neighbors over `rel_type`, ordered by edge confidence
    /// (descending), then name.
    pub async fn neighbors(
        &self,
        concept: &str,
        rel_type: RelType,
        direction: Direction,
        limit: Option<usize>,
    ) -> Result<Vec<Neighbor>> {
        let limit = self.config.traversal.resolve_results(limit)?;
        let mut found = in_tx!(self.backend, TxMode::ReadOnly, |tx| self
            .neighbors_in(&tx, concept, &rel_type, direction)
            .await)?;
        found.sort_by(|a, b| {
            b.confidence()
                .total_cmp(&a.confidence())
                .then_with(|| a.concept.name.cmp(&b.concept.name))
        });
        found.truncate(limit);
        Ok(found)
    }

    async fn neighbors_in(
        &self,
        tx: &B::Tx,
        concept: &str,
        rel_type: &RelType,
        direction: Direction,
    ) -> Result<Vec<Neighbor>> {
        let Some(node) = find_unique(self.backend, tx, labels::CONCEPT, keys::ID, concept).await? else {
            return Ok(Vec::new());
        };
        let rels = self
            .backend
            .get_relationships(tx, node.id, direction, Some(rel_type.as_str()))
            .await?;

        let mut out = Vec::with_capacity(rels.len());
        for rel in rels {
            let (other, dir) = if rel.src == node.id {
                (rel.dst, Direction::Outgoing)
            } else {
                (rel.src, Direction::Incoming)
            };
            let Some(other) = self.backend.get_node(tx, other).await? else {
                continue;
            };
            if !other.has_label(labels::CONCEPT) {
                continue;
            }
            out.push(Neighbor {
                concept: Concept::from_node(&other)?,
                rel_id: rel.id,
                rel_type: rel_type.clone(),
                direction: dir,
                properties: rel.properties,
            });
        }
        Ok(out)
    }

    /// Every relationship between `concept` and another Concept, ordered by
    /// type and then by the name of the Concept at the other end.
    /// Classification edges to Subcategories are not included.
    pub async fn all_relationships(
        &self,
        concept: &str,
        skip: usize,
        limit: impl Into<Option<usize>>,
    ) -> Result<Page<RelationshipRecord>> {
        let limit = self.config.pagination.resolve(limit.into())?;
        let mut records = in_tx!(self.backend, TxMode::ReadOnly, |tx| self
            .touching(&tx, concept)
            .await)?;
        records.sort_by(|(a, a_other), (b, b_other)| {
            a.rel_type
                .as_str()
                .cmp(b.rel_type.as_str())
                .then_with(|| a_other.cmp(b_other))
                .then_with(|| a.id.cmp(&b.id))
        });
        let records = records.into_iter().map(|(record, _)| record).collect();
        Ok(Page::from_sorted(records, skip, limit))
    }

    async fn touching(&self, tx: &B::Tx, concept: &str) -> Result<Vec<(RelationshipRecord, String)>> {
        let Some(node) = find_unique(self.backend, tx, labels::CONCEPT, keys::ID, concept).await? else {
            return Ok(Vec::new());
        };
        let rels = self.backend.get_relationships(tx, node.id, Direction::Both, None).await?;

        let mut out = Vec::with_capacity(rels.len());
        for rel in rels {
            let other_id = if rel.src == node.id { rel.dst } else { rel.src };
            let Some(other) = self.backend.get_node(tx, other_id).await? else {
                continue;
            };
            if !other.has_label(labels::CONCEPT) {
                continue;
            }
            let other_name = other.display_name().unwrap_or_default().to_owned();
            let record = if rel.src == node.id {
                record_from(&rel, &node, &other)?
            } else {
                record_from(&rel, &other, &node)?
            };
            out.push((record, other_name));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Node, Relationship};
    use pretty_assertions::assert_eq;

    fn concept(n: u64, id: &str) -> RawSegment {
        RawSegment::Node(
            Node::new(NodeId(n))
                .with_labels([labels::CONCEPT])
                .with_property("id", id)
                .with_property("name", id.to_uppercase())
                .with_property("confidence_score", 0.5),
        )
    }

    fn edge(src: u64, t: &str, dst: u64) -> RawSegment {
        RawSegment::Edge(Relationship {
            id: RelId(src * 100 + dst),
            src: NodeId(src),
            dst: NodeId(dst),
            rel_type: t.into(),
            properties: crate::model::props([("confidence_score", 0.9)]),
        })
    }

    fn triples(path: &Path) -> Vec<(&str, &RelType, &str)> {
        path.edges.iter().map(PathEdge::triple).collect()
    }

    #[test]
    fn test_reconstruct_chain() {
        let raw = [concept(1, "a"), edge(1, "CAUSES", 2), concept(2, "b"), edge(2, "CAUSES", 3), concept(3, "c")];
        let path = reconstruct_path(&raw).unwrap();

        let ids: Vec<_> = path.nodes.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(triples(&path), vec![("a", &RelType::Causes, "b"), ("b", &RelType::Causes, "c")]);
        assert_eq!(path.edges[0].rel_id, RelId(102));
        assert_eq!(path.edges[0].get("confidence_score"), Some(&Value::Float(0.9)));
        assert_eq!(path.len(), 2);
        assert_eq!(path.end().map(|c| c.id.as_str()), Some("c"));
    }

    #[test]
    fn test_reconstruct_keeps_stored_orientation() {
        // walked b -> a against a CAUSES b
        let raw = [concept(2, "b"), edge(1, "CAUSES", 2), concept(1, "a")];
        let path = reconstruct_path(&raw).unwrap();
        assert_eq!(triples(&path), vec![("a", &RelType::Causes, "b")]);
        assert_eq!(path.start().map(|c| c.id.as_str()), Some("b"));
        assert_eq!(path.end().map(|c| c.id.as_str()), Some("a"));
    }

    #[test]
    fn test_reconstruct_registers_each_node_once() {
        let raw = [
            concept(1, "a"),
            edge(1, "INTERACTS_WITH", 2),
            concept(2, "b"),
            edge(2, "INTERACTS_WITH", 1),
            concept(1, "a"),
        ];
        let path = reconstruct_path(&raw).unwrap();
        assert_eq!(path.nodes.len(), 2);
        assert_eq!(path.edges.len(), 2);
        assert_eq!(path.edges[1].triple(), ("b", &RelType::InteractsWith, "a"));
        assert_eq!(path.end().map(|c| c.id.as_str()), Some("a"));
    }

    #[test]
    fn test_detached_edge_is_malformed() {
        let raw = [concept(1, "a"), edge(3, "CAUSES", 4), concept(2, "b")];
        assert!(matches!(reconstruct_path(&raw), Err(Error::MalformedPath(_))));
    }

    #[test]
    fn test_even_length_is_malformed() {
        let raw = [concept(1, "a"), edge(1, "CAUSES", 2), concept(2, "b"), edge(2, "CAUSES", 3)];
        assert!(matches!(reconstruct_path(&raw), Err(Error::MalformedPath(_))));
    }

    #[test]
    fn test_lone_node_is_malformed() {
        assert!(matches!(reconstruct_path(&[concept(1, "a")]), Err(Error::MalformedPath(_))));
        assert!(matches!(reconstruct_path(&[]), Err(Error::MalformedPath(_))));
    }

    #[test]
    fn test_non_alternating_is_malformed() {
        let raw = [concept(1, "a"), concept(2, "b"), concept(3, "c")];
        assert!(matches!(reconstruct_path(&raw), Err(Error::MalformedPath(_))));
        let raw = [edge(1, "CAUSES", 2), concept(1, "a"), edge(1, "CAUSES", 2)];
        assert!(matches!(reconstruct_path(&raw), Err(Error::MalformedPath(_))));
    }

    #[test]
    fn test_non_concept_node_is_malformed() {
        let sub = RawSegment::Node(Node::new(NodeId(9)).with_labels([labels::SUBCATEGORY]));
        let raw = [concept(1, "a"), edge(1, "INSTANCE_OF", 9), sub];
        assert!(matches!(reconstruct_path(&raw), Err(Error::MalformedPath(_))));
    }

    #[test]
    fn test_query_builder() {
        let q = TraversalQuery::from("x").class(RelClass::Compositional).depth(2);
        assert_eq!(q.rel_types, vec![RelType::Contains, RelType::IsPartOf]);
        assert_eq!(q.depth, Some(2));
        assert_eq!(q.limit, None);
        assert_eq!(q.direction, Direction::Outgoing);
    }
}
