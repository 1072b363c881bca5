//! In-memory storage backend.
//!
//! This is the reference implementation of `StorageBackend`.
//! The whole graph sits behind one RwLock, so every backend call is atomic.
//!
//! ## Semantics
//!
//! - **Transactions**: each write records an undo entry on its `MemoryTx`.
//!   `commit_tx()` drops the journal, `rollback_tx()` replays it in reverse.
//!   There is no isolation: a concurrent reader may observe writes of a
//!   transaction that later rolls back.
//! - **Constraints**: unique constraints are checked on every node write.
//! - **No property indexes**: property lookups scan the label index.
//!
//! Use this backend for:
//! - Testing the stores and traversal engine
//! - Embedding the ontology in applications that don't need persistence

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use hashbrown::{HashMap, HashSet};
use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::model::*;
use crate::tx::{Transaction, TxId, TxMode};
use crate::{EntityKind, Error, Result};
use super::{
    Constraint, ConstraintType, ExpandDepth, NodeUpdate, RelationshipUpdate, StorageBackend,
};

// ============================================================================
// MemoryBackend
// ============================================================================

/// In-memory property graph storage.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    graph: RwLock<GraphState>,
    next_node_id: AtomicU64,
    next_rel_id: AtomicU64,
    next_tx_id: AtomicU64,
    closed: AtomicBool,
}

#[derive(Default)]
struct GraphState {
    nodes: HashMap<NodeId, Node>,
    relationships: HashMap<RelId, Relationship>,
    /// node_id → list of relationship IDs, in creation order
    adjacency: HashMap<NodeId, Vec<RelId>>,
    /// label → node IDs, in creation order
    label_index: HashMap<String, Vec<NodeId>>,
    constraints: Vec<Constraint>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                graph: RwLock::new(GraphState::default()),
                next_node_id: AtomicU64::new(1),
                next_rel_id: AtomicU64::new(1),
                next_tx_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    fn undo(&self, mut tx: MemoryTx) {
        if tx.journal.is_empty() {
            return;
        }
        tracing::debug!(tx = %tx.id, writes = tx.journal.len(), "rolling back");
        let mut graph = self.inner.graph.write();
        while let Some(undo) = tx.journal.pop() {
            graph.apply(undo);
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            Err(Error::StoreUnavailable("memory backend has been shut down".into()))
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// MemoryTx
// ============================================================================

/// Undo entry recorded by a write.
#[derive(Debug)]
enum Undo {
    RemoveNode(NodeId),
    RestoreNode(Node, Vec<Relationship>),
    RestoreNodeProps(NodeId, PropertyMap),
    RemoveRel(RelId),
    RestoreRel(Relationship),
    RestoreRelProps(RelId, PropertyMap),
}

/// In-memory transaction: a mode plus an undo journal.
#[derive(Debug)]
pub struct MemoryTx {
    id: TxId,
    mode: TxMode,
    journal: Vec<Undo>,
}

impl Transaction for MemoryTx {
    fn mode(&self) -> TxMode { self.mode }
    fn id(&self) -> TxId { self.id }
}

// ============================================================================
// GraphState primitives
// ============================================================================

impl GraphState {
    fn insert_node(&mut self, node: Node) {
        let id = node.id;
        for label in &node.labels {
            self.label_index.entry(label.clone()).or_default().push(id);
        }
        self.adjacency.entry(id).or_default();
        self.nodes.insert(id, node);
    }

    fn insert_rel(&mut self, rel: Relationship) {
        self.adjacency.entry(rel.src).or_default().push(rel.id);
        if rel.src != rel.dst {
            self.adjacency.entry(rel.dst).or_default().push(rel.id);
        }
        self.relationships.insert(rel.id, rel);
    }

    fn remove_rel(&mut self, id: RelId) -> Option<Relationship> {
        let rel = self.relationships.remove(&id)?;
        for end in [rel.src, rel.dst] {
            if let Some(ids) = self.adjacency.get_mut(&end) {
                ids.retain(|rid| *rid != id);
            }
        }
        Some(rel)
    }

    /// Remove a node together with every incident relationship.
    fn detach_remove_node(&mut self, id: NodeId) -> Option<(Node, Vec<Relationship>)> {
        if !self.nodes.contains_key(&id) {
            return None;
        }
        let rel_ids = self.adjacency.get(&id).cloned().unwrap_or_default();
        let rels: Vec<Relationship> = rel_ids.into_iter().filter_map(|rid| self.remove_rel(rid)).collect();

        let node = self.nodes.remove(&id)?;
        self.adjacency.remove(&id);
        for label in &node.labels {
            if let Some(ids) = self.label_index.get_mut(label) {
                ids.retain(|nid| *nid != id);
            }
        }
        Some((node, rels))
    }

    /// Check every unique constraint that applies to `labels` against `props`.
    fn check_unique(&self, labels: &[String], props: &PropertyMap, except: Option<NodeId>) -> Result<()> {
        for c in &self.constraints {
            if !labels.contains(&c.label) {
                continue;
            }
            let Some(value) = props.get(&c.property).filter(|v| !v.is_null()) else {
                continue;
            };
            let clash = self
                .label_index
                .get(&c.label)
                .into_iter()
                .flatten()
                .filter(|nid| Some(**nid) != except)
                .filter_map(|nid| self.nodes.get(nid))
                .any(|n| n.get(&c.property) == Some(value));
            if clash {
                return Err(Error::Conflict(format!(
                    "{}.{} = {value} already exists",
                    c.label, c.property
                )));
            }
        }
        Ok(())
    }

    fn apply(&mut self, undo: Undo) {
        match undo {
            Undo::RemoveNode(id) => {
                self.detach_remove_node(id);
            }
            Undo::RestoreNode(node, rels) => {
                self.insert_node(node);
                for rel in rels {
                    self.insert_rel(rel);
                }
            }
            Undo::RestoreNodeProps(id, props) => {
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.properties = props;
                }
            }
            Undo::RemoveRel(id) => {
                self.remove_rel(id);
            }
            Undo::RestoreRel(rel) => self.insert_rel(rel),
            Undo::RestoreRelProps(id, props) => {
                if let Some(rel) = self.relationships.get_mut(&id) {
                    rel.properties = props;
                }
            }
        }
    }
}

// ============================================================================
// StorageBackend impl
// ============================================================================

#[async_trait]
impl StorageBackend for MemoryBackend {
    type Tx = MemoryTx;

    async fn shutdown(&self) -> Result<()> {
        self.inner.closed.store(true, Ordering::Release);
        Ok(())
    }

    async fn begin_tx(&self, mode: TxMode) -> Result<MemoryTx> {
        self.ensure_open()?;
        let id = TxId(self.inner.next_tx_id.fetch_add(1, Ordering::Relaxed));
        Ok(MemoryTx { id, mode, journal: Vec::new() })
    }

    async fn commit_tx(&self, tx: MemoryTx) -> Result<()> {
        if let Err(err) = self.ensure_open() {
            // Closed mid-transaction: nothing of it may stay behind.
            self.undo(tx);
            return Err(err);
        }
        tracing::trace!(tx = %tx.id, writes = tx.journal.len(), "commit");
        Ok(())
    }

    async fn rollback_tx(&self, tx: MemoryTx) -> Result<()> {
        self.undo(tx);
        Ok(())
    }

    // ========================================================================
    // Node CRUD
    // ========================================================================

    async fn create_node(
        &self,
        tx: &mut MemoryTx,
        labels: &[&str],
        props: PropertyMap,
    ) -> Result<NodeId> {
        self.ensure_open()?;
        tx.ensure_writable()?;

        let labels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        let mut graph = self.inner.graph.write();
        graph.check_unique(&labels, &props, None)?;

        let id = NodeId(self.inner.next_node_id.fetch_add(1, Ordering::Relaxed));
        graph.insert_node(Node { id, labels, properties: props });
        tx.journal.push(Undo::RemoveNode(id));
        Ok(id)
    }

    async fn get_node(&self, _tx: &MemoryTx, id: NodeId) -> Result<Option<Node>> {
        self.ensure_open()?;
        Ok(self.inner.graph.read().nodes.get(&id).cloned())
    }

    async fn update_node(
        &self,
        tx: &mut MemoryTx,
        id: NodeId,
        update: NodeUpdate<'_>,
    ) -> Result<Option<Node>> {
        self.ensure_open()?;
        tx.ensure_writable()?;

        let mut graph = self.inner.graph.write();
        let Some(current) = graph.nodes.get(&id) else {
            return Ok(None);
        };
        let new_props = update(current)?;
        let labels = current.labels.clone();
        graph.check_unique(&labels, &new_props, Some(id))?;

        let Some(node) = graph.nodes.get_mut(&id) else {
            return Ok(None);
        };
        let old = std::mem::replace(&mut node.properties, new_props);
        let updated = node.clone();
        tx.journal.push(Undo::RestoreNodeProps(id, old));
        Ok(Some(updated))
    }

    async fn detach_delete_node(&self, tx: &mut MemoryTx, id: NodeId) -> Result<bool> {
        self.ensure_open()?;
        tx.ensure_writable()?;

        let removed = self.inner.graph.write().detach_remove_node(id);
        match removed {
            Some((node, rels)) => {
                tx.journal.push(Undo::RestoreNode(node, rels));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ========================================================================
    // Relationship CRUD
    // ========================================================================

    async fn create_relationship(
        &self,
        tx: &mut MemoryTx,
        src: NodeId,
        dst: NodeId,
        rel_type: &str,
        props: PropertyMap,
    ) -> Result<RelId> {
        self.ensure_open()?;
        tx.ensure_writable()?;

        let mut graph = self.inner.graph.write();
        // Verify both nodes exist
        if !graph.nodes.contains_key(&src) {
            return Err(Error::NotFound { kind: EntityKind::SourceNode, id: src.to_string() });
        }
        if !graph.nodes.contains_key(&dst) {
            return Err(Error::NotFound { kind: EntityKind::TargetNode, id: dst.to_string() });
        }

        let id = RelId(self.inner.next_rel_id.fetch_add(1, Ordering::Relaxed));
        graph.insert_rel(Relationship {
            id,
            src,
            dst,
            rel_type: rel_type.to_string(),
            properties: props,
        });
        tx.journal.push(Undo::RemoveRel(id));
        Ok(id)
    }

    async fn get_relationship(&self, _tx: &MemoryTx, id: RelId) -> Result<Option<Relationship>> {
        self.ensure_open()?;
        Ok(self.inner.graph.read().relationships.get(&id).cloned())
    }

    async fn update_relationship(
        &self,
        tx: &mut MemoryTx,
        id: RelId,
        update: RelationshipUpdate<'_>,
    ) -> Result<Option<Relationship>> {
        self.ensure_open()?;
        tx.ensure_writable()?;

        let mut graph = self.inner.graph.write();
        let Some(rel) = graph.relationships.get_mut(&id) else {
            return Ok(None);
        };
        let new_props = update(rel)?;
        let old = std::mem::replace(&mut rel.properties, new_props);
        let updated = rel.clone();
        tx.journal.push(Undo::RestoreRelProps(id, old));
        Ok(Some(updated))
    }

    async fn delete_relationship(&self, tx: &mut MemoryTx, id: RelId) -> Result<bool> {
        self.ensure_open()?;
        tx.ensure_writable()?;

        let removed = self.inner.graph.write().remove_rel(id);
        match removed {
            Some(rel) => {
                tx.journal.push(Undo::RestoreRel(rel));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    async fn get_relationships(
        &self,
        _tx: &MemoryTx,
        node: NodeId,
        dir: Direction,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>> {
        self.ensure_open()?;
        let graph = self.inner.graph.read();
        Ok(outgoing_edges(&graph, node, dir, rel_type.map(|t| vec![t]).as_deref().unwrap_or(&[]))
            .into_iter()
            .map(|(rel, _)| rel.clone())
            .collect())
    }

    async fn expand(
        &self,
        _tx: &MemoryTx,
        node: NodeId,
        dir: Direction,
        rel_types: &[&str],
        node_label: Option<&str>,
        depth: ExpandDepth,
        limit: usize,
    ) -> Result<Vec<RawPath>> {
        self.ensure_open()?;
        let (min_depth, max_depth) = depth.bounds();
        let graph = self.inner.graph.read();

        let Some(start) = graph.nodes.get(&node) else {
            return Ok(Vec::new());
        };

        // BFS over partial paths; each frontier entry is (sequence, visited, tip).
        let mut results = Vec::new();
        let mut seed = RawPath::new();
        seed.push(RawSegment::Node(start.clone()));
        let mut visited = HashSet::new();
        visited.insert(node);
        let mut queue: Vec<(RawPath, HashSet<NodeId>, NodeId)> = vec![(seed, visited, node)];

        for current_depth in 0..max_depth {
            let mut next_queue = Vec::new();

            for (path, visited, tip) in &queue {
                for (rel, next_id) in outgoing_edges(&graph, *tip, dir, rel_types) {
                    // Avoid cycles
                    if visited.contains(&next_id) {
                        continue;
                    }
                    let Some(next_node) = graph.nodes.get(&next_id) else {
                        continue;
                    };
                    if node_label.is_some_and(|label| !next_node.has_label(label)) {
                        continue;
                    }

                    let mut new_path = path.clone();
                    new_path.push(RawSegment::Edge(rel.clone()));
                    new_path.push(RawSegment::Node(next_node.clone()));

                    if current_depth + 1 >= min_depth {
                        results.push(new_path.clone());
                        if results.len() >= limit {
                            return Ok(results);
                        }
                    }
                    if current_depth + 1 < max_depth {
                        let mut seen = visited.clone();
                        seen.insert(next_id);
                        next_queue.push((new_path, seen, next_id));
                    }
                }
            }

            queue = next_queue;
            if queue.is_empty() { break; }
        }

        Ok(results)
    }

    // ========================================================================
    // Scan
    // ========================================================================

    async fn nodes_by_label(&self, _tx: &MemoryTx, label: &str) -> Result<Vec<Node>> {
        self.ensure_open()?;
        let graph = self.inner.graph.read();
        let ids = graph.label_index.get(label).cloned().unwrap_or_default();
        Ok(ids.iter().filter_map(|id| graph.nodes.get(id).cloned()).collect())
    }

    async fn nodes_by_property(
        &self,
        _tx: &MemoryTx,
        label: &str,
        key: &str,
        value: &Value,
    ) -> Result<Vec<Node>> {
        self.ensure_open()?;
        // Brute force scan (memory backend doesn't have real property indexes)
        let graph = self.inner.graph.read();
        Ok(graph
            .label_index
            .get(label)
            .into_iter()
            .flatten()
            .filter_map(|id| graph.nodes.get(id))
            .filter(|n| n.get(key) == Some(value))
            .cloned()
            .collect())
    }

    async fn relationships_by_type(
        &self,
        _tx: &MemoryTx,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>> {
        self.ensure_open()?;
        let graph = self.inner.graph.read();
        let mut rels: Vec<Relationship> = graph
            .relationships
            .values()
            .filter(|r| rel_type.is_none_or(|t| r.rel_type == t))
            .cloned()
            .collect();
        rels.sort_by_key(|r| r.id);
        Ok(rels)
    }

    // ========================================================================
    // Schema introspection
    // ========================================================================

    async fn node_count(&self, _tx: &MemoryTx) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.inner.graph.read().nodes.len() as u64)
    }

    async fn relationship_count(&self, _tx: &MemoryTx) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.inner.graph.read().relationships.len() as u64)
    }

    // ========================================================================
    // Constraints
    // ========================================================================

    async fn create_constraint(
        &self,
        label: &str,
        property: &str,
        constraint_type: ConstraintType,
    ) -> Result<bool> {
        self.ensure_open()?;
        let constraint = Constraint {
            label: label.to_string(),
            property: property.to_string(),
            kind: constraint_type,
        };

        let mut graph = self.inner.graph.write();
        if graph.constraints.contains(&constraint) {
            return Ok(false);
        }

        // Existing data must already satisfy the constraint.
        let mut seen = Vec::new();
        for node in graph.label_index.get(label).into_iter().flatten().filter_map(|id| graph.nodes.get(id)) {
            if let Some(v) = node.get(property).filter(|v| !v.is_null()) {
                if seen.contains(&v) {
                    return Err(Error::Conflict(format!(
                        "cannot create unique constraint on {label}.{property}: duplicate value {v}"
                    )));
                }
                seen.push(v);
            }
        }

        graph.constraints.push(constraint);
        Ok(true)
    }

    async fn constraints(&self) -> Result<Vec<Constraint>> {
        self.ensure_open()?;
        Ok(self.inner.graph.read().constraints.clone())
    }
}

/// Edges leaving `node` in direction `dir` (optionally type-filtered),
/// paired with the node at the other end, in adjacency order.
fn outgoing_edges<'g>(
    graph: &'g GraphState,
    node: NodeId,
    dir: Direction,
    rel_types: &[&str],
) -> SmallVec<[(&'g Relationship, NodeId); 8]> {
    let Some(rel_ids) = graph.adjacency.get(&node) else {
        return SmallVec::new();
    };
    rel_ids
        .iter()
        .filter_map(|rid| graph.relationships.get(rid))
        .filter(|rel| rel_types.is_empty() || rel_types.contains(&rel.rel_type.as_str()))
        .filter_map(|rel| {
            let next = match dir {
                Direction::Outgoing if rel.src == node => rel.dst,
                Direction::Incoming if rel.dst == node => rel.src,
                Direction::Both => rel.other_node(node)?,
                _ => return None,
            };
            Some((rel, next))
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
