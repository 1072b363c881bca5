//! # Storage Backend Trait
//!
//! This is THE contract between the ontology stores and any graph engine.
//! Every primitive the stores need is defined here; validation and
//! orchestration live above it.
//!
//! The backend is assumed to provide unique-key enforcement and atomic
//! single-call writes. Multi-call sequences are grouped in a transaction by
//! the caller.
//!
//! ## Implementations
//!
//! | Backend | Module | Description |
//! |---------|--------|-------------|
//! | `MemoryBackend` | `memory` | In-memory for testing/embedding |

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::*;
use crate::tx::{Transaction, TxMode};
use crate::{Error, Result};

pub use memory::MemoryBackend;

// ============================================================================
// Backend Configuration
// ============================================================================

/// Which storage backend an `Ontology` opens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// In-memory (no persistence)
    #[default]
    Memory,
}

// ============================================================================
// Expand depth specification
// ============================================================================

/// Depth specification for graph expansion. Always bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandDepth {
    /// Exact depth
    Exact(usize),
    /// Range: min..max (inclusive)
    Range { min: usize, max: usize },
}

impl ExpandDepth {
    pub fn bounds(self) -> (usize, usize) {
        match self {
            ExpandDepth::Exact(d) => (d, d),
            ExpandDepth::Range { min, max } => (min, max),
        }
    }
}

// ============================================================================
// Constraint types
// ============================================================================

/// Type of constraint to create on a label+property pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintType {
    /// Property value must be unique for nodes with this label.
    Unique,
}

/// A schema constraint as registered in the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constraint {
    pub label: String,
    pub property: String,
    pub kind: ConstraintType,
}

/// Property rewrite applied atomically by the backend: receives the current
/// relationship (or node properties) and returns the complete new property
/// map, or an error that aborts the write with nothing changed.
pub type RelationshipUpdate<'a> = &'a (dyn Fn(&Relationship) -> Result<PropertyMap> + Send + Sync);
pub type NodeUpdate<'a> = &'a (dyn Fn(&Node) -> Result<PropertyMap> + Send + Sync);

// ============================================================================
// StorageBackend Trait
// ============================================================================

/// The universal storage contract.
///
/// Backends report transport or lifecycle failures as
/// `Error::StoreUnavailable`; they never retry.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// The transaction type for this backend.
    type Tx: Transaction;

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Shut down the backend. Later calls fail with `StoreUnavailable`.
    async fn shutdown(&self) -> Result<()>;

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Begin a new transaction.
    async fn begin_tx(&self, mode: TxMode) -> Result<Self::Tx>;

    /// Commit a transaction. A commit that fails leaves none of the
    /// transaction's writes behind.
    async fn commit_tx(&self, tx: Self::Tx) -> Result<()>;

    /// Roll back a transaction.
    async fn rollback_tx(&self, tx: Self::Tx) -> Result<()>;

    // ========================================================================
    // Node CRUD
    // ========================================================================

    /// Create a node with the given labels and properties.
    /// Fails with `Conflict` if a unique constraint would be violated.
    async fn create_node(
        &self,
        tx: &mut Self::Tx,
        labels: &[&str],
        props: PropertyMap,
    ) -> Result<NodeId>;

    /// Get a node by ID. Returns None if not found.
    async fn get_node(&self, tx: &Self::Tx, id: NodeId) -> Result<Option<Node>>;

    /// Atomically replace a node's properties with `update(current)`.
    /// Returns the updated node, or None if the node does not exist.
    async fn update_node(
        &self,
        tx: &mut Self::Tx,
        id: NodeId,
        update: NodeUpdate<'_>,
    ) -> Result<Option<Node>>;

    /// Delete a node and all its relationships in one operation.
    /// Returns true if it existed.
    async fn detach_delete_node(&self, tx: &mut Self::Tx, id: NodeId) -> Result<bool>;

    // ========================================================================
    // Relationship CRUD
    // ========================================================================

    /// Create a relationship between two nodes.
    /// Fails with `NotFound` if either endpoint has gone away.
    async fn create_relationship(
        &self,
        tx: &mut Self::Tx,
        src: NodeId,
        dst: NodeId,
        rel_type: &str,
        props: PropertyMap,
    ) -> Result<RelId>;

    /// Get a relationship by ID.
    async fn get_relationship(&self, tx: &Self::Tx, id: RelId) -> Result<Option<Relationship>>;

    /// All relationships matching an identity. Correct backends return at
    /// most one; callers treat more as an inconsistency.
    ///
    /// Default: wraps `get_relationship`.
    async fn match_relationship(&self, tx: &Self::Tx, id: RelId) -> Result<Vec<Relationship>> {
        Ok(self.get_relationship(tx, id).await?.into_iter().collect())
    }

    /// Atomically replace a relationship's properties with `update(current)`.
    /// Returns the updated relationship, or None if it does not exist.
    async fn update_relationship(
        &self,
        tx: &mut Self::Tx,
        id: RelId,
        update: RelationshipUpdate<'_>,
    ) -> Result<Option<Relationship>>;

    /// Delete a relationship. Returns true if it existed.
    async fn delete_relationship(&self, tx: &mut Self::Tx, id: RelId) -> Result<bool>;

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Get all relationships of a node, optionally filtered by direction and type.
    async fn get_relationships(
        &self,
        tx: &Self::Tx,
        node: NodeId,
        dir: Direction,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>>;

    /// Bounded variable-length path search from `node`.
    ///
    /// Each match is a flat alternating `[node, edge, node, …]` sequence
    /// with no repeated node; every edge segment is the stored relationship,
    /// in its stored orientation. With `node_label` set, only nodes carrying
    /// that label are stepped onto. At most `limit` matches are returned. A
    /// start node that does not exist yields no matches.
    async fn expand(
        &self,
        tx: &Self::Tx,
        node: NodeId,
        dir: Direction,
        rel_types: &[&str],
        node_label: Option<&str>,
        depth: ExpandDepth,
        limit: usize,
    ) -> Result<Vec<RawPath>>;

    // ========================================================================
    // Scan
    // ========================================================================

    /// Find all nodes with a given label.
    async fn nodes_by_label(&self, tx: &Self::Tx, label: &str) -> Result<Vec<Node>>;

    /// Find nodes by label + property value.
    async fn nodes_by_property(
        &self,
        tx: &Self::Tx,
        label: &str,
        key: &str,
        value: &Value,
    ) -> Result<Vec<Node>>;

    /// Find all relationships, optionally of a given type.
    async fn relationships_by_type(
        &self,
        tx: &Self::Tx,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>>;

    // ========================================================================
    // Schema introspection
    // ========================================================================

    /// Total number of nodes.
    async fn node_count(&self, tx: &Self::Tx) -> Result<u64>;

    /// Total number of relationships.
    async fn relationship_count(&self, tx: &Self::Tx) -> Result<u64>;

    // ========================================================================
    // Constraints
    // ========================================================================

    /// Create a schema constraint if it does not exist yet.
    /// Returns true when newly created. Fails with `Conflict` if existing
    /// data already violates it.
    async fn create_constraint(
        &self,
        label: &str,
        property: &str,
        constraint_type: ConstraintType,
    ) -> Result<bool>;

    /// All registered constraints.
    async fn constraints(&self) -> Result<Vec<Constraint>>;
}

/// Resolve a node by a key that should be unique within its label.
/// More than one match is an inconsistency, never "pick the first".
pub(crate) async fn find_unique<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    label: &str,
    key: &str,
    value: &str,
) -> Result<Option<Node>> {
    let mut found = backend.nodes_by_property(tx, label, key, &Value::from(value)).await?;
    match found.len() {
        0 | 1 => Ok(found.pop()),
        n => Err(Error::InternalInconsistency(format!(
            "{n} {label} nodes share {key} = '{value}'"
        ))),
    }
}
