//! # kantian-graph — Typed Concept Graph
//!
//! A property graph of abstract concepts classified under the four Kantian
//! categories, connected by typed, property-bearing relationships (causal,
//! spatial, temporal, compositional, interactional).
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `StorageBackend` is the contract between the stores and storage
//! 2. **Validate before write**: every mutation passes the `validation` rules
//!    before anything reaches the backend
//! 3. **Bounded traversal**: every path query carries a depth and a result cap
//! 4. **Clean DTOs**: `Concept`, `RelationshipRecord`, `Path`, `Value` cross all boundaries
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kantian_graph::{Ontology, NewConcept, Quality, RelType, props};
//!
//! # async fn example() -> kantian_graph::Result<()> {
//! let onto = Ontology::open_memory().await?;
//!
//! let heat = onto.concepts().create(NewConcept::new("Heat").quality(Quality::Reality)).await?;
//! let expansion = onto.concepts().create(NewConcept::new("Expansion").quality(Quality::Reality)).await?;
//!
//! onto.relationships()
//!     .create(&heat.id, &expansion.id, "CAUSES", props([("confidence_score", 0.95)]))
//!     .await?;
//!
//! for path in onto.traversal().causal_chain(&heat.id, 1, 10).await? {
//!     println!("{:?}", path.node_names());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Storage Backends
//!
//! | Backend | Feature | Description |
//! |---------|---------|-------------|
//! | Memory | (default) | In-memory graph for testing/embedding |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod storage;
pub mod tx;
pub mod config;
pub mod validation;
pub mod taxonomy;
pub mod concepts;
pub mod relationships;
pub mod traversal;
pub mod bootstrap;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    Concept, NewConcept, Quality, Modality,
    Category, Subcategory, NewCategory, NewSubcategory,
    Relationship, RelationshipRecord, RelType, RelClass, Page,
    Node, Path, PathEdge, Value, PropertyMap, PropertyMapExt, props,
    NodeId, RelId, Direction,
};

// ============================================================================
// Re-exports: Storage, Transactions, Stores
// ============================================================================

pub use storage::{StorageBackend, BackendConfig, ConstraintType, MemoryBackend};
pub use tx::{Transaction, TxMode, TxId};
pub use config::OntologyConfig;
pub use concepts::ConceptStore;
pub use relationships::RelationshipStore;
pub use taxonomy::TaxonomyStore;
pub use traversal::{TraversalEngine, TraversalQuery, Neighbor};
pub use bootstrap::{BootstrapReport, SeedOptions};

// ============================================================================
// Top-level Ontology handle
// ============================================================================

/// The primary entry point. An `Ontology` wraps a storage backend and hands
/// out the stores that operate on it.
pub struct Ontology<B: StorageBackend> {
    backend: B,
    config: OntologyConfig,
}

impl<B: StorageBackend> Ontology<B> {
    /// Create an Ontology with the given backend and default configuration.
    pub fn with_backend(backend: B) -> Self {
        Self { backend, config: OntologyConfig::default() }
    }

    /// Create an Ontology with an explicit configuration.
    pub fn with_config(backend: B, config: OntologyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { backend, config })
    }

    pub fn concepts(&self) -> ConceptStore<'_, B> {
        ConceptStore::new(&self.backend, &self.config)
    }

    pub fn relationships(&self) -> RelationshipStore<'_, B> {
        RelationshipStore::new(&self.backend, &self.config)
    }

    pub fn taxonomy(&self) -> TaxonomyStore<'_, B> {
        TaxonomyStore::new(&self.backend)
    }

    pub fn traversal(&self) -> TraversalEngine<'_, B> {
        TraversalEngine::new(&self.backend, &self.config)
    }

    /// Apply constraints and seed the taxonomy. Safe to call repeatedly.
    pub async fn bootstrap(&self, options: SeedOptions) -> Result<BootstrapReport> {
        bootstrap::initialize(self, options).await
    }

    pub fn config(&self) -> &OntologyConfig {
        &self.config
    }

    /// Access the underlying backend (for advanced use).
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.backend.shutdown().await
    }
}

/// In-memory ontology for testing and embedding.
impl Ontology<MemoryBackend> {
    pub async fn open_memory() -> Result<Self> {
        Ok(Self::with_backend(MemoryBackend::new()))
    }

    /// Open the backend named by `config.backend`.
    pub async fn open(config: OntologyConfig) -> Result<Self> {
        let backend = match config.backend {
            BackendConfig::Memory => MemoryBackend::new(),
        };
        Self::with_config(backend, config)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Kind of entity named in a `NotFound` error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Concept,
    Relationship,
    Category,
    Subcategory,
    SourceNode,
    TargetNode,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EntityKind::Concept => "Concept",
            EntityKind::Relationship => "Relationship",
            EntityKind::Category => "Category",
            EntityKind::Subcategory => "Subcategory",
            EntityKind::SourceNode => "Source node",
            EntityKind::TargetNode => "Target node",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation failed on '{field}': {message}")]
    ValidationFailed { field: String, message: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal inconsistency: {0}")]
    InternalInconsistency(String),

    #[error("Malformed path: {0}")]
    MalformedPath(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ValidationFailed { field: field.into(), message: message.into() }
    }

    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Error::NotFound { kind, id: id.into() }
    }

    /// The rejected field, for `ValidationFailed`.
    pub fn field(&self) -> Option<&str> {
        match self {
            Error::ValidationFailed { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Only store outages are worth retrying; the engine itself never does.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
