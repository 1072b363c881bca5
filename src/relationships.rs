//! # Relationship Store
//!
//! CRUD on typed edges between existing nodes.
//!
//! Endpoints are resolved by identity at write time: the source is always a
//! Concept (by `id`), the target is a Concept by `id` or, for
//! classification edges, a Subcategory by `name`.
//!
//! HAS_SUBCATEGORY edges are owned by the Taxonomy Store. This store never
//! creates, updates, deletes or lists them.

use chrono::Utc;

use crate::config::OntologyConfig;
use crate::model::concept::keys;
use crate::model::{labels, Node, NodeId, Page, PropertyMap, PropertyMapExt, RelId, RelType, Relationship, RelationshipRecord, Value};
use crate::storage::{find_unique, StorageBackend};
use crate::tx::{in_tx, TxMode};
use crate::validation::{check_immutable, check_store_type, check_subcategory_target, rel_keys, validate_relationship};
use crate::{EntityKind, Error, Result};

/// Confidence given to a relationship created without one.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

const SERVER_OWNED: [&str; 2] = [rel_keys::CREATED_AT, rel_keys::UPDATED_AT];

/// Relationship operations bound to a backend.
pub struct RelationshipStore<'g, B: StorageBackend> {
    backend: &'g B,
    config: &'g OntologyConfig,
}

impl<'g, B: StorageBackend> RelationshipStore<'g, B> {
    pub fn new(backend: &'g B, config: &'g OntologyConfig) -> Self {
        Self { backend, config }
    }

    /// Create a `rel_type` edge from `source_id` to `target_id`.
    ///
    /// Properties are validated for the type before either endpoint is
    /// resolved; a missing endpoint is reported as `SourceNode` or
    /// `TargetNode`.
    pub async fn create(
        &self,
        source_id: &str,
        target_id: &str,
        rel_type: &str,
        properties: impl Into<PropertyMap>,
    ) -> Result<RelationshipRecord> {
        let rel_type = RelType::parse(rel_type)?;
        check_store_type(&rel_type)?;
        let mut props: PropertyMap = properties.into();
        props.retain(|_, v| !v.is_null());
        check_immutable(&props, &SERVER_OWNED)?;
        props
            .entry(rel_keys::CONFIDENCE_SCORE.into())
            .or_insert(Value::Float(DEFAULT_CONFIDENCE));
        validate_relationship(&rel_type, &props)?;

        let now = Utc::now();
        props.insert(rel_keys::CREATED_AT.into(), Value::DateTime(now));
        props.insert(rel_keys::UPDATED_AT.into(), Value::DateTime(now));

        let record = in_tx!(self.backend, TxMode::ReadWrite, |tx| self
            .create_in(&mut tx, source_id, target_id, &rel_type, props)
            .await)?;
        tracing::debug!(
            id = %record.id,
            source = %record.source_id,
            target = %record.target_id,
            rel_type = %record.rel_type,
            "relationship created"
        );
        Ok(record)
    }

    async fn create_in(
        &self,
        tx: &mut B::Tx,
        source_id: &str,
        target_id: &str,
        rel_type: &RelType,
        props: PropertyMap,
    ) -> Result<RelationshipRecord> {
        let src = find_unique(self.backend, tx, labels::CONCEPT, keys::ID, source_id)
            .await?
            .ok_or_else(|| Error::not_found(EntityKind::SourceNode, source_id))?;
        let dst = self
            .resolve_target(tx, target_id, rel_type)
            .await?
            .ok_or_else(|| Error::not_found(EntityKind::TargetNode, target_id))?;

        let rel_id = self
            .backend
            .create_relationship(tx, src.id, dst.id, rel_type.as_str(), props)
            .await?;
        let rel = self
            .backend
            .get_relationship(tx, rel_id)
            .await?
            .ok_or_else(|| Error::InternalInconsistency(format!("created relationship {rel_id} vanished")))?;
        record_from(&rel, &src, &dst)
    }

    async fn resolve_target(&self, tx: &B::Tx, target_id: &str, rel_type: &RelType) -> Result<Option<Node>> {
        if let Some(node) = find_unique(self.backend, tx, labels::CONCEPT, keys::ID, target_id).await? {
            return Ok(Some(node));
        }
        let sub = find_unique(self.backend, tx, labels::SUBCATEGORY, keys::NAME, target_id).await?;
        if sub.is_some() {
            check_subcategory_target(rel_type)?;
        }
        Ok(sub)
    }

    /// Get a relationship by id.
    pub async fn get(&self, id: RelId) -> Result<RelationshipRecord> {
        in_tx!(self.backend, TxMode::ReadOnly, |tx| self.get_in(&tx, id).await)
    }

    async fn get_in(&self, tx: &B::Tx, id: RelId) -> Result<RelationshipRecord> {
        let rel = self.require(tx, id).await?;
        self.record(tx, &rel).await
    }

    /// Merge `delta` into a relationship's properties and bump `updated_at`.
    ///
    /// The merged property set is validated inside the backend's atomic
    /// update: a rejected merge leaves the stored edge untouched.
    pub async fn update(&self, id: RelId, delta: impl Into<PropertyMap>) -> Result<RelationshipRecord> {
        let delta: PropertyMap = delta.into();
        check_immutable(&delta, &SERVER_OWNED)?;

        let record = in_tx!(self.backend, TxMode::ReadWrite, |tx| self.update_in(&mut tx, id, &delta).await)?;
        tracing::debug!(id = %record.id, keys = delta.len(), "relationship updated");
        Ok(record)
    }

    async fn update_in(&self, tx: &mut B::Tx, id: RelId, delta: &PropertyMap) -> Result<RelationshipRecord> {
        let current = self.require(tx, id).await?;
        check_store_type(&RelType::parse(&current.rel_type)?)?;

        let now = Utc::now();
        let merge = move |current: &Relationship| -> Result<PropertyMap> {
            let rel_type = RelType::parse(&current.rel_type)?;
            let mut merged = current.properties.clone();
            merged.merge_delta(delta);
            merged.insert(rel_keys::UPDATED_AT.into(), Value::DateTime(now));
            validate_relationship(&rel_type, &merged)?;
            Ok(merged)
        };
        let rel = self
            .backend
            .update_relationship(tx, id, &merge)
            .await?
            .ok_or_else(|| Error::not_found(EntityKind::Relationship, id.to_string()))?;
        self.record(tx, &rel).await
    }

    /// Delete a relationship. Deleting an unknown id is not an error.
    pub async fn delete(&self, id: RelId) -> Result<()> {
        let deleted = in_tx!(self.backend, TxMode::ReadWrite, |tx| self.delete_in(&mut tx, id).await)?;
        tracing::debug!(id = %id, deleted, "relationship delete");
        Ok(())
    }

    async fn delete_in(&self, tx: &mut B::Tx, id: RelId) -> Result<bool> {
        let Some(rel) = self.lookup(tx, id).await? else {
            return Ok(false);
        };
        check_store_type(&RelType::parse(&rel.rel_type)?)?;
        self.backend.delete_relationship(tx, id).await
    }

    /// Relationships, optionally of one type, newest first.
    pub async fn list(
        &self,
        rel_type: Option<&str>,
        skip: usize,
        limit: impl Into<Option<usize>>,
    ) -> Result<Page<RelationshipRecord>> {
        let limit = self.config.pagination.resolve(limit.into())?;
        let rel_type = rel_type.map(RelType::parse).transpose()?;
        if let Some(rel_type) = &rel_type {
            check_store_type(rel_type)?;
        }
        in_tx!(self.backend, TxMode::ReadOnly, |tx| self
            .list_in(&tx, rel_type.as_ref(), skip, limit)
            .await)
    }

    async fn list_in(
        &self,
        tx: &B::Tx,
        rel_type: Option<&RelType>,
        skip: usize,
        limit: usize,
    ) -> Result<Page<RelationshipRecord>> {
        let mut rels = self
            .backend
            .relationships_by_type(tx, rel_type.map(RelType::as_str))
            .await?;
        rels.retain(|r| r.rel_type != RelType::HasSubcategory.as_str());
        rels.sort_by(|a, b| {
            let created = |r: &Relationship| r.properties.get(rel_keys::CREATED_AT).and_then(Value::as_datetime);
            created(b).cmp(&created(a)).then_with(|| b.id.cmp(&a.id))
        });

        let page = Page::from_sorted(rels, skip, limit);
        let mut items = Vec::with_capacity(page.items.len());
        for rel in &page.items {
            items.push(self.record(tx, rel).await?);
        }
        Ok(Page { items, total: page.total, skip, limit })
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn require(&self, tx: &B::Tx, id: RelId) -> Result<Relationship> {
        self.lookup(tx, id)
            .await?
            .ok_or_else(|| Error::not_found(EntityKind::Relationship, id.to_string()))
    }

    /// At most one relationship may carry an id; more is an inconsistency.
    async fn lookup(&self, tx: &B::Tx, id: RelId) -> Result<Option<Relationship>> {
        let mut found = self.backend.match_relationship(tx, id).await?;
        match found.len() {
            0 | 1 => Ok(found.pop()),
            n => Err(Error::InternalInconsistency(format!("{n} relationships share id {id}"))),
        }
    }

    async fn record(&self, tx: &B::Tx, rel: &Relationship) -> Result<RelationshipRecord> {
        let src = self.endpoint(tx, rel, rel.src, "source").await?;
        let dst = self.endpoint(tx, rel, rel.dst, "target").await?;
        record_from(rel, &src, &dst)
    }

    async fn endpoint(&self, tx: &B::Tx, rel: &Relationship, id: NodeId, end: &str) -> Result<Node> {
        self.backend.get_node(tx, id).await?.ok_or_else(|| {
            Error::InternalInconsistency(format!("relationship {} points at missing {end} node {id}", rel.id))
        })
    }
}

pub(crate) fn record_from(rel: &Relationship, src: &Node, dst: &Node) -> Result<RelationshipRecord> {
    let identity = |node: &Node| {
        node.identity()
            .map(str::to_owned)
            .ok_or_else(|| Error::InternalInconsistency(format!("node {} has no identity", node.id)))
    };
    Ok(RelationshipRecord {
        id: rel.id,
        source_id: identity(src)?,
        source_name: src.display_name().map(str::to_owned),
        target_id: identity(dst)?,
        target_name: dst.display_name().map(str::to_owned),
        rel_type: RelType::parse(&rel.rel_type)?,
        properties: rel.properties.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concepts::ConceptStore;
    use crate::model::{props, Direction, NewConcept, RawPath};
    use crate::storage::memory::MemoryTx;
    use crate::storage::{Constraint, ConstraintType, ExpandDepth, MemoryBackend, NodeUpdate, RelationshipUpdate};

    #[tokio::test]
    async fn test_type_is_normalized_and_confidence_defaulted() {
        let backend = MemoryBackend::new();
        let config = OntologyConfig::default();
        let concepts = ConceptStore::new(&backend, &config);
        let rels = RelationshipStore::new(&backend, &config);

        let a = concepts.create(NewConcept::new("Lightning")).await.unwrap();
        let b = concepts.create(NewConcept::new("Thunder")).await.unwrap();
        let rec = rels.create(&a.id, &b.id, "precedes", PropertyMap::new()).await.unwrap();

        assert_eq!(rec.rel_type, RelType::Precedes);
        assert_eq!(rec.source_name.as_deref(), Some("Lightning"));
        assert_eq!(rec.target_id, b.id);
        assert_eq!(rec.get("confidence_score"), Some(&Value::Float(DEFAULT_CONFIDENCE)));
        assert!(rec.get("created_at").is_some());
    }

    #[tokio::test]
    async fn test_update_cannot_touch_created_at() {
        let backend = MemoryBackend::new();
        let config = OntologyConfig::default();
        let concepts = ConceptStore::new(&backend, &config);
        let rels = RelationshipStore::new(&backend, &config);

        let a = concepts.create(NewConcept::new("A")).await.unwrap();
        let b = concepts.create(NewConcept::new("B")).await.unwrap();
        let rec = rels.create(&a.id, &b.id, "CAUSES", PropertyMap::new()).await.unwrap();

        let err = rels
            .update(rec.id, props([("created_at", "2000-01-01T00:00:00Z")]))
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("created_at"));
    }

    #[tokio::test]
    async fn test_delete_unknown_is_ok() {
        let backend = MemoryBackend::new();
        let config = OntologyConfig::default();
        let rels = RelationshipStore::new(&backend, &config);
        rels.delete(RelId(77)).await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_identity_is_inconsistent() {
        let backend = Duplicating(MemoryBackend::new());
        let config = OntologyConfig::default();
        let concepts = ConceptStore::new(&backend, &config);
        let rels = RelationshipStore::new(&backend, &config);

        let a = concepts.create(NewConcept::new("A")).await.unwrap();
        let b = concepts.create(NewConcept::new("B")).await.unwrap();
        let rec = rels.create(&a.id, &b.id, "CAUSES", PropertyMap::new()).await.unwrap();

        assert!(matches!(rels.get(rec.id).await, Err(Error::InternalInconsistency(_))));
        assert!(matches!(
            rels.update(rec.id, props([("confidence_score", 0.9)])).await,
            Err(Error::InternalInconsistency(_))
        ));
        assert!(matches!(rels.delete(rec.id).await, Err(Error::InternalInconsistency(_))));
    }

    /// Memory backend whose identity lookup reports every relationship twice.
    struct Duplicating(MemoryBackend);

    #[async_trait::async_trait]
    impl StorageBackend for Duplicating {
        type Tx = MemoryTx;

        async fn shutdown(&self) -> Result<()> {
            self.0.shutdown().await
        }
        async fn begin_tx(&self, mode: TxMode) -> Result<MemoryTx> {
            self.0.begin_tx(mode).await
        }
        async fn commit_tx(&self, tx: MemoryTx) -> Result<()> {
            self.0.commit_tx(tx).await
        }
        async fn rollback_tx(&self, tx: MemoryTx) -> Result<()> {
            self.0.rollback_tx(tx).await
        }
        async fn create_node(&self, tx: &mut MemoryTx, labels: &[&str], props: PropertyMap) -> Result<NodeId> {
            self.0.create_node(tx, labels, props).await
        }
        async fn get_node(&self, tx: &MemoryTx, id: NodeId) -> Result<Option<Node>> {
            self.0.get_node(tx, id).await
        }
        async fn update_node(&self, tx: &mut MemoryTx, id: NodeId, update: NodeUpdate<'_>) -> Result<Option<Node>> {
            self.0.update_node(tx, id, update).await
        }
        async fn detach_delete_node(&self, tx: &mut MemoryTx, id: NodeId) -> Result<bool> {
            self.0.detach_delete_node(tx, id).await
        }
        async fn create_relationship(
            &self,
            tx: &mut MemoryTx,
            src: NodeId,
            dst: NodeId,
            rel_type: &str,
            props: PropertyMap,
        ) -> Result<RelId> {
            self.0.create_relationship(tx, src, dst, rel_type, props).await
        }
        async fn get_relationship(&self, tx: &MemoryTx, id: RelId) -> Result<Option<Relationship>> {
            self.0.get_relationship(tx, id).await
        }
        async fn match_relationship(&self, tx: &MemoryTx, id: RelId) -> Result<Vec<Relationship>> {
            let found = self.0.match_relationship(tx, id).await?;
            Ok(found.iter().chain(found.iter()).cloned().collect())
        }
        async fn update_relationship(
            &self,
            tx: &mut MemoryTx,
            id: RelId,
            update: RelationshipUpdate<'_>,
        ) -> Result<Option<Relationship>> {
            self.0.update_relationship(tx, id, update).await
        }
        async fn delete_relationship(&self, tx: &mut MemoryTx, id: RelId) -> Result<bool> {
            self.0.delete_relationship(tx, id).await
        }
        async fn get_relationships(
            &self,
            tx: &MemoryTx,
            node: NodeId,
            dir: Direction,
            rel_type: Option<&str>,
        ) -> Result<Vec<Relationship>> {
            self.0.get_relationships(tx, node, dir, rel_type).await
        }
        async fn expand(
            &self,
            tx: &MemoryTx,
            node: NodeId,
            dir: Direction,
            rel_types: &[&str],
            node_label: Option<&str>,
            depth: ExpandDepth,
            limit: usize,
        ) -> Result<Vec<RawPath>> {
            self.0.expand(tx, node, dir, rel_types, node_label, depth, limit).await
        }
        async fn nodes_by_label(&self, tx: &MemoryTx, label: &str) -> Result<Vec<Node>> {
            self.0.nodes_by_label(tx, label).await
        }
        async fn nodes_by_property(&self, tx: &MemoryTx, label: &str, key: &str, value: &Value) -> Result<Vec<Node>> {
            self.0.nodes_by_property(tx, label, key, value).await
        }
        async fn relationships_by_type(&self, tx: &MemoryTx, rel_type: Option<&str>) -> Result<Vec<Relationship>> {
            self.0.relationships_by_type(tx, rel_type).await
        }
        async fn node_count(&self, tx: &MemoryTx) -> Result<u64> {
            self.0.node_count(tx).await
        }
        async fn relationship_count(&self, tx: &MemoryTx) -> Result<u64> {
            self.0.relationship_count(tx).await
        }
        async fn create_constraint(&self, label: &str, property: &str, constraint_type: ConstraintType) -> Result<bool> {
            self.0.create_constraint(label, property, constraint_type).await
        }
        async fn constraints(&self) -> Result<Vec<Constraint>> {
            self.0.constraints().await
        }
    }

    #[tokio::test]
    async fn test_invalid_type_name() {
        let backend = MemoryBackend::new();
        let config = OntologyConfig::default();
        let rels = RelationshipStore::new(&backend, &config);
        let err = rels.create("a", "b", "NOT A TYPE", PropertyMap::new()).await.unwrap_err();
        assert_eq!(err.field(), Some("type"));
    }
}
