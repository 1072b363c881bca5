//! # Concept Store
//!
//! CRUD on Concept nodes, plus the classification listings.
//!
//! Every write is validated before it reaches the backend, and runs in a
//! single read-write transaction. Updates validate the merged record inside
//! the backend's atomic update, so a rejected update changes nothing.

use chrono::Utc;
use uuid::Uuid;

use crate::config::OntologyConfig;
use crate::model::concept::keys;
use crate::model::{
    labels, Concept, Direction, Modality, Node, NodeId, Page, PropertyMap, PropertyMapExt, Quality,
    RelType, RelationshipRecord, Value,
};
use crate::relationships::RelationshipStore;
use crate::storage::{find_unique, StorageBackend};
use crate::tx::{in_tx, TxMode};
use crate::validation::{check_immutable, validate_concept, validate_new_concept};
use crate::{EntityKind, Error, Result};

/// Keys the server owns on every Concept.
const SERVER_OWNED: [&str; 3] = [keys::ID, keys::CREATED_AT, keys::UPDATED_AT];

/// Concept operations bound to a backend.
pub struct ConceptStore<'g, B: StorageBackend> {
    backend: &'g B,
    config: &'g OntologyConfig,
}

impl<'g, B: StorageBackend> ConceptStore<'g, B> {
    pub fn new(backend: &'g B, config: &'g OntologyConfig) -> Self {
        Self { backend, config }
    }

    // ========================================================================
    // CRUD
    // ========================================================================

    /// Validate, stamp `id`/timestamps, apply defaults, and persist.
    pub async fn create(&self, attrs: impl Into<PropertyMap>) -> Result<Concept> {
        let mut attrs: PropertyMap = attrs.into();
        attrs.retain(|_, v| !v.is_null());
        check_immutable(&attrs, &SERVER_OWNED)?;
        validate_new_concept(&attrs)?;

        let defaults = &self.config.concepts;
        attrs
            .entry(keys::STABILITY_STATUS.into())
            .or_insert_with(|| Value::from(defaults.default_stability_status.as_str()));
        attrs
            .entry(keys::CONFIDENCE_SCORE.into())
            .or_insert(Value::Float(defaults.default_confidence));

        let now = Utc::now();
        attrs.insert(keys::ID.into(), Value::String(Uuid::new_v4().to_string()));
        attrs.insert(keys::CREATED_AT.into(), Value::DateTime(now));
        attrs.insert(keys::UPDATED_AT.into(), Value::DateTime(now));

        let concept = in_tx!(self.backend, TxMode::ReadWrite, |tx| self.create_in(&mut tx, attrs).await)?;
        tracing::debug!(id = %concept.id, name = %concept.name, "concept created");
        Ok(concept)
    }

    async fn create_in(&self, tx: &mut B::Tx, attrs: PropertyMap) -> Result<Concept> {
        if let Some(name) = attrs.get_str(keys::NAME) {
            self.ensure_name_free(tx, name, None).await?;
        }
        let node_id = self.backend.create_node(tx, &[labels::CONCEPT], attrs).await?;
        let node = self
            .backend
            .get_node(tx, node_id)
            .await?
            .ok_or_else(|| Error::InternalInconsistency(format!("created concept node {node_id} vanished")))?;
        Concept::from_node(&node)
    }

    /// Get a Concept by id.
    pub async fn get(&self, id: &str) -> Result<Concept> {
        in_tx!(self.backend, TxMode::ReadOnly, |tx| self.require(&tx, id).await)
            .and_then(|node| Concept::from_node(&node))
    }

    /// Merge `delta` into an existing Concept and bump `updated_at`.
    ///
    /// NULL values in the delta remove the attribute. The delta is checked
    /// on its own first (so the reported field is the one the caller sent),
    /// then the merged record is checked before commit.
    pub async fn update(&self, id: &str, delta: impl Into<PropertyMap>) -> Result<Concept> {
        let delta: PropertyMap = delta.into();
        check_immutable(&delta, &SERVER_OWNED)?;
        validate_concept(&delta)?;

        let concept = in_tx!(self.backend, TxMode::ReadWrite, |tx| self.update_in(&mut tx, id, &delta).await)?;
        tracing::debug!(id = %concept.id, keys = delta.len(), "concept updated");
        Ok(concept)
    }

    async fn update_in(&self, tx: &mut B::Tx, id: &str, delta: &PropertyMap) -> Result<Concept> {
        let node = self.require(tx, id).await?;
        if let Some(name) = delta.get_str(keys::NAME) {
            self.ensure_name_free(tx, name, Some(node.id)).await?;
        }

        let now = Utc::now();
        let merge = move |current: &Node| -> Result<PropertyMap> {
            let mut merged = current.properties.clone();
            merged.merge_delta(delta);
            merged.insert(keys::UPDATED_AT.into(), Value::DateTime(now));
            validate_new_concept(&merged)?;
            Ok(merged)
        };
        let updated = self
            .backend
            .update_node(tx, node.id, &merge)
            .await?
            .ok_or_else(|| Error::not_found(EntityKind::Concept, id))?;
        Concept::from_node(&updated)
    }

    /// Delete a Concept and every relationship touching it.
    /// Deleting an unknown id is not an error.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let deleted = in_tx!(self.backend, TxMode::ReadWrite, |tx| self.delete_in(&mut tx, id).await)?;
        tracing::debug!(id, deleted, "concept delete");
        Ok(())
    }

    async fn delete_in(&self, tx: &mut B::Tx, id: &str) -> Result<bool> {
        match find_unique(self.backend, tx, labels::CONCEPT, keys::ID, id).await? {
            Some(node) => self.backend.detach_delete_node(tx, node.id).await,
            None => Ok(false),
        }
    }

    // ========================================================================
    // Listings
    // ========================================================================

    /// All Concepts ordered by name.
    pub async fn list(&self, skip: usize, limit: impl Into<Option<usize>>) -> Result<Page<Concept>> {
        let limit = self.config.pagination.resolve(limit.into())?;
        let nodes = in_tx!(self.backend, TxMode::ReadOnly, |tx| self
            .backend
            .nodes_by_label(&tx, labels::CONCEPT)
            .await)?;
        Ok(Page::from_sorted(by_name(nodes)?, skip, limit))
    }

    /// Concepts classified (INSTANCE_OF) under any Subcategory of `category`.
    pub async fn list_by_category(
        &self,
        category: &str,
        skip: usize,
        limit: impl Into<Option<usize>>,
    ) -> Result<Page<Concept>> {
        let limit = self.config.pagination.resolve(limit.into())?;
        let nodes = in_tx!(self.backend, TxMode::ReadOnly, |tx| self.instances_of_category(&tx, category).await)?;
        Ok(Page::from_sorted(by_name(nodes)?, skip, limit))
    }

    async fn instances_of_category(&self, tx: &B::Tx, category: &str) -> Result<Vec<Node>> {
        let cat = find_unique(self.backend, tx, labels::CATEGORY, keys::NAME, category)
            .await?
            .ok_or_else(|| Error::not_found(EntityKind::Category, category))?;
        let subs = self
            .backend
            .get_relationships(tx, cat.id, Direction::Outgoing, Some(RelType::HasSubcategory.as_str()))
            .await?;

        let mut seen = hashbrown::HashSet::new();
        let mut out = Vec::new();
        for sub in subs {
            for node in self.instances_of(tx, sub.dst).await? {
                if seen.insert(node.id) {
                    out.push(node);
                }
            }
        }
        Ok(out)
    }

    /// Concepts classified (INSTANCE_OF) under `subcategory`.
    pub async fn list_by_subcategory(
        &self,
        subcategory: &str,
        skip: usize,
        limit: impl Into<Option<usize>>,
    ) -> Result<Page<Concept>> {
        let limit = self.config.pagination.resolve(limit.into())?;
        let nodes = in_tx!(self.backend, TxMode::ReadOnly, |tx| self.instances_of_subcategory(&tx, subcategory).await)?;
        Ok(Page::from_sorted(by_name(nodes)?, skip, limit))
    }

    async fn instances_of_subcategory(&self, tx: &B::Tx, subcategory: &str) -> Result<Vec<Node>> {
        let sub = find_unique(self.backend, tx, labels::SUBCATEGORY, keys::NAME, subcategory)
            .await?
            .ok_or_else(|| Error::not_found(EntityKind::Subcategory, subcategory))?;
        self.instances_of(tx, sub.id).await
    }

    async fn instances_of(&self, tx: &B::Tx, subcategory: NodeId) -> Result<Vec<Node>> {
        let rels = self
            .backend
            .get_relationships(tx, subcategory, Direction::Incoming, Some(RelType::InstanceOf.as_str()))
            .await?;
        let mut out = Vec::with_capacity(rels.len());
        for rel in rels {
            if let Some(node) = self.backend.get_node(tx, rel.src).await? {
                if node.has_label(labels::CONCEPT) {
                    out.push(node);
                }
            }
        }
        Ok(out)
    }

    /// Concepts with the given quality, ordered by name.
    pub async fn list_by_quality(
        &self,
        quality: Quality,
        skip: usize,
        limit: impl Into<Option<usize>>,
    ) -> Result<Page<Concept>> {
        self.list_where(keys::QUALITY, quality.as_str(), skip, limit.into()).await
    }

    /// Concepts with the given modality, ordered by name.
    pub async fn list_by_modality(
        &self,
        modality: Modality,
        skip: usize,
        limit: impl Into<Option<usize>>,
    ) -> Result<Page<Concept>> {
        self.list_where(keys::MODALITY, modality.as_str(), skip, limit.into()).await
    }

    async fn list_where(&self, key: &str, value: &str, skip: usize, limit: Option<usize>) -> Result<Page<Concept>> {
        let limit = self.config.pagination.resolve(limit)?;
        let value = Value::from(value);
        let nodes = in_tx!(self.backend, TxMode::ReadOnly, |tx| self
            .backend
            .nodes_by_property(&tx, labels::CONCEPT, key, &value)
            .await)?;
        Ok(Page::from_sorted(by_name(nodes)?, skip, limit))
    }

    /// Concepts with `confidence_score >= threshold`, most confident first.
    pub async fn list_by_confidence(&self, threshold: f64, limit: impl Into<Option<usize>>) -> Result<Vec<Concept>> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::validation("threshold", format!("threshold must be in [0, 1], got {threshold}")));
        }
        let limit = self.config.pagination.resolve(limit.into())?;
        let nodes = in_tx!(self.backend, TxMode::ReadOnly, |tx| self
            .backend
            .nodes_by_label(&tx, labels::CONCEPT)
            .await)?;

        let mut concepts: Vec<Concept> = nodes
            .iter()
            .map(Concept::from_node)
            .filter(|c| c.as_ref().map_or(true, |c| c.confidence_score >= threshold))
            .collect::<Result<_>>()?;
        concepts.sort_by(|a, b| {
            b.confidence_score
                .total_cmp(&a.confidence_score)
                .then_with(|| a.name.cmp(&b.name))
        });
        concepts.truncate(limit);
        Ok(concepts)
    }

    // ========================================================================
    // Classification
    // ========================================================================

    /// Classify a Concept under a Subcategory (an INSTANCE_OF edge).
    pub async fn classify(&self, concept_id: &str, subcategory: &str) -> Result<RelationshipRecord> {
        RelationshipStore::new(self.backend, self.config)
            .create(concept_id, subcategory, RelType::InstanceOf.as_str(), PropertyMap::new())
            .await
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn require(&self, tx: &B::Tx, id: &str) -> Result<Node> {
        find_unique(self.backend, tx, labels::CONCEPT, keys::ID, id)
            .await?
            .ok_or_else(|| Error::not_found(EntityKind::Concept, id))
    }

    async fn ensure_name_free(&self, tx: &B::Tx, name: &str, owner: Option<NodeId>) -> Result<()> {
        if !self.config.concepts.unique_names {
            return Ok(());
        }
        let taken = self
            .backend
            .nodes_by_property(tx, labels::CONCEPT, keys::NAME, &Value::from(name))
            .await?
            .iter()
            .any(|n| Some(n.id) != owner);
        if taken {
            tracing::warn!(name, "concept name already taken");
            return Err(Error::Conflict(format!("a concept named '{name}' already exists")));
        }
        Ok(())
    }
}

fn by_name(nodes: Vec<Node>) -> Result<Vec<Concept>> {
    let mut concepts = nodes.iter().map(Concept::from_node).collect::<Result<Vec<_>>>()?;
    concepts.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    Ok(concepts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{props, NewConcept};
    use crate::storage::MemoryBackend;

    fn store_parts() -> (MemoryBackend, OntologyConfig) {
        (MemoryBackend::new(), OntologyConfig::default())
    }

    #[tokio::test]
    async fn test_create_applies_defaults() {
        let (backend, config) = store_parts();
        let store = ConceptStore::new(&backend, &config);

        let heat = store.create(NewConcept::new("Heat")).await.unwrap();
        assert_eq!(heat.stability_status, "ephemeral");
        assert_eq!(heat.confidence_score, 0.5);
        assert!(heat.created_at.is_some());
        assert_eq!(heat.created_at, heat.updated_at);
        assert!(Uuid::parse_str(&heat.id).is_ok());
    }

    #[tokio::test]
    async fn test_create_rejects_client_id() {
        let (backend, config) = store_parts();
        let store = ConceptStore::new(&backend, &config);
        let err = store.create(NewConcept::new("Heat").attr("id", "mine")).await.unwrap_err();
        assert_eq!(err.field(), Some("id"));
    }

    #[tokio::test]
    async fn test_invalid_create_writes_nothing() {
        let (backend, config) = store_parts();
        let store = ConceptStore::new(&backend, &config);
        let err = store.create(props([("name", "Heat"), ("quality", "Warmth")])).await.unwrap_err();
        assert_eq!(err.field(), Some("quality"));

        let tx = backend.begin_tx(TxMode::ReadOnly).await.unwrap();
        assert_eq!(backend.node_count(&tx).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_removing_name_is_rejected() {
        let (backend, config) = store_parts();
        let store = ConceptStore::new(&backend, &config);
        let heat = store.create(NewConcept::new("Heat")).await.unwrap();

        let err = store.update(&heat.id, props([("name", Value::Null)])).await.unwrap_err();
        assert_eq!(err.field(), Some("name"));
        assert_eq!(store.get(&heat.id).await.unwrap().name, "Heat");
    }

    #[tokio::test]
    async fn test_unique_names_when_enabled() {
        let backend = MemoryBackend::new();
        let mut config = OntologyConfig::default();
        config.concepts.unique_names = true;
        let store = ConceptStore::new(&backend, &config);

        let heat = store.create(NewConcept::new("Heat")).await.unwrap();
        assert!(matches!(store.create(NewConcept::new("Heat")).await, Err(Error::Conflict(_))));
        // Renaming to its own name is fine
        assert!(store.update(&heat.id, props([("name", "Heat")])).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_by_confidence_orders_descending() {
        let (backend, config) = store_parts();
        let store = ConceptStore::new(&backend, &config);
        for (name, score) in [("Low", 0.2), ("High", 0.9), ("Mid", 0.6)] {
            store.create(NewConcept::new(name).confidence(score)).await.unwrap();
        }

        let names: Vec<String> = store
            .list_by_confidence(0.5, None)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["High", "Mid"]);
        assert_eq!(store.list_by_confidence(1.5, None).await.unwrap_err().field(), Some("threshold"));
    }
}
