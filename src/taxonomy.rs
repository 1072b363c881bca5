//! # Taxonomy Store
//!
//! Category / Subcategory reference data. A Subcategory hangs off exactly
//! one Category through a HAS_SUBCATEGORY edge; this store is the only
//! writer of those edges, which is what keeps the parent unique.

use crate::model::concept::keys;
use crate::model::{
    labels, Category, Direction, NewCategory, NewSubcategory, Node, NodeId, PropertyMap, RelType,
    Subcategory, Value,
};
use crate::storage::{find_unique, StorageBackend};
use crate::tx::{in_tx, TxMode};
use crate::{EntityKind, Error, Result};

const FORMAL_DEFINITION: &str = "formal_definition";
const EXAMPLES: &str = "examples";

/// Taxonomy operations bound to a backend.
pub struct TaxonomyStore<'g, B: StorageBackend> {
    backend: &'g B,
}

impl<'g, B: StorageBackend> TaxonomyStore<'g, B> {
    pub fn new(backend: &'g B) -> Self {
        Self { backend }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// All Categories ordered by name, each with its Subcategories ordered by name.
    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        in_tx!(self.backend, TxMode::ReadOnly, |tx| self.list_in(&tx).await)
    }

    async fn list_in(&self, tx: &B::Tx) -> Result<Vec<Category>> {
        let mut out = Vec::new();
        for node in self.backend.nodes_by_label(tx, labels::CATEGORY).await? {
            out.push(self.category_from(tx, &node).await?);
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    /// Look up a Category by name. A Subcategory name resolves to its parent.
    pub async fn get_category(&self, name: &str) -> Result<Category> {
        in_tx!(self.backend, TxMode::ReadOnly, |tx| self.get_category_in(&tx, name).await)
    }

    async fn get_category_in(&self, tx: &B::Tx, name: &str) -> Result<Category> {
        if let Some(node) = find_unique(self.backend, tx, labels::CATEGORY, keys::NAME, name).await? {
            return self.category_from(tx, &node).await;
        }
        if let Some(sub) = find_unique(self.backend, tx, labels::SUBCATEGORY, keys::NAME, name).await? {
            if let Some(parent) = self.parent_of(tx, sub.id).await? {
                return self.category_from(tx, &parent).await;
            }
        }
        Err(Error::not_found(EntityKind::Category, name))
    }

    /// Look up a Subcategory by name, with its parent Category's name.
    pub async fn get_subcategory(&self, name: &str) -> Result<Subcategory> {
        in_tx!(self.backend, TxMode::ReadOnly, |tx| self.get_subcategory_in(&tx, name).await)
    }

    async fn get_subcategory_in(&self, tx: &B::Tx, name: &str) -> Result<Subcategory> {
        let node = self.require(tx, labels::SUBCATEGORY, name).await?;
        self.subcategory_from(tx, &node).await
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Create a Category. Fails with `Conflict` if the name is taken.
    pub async fn create_category(&self, category: NewCategory) -> Result<Category> {
        in_tx!(self.backend, TxMode::ReadWrite, |tx| self.create_category_in(&mut tx, &category).await)
    }

    async fn create_category_in(&self, tx: &mut B::Tx, category: &NewCategory) -> Result<Category> {
        if find_unique(self.backend, tx, labels::CATEGORY, keys::NAME, &category.name).await?.is_some() {
            return Err(Error::Conflict(format!("category '{}' already exists", category.name)));
        }
        let id = self.backend.create_node(tx, &[labels::CATEGORY], category_props(category)).await?;
        tracing::debug!(name = %category.name, "category created");
        let node = self.load(tx, id).await?;
        Category::from_node(&node, Vec::new())
    }

    /// Create a Subcategory under `parent`. Fails with `NotFound` if the
    /// parent does not exist and `Conflict` if the name is taken.
    pub async fn create_subcategory(&self, parent: &str, subcategory: NewSubcategory) -> Result<Subcategory> {
        in_tx!(self.backend, TxMode::ReadWrite, |tx| self
            .create_subcategory_in(&mut tx, parent, &subcategory)
            .await)
    }

    async fn create_subcategory_in(
        &self,
        tx: &mut B::Tx,
        parent: &str,
        subcategory: &NewSubcategory,
    ) -> Result<Subcategory> {
        let cat = self.require(tx, labels::CATEGORY, parent).await?;
        if find_unique(self.backend, tx, labels::SUBCATEGORY, keys::NAME, &subcategory.name).await?.is_some() {
            return Err(Error::Conflict(format!("subcategory '{}' already exists", subcategory.name)));
        }
        let id = self.insert_subcategory(tx, cat.id, subcategory).await?;
        tracing::debug!(name = %subcategory.name, parent, "subcategory created");
        let node = self.load(tx, id).await?;
        Subcategory::from_node(&node, Some(parent.to_owned()))
    }

    pub async fn update_category_description(&self, name: &str, description: &str) -> Result<Category> {
        in_tx!(self.backend, TxMode::ReadWrite, |tx| self
            .set_description(&mut tx, labels::CATEGORY, name, description)
            .await)?;
        self.get_category(name).await
    }

    pub async fn update_subcategory_description(&self, name: &str, description: &str) -> Result<Subcategory> {
        in_tx!(self.backend, TxMode::ReadWrite, |tx| self
            .set_description(&mut tx, labels::SUBCATEGORY, name, description)
            .await)?;
        self.get_subcategory(name).await
    }

    async fn set_description(&self, tx: &mut B::Tx, label: &str, name: &str, description: &str) -> Result<Node> {
        let node = self.require(tx, label, name).await?;
        let update = |current: &Node| -> Result<PropertyMap> {
            let mut props = current.properties.clone();
            props.insert("description".into(), Value::from(description));
            Ok(props)
        };
        let updated = self
            .backend
            .update_node(tx, node.id, &update)
            .await?
            .ok_or_else(|| Error::not_found(kind_of(label), name))?;
        tracing::debug!(label, name, "description updated");
        Ok(updated)
    }

    /// Delete a Category together with its Subcategories. Idempotent.
    pub async fn delete_category(&self, name: &str) -> Result<()> {
        in_tx!(self.backend, TxMode::ReadWrite, |tx| self.delete_category_in(&mut tx, name).await)
    }

    async fn delete_category_in(&self, tx: &mut B::Tx, name: &str) -> Result<()> {
        let Some(cat) = find_unique(self.backend, tx, labels::CATEGORY, keys::NAME, name).await? else {
            return Ok(());
        };
        let subs = self
            .backend
            .get_relationships(tx, cat.id, Direction::Outgoing, Some(RelType::HasSubcategory.as_str()))
            .await?;
        for sub in &subs {
            self.backend.detach_delete_node(tx, sub.dst).await?;
        }
        self.backend.detach_delete_node(tx, cat.id).await?;
        tracing::debug!(name, subcategories = subs.len(), "category deleted");
        Ok(())
    }

    /// Delete a Subcategory and its classification edges. Idempotent.
    pub async fn delete_subcategory(&self, name: &str) -> Result<()> {
        in_tx!(self.backend, TxMode::ReadWrite, |tx| self.delete_subcategory_in(&mut tx, name).await)
    }

    async fn delete_subcategory_in(&self, tx: &mut B::Tx, name: &str) -> Result<()> {
        if let Some(sub) = find_unique(self.backend, tx, labels::SUBCATEGORY, keys::NAME, name).await? {
            self.backend.detach_delete_node(tx, sub.id).await?;
            tracing::debug!(name, "subcategory deleted");
        }
        Ok(())
    }

    // ========================================================================
    // Upserts (bootstrap)
    // ========================================================================

    /// Insert the Category unless a Category of that name exists.
    /// Returns true when it was created.
    pub(crate) async fn upsert_category(&self, category: &NewCategory) -> Result<bool> {
        in_tx!(self.backend, TxMode::ReadWrite, |tx| self.upsert_category_in(&mut tx, category).await)
    }

    async fn upsert_category_in(&self, tx: &mut B::Tx, category: &NewCategory) -> Result<bool> {
        if find_unique(self.backend, tx, labels::CATEGORY, keys::NAME, &category.name).await?.is_some() {
            return Ok(false);
        }
        self.backend.create_node(tx, &[labels::CATEGORY], category_props(category)).await?;
        Ok(true)
    }

    /// Insert the Subcategory under `parent` unless it already exists there.
    /// An existing Subcategory under a different parent is a `Conflict`.
    pub(crate) async fn upsert_subcategory(&self, parent: &str, subcategory: &NewSubcategory) -> Result<bool> {
        in_tx!(self.backend, TxMode::ReadWrite, |tx| self
            .upsert_subcategory_in(&mut tx, parent, subcategory)
            .await)
    }

    async fn upsert_subcategory_in(
        &self,
        tx: &mut B::Tx,
        parent: &str,
        subcategory: &NewSubcategory,
    ) -> Result<bool> {
        let cat = self.require(tx, labels::CATEGORY, parent).await?;
        match find_unique(self.backend, tx, labels::SUBCATEGORY, keys::NAME, &subcategory.name).await? {
            Some(existing) => {
                let current = self.parent_of(tx, existing.id).await?;
                match current {
                    Some(p) if p.id == cat.id => Ok(false),
                    Some(p) => Err(Error::Conflict(format!(
                        "subcategory '{}' already belongs to '{}'",
                        subcategory.name,
                        p.display_name().unwrap_or_default()
                    ))),
                    None => {
                        self.backend
                            .create_relationship(tx, cat.id, existing.id, RelType::HasSubcategory.as_str(), PropertyMap::new())
                            .await?;
                        Ok(true)
                    }
                }
            }
            None => {
                self.insert_subcategory(tx, cat.id, subcategory).await?;
                Ok(true)
            }
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn insert_subcategory(&self, tx: &mut B::Tx, parent: NodeId, subcategory: &NewSubcategory) -> Result<NodeId> {
        let id = self
            .backend
            .create_node(tx, &[labels::SUBCATEGORY], subcategory_props(subcategory))
            .await?;
        self.backend
            .create_relationship(tx, parent, id, RelType::HasSubcategory.as_str(), PropertyMap::new())
            .await?;
        Ok(id)
    }

    async fn require(&self, tx: &B::Tx, label: &str, name: &str) -> Result<Node> {
        find_unique(self.backend, tx, label, keys::NAME, name)
            .await?
            .ok_or_else(|| Error::not_found(kind_of(label), name))
    }

    async fn load(&self, tx: &B::Tx, id: NodeId) -> Result<Node> {
        self.backend
            .get_node(tx, id)
            .await?
            .ok_or_else(|| Error::InternalInconsistency(format!("node {id} vanished after write")))
    }

    /// The single parent Category of a Subcategory node.
    async fn parent_of(&self, tx: &B::Tx, sub: NodeId) -> Result<Option<Node>> {
        let rels = self
            .backend
            .get_relationships(tx, sub, Direction::Incoming, Some(RelType::HasSubcategory.as_str()))
            .await?;
        match rels.as_slice() {
            [] => Ok(None),
            [rel] => self.backend.get_node(tx, rel.src).await,
            many => Err(Error::InternalInconsistency(format!(
                "subcategory node {sub} has {} parent categories",
                many.len()
            ))),
        }
    }

    async fn category_from(&self, tx: &B::Tx, node: &Node) -> Result<Category> {
        let name = node.display_name().unwrap_or_default().to_owned();
        let rels = self
            .backend
            .get_relationships(tx, node.id, Direction::Outgoing, Some(RelType::HasSubcategory.as_str()))
            .await?;
        let mut subs = Vec::with_capacity(rels.len());
        for rel in rels {
            if let Some(sub) = self.backend.get_node(tx, rel.dst).await? {
                subs.push(Subcategory::from_node(&sub, Some(name.clone()))?);
            }
        }
        subs.sort_by(|a, b| a.name.cmp(&b.name));
        Category::from_node(node, subs)
    }

    async fn subcategory_from(&self, tx: &B::Tx, node: &Node) -> Result<Subcategory> {
        let parent = self
            .parent_of(tx, node.id)
            .await?
            .and_then(|p| p.display_name().map(str::to_owned));
        Subcategory::from_node(node, parent)
    }
}

fn kind_of(label: &str) -> EntityKind {
    if label == labels::CATEGORY {
        EntityKind::Category
    } else {
        EntityKind::Subcategory
    }
}

fn category_props(category: &NewCategory) -> PropertyMap {
    let mut props = PropertyMap::new();
    props.insert(keys::NAME.into(), Value::from(category.name.as_str()));
    if let Some(description) = &category.description {
        props.insert(keys::DESCRIPTION.into(), Value::from(description.as_str()));
    }
    props
}

fn subcategory_props(subcategory: &NewSubcategory) -> PropertyMap {
    let mut props = PropertyMap::new();
    props.insert(keys::NAME.into(), Value::from(subcategory.name.as_str()));
    if let Some(description) = &subcategory.description {
        props.insert(keys::DESCRIPTION.into(), Value::from(description.as_str()));
    }
    if let Some(definition) = &subcategory.formal_definition {
        props.insert(FORMAL_DEFINITION.into(), Value::from(definition.as_str()));
    }
    props.insert(EXAMPLES.into(), Value::from(subcategory.examples.clone()));
    props
}
