//! Category / Subcategory reference data.

use serde::{Deserialize, Serialize};

use super::{Node, Value};
use crate::{Error, Result};

/// A top-level category with its subcategories, ordered by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub subcategories: Vec<Subcategory>,
}

/// A subcategory. `category` is the name of its single parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subcategory {
    pub name: String,
    pub description: Option<String>,
    pub formal_definition: Option<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    pub category: Option<String>,
}

fn required_name(node: &Node, kind: &str) -> Result<String> {
    node.display_name()
        .map(str::to_owned)
        .ok_or_else(|| Error::InternalInconsistency(format!("{kind} node {} has no name", node.id)))
}

fn text(node: &Node, key: &str) -> Option<String> {
    node.get(key).and_then(Value::as_str).map(str::to_owned)
}

impl Category {
    pub fn from_node(node: &Node, subcategories: Vec<Subcategory>) -> Result<Self> {
        Ok(Self {
            name: required_name(node, "category")?,
            description: text(node, "description"),
            subcategories,
        })
    }
}

impl Subcategory {
    pub fn from_node(node: &Node, category: Option<String>) -> Result<Self> {
        Ok(Self {
            name: required_name(node, "subcategory")?,
            description: text(node, "description"),
            formal_definition: text(node, "formal_definition"),
            examples: node.get("examples").and_then(Value::as_string_list).unwrap_or_default(),
            category,
        })
    }
}

/// Input for creating a Category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub description: Option<String>,
}

impl NewCategory {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), description: None }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Input for creating a Subcategory under a parent Category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewSubcategory {
    pub name: String,
    pub description: Option<String>,
    pub formal_definition: Option<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

impl NewSubcategory {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn formal_definition(mut self, definition: impl Into<String>) -> Self {
        self.formal_definition = Some(definition.into());
        self
    }

    pub fn examples(mut self, examples: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.examples = examples.into_iter().map(Into::into).collect();
        self
    }
}
