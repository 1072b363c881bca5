//! Ontology configuration.
//!
//! All sections default sensibly, so an empty document (`{}`) is a valid
//! configuration.

use serde::{Deserialize, Serialize};

use crate::storage::BackendConfig;
use crate::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OntologyConfig {
    pub backend: BackendConfig,
    pub traversal: TraversalLimits,
    pub pagination: PageLimits,
    pub concepts: ConceptDefaults,
}

/// Bounds for path queries and neighbor lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalLimits {
    pub max_depth: usize,
    pub default_depth: usize,
    pub max_results: usize,
    pub default_results: usize,
}

impl Default for TraversalLimits {
    fn default() -> Self {
        Self {
            max_depth: 5,
            default_depth: 3,
            max_results: 50,
            default_results: 10,
        }
    }
}

impl TraversalLimits {
    /// Resolve a requested hop count, falling back to `default_depth`.
    pub fn resolve_depth(&self, depth: Option<usize>) -> Result<usize> {
        let depth = depth.unwrap_or(self.default_depth);
        if depth == 0 || depth > self.max_depth {
            return Err(Error::validation(
                "max_depth",
                format!("depth must be between 1 and {}, got {depth}", self.max_depth),
            ));
        }
        Ok(depth)
    }

    /// Resolve a requested result cap, falling back to `default_results`.
    pub fn resolve_results(&self, limit: Option<usize>) -> Result<usize> {
        resolve_limit(limit.unwrap_or(self.default_results), self.max_results)
    }
}

/// Bounds for paginated listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageLimits {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self { default_limit: 10, max_limit: 100 }
    }
}

impl PageLimits {
    /// Resolve a requested page size, falling back to `default_limit`.
    pub fn resolve(&self, limit: Option<usize>) -> Result<usize> {
        resolve_limit(limit.unwrap_or(self.default_limit), self.max_limit)
    }
}

fn resolve_limit(limit: usize, max: usize) -> Result<usize> {
    if limit == 0 || limit > max {
        return Err(Error::validation("limit", format!("limit must be between 1 and {max}, got {limit}")));
    }
    Ok(limit)
}

/// Values applied to new Concepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConceptDefaults {
    pub default_stability_status: String,
    pub default_confidence: f64,
    /// Reject a Concept whose name is already taken.
    pub unique_names: bool,
}

impl Default for ConceptDefaults {
    fn default() -> Self {
        Self {
            default_stability_status: "ephemeral".into(),
            default_confidence: 0.5,
            unique_names: false,
        }
    }
}

impl OntologyConfig {
    /// Parse configuration from a JSON document, then validate it.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: OntologyConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let t = &self.traversal;
        if t.max_depth == 0 || t.max_results == 0 {
            return Err(Error::Config("traversal.max_depth and traversal.max_results must be at least 1".into()));
        }
        if t.default_depth == 0 || t.default_depth > t.max_depth {
            return Err(Error::Config(format!(
                "traversal.default_depth must be in 1..={}", t.max_depth
            )));
        }
        if t.default_results == 0 || t.default_results > t.max_results {
            return Err(Error::Config(format!(
                "traversal.default_results must be in 1..={}", t.max_results
            )));
        }

        let p = &self.pagination;
        if p.max_limit == 0 || p.default_limit == 0 || p.default_limit > p.max_limit {
            return Err(Error::Config(format!(
                "pagination.default_limit must be in 1..={}", p.max_limit
            )));
        }

        let c = &self.concepts;
        if !(0.0..=1.0).contains(&c.default_confidence) {
            return Err(Error::Config("concepts.default_confidence must be within [0, 1]".into()));
        }
        if c.default_stability_status.trim().is_empty() {
            return Err(Error::Config("concepts.default_stability_status must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = OntologyConfig::from_json_str("{}").unwrap();
        assert_eq!(config, OntologyConfig::default());
        assert_eq!(config.traversal.max_depth, 5);
        assert_eq!(config.concepts.default_stability_status, "ephemeral");
    }

    #[test]
    fn test_partial_override() {
        let config = OntologyConfig::from_json_str(
            r#"{"traversal": {"max_depth": 3, "default_depth": 2}, "concepts": {"unique_names": true}}"#,
        )
        .unwrap();
        assert_eq!(config.traversal.max_depth, 3);
        assert_eq!(config.traversal.max_results, 50);
        assert!(config.concepts.unique_names);
        assert_eq!(config.backend, BackendConfig::Memory);
    }

    #[test]
    fn test_zero_depth_rejected() {
        let err = OntologyConfig::from_json_str(r#"{"traversal": {"max_depth": 0}}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_default_exceeding_max_rejected() {
        let err = OntologyConfig::from_json_str(r#"{"pagination": {"default_limit": 500}}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_resolve_limits() {
        let config = OntologyConfig::default();
        assert_eq!(config.traversal.resolve_depth(None).unwrap(), 3);
        assert_eq!(config.traversal.resolve_depth(Some(5)).unwrap(), 5);
        assert_eq!(config.traversal.resolve_depth(Some(0)).unwrap_err().field(), Some("max_depth"));
        assert_eq!(config.traversal.resolve_depth(Some(6)).unwrap_err().field(), Some("max_depth"));
        assert_eq!(config.traversal.resolve_results(Some(51)).unwrap_err().field(), Some("limit"));
        assert_eq!(config.pagination.resolve(None).unwrap(), 10);
        assert_eq!(config.pagination.resolve(Some(0)).unwrap_err().field(), Some("limit"));
    }

    #[test]
    fn test_bad_json_is_serialization_error() {
        let err = OntologyConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
