//! End-to-end tests for bootstrap: constraints, taxonomy and sample data.

use kantian_graph::storage::Constraint;
use kantian_graph::{
    BootstrapReport, ConstraintType, NewConcept, Ontology, OntologyConfig, RelType, SeedOptions, StorageBackend,
};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_fresh_bootstrap_report() {
    let onto = Ontology::open_memory().await.unwrap();
    let report = onto.bootstrap(SeedOptions::default()).await.unwrap();

    assert_eq!(
        report,
        BootstrapReport {
            constraints_created: 3,
            categories_created: 4,
            subcategories_created: 12,
            concepts_created: 0,
            relationships_created: 0,
        }
    );

    let mut constraints = onto.backend().constraints().await.unwrap();
    constraints.sort_by(|a, b| (&a.label, &a.property).cmp(&(&b.label, &b.property)));
    let expected = [("Category", "name"), ("Concept", "id"), ("Subcategory", "name")]
        .map(|(label, property)| Constraint {
            label: label.into(),
            property: property.into(),
            kind: ConstraintType::Unique,
        })
        .to_vec();
    assert_eq!(constraints, expected);
}

#[tokio::test]
async fn test_rerun_is_noop() {
    let onto = Ontology::open_memory().await.unwrap();
    onto.bootstrap(SeedOptions::with_samples()).await.unwrap();

    let again = onto.bootstrap(SeedOptions::with_samples()).await.unwrap();
    assert!(again.is_noop(), "{again:?}");
}

#[tokio::test]
async fn test_sample_graph_is_traversable() {
    let onto = Ontology::open_memory().await.unwrap();
    let report = onto.bootstrap(SeedOptions::with_samples()).await.unwrap();
    assert_eq!(report.concepts_created, 17);
    assert_eq!(report.relationships_created, 21);

    let heat = onto
        .concepts()
        .list(0, 100)
        .await
        .unwrap()
        .items
        .into_iter()
        .find(|c| c.name == "Heat")
        .unwrap();
    let paths = onto.traversal().causal_chain(&heat.id, 1, None).await.unwrap();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].node_names(), vec!["Heat", "Expansion"]);
    assert_eq!(paths[0].edges[0].rel_type, RelType::Causes);

    let causal = onto.concepts().list_by_subcategory("Causality", 0, None).await.unwrap();
    let names: Vec<_> = causal.items.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Expansion", "Heat", "Lightning", "Thunder"]);
}

#[tokio::test]
async fn test_unique_names_adds_constraint() {
    let mut config = OntologyConfig::default();
    config.concepts.unique_names = true;
    let onto = Ontology::open(config).await.unwrap();

    let report = onto.bootstrap(SeedOptions::default()).await.unwrap();
    assert_eq!(report.constraints_created, 4);

    onto.concepts().create(NewConcept::new("Heat")).await.unwrap();
    assert!(onto.concepts().create(NewConcept::new("Heat")).await.is_err());
}

#[tokio::test]
async fn test_user_concepts_sharing_sample_names() {
    let onto = Ontology::open_memory().await.unwrap();
    onto.concepts().create(NewConcept::new("Heat")).await.unwrap();
    onto.concepts().create(NewConcept::new("Heat")).await.unwrap();

    let report = onto.bootstrap(SeedOptions::with_samples()).await.unwrap();
    assert_eq!(report.concepts_created, 17);
    assert_eq!(report.relationships_created, 21);

    let again = onto.bootstrap(SeedOptions::with_samples()).await.unwrap();
    assert!(again.is_noop(), "{again:?}");

    let heats = onto
        .concepts()
        .list(0, 100)
        .await
        .unwrap()
        .items
        .into_iter()
        .filter(|c| c.name == "Heat")
        .count();
    assert_eq!(heats, 3);
}
