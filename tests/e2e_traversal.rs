//! End-to-end tests for bounded traversal and neighbor lookups.

use kantian_graph::{
    props, Direction, MemoryBackend, NewConcept, Ontology, PathEdge, Quality, RelClass, RelType, SeedOptions,
    TraversalQuery, Value,
};
use pretty_assertions::assert_eq;

async fn concept(onto: &Ontology<MemoryBackend>, name: &str) -> String {
    onto.concepts().create(NewConcept::new(name)).await.unwrap().id
}

async fn link(onto: &Ontology<MemoryBackend>, a: &str, rel_type: &str, b: &str, confidence: f64) {
    onto.relationships()
        .create(a, b, rel_type, props([("confidence_score", confidence)]))
        .await
        .unwrap();
}

// ============================================================================
// 1. Causal chains
// ============================================================================

#[tokio::test]
async fn test_heat_causes_expansion() {
    let onto = Ontology::open_memory().await.unwrap();
    let heat = onto
        .concepts()
        .create(NewConcept::new("Heat").quality(Quality::Reality))
        .await
        .unwrap();
    let expansion = onto
        .concepts()
        .create(NewConcept::new("Expansion").quality(Quality::Reality))
        .await
        .unwrap();
    link(&onto, &heat.id, "CAUSES", &expansion.id, 0.95).await;

    let paths = onto.traversal().causal_chain(&heat.id, 1, None).await.unwrap();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].node_names(), vec!["Heat", "Expansion"]);
    let edges: Vec<_> = paths[0].edges.iter().map(PathEdge::triple).collect();
    assert_eq!(edges, vec![(heat.id.as_str(), &RelType::Causes, expansion.id.as_str())]);
    assert_eq!(paths[0].edges[0].get("confidence_score"), Some(&Value::Float(0.95)));
}

#[tokio::test]
async fn test_depth_bounds_the_chain() {
    let onto = Ontology::open_memory().await.unwrap();
    let ids = [
        concept(&onto, "A").await,
        concept(&onto, "B").await,
        concept(&onto, "C").await,
        concept(&onto, "D").await,
    ];
    for pair in ids.windows(2) {
        link(&onto, &pair[0], "CAUSES", &pair[1], 0.9).await;
    }

    let two = onto.traversal().causal_chain(&ids[0], 2, None).await.unwrap();
    let lengths: Vec<_> = two.iter().map(|p| p.len()).collect();
    assert_eq!(lengths, vec![1, 2]);

    let all = onto.traversal().causal_chain(&ids[0], None, None).await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[2].node_names(), vec!["A", "B", "C", "D"]);

    let capped = onto.traversal().causal_chain(&ids[0], 3, 1).await.unwrap();
    assert_eq!(capped.len(), 1);
}

#[tokio::test]
async fn test_depth_limits_are_enforced() {
    let onto = Ontology::open_memory().await.unwrap();
    let a = concept(&onto, "A").await;

    let err = onto.traversal().causal_chain(&a, 0, None).await.unwrap_err();
    assert_eq!(err.field(), Some("max_depth"));
    let err = onto.traversal().causal_chain(&a, 6, None).await.unwrap_err();
    assert_eq!(err.field(), Some("max_depth"));
    let err = onto.traversal().causal_chain(&a, 1, 0).await.unwrap_err();
    assert_eq!(err.field(), Some("limit"));
}

#[tokio::test]
async fn test_no_matching_edges_is_empty() {
    let onto = Ontology::open_memory().await.unwrap();
    let a = concept(&onto, "A").await;
    let b = concept(&onto, "B").await;
    link(&onto, &a, "PRECEDES", &b, 0.5).await;

    assert!(onto.traversal().causal_chain(&a, 1, None).await.unwrap().is_empty());
    assert!(onto.traversal().causal_chain("missing", 1, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cycles_terminate() {
    let onto = Ontology::open_memory().await.unwrap();
    let a = concept(&onto, "A").await;
    let b = concept(&onto, "B").await;
    link(&onto, &a, "CAUSES", &b, 0.5).await;
    link(&onto, &b, "CAUSES", &a, 0.5).await;

    let paths = onto.traversal().causal_chain(&a, 5, None).await.unwrap();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].node_names(), vec!["A", "B"]);
}

// ============================================================================
// 2. Hierarchy, membership, generic queries
// ============================================================================

#[tokio::test]
async fn test_hierarchy_and_membership() {
    let onto = Ontology::open_memory().await.unwrap();
    let forest = concept(&onto, "Forest").await;
    let tree = concept(&onto, "Tree").await;
    let leaf = concept(&onto, "Leaf").await;
    link(&onto, &forest, "CONTAINS", &tree, 1.0).await;
    link(&onto, &tree, "CONTAINS", &leaf, 1.0).await;
    link(&onto, &tree, "IS_PART_OF", &forest, 1.0).await;

    let below = onto.traversal().hierarchy(&forest, 2, None).await.unwrap();
    assert_eq!(below.last().unwrap().node_names(), vec!["Forest", "Tree", "Leaf"]);

    let above = onto.traversal().membership(&tree, None, None).await.unwrap();
    assert_eq!(above.len(), 1);
    assert_eq!(above[0].end().unwrap().name, "Forest");

    let query = TraversalQuery::from(&tree).class(RelClass::Compositional).depth(1);
    let mut ends: Vec<String> = onto
        .traversal()
        .paths(&query)
        .await
        .unwrap()
        .iter()
        .map(|p| p.end().unwrap().name.clone())
        .collect();
    ends.sort();
    assert_eq!(ends, vec!["Forest", "Leaf"]);
}

#[tokio::test]
async fn test_incoming_query() {
    let onto = Ontology::open_memory().await.unwrap();
    let heat = concept(&onto, "Heat").await;
    let expansion = concept(&onto, "Expansion").await;
    link(&onto, &heat, "CAUSES", &expansion, 0.95).await;

    let query = TraversalQuery::from(&expansion)
        .rel_type(RelType::Causes)
        .direction(Direction::Incoming)
        .depth(1);
    let paths = onto.traversal().paths(&query).await.unwrap();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].node_names(), vec!["Expansion", "Heat"]);
    assert_eq!(paths[0].end().unwrap().name, "Heat");

    // the edge still reads Heat -> Expansion
    let edge = &paths[0].edges[0];
    assert_eq!(edge.triple(), (heat.as_str(), &RelType::Causes, expansion.as_str()));
}

#[tokio::test]
async fn test_classification_edges_do_not_use_up_the_limit() {
    let onto = Ontology::open_memory().await.unwrap();
    onto.bootstrap(SeedOptions::default()).await.unwrap();
    let a = concept(&onto, "A").await;
    let b = concept(&onto, "B").await;
    onto.concepts().classify(&a, "Causality").await.unwrap();
    link(&onto, &a, "CAUSES", &b, 0.9).await;

    let query = TraversalQuery::from(&a).depth(1).limit(1);
    let paths = onto.traversal().paths(&query).await.unwrap();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].node_names(), vec!["A", "B"]);
}

// ============================================================================
// 3. Neighbor lookups
// ============================================================================

#[tokio::test]
async fn test_properties_ordered_by_confidence() {
    let onto = Ontology::open_memory().await.unwrap();
    let ball = concept(&onto, "Ball").await;
    let red = concept(&onto, "Red").await;
    let round = concept(&onto, "Round").await;
    link(&onto, &ball, "HAS_PROPERTY", &red, 0.9).await;
    link(&onto, &ball, "HAS_PROPERTY", &round, 1.0).await;

    let props_of: Vec<_> = onto
        .traversal()
        .properties_of(&ball, None)
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.concept.name)
        .collect();
    assert_eq!(props_of, vec!["Round", "Red"]);

    let capped = onto.traversal().properties_of(&ball, 1).await.unwrap();
    assert_eq!(capped.len(), 1);
}

#[tokio::test]
async fn test_temporal_reports_direction() {
    let onto = Ontology::open_memory().await.unwrap();
    let lightning = concept(&onto, "Lightning").await;
    let thunder = concept(&onto, "Thunder").await;
    link(&onto, &lightning, "PRECEDES", &thunder, 0.98).await;

    let after = onto.traversal().temporal(&lightning, None).await.unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].concept.name, "Thunder");
    assert_eq!(after[0].direction, Direction::Outgoing);

    let before = onto.traversal().temporal(&thunder, None).await.unwrap();
    assert_eq!(before[0].concept.name, "Lightning");
    assert_eq!(before[0].direction, Direction::Incoming);
}

#[tokio::test]
async fn test_interacting_and_spatial_both_ways() {
    let onto = Ontology::open_memory().await.unwrap();
    let earth = concept(&onto, "Earth").await;
    let moon = concept(&onto, "Moon").await;
    link(&onto, &earth, "INTERACTS_WITH", &moon, 1.0).await;
    onto.relationships()
        .create(
            &moon,
            &earth,
            "SPATIALLY_RELATES_TO",
            props([("relation_type", Value::from("near")), ("distance", Value::Float(384_400.0)), ("spatial_unit", Value::from("kilometers"))]),
        )
        .await
        .unwrap();

    let from_moon = onto.traversal().interacting(&moon, None).await.unwrap();
    assert_eq!(from_moon[0].concept.name, "Earth");
    assert_eq!(from_moon[0].direction, Direction::Incoming);

    let spatial = onto.traversal().spatial(&earth, None).await.unwrap();
    assert_eq!(spatial.len(), 1);
    assert_eq!(spatial[0].properties.get("spatial_unit"), Some(&Value::from("kilometers")));
}

#[tokio::test]
async fn test_all_relationships_ordering() {
    let onto = Ontology::open_memory().await.unwrap();
    let earth = concept(&onto, "Earth").await;
    let moon = concept(&onto, "Moon").await;
    let sun = concept(&onto, "Sun").await;
    link(&onto, &earth, "INTERACTS_WITH", &sun, 1.0).await;
    link(&onto, &moon, "INTERACTS_WITH", &earth, 1.0).await;
    link(&onto, &earth, "CAUSES", &moon, 0.2).await;

    let page = onto.traversal().all_relationships(&earth, 0, None).await.unwrap();
    let summary: Vec<_> = page
        .items
        .iter()
        .map(|r| (r.rel_type.as_str().to_owned(), r.source_name.clone().unwrap(), r.target_name.clone().unwrap()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("CAUSES".to_owned(), "Earth".to_owned(), "Moon".to_owned()),
            ("INTERACTS_WITH".to_owned(), "Moon".to_owned(), "Earth".to_owned()),
            ("INTERACTS_WITH".to_owned(), "Earth".to_owned(), "Sun".to_owned()),
        ]
    );
    assert_eq!(page.total, 3);

    onto.bootstrap(SeedOptions::default()).await.unwrap();
    onto.concepts().classify(&earth, "Unity").await.unwrap();
    let still = onto.traversal().all_relationships(&earth, 0, None).await.unwrap();
    assert_eq!(still.total, 3);

    let none = onto.traversal().all_relationships("missing", 0, None).await.unwrap();
    assert!(none.is_empty());
}
