//! # Bootstrap
//!
//! One-time, idempotent initialization of a store: uniqueness constraints,
//! the fixed Kantian taxonomy, and (optionally) a small sample graph.
//! Everything is an upsert, so running it against an initialized store
//! creates nothing.

use serde::{Deserialize, Serialize};

use crate::model::concept::keys;
use crate::model::Modality::{Existence, Necessity, Possibility};
use crate::model::Quality::{Limitation, Negation, Reality};
use crate::model::{labels, props, Direction, Modality, NewCategory, NewConcept, NewSubcategory, PropertyMap, Quality, Value};
use crate::storage::{find_unique, ConstraintType, StorageBackend};
use crate::tx::{in_tx, TxMode};
use crate::validation::rel_keys;
use crate::{Ontology, Result};

// ============================================================================
// Options & report
// ============================================================================

/// What `initialize` should seed beyond constraints and taxonomy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedOptions {
    /// Seed the sample concepts and their relationships.
    pub sample_concepts: bool,
}

impl SeedOptions {
    pub fn with_samples() -> Self {
        Self { sample_concepts: true }
    }
}

/// Counts of what a bootstrap run created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapReport {
    pub constraints_created: usize,
    pub categories_created: usize,
    pub subcategories_created: usize,
    pub concepts_created: usize,
    pub relationships_created: usize,
}

impl BootstrapReport {
    /// True when the run changed nothing.
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

// ============================================================================
// The Kantian taxonomy
// ============================================================================

pub struct CategorySeed {
    pub name: &'static str,
    pub description: &'static str,
    pub subcategories: [SubcategorySeed; 3],
}

pub struct SubcategorySeed {
    pub name: &'static str,
    pub description: &'static str,
    pub formal_definition: &'static str,
    pub examples: [&'static str; 3],
}

/// The four categories of the understanding and their twelve subcategories.
pub const KANTIAN_TAXONOMY: [CategorySeed; 4] = [
    CategorySeed {
        name: "Quantity",
        description: "Deals with the extension of concepts",
        subcategories: [
            SubcategorySeed {
                name: "Unity",
                description: "Concept of One",
                formal_definition: "A concept considered as including only a single instance",
                examples: ["Individual", "Unit", "Single"],
            },
            SubcategorySeed {
                name: "Plurality",
                description: "Concept of Many",
                formal_definition: "A concept considered as a collection of separate instances",
                examples: ["Many", "Collection", "Group"],
            },
            SubcategorySeed {
                name: "Totality",
                description: "Concept of All",
                formal_definition: "Unity and plurality considered together as a whole",
                examples: ["All", "Complete", "Whole"],
            },
        ],
    },
    CategorySeed {
        name: "Quality",
        description: "Deals with the content of concepts",
        subcategories: [
            SubcategorySeed {
                name: "Reality",
                description: "Positive determination",
                formal_definition: "The affirmation of a quality",
                examples: ["Being", "Presence", "Affirmation"],
            },
            SubcategorySeed {
                name: "Negation",
                description: "Negative determination",
                formal_definition: "The denial of a quality",
                examples: ["Not-being", "Absence", "Denial"],
            },
            SubcategorySeed {
                name: "Limitation",
                description: "Bounded determination",
                formal_definition: "The boundary between reality and negation",
                examples: ["Boundary", "Finitude", "Restriction"],
            },
        ],
    },
    CategorySeed {
        name: "Relation",
        description: "Deals with how concepts relate to each other",
        subcategories: [
            SubcategorySeed {
                name: "Substance",
                description: "Relation of inherence and subsistence",
                formal_definition: "The relation of properties to a thing",
                examples: ["Object-property", "Subject-predicate", "Inherence"],
            },
            SubcategorySeed {
                name: "Causality",
                description: "Relation of cause and effect",
                formal_definition: "The relation of cause to effect",
                examples: ["Cause-effect", "If-then", "Production"],
            },
            SubcategorySeed {
                name: "Community",
                description: "Reciprocal relation between agent and patient",
                formal_definition: "Reciprocal causation between active and passive",
                examples: ["Interaction", "Reciprocity", "Mutual influence"],
            },
        ],
    },
    CategorySeed {
        name: "Modality",
        description: "Deals with the relation of concepts to the faculty of cognition",
        subcategories: [
            SubcategorySeed {
                name: "Possibility/Impossibility",
                description: "Agreement or conflict with conditions of experience",
                formal_definition: "Conformity or non-conformity to the formal conditions of experience",
                examples: ["Can be", "Cannot be", "Possible"],
            },
            SubcategorySeed {
                name: "Existence/Non-existence",
                description: "Agreement or conflict with material conditions of experience",
                formal_definition: "Connection or non-connection with the material conditions of experience",
                examples: ["Is", "Is not", "Exists"],
            },
            SubcategorySeed {
                name: "Necessity/Contingency",
                description: "Agreement or determination by material conditions of experience",
                formal_definition: "Determination or non-determination by the general conditions of experience",
                examples: ["Must be", "May be", "Required"],
            },
        ],
    },
];

// ============================================================================
// Sample graph
// ============================================================================

struct SampleConcept {
    name: &'static str,
    description: &'static str,
    confidence: f64,
    stability: &'static str,
    quality: Option<Quality>,
    modality: Option<Modality>,
}

const fn sample(
    name: &'static str,
    description: &'static str,
    quality: Option<Quality>,
    modality: Option<Modality>,
) -> SampleConcept {
    SampleConcept { name, description, confidence: 1.0, stability: "stable", quality, modality }
}

/// `source_information` marking the Concepts seeded here.
pub const SAMPLE_SOURCE: &str = "sample data";

const SAMPLE_CONCEPTS: [SampleConcept; 17] = [
    sample("Ball", "A spherical object used in games and sports", Some(Reality), Some(Existence)),
    sample("Red", "A color at the long wavelength end of the visible spectrum", Some(Reality), None),
    sample("Heat", "Thermal energy transferred from one system to another", Some(Reality), Some(Existence)),
    sample("Expansion", "Increase in volume or size of a material", Some(Reality), Some(Existence)),
    sample("Earth", "The third planet from the Sun in the Solar System", Some(Reality), Some(Existence)),
    sample("Moon", "A natural satellite of Earth", Some(Reality), Some(Existence)),
    sample("Forest", "A large area covered chiefly with trees and undergrowth", Some(Reality), Some(Existence)),
    sample("Tree", "A woody perennial plant with a single main stem", Some(Reality), Some(Existence)),
    sample("Lightning", "Electric discharge in the atmosphere", Some(Reality), Some(Existence)),
    sample("Thunder", "Sound caused by lightning", Some(Reality), Some(Existence)),
    sample("Absence", "The state of being away or not present", Some(Negation), Some(Existence)),
    sample("Horizon", "The line where the earth meets the sky", Some(Limitation), Some(Existence)),
    sample("Unicorn", "A mythical creature that resembles a horse with a single horn", Some(Reality), Some(Possibility)),
    sample("Gravity", "The force that attracts two bodies toward each other", Some(Reality), Some(Necessity)),
    SampleConcept {
        name: "Atom",
        description: "The basic unit of a chemical element.",
        confidence: 0.98,
        stability: "stable",
        quality: None,
        modality: None,
    },
    SampleConcept {
        name: "Shadow",
        description: "A dark area or shape produced by a body coming between rays of light and a surface.",
        confidence: 0.95,
        stability: "ephemeral",
        quality: Some(Limitation),
        modality: None,
    },
    SampleConcept {
        name: "Vacuum",
        description: "Space devoid of matter.",
        confidence: 0.97,
        stability: "stable",
        quality: Some(Negation),
        modality: None,
    },
];

/// (concept, subcategory, confidence)
const SAMPLE_CLASSIFICATIONS: [(&str, &str, f64); 12] = [
    ("Ball", "Substance", 1.0),
    ("Heat", "Causality", 1.0),
    ("Expansion", "Causality", 1.0),
    ("Earth", "Community", 1.0),
    ("Moon", "Community", 1.0),
    ("Forest", "Totality", 1.0),
    ("Tree", "Plurality", 1.0),
    ("Lightning", "Causality", 1.0),
    ("Thunder", "Causality", 1.0),
    ("Atom", "Unity", 0.98),
    ("Shadow", "Limitation", 0.95),
    ("Vacuum", "Negation", 0.97),
];

/// (source, type, target, properties)
fn sample_relations() -> Vec<(&'static str, &'static str, &'static str, PropertyMap)> {
    let entry = |confidence: f64| props([("confidence_score", Value::Float(confidence)), ("source_information", Value::from("manual entry"))]);
    let spatial = || {
        let mut p = entry(1.0);
        p.insert("relation_type".into(), Value::from("near"));
        p.insert("distance".into(), Value::Float(384_400.0));
        p.insert("spatial_unit".into(), Value::from("kilometers"));
        p.insert("spatial_dimension".into(), Value::from("3D"));
        p
    };
    let mut temporal = entry(0.98);
    temporal.insert("temporal_distance".into(), Value::from("seconds"));
    temporal.insert("temporal_unit".into(), Value::from("seconds"));
    temporal.insert("temporal_order".into(), Value::Int(1));

    vec![
        ("Ball", "HAS_PROPERTY", "Red", entry(0.9)),
        ("Heat", "CAUSES", "Expansion", entry(0.95)),
        ("Earth", "INTERACTS_WITH", "Moon", entry(1.0)),
        ("Moon", "INTERACTS_WITH", "Earth", entry(1.0)),
        ("Forest", "CONTAINS", "Tree", entry(1.0)),
        ("Tree", "IS_PART_OF", "Forest", entry(1.0)),
        ("Lightning", "PRECEDES", "Thunder", temporal),
        ("Earth", "SPATIALLY_RELATES_TO", "Moon", spatial()),
        ("Moon", "SPATIALLY_RELATES_TO", "Earth", spatial()),
    ]
}

// ============================================================================
// Initialize
// ============================================================================

/// Apply constraints, upsert the taxonomy and optionally seed sample data.
pub async fn initialize<B: StorageBackend>(onto: &Ontology<B>, options: SeedOptions) -> Result<BootstrapReport> {
    let mut report = BootstrapReport::default();
    let backend = onto.backend();

    let mut constraints = vec![
        (labels::CATEGORY, keys::NAME),
        (labels::SUBCATEGORY, keys::NAME),
        (labels::CONCEPT, keys::ID),
    ];
    if onto.config().concepts.unique_names {
        constraints.push((labels::CONCEPT, keys::NAME));
    }
    for (label, property) in constraints {
        if backend.create_constraint(label, property, ConstraintType::Unique).await? {
            tracing::info!(label, property, "constraint created");
            report.constraints_created += 1;
        }
    }

    let taxonomy = onto.taxonomy();
    for category in &KANTIAN_TAXONOMY {
        let new = NewCategory::new(category.name).description(category.description);
        if taxonomy.upsert_category(&new).await? {
            report.categories_created += 1;
        }
        for sub in &category.subcategories {
            let new = NewSubcategory::new(sub.name)
                .description(sub.description)
                .formal_definition(sub.formal_definition)
                .examples(sub.examples);
            if taxonomy.upsert_subcategory(category.name, &new).await? {
                report.subcategories_created += 1;
            }
        }
    }
    tracing::info!(
        categories = report.categories_created,
        subcategories = report.subcategories_created,
        "taxonomy seeded"
    );

    if options.sample_concepts {
        seed_samples(onto, &mut report).await?;
    }

    tracing::info!(?report, "bootstrap complete");
    Ok(report)
}

async fn seed_samples<B: StorageBackend>(onto: &Ontology<B>, report: &mut BootstrapReport) -> Result<()> {
    let concepts = onto.concepts();
    let relationships = onto.relationships();

    let mut ids = hashbrown::HashMap::with_capacity(SAMPLE_CONCEPTS.len());
    for seed in &SAMPLE_CONCEPTS {
        let id = match sample_concept_id(onto.backend(), seed.name).await? {
            Some(id) => id,
            None => {
                let mut new = NewConcept::new(seed.name)
                    .description(seed.description)
                    .confidence(seed.confidence)
                    .stability_status(seed.stability)
                    .attr(rel_keys::SOURCE_INFORMATION, SAMPLE_SOURCE);
                if let Some(q) = seed.quality {
                    new = new.quality(q);
                }
                if let Some(m) = seed.modality {
                    new = new.modality(m);
                }
                let id = concepts.create(new).await?.id;
                report.concepts_created += 1;
                id
            }
        };
        ids.insert(seed.name, id);
    }

    let classifications = SAMPLE_CLASSIFICATIONS.into_iter().map(|(concept, sub, confidence)| {
        let p = props([
            ("confidence_score", Value::Float(confidence)),
            ("source_information", Value::from("manual classification")),
        ]);
        (concept, "INSTANCE_OF", sub, p)
    });
    for (source, rel_type, target, properties) in classifications.chain(sample_relations()) {
        let Some(source_id) = ids.get(source) else { continue };
        // Concept targets by id, Subcategory targets by name
        let target_key = ids.get(target).map(String::as_str).unwrap_or(target);
        if edge_exists(onto.backend(), source_id, rel_type, target_key).await? {
            continue;
        }
        relationships.create(source_id, target_key, rel_type, properties).await?;
        report.relationships_created += 1;
    }
    tracing::info!(
        concepts = report.concepts_created,
        relationships = report.relationships_created,
        "sample graph seeded"
    );
    Ok(())
}

/// Id of the sample Concept called `name`, if an earlier run seeded it.
/// Concepts of the same name created by users are not sample data.
async fn sample_concept_id<B: StorageBackend>(backend: &B, name: &str) -> Result<Option<String>> {
    let nodes = in_tx!(backend, TxMode::ReadOnly, |tx| backend
        .nodes_by_property(&tx, labels::CONCEPT, keys::NAME, &Value::from(name))
        .await)?;
    Ok(nodes
        .iter()
        .filter(|n| n.get(rel_keys::SOURCE_INFORMATION).and_then(Value::as_str) == Some(SAMPLE_SOURCE))
        .find_map(|n| n.get(keys::ID).and_then(Value::as_str).map(str::to_owned)))
}

async fn edge_exists<B: StorageBackend>(backend: &B, source_id: &str, rel_type: &str, target: &str) -> Result<bool> {
    in_tx!(backend, TxMode::ReadOnly, |tx| edge_exists_in(backend, &tx, source_id, rel_type, target).await)
}

async fn edge_exists_in<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    source_id: &str,
    rel_type: &str,
    target: &str,
) -> Result<bool> {
    let Some(src) = find_unique(backend, tx, labels::CONCEPT, keys::ID, source_id).await? else {
        return Ok(false);
    };
    for rel in backend.get_relationships(tx, src.id, Direction::Outgoing, Some(rel_type)).await? {
        if let Some(dst) = backend.get_node(tx, rel.dst).await? {
            if dst.identity() == Some(target) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}
