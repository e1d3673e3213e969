//! Built-in schema for an archival description repository

use super::{Capabilities, Cardinality, IdPolicy, RelationSchema, SchemaRegistry, TypeSchema};
use crate::graph::Direction;

pub const COUNTRY: &str = "Country";
pub const REPOSITORY: &str = "Repository";
pub const REPOSITORY_DESCRIPTION: &str = "RepositoryDescription";
pub const ADDRESS: &str = "Address";
pub const UNIT: &str = "Unit";
pub const UNIT_DESCRIPTION: &str = "UnitDescription";
pub const DATE_PERIOD: &str = "DatePeriod";
pub const HISTORICAL_AGENT: &str = "HistoricalAgent";
pub const AGENT_DESCRIPTION: &str = "AgentDescription";
pub const VOCABULARY: &str = "Vocabulary";
pub const CONCEPT: &str = "Concept";
pub const CONCEPT_DESCRIPTION: &str = "ConceptDescription";
pub const USER_PROFILE: &str = "UserProfile";
pub const GROUP: &str = "Group";
pub const ANNOTATION: &str = "Annotation";
pub const SYSTEM_EVENT: &str = "SystemEvent";
pub const VERSION: &str = "Version";
pub const PERMISSION_GRANT: &str = "PermissionGrant";

const LEVELS: &[&str] = &[
    "fonds",
    "subfonds",
    "collection",
    "series",
    "subseries",
    "file",
    "item",
    "otherlevel",
];

const ENTITY_TYPES: &[&str] = &["person", "family", "corporateBody"];

fn scope() -> Capabilities {
    Capabilities {
        accessible: true,
        versioned: true,
        watchable: true,
        permission_scope: true,
        ..Capabilities::default()
    }
}

fn described_item() -> Capabilities {
    Capabilities {
        accessible: true,
        versioned: true,
        annotatable: true,
        watchable: true,
        promotable: true,
        permission_scope: true,
        ..Capabilities::default()
    }
}

fn accessor() -> Capabilities {
    Capabilities {
        accessible: true,
        versioned: true,
        accessor: true,
        permission_scope: true,
        ..Capabilities::default()
    }
}

fn description(name: &str, title_key: &str) -> TypeSchema {
    TypeSchema::new(name)
        .mandatory(&["languageCode", title_key])
        .id_policy(IdPolicy::Description)
}

fn describes() -> RelationSchema {
    RelationSchema::dependent("describes", Direction::In)
}

impl SchemaRegistry {
    /// Countries, repositories, units, authorities and vocabularies,
    /// plus the accessor and bookkeeping types the engine itself writes.
    pub fn archival() -> SchemaRegistry {
        SchemaRegistry::new()
            .with(
                TypeSchema::new(COUNTRY)
                    .mandatory(&["identifier"])
                    .unique(&["identifier"])
                    .capabilities(scope())
                    .id_policy(IdPolicy::Identifier),
            )
            .with(
                TypeSchema::new(REPOSITORY)
                    .mandatory(&["identifier"])
                    .relation(describes())
                    .relation(RelationSchema::reference("hasCountry", Cardinality::One).below_level(1))
                    .capabilities(described_item())
                    .id_policy(IdPolicy::Identifier),
            )
            .with(
                description(REPOSITORY_DESCRIPTION, "name")
                    .relation(RelationSchema::dependent("hasAddress", Direction::Out)),
            )
            .with(TypeSchema::new(ADDRESS))
            .with(
                TypeSchema::new(UNIT)
                    .mandatory(&["identifier"])
                    .relation(describes())
                    .relation(RelationSchema::reference("heldBy", Cardinality::One).below_level(1))
                    .relation(RelationSchema::reference("childOf", Cardinality::One).below_level(1))
                    .capabilities(described_item())
                    .id_policy(IdPolicy::Identifier),
            )
            .with(
                description(UNIT_DESCRIPTION, "title")
                    .enumerated("levelOfDescription", LEVELS)
                    .relation(RelationSchema::dependent("hasDate", Direction::Out)),
            )
            .with(TypeSchema::new(DATE_PERIOD).mandatory(&["startDate"]))
            .with(
                TypeSchema::new(HISTORICAL_AGENT)
                    .mandatory(&["identifier"])
                    .relation(describes())
                    .capabilities(described_item())
                    .id_policy(IdPolicy::Identifier),
            )
            .with(
                description(AGENT_DESCRIPTION, "name")
                    .enumerated("typeOfEntity", ENTITY_TYPES)
                    .relation(RelationSchema::dependent("hasDate", Direction::Out)),
            )
            .with(
                TypeSchema::new(VOCABULARY)
                    .mandatory(&["identifier"])
                    .capabilities(scope())
                    .id_policy(IdPolicy::Identifier),
            )
            .with(
                TypeSchema::new(CONCEPT)
                    .mandatory(&["identifier"])
                    .relation(describes())
                    .relation(RelationSchema::reference("inAuthoritativeSet", Cardinality::One).below_level(1))
                    .relation(RelationSchema::reference("broader", Cardinality::Many).below_level(1))
                    .capabilities(described_item())
                    .id_policy(IdPolicy::Identifier),
            )
            .with(description(CONCEPT_DESCRIPTION, "name"))
            .with(
                TypeSchema::new(USER_PROFILE)
                    .mandatory(&["identifier", "name"])
                    .unique(&["email"])
                    .relation(RelationSchema::reference("belongsTo", Cardinality::Many).below_level(1))
                    .capabilities(accessor())
                    .id_policy(IdPolicy::Identifier),
            )
            .with(
                TypeSchema::new(GROUP)
                    .mandatory(&["identifier", "name"])
                    .relation(RelationSchema::reference("belongsTo", Cardinality::Many).below_level(1))
                    .capabilities(accessor())
                    .id_policy(IdPolicy::Identifier),
            )
            .with(
                TypeSchema::new(ANNOTATION)
                    .mandatory(&["body"])
                    .relation(RelationSchema::reference("annotates", Cardinality::Many).below_level(1))
                    .capabilities(Capabilities {
                        accessible: true,
                        annotatable: true,
                        promotable: true,
                        ..Capabilities::default()
                    }),
            )
            .with(TypeSchema::new(SYSTEM_EVENT).mandatory(&["timestamp", "eventType"]))
            .with(TypeSchema::new(VERSION).mandatory(&["entityId", "entityType"]))
            .with(TypeSchema::new(PERMISSION_GRANT).mandatory(&["permission"]))
    }
}
