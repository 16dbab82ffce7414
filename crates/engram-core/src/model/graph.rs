//! Knowledge graph - entities and directed relations
//!
//! Entities carry observations and importance; relations are directed,
//! typed from a controlled vocabulary (with a custom escape hatch), and
//! unique per (from, to, type).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// ENTITY TYPES
// ============================================================================

/// Kind of graph entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Project,
    Phase,
    Task,
    File,
    Function,
    #[default]
    Concept,
    Component,
    Person,
    Decision,
    Pattern,
    /// Caller-defined kind, persisted as its text
    Custom(String),
}

impl EntityType {
    /// Wire representation
    pub fn as_str(&self) -> &str {
        match self {
            EntityType::Project => "project",
            EntityType::Phase => "phase",
            EntityType::Task => "task",
            EntityType::File => "file",
            EntityType::Function => "function",
            EntityType::Concept => "concept",
            EntityType::Component => "component",
            EntityType::Person => "person",
            EntityType::Decision => "decision",
            EntityType::Pattern => "pattern",
            EntityType::Custom(s) => s,
        }
    }

    /// Parse from stored text; unknown kinds become `Custom`
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "project" => EntityType::Project,
            "phase" => EntityType::Phase,
            "task" => EntityType::Task,
            "file" => EntityType::File,
            "function" => EntityType::Function,
            "concept" => EntityType::Concept,
            "component" => EntityType::Component,
            "person" => EntityType::Person,
            "decision" => EntityType::Decision,
            "pattern" => EntityType::Pattern,
            other => EntityType::Custom(other.to_string()),
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// RELATION TYPES
// ============================================================================

/// Controlled relation vocabulary
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    DependsOn,
    Uses,
    Implements,
    PartOf,
    RelatesTo,
    CausedBy,
    ProducedBy,
    Supersedes,
    /// Caller-defined relation, persisted as its text
    Custom(String),
}

impl RelationType {
    /// Wire representation
    pub fn as_str(&self) -> &str {
        match self {
            RelationType::DependsOn => "depends_on",
            RelationType::Uses => "uses",
            RelationType::Implements => "implements",
            RelationType::PartOf => "part_of",
            RelationType::RelatesTo => "relates_to",
            RelationType::CausedBy => "caused_by",
            RelationType::ProducedBy => "produced_by",
            RelationType::Supersedes => "supersedes",
            RelationType::Custom(s) => s,
        }
    }

    /// Parse from stored text; unknown kinds become `Custom`
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "depends_on" => RelationType::DependsOn,
            "uses" => RelationType::Uses,
            "implements" => RelationType::Implements,
            "part_of" | "partof" => RelationType::PartOf,
            "relates_to" => RelationType::RelatesTo,
            "caused_by" => RelationType::CausedBy,
            "produced_by" => RelationType::ProducedBy,
            "supersedes" => RelationType::Supersedes,
            other => RelationType::Custom(other.to_string()),
        }
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// ENTITY & RELATION
// ============================================================================

/// A node in the knowledge graph
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Owning project
    pub project_id: String,
    /// Name, unique per (project, type)
    pub name: String,
    /// Kind of entity
    pub entity_type: EntityType,
    /// Accumulated observations about the entity
    pub observations: Vec<String>,
    /// Importance in [0, 1]
    pub importance: f64,
    /// When the entity was created
    pub created_at: DateTime<Utc>,
    /// When the entity was last modified
    pub updated_at: DateTime<Utc>,
}

/// Input for creating an entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EntityInput {
    /// Name, unique per (project, type)
    pub name: String,
    /// Kind of entity
    #[serde(default)]
    pub entity_type: EntityType,
    /// Initial observations
    #[serde(default)]
    pub observations: Vec<String>,
    /// Importance in [0, 1]
    #[serde(default = "default_importance")]
    pub importance: f64,
}

fn default_importance() -> f64 {
    0.5
}

/// A directed, typed edge between two entities
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Owning project
    pub project_id: String,
    /// Source entity
    pub from_entity_id: String,
    /// Target entity
    pub to_entity_id: String,
    /// Relation kind; (from, to, type) is unique
    pub relation_type: RelationType,
    /// Free-form edge properties
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
    /// When the relation was created
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// TESTS
// ============================================================================
