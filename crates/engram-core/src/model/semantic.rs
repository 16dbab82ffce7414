//! Semantic memories - consolidated facts, patterns, principles, concepts
//!
//! A semantic memory is produced by consolidation (or a direct write) and
//! keeps a weak back-reference to its source events by id; events never
//! point at semantic memories, so the provenance link cannot cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// VOCABULARY
// ============================================================================

/// Kind of consolidated knowledge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    /// A discrete fact
    #[default]
    Fact,
    /// A recurring pattern extracted from events
    Pattern,
    /// A guiding principle
    Principle,
    /// An abstract concept
    Concept,
}

impl MemoryType {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Fact => "fact",
            MemoryType::Pattern => "pattern",
            MemoryType::Principle => "principle",
            MemoryType::Concept => "concept",
        }
    }

    /// Parse from stored text
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pattern" => MemoryType::Pattern,
            "principle" => MemoryType::Principle,
            "concept" => MemoryType::Concept,
            _ => MemoryType::Fact,
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Consolidation state machine for a semantic memory
///
/// DAG: `unconsolidated -> consolidating -> consolidated`;
/// `consolidated -> reconsolidating -> consolidated`. An item stuck in
/// `reconsolidating` past the window is labile: it may be overwritten or
/// rejected by the next consolidation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConsolidationState {
    /// Directly written, not yet through the pipeline
    #[default]
    Unconsolidated,
    /// Pipeline in flight
    Consolidating,
    /// Stable
    Consolidated,
    /// Retrieved recently; content edits allowed inside the window
    Reconsolidating,
}

impl ConsolidationState {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsolidationState::Unconsolidated => "unconsolidated",
            ConsolidationState::Consolidating => "consolidating",
            ConsolidationState::Consolidated => "consolidated",
            ConsolidationState::Reconsolidating => "reconsolidating",
        }
    }

    /// Parse from stored text
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "consolidating" => ConsolidationState::Consolidating,
            "consolidated" => ConsolidationState::Consolidated,
            "reconsolidating" => ConsolidationState::Reconsolidating,
            _ => ConsolidationState::Unconsolidated,
        }
    }

    /// Whether the transition `self -> to` follows the DAG
    pub fn can_transition(&self, to: ConsolidationState) -> bool {
        use ConsolidationState::*;
        matches!(
            (self, to),
            (Unconsolidated, Consolidating)
                | (Consolidating, Consolidated)
                | (Consolidated, Reconsolidating)
                | (Reconsolidating, Consolidated)
        )
    }
}

impl std::fmt::Display for ConsolidationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// SEMANTIC MEMORY
// ============================================================================

/// A consolidated piece of knowledge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticMemory {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Owning project
    pub project_id: String,
    /// The knowledge itself
    pub content: String,
    /// Dense embedding; None when the embedder was unavailable at write time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Model that produced the embedding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    /// Kind of knowledge
    pub memory_type: MemoryType,
    /// Categorization tags
    pub tags: Vec<String>,
    /// Quality in [0, 1]; EMA-updated by retrieval and consolidation
    pub quality_score: f64,
    /// Weak back-reference to the source events (by value, never ownership)
    pub source_event_ids: Vec<String>,
    /// When the memory was created
    pub created_at: DateTime<Utc>,
    /// When the memory was last modified
    pub updated_at: DateTime<Utc>,
    /// Times this memory was returned from recall
    pub access_count: i64,
    /// State-machine position
    pub consolidation_state: ConsolidationState,
    /// Last time the memory was retrieved (opens the reconsolidation window)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_retrieved_at: Option<DateTime<Utc>>,
}

impl SemanticMemory {
    /// Whether `now` falls inside the reconsolidation window after the last
    /// retrieval. Never-retrieved memories have no open window.
    pub fn in_reconsolidation_window(&self, now: DateTime<Utc>, window_secs: i64) -> bool {
        self.last_retrieved_at
            .map(|t| (now - t).num_seconds() <= window_secs)
            .unwrap_or(false)
    }
}

/// Input for a direct semantic write
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SemanticInput {
    /// The knowledge to store
    pub content: String,
    /// Kind of knowledge
    #[serde(default)]
    pub memory_type: MemoryType,
    /// Categorization tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Initial quality in [0, 1]
    #[serde(default = "default_quality")]
    pub quality_score: f64,
    /// Source event provenance, if any
    #[serde(default)]
    pub source_event_ids: Vec<String>,
}

fn default_quality() -> f64 {
    0.5
}

// ============================================================================
// TESTS
// ============================================================================
