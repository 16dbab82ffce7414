//! Cascading recall - three-tier retrieval across the memory layers
//!
//! Tier 1 runs the selected layers' searches concurrently under a shared
//! deadline; tier 2 enriches with graph neighborhoods, session context,
//! and meta hints; tier 3 optionally delegates to an external reasoner for
//! synthesis. Every result carries provenance, and degraded responses are
//! flagged (`partial`, `synthesized`) rather than errored.

mod cache;
mod classify;
mod engine;

pub use cache::RecallCache;
pub use classify::{classify, Classification};
pub use engine::RecallEngine;

use serde::{Deserialize, Serialize};

use crate::layers::ExpertiseReport;
use crate::model::{Entity, EpisodicEvent, Procedure, SemanticMemory, Task};
use crate::reasoner::SynthesizedAnswer;

// ============================================================================
// LAYERS
// ============================================================================

/// Searchable layers targeted by query classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Episodic,
    Semantic,
    Procedural,
    Prospective,
    Graph,
}

impl Layer {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Episodic => "episodic",
            Layer::Semantic => "semantic",
            Layer::Procedural => "procedural",
            Layer::Prospective => "prospective",
            Layer::Graph => "graph",
        }
    }

    /// Tier-2 re-scoring prior for the layer
    pub fn prior(&self) -> f32 {
        match self {
            Layer::Semantic => 1.0,
            Layer::Episodic => 0.9,
            Layer::Graph => 0.8,
            Layer::Procedural => 0.7,
            Layer::Prospective => 0.6,
        }
    }

    /// All layers in prior order
    pub fn all() -> [Layer; 5] {
        [
            Layer::Semantic,
            Layer::Episodic,
            Layer::Graph,
            Layer::Procedural,
            Layer::Prospective,
        ]
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// RESULTS
// ============================================================================

/// One recalled item, tagged with its source layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum RecallItem {
    Episodic {
        event: EpisodicEvent,
    },
    Semantic {
        memory: SemanticMemory,
        #[serde(skip_serializing_if = "Option::is_none")]
        similarity: Option<f32>,
    },
    Procedure {
        procedure: Procedure,
    },
    Task {
        task: Task,
    },
    Entity {
        entity: Entity,
    },
    Synthesized {
        answer: SynthesizedAnswer,
    },
}

/// A scored, provenance-tagged recall result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredRecall {
    /// Source layer ("synthesized" items keep the semantic prior)
    pub layer: Layer,
    /// Row id within the layer (synthesized answers use a fresh UUID)
    pub id: String,
    /// Retrieval score after fusion/priors
    pub score: f32,
    /// The item itself
    pub item: RecallItem,
}

// ============================================================================
// REQUEST & RESPONSE
// ============================================================================

/// Session context visible to the recall engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Current session id, when one is active
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Current task description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    /// Current work phase ("debugging" adds the episodic layer)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

impl SessionSnapshot {
    /// Whether any context is present
    pub fn is_empty(&self) -> bool {
        self.session_id.is_none() && self.task.is_none() && self.phase.is_none()
    }
}

/// Recall request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecallRequest {
    /// The query text
    pub query: String,
    /// Result budget; defaults from config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k: Option<usize>,
    /// Explicit cascade depth, clamped to [1, 3]; None = adaptive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cascade_depth: Option<u8>,
}

/// Recall response; never an error for "no results"
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallResponse {
    /// Ranked results with provenance
    pub results: Vec<ScoredRecall>,
    /// Depth the engine actually ran
    pub depth: u8,
    /// True when at least one tier-1 layer errored or timed out
    pub partial: bool,
    /// The layers that contributed no slice
    pub failed_layers: Vec<Layer>,
    /// Whether tier-3 synthesis ran
    pub synthesized: bool,
    /// Whether the response came from the recall cache
    pub cache_hit: bool,
    /// Tier-2 meta hint: expertise in the inferred domain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expertise: Option<ExpertiseReport>,
    /// Tier-2 meta hint: current cognitive load in [0, 1]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cognitive_load: Option<f64>,
}

impl RecallResponse {
    pub(crate) fn empty(depth: u8) -> Self {
        Self {
            results: vec![],
            depth,
            partial: false,
            failed_layers: vec![],
            synthesized: false,
            cache_hit: false,
            expertise: None,
            cognitive_load: None,
        }
    }
}
