//! External reasoner contract
//!
//! The engine never talks to an LLM directly; consolidation validation and
//! tier-3 synthesis go through this trait. Both calls may fail with
//! `Unavailable`, and every caller degrades gracefully: validation skips
//! the cluster, synthesis falls back to tier-2 results.
//!
//! Reasoners receive bounded summaries, never raw event dumps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{MemoryType, Outcome};

// ============================================================================
// VALIDATION
// ============================================================================

/// Bounded description of a cluster handed to the reasoner for validation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
    /// Content of the most important event in the cluster
    pub representative_content: String,
    /// Number of events in the cluster
    pub event_count: usize,
    /// Dominant outcome and its share of the cluster
    pub modal_outcome: Outcome,
    pub outcome_agreement: f64,
    /// Union of event-derived tags
    pub tags: Vec<String>,
    /// Time span covered by the cluster
    pub span_start: DateTime<Utc>,
    pub span_end: DateTime<Utc>,
    /// Confidence computed from cohesion, outcome agreement, importance
    pub initial_confidence: f64,
}

/// Reasoner verdict on a candidate pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationVerdict {
    /// Whether the cluster should be promoted
    pub accept: bool,
    /// Reasoner-phrased pattern text; None keeps the representative content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_text: Option<String>,
    /// Adjusted confidence in [0, 1]
    pub confidence: f64,
    /// Memory type the pattern should be stored as
    pub memory_type: MemoryType,
}

// ============================================================================
// SYNTHESIS
// ============================================================================

/// One tier-2 result handed to the reasoner as synthesis context
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnippet {
    /// Originating layer ("episodic", "semantic", ...)
    pub layer: String,
    /// Row id within that layer
    pub id: String,
    /// Bounded text for the reasoner
    pub text: String,
    /// Retrieval score
    pub score: f32,
}

/// A synthesized answer with citations back into the layer rows
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesizedAnswer {
    /// The answer text
    pub text: String,
    /// Reasoner confidence in [0, 1]
    pub confidence: f64,
    /// (layer, id) pairs the answer cites
    pub citations: Vec<(String, String)>,
}

// ============================================================================
// TRAIT
// ============================================================================

/// External reasoning collaborator (LLM-backed in production)
pub trait Reasoner: Send + Sync {
    /// Re-score a low-confidence cluster. `Unavailable` means the cluster
    /// is skipped this run, not rejected.
    fn validate(&self, summary: &ClusterSummary) -> Result<ValidationVerdict>;

    /// Compose ranked answers from tier-2 context. `Unavailable` means the
    /// recall response carries tier-2 results with `synthesized = false`.
    fn synthesize(&self, query: &str, context: &[ContextSnippet])
        -> Result<Vec<SynthesizedAnswer>>;
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_serializes_camel_case() {
        let summary = ClusterSummary {
            representative_content: "ran pytest".into(),
            event_count: 4,
            modal_outcome: Outcome::Success,
            outcome_agreement: 1.0,
            tags: vec![],
            span_start: Utc::now(),
            span_end: Utc::now(),
            initial_confidence: 0.7,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("representativeContent").is_some());
        assert!(json.get("initialConfidence").is_some());
    }
}
