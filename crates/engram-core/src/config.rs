//! Engine configuration
//!
//! Plain structs with sensible defaults; every tunable the subsystems
//! consult lives here so deployments can adjust without code changes.

use serde::{Deserialize, Serialize};

// ============================================================================
// ACTIVATION
// ============================================================================

/// Weights and constants for the ACT-R-style activation score.
///
/// Weights default to a unit sum; activation must stay strictly increasing
/// in activation_count and importance, strictly decreasing in age.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationConfig {
    /// Weight of the log(1 + count * recency) decay term
    pub decay_weight: f64,
    /// Weight of event importance
    pub importance_weight: f64,
    /// Weight of event actionability
    pub actionability_weight: f64,
    /// Weight of event contextuality
    pub contextuality_weight: f64,
    /// Exponential decay constant applied to age since last activation
    pub lambda: f64,
    /// Time unit for recency decay, in seconds (default: 1 hour)
    pub time_unit_secs: f64,
    /// Working-memory capacity (Miller 7±2, clamped to [5, 9])
    pub working_memory_slots: usize,
    /// Activation below this floor does not count toward cognitive load
    pub activation_floor: f64,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            decay_weight: 0.35,
            importance_weight: 0.30,
            actionability_weight: 0.20,
            contextuality_weight: 0.15,
            lambda: 0.3,
            time_unit_secs: 3600.0,
            working_memory_slots: 7,
            activation_floor: 0.2,
        }
    }
}

impl ActivationConfig {
    /// Working-memory slot count clamped to the Miller band
    pub fn clamped_slots(&self) -> usize {
        self.working_memory_slots.clamp(5, 9)
    }
}

// ============================================================================
// CONSOLIDATION
// ============================================================================

/// Consolidation strategy - tunes clustering strictness and LLM usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsolidationStrategy {
    /// Loose clusters, no LLM validation
    Speed,
    /// Moderate clusters, validate low-confidence patterns
    #[default]
    Balanced,
    /// Tight clusters, validate most patterns
    Quality,
    /// Tightest clusters, validate everything
    Minimal,
}

impl ConsolidationStrategy {
    /// Maximum cosine distance inside a cluster (complete linkage)
    pub fn cluster_distance_max(&self) -> f32 {
        match self {
            ConsolidationStrategy::Speed => 0.5,
            ConsolidationStrategy::Balanced => 0.35,
            ConsolidationStrategy::Quality => 0.25,
            ConsolidationStrategy::Minimal => 0.2,
        }
    }

    /// Minimum events required to extract a pattern
    pub fn min_cluster_size(&self) -> usize {
        match self {
            ConsolidationStrategy::Speed => 2,
            ConsolidationStrategy::Balanced => 3,
            ConsolidationStrategy::Quality => 4,
            ConsolidationStrategy::Minimal => 5,
        }
    }

    /// Patterns with confidence below this are re-scored by the reasoner
    pub fn llm_validation_threshold(&self) -> f64 {
        match self {
            ConsolidationStrategy::Speed => 0.0,
            ConsolidationStrategy::Balanced => 0.6,
            ConsolidationStrategy::Quality => 0.8,
            ConsolidationStrategy::Minimal => 1.0,
        }
    }

    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsolidationStrategy::Speed => "speed",
            ConsolidationStrategy::Balanced => "balanced",
            ConsolidationStrategy::Quality => "quality",
            ConsolidationStrategy::Minimal => "minimal",
        }
    }
}

impl std::str::FromStr for ConsolidationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "speed" => Ok(ConsolidationStrategy::Speed),
            "balanced" => Ok(ConsolidationStrategy::Balanced),
            "quality" => Ok(ConsolidationStrategy::Quality),
            "minimal" => Ok(ConsolidationStrategy::Minimal),
            _ => Err(format!("Unknown strategy: {}", s)),
        }
    }
}

/// Configuration for the consolidation pipeline and the archival pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationConfig {
    /// Default strategy when a run does not specify one
    pub strategy: ConsolidationStrategy,
    /// Events younger than this are left for the next run (seconds)
    pub grace_period_secs: i64,
    /// Maximum events scanned per run
    pub batch_limit: usize,
    /// Cosine similarity at or above which a new pattern merges into an
    /// existing semantic memory instead of inserting a duplicate
    pub pattern_merge_similarity: f32,
    /// Semantic memories at or above this quality cannot be overwritten
    pub protection_quality: f64,
    /// Age beyond which low-importance active events are archived (days)
    pub archive_after_days: i64,
    /// Events below this importance are eligible for archival
    pub archive_importance_below: f64,
    /// Consolidation score at or above which an event must leave `active`
    pub consolidation_score_threshold: f64,
    /// Job-level deadline (seconds); partial completions commit per cluster
    pub job_deadline_secs: u64,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            strategy: ConsolidationStrategy::Balanced,
            grace_period_secs: 60,
            batch_limit: 256,
            pattern_merge_similarity: 0.92,
            protection_quality: 0.8,
            archive_after_days: 30,
            archive_importance_below: 0.3,
            consolidation_score_threshold: 0.5,
            job_deadline_secs: 300,
        }
    }
}

// ============================================================================
// SEARCH & RECALL
// ============================================================================

/// Hybrid-search weights and the reconsolidation window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticConfig {
    /// Weight of cosine similarity in the hybrid score
    pub semantic_weight: f32,
    /// Weight of normalized BM25 in the hybrid score
    pub keyword_weight: f32,
    /// Minimum cosine similarity for vector candidates
    pub min_similarity: f32,
    /// Candidate multiplier: fetch `3 * k` from each source before fusion
    pub candidate_multiplier: usize,
    /// Seconds after retrieval during which in-place content edits are
    /// accepted (reconsolidation window)
    pub reconsolidation_window_secs: i64,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            semantic_weight: 0.7,
            keyword_weight: 0.3,
            min_similarity: 0.3,
            candidate_multiplier: 3,
            reconsolidation_window_secs: 3600,
        }
    }
}

/// Cascading recall engine tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallConfig {
    /// Default result count when the caller does not specify k
    pub default_k: usize,
    /// Shared deadline for the tier-1 parallel layer reads (milliseconds)
    pub tier1_deadline_ms: u64,
    /// Tier-3 synthesis is skipped when top tier-1 semantic similarity
    /// meets or exceeds this value and no planning terms are present
    pub synthesis_similarity_gate: f32,
    /// Recall-result cache TTL (seconds)
    pub cache_ttl_secs: u64,
    /// Recall-result cache capacity (entries)
    pub cache_capacity: usize,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            default_k: 10,
            tier1_deadline_ms: 2_000,
            synthesis_similarity_gate: 0.85,
            cache_ttl_secs: 300,
            cache_capacity: 256,
        }
    }
}

// ============================================================================
// BACKGROUND WORK
// ============================================================================

/// Access-stat flusher tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlushConfig {
    /// Bounded queue capacity; overflow drops updates with a warning
    pub queue_capacity: usize,
    /// Periodic flush interval (milliseconds)
    pub flush_interval_ms: u64,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 4096,
            flush_interval_ms: 500,
        }
    }
}

/// Consolidation/archival scheduler tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Light consolidation cadence (seconds; default hourly)
    pub light_interval_secs: u64,
    /// Full archival cadence (seconds; default daily)
    pub archival_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            light_interval_secs: 3_600,
            archival_interval_secs: 86_400,
        }
    }
}

// ============================================================================
// ENGINE CONFIG
// ============================================================================

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Activation scoring and working memory
    pub activation: ActivationConfig,
    /// Consolidation pipeline and archival
    pub consolidation: ConsolidationConfig,
    /// Hybrid search and reconsolidation
    pub semantic: SemanticConfig,
    /// Cascading recall
    pub recall: RecallConfig,
    /// Access-stat flusher
    pub flush: FlushConfig,
    /// Background schedulers
    pub scheduler: SchedulerConfig,
    /// Reader connection pool size
    pub reader_pool_size: usize,
}

impl EngineConfig {
    /// Default configuration with a given reader pool size
    pub fn with_readers(mut self, n: usize) -> Self {
        self.reader_pool_size = n.max(1);
        self
    }
}

// ============================================================================
// TESTS
// ============================================================================
