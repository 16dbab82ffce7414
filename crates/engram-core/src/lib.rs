//! # Engram Core
//!
//! Persistent, multi-layer cognitive memory engine for long-running agents.
//! Experiential events stream into eight interacting layers modeled on
//! human cognition, and queries are answered by fusing those layers
//! through a cascaded recall pipeline:
//!
//! - **Episodic**: append-only event log with dedup hashing, session
//!   grouping, lifecycle states, and replay cursors
//! - **Semantic**: consolidated knowledge with embeddings and hybrid
//!   (vector + FTS5 keyword) search
//! - **Procedural**: reusable workflows with effectiveness tracking
//! - **Prospective**: tasks, goals, and acyclic dependency graphs
//! - **Knowledge graph**: typed entities and directed relations
//! - **Meta**: quality, expertise, cognitive load, memory health
//! - **Consolidation**: sleep-inspired clustering that promotes stable
//!   episodic patterns into semantic memories
//! - **Retrieval**: the three-tier cascading recall engine
//!
//! Activation follows an ACT-R-style score (recency x frequency plus
//! intrinsic signals) and bounds working memory at Miller's 7±2 slots.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use engram_core::{EventInput, ManagerOptions, MemoryManager, RecallRequest};
//!
//! # #[tokio::main]
//! # async fn main() -> engram_core::Result<()> {
//! let manager = MemoryManager::new(ManagerOptions::default())?;
//! let project = manager.project("my-agent", None)?;
//!
//! manager.record_event(
//!     &project.id,
//!     &EventInput {
//!         session_id: "session-1".into(),
//!         content: "fixed the auth token refresh race".into(),
//!         ..Default::default()
//!     },
//! )?;
//!
//! let response = manager
//!     .recall(
//!         &project.id,
//!         &RecallRequest {
//!             query: "when did we fix the auth race".into(),
//!             k: Some(5),
//!             cascade_depth: None,
//!         },
//!     )
//!     .await?;
//! println!("{} results", response.results.len());
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod activation;
pub mod config;
pub mod consolidation;
pub mod embeddings;
pub mod error;
pub mod flush;
pub mod layers;
pub mod manager;
pub mod model;
pub mod reasoner;
pub mod recall;
pub mod search;
pub mod store;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Errors
pub use error::{EngineError, ErrorKind, Result};

// Configuration
pub use config::{
    ActivationConfig, ConsolidationConfig, ConsolidationStrategy, EngineConfig, FlushConfig,
    RecallConfig, SchedulerConfig, SemanticConfig,
};

// Data model
pub use model::{
    ConsolidationRunRecord, ConsolidationState, Entity, EntityInput, EntityType, EpisodicEvent,
    EstimateAccuracyRecord, EventContext, EventFilter, EventInput, EventOrder, EventType, Goal,
    GoalInput, GoalStatus, LifecycleStatus, MemoryType, Outcome, Procedure, ProcedureInput,
    ProcedureStep, Project, RecordOutcome, Relation, RelationType, SemanticInput, SemanticMemory,
    Task, TaskDependency, TaskInput, TaskStatus, TaskUpdate,
};

// Storage
pub use store::{SemanticFilter, SemanticHit, Store};

// Embeddings
pub use embeddings::{
    cosine_similarity, CachedProvider, Embedding, EmbeddingProvider, SeededProvider,
    DEFAULT_DIMENSIONS,
};
#[cfg(feature = "embeddings")]
pub use embeddings::FastembedProvider;

// Activation & working memory
pub use activation::{ActivatedEvent, ActivationEngine};

// Layers
pub use layers::{
    EpisodicLayer, ExpertiseLevel, ExpertiseReport, GraphHit, GraphLayer, MemoryHealth,
    MemoryStats, MetaLayer, ProceduralLayer, ProspectiveLayer, ScoredEvent, SemanticLayer,
};

// Consolidation
pub use consolidation::{ConsolidationReport, Consolidator, RunOptions, RunStatus};

// Cascading recall
pub use recall::{
    classify, Classification, Layer, RecallEngine, RecallItem, RecallRequest, RecallResponse,
    ScoredRecall, SessionSnapshot,
};

// External reasoner contract
pub use reasoner::{
    ClusterSummary, ContextSnippet, Reasoner, SynthesizedAnswer, ValidationVerdict,
};

// Manager façade
pub use manager::{ManagerOptions, MemoryManager};

// Background flushing
pub use flush::{AccessFlusher, AccessUpdate, FlushHandle};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        ConsolidationStrategy, EngineConfig, EngineError, EventFilter, EventInput, EventType,
        ManagerOptions, MemoryManager, Outcome, RecallRequest, RecallResponse, RecordOutcome,
        Result, SemanticInput, SessionSnapshot, Store, TaskInput, TaskUpdate,
    };
}
