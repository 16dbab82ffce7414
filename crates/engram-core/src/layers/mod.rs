//! Memory layer services
//!
//! Thin, typed services over the store - one per cognitive layer. Each
//! exposes only what the manager and the recall engine need: searches,
//! lookups, access updates, and the layer's own writes. Hybrid search
//! itself is a store operation; layers orchestrate embedding, policy
//! (reconsolidation windows, dedup protocol), and deferred bookkeeping.

mod episodic;
mod graph;
mod meta;
mod procedural;
mod prospective;
mod semantic;

pub use episodic::{EpisodicLayer, ScoredEvent};
pub use graph::{GraphHit, GraphLayer};
pub use meta::{ExpertiseLevel, ExpertiseReport, MemoryHealth, MemoryStats, MetaLayer};
pub use procedural::ProceduralLayer;
pub use prospective::ProspectiveLayer;
pub use semantic::SemanticLayer;
