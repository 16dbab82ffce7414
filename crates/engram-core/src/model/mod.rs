//! Data model - the entities shared by every memory layer
//!
//! All enums here are closed vocabularies persisted as lowercase text;
//! lifecycle and consolidation-state transitions are validated in the types
//! themselves so the store and the pipelines share one rule set.

mod event;
mod graph;
mod procedure;
mod prospective;
mod records;
mod semantic;

pub use event::{
    EpisodicEvent, EventContext, EventFilter, EventInput, EventOrder, EventType, LifecycleStatus,
    Outcome, RecordOutcome,
};
pub use graph::{Entity, EntityInput, EntityType, Relation, RelationType};
pub use procedure::{Procedure, ProcedureInput, ProcedureStep};
pub use prospective::{
    Goal, GoalInput, GoalStatus, Task, TaskDependency, TaskInput, TaskStatus, TaskUpdate,
};
pub use records::{ConsolidationRunRecord, EstimateAccuracyRecord, Project};
pub use semantic::{
    ConsolidationState, MemoryType, SemanticInput, SemanticMemory,
};
