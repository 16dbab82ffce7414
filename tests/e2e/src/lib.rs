//! End-to-end test harness for the memory engine
//!
//! Builds a full `MemoryManager` over a temporary database with the
//! deterministic embedder, a zero grace period (so freshly recorded events
//! are immediately eligible for consolidation), and schedulers disabled.

pub mod mocks;

use std::path::PathBuf;
use std::sync::Arc;

use engram_core::{
    ConsolidationConfig, Embedding, EngineConfig, EventContext, EventInput, EventType, FlushConfig,
    ManagerOptions, MemoryManager, Outcome, Reasoner, SeededProvider,
};
use tempfile::TempDir;

/// Embedding dimensionality used across the e2e suite
pub const DIMS: usize = 32;

/// A manager over a throwaway database plus the ids tests need
pub struct TestEnv {
    pub manager: MemoryManager,
    pub project_id: String,
    pub db_path: PathBuf,
    _dir: TempDir,
}

/// Build the standard test environment
pub fn env() -> TestEnv {
    env_with(None)
}

/// Build the environment with an external reasoner attached
pub fn env_with_reasoner(reasoner: Arc<dyn Reasoner>) -> TestEnv {
    env_with(Some(reasoner))
}

fn env_with(reasoner: Option<Arc<dyn Reasoner>>) -> TestEnv {
    // One subscriber per process; later attempts are no-ops
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let dir = TempDir::new().expect("temp dir");
    let db_path = dir.path().join("engram.db");
    let config = EngineConfig {
        consolidation: ConsolidationConfig {
            grace_period_secs: 0,
            ..Default::default()
        },
        flush: FlushConfig {
            queue_capacity: 1024,
            flush_interval_ms: 10,
        },
        ..Default::default()
    };
    let manager = MemoryManager::new(ManagerOptions {
        db_path: Some(db_path.clone()),
        config,
        embedder: Some(Arc::new(SeededProvider::new(DIMS))),
        reasoner,
        start_schedulers: false,
    })
    .expect("manager");
    let project_id = manager.project("e2e", None).expect("project").id;
    TestEnv {
        manager,
        project_id,
        db_path,
        _dir: dir,
    }
}

/// Event input shorthand
pub fn event(session: &str, content: &str) -> EventInput {
    EventInput {
        session_id: session.into(),
        event_type: EventType::Action,
        content: content.into(),
        context: EventContext::default(),
        outcome: Outcome::Success,
        importance: 0.7,
        contextuality: 0.5,
        actionability: 0.5,
    }
}

/// A unit vector on the given axis with a small controlled jitter, for
/// tests that need cluster geometry independent of the seeded embedder.
pub fn axis_embedding(axis: usize, jitter: f32) -> Embedding {
    let mut v = vec![0.0_f32; DIMS];
    v[axis] = 1.0;
    v[(axis + 1) % DIMS] = jitter;
    let mut embedding = Embedding::new(v);
    embedding.normalize();
    embedding
}

/// Record an event and pin its embedding to a crafted vector
pub fn record_with_embedding(
    env: &TestEnv,
    input: &EventInput,
    embedding: &Embedding,
) -> String {
    let outcome = env
        .manager
        .record_event(&env.project_id, input)
        .expect("record event");
    env.manager
        .store()
        .event_set_embedding(outcome.id(), &env.project_id, embedding, "test-pinned")
        .expect("pin embedding");
    outcome.id().to_string()
}
