//! Reconsolidation window: retrieval makes a memory briefly editable
//!
//! Policy fixed here: edits inside the window are accepted in place with
//! provenance preserved; edits after the window are rejected and require a
//! fresh consolidation cycle.

use chrono::{Duration, Utc};
use engram_core::{ConsolidationState, ErrorKind, MemoryType, SemanticInput};
use engram_e2e::env;

fn consolidated_memory(e2e: &engram_e2e::TestEnv) -> engram_core::SemanticMemory {
    let memory = e2e
        .manager
        .remember(
            &e2e.project_id,
            &SemanticInput {
                content: "retries must use exponential backoff".into(),
                memory_type: MemoryType::Principle,
                tags: vec!["resilience".into()],
                quality_score: 0.6,
                source_event_ids: vec!["evt-1".into(), "evt-2".into()],
            },
        )
        .unwrap();
    let store = e2e.manager.store();
    store
        .semantic_set_state(&memory.id, ConsolidationState::Consolidating)
        .unwrap();
    store
        .semantic_set_state(&memory.id, ConsolidationState::Consolidated)
        .unwrap();
    store.semantic_get(&memory.id).unwrap().unwrap()
}

#[tokio::test]
async fn edit_inside_window_is_accepted_with_provenance() {
    let e2e = env();
    let memory = consolidated_memory(&e2e);

    // Retrieved half an hour ago: the window (1h default) is open
    e2e.manager
        .store()
        .semantic_record_retrieval(&memory.id, Utc::now() - Duration::minutes(30))
        .unwrap();

    let updated = e2e
        .manager
        .update_memory(&memory.id, "retries must use exponential backoff with jitter")
        .unwrap();
    assert_eq!(updated.content, "retries must use exponential backoff with jitter");
    assert_eq!(
        updated.source_event_ids,
        vec!["evt-1".to_string(), "evt-2".to_string()]
    );

    e2e.manager.shutdown().await;
}

#[tokio::test]
async fn edit_after_window_is_rejected() {
    let e2e = env();
    let memory = consolidated_memory(&e2e);

    // Retrieved two hours ago: window closed
    e2e.manager
        .store()
        .semantic_record_retrieval(&memory.id, Utc::now() - Duration::hours(2))
        .unwrap();

    let err = e2e
        .manager
        .update_memory(&memory.id, "late edit")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    // The content is untouched
    let unchanged = e2e.manager.store().semantic_get(&memory.id).unwrap().unwrap();
    assert_eq!(unchanged.content, "retries must use exponential backoff");

    e2e.manager.shutdown().await;
}

#[tokio::test]
async fn never_retrieved_consolidated_memory_rejects_edits() {
    let e2e = env();
    let memory = consolidated_memory(&e2e);
    let err = e2e
        .manager
        .update_memory(&memory.id, "no window was ever opened")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    e2e.manager.shutdown().await;
}

#[tokio::test]
async fn expired_windows_close_on_maintenance() {
    let e2e = env();
    let memory = consolidated_memory(&e2e);
    let store = e2e.manager.store();

    store
        .semantic_record_retrieval(&memory.id, Utc::now() - Duration::hours(2))
        .unwrap();
    assert_eq!(
        store.semantic_get(&memory.id).unwrap().unwrap().consolidation_state,
        ConsolidationState::Reconsolidating
    );

    // Consolidation runs carry the window maintenance with them
    e2e.manager
        .run_consolidation(&e2e.project_id, None, false)
        .await
        .unwrap();
    assert_eq!(
        store.semantic_get(&memory.id).unwrap().unwrap().consolidation_state,
        ConsolidationState::Consolidated
    );

    e2e.manager.shutdown().await;
}
