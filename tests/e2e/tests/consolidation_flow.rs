//! Consolidation end-to-end: similar events become one semantic pattern

use engram_core::{
    ConsolidationState, EventFilter, LifecycleStatus, RunStatus, SemanticFilter,
};
use engram_e2e::{axis_embedding, env, env_with_reasoner, event, record_with_embedding};
use engram_e2e::mocks::UnavailableReasoner;
use std::sync::Arc;

#[tokio::test]
async fn similar_events_promote_into_one_pattern() {
    let e2e = env();

    // Four near-identical experiences in one session
    let ids: Vec<String> = (0..4)
        .map(|i| {
            record_with_embedding(
                &e2e,
                &event("s1", &format!("integration suite run number {}", i)),
                &axis_embedding(0, 0.02 * i as f32),
            )
        })
        .collect();

    let report = e2e
        .manager
        .run_consolidation(&e2e.project_id, None, false)
        .await
        .unwrap();
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.record.patterns_extracted, 1);
    assert_eq!(report.record.events_promoted, 4);

    // All sources transitioned with the cluster confidence
    for id in &ids {
        let source = e2e.manager.store().event_get(id).unwrap().unwrap();
        assert_eq!(source.lifecycle_status, LifecycleStatus::Consolidated);
        assert!(source.consolidation_score >= 0.7);
    }

    // Exactly one consolidated memory carrying full provenance
    let hits = e2e
        .manager
        .search_memories(&e2e.project_id, "integration suite", 10, &SemanticFilter::default())
        .unwrap();
    assert_eq!(hits.len(), 1);
    let memory = &hits[0].memory;
    assert_eq!(memory.consolidation_state, ConsolidationState::Consolidated);
    assert!(memory.quality_score >= 0.7);
    for id in &ids {
        assert!(memory.source_event_ids.contains(id));
    }

    // Re-running with no new events is a no-op
    let rerun = e2e
        .manager
        .run_consolidation(&e2e.project_id, None, false)
        .await
        .unwrap();
    assert_eq!(rerun.record.patterns_extracted, 0);
    assert_eq!(rerun.record.events_promoted, 0);

    e2e.manager.shutdown().await;
}

#[tokio::test]
async fn consolidated_events_stay_visible_to_queries() {
    let e2e = env();
    for i in 0..3 {
        record_with_embedding(
            &e2e,
            &event("s1", &format!("cache invalidation mishap {}", i)),
            &axis_embedding(2, 0.02 * i as f32),
        );
    }
    e2e.manager
        .run_consolidation(&e2e.project_id, None, false)
        .await
        .unwrap();

    // Default event queries still return consolidated events (only
    // archived rows disappear)
    let events = e2e
        .manager
        .recall_events(&e2e.project_id, "", &EventFilter::default(), 10)
        .unwrap();
    assert_eq!(events.len(), 3);
    e2e.manager.shutdown().await;
}

#[tokio::test]
async fn unavailable_reasoner_leaves_low_confidence_clusters_active() {
    let e2e = env_with_reasoner(Arc::new(UnavailableReasoner));

    // Mixed outcomes drag agreement (and so confidence) below the quality
    // strategy's validation threshold
    for i in 0..4 {
        let mut input = event("s1", &format!("flaky deploy attempt {}", i));
        input.importance = 0.2;
        input.outcome = if i % 2 == 0 {
            engram_core::Outcome::Success
        } else {
            engram_core::Outcome::Failure
        };
        record_with_embedding(&e2e, &input, &axis_embedding(0, 0.1 * i as f32));
    }

    let report = e2e
        .manager
        .run_consolidation(
            &e2e.project_id,
            Some(engram_core::ConsolidationStrategy::Quality),
            false,
        )
        .await
        .unwrap();
    assert_eq!(report.record.patterns_extracted, 0);

    let events = e2e
        .manager
        .recall_events(&e2e.project_id, "", &EventFilter::default(), 10)
        .unwrap();
    assert!(events
        .iter()
        .all(|r| r.event.lifecycle_status == LifecycleStatus::Active));
    e2e.manager.shutdown().await;
}

#[tokio::test]
async fn concurrent_triggers_coalesce() {
    let e2e = env();
    for i in 0..4 {
        record_with_embedding(
            &e2e,
            &event("s1", &format!("parallel trigger event {}", i)),
            &axis_embedding(0, 0.02 * i as f32),
        );
    }

    let first = e2e.manager.run_consolidation(&e2e.project_id, None, false);
    let second = e2e.manager.run_consolidation(&e2e.project_id, None, false);
    let (first, second) = tokio::join!(first, second);
    let statuses = [first.unwrap().status, second.unwrap().status];
    // One run does the work; if they overlapped, the loser coalesced
    assert!(statuses.contains(&RunStatus::Completed));

    let rerun = e2e
        .manager
        .run_consolidation(&e2e.project_id, None, false)
        .await
        .unwrap();
    assert_eq!(rerun.record.patterns_extracted, 0);
    e2e.manager.shutdown().await;
}
