//! Working-memory selection: recency and frequency outweigh raw importance

use chrono::{Duration, Utc};
use engram_e2e::{env, event};

#[tokio::test]
async fn rehearsed_events_beat_important_but_stale_ones() {
    let e2e = env();
    let store = e2e.manager.store();
    let t0 = Utc::now() - Duration::hours(3);
    let t2 = t0 + Duration::hours(2);

    // Three events recorded at t0: one important, two mediocre
    let mut important = event("s1", "the big launch decision");
    important.importance = 0.9;
    let mut mediocre_a = event("s1", "tweaked a log line");
    mediocre_a.importance = 0.5;
    let mut mediocre_b = event("s1", "renamed a variable");
    mediocre_b.importance = 0.5;

    let important_id = store
        .event_insert(&e2e.project_id, &important, &important.content_hash(), None, t0)
        .unwrap()
        .id;
    let a_id = store
        .event_insert(&e2e.project_id, &mediocre_a, &mediocre_a.content_hash(), None, t0)
        .unwrap()
        .id;
    let b_id = store
        .event_insert(&e2e.project_id, &mediocre_b, &mediocre_b.content_hash(), None, t0)
        .unwrap()
        .id;

    // At t0+2h the two mediocre events are each retrieved once
    store.event_update_access(&a_id, t2, 1).unwrap();
    store.event_update_access(&b_id, t2, 1).unwrap();

    // At t0+3h the rehearsed pair occupies the top working-memory slots
    let working = e2e.manager.get_working_memory(&e2e.project_id, Some(5)).unwrap();
    let top_two: Vec<&str> = working.iter().take(2).map(|i| i.event.id.as_str()).collect();
    assert!(top_two.contains(&a_id.as_str()), "rehearsed event a should rank");
    assert!(top_two.contains(&b_id.as_str()), "rehearsed event b should rank");
    assert_eq!(working[2].event.id, important_id);

    e2e.manager.shutdown().await;
}

#[tokio::test]
async fn working_memory_is_empty_without_active_events() {
    let e2e = env();
    let working = e2e.manager.get_working_memory(&e2e.project_id, None).unwrap();
    assert!(working.is_empty());
    e2e.manager.shutdown().await;
}

#[tokio::test]
async fn consolidated_events_leave_working_memory() {
    let e2e = env();
    let outcome = e2e
        .manager
        .record_event(&e2e.project_id, &event("s1", "soon to be consolidated"))
        .unwrap();
    assert_eq!(e2e.manager.get_working_memory(&e2e.project_id, None).unwrap().len(), 1);

    e2e.manager
        .store()
        .event_update_lifecycle(
            outcome.id(),
            engram_core::LifecycleStatus::Consolidated,
            0.8,
        )
        .unwrap();
    assert!(e2e.manager.get_working_memory(&e2e.project_id, None).unwrap().is_empty());
    e2e.manager.shutdown().await;
}
