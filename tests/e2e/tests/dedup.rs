//! Recording the same experience twice must dedup by content hash

use engram_core::{EventFilter, RecordOutcome};
use engram_e2e::{env, event};

#[tokio::test]
async fn identical_payload_returns_existing_id() {
    let e2e = env();

    let first = e2e
        .manager
        .record_event(&e2e.project_id, &event("s1", "ran pytest"))
        .unwrap();
    let RecordOutcome::Stored { id } = &first else {
        panic!("first record should store");
    };

    let second = e2e
        .manager
        .record_event(&e2e.project_id, &event("s1", "ran pytest"))
        .unwrap();
    assert_eq!(second, RecordOutcome::Duplicate { id: id.clone() });

    // Row count unchanged
    let events = e2e
        .manager
        .recall_events(
            &e2e.project_id,
            "",
            &EventFilter {
                session_id: Some("s1".into()),
                ..Default::default()
            },
            10,
        )
        .unwrap();
    assert_eq!(events.len(), 1);

    e2e.manager.shutdown().await;
}

#[tokio::test]
async fn cosmetic_whitespace_still_collides() {
    let e2e = env();
    let first = e2e
        .manager
        .record_event(&e2e.project_id, &event("s1", "deployed  the\nservice"))
        .unwrap();
    let second = e2e
        .manager
        .record_event(&e2e.project_id, &event("s1", "deployed the service"))
        .unwrap();
    assert!(second.is_duplicate());
    assert_eq!(first.id(), second.id());
    e2e.manager.shutdown().await;
}

#[tokio::test]
async fn different_session_is_a_new_event() {
    let e2e = env();
    let first = e2e
        .manager
        .record_event(&e2e.project_id, &event("s1", "ran pytest"))
        .unwrap();
    let second = e2e
        .manager
        .record_event(&e2e.project_id, &event("s2", "ran pytest"))
        .unwrap();
    assert!(!second.is_duplicate());
    assert_ne!(first.id(), second.id());
    e2e.manager.shutdown().await;
}
