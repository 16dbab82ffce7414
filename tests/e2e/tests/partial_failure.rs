//! Fail-soft recall: a broken layer degrades the response, never kills it

use engram_core::{
    EntityInput, EntityType, Layer, MemoryType, RecallItem, RecallRequest, SemanticInput,
};
use engram_e2e::{env, event};

#[tokio::test]
async fn graph_layer_failure_yields_partial_response() {
    let e2e = env();

    e2e.manager
        .create_entity(
            &e2e.project_id,
            &EntityInput {
                name: "auth-service".into(),
                entity_type: EntityType::Component,
                observations: vec!["owns login".into()],
                importance: 0.8,
            },
        )
        .unwrap();
    e2e.manager
        .record_event(
            &e2e.project_id,
            &event("s1", "investigated the auth-service dependency break"),
        )
        .unwrap();
    e2e.manager
        .remember(
            &e2e.project_id,
            &SemanticInput {
                content: "auth-service outages usually trace to the token cache".into(),
                memory_type: MemoryType::Fact,
                tags: vec!["auth".into()],
                quality_score: 0.6,
                source_event_ids: vec![],
            },
        )
        .unwrap();

    // Break the graph layer out from under the engine
    let saboteur = rusqlite::Connection::open(&e2e.db_path).unwrap();
    saboteur.execute_batch("DROP TABLE entity_relations;").unwrap();
    drop(saboteur);

    let response = e2e
        .manager
        .recall(
            &e2e.project_id,
            &RecallRequest {
                query: "when did the auth-service dependency break".into(),
                k: Some(10),
                cascade_depth: Some(2),
            },
        )
        .await
        .unwrap();

    assert!(response.partial);
    assert_eq!(response.failed_layers, vec![Layer::Graph]);

    // The healthy layers still delivered their slices
    assert!(response
        .results
        .iter()
        .any(|r| matches!(r.item, RecallItem::Episodic { .. })));
    assert!(response
        .results
        .iter()
        .any(|r| matches!(r.item, RecallItem::Semantic { .. })));
    assert!(!response
        .results
        .iter()
        .any(|r| matches!(r.item, RecallItem::Entity { .. })));

    e2e.manager.shutdown().await;
}

#[tokio::test]
async fn healthy_layers_alone_are_not_partial() {
    let e2e = env();
    e2e.manager
        .record_event(&e2e.project_id, &event("s1", "a perfectly normal event"))
        .unwrap();

    let response = e2e
        .manager
        .recall(
            &e2e.project_id,
            &RecallRequest {
                query: "when did the normal event happen".into(),
                k: Some(5),
                cascade_depth: Some(2),
            },
        )
        .await
        .unwrap();
    assert!(!response.partial);
    assert!(response.failed_layers.is_empty());
    e2e.manager.shutdown().await;
}
