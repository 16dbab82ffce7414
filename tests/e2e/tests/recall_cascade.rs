//! Cascading recall: tier behavior, adaptive depth, caching

use engram_core::{
    EntityInput, EntityType, MemoryType, RecallItem, RecallRequest, RelationType, SemanticInput,
};
use engram_e2e::mocks::{EchoReasoner, UnavailableReasoner};
use engram_e2e::{env, env_with_reasoner, event, TestEnv};
use std::sync::Arc;

/// Seed a corpus across layers: a linked entity pair, an episodic event
/// back-linked to one of them, and a semantic principle.
fn seed(e2e: &TestEnv) {
    let auth = e2e
        .manager
        .create_entity(
            &e2e.project_id,
            &EntityInput {
                name: "auth-service".into(),
                entity_type: EntityType::Component,
                observations: vec!["owns login and token refresh".into()],
                importance: 0.8,
            },
        )
        .unwrap();
    let cache = e2e
        .manager
        .create_entity(
            &e2e.project_id,
            &EntityInput {
                name: "token-cache".into(),
                entity_type: EntityType::Component,
                observations: vec![],
                importance: 0.6,
            },
        )
        .unwrap();
    e2e.manager
        .create_relation(&e2e.project_id, &auth.id, &cache.id, RelationType::Uses)
        .unwrap();

    e2e.manager
        .record_event(
            &e2e.project_id,
            &event("s1", "fixed the auth-service login bug after the outage"),
        )
        .unwrap();

    e2e.manager
        .remember(
            &e2e.project_id,
            &SemanticInput {
                content: "always rotate auth tokens before expiry".into(),
                memory_type: MemoryType::Principle,
                tags: vec!["auth".into()],
                quality_score: 0.7,
                source_event_ids: vec![],
            },
        )
        .unwrap();
}

fn count_kind(response: &engram_core::RecallResponse, probe: fn(&RecallItem) -> bool) -> usize {
    response.results.iter().filter(|r| probe(&r.item)).count()
}

#[tokio::test]
async fn depth_one_skips_enrichment_depth_two_adds_it() {
    let e2e = env();
    seed(&e2e);

    let shallow = e2e
        .manager
        .recall(
            &e2e.project_id,
            &RecallRequest {
                query: "when did we last fix the auth-service login bug".into(),
                k: Some(10),
                cascade_depth: Some(1),
            },
        )
        .await
        .unwrap();
    assert_eq!(shallow.depth, 1);
    assert!(count_kind(&shallow, |i| matches!(i, RecallItem::Episodic { .. })) >= 1);
    assert_eq!(count_kind(&shallow, |i| matches!(i, RecallItem::Entity { .. })), 0);
    assert!(!shallow.synthesized);

    let enriched = e2e
        .manager
        .recall(
            &e2e.project_id,
            &RecallRequest {
                query: "when did we last fix the auth-service login bug".into(),
                k: Some(10),
                cascade_depth: Some(2),
            },
        )
        .await
        .unwrap();
    assert_eq!(enriched.depth, 2);
    assert!(count_kind(&enriched, |i| matches!(i, RecallItem::Episodic { .. })) >= 1);
    assert!(count_kind(&enriched, |i| matches!(i, RecallItem::Semantic { .. })) >= 1);
    // Graph expansion pulled in the connected entity via the event back-link
    let has_neighbor = enriched.results.iter().any(|r| match &r.item {
        RecallItem::Entity { entity } => entity.name == "token-cache",
        _ => false,
    });
    assert!(has_neighbor, "tier 2 should expand to connected entities");
    assert!(enriched.cognitive_load.is_some());

    e2e.manager.shutdown().await;
}

#[tokio::test]
async fn depth_three_synthesizes_with_citations() {
    let e2e = env_with_reasoner(Arc::new(EchoReasoner));
    seed(&e2e);

    let response = e2e
        .manager
        .recall(
            &e2e.project_id,
            &RecallRequest {
                query: "when did we last fix the auth-service login bug".into(),
                k: Some(10),
                cascade_depth: Some(3),
            },
        )
        .await
        .unwrap();
    assert!(response.synthesized);

    let answer = response
        .results
        .iter()
        .find_map(|r| match &r.item {
            RecallItem::Synthesized { answer } => Some(answer),
            _ => None,
        })
        .expect("a synthesized answer");
    assert!(answer.citations.iter().any(|(layer, _)| layer == "episodic"));
    assert!(answer.citations.iter().any(|(layer, _)| layer == "semantic"));

    e2e.manager.shutdown().await;
}

#[tokio::test]
async fn unavailable_reasoner_degrades_to_tier_two() {
    let e2e = env_with_reasoner(Arc::new(UnavailableReasoner));
    seed(&e2e);

    let response = e2e
        .manager
        .recall(
            &e2e.project_id,
            &RecallRequest {
                query: "recommend a strategy for the auth-service login bug".into(),
                k: Some(10),
                cascade_depth: Some(3),
            },
        )
        .await
        .unwrap();
    assert!(!response.synthesized);
    assert!(!response.results.is_empty());
    assert!(!response.partial, "reasoner loss is a degrade, not a failure");

    e2e.manager.shutdown().await;
}

#[tokio::test]
async fn adaptive_depth_follows_the_query() {
    let e2e = env();
    seed(&e2e);

    // Plain factual query, no session context: depth 1
    let factual = e2e
        .manager
        .recall(
            &e2e.project_id,
            &RecallRequest {
                query: "token rotation policy".into(),
                k: Some(5),
                cascade_depth: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(factual.depth, 1);

    // Session context present: depth 2
    e2e.manager.begin_session("s1");
    let contextual = e2e
        .manager
        .recall(
            &e2e.project_id,
            &RecallRequest {
                query: "token rotation policy".into(),
                k: Some(5),
                cascade_depth: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(contextual.depth, 2);

    // Planning markers: depth 3
    let planning = e2e
        .manager
        .recall(
            &e2e.project_id,
            &RecallRequest {
                query: "plan a strategy to decompose the auth migration".into(),
                k: Some(5),
                cascade_depth: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(planning.depth, 3);

    // Out-of-range explicit depth clamps
    let clamped = e2e
        .manager
        .recall(
            &e2e.project_id,
            &RecallRequest {
                query: "token rotation policy".into(),
                k: Some(5),
                cascade_depth: Some(9),
            },
        )
        .await
        .unwrap();
    assert_eq!(clamped.depth, 3);

    e2e.manager.shutdown().await;
}

#[tokio::test]
async fn cache_hits_within_ttl_and_invalidates_on_write() {
    let e2e = env();
    seed(&e2e);
    let request = RecallRequest {
        query: "when did we last fix the auth-service login bug".into(),
        k: Some(5),
        cascade_depth: Some(2),
    };

    let first = e2e.manager.recall(&e2e.project_id, &request).await.unwrap();
    assert!(!first.cache_hit);

    let second = e2e.manager.recall(&e2e.project_id, &request).await.unwrap();
    assert!(second.cache_hit);
    assert_eq!(first.results.len(), second.results.len());

    // Any layer write bumps the epoch and orphans the entry
    e2e.manager
        .record_event(&e2e.project_id, &event("s2", "a brand new observation"))
        .unwrap();
    let third = e2e.manager.recall(&e2e.project_id, &request).await.unwrap();
    assert!(!third.cache_hit);

    e2e.manager.shutdown().await;
}

#[tokio::test]
async fn k_zero_returns_empty_not_error() {
    let e2e = env();
    seed(&e2e);
    let response = e2e
        .manager
        .recall(
            &e2e.project_id,
            &RecallRequest {
                query: "anything at all".into(),
                k: Some(0),
                cascade_depth: Some(2),
            },
        )
        .await
        .unwrap();
    assert!(response.results.is_empty());
    e2e.manager.shutdown().await;
}

#[tokio::test]
async fn no_results_is_an_empty_response() {
    let e2e = env();
    let response = e2e
        .manager
        .recall(
            &e2e.project_id,
            &RecallRequest {
                query: "nothing matches this query".into(),
                k: Some(5),
                cascade_depth: Some(1),
            },
        )
        .await
        .unwrap();
    assert!(response.results.is_empty());
    assert!(!response.partial);
    e2e.manager.shutdown().await;
}
