//! The consolidation pipeline
//!
//! Stages: queue build (session- and type-grouped), clustering, feature
//! extraction, conditional reasoner validation, transactional promotion,
//! and an optional archival pass. Each cluster commits independently so a
//! deadline or a bad cluster never poisons the rest of the run, and
//! re-running over the same events is a no-op: consolidated events fall
//! out of the queue and duplicate patterns merge instead of inserting.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::clustering;
use crate::config::{ConsolidationConfig, ConsolidationStrategy};
use crate::embeddings::{Embedding, EmbeddingProvider};
use crate::error::{EngineError, ErrorKind, Result};
use crate::model::{
    ConsolidationRunRecord, ConsolidationState, EpisodicEvent, LifecycleStatus, MemoryType,
    Outcome, SemanticMemory,
};
use crate::reasoner::{ClusterSummary, Reasoner};
use crate::store::{
    event_update_lifecycle_tx, new_run_record, semantic_insert_tx, semantic_merge_tx,
    semantic_set_state_tx, Store,
};

// ============================================================================
// RUN TYPES
// ============================================================================

/// Per-run options
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Strategy override; defaults to the configured strategy
    pub strategy: Option<ConsolidationStrategy>,
    /// Whether to run the archival pass in the same job
    pub archive: bool,
}

/// How the run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// All eligible clusters were processed
    Completed,
    /// Another run for the project was already in flight; nothing was done
    AlreadyRunning,
    /// The job deadline passed; completed clusters are committed
    DeadlinePartial,
}

/// Outcome of one consolidation run
#[derive(Debug, Clone)]
pub struct ConsolidationReport {
    /// How the run ended
    pub status: RunStatus,
    /// The persisted run summary (empty for `AlreadyRunning`)
    pub record: ConsolidationRunRecord,
}

/// Features extracted from one cluster
struct ClusterFeatures {
    centroid: Vec<f32>,
    representative: EpisodicEvent,
    tags: Vec<String>,
    modal_outcome: Outcome,
    outcome_agreement: f64,
    span: (DateTime<Utc>, DateTime<Utc>),
    source_event_ids: Vec<String>,
    cohesion: f64,
    confidence: f64,
}

enum PromotionOutcome {
    Inserted(String),
    Merged(String),
}

// ============================================================================
// CONSOLIDATOR
// ============================================================================

/// Runs the consolidation pipeline for one store
pub struct Consolidator {
    store: Arc<Store>,
    embedder: Arc<dyn EmbeddingProvider>,
    reasoner: Option<Arc<dyn Reasoner>>,
    config: ConsolidationConfig,
    /// Projects with a run in flight; concurrent triggers coalesce
    running: Mutex<HashSet<String>>,
}

/// Removes the project from the running set when the run ends
struct RunningGuard<'a> {
    running: &'a Mutex<HashSet<String>>,
    project_id: String,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.running.lock() {
            set.remove(&self.project_id);
        }
    }
}

impl Consolidator {
    /// Create a consolidator
    pub fn new(
        store: Arc<Store>,
        embedder: Arc<dyn EmbeddingProvider>,
        reasoner: Option<Arc<dyn Reasoner>>,
        config: ConsolidationConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            reasoner,
            config,
            running: Mutex::new(HashSet::new()),
        }
    }

    /// Current configuration
    pub fn config(&self) -> &ConsolidationConfig {
        &self.config
    }

    /// Run consolidation for a project. At most one run per project at a
    /// time; a second trigger returns `AlreadyRunning` without touching
    /// the store.
    pub fn run(&self, project_id: &str, options: &RunOptions) -> Result<ConsolidationReport> {
        {
            let mut running = self
                .running
                .lock()
                .map_err(|_| EngineError::Internal("running set lock poisoned".to_string()))?;
            if !running.insert(project_id.to_string()) {
                debug!(project_id, "consolidation already running, coalescing");
                return Ok(ConsolidationReport {
                    status: RunStatus::AlreadyRunning,
                    record: new_run_record(project_id, "coalesced", Utc::now()),
                });
            }
        }
        let _guard = RunningGuard {
            running: &self.running,
            project_id: project_id.to_string(),
        };

        let strategy = options.strategy.unwrap_or(self.config.strategy);
        let started_at = Utc::now();
        let deadline = Instant::now() + std::time::Duration::from_secs(self.config.job_deadline_secs);
        let mut record = new_run_record(project_id, strategy.as_str(), started_at);
        let mut status = RunStatus::Completed;

        // Stage 1: queue build, grouped by session then event type
        let events = self.store.events_for_consolidation(
            project_id,
            self.config.grace_period_secs,
            self.config.batch_limit,
            started_at,
        )?;
        record.events_scanned = events.len() as i64;

        let mut groups: BTreeMap<(String, String), Vec<EpisodicEvent>> = BTreeMap::new();
        for event in events {
            groups
                .entry((event.session_id.clone(), event.event_type.as_str().to_string()))
                .or_default()
                .push(event);
        }

        'groups: for ((session_id, event_type), group) in groups {
            if group.len() < strategy.min_cluster_size() {
                continue;
            }

            // Hydrate embeddings; rows without one were filtered by the query
            // but a racing delete could still drop them.
            let mut members: Vec<EpisodicEvent> = Vec::with_capacity(group.len());
            let mut embeddings: Vec<Vec<f32>> = Vec::with_capacity(group.len());
            for event in group {
                match self.store.event_embedding(&event.id)? {
                    Some(embedding) if embedding.dimensions == self.store.dimensions() => {
                        members.push(event);
                        embeddings.push(embedding.vector);
                    }
                    _ => {}
                }
            }
            if members.len() < strategy.min_cluster_size() {
                continue;
            }

            // Stage 2: clustering
            let matrix = clustering::distance_matrix(&embeddings);
            let clusters =
                clustering::agglomerative_cluster(&embeddings, strategy.cluster_distance_max());

            for cluster in clusters {
                if cluster.len() < strategy.min_cluster_size() {
                    continue;
                }
                if Instant::now() >= deadline {
                    warn!(project_id, "consolidation deadline reached, committing partial run");
                    record
                        .errors
                        .push("job deadline reached; remaining clusters deferred".to_string());
                    status = RunStatus::DeadlinePartial;
                    break 'groups;
                }

                // Stages 3-5 per cluster; one bad cluster never fails the run
                match self.process_cluster(project_id, &members, &embeddings, &cluster, &matrix, strategy)
                {
                    Ok(Some(promoted)) => {
                        record.patterns_extracted += 1;
                        record.events_promoted += cluster.len() as i64;
                        debug!(
                            project_id,
                            session_id,
                            event_type,
                            events = cluster.len(),
                            memory_id = %promoted,
                            "cluster promoted"
                        );
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(project_id, error = %e, "cluster failed, continuing run");
                        record.errors.push(format!(
                            "cluster of {} {} events in {}: {}",
                            cluster.len(),
                            event_type,
                            session_id,
                            e
                        ));
                    }
                }
            }
        }

        // Stage 6: archival pass
        if options.archive && status != RunStatus::DeadlinePartial {
            let cutoff = started_at - chrono::Duration::days(self.config.archive_after_days);
            record.events_archived = self.store.event_archive_pass(
                project_id,
                cutoff,
                self.config.archive_importance_below,
            )? as i64;
        }

        record.finished_at = Utc::now();
        self.store.consolidation_run_insert(&record)?;
        info!(
            project_id,
            scanned = record.events_scanned,
            patterns = record.patterns_extracted,
            promoted = record.events_promoted,
            archived = record.events_archived,
            errors = record.errors.len(),
            "consolidation run finished"
        );
        Ok(ConsolidationReport { status, record })
    }

    // ========================================================================
    // PER-CLUSTER STAGES
    // ========================================================================

    /// Feature extraction, validation, and promotion for one cluster.
    /// Returns the promoted (or merged-into) memory id, or None when the
    /// cluster was skipped by validation.
    fn process_cluster(
        &self,
        project_id: &str,
        members: &[EpisodicEvent],
        embeddings: &[Vec<f32>],
        cluster: &[usize],
        matrix: &[Vec<f32>],
        strategy: ConsolidationStrategy,
    ) -> Result<Option<String>> {
        let features = extract_features(members, embeddings, cluster, matrix);
        debug!(
            events = cluster.len(),
            cohesion = features.cohesion,
            confidence = features.confidence,
            "cluster features extracted"
        );

        // Stage 4: conditional reasoner validation
        let (pattern_text, memory_type, confidence) =
            if features.confidence < strategy.llm_validation_threshold() {
                let Some(reasoner) = &self.reasoner else {
                    debug!(
                        confidence = features.confidence,
                        "low-confidence cluster skipped: no reasoner configured"
                    );
                    return Ok(None);
                };
                let summary = ClusterSummary {
                    representative_content: features.representative.content.clone(),
                    event_count: features.source_event_ids.len(),
                    modal_outcome: features.modal_outcome,
                    outcome_agreement: features.outcome_agreement,
                    tags: features.tags.clone(),
                    span_start: features.span.0,
                    span_end: features.span.1,
                    initial_confidence: features.confidence,
                };
                match reasoner.validate(&summary) {
                    Ok(verdict) if verdict.accept => (
                        verdict
                            .pattern_text
                            .unwrap_or_else(|| features.representative.content.clone()),
                        verdict.memory_type,
                        verdict.confidence.clamp(0.0, 1.0),
                    ),
                    Ok(_) => {
                        debug!("cluster rejected by reasoner");
                        return Ok(None);
                    }
                    Err(e) if e.kind() == ErrorKind::Unavailable => {
                        debug!("reasoner unavailable, cluster left for a later run");
                        return Ok(None);
                    }
                    Err(e) => return Err(e),
                }
            } else {
                (
                    features.representative.content.clone(),
                    MemoryType::Pattern,
                    features.confidence,
                )
            };

        // Stage 5: transactional promotion (with pattern dedup)
        let outcome = self.promote(project_id, &features, pattern_text, memory_type, confidence)?;
        let memory_id = match outcome {
            PromotionOutcome::Inserted(id) => {
                let embedding = Embedding::new(features.centroid.clone());
                self.store.semantic_set_embedding(
                    &id,
                    project_id,
                    &embedding,
                    self.embedder.model_id(),
                )?;
                id
            }
            PromotionOutcome::Merged(id) => id,
        };
        self.store.bump_epoch(project_id);
        Ok(Some(memory_id))
    }

    /// Insert-or-merge plus source-event lifecycle transitions, atomically.
    fn promote(
        &self,
        project_id: &str,
        features: &ClusterFeatures,
        pattern_text: String,
        memory_type: MemoryType,
        confidence: f64,
    ) -> Result<PromotionOutcome> {
        // Dedup against existing patterns: high similarity plus any tag
        // overlap means merge, never a duplicate row. Protected memories
        // (quality >= protection threshold) only ever take the merge path.
        let similar = self.store.semantic_find_similar(
            project_id,
            &features.centroid,
            self.config.pattern_merge_similarity,
            5,
        )?;
        let merge_target = similar
            .into_iter()
            .find(|(memory, _)| features.tags.iter().any(|t| memory.tags.contains(t)));

        let now = Utc::now();
        match merge_target {
            Some((memory, similarity)) => {
                debug!(memory_id = %memory.id, similarity, "merging cluster into existing pattern");
                self.store.transaction(|tx| {
                    semantic_merge_tx(tx, &memory.id, &features.source_event_ids, confidence)?;
                    for event_id in &features.source_event_ids {
                        event_update_lifecycle_tx(
                            tx,
                            event_id,
                            LifecycleStatus::Consolidated,
                            confidence,
                            now,
                        )?;
                    }
                    Ok(())
                })?;
                Ok(PromotionOutcome::Merged(memory.id))
            }
            None => {
                let memory = SemanticMemory {
                    id: uuid::Uuid::new_v4().to_string(),
                    project_id: project_id.to_string(),
                    content: pattern_text,
                    embedding: None,
                    embedding_model: Some(self.embedder.model_id().to_string()),
                    memory_type,
                    tags: features.tags.clone(),
                    quality_score: confidence,
                    source_event_ids: features.source_event_ids.clone(),
                    created_at: now,
                    updated_at: now,
                    access_count: 0,
                    consolidation_state: ConsolidationState::Consolidating,
                    last_retrieved_at: None,
                };
                self.store.transaction(|tx| {
                    semantic_insert_tx(tx, &memory)?;
                    semantic_set_state_tx(tx, &memory.id, ConsolidationState::Consolidated)?;
                    for event_id in &features.source_event_ids {
                        event_update_lifecycle_tx(
                            tx,
                            event_id,
                            LifecycleStatus::Consolidated,
                            confidence,
                            now,
                        )?;
                    }
                    Ok(())
                })?;
                Ok(PromotionOutcome::Inserted(memory.id))
            }
        }
    }
}

// ============================================================================
// FEATURE EXTRACTION
// ============================================================================

/// Stage 3: derive the cluster's centroid, representative, tags, outcome
/// distribution, span, and initial confidence.
fn extract_features(
    members: &[EpisodicEvent],
    embeddings: &[Vec<f32>],
    cluster: &[usize],
    matrix: &[Vec<f32>],
) -> ClusterFeatures {
    let representative = cluster
        .iter()
        .map(|&i| &members[i])
        .max_by(|a, b| {
            a.importance
                .partial_cmp(&b.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .expect("cluster is non-empty")
        .clone();

    let mut tags: Vec<String> = Vec::new();
    for &i in cluster {
        let event = &members[i];
        let mut push = |tag: String| {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        };
        push(event.event_type.as_str().to_string());
        if let Some(phase) = &event.context.phase {
            push(phase.to_lowercase());
        }
    }

    let mut outcome_counts: BTreeMap<&'static str, (Outcome, usize)> = BTreeMap::new();
    for &i in cluster {
        let outcome = members[i].outcome;
        outcome_counts
            .entry(outcome.as_str())
            .and_modify(|(_, n)| *n += 1)
            .or_insert((outcome, 1));
    }
    let (modal_outcome, modal_count) = outcome_counts
        .values()
        .max_by_key(|(_, n)| *n)
        .map(|(o, n)| (*o, *n))
        .unwrap_or((Outcome::Unknown, 0));
    let outcome_agreement = modal_count as f64 / cluster.len() as f64;

    let span_start = cluster
        .iter()
        .map(|&i| members[i].timestamp)
        .min()
        .unwrap_or(representative.timestamp);
    let span_end = cluster
        .iter()
        .map(|&i| members[i].timestamp)
        .max()
        .unwrap_or(representative.timestamp);

    let cohesion = 1.0 - clustering::mean_pairwise_distance(cluster, matrix) as f64;
    let importance_mean =
        cluster.iter().map(|&i| members[i].importance).sum::<f64>() / cluster.len() as f64;
    let confidence =
        (0.5 * cohesion + 0.3 * outcome_agreement + 0.2 * importance_mean).clamp(0.0, 1.0);

    ClusterFeatures {
        centroid: clustering::centroid(cluster, embeddings),
        representative,
        tags,
        modal_outcome,
        outcome_agreement,
        span: (span_start, span_end),
        source_event_ids: cluster.iter().map(|&i| members[i].id.clone()).collect(),
        cohesion,
        confidence,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::SeededProvider;
    use crate::model::{EventContext, EventFilter, EventInput, EventType};
    use crate::store::test_util::test_store;
    use tempfile::TempDir;

    fn setup(config: ConsolidationConfig) -> (Arc<Store>, Consolidator, String, TempDir) {
        let (store, dir) = test_store();
        let project = store.project_upsert("p", None).unwrap();
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(SeededProvider::new(32));
        let consolidator = Consolidator::new(store.clone(), embedder, None, config);
        (store, consolidator, project.id, dir)
    }

    fn test_config() -> ConsolidationConfig {
        ConsolidationConfig {
            grace_period_secs: 0,
            ..Default::default()
        }
    }

    /// Insert an event with a hand-picked embedding axis so cluster shapes
    /// are controlled by the test, not the seeded provider.
    fn seed_event(
        store: &Store,
        project: &str,
        session: &str,
        content: &str,
        importance: f64,
        axis: usize,
        jitter: f32,
    ) -> EpisodicEvent {
        let input = EventInput {
            session_id: session.into(),
            event_type: EventType::Action,
            content: content.into(),
            context: EventContext::default(),
            outcome: crate::model::Outcome::Success,
            importance,
            contextuality: 0.5,
            actionability: 0.5,
        };
        let hash = input.content_hash();
        let event = store
            .event_insert(project, &input, &hash, None, Utc::now())
            .unwrap();
        let mut v = vec![0.0_f32; 32];
        v[axis] = 1.0;
        v[(axis + 1) % 32] = jitter;
        let mut embedding = Embedding::new(v);
        embedding.normalize();
        store
            .event_set_embedding(&event.id, project, &embedding, "seeded-unit-v1/32")
            .unwrap();
        event
    }

    #[test]
    fn similar_events_consolidate_into_one_pattern() {
        let (store, consolidator, project, _dir) = setup(test_config());
        let ids: Vec<String> = (0..4)
            .map(|i| {
                seed_event(
                    &store,
                    &project,
                    "s1",
                    &format!("ran the integration suite attempt {}", i),
                    0.7,
                    0,
                    0.02 * i as f32,
                )
                .id
            })
            .collect();

        let report = consolidator.run(&project, &RunOptions::default()).unwrap();
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.record.patterns_extracted, 1);
        assert_eq!(report.record.events_promoted, 4);
        assert!(report.record.errors.is_empty());

        // All four events moved to consolidated with the cluster confidence
        for id in &ids {
            let event = store.event_get(id).unwrap().unwrap();
            assert_eq!(event.lifecycle_status, LifecycleStatus::Consolidated);
            assert!(event.consolidation_score >= 0.7);
        }

        // Exactly one semantic memory, carrying full provenance
        let hits = store
            .semantic_hybrid_search(
                &project,
                None,
                "integration suite",
                10,
                0.7,
                0.3,
                0.1,
                &Default::default(),
            )
            .unwrap();
        assert_eq!(hits.len(), 1);
        let memory = &hits[0].memory;
        assert_eq!(memory.consolidation_state, ConsolidationState::Consolidated);
        assert_eq!(memory.source_event_ids.len(), 4);
        for id in &ids {
            assert!(memory.source_event_ids.contains(id));
        }
        assert!(memory.quality_score >= 0.7);
    }

    #[test]
    fn rerun_is_idempotent() {
        let (store, consolidator, project, _dir) = setup(test_config());
        for i in 0..4 {
            seed_event(&store, &project, "s1", &format!("deploy step {}", i), 0.7, 0, 0.02 * i as f32);
        }
        let first = consolidator.run(&project, &RunOptions::default()).unwrap();
        assert_eq!(first.record.patterns_extracted, 1);

        let second = consolidator.run(&project, &RunOptions::default()).unwrap();
        assert_eq!(second.status, RunStatus::Completed);
        assert_eq!(second.record.patterns_extracted, 0);
        assert_eq!(second.record.events_promoted, 0);
        assert_eq!(second.record.events_scanned, 0);
    }

    #[test]
    fn small_clusters_are_not_promoted() {
        let (store, consolidator, project, _dir) = setup(test_config());
        // Two similar events: below balanced's min_cluster_size of 3
        seed_event(&store, &project, "s1", "lonely event one", 0.7, 0, 0.0);
        seed_event(&store, &project, "s1", "lonely event two", 0.7, 0, 0.02);

        let report = consolidator.run(&project, &RunOptions::default()).unwrap();
        assert_eq!(report.record.patterns_extracted, 0);
        let events = store.event_query(&project, &EventFilter::default()).unwrap();
        assert!(events
            .iter()
            .all(|e| e.lifecycle_status == LifecycleStatus::Active));
    }

    #[test]
    fn sessions_cluster_independently() {
        let (store, consolidator, project, _dir) = setup(test_config());
        // Three similar events in each of two sessions: temporal boundaries
        // must keep them apart, producing two patterns.
        for i in 0..3 {
            seed_event(&store, &project, "s1", &format!("s1 action {}", i), 0.7, 0, 0.02 * i as f32);
            seed_event(&store, &project, "s2", &format!("s2 action {}", i), 0.7, 0, 0.02 * i as f32);
        }
        let report = consolidator.run(&project, &RunOptions::default()).unwrap();
        assert_eq!(report.record.patterns_extracted, 2);
    }

    #[test]
    fn duplicate_patterns_merge_on_rerun() {
        let (store, consolidator, project, _dir) = setup(test_config());
        for i in 0..3 {
            seed_event(&store, &project, "s1", &format!("retry pattern {}", i), 0.7, 0, 0.02 * i as f32);
        }
        consolidator.run(&project, &RunOptions::default()).unwrap();

        // A fresh batch of near-identical events in a later session
        for i in 0..3 {
            seed_event(&store, &project, "s9", &format!("retry pattern again {}", i), 0.7, 0, 0.01 * i as f32);
        }
        let report = consolidator.run(&project, &RunOptions::default()).unwrap();
        // Merged, not inserted: still one pattern, provenance extended
        assert_eq!(report.record.patterns_extracted, 1);
        let hits = store
            .semantic_hybrid_search(
                &project,
                None,
                "retry pattern",
                10,
                0.7,
                0.3,
                0.1,
                &Default::default(),
            )
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].memory.source_event_ids.len(), 6);
    }

    #[test]
    fn minimal_strategy_without_reasoner_promotes_nothing() {
        let (store, consolidator, project, _dir) = setup(test_config());
        for i in 0..5 {
            seed_event(&store, &project, "s1", &format!("strict event {}", i), 0.9, 0, 0.01 * i as f32);
        }
        let report = consolidator
            .run(
                &project,
                &RunOptions {
                    strategy: Some(ConsolidationStrategy::Minimal),
                    archive: false,
                },
            )
            .unwrap();
        // Threshold 1.0 forces validation; with no reasoner, clusters skip
        assert_eq!(report.record.patterns_extracted, 0);
        let events = store.event_query(&project, &EventFilter::default()).unwrap();
        assert!(events
            .iter()
            .all(|e| e.lifecycle_status == LifecycleStatus::Active));
    }

    #[test]
    fn archival_pass_archives_old_unimportant_events() {
        let (store, consolidator, project, _dir) = setup(test_config());
        let input = EventInput {
            session_id: "old".into(),
            event_type: EventType::Observation,
            content: "ancient trivia".into(),
            context: EventContext::default(),
            outcome: crate::model::Outcome::Unknown,
            importance: 0.1,
            contextuality: 0.5,
            actionability: 0.5,
        };
        let hash = input.content_hash();
        let old = store
            .event_insert(
                &project,
                &input,
                &hash,
                None,
                Utc::now() - chrono::Duration::days(45),
            )
            .unwrap();

        let report = consolidator
            .run(
                &project,
                &RunOptions {
                    strategy: None,
                    archive: true,
                },
            )
            .unwrap();
        assert_eq!(report.record.events_archived, 1);
        assert_eq!(
            store.event_get(&old.id).unwrap().unwrap().lifecycle_status,
            LifecycleStatus::Archived
        );
    }

    #[test]
    fn cluster_confidence_reflects_the_formula() {
        let now = Utc::now();
        let members: Vec<EpisodicEvent> = (0..3)
            .map(|i| EpisodicEvent {
                id: format!("e{}", i),
                project_id: "p".into(),
                session_id: "s".into(),
                timestamp: now,
                event_type: EventType::Action,
                content: "x".into(),
                context: EventContext::default(),
                outcome: crate::model::Outcome::Success,
                importance: 0.7,
                contextuality: 0.5,
                actionability: 0.5,
                content_hash: String::new(),
                lifecycle_status: LifecycleStatus::Active,
                consolidation_score: 0.0,
                last_activation: now,
                activation_count: 0,
                entity_id: None,
            })
            .collect();
        // Identical embeddings: cohesion 1.0, agreement 1.0, importance 0.7
        let embeddings = vec![vec![1.0_f32, 0.0], vec![1.0, 0.0], vec![1.0, 0.0]];
        let matrix = clustering::distance_matrix(&embeddings);
        let features = extract_features(&members, &embeddings, &[0, 1, 2], &matrix);

        assert!((features.cohesion - 1.0).abs() < 1e-6);
        assert!((features.outcome_agreement - 1.0).abs() < 1e-9);
        let expected = 0.5 * 1.0 + 0.3 * 1.0 + 0.2 * 0.7;
        assert!((features.confidence - expected).abs() < 1e-6);
        assert_eq!(features.source_event_ids.len(), 3);
    }
}
