//! Episodic layer - the append-only experience log
//!
//! Owns the record/recall protocols: dedup hashing before insert,
//! best-effort embedding and entity linking, hybrid candidate selection
//! re-ranked by activation, and the session timeline with replay cursors.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::activation::ActivationEngine;
use crate::embeddings::EmbeddingProvider;
use crate::error::{EngineError, Result};
use crate::flush::FlushHandle;
use crate::model::{EpisodicEvent, EventFilter, EventInput, RecordOutcome};
use crate::search::linear_combination;
use crate::store::Store;

/// An event with its recall score
#[derive(Debug, Clone)]
pub struct ScoredEvent {
    /// The event
    pub event: EpisodicEvent,
    /// Combined retrieval score (fused search + activation)
    pub score: f32,
}

/// Episodic memory service
pub struct EpisodicLayer {
    store: Arc<Store>,
    embedder: Arc<dyn EmbeddingProvider>,
    activation: ActivationEngine,
    flusher: FlushHandle,
}

impl EpisodicLayer {
    /// Create the layer
    pub fn new(
        store: Arc<Store>,
        embedder: Arc<dyn EmbeddingProvider>,
        activation: ActivationEngine,
        flusher: FlushHandle,
    ) -> Self {
        Self {
            store,
            embedder,
            activation,
            flusher,
        }
    }

    // ========================================================================
    // RECORD PROTOCOL
    // ========================================================================

    /// Record an experience. Duplicates (by content hash) return the
    /// existing id as a status, not an error. Embedding and entity linking
    /// are best-effort: their failure never loses the event.
    pub fn record_event(&self, project_id: &str, input: &EventInput) -> Result<RecordOutcome> {
        if input.content.trim().is_empty() {
            return Err(EngineError::InvalidArgument(
                "event content cannot be empty".to_string(),
            ));
        }
        if input.session_id.trim().is_empty() {
            return Err(EngineError::InvalidArgument(
                "session id cannot be empty".to_string(),
            ));
        }
        for (name, value) in [
            ("importance", input.importance),
            ("contextuality", input.contextuality),
            ("actionability", input.actionability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::InvalidArgument(format!(
                    "{} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }

        let hash = input.content_hash();
        if let Some(existing) = self.store.event_get_by_hash(project_id, &hash)? {
            debug!(event_id = %existing.id, "duplicate event payload, returning existing id");
            return Ok(RecordOutcome::Duplicate { id: existing.id });
        }

        let entity_id = self.detect_dominant_entity(project_id, &input.content);
        let event = self
            .store
            .event_insert(project_id, input, &hash, entity_id.as_deref(), Utc::now())?;

        match self.embedder.embed(&input.content) {
            Ok(embedding) => {
                self.store.event_set_embedding(
                    &event.id,
                    project_id,
                    &embedding,
                    self.embedder.model_id(),
                )?;
            }
            Err(e) => {
                // Stored without an embedding; the re-embed pass will catch it
                warn!(event_id = %event.id, error = %e, "embedding failed, event stored without vector");
            }
        }

        Ok(RecordOutcome::Stored { id: event.id })
    }

    /// Best-effort: link the event to a graph entity when exactly one known
    /// entity name appears in the content.
    fn detect_dominant_entity(&self, project_id: &str, content: &str) -> Option<String> {
        let lowered = content.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric() && c != '-' && c != '_' && c != '.')
            .filter(|w| w.len() > 2)
            .collect();

        let mut matched: Option<String> = None;
        for word in words {
            let entity = match self.store.entity_get_by_name(project_id, word, None) {
                Ok(Some(entity)) => entity,
                Ok(None) => continue,
                Err(e) => {
                    debug!(error = %e, "entity detection lookup failed");
                    return None;
                }
            };
            match &matched {
                None => matched = Some(entity.id),
                Some(existing) if *existing == entity.id => {}
                Some(_) => return None, // more than one dominant candidate
            }
        }
        matched
    }

    // ========================================================================
    // RECALL PROTOCOL
    // ========================================================================

    /// Recall events. A non-empty query runs hybrid candidate selection
    /// (vector + keyword) re-ranked with activation as an auxiliary signal;
    /// an empty query is a pure filter scan. Access stats for returned
    /// events are batched through the flusher, never written inline.
    pub fn recall_events(
        &self,
        project_id: &str,
        query: &str,
        filter: &EventFilter,
        k: usize,
    ) -> Result<Vec<ScoredEvent>> {
        let results = self.search_events(project_id, query, filter, k)?;
        let now = Utc::now();
        self.flusher
            .touch_events(results.iter().map(|r| r.event.id.as_str()), now);
        Ok(results)
    }

    /// Hybrid candidate selection without access-stat side effects; the
    /// cascade engine touches only the items it finally returns.
    pub fn search_events(
        &self,
        project_id: &str,
        query: &str,
        filter: &EventFilter,
        k: usize,
    ) -> Result<Vec<ScoredEvent>> {
        if k == 0 {
            return Ok(vec![]);
        }
        if query.trim().is_empty() {
            let mut scan = filter.clone();
            scan.limit = Some(k.min(scan.limit.unwrap_or(k)));
            return Ok(self
                .store
                .event_query(project_id, &scan)?
                .into_iter()
                .map(|event| ScoredEvent { event, score: 0.0 })
                .collect());
        }
        self.search(project_id, query, filter, k)
    }

    fn search(
        &self,
        project_id: &str,
        query: &str,
        filter: &EventFilter,
        k: usize,
    ) -> Result<Vec<ScoredEvent>> {
        let pool = k * 3;
        let vector_results = match self.embedder.embed(query) {
            Ok(embedding) => {
                self.store
                    .event_index()?
                    .search(project_id, &embedding.vector, pool, 0.0)
            }
            Err(e) => {
                debug!(error = %e, "query embedding failed, keyword-only recall");
                vec![]
            }
        };
        let keyword_results = self.store.event_keyword_search(project_id, query, pool)?;
        let fused = linear_combination(&vector_results, &keyword_results, 0.7, 0.3);

        let ids: Vec<String> = fused.iter().map(|(id, _)| id.clone()).collect();
        let events = self.store.event_get_many(&ids)?;
        let now = Utc::now();

        // Auxiliary signal: activation, normalized over the candidate set
        let activations: Vec<f64> = events
            .iter()
            .map(|e| self.activation.score(e, now))
            .collect();
        let max_activation = activations.iter().cloned().fold(0.0_f64, f64::max).max(1e-9);

        let mut scored: Vec<ScoredEvent> = events
            .into_iter()
            .zip(activations)
            .filter(|(event, _)| event_matches_filter(event, filter))
            .map(|(event, activation)| {
                let fused_score = fused
                    .iter()
                    .find(|(id, _)| *id == event.id)
                    .map(|(_, s)| *s)
                    .unwrap_or(0.0);
                let score = 0.7 * fused_score + 0.3 * (activation / max_activation) as f32;
                ScoredEvent { event, score }
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.event.timestamp.cmp(&a.event.timestamp))
        });
        scored.truncate(k);
        Ok(scored)
    }

    // ========================================================================
    // TIMELINES & MAINTENANCE
    // ========================================================================

    /// Chronological timeline of one session with a replay cursor
    pub fn session_timeline(
        &self,
        project_id: &str,
        session_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<EpisodicEvent>> {
        self.store.event_query(
            project_id,
            &EventFilter {
                session_id: Some(session_id.to_string()),
                limit: Some(limit),
                offset,
                ..Default::default()
            },
        )
    }

    /// Working-memory candidates: active events only
    pub fn active_events(&self, project_id: &str, limit: usize) -> Result<Vec<EpisodicEvent>> {
        self.store.event_query(
            project_id,
            &EventFilter {
                lifecycle_statuses: vec![crate::model::LifecycleStatus::Active],
                limit: Some(limit),
                ..Default::default()
            },
        )
    }

    /// Regenerate embeddings for events with a missing or stale-model
    /// vector; returns how many were re-embedded.
    pub fn reembed_pass(&self, project_id: &str, limit: usize) -> Result<usize> {
        let missing =
            self.store
                .events_missing_embeddings(project_id, self.embedder.model_id(), limit)?;
        if missing.is_empty() {
            return Ok(0);
        }
        let texts: Vec<&str> = missing.iter().map(|(_, content)| content.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts)?;
        let mut done = 0;
        for ((id, _), embedding) in missing.iter().zip(embeddings) {
            self.store
                .event_set_embedding(id, project_id, &embedding, self.embedder.model_id())?;
            done += 1;
        }
        Ok(done)
    }
}

/// Post-hydration filter application for hybrid candidates
fn event_matches_filter(event: &EpisodicEvent, filter: &EventFilter) -> bool {
    use crate::model::LifecycleStatus;
    let status_ok = if !filter.lifecycle_statuses.is_empty() {
        filter.lifecycle_statuses.contains(&event.lifecycle_status)
    } else {
        filter.include_archived || event.lifecycle_status != LifecycleStatus::Archived
    };
    status_ok
        && filter
            .session_id
            .as_ref()
            .map(|s| *s == event.session_id)
            .unwrap_or(true)
        && filter.since.map(|t| event.timestamp >= t).unwrap_or(true)
        && filter.until.map(|t| event.timestamp <= t).unwrap_or(true)
        && (filter.event_types.is_empty() || filter.event_types.contains(&event.event_type))
}

// ============================================================================
// TESTS
// ============================================================================
