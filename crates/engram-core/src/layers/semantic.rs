//! Semantic layer - consolidated knowledge with hybrid search
//!
//! Besides CRUD, this layer enforces the reconsolidation policy: a
//! consolidated memory's content may only be edited inside the window
//! opened by its last retrieval. Edits past the window are rejected;
//! the caller must let a new consolidation cycle restate the knowledge.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::SemanticConfig;
use crate::embeddings::EmbeddingProvider;
use crate::error::{EngineError, Result};
use crate::flush::FlushHandle;
use crate::model::{ConsolidationState, SemanticInput, SemanticMemory};
use crate::store::{SemanticFilter, SemanticHit, Store};

/// Semantic memory service
pub struct SemanticLayer {
    store: Arc<Store>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: SemanticConfig,
    flusher: FlushHandle,
}

impl SemanticLayer {
    /// Create the layer
    pub fn new(
        store: Arc<Store>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: SemanticConfig,
        flusher: FlushHandle,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
            flusher,
        }
    }

    /// Layer configuration
    pub fn config(&self) -> &SemanticConfig {
        &self.config
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Store knowledge directly (outside consolidation). Embedding failure
    /// degrades to a vector-less row that keyword search still finds.
    pub fn remember(&self, project_id: &str, input: &SemanticInput) -> Result<SemanticMemory> {
        if input.content.trim().is_empty() {
            return Err(EngineError::InvalidArgument(
                "memory content cannot be empty".to_string(),
            ));
        }
        let embedding = match self.embedder.embed(&input.content) {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                warn!(error = %e, "embedding failed, storing memory without vector");
                None
            }
        };
        self.store.semantic_insert(
            project_id,
            input,
            embedding.as_ref(),
            embedding.as_ref().map(|_| self.embedder.model_id()),
        )
    }

    /// Edit content in place, preserving provenance.
    ///
    /// Allowed while the memory is `unconsolidated`, or inside the
    /// reconsolidation window after a retrieval. A consolidated memory
    /// outside the window rejects the edit with `InvalidTransition`.
    pub fn update_content(&self, id: &str, content: &str) -> Result<SemanticMemory> {
        if content.trim().is_empty() {
            return Err(EngineError::InvalidArgument(
                "memory content cannot be empty".to_string(),
            ));
        }
        let memory = self
            .store
            .semantic_get(id)?
            .ok_or_else(|| EngineError::NotFound(format!("memory {}", id)))?;

        let editable = match memory.consolidation_state {
            ConsolidationState::Unconsolidated | ConsolidationState::Consolidating => true,
            ConsolidationState::Reconsolidating | ConsolidationState::Consolidated => memory
                .in_reconsolidation_window(Utc::now(), self.config.reconsolidation_window_secs),
        };
        if !editable {
            return Err(EngineError::InvalidTransition(format!(
                "memory {} is outside its reconsolidation window; re-consolidate instead",
                id
            )));
        }

        self.store.semantic_update_content(id, content)?;
        match self.embedder.embed(content) {
            Ok(embedding) => {
                self.store.semantic_set_embedding(
                    id,
                    &memory.project_id,
                    &embedding,
                    self.embedder.model_id(),
                )?;
            }
            Err(e) => debug!(id, error = %e, "re-embedding after edit failed"),
        }
        self.store
            .semantic_get(id)?
            .ok_or_else(|| EngineError::NotFound(format!("memory {}", id)))
    }

    /// Forget a memory. Soft forget lowers quality and leaves the row for
    /// audit; hard forget deletes it.
    pub fn forget(&self, id: &str, hard: bool) -> Result<()> {
        if hard {
            return self.store.semantic_delete(id);
        }
        let memory = self
            .store
            .semantic_get(id)?
            .ok_or_else(|| EngineError::NotFound(format!("memory {}", id)))?;
        let lowered = (memory.quality_score - 0.2).max(0.0);
        self.store.semantic_update_quality(id, lowered)
    }

    // ========================================================================
    // SEARCH
    // ========================================================================

    /// Hybrid search; retrieval stats for the returned memories go through
    /// the flusher. Quality gets a small EMA boost on retrieval.
    pub fn search(
        &self,
        project_id: &str,
        query: &str,
        k: usize,
        filter: &SemanticFilter,
    ) -> Result<Vec<SemanticHit>> {
        let hits = self.search_quiet(project_id, query, k, filter)?;
        let now = Utc::now();
        self.flusher
            .touch_memories(hits.iter().map(|h| h.memory.id.as_str()), now);
        for hit in &hits {
            let boosted = (hit.memory.quality_score * 0.98 + 0.02).clamp(0.0, 1.0);
            if let Err(e) = self.store.semantic_update_quality(&hit.memory.id, boosted) {
                debug!(id = %hit.memory.id, error = %e, "quality boost skipped");
            }
        }
        Ok(hits)
    }

    /// Hybrid search without access-stat side effects (tier-2 enrichment
    /// re-reads candidates and must not double-count).
    pub fn search_quiet(
        &self,
        project_id: &str,
        query: &str,
        k: usize,
        filter: &SemanticFilter,
    ) -> Result<Vec<SemanticHit>> {
        if k == 0 {
            return Ok(vec![]);
        }
        let query_vec = match self.embedder.embed(query) {
            Ok(embedding) => Some(embedding.vector),
            Err(e) => {
                debug!(error = %e, "query embedding failed, keyword-only search");
                None
            }
        };
        self.store.semantic_hybrid_search(
            project_id,
            query_vec.as_deref(),
            query,
            k,
            self.config.semantic_weight,
            self.config.keyword_weight,
            self.config.min_similarity,
            filter,
        )
    }

    /// Lookup by id
    pub fn get(&self, id: &str) -> Result<Option<SemanticMemory>> {
        self.store.semantic_get(id)
    }

    // ========================================================================
    // MAINTENANCE
    // ========================================================================

    /// Close expired reconsolidation windows for a project
    pub fn close_windows(&self, project_id: &str) -> Result<u64> {
        self.store.semantic_close_windows(
            project_id,
            self.config.reconsolidation_window_secs,
            Utc::now(),
        )
    }

    /// Regenerate missing or stale-model embeddings
    pub fn reembed_pass(&self, project_id: &str, limit: usize) -> Result<usize> {
        let missing =
            self.store
                .semantic_missing_embeddings(project_id, self.embedder.model_id(), limit)?;
        if missing.is_empty() {
            return Ok(0);
        }
        let texts: Vec<&str> = missing.iter().map(|(_, content)| content.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts)?;
        let mut done = 0;
        for ((id, _), embedding) in missing.iter().zip(embeddings) {
            self.store
                .semantic_set_embedding(id, project_id, &embedding, self.embedder.model_id())?;
            done += 1;
        }
        Ok(done)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlushConfig;
    use crate::embeddings::SeededProvider;
    use crate::flush::AccessFlusher;
    use crate::model::MemoryType;
    use crate::store::test_util::test_store;
    use tempfile::TempDir;

    fn layer() -> (Arc<Store>, SemanticLayer, AccessFlusher, String, TempDir) {
        let (store, dir) = test_store();
        let project = store.project_upsert("p", None).unwrap();
        let flusher = AccessFlusher::spawn(
            store.clone(),
            FlushConfig {
                queue_capacity: 256,
                flush_interval_ms: 10,
            },
        );
        let layer = SemanticLayer::new(
            store.clone(),
            Arc::new(SeededProvider::new(32)),
            SemanticConfig::default(),
            flusher.handle(),
        );
        (store, layer, flusher, project.id, dir)
    }

    fn input(content: &str) -> SemanticInput {
        SemanticInput {
            content: content.into(),
            memory_type: MemoryType::Fact,
            tags: vec!["infra".into()],
            quality_score: 0.5,
            source_event_ids: vec![],
        }
    }

    #[tokio::test]
    async fn remember_and_search_roundtrip() {
        let (_store, layer, flusher, project, _dir) = layer();
        let memory = layer
            .remember(&project, &input("the staging cluster lives in us-east-1"))
            .unwrap();

        let hits = layer
            .search(&project, "staging cluster", 5, &SemanticFilter::default())
            .unwrap();
        assert_eq!(hits[0].memory.id, memory.id);
        flusher.shutdown().await;
    }

    #[tokio::test]
    async fn search_records_retrieval_through_flusher() {
        let (store, layer, flusher, project, _dir) = layer();
        let memory = layer.remember(&project, &input("redis is the cache")).unwrap();
        layer
            .search(&project, "redis cache", 5, &SemanticFilter::default())
            .unwrap();
        flusher.shutdown().await;

        let loaded = store.semantic_get(&memory.id).unwrap().unwrap();
        assert_eq!(loaded.access_count, 1);
        assert!(loaded.last_retrieved_at.is_some());
        assert!(loaded.quality_score > 0.5);
    }

    #[tokio::test]
    async fn unconsolidated_memories_are_freely_editable() {
        let (_store, layer, _flusher, project, _dir) = layer();
        let memory = layer.remember(&project, &input("initial wording")).unwrap();
        let updated = layer.update_content(&memory.id, "better wording").unwrap();
        assert_eq!(updated.content, "better wording");
    }

    #[tokio::test]
    async fn consolidated_edits_respect_the_window() {
        let (store, layer, _flusher, project, _dir) = layer();
        let memory = layer.remember(&project, &input("a consolidated fact")).unwrap();
        store
            .semantic_set_state(&memory.id, ConsolidationState::Consolidating)
            .unwrap();
        store
            .semantic_set_state(&memory.id, ConsolidationState::Consolidated)
            .unwrap();

        // Never retrieved: no open window, edit rejected
        let err = layer.update_content(&memory.id, "sneaky edit").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidTransition);

        // Retrieved 30 minutes ago: window open, edit accepted and
        // provenance preserved
        store
            .semantic_record_retrieval(&memory.id, Utc::now() - chrono::Duration::minutes(30))
            .unwrap();
        let before = store.semantic_get(&memory.id).unwrap().unwrap();
        let updated = layer.update_content(&memory.id, "window edit").unwrap();
        assert_eq!(updated.source_event_ids, before.source_event_ids);

        // Retrieved 2 hours ago: window closed again
        store
            .semantic_record_retrieval(&memory.id, Utc::now() - chrono::Duration::hours(2))
            .unwrap();
        let err = layer.update_content(&memory.id, "too late").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidTransition);
    }

    #[tokio::test]
    async fn soft_forget_lowers_quality_hard_forget_deletes() {
        let (store, layer, _flusher, project, _dir) = layer();
        let memory = layer.remember(&project, &input("forgettable")).unwrap();

        layer.forget(&memory.id, false).unwrap();
        let softened = store.semantic_get(&memory.id).unwrap().unwrap();
        assert!((softened.quality_score - 0.3).abs() < 1e-9);

        layer.forget(&memory.id, true).unwrap();
        assert!(store.semantic_get(&memory.id).unwrap().is_none());
    }
}
