//! Semantic memory persistence
//!
//! CRUD, the consolidation-state machine, retrieval stats (which open the
//! reconsolidation window), and hybrid search: vector candidates from the
//! in-memory index fused with FTS5 keyword candidates in one pass.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::Store;
use crate::embeddings::Embedding;
use crate::error::{EngineError, Result};
use crate::model::{ConsolidationState, MemoryType, SemanticInput, SemanticMemory};
use crate::search::{linear_combination, sanitize_fts5_query};

const MEMORY_COLUMNS: &str = "id, project_id, content, memory_type, tags, quality_score, \
     source_event_ids, created_at, updated_at, access_count, consolidation_state, \
     last_retrieved_at";

/// Filter applied to semantic search results
#[derive(Debug, Clone, Default)]
pub struct SemanticFilter {
    /// Restrict to these memory types (empty = all)
    pub memory_types: Vec<MemoryType>,
    /// Require at least one of these tags (empty = all)
    pub tags: Vec<String>,
    /// Restrict to these consolidation states (empty = all)
    pub states: Vec<ConsolidationState>,
}

impl SemanticFilter {
    /// Whether a memory passes the filter
    pub fn matches(&self, memory: &SemanticMemory) -> bool {
        if !self.memory_types.is_empty() && !self.memory_types.contains(&memory.memory_type) {
            return false;
        }
        if !self.states.is_empty() && !self.states.contains(&memory.consolidation_state) {
            return false;
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| memory.tags.contains(t)) {
            return false;
        }
        true
    }
}

/// A scored hybrid-search hit
#[derive(Debug, Clone)]
pub struct SemanticHit {
    /// The matched memory
    pub memory: SemanticMemory,
    /// Fused score
    pub score: f32,
    /// Cosine similarity when the vector side matched
    pub similarity: Option<f32>,
}

pub(crate) fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<SemanticMemory> {
    let memory_type: String = row.get(3)?;
    let tags_json: String = row.get(4)?;
    let sources_json: String = row.get(6)?;
    let state: String = row.get(10)?;
    Ok(SemanticMemory {
        id: row.get(0)?,
        project_id: row.get(1)?,
        content: row.get(2)?,
        embedding: None,
        embedding_model: None,
        memory_type: MemoryType::parse_name(&memory_type),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        quality_score: row.get(5)?,
        source_event_ids: serde_json::from_str(&sources_json).unwrap_or_default(),
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        access_count: row.get(9)?,
        consolidation_state: ConsolidationState::parse_name(&state),
        last_retrieved_at: row.get(11)?,
    })
}

impl Store {
    // ========================================================================
    // CRUD
    // ========================================================================

    /// Direct semantic write (outside the consolidation pipeline)
    pub fn semantic_insert(
        &self,
        project_id: &str,
        input: &SemanticInput,
        embedding: Option<&Embedding>,
        model: Option<&str>,
    ) -> Result<SemanticMemory> {
        let now = Utc::now();
        let memory = SemanticMemory {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            content: input.content.clone(),
            embedding: embedding.map(|e| e.vector.clone()),
            embedding_model: model.map(str::to_string),
            memory_type: input.memory_type,
            tags: input.tags.clone(),
            quality_score: input.quality_score.clamp(0.0, 1.0),
            source_event_ids: input.source_event_ids.clone(),
            created_at: now,
            updated_at: now,
            access_count: 0,
            consolidation_state: ConsolidationState::Unconsolidated,
            last_retrieved_at: None,
        };
        self.transaction(|tx| semantic_insert_tx(tx, &memory))?;
        if let Some(emb) = embedding {
            self.semantic_set_embedding(&memory.id, project_id, emb, model.unwrap_or("unknown"))?;
        }
        self.bump_epoch(project_id);
        Ok(memory)
    }

    /// Look up a memory by id
    pub fn semantic_get(&self, id: &str) -> Result<Option<SemanticMemory>> {
        self.with_reader(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM semantic_memories WHERE id = ?1", MEMORY_COLUMNS),
                params![id],
                row_to_memory,
            )
            .optional()
            .map_err(EngineError::from)
        })
    }

    /// Fetch several memories by id, preserving input order
    pub fn semantic_get_many(&self, ids: &[String]) -> Result<Vec<SemanticMemory>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(memory) = self.semantic_get(id)? {
                out.push(memory);
            }
        }
        Ok(out)
    }

    /// Replace a memory's content, preserving provenance. The
    /// reconsolidation-window policy is enforced by the semantic layer;
    /// this is the raw write.
    pub fn semantic_update_content(&self, id: &str, content: &str) -> Result<()> {
        let project_id = self.with_writer(|conn| {
            let project_id: String = conn
                .query_row(
                    "SELECT project_id FROM semantic_memories WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| EngineError::NotFound(format!("memory {}", id)))?;
            conn.execute(
                "UPDATE semantic_memories SET content = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, content, Utc::now()],
            )?;
            Ok(project_id)
        })?;
        self.bump_epoch(&project_id);
        Ok(())
    }

    /// Delete a memory and its embedding
    pub fn semantic_delete(&self, id: &str) -> Result<()> {
        let project_id = self.with_writer(|conn| {
            let project_id: String = conn
                .query_row(
                    "SELECT project_id FROM semantic_memories WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| EngineError::NotFound(format!("memory {}", id)))?;
            conn.execute("DELETE FROM semantic_memories WHERE id = ?1", params![id])?;
            Ok(project_id)
        })?;
        self.semantic_index()?.remove(id);
        self.bump_epoch(&project_id);
        Ok(())
    }

    // ========================================================================
    // STATE MACHINE
    // ========================================================================

    /// Transition the consolidation state, enforcing the DAG
    pub fn semantic_set_state(&self, id: &str, to: ConsolidationState) -> Result<()> {
        let project_id = self.transaction(|tx| semantic_set_state_tx(tx, id, to))?;
        self.bump_epoch(&project_id);
        Ok(())
    }

    /// Record a retrieval: bumps `access_count`, stamps `last_retrieved_at`
    /// (opening the reconsolidation window), and moves a `consolidated`
    /// memory into `reconsolidating`.
    pub fn semantic_record_retrieval(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        self.with_writer(|conn| {
            let changed = conn.execute(
                "UPDATE semantic_memories
                 SET access_count = access_count + 1,
                     last_retrieved_at = ?2,
                     consolidation_state = CASE consolidation_state
                         WHEN 'consolidated' THEN 'reconsolidating'
                         ELSE consolidation_state
                     END
                 WHERE id = ?1",
                params![id, now],
            )?;
            if changed == 0 {
                return Err(EngineError::NotFound(format!("memory {}", id)));
            }
            Ok(())
        })
    }

    /// Close expired reconsolidation windows: `reconsolidating` memories
    /// whose last retrieval is older than the window return to
    /// `consolidated`. Returns how many closed.
    pub fn semantic_close_windows(
        &self,
        project_id: &str,
        window_secs: i64,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let cutoff = now - chrono::Duration::seconds(window_secs);
        self.with_writer(|conn| {
            let changed = conn.execute(
                "UPDATE semantic_memories
                 SET consolidation_state = 'consolidated'
                 WHERE project_id = ?1
                   AND consolidation_state = 'reconsolidating'
                   AND (last_retrieved_at IS NULL OR last_retrieved_at < ?2)",
                params![project_id, cutoff],
            )?;
            Ok(changed as u64)
        })
    }

    /// EMA quality update used by retrieval/forget feedback
    pub fn semantic_update_quality(&self, id: &str, quality: f64) -> Result<()> {
        self.with_writer(|conn| {
            let changed = conn.execute(
                "UPDATE semantic_memories SET quality_score = ?2 WHERE id = ?1",
                params![id, quality.clamp(0.0, 1.0)],
            )?;
            if changed == 0 {
                return Err(EngineError::NotFound(format!("memory {}", id)));
            }
            Ok(())
        })
    }

    // ========================================================================
    // EMBEDDINGS
    // ========================================================================

    /// Persist a memory embedding and add it to the vector index
    pub fn semantic_set_embedding(
        &self,
        memory_id: &str,
        project_id: &str,
        embedding: &Embedding,
        model: &str,
    ) -> Result<()> {
        self.with_writer(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO semantic_embeddings
                 (memory_id, embedding, dimensions, model, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    memory_id,
                    embedding.to_bytes(),
                    embedding.dimensions as i64,
                    model,
                    Utc::now()
                ],
            )?;
            Ok(())
        })?;
        self.semantic_index()?
            .insert(project_id, memory_id, &embedding.vector);
        Ok(())
    }

    /// Memories with no embedding or one from a different model
    pub fn semantic_missing_embeddings(
        &self,
        project_id: &str,
        model: &str,
        limit: usize,
    ) -> Result<Vec<(String, String)>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.content FROM semantic_memories m
                 LEFT JOIN semantic_embeddings emb ON emb.memory_id = m.id
                 WHERE m.project_id = ?1
                   AND (emb.memory_id IS NULL OR emb.model != ?2)
                 ORDER BY m.updated_at DESC
                 LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![project_id, model, limit as i64], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    // ========================================================================
    // SEARCH
    // ========================================================================

    /// Vector-only search over memory embeddings
    pub fn semantic_vector_search(
        &self,
        project_id: &str,
        query: &[f32],
        k: usize,
        threshold: f32,
    ) -> Result<Vec<(String, f32)>> {
        Ok(self
            .semantic_index()?
            .search(project_id, query, k, threshold))
    }

    /// FTS5 keyword search over memory content and tags
    pub fn semantic_keyword_search(
        &self,
        project_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<(String, f32)>> {
        let sanitized = sanitize_fts5_query(query);
        if sanitized.is_empty() || k == 0 {
            return Ok(vec![]);
        }
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, -fts.rank FROM semantic_fts fts
                 JOIN semantic_memories m ON m.id = fts.id
                 WHERE semantic_fts MATCH ?1 AND m.project_id = ?2
                 ORDER BY fts.rank
                 LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![sanitized, project_id, k as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)? as f32))
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    /// Hybrid search: top-`3k` vector neighbors fused with top-`3k` keyword
    /// matches by weighted normalized score, filtered, truncated to `k`.
    /// Without a query vector the search degrades to pure keyword.
    ///
    /// Ties break by quality, then most recent retrieval.
    #[allow(clippy::too_many_arguments)]
    pub fn semantic_hybrid_search(
        &self,
        project_id: &str,
        query_vec: Option<&[f32]>,
        query_text: &str,
        k: usize,
        w_semantic: f32,
        w_keyword: f32,
        min_similarity: f32,
        filter: &SemanticFilter,
    ) -> Result<Vec<SemanticHit>> {
        if k == 0 {
            return Ok(vec![]);
        }
        let pool = k * 3;
        let vector_results = match query_vec {
            Some(q) => self.semantic_vector_search(project_id, q, pool, min_similarity)?,
            None => vec![],
        };
        let keyword_results = self.semantic_keyword_search(project_id, query_text, pool)?;

        let similarities: std::collections::HashMap<&str, f32> = vector_results
            .iter()
            .map(|(id, sim)| (id.as_str(), *sim))
            .collect();

        let fused = linear_combination(&vector_results, &keyword_results, w_semantic, w_keyword);
        let ids: Vec<String> = fused.iter().map(|(id, _)| id.clone()).collect();
        let memories = self.semantic_get_many(&ids)?;
        let by_id: std::collections::HashMap<&str, &SemanticMemory> =
            memories.iter().map(|m| (m.id.as_str(), m)).collect();

        let mut hits: Vec<SemanticHit> = fused
            .iter()
            .filter_map(|(id, score)| {
                let memory = by_id.get(id.as_str())?;
                if !filter.matches(memory) {
                    return None;
                }
                Some(SemanticHit {
                    memory: (*memory).clone(),
                    score: *score,
                    similarity: similarities.get(id.as_str()).copied(),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.memory
                        .quality_score
                        .partial_cmp(&a.memory.quality_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| b.memory.last_retrieved_at.cmp(&a.memory.last_retrieved_at))
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Memories similar to the given embedding, for pattern dedup/merge
    pub fn semantic_find_similar(
        &self,
        project_id: &str,
        embedding: &[f32],
        threshold: f32,
        k: usize,
    ) -> Result<Vec<(SemanticMemory, f32)>> {
        let candidates = self.semantic_vector_search(project_id, embedding, k, threshold)?;
        let mut out = Vec::with_capacity(candidates.len());
        for (id, sim) in candidates {
            if let Some(memory) = self.semantic_get(&id)? {
                out.push((memory, sim));
            }
        }
        Ok(out)
    }

    // ========================================================================
    // STATS
    // ========================================================================

    /// (total, consolidated, average quality) for one project
    pub fn semantic_stats(&self, project_id: &str) -> Result<(i64, i64, f64)> {
        self.with_reader(|conn| {
            conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN consolidation_state IN ('consolidated', 'reconsolidating') THEN 1 ELSE 0 END), 0),
                        COALESCE(AVG(quality_score), 0.0)
                 FROM semantic_memories WHERE project_id = ?1",
                params![project_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(EngineError::from)
        })
    }

    /// Per-domain aggregates: (memory count, total retrievals, most recent
    /// update) for memories tagged with the domain. Feeds expertise.
    pub fn semantic_domain_stats(
        &self,
        project_id: &str,
        domain: &str,
    ) -> Result<(i64, i64, Option<DateTime<Utc>>)> {
        let tag_pattern = format!("%\"{}\"%", domain.trim().to_lowercase());
        self.with_reader(|conn| {
            conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(access_count), 0), MAX(updated_at)
                 FROM semantic_memories
                 WHERE project_id = ?1 AND LOWER(tags) LIKE ?2",
                params![project_id, tag_pattern],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(EngineError::from)
        })
    }

    /// Count of memories whose last retrieval is older than the cutoff
    /// (or never retrieved); feeds the freshness component of health.
    pub fn semantic_stale_count(
        &self,
        project_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<i64> {
        self.with_reader(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM semantic_memories
                 WHERE project_id = ?1
                   AND (last_retrieved_at IS NULL OR last_retrieved_at < ?2)",
                params![project_id, cutoff],
                |row| row.get(0),
            )
            .map_err(EngineError::from)
        })
    }
}

// ============================================================================
// TRANSACTION HELPERS (consolidation pipeline)
// ============================================================================

/// Insert a semantic memory row inside an open transaction
pub(crate) fn semantic_insert_tx(conn: &Connection, memory: &SemanticMemory) -> Result<()> {
    let tags_json = serde_json::to_string(&memory.tags)
        .map_err(|e| EngineError::Internal(format!("tags serialization: {}", e)))?;
    let sources_json = serde_json::to_string(&memory.source_event_ids)
        .map_err(|e| EngineError::Internal(format!("sources serialization: {}", e)))?;
    conn.execute(
        "INSERT INTO semantic_memories (
            id, project_id, content, memory_type, tags, quality_score,
            source_event_ids, created_at, updated_at, access_count,
            consolidation_state, last_retrieved_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            memory.id,
            memory.project_id,
            memory.content,
            memory.memory_type.as_str(),
            tags_json,
            memory.quality_score,
            sources_json,
            memory.created_at,
            memory.updated_at,
            memory.access_count,
            memory.consolidation_state.as_str(),
            memory.last_retrieved_at,
        ],
    )?;
    Ok(())
}

/// DAG-checked state transition inside an open transaction; returns the
/// project id for epoch bumping after commit.
pub(crate) fn semantic_set_state_tx(
    conn: &Connection,
    id: &str,
    to: ConsolidationState,
) -> Result<String> {
    let (project_id, current): (String, String) = conn
        .query_row(
            "SELECT project_id, consolidation_state FROM semantic_memories WHERE id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?
        .ok_or_else(|| EngineError::NotFound(format!("memory {}", id)))?;
    let from = ConsolidationState::parse_name(&current);
    if !from.can_transition(to) {
        return Err(EngineError::InvalidTransition(format!(
            "memory {} cannot move {} -> {}",
            id, from, to
        )));
    }
    conn.execute(
        "UPDATE semantic_memories SET consolidation_state = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, to.as_str(), Utc::now()],
    )?;
    Ok(project_id)
}

/// Merge a new pattern into an existing memory: extend provenance, EMA the
/// quality toward the new confidence, refresh `updated_at`.
pub(crate) fn semantic_merge_tx(
    conn: &Connection,
    id: &str,
    new_source_ids: &[String],
    new_confidence: f64,
) -> Result<()> {
    let (quality, sources_json): (f64, String) = conn
        .query_row(
            "SELECT quality_score, source_event_ids FROM semantic_memories WHERE id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?
        .ok_or_else(|| EngineError::NotFound(format!("memory {}", id)))?;

    let mut sources: Vec<String> = serde_json::from_str(&sources_json).unwrap_or_default();
    for source in new_source_ids {
        if !sources.contains(source) {
            sources.push(source.clone());
        }
    }
    let merged_quality = (0.7 * quality + 0.3 * new_confidence).clamp(0.0, 1.0);
    let merged_json = serde_json::to_string(&sources)
        .map_err(|e| EngineError::Internal(format!("sources serialization: {}", e)))?;

    conn.execute(
        "UPDATE semantic_memories
         SET source_event_ids = ?2, quality_score = ?3, updated_at = ?4
         WHERE id = ?1",
        params![id, merged_json, merged_quality, Utc::now()],
    )?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
