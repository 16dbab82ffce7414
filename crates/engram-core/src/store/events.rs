//! Episodic event persistence
//!
//! Insert with dedup hashing, lifecycle transitions (validated against the
//! model DAG inside the write transaction), monotonic access-stat updates,
//! filtered queries, FTS5 keyword search, and embedding rows.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::Store;
use crate::embeddings::Embedding;
use crate::error::{map_constraint, EngineError, Result};
use crate::model::{
    EpisodicEvent, EventContext, EventFilter, EventInput, EventOrder, EventType, LifecycleStatus,
    Outcome,
};
use crate::search::sanitize_fts5_query;

const EVENT_COLUMNS: &str = "id, project_id, session_id, timestamp, event_type, content, context, \
     outcome, importance, contextuality, actionability, content_hash, lifecycle_status, \
     consolidation_score, last_activation, activation_count, entity_id";

pub(crate) fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<EpisodicEvent> {
    let event_type: String = row.get(4)?;
    let context_json: String = row.get(6)?;
    let outcome: String = row.get(7)?;
    let lifecycle: String = row.get(12)?;
    Ok(EpisodicEvent {
        id: row.get(0)?,
        project_id: row.get(1)?,
        session_id: row.get(2)?,
        timestamp: row.get(3)?,
        event_type: EventType::parse_name(&event_type),
        content: row.get(5)?,
        context: serde_json::from_str::<EventContext>(&context_json).unwrap_or_default(),
        outcome: Outcome::parse_name(&outcome),
        importance: row.get(8)?,
        contextuality: row.get(9)?,
        actionability: row.get(10)?,
        content_hash: row.get(11)?,
        lifecycle_status: LifecycleStatus::parse_name(&lifecycle),
        consolidation_score: row.get(13)?,
        last_activation: row.get(14)?,
        activation_count: row.get(15)?,
        entity_id: row.get(16)?,
    })
}

impl Store {
    // ========================================================================
    // INSERT & LOOKUP
    // ========================================================================

    /// Insert a new event with default lifecycle (`active`, score 0, no
    /// activations). Fails with `Duplicate` when the content hash collides
    /// within the project.
    pub fn event_insert(
        &self,
        project_id: &str,
        input: &EventInput,
        content_hash: &str,
        entity_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<EpisodicEvent> {
        let event = EpisodicEvent {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            session_id: input.session_id.clone(),
            timestamp: now,
            event_type: input.event_type,
            content: input.content.clone(),
            context: input.context.clone(),
            outcome: input.outcome,
            importance: input.importance.clamp(0.0, 1.0),
            contextuality: input.contextuality.clamp(0.0, 1.0),
            actionability: input.actionability.clamp(0.0, 1.0),
            content_hash: content_hash.to_string(),
            lifecycle_status: LifecycleStatus::Active,
            consolidation_score: 0.0,
            last_activation: now,
            activation_count: 0,
            entity_id: entity_id.map(str::to_string),
        };
        let context_json = serde_json::to_string(&event.context)
            .map_err(|e| EngineError::Internal(format!("context serialization: {}", e)))?;

        self.with_writer(|conn| {
            conn.execute(
                "INSERT INTO episodic_events (
                    id, project_id, session_id, timestamp, event_type, content, context,
                    outcome, importance, contextuality, actionability, content_hash,
                    lifecycle_status, consolidation_score, last_activation, activation_count,
                    entity_id
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    event.id,
                    event.project_id,
                    event.session_id,
                    event.timestamp,
                    event.event_type.as_str(),
                    event.content,
                    context_json,
                    event.outcome.as_str(),
                    event.importance,
                    event.contextuality,
                    event.actionability,
                    event.content_hash,
                    event.lifecycle_status.as_str(),
                    event.consolidation_score,
                    event.last_activation,
                    event.activation_count,
                    event.entity_id,
                ],
            )
            .map_err(|e| map_constraint(e, "event content_hash"))?;
            Ok(())
        })?;
        self.bump_epoch(project_id);
        Ok(event)
    }

    /// Look up an event by id
    pub fn event_get(&self, id: &str) -> Result<Option<EpisodicEvent>> {
        self.with_reader(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM episodic_events WHERE id = ?1", EVENT_COLUMNS),
                params![id],
                row_to_event,
            )
            .optional()
            .map_err(EngineError::from)
        })
    }

    /// Look up an event by content hash within a project
    pub fn event_get_by_hash(&self, project_id: &str, hash: &str) -> Result<Option<EpisodicEvent>> {
        self.with_reader(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM episodic_events WHERE project_id = ?1 AND content_hash = ?2",
                    EVENT_COLUMNS
                ),
                params![project_id, hash],
                row_to_event,
            )
            .optional()
            .map_err(EngineError::from)
        })
    }

    /// Fetch several events by id, preserving input order
    pub fn event_get_many(&self, ids: &[String]) -> Result<Vec<EpisodicEvent>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(event) = self.event_get(id)? {
                out.push(event);
            }
        }
        Ok(out)
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Transition an event's lifecycle, enforcing the model DAG. The read
    /// and write share one transaction so concurrent transitions serialize
    /// and the loser observes `InvalidTransition`.
    pub fn event_update_lifecycle(
        &self,
        id: &str,
        to: LifecycleStatus,
        consolidation_score: f64,
    ) -> Result<()> {
        let project_id = self.transaction(|tx| {
            event_update_lifecycle_tx(tx, id, to, consolidation_score, Utc::now())
        })?;
        self.bump_epoch(&project_id);
        Ok(())
    }

    // ========================================================================
    // ACCESS STATS
    // ========================================================================

    /// Monotonic access-stat update: counters never decrease, the last
    /// activation timestamp never moves backwards. Idempotent for equal
    /// inputs.
    pub fn event_update_access(
        &self,
        id: &str,
        new_last_activation: DateTime<Utc>,
        new_count: i64,
    ) -> Result<()> {
        self.with_writer(|conn| {
            let changed = conn.execute(
                "UPDATE episodic_events
                 SET activation_count = MAX(activation_count, ?2),
                     last_activation = MAX(last_activation, ?3)
                 WHERE id = ?1",
                params![id, new_count, new_last_activation],
            )?;
            if changed == 0 {
                return Err(EngineError::NotFound(format!("event {}", id)));
            }
            Ok(())
        })
    }

    /// Batched delta updates from the flusher. Unknown ids are skipped;
    /// failures are the caller's to log, never to surface.
    pub fn event_touch_batch(&self, updates: &[(String, DateTime<Utc>, i64)]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        self.transaction(|tx| {
            let mut stmt = tx.prepare(
                "UPDATE episodic_events
                 SET activation_count = activation_count + ?2,
                     last_activation = MAX(last_activation, ?3)
                 WHERE id = ?1",
            )?;
            for (id, at, delta) in updates {
                stmt.execute(params![id, delta.max(&0), at])?;
            }
            Ok(())
        })
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Filtered event query. Archived events are excluded unless the filter
    /// names them explicitly or sets `include_archived`.
    pub fn event_query(&self, project_id: &str, filter: &EventFilter) -> Result<Vec<EpisodicEvent>> {
        let mut sql = format!(
            "SELECT {} FROM episodic_events WHERE project_id = ?1",
            EVENT_COLUMNS
        );
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(project_id.to_string())];

        let statuses: Vec<&'static str> = if !filter.lifecycle_statuses.is_empty() {
            filter.lifecycle_statuses.iter().map(|s| s.as_str()).collect()
        } else if filter.include_archived {
            vec!["active", "consolidated", "archived"]
        } else {
            vec!["active", "consolidated"]
        };
        let placeholders: Vec<String> = statuses
            .iter()
            .enumerate()
            .map(|(i, _)| format!("?{}", args.len() + i + 1))
            .collect();
        sql.push_str(&format!(
            " AND lifecycle_status IN ({})",
            placeholders.join(", ")
        ));
        for s in &statuses {
            args.push(Box::new(s.to_string()));
        }

        if let Some(session) = &filter.session_id {
            args.push(Box::new(session.clone()));
            sql.push_str(&format!(" AND session_id = ?{}", args.len()));
        }
        if let Some(since) = filter.since {
            args.push(Box::new(since));
            sql.push_str(&format!(" AND timestamp >= ?{}", args.len()));
        }
        if let Some(until) = filter.until {
            args.push(Box::new(until));
            sql.push_str(&format!(" AND timestamp <= ?{}", args.len()));
        }
        if !filter.event_types.is_empty() {
            let base = args.len();
            let marks: Vec<String> = filter
                .event_types
                .iter()
                .enumerate()
                .map(|(i, _)| format!("?{}", base + i + 1))
                .collect();
            sql.push_str(&format!(" AND event_type IN ({})", marks.join(", ")));
            for t in &filter.event_types {
                args.push(Box::new(t.as_str().to_string()));
            }
        }

        // Session timelines read oldest-first; everything else newest-first
        match filter.order_by {
            EventOrder::Timestamp => {
                if filter.session_id.is_some() {
                    sql.push_str(" ORDER BY timestamp ASC");
                } else {
                    sql.push_str(" ORDER BY timestamp DESC");
                }
            }
            EventOrder::Activation => {
                sql.push_str(" ORDER BY activation_count DESC, last_activation DESC");
            }
        }

        let limit = filter.limit.unwrap_or(100);
        sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, filter.offset));

        self.with_reader(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let refs: Vec<&dyn rusqlite::types::ToSql> =
                args.iter().map(|b| b.as_ref()).collect();
            let rows = stmt.query_map(refs.as_slice(), row_to_event)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    /// FTS5 keyword search over event content, best matches first
    pub fn event_keyword_search(
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
                "SELECT e.id, -fts.rank FROM episodic_fts fts
                 JOIN episodic_events e ON e.id = fts.id
                 WHERE episodic_fts MATCH ?1
                   AND e.project_id = ?2
                   AND e.lifecycle_status != 'archived'
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

    /// Active events eligible for consolidation: past the grace period,
    /// embedding present, oldest first.
    pub fn events_for_consolidation(
        &self,
        project_id: &str,
        grace_secs: i64,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<EpisodicEvent>> {
        let cutoff = now - chrono::Duration::seconds(grace_secs);
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM episodic_events e
                 WHERE e.project_id = ?1
                   AND e.lifecycle_status = 'active'
                   AND e.timestamp <= ?2
                   AND EXISTS (SELECT 1 FROM event_embeddings emb WHERE emb.event_id = e.id)
                 ORDER BY e.timestamp ASC
                 LIMIT ?3",
                EVENT_COLUMNS
                    .split(", ")
                    .map(|c| format!("e.{}", c))
                    .collect::<Vec<_>>()
                    .join(", ")
            ))?;
            let rows = stmt.query_map(params![project_id, cutoff, limit as i64], row_to_event)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    /// Archive old low-importance active events; returns the number archived
    pub fn event_archive_pass(
        &self,
        project_id: &str,
        older_than: DateTime<Utc>,
        importance_below: f64,
    ) -> Result<u64> {
        let archived = self.with_writer(|conn| {
            let changed = conn.execute(
                "UPDATE episodic_events
                 SET lifecycle_status = 'archived'
                 WHERE project_id = ?1
                   AND lifecycle_status = 'active'
                   AND timestamp < ?2
                   AND importance < ?3",
                params![project_id, older_than, importance_below],
            )?;
            Ok(changed as u64)
        })?;
        if archived > 0 {
            self.bump_epoch(project_id);
        }
        Ok(archived)
    }

    /// Event counts by lifecycle status: (active, consolidated, archived)
    pub fn event_counts(&self, project_id: &str) -> Result<(i64, i64, i64)> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT lifecycle_status, COUNT(*) FROM episodic_events
                 WHERE project_id = ?1 GROUP BY lifecycle_status",
            )?;
            let rows = stmt.query_map(params![project_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            let (mut active, mut consolidated, mut archived) = (0, 0, 0);
            for row in rows {
                let (status, count) = row?;
                match status.as_str() {
                    "active" => active = count,
                    "consolidated" => consolidated = count,
                    "archived" => archived = count,
                    _ => {}
                }
            }
            Ok((active, consolidated, archived))
        })
    }

    // ========================================================================
    // EMBEDDINGS
    // ========================================================================

    /// Persist an event embedding and add it to the vector index
    pub fn event_set_embedding(
        &self,
        event_id: &str,
        project_id: &str,
        embedding: &Embedding,
        model: &str,
    ) -> Result<()> {
        self.with_writer(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO event_embeddings
                 (event_id, embedding, dimensions, model, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    event_id,
                    embedding.to_bytes(),
                    embedding.dimensions as i64,
                    model,
                    Utc::now()
                ],
            )?;
            Ok(())
        })?;
        self.event_index()?.insert(project_id, event_id, &embedding.vector);
        Ok(())
    }

    /// Load a stored event embedding, if present
    pub fn event_embedding(&self, event_id: &str) -> Result<Option<Embedding>> {
        self.with_reader(|conn| {
            let bytes: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT embedding FROM event_embeddings WHERE event_id = ?1",
                    params![event_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(bytes.and_then(|b| Embedding::from_bytes(&b)))
        })
    }

    /// Events with no embedding, or one produced by a different model
    /// (drift); feeds the re-embed pass.
    pub fn events_missing_embeddings(
        &self,
        project_id: &str,
        model: &str,
        limit: usize,
    ) -> Result<Vec<(String, String)>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT e.id, e.content FROM episodic_events e
                 LEFT JOIN event_embeddings emb ON emb.event_id = e.id
                 WHERE e.project_id = ?1
                   AND e.lifecycle_status != 'archived'
                   AND (emb.event_id IS NULL OR emb.model != ?2)
                 ORDER BY e.timestamp DESC
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
}

/// Transaction-scoped lifecycle transition; returns the project id so the
/// caller can bump the write epoch after commit.
pub(crate) fn event_update_lifecycle_tx(
    conn: &Connection,
    id: &str,
    to: LifecycleStatus,
    consolidation_score: f64,
    now: DateTime<Utc>,
) -> Result<String> {
    let (project_id, current): (String, String) = conn
        .query_row(
            "SELECT project_id, lifecycle_status FROM episodic_events WHERE id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?
        .ok_or_else(|| EngineError::NotFound(format!("event {}", id)))?;

    let from = LifecycleStatus::parse_name(&current);
    if !from.can_transition(to) {
        return Err(EngineError::InvalidTransition(format!(
            "event {} cannot move {} -> {}",
            id, from, to
        )));
    }

    conn.execute(
        "UPDATE episodic_events
         SET lifecycle_status = ?2,
             consolidation_score = ?3,
             last_activation = MAX(last_activation, ?4)
         WHERE id = ?1",
        params![id, to.as_str(), consolidation_score.clamp(0.0, 1.0), now],
    )?;
    Ok(project_id)
}

// ============================================================================
// TESTS
// ============================================================================
