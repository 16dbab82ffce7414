//! Procedure persistence

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::Store;
use crate::error::{map_constraint, EngineError, Result};
use crate::model::{Procedure, ProcedureInput};

const PROCEDURE_COLUMNS: &str = "id, project_id, name, description, category, steps, \
     preconditions, postconditions, success_count, failure_count, total_duration_ms, \
     last_executed_at, source_event_ids, created_at";

fn row_to_procedure(row: &rusqlite::Row<'_>) -> rusqlite::Result<Procedure> {
    let steps: String = row.get(5)?;
    let pre: String = row.get(6)?;
    let post: String = row.get(7)?;
    let sources: String = row.get(12)?;
    Ok(Procedure {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        category: row.get(4)?,
        steps: serde_json::from_str(&steps).unwrap_or_default(),
        preconditions: serde_json::from_str(&pre).unwrap_or_default(),
        postconditions: serde_json::from_str(&post).unwrap_or_default(),
        success_count: row.get(8)?,
        failure_count: row.get(9)?,
        total_duration_ms: row.get(10)?,
        last_executed_at: row.get(11)?,
        source_event_ids: serde_json::from_str(&sources).unwrap_or_default(),
        created_at: row.get(13)?,
    })
}

impl Store {
    /// Create a procedure; name is unique per project
    pub fn procedure_insert(&self, project_id: &str, input: &ProcedureInput) -> Result<Procedure> {
        if input.name.trim().is_empty() {
            return Err(EngineError::InvalidArgument(
                "procedure name cannot be empty".to_string(),
            ));
        }
        let procedure = Procedure {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            name: input.name.trim().to_string(),
            description: input.description.clone(),
            category: input.category.clone(),
            steps: input.steps.clone(),
            preconditions: input.preconditions.clone(),
            postconditions: input.postconditions.clone(),
            success_count: 0,
            failure_count: 0,
            total_duration_ms: 0,
            last_executed_at: None,
            source_event_ids: input.source_event_ids.clone(),
            created_at: Utc::now(),
        };
        let steps = serde_json::to_string(&procedure.steps)
            .map_err(|e| EngineError::Internal(format!("steps serialization: {}", e)))?;
        let pre = serde_json::to_string(&procedure.preconditions).unwrap_or_else(|_| "[]".into());
        let post = serde_json::to_string(&procedure.postconditions).unwrap_or_else(|_| "[]".into());
        let sources =
            serde_json::to_string(&procedure.source_event_ids).unwrap_or_else(|_| "[]".into());

        self.with_writer(|conn| {
            conn.execute(
                "INSERT INTO procedures (
                    id, project_id, name, description, category, steps, preconditions,
                    postconditions, success_count, failure_count, total_duration_ms,
                    last_executed_at, source_event_ids, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, 0, 0, NULL, ?9, ?10)",
                params![
                    procedure.id,
                    procedure.project_id,
                    procedure.name,
                    procedure.description,
                    procedure.category,
                    steps,
                    pre,
                    post,
                    sources,
                    procedure.created_at,
                ],
            )
            .map_err(|e| map_constraint(e, "procedure name"))?;
            Ok(())
        })?;
        self.bump_epoch(project_id);
        Ok(procedure)
    }

    /// Look up by id
    pub fn procedure_get(&self, id: &str) -> Result<Option<Procedure>> {
        self.with_reader(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM procedures WHERE id = ?1", PROCEDURE_COLUMNS),
                params![id],
                row_to_procedure,
            )
            .optional()
            .map_err(EngineError::from)
        })
    }

    /// Look up by (project, name)
    pub fn procedure_get_by_name(&self, project_id: &str, name: &str) -> Result<Option<Procedure>> {
        self.with_reader(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM procedures WHERE project_id = ?1 AND name = ?2",
                    PROCEDURE_COLUMNS
                ),
                params![project_id, name],
                row_to_procedure,
            )
            .optional()
            .map_err(EngineError::from)
        })
    }

    /// Substring search across name, description, and category, most
    /// effective procedures first.
    pub fn procedure_find(
        &self,
        project_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<Procedure>> {
        let pattern = format!("%{}%", query.trim().to_lowercase());
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM procedures
                 WHERE project_id = ?1
                   AND (LOWER(name) LIKE ?2 OR LOWER(description) LIKE ?2 OR LOWER(category) LIKE ?2)
                 ORDER BY CAST(success_count AS REAL) / MAX(1, success_count + failure_count) DESC,
                          success_count + failure_count DESC
                 LIMIT ?3",
                PROCEDURE_COLUMNS
            ))?;
            let rows = stmt.query_map(params![project_id, pattern, k as i64], row_to_procedure)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    /// Record one execution: outcome counter, duration, timestamp
    pub fn procedure_record_execution(
        &self,
        id: &str,
        success: bool,
        duration_ms: i64,
    ) -> Result<Procedure> {
        let column = if success { "success_count" } else { "failure_count" };
        self.with_writer(|conn| {
            let changed = conn.execute(
                &format!(
                    "UPDATE procedures
                     SET {} = {} + 1,
                         total_duration_ms = total_duration_ms + ?2,
                         last_executed_at = ?3
                     WHERE id = ?1",
                    column, column
                ),
                params![id, duration_ms.max(0), Utc::now()],
            )?;
            if changed == 0 {
                return Err(EngineError::NotFound(format!("procedure {}", id)));
            }
            Ok(())
        })?;
        let updated = self
            .procedure_get(id)?
            .ok_or_else(|| EngineError::NotFound(format!("procedure {}", id)))?;
        self.bump_epoch(&updated.project_id);
        Ok(updated)
    }

    /// Delete a procedure
    pub fn procedure_delete(&self, id: &str) -> Result<()> {
        let project_id = self.with_writer(|conn| {
            let project_id: String = conn
                .query_row(
                    "SELECT project_id FROM procedures WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| EngineError::NotFound(format!("procedure {}", id)))?;
            conn.execute("DELETE FROM procedures WHERE id = ?1", params![id])?;
            Ok(project_id)
        })?;
        self.bump_epoch(&project_id);
        Ok(())
    }
}
