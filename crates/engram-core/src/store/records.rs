//! Bookkeeping persistence: estimate accuracy, consolidation run history

use rusqlite::params;
use uuid::Uuid;

use super::Store;
use crate::error::Result;
use crate::model::{ConsolidationRunRecord, EstimateAccuracyRecord};

fn row_to_accuracy(row: &rusqlite::Row<'_>) -> rusqlite::Result<EstimateAccuracyRecord> {
    Ok(EstimateAccuracyRecord {
        project_id: row.get(0)?,
        task_id: row.get(1)?,
        task_type: row.get(2)?,
        estimate_minutes: row.get(3)?,
        actual_minutes: row.get(4)?,
        accuracy: row.get(5)?,
        bias_factor: row.get(6)?,
        recorded_at: row.get(7)?,
    })
}

impl Store {
    /// Estimate-accuracy history, newest first, optionally per task type
    pub fn estimate_accuracy_list(
        &self,
        project_id: &str,
        task_type: Option<&str>,
    ) -> Result<Vec<EstimateAccuracyRecord>> {
        self.with_reader(|conn| {
            let mut out = Vec::new();
            match task_type {
                Some(t) => {
                    let mut stmt = conn.prepare(
                        "SELECT project_id, task_id, task_type, estimate_minutes, actual_minutes,
                                accuracy, bias_factor, recorded_at
                         FROM estimate_accuracy
                         WHERE project_id = ?1 AND task_type = ?2
                         ORDER BY recorded_at DESC",
                    )?;
                    let rows = stmt.query_map(params![project_id, t], row_to_accuracy)?;
                    for row in rows {
                        out.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT project_id, task_id, task_type, estimate_minutes, actual_minutes,
                                accuracy, bias_factor, recorded_at
                         FROM estimate_accuracy
                         WHERE project_id = ?1
                         ORDER BY recorded_at DESC",
                    )?;
                    let rows = stmt.query_map(params![project_id], row_to_accuracy)?;
                    for row in rows {
                        out.push(row?);
                    }
                }
            }
            Ok(out)
        })
    }

    /// Row counts per layer table for one project:
    /// (procedures, tasks, goals, entities, relations)
    pub fn layer_counts(&self, project_id: &str) -> Result<(i64, i64, i64, i64, i64)> {
        self.with_reader(|conn| {
            let count = |sql: &str| -> rusqlite::Result<i64> {
                conn.query_row(sql, params![project_id], |row| row.get(0))
            };
            Ok((
                count("SELECT COUNT(*) FROM procedures WHERE project_id = ?1")?,
                count("SELECT COUNT(*) FROM prospective_tasks WHERE project_id = ?1")?,
                count("SELECT COUNT(*) FROM prospective_goals WHERE project_id = ?1")?,
                count("SELECT COUNT(*) FROM entities WHERE project_id = ?1")?,
                count("SELECT COUNT(*) FROM entity_relations WHERE project_id = ?1")?,
            ))
        })
    }

    /// Persist a consolidation run summary
    pub fn consolidation_run_insert(&self, record: &ConsolidationRunRecord) -> Result<()> {
        let errors = serde_json::to_string(&record.errors).unwrap_or_else(|_| "[]".into());
        self.with_writer(|conn| {
            conn.execute(
                "INSERT INTO consolidation_runs
                 (id, project_id, started_at, finished_at, strategy, events_scanned,
                  patterns_extracted, events_promoted, events_archived, errors)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    record.id,
                    record.project_id,
                    record.started_at,
                    record.finished_at,
                    record.strategy,
                    record.events_scanned,
                    record.patterns_extracted,
                    record.events_promoted,
                    record.events_archived,
                    errors,
                ],
            )?;
            Ok(())
        })
    }

    /// Recent consolidation runs, newest first
    pub fn consolidation_runs_list(
        &self,
        project_id: &str,
        limit: usize,
    ) -> Result<Vec<ConsolidationRunRecord>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, project_id, started_at, finished_at, strategy, events_scanned,
                        patterns_extracted, events_promoted, events_archived, errors
                 FROM consolidation_runs
                 WHERE project_id = ?1
                 ORDER BY started_at DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![project_id, limit as i64], row_to_run)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }
}

fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConsolidationRunRecord> {
    let errors: String = row.get(9)?;
    Ok(ConsolidationRunRecord {
        id: row.get(0)?,
        project_id: row.get(1)?,
        started_at: row.get(2)?,
        finished_at: row.get(3)?,
        strategy: row.get(4)?,
        events_scanned: row.get(5)?,
        patterns_extracted: row.get(6)?,
        events_promoted: row.get(7)?,
        events_archived: row.get(8)?,
        errors: serde_json::from_str(&errors).unwrap_or_default(),
    })
}

/// Fresh run record with a generated id
pub(crate) fn new_run_record(
    project_id: &str,
    strategy: &str,
    started_at: chrono::DateTime<chrono::Utc>,
) -> ConsolidationRunRecord {
    ConsolidationRunRecord {
        id: Uuid::new_v4().to_string(),
        project_id: project_id.to_string(),
        started_at,
        finished_at: started_at,
        strategy: strategy.to_string(),
        events_scanned: 0,
        patterns_extracted: 0,
        events_promoted: 0,
        events_archived: 0,
        errors: vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_util::test_store;
    use chrono::Utc;

    #[test]
    fn run_records_roundtrip() {
        let (store, _dir) = test_store();
        let project = store.project_upsert("p", None).unwrap();
        let mut record = new_run_record(&project.id, "balanced", Utc::now());
        record.events_scanned = 12;
        record.patterns_extracted = 2;
        record.events_promoted = 8;
        record.errors = vec!["cluster 3: reasoner unavailable".into()];
        store.consolidation_run_insert(&record).unwrap();

        let runs = store.consolidation_runs_list(&project.id, 10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].events_scanned, 12);
        assert_eq!(runs[0].errors.len(), 1);
    }
}
