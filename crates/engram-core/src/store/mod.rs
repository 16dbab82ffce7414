//! Store - single source of truth over SQLite
//!
//! One writer connection plus a small round-robin pool of readers, all
//! behind typed per-layer APIs. Multi-row invariants (lifecycle transition
//! with semantic insert, merge-vs-insert, dependency cycle checks) are
//! enforced inside write transactions, never by in-process locks.
//!
//! The store also owns the in-memory vector indexes (events and semantic
//! memories) and a per-project write epoch used by the recall cache for
//! coarse invalidation.

mod events;
mod graph;
pub mod migrations;
mod procedures;
mod prospective;
mod records;
mod semantic;

pub use semantic::{SemanticFilter, SemanticHit};

pub(crate) use events::event_update_lifecycle_tx;
pub(crate) use records::new_run_record;
pub(crate) use semantic::{semantic_insert_tx, semantic_merge_tx, semantic_set_state_tx};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use crate::embeddings::DEFAULT_DIMENSIONS;
use crate::error::{EngineError, Result};
use crate::model::Project;
use crate::search::VectorIndex;

// ============================================================================
// STORE
// ============================================================================

/// Persistent backend for all memory layers.
///
/// All methods take `&self`; `Store` is `Send + Sync` and shared as
/// `Arc<Store>` across request handlers and background workers.
pub struct Store {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    next_reader: AtomicUsize,
    /// Vector index over episodic event embeddings
    event_index: Mutex<VectorIndex>,
    /// Vector index over semantic memory embeddings
    semantic_index: Mutex<VectorIndex>,
    /// Per-project write epoch; bumped on any layer write
    write_epochs: Mutex<HashMap<String, u64>>,
    dimensions: usize,
}

impl Store {
    /// Apply PRAGMAs to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (or create) a store at the given path with default dimensions.
    ///
    /// `None` resolves to the platform data directory.
    pub fn open(db_path: Option<PathBuf>, reader_pool_size: usize) -> Result<Self> {
        Self::open_with_dimensions(db_path, reader_pool_size, DEFAULT_DIMENSIONS)
    }

    /// Open with an explicit embedding dimensionality
    pub fn open_with_dimensions(
        db_path: Option<PathBuf>,
        reader_pool_size: usize,
        dimensions: usize,
    ) -> Result<Self> {
        let path = match db_path {
            Some(p) => p,
            None => {
                let dirs = directories::ProjectDirs::from("ai", "engram", "core").ok_or_else(
                    || EngineError::Internal("could not determine data directory".to_string()),
                )?;
                let data_dir = dirs.data_dir();
                std::fs::create_dir_all(data_dir)?;
                data_dir.join("engram.db")
            }
        };

        let writer = Connection::open(&path)?;
        Self::configure_connection(&writer)?;
        migrations::apply_migrations(&writer)?;

        let pool = reader_pool_size.max(1);
        let mut readers = Vec::with_capacity(pool);
        for _ in 0..pool {
            let conn = Connection::open(&path)?;
            Self::configure_connection(&conn)?;
            readers.push(Mutex::new(conn));
        }

        let store = Self {
            writer: Mutex::new(writer),
            readers,
            next_reader: AtomicUsize::new(0),
            event_index: Mutex::new(VectorIndex::new(dimensions)),
            semantic_index: Mutex::new(VectorIndex::new(dimensions)),
            write_epochs: Mutex::new(HashMap::new()),
            dimensions,
        };
        store.load_vector_indexes()?;
        Ok(store)
    }

    /// Configured embedding dimensionality
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    // ========================================================================
    // CONNECTION ACCESS
    // ========================================================================

    /// Run a read-only closure on the next pooled reader
    pub(crate) fn with_reader<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let idx = self.next_reader.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = self.readers[idx]
            .lock()
            .map_err(|_| EngineError::Internal("reader lock poisoned".to_string()))?;
        f(&conn)
    }

    /// Run a write closure on the writer connection
    pub(crate) fn with_writer<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .writer
            .lock()
            .map_err(|_| EngineError::Internal("writer lock poisoned".to_string()))?;
        f(&conn)
    }

    /// Run `f` inside an immediate transaction on the writer; rolls back on
    /// any error.
    pub fn transaction<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self
            .writer
            .lock()
            .map_err(|_| EngineError::Internal("writer lock poisoned".to_string()))?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    // ========================================================================
    // WRITE EPOCHS
    // ========================================================================

    /// Current write epoch for a project (0 when never written)
    pub fn epoch(&self, project_id: &str) -> u64 {
        self.write_epochs
            .lock()
            .map(|m| m.get(project_id).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Bump the project's write epoch; called on every layer write
    pub(crate) fn bump_epoch(&self, project_id: &str) {
        if let Ok(mut map) = self.write_epochs.lock() {
            *map.entry(project_id.to_string()).or_insert(0) += 1;
        }
    }

    // ========================================================================
    // VECTOR INDEX ACCESS
    // ========================================================================

    pub(crate) fn event_index(&self) -> Result<std::sync::MutexGuard<'_, VectorIndex>> {
        self.event_index
            .lock()
            .map_err(|_| EngineError::Internal("event index lock poisoned".to_string()))
    }

    pub(crate) fn semantic_index(&self) -> Result<std::sync::MutexGuard<'_, VectorIndex>> {
        self.semantic_index
            .lock()
            .map_err(|_| EngineError::Internal("semantic index lock poisoned".to_string()))
    }

    /// Load persisted embeddings into the in-memory indexes on startup
    fn load_vector_indexes(&self) -> Result<()> {
        let rows: Vec<(String, String, Vec<u8>)> = self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT e.event_id, ev.project_id, e.embedding
                 FROM event_embeddings e
                 JOIN episodic_events ev ON ev.id = e.event_id",
            )?;
            let out = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .filter_map(|r| r.ok())
                .collect();
            Ok(out)
        })?;
        {
            let mut index = self.event_index()?;
            for (id, project_id, bytes) in rows {
                if let Some(embedding) = crate::embeddings::Embedding::from_bytes(&bytes) {
                    index.insert(&project_id, &id, &embedding.vector);
                }
            }
        }

        let rows: Vec<(String, String, Vec<u8>)> = self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT s.memory_id, m.project_id, s.embedding
                 FROM semantic_embeddings s
                 JOIN semantic_memories m ON m.id = s.memory_id",
            )?;
            let out = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .filter_map(|r| r.ok())
                .collect();
            Ok(out)
        })?;
        {
            let mut index = self.semantic_index()?;
            for (id, project_id, bytes) in rows {
                if let Some(embedding) = crate::embeddings::Embedding::from_bytes(&bytes) {
                    index.insert(&project_id, &id, &embedding.vector);
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // PROJECTS
    // ========================================================================

    /// Find or create a project by name; refreshes `last_accessed_at`
    pub fn project_upsert(&self, name: &str, path: Option<&str>) -> Result<Project> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::InvalidArgument(
                "project name cannot be empty".to_string(),
            ));
        }
        let now = Utc::now();
        if let Some(existing) = self.project_get_by_name(name)? {
            self.with_writer(|conn| {
                conn.execute(
                    "UPDATE projects SET last_accessed_at = ?1 WHERE id = ?2",
                    params![now, existing.id],
                )?;
                Ok(())
            })?;
            return Ok(Project {
                last_accessed_at: now,
                ..existing
            });
        }

        let project = Project {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            path: path.map(str::to_string),
            language: None,
            created_at: now,
            last_accessed_at: now,
        };
        self.with_writer(|conn| {
            conn.execute(
                "INSERT INTO projects (id, name, path, language, created_at, last_accessed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    project.id,
                    project.name,
                    project.path,
                    project.language,
                    project.created_at,
                    project.last_accessed_at
                ],
            )
            .map_err(|e| crate::error::map_constraint(e, "project name"))?;
            Ok(())
        })?;
        Ok(project)
    }

    /// Look up a project by id
    pub fn project_get(&self, id: &str) -> Result<Option<Project>> {
        self.with_reader(|conn| {
            conn.query_row(
                "SELECT id, name, path, language, created_at, last_accessed_at
                 FROM projects WHERE id = ?1",
                params![id],
                row_to_project,
            )
            .optional()
            .map_err(EngineError::from)
        })
    }

    /// Look up a project by name
    pub fn project_get_by_name(&self, name: &str) -> Result<Option<Project>> {
        self.with_reader(|conn| {
            conn.query_row(
                "SELECT id, name, path, language, created_at, last_accessed_at
                 FROM projects WHERE name = ?1",
                params![name],
                row_to_project,
            )
            .optional()
            .map_err(EngineError::from)
        })
    }

    /// Require a project to exist
    pub(crate) fn project_require(&self, id: &str) -> Result<Project> {
        self.project_get(id)?
            .ok_or_else(|| EngineError::NotFound(format!("project {}", id)))
    }

    /// All projects, most recently accessed first (scheduler sweep order)
    pub fn project_list(&self) -> Result<Vec<Project>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, path, language, created_at, last_accessed_at
                 FROM projects ORDER BY last_accessed_at DESC",
            )?;
            let rows = stmt.query_map([], row_to_project)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }
}

fn row_to_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        path: row.get(2)?,
        language: row.get(3)?,
        created_at: row.get(4)?,
        last_accessed_at: row.get(5)?,
    })
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod tests {
    use super::test_util::test_store;

    #[test]
    fn project_upsert_is_idempotent() {
        let (store, _dir) = test_store();
        let a = store.project_upsert("demo", Some("/tmp/demo")).unwrap();
        let b = store.project_upsert("demo", None).unwrap();
        assert_eq!(a.id, b.id);
        assert!(b.last_accessed_at >= a.last_accessed_at);
    }

    #[test]
    fn project_name_is_validated() {
        let (store, _dir) = test_store();
        assert!(store.project_upsert("  ", None).is_err());
    }

    #[test]
    fn epochs_start_at_zero() {
        let (store, _dir) = test_store();
        assert_eq!(store.epoch("nope"), 0);
        store.bump_epoch("p1");
        store.bump_epoch("p1");
        assert_eq!(store.epoch("p1"), 2);
    }
}
