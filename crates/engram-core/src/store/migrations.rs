//! Database migrations
//!
//! Ordered, idempotent schema definitions. Each migration runs at most once
//! per database; `schema_version` records what has been applied.

use rusqlite::Connection;

use crate::error::Result;

/// Migration definitions, applied in order
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Core schema: projects, episodic events, semantic memories",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Procedural, prospective, and graph layers",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "Meta layer: estimate accuracy, consolidation run history",
        up: MIGRATION_V3_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// Apply all pending migrations on the given connection
pub fn apply_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );",
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        tracing::info!(
            version = migration.version,
            description = migration.description,
            "applying migration"
        );
        conn.execute_batch(migration.up)?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, datetime('now'))",
            [migration.version],
        )?;
    }

    Ok(())
}

/// V1: projects, episodic events (dedup hash, lifecycle, activation stats),
/// semantic memories (embeddings, FTS5), and their indexes.
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    path TEXT,
    language TEXT,
    created_at TEXT NOT NULL,
    last_accessed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS episodic_events (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    session_id TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    event_type TEXT NOT NULL DEFAULT 'action',
    content TEXT NOT NULL,
    context TEXT NOT NULL DEFAULT '{}',
    outcome TEXT NOT NULL DEFAULT 'unknown',
    importance REAL NOT NULL DEFAULT 0.5,
    contextuality REAL NOT NULL DEFAULT 0.5,
    actionability REAL NOT NULL DEFAULT 0.5,
    content_hash TEXT NOT NULL,
    lifecycle_status TEXT NOT NULL DEFAULT 'active',
    consolidation_score REAL NOT NULL DEFAULT 0.0,
    last_activation TEXT NOT NULL,
    activation_count INTEGER NOT NULL DEFAULT 0,
    entity_id TEXT,
    UNIQUE(project_id, content_hash)
);

CREATE INDEX IF NOT EXISTS idx_events_project_time
    ON episodic_events(project_id, timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_events_active
    ON episodic_events(project_id, lifecycle_status)
    WHERE lifecycle_status = 'active';
CREATE INDEX IF NOT EXISTS idx_events_session
    ON episodic_events(project_id, session_id, timestamp);

-- Embeddings as little-endian f32 blobs; model recorded for drift detection
CREATE TABLE IF NOT EXISTS event_embeddings (
    event_id TEXT PRIMARY KEY REFERENCES episodic_events(id) ON DELETE CASCADE,
    embedding BLOB NOT NULL,
    dimensions INTEGER NOT NULL,
    model TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE VIRTUAL TABLE IF NOT EXISTS episodic_fts USING fts5(
    id,
    content,
    content='episodic_events',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS episodic_ai AFTER INSERT ON episodic_events BEGIN
    INSERT INTO episodic_fts(rowid, id, content)
    VALUES (NEW.rowid, NEW.id, NEW.content);
END;

CREATE TRIGGER IF NOT EXISTS episodic_ad AFTER DELETE ON episodic_events BEGIN
    INSERT INTO episodic_fts(episodic_fts, rowid, id, content)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.content);
END;

CREATE TRIGGER IF NOT EXISTS episodic_au AFTER UPDATE ON episodic_events BEGIN
    INSERT INTO episodic_fts(episodic_fts, rowid, id, content)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.content);
    INSERT INTO episodic_fts(rowid, id, content)
    VALUES (NEW.rowid, NEW.id, NEW.content);
END;

CREATE TABLE IF NOT EXISTS semantic_memories (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    content TEXT NOT NULL,
    memory_type TEXT NOT NULL DEFAULT 'fact',
    tags TEXT NOT NULL DEFAULT '[]',
    quality_score REAL NOT NULL DEFAULT 0.5,
    source_event_ids TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    access_count INTEGER NOT NULL DEFAULT 0,
    consolidation_state TEXT NOT NULL DEFAULT 'unconsolidated',
    last_retrieved_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_semantic_state
    ON semantic_memories(project_id, consolidation_state);

CREATE TABLE IF NOT EXISTS semantic_embeddings (
    memory_id TEXT PRIMARY KEY REFERENCES semantic_memories(id) ON DELETE CASCADE,
    embedding BLOB NOT NULL,
    dimensions INTEGER NOT NULL,
    model TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE VIRTUAL TABLE IF NOT EXISTS semantic_fts USING fts5(
    id,
    content,
    tags,
    content='semantic_memories',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS semantic_ai AFTER INSERT ON semantic_memories BEGIN
    INSERT INTO semantic_fts(rowid, id, content, tags)
    VALUES (NEW.rowid, NEW.id, NEW.content, NEW.tags);
END;

CREATE TRIGGER IF NOT EXISTS semantic_ad AFTER DELETE ON semantic_memories BEGIN
    INSERT INTO semantic_fts(semantic_fts, rowid, id, content, tags)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.content, OLD.tags);
END;

CREATE TRIGGER IF NOT EXISTS semantic_au AFTER UPDATE ON semantic_memories BEGIN
    INSERT INTO semantic_fts(semantic_fts, rowid, id, content, tags)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.content, OLD.tags);
    INSERT INTO semantic_fts(rowid, id, content, tags)
    VALUES (NEW.rowid, NEW.id, NEW.content, NEW.tags);
END;
"#;

/// V2: procedures, tasks/goals/dependencies, graph entities and relations
const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS procedures (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    category TEXT NOT NULL DEFAULT '',
    steps TEXT NOT NULL DEFAULT '[]',
    preconditions TEXT NOT NULL DEFAULT '[]',
    postconditions TEXT NOT NULL DEFAULT '[]',
    success_count INTEGER NOT NULL DEFAULT 0,
    failure_count INTEGER NOT NULL DEFAULT 0,
    total_duration_ms INTEGER NOT NULL DEFAULT 0,
    last_executed_at TEXT,
    source_event_ids TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    UNIQUE(project_id, name)
);

CREATE TABLE IF NOT EXISTS prospective_tasks (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    priority INTEGER NOT NULL DEFAULT 5,
    status TEXT NOT NULL DEFAULT 'pending',
    due_at TEXT,
    effort_estimate_minutes INTEGER,
    effort_actual_minutes INTEGER,
    complexity INTEGER NOT NULL DEFAULT 5,
    tags TEXT NOT NULL DEFAULT '[]',
    goal_id TEXT,
    created_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_tasks_status
    ON prospective_tasks(project_id, status);

CREATE TABLE IF NOT EXISTS task_dependencies (
    from_task_id TEXT NOT NULL REFERENCES prospective_tasks(id) ON DELETE CASCADE,
    to_task_id TEXT NOT NULL REFERENCES prospective_tasks(id) ON DELETE CASCADE,
    dep_type TEXT NOT NULL DEFAULT 'blocks',
    UNIQUE(from_task_id, to_task_id)
);

CREATE TABLE IF NOT EXISTS prospective_goals (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    priority INTEGER NOT NULL DEFAULT 5,
    progress INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'active',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS entities (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    entity_type TEXT NOT NULL DEFAULT 'concept',
    observations TEXT NOT NULL DEFAULT '[]',
    importance REAL NOT NULL DEFAULT 0.5,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(project_id, name, entity_type)
);

CREATE INDEX IF NOT EXISTS idx_entities_name ON entities(project_id, name);

CREATE TABLE IF NOT EXISTS entity_relations (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    from_entity_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    to_entity_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    relation_type TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    UNIQUE(from_entity_id, to_entity_id, relation_type)
);

CREATE INDEX IF NOT EXISTS idx_relations_from ON entity_relations(from_entity_id);
CREATE INDEX IF NOT EXISTS idx_relations_to ON entity_relations(to_entity_id);
"#;

/// V3: estimation accuracy records and consolidation run history
const MIGRATION_V3_UP: &str = r#"
CREATE TABLE IF NOT EXISTS estimate_accuracy (
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    task_id TEXT NOT NULL,
    task_type TEXT NOT NULL DEFAULT 'general',
    estimate_minutes INTEGER NOT NULL,
    actual_minutes INTEGER NOT NULL,
    accuracy REAL NOT NULL,
    bias_factor REAL NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_accuracy_project
    ON estimate_accuracy(project_id, task_type);

CREATE TABLE IF NOT EXISTS consolidation_runs (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    strategy TEXT NOT NULL,
    events_scanned INTEGER NOT NULL DEFAULT 0,
    patterns_extracted INTEGER NOT NULL DEFAULT 0,
    events_promoted INTEGER NOT NULL DEFAULT 0,
    events_archived INTEGER NOT NULL DEFAULT 0,
    errors TEXT NOT NULL DEFAULT '[]'
);

CREATE INDEX IF NOT EXISTS idx_runs_project
    ON consolidation_runs(project_id, started_at DESC);
"#;

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered_and_unique() {
        let mut versions: Vec<u32> = MIGRATIONS.iter().map(|m| m.version).collect();
        let sorted = versions.clone();
        versions.dedup();
        assert_eq!(versions, sorted);
        assert_eq!(versions.first(), Some(&1));
    }

    #[test]
    fn migrations_apply_twice_without_error() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        apply_migrations(&conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, MIGRATIONS.last().unwrap().version);
    }

    #[test]
    fn schema_has_expected_tables() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();

        for table in [
            "projects",
            "episodic_events",
            "event_embeddings",
            "semantic_memories",
            "semantic_embeddings",
            "procedures",
            "prospective_tasks",
            "task_dependencies",
            "prospective_goals",
            "entities",
            "entity_relations",
            "estimate_accuracy",
            "consolidation_runs",
        ] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {}", table);
        }
    }
}
