//! Prospective layer persistence: tasks, dependencies, goals
//!
//! Dependency inserts run cycle detection inside the write transaction so
//! the no-cycles invariant can never be raced into violation.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::Store;
use crate::error::{map_constraint, EngineError, Result};
use crate::model::{
    EstimateAccuracyRecord, Goal, GoalInput, GoalStatus, Task, TaskDependency, TaskInput,
    TaskStatus, TaskUpdate,
};

const TASK_COLUMNS: &str = "id, project_id, title, description, priority, status, due_at, \
     effort_estimate_minutes, effort_actual_minutes, complexity, tags, goal_id, created_at, \
     started_at, completed_at";

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let status: String = row.get(5)?;
    let tags: String = row.get(10)?;
    Ok(Task {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        priority: row.get::<_, i64>(4)? as u8,
        status: TaskStatus::parse_name(&status),
        due_at: row.get(6)?,
        effort_estimate_minutes: row.get(7)?,
        effort_actual_minutes: row.get(8)?,
        complexity: row.get::<_, i64>(9)? as u8,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        goal_id: row.get(11)?,
        created_at: row.get(12)?,
        started_at: row.get(13)?,
        completed_at: row.get(14)?,
    })
}

fn row_to_goal(row: &rusqlite::Row<'_>) -> rusqlite::Result<Goal> {
    let status: String = row.get(6)?;
    Ok(Goal {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        priority: row.get::<_, i64>(4)? as u8,
        progress: row.get::<_, i64>(5)? as u8,
        status: GoalStatus::parse_name(&status),
        created_at: row.get(7)?,
    })
}

impl Store {
    // ========================================================================
    // TASKS
    // ========================================================================

    /// Create a task in `pending`
    pub fn task_insert(&self, project_id: &str, input: &TaskInput) -> Result<Task> {
        if input.title.trim().is_empty() {
            return Err(EngineError::InvalidArgument(
                "task title cannot be empty".to_string(),
            ));
        }
        let task = Task {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            title: input.title.trim().to_string(),
            description: input.description.clone(),
            priority: input.priority.clamp(1, 10),
            status: TaskStatus::Pending,
            due_at: input.due_at,
            effort_estimate_minutes: input.effort_estimate_minutes,
            effort_actual_minutes: None,
            complexity: input.complexity.clamp(1, 10),
            tags: input.tags.clone(),
            goal_id: input.goal_id.clone(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        let tags = serde_json::to_string(&task.tags).unwrap_or_else(|_| "[]".into());
        self.with_writer(|conn| {
            conn.execute(
                "INSERT INTO prospective_tasks (
                    id, project_id, title, description, priority, status, due_at,
                    effort_estimate_minutes, effort_actual_minutes, complexity, tags,
                    goal_id, created_at, started_at, completed_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?7, NULL, ?8, ?9, ?10, ?11, NULL, NULL)",
                params![
                    task.id,
                    task.project_id,
                    task.title,
                    task.description,
                    task.priority as i64,
                    task.due_at,
                    task.effort_estimate_minutes,
                    task.complexity as i64,
                    tags,
                    task.goal_id,
                    task.created_at,
                ],
            )?;
            Ok(())
        })?;
        self.bump_epoch(project_id);
        Ok(task)
    }

    /// Look up by id
    pub fn task_get(&self, id: &str) -> Result<Option<Task>> {
        self.with_reader(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM prospective_tasks WHERE id = ?1", TASK_COLUMNS),
                params![id],
                row_to_task,
            )
            .optional()
            .map_err(EngineError::from)
        })
    }

    /// Apply a partial update. Status changes are validated against the
    /// transition rules; completing a task with both estimate and actual
    /// effort writes an estimate-accuracy record in the same transaction.
    pub fn task_update(&self, id: &str, update: &TaskUpdate) -> Result<Task> {
        let project_id = self.transaction(|tx| {
            let task = tx
                .query_row(
                    &format!("SELECT {} FROM prospective_tasks WHERE id = ?1", TASK_COLUMNS),
                    params![id],
                    row_to_task,
                )
                .optional()?
                .ok_or_else(|| EngineError::NotFound(format!("task {}", id)))?;

            let now = Utc::now();
            if let Some(to) = update.status {
                if !task.status.can_transition(to) {
                    return Err(EngineError::InvalidTransition(format!(
                        "task {} cannot move {} -> {}",
                        id, task.status, to
                    )));
                }
                tx.execute(
                    "UPDATE prospective_tasks SET status = ?2 WHERE id = ?1",
                    params![id, to.as_str()],
                )?;
                if to == TaskStatus::InProgress && task.started_at.is_none() {
                    tx.execute(
                        "UPDATE prospective_tasks SET started_at = ?2 WHERE id = ?1",
                        params![id, now],
                    )?;
                }
                if to.is_terminal() {
                    tx.execute(
                        "UPDATE prospective_tasks SET completed_at = ?2 WHERE id = ?1",
                        params![id, now],
                    )?;
                }
                if to == TaskStatus::Done {
                    let actual = update.effort_actual_minutes.or(task.effort_actual_minutes);
                    if let (Some(estimate), Some(actual)) =
                        (task.effort_estimate_minutes, actual)
                    {
                        let task_type = task
                            .tags
                            .first()
                            .cloned()
                            .unwrap_or_else(|| "general".to_string());
                        let record = EstimateAccuracyRecord::from_effort(
                            &task.project_id,
                            &task.id,
                            &task_type,
                            estimate,
                            actual,
                            now,
                        );
                        estimate_accuracy_insert_tx(tx, &record)?;
                    }
                }
            }
            if let Some(priority) = update.priority {
                tx.execute(
                    "UPDATE prospective_tasks SET priority = ?2 WHERE id = ?1",
                    params![id, priority.clamp(1, 10) as i64],
                )?;
            }
            if let Some(due) = update.due_at {
                tx.execute(
                    "UPDATE prospective_tasks SET due_at = ?2 WHERE id = ?1",
                    params![id, due],
                )?;
            }
            if let Some(actual) = update.effort_actual_minutes {
                tx.execute(
                    "UPDATE prospective_tasks SET effort_actual_minutes = ?2 WHERE id = ?1",
                    params![id, actual],
                )?;
            }
            if let Some(description) = &update.description {
                tx.execute(
                    "UPDATE prospective_tasks SET description = ?2 WHERE id = ?1",
                    params![id, description],
                )?;
            }
            Ok(task.project_id)
        })?;
        self.bump_epoch(&project_id);
        self.task_get(id)?
            .ok_or_else(|| EngineError::NotFound(format!("task {}", id)))
    }

    /// Tasks for a project, optionally restricted by status, highest
    /// priority first.
    pub fn task_list(
        &self,
        project_id: &str,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> Result<Vec<Task>> {
        self.with_reader(|conn| {
            let mut out = Vec::new();
            match status {
                Some(s) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {} FROM prospective_tasks
                         WHERE project_id = ?1 AND status = ?2
                         ORDER BY priority DESC, created_at ASC LIMIT ?3",
                        TASK_COLUMNS
                    ))?;
                    let rows =
                        stmt.query_map(params![project_id, s.as_str(), limit as i64], row_to_task)?;
                    for row in rows {
                        out.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {} FROM prospective_tasks
                         WHERE project_id = ?1
                         ORDER BY priority DESC, created_at ASC LIMIT ?2",
                        TASK_COLUMNS
                    ))?;
                    let rows = stmt.query_map(params![project_id, limit as i64], row_to_task)?;
                    for row in rows {
                        out.push(row?);
                    }
                }
            }
            Ok(out)
        })
    }

    // ========================================================================
    // DEPENDENCIES
    // ========================================================================

    /// Add a `blocks` edge from one task to another. The cycle check runs
    /// against the project's full dependency set inside the transaction.
    pub fn task_dependency_add(
        &self,
        from_task_id: &str,
        to_task_id: &str,
    ) -> Result<TaskDependency> {
        if from_task_id == to_task_id {
            return Err(EngineError::InvalidArgument(
                "a task cannot block itself".to_string(),
            ));
        }
        let project_id = self.transaction(|tx| {
            let project_id: String = tx
                .query_row(
                    "SELECT project_id FROM prospective_tasks WHERE id = ?1",
                    params![from_task_id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| EngineError::NotFound(format!("task {}", from_task_id)))?;
            let to_exists: Option<String> = tx
                .query_row(
                    "SELECT project_id FROM prospective_tasks WHERE id = ?1",
                    params![to_task_id],
                    |row| row.get(0),
                )
                .optional()?;
            match to_exists {
                Some(p) if p == project_id => {}
                Some(_) => {
                    return Err(EngineError::InvalidArgument(
                        "dependencies cannot cross projects".to_string(),
                    ))
                }
                None => return Err(EngineError::NotFound(format!("task {}", to_task_id))),
            }

            if dependency_would_cycle(tx, &project_id, from_task_id, to_task_id)? {
                return Err(EngineError::InvalidArgument(format!(
                    "dependency {} -> {} would create a cycle",
                    from_task_id, to_task_id
                )));
            }

            tx.execute(
                "INSERT INTO task_dependencies (from_task_id, to_task_id, dep_type)
                 VALUES (?1, ?2, 'blocks')",
                params![from_task_id, to_task_id],
            )
            .map_err(|e| map_constraint(e, "task dependency"))?;
            Ok(project_id)
        })?;
        self.bump_epoch(&project_id);
        Ok(TaskDependency {
            from_task_id: from_task_id.to_string(),
            to_task_id: to_task_id.to_string(),
        })
    }

    /// Open tasks that block the given task
    pub fn task_blockers(&self, task_id: &str) -> Result<Vec<Task>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM prospective_tasks t
                 JOIN task_dependencies d ON d.from_task_id = t.id
                 WHERE d.to_task_id = ?1 AND t.status NOT IN ('done', 'cancelled')",
                TASK_COLUMNS
                    .split(", ")
                    .map(|c| format!("t.{}", c))
                    .collect::<Vec<_>>()
                    .join(", ")
            ))?;
            let rows = stmt.query_map(params![task_id], row_to_task)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    // ========================================================================
    // GOALS
    // ========================================================================

    /// Create a goal
    pub fn goal_insert(&self, project_id: &str, input: &GoalInput) -> Result<Goal> {
        if input.name.trim().is_empty() {
            return Err(EngineError::InvalidArgument(
                "goal name cannot be empty".to_string(),
            ));
        }
        let goal = Goal {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            name: input.name.trim().to_string(),
            description: input.description.clone(),
            priority: input.priority.clamp(1, 10),
            progress: 0,
            status: GoalStatus::Active,
            created_at: Utc::now(),
        };
        self.with_writer(|conn| {
            conn.execute(
                "INSERT INTO prospective_goals
                 (id, project_id, name, description, priority, progress, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, 'active', ?6)",
                params![
                    goal.id,
                    goal.project_id,
                    goal.name,
                    goal.description,
                    goal.priority as i64,
                    goal.created_at
                ],
            )?;
            Ok(())
        })?;
        self.bump_epoch(project_id);
        Ok(goal)
    }

    /// Look up by id
    pub fn goal_get(&self, id: &str) -> Result<Option<Goal>> {
        self.with_reader(|conn| {
            conn.query_row(
                "SELECT id, project_id, name, description, priority, progress, status, created_at
                 FROM prospective_goals WHERE id = ?1",
                params![id],
                row_to_goal,
            )
            .optional()
            .map_err(EngineError::from)
        })
    }

    /// Update progress; 100 marks the goal completed
    pub fn goal_set_progress(&self, id: &str, progress: u8) -> Result<Goal> {
        let progress = progress.min(100);
        let status = if progress >= 100 { "completed" } else { "active" };
        self.with_writer(|conn| {
            let changed = conn.execute(
                "UPDATE prospective_goals SET progress = ?2, status = ?3 WHERE id = ?1",
                params![id, progress as i64, status],
            )?;
            if changed == 0 {
                return Err(EngineError::NotFound(format!("goal {}", id)));
            }
            Ok(())
        })?;
        let goal = self
            .goal_get(id)?
            .ok_or_else(|| EngineError::NotFound(format!("goal {}", id)))?;
        self.bump_epoch(&goal.project_id);
        Ok(goal)
    }

    /// Goals for a project, active first
    pub fn goal_list(&self, project_id: &str) -> Result<Vec<Goal>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, project_id, name, description, priority, progress, status, created_at
                 FROM prospective_goals WHERE project_id = ?1
                 ORDER BY status = 'active' DESC, priority DESC",
            )?;
            let rows = stmt.query_map(params![project_id], row_to_goal)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }
}

/// Would adding `from -> to` close a cycle? True when `from` is already
/// reachable from `to` over existing edges. DFS over the project's edges.
fn dependency_would_cycle(
    conn: &Connection,
    project_id: &str,
    from_task_id: &str,
    to_task_id: &str,
) -> Result<bool> {
    let mut edges: HashMap<String, Vec<String>> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT d.from_task_id, d.to_task_id FROM task_dependencies d
             JOIN prospective_tasks t ON t.id = d.from_task_id
             WHERE t.project_id = ?1",
        )?;
        let rows = stmt.query_map(params![project_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (from, to) = row?;
            edges.entry(from).or_default().push(to);
        }
    }

    let mut stack = vec![to_task_id.to_string()];
    let mut seen: HashSet<String> = HashSet::new();
    while let Some(node) = stack.pop() {
        if node == from_task_id {
            return Ok(true);
        }
        if !seen.insert(node.clone()) {
            continue;
        }
        if let Some(next) = edges.get(&node) {
            stack.extend(next.iter().cloned());
        }
    }
    Ok(false)
}

/// Insert an estimate-accuracy record inside an open transaction
pub(crate) fn estimate_accuracy_insert_tx(
    conn: &Connection,
    record: &EstimateAccuracyRecord,
) -> Result<()> {
    conn.execute(
        "INSERT INTO estimate_accuracy
         (project_id, task_id, task_type, estimate_minutes, actual_minutes, accuracy,
          bias_factor, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.project_id,
            record.task_id,
            record.task_type,
            record.estimate_minutes,
            record.actual_minutes,
            record.accuracy,
            record.bias_factor,
            record.recorded_at,
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_util::test_store;

    fn task(store: &Store, project: &str, title: &str) -> Task {
        store
            .task_insert(
                project,
                &TaskInput {
                    title: title.into(),
                    description: String::new(),
                    priority: 5,
                    due_at: None,
                    effort_estimate_minutes: Some(60),
                    complexity: 5,
                    tags: vec!["backend".into()],
                    goal_id: None,
                },
            )
            .unwrap()
    }

    #[test]
    fn status_transitions_are_validated() {
        let (store, _dir) = test_store();
        let project = store.project_upsert("p", None).unwrap();
        let t = task(&store, &project.id, "implement feature");

        // pending -> done is illegal
        let err = store
            .task_update(
                &t.id,
                &TaskUpdate {
                    status: Some(TaskStatus::Done),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidTransition);

        let started = store
            .task_update(
                &t.id,
                &TaskUpdate {
                    status: Some(TaskStatus::InProgress),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(started.started_at.is_some());
    }

    #[test]
    fn completing_with_effort_writes_accuracy_record() {
        let (store, _dir) = test_store();
        let project = store.project_upsert("p", None).unwrap();
        let t = task(&store, &project.id, "estimated work");
        store
            .task_update(
                &t.id,
                &TaskUpdate {
                    status: Some(TaskStatus::InProgress),
                    ..Default::default()
                },
            )
            .unwrap();
        let done = store
            .task_update(
                &t.id,
                &TaskUpdate {
                    status: Some(TaskStatus::Done),
                    effort_actual_minutes: Some(120),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(done.completed_at.is_some());

        let records = store.estimate_accuracy_list(&project.id, None).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].task_type, "backend");
        assert!((records[0].accuracy - 50.0).abs() < 1e-9);
        assert!((records[0].bias_factor - 2.0).abs() < 1e-9);
    }

    #[test]
    fn dependency_cycles_are_rejected() {
        let (store, _dir) = test_store();
        let project = store.project_upsert("p", None).unwrap();
        let a = task(&store, &project.id, "a");
        let b = task(&store, &project.id, "b");
        let c = task(&store, &project.id, "c");

        store.task_dependency_add(&a.id, &b.id).unwrap();
        store.task_dependency_add(&b.id, &c.id).unwrap();

        // c -> a closes the loop
        let err = store.task_dependency_add(&c.id, &a.id).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);

        // self-dependency is rejected outright
        assert!(store.task_dependency_add(&a.id, &a.id).is_err());

        // duplicate edge is a Duplicate
        let err = store.task_dependency_add(&a.id, &b.id).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Duplicate);
    }

    #[test]
    fn blockers_reports_open_tasks_only() {
        let (store, _dir) = test_store();
        let project = store.project_upsert("p", None).unwrap();
        let blocker = task(&store, &project.id, "blocker");
        let blocked = task(&store, &project.id, "blocked");
        store.task_dependency_add(&blocker.id, &blocked.id).unwrap();

        assert_eq!(store.task_blockers(&blocked.id).unwrap().len(), 1);

        store
            .task_update(
                &blocker.id,
                &TaskUpdate {
                    status: Some(TaskStatus::Cancelled),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(store.task_blockers(&blocked.id).unwrap().is_empty());
    }

    #[test]
    fn goal_progress_completes_at_hundred() {
        let (store, _dir) = test_store();
        let project = store.project_upsert("p", None).unwrap();
        let goal = store
            .goal_insert(
                &project.id,
                &GoalInput {
                    name: "ship v1".into(),
                    description: String::new(),
                    priority: 8,
                },
            )
            .unwrap();

        let mid = store.goal_set_progress(&goal.id, 40).unwrap();
        assert_eq!(mid.status, GoalStatus::Active);

        let done = store.goal_set_progress(&goal.id, 150).unwrap();
        assert_eq!(done.progress, 100);
        assert_eq!(done.status, GoalStatus::Completed);
    }
}
