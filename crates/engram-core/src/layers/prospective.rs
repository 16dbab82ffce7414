//! Prospective layer - tasks, goals, dependencies

use std::sync::Arc;

use crate::error::Result;
use crate::model::{Goal, GoalInput, Task, TaskDependency, TaskInput, TaskStatus, TaskUpdate};
use crate::store::Store;

/// Prospective memory service
pub struct ProspectiveLayer {
    store: Arc<Store>,
}

impl ProspectiveLayer {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Create a task
    pub fn create_task(&self, project_id: &str, input: &TaskInput) -> Result<Task> {
        self.store.task_insert(project_id, input)
    }

    /// Lookup by id
    pub fn get_task(&self, id: &str) -> Result<Option<Task>> {
        self.store.task_get(id)
    }

    /// Apply a partial update; completing a task records estimate accuracy
    pub fn update_task(&self, id: &str, update: &TaskUpdate) -> Result<Task> {
        self.store.task_update(id, update)
    }

    /// Shorthand for the common completion flow
    pub fn complete_task(&self, id: &str, effort_actual_minutes: Option<i64>) -> Result<Task> {
        self.store.task_update(
            id,
            &TaskUpdate {
                status: Some(TaskStatus::Done),
                effort_actual_minutes,
                ..Default::default()
            },
        )
    }

    /// Tasks by status, highest priority first
    pub fn list_tasks(
        &self,
        project_id: &str,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> Result<Vec<Task>> {
        self.store.task_list(project_id, status, limit)
    }

    /// Declare that `from` blocks `to`; cycles are rejected
    pub fn add_dependency(&self, from_task_id: &str, to_task_id: &str) -> Result<TaskDependency> {
        self.store.task_dependency_add(from_task_id, to_task_id)
    }

    /// Open tasks blocking the given one
    pub fn blockers(&self, task_id: &str) -> Result<Vec<Task>> {
        self.store.task_blockers(task_id)
    }

    /// Create a goal
    pub fn create_goal(&self, project_id: &str, input: &GoalInput) -> Result<Goal> {
        self.store.goal_insert(project_id, input)
    }

    /// Update goal progress (100 completes it)
    pub fn set_goal_progress(&self, id: &str, progress: u8) -> Result<Goal> {
        self.store.goal_set_progress(id, progress)
    }

    /// Goals for a project, active first
    pub fn list_goals(&self, project_id: &str) -> Result<Vec<Goal>> {
        self.store.goal_list(project_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_util::test_store;

    #[test]
    fn complete_task_records_accuracy() {
        let (store, _dir) = test_store();
        let project = store.project_upsert("p", None).unwrap();
        let layer = ProspectiveLayer::new(store.clone());

        let task = layer
            .create_task(
                &project.id,
                &TaskInput {
                    title: "tune the cache".into(),
                    description: String::new(),
                    priority: 7,
                    due_at: None,
                    effort_estimate_minutes: Some(30),
                    complexity: 4,
                    tags: vec!["perf".into()],
                    goal_id: None,
                },
            )
            .unwrap();
        layer
            .update_task(
                &task.id,
                &TaskUpdate {
                    status: Some(TaskStatus::InProgress),
                    ..Default::default()
                },
            )
            .unwrap();
        let done = layer.complete_task(&task.id, Some(45)).unwrap();
        assert_eq!(done.status, TaskStatus::Done);

        let records = store.estimate_accuracy_list(&project.id, Some("perf")).unwrap();
        assert_eq!(records.len(), 1);
        assert!((records[0].bias_factor - 1.5).abs() < 1e-9);
    }
}
