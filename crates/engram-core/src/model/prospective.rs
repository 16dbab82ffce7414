//! Prospective memory - tasks, goals, and dependencies
//!
//! "Remember to do X": future-directed intentions, kept separate from the
//! retrospective layers. Dependencies form a DAG; cycle prevention happens
//! in the store's insert transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// TASK STATUS
// ============================================================================

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Blocked,
    Done,
    Cancelled,
}

impl TaskStatus {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Done => "done",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Parse from stored text
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "in_progress" => TaskStatus::InProgress,
            "blocked" => TaskStatus::Blocked,
            "done" => TaskStatus::Done,
            "cancelled" => TaskStatus::Cancelled,
            _ => TaskStatus::Pending,
        }
    }

    /// Whether a task in this status is finished
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Cancelled)
    }

    /// Whether `self -> to` is an allowed status change. Terminal states
    /// accept no further transitions; anything open may block or cancel.
    pub fn can_transition(&self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        if self.is_terminal() || *self == to {
            return false;
        }
        match (self, to) {
            (Pending, InProgress) | (Pending, Blocked) | (Pending, Cancelled) => true,
            (InProgress, Blocked) | (InProgress, Done) | (InProgress, Cancelled) => true,
            (Blocked, Pending) | (Blocked, InProgress) | (Blocked, Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// TASK
// ============================================================================

/// A future-directed intention with effort tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Owning project
    pub project_id: String,
    /// Short title
    pub title: String,
    /// Longer description
    pub description: String,
    /// Priority in [1, 10]
    pub priority: u8,
    /// Current status
    pub status: TaskStatus,
    /// Deadline, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,
    /// Estimated effort in minutes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effort_estimate_minutes: Option<i64>,
    /// Actual effort in minutes, recorded on completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effort_actual_minutes: Option<i64>,
    /// Complexity in [1, 10]
    pub complexity: u8,
    /// Categorization tags
    pub tags: Vec<String>,
    /// Associated goal, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<String>,
    /// When the task was created
    pub created_at: DateTime<Utc>,
    /// When work began
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// True when the task has a deadline in the past and is still open
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && self.due_at.map(|d| d < now).unwrap_or(false)
    }
}

/// Input for creating a task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskInput {
    /// Short title
    pub title: String,
    /// Longer description
    #[serde(default)]
    pub description: String,
    /// Priority in [1, 10]
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Deadline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,
    /// Estimated effort in minutes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effort_estimate_minutes: Option<i64>,
    /// Complexity in [1, 10]
    #[serde(default = "default_priority")]
    pub complexity: u8,
    /// Categorization tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Associated goal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<String>,
}

fn default_priority() -> u8 {
    5
}

/// Partial update applied to a task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskUpdate {
    /// New status; transition rules apply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    /// New priority
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    /// New deadline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,
    /// Actual effort, recorded when completing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effort_actual_minutes: Option<i64>,
    /// Replacement description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ============================================================================
// DEPENDENCIES
// ============================================================================

/// A directed `blocks` edge between two tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDependency {
    /// The blocking task
    pub from_task_id: String,
    /// The blocked task
    pub to_task_id: String,
}

// ============================================================================
// GOALS
// ============================================================================

/// Goal status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    #[default]
    Active,
    Completed,
    Abandoned,
}

impl GoalStatus {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalStatus::Active => "active",
            GoalStatus::Completed => "completed",
            GoalStatus::Abandoned => "abandoned",
        }
    }

    /// Parse from stored text
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "completed" => GoalStatus::Completed,
            "abandoned" => GoalStatus::Abandoned,
            _ => GoalStatus::Active,
        }
    }
}

/// A longer-horizon objective that tasks roll up into
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Owning project
    pub project_id: String,
    /// Name
    pub name: String,
    /// Description
    pub description: String,
    /// Priority in [1, 10]
    pub priority: u8,
    /// Progress in [0, 100]
    pub progress: u8,
    /// Current status
    pub status: GoalStatus,
    /// When the goal was created
    pub created_at: DateTime<Utc>,
}

/// Input for creating a goal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GoalInput {
    /// Name
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Priority in [1, 10]
    #[serde(default = "default_priority")]
    pub priority: u8,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_accept_no_transitions() {
        use TaskStatus::*;
        for to in [Pending, InProgress, Blocked, Done, Cancelled] {
            assert!(!Done.can_transition(to));
            assert!(!Cancelled.can_transition(to));
        }
    }

    #[test]
    fn open_statuses_can_cancel() {
        use TaskStatus::*;
        assert!(Pending.can_transition(Cancelled));
        assert!(InProgress.can_transition(Cancelled));
        assert!(Blocked.can_transition(Cancelled));
    }

    #[test]
    fn blocked_tasks_can_resume() {
        use TaskStatus::*;
        assert!(Blocked.can_transition(InProgress));
        assert!(Blocked.can_transition(Pending));
        assert!(!Blocked.can_transition(Done));
    }

    #[test]
    fn pending_cannot_jump_to_done() {
        assert!(!TaskStatus::Pending.can_transition(TaskStatus::Done));
    }

    #[test]
    fn overdue_requires_open_status() {
        let now = Utc::now();
        let mut task = Task {
            id: "t1".into(),
            project_id: "p1".into(),
            title: "title".into(),
            description: String::new(),
            priority: 5,
            status: TaskStatus::Pending,
            due_at: Some(now - chrono::Duration::hours(1)),
            effort_estimate_minutes: None,
            effort_actual_minutes: None,
            complexity: 5,
            tags: vec![],
            goal_id: None,
            created_at: now,
            started_at: None,
            completed_at: None,
        };
        assert!(task.is_overdue(now));
        task.status = TaskStatus::Done;
        assert!(!task.is_overdue(now));
    }
}
