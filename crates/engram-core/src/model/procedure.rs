//! Procedures - named reusable workflows with execution statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One ordered step inside a procedure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureStep {
    /// Position within the procedure (1-based)
    pub order: u32,
    /// What to do
    pub action: String,
    /// Inputs the step consumes
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Outputs the step produces
    #[serde(default)]
    pub outputs: Vec<String>,
}

/// A named reusable workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Procedure {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Owning project
    pub project_id: String,
    /// Name, unique per project
    pub name: String,
    /// What the procedure accomplishes
    pub description: String,
    /// Free-form category ("deployment", "testing", ...)
    pub category: String,
    /// Ordered steps
    pub steps: Vec<ProcedureStep>,
    /// Conditions that must hold before running
    #[serde(default)]
    pub preconditions: Vec<String>,
    /// Conditions that hold after a successful run
    #[serde(default)]
    pub postconditions: Vec<String>,
    /// Successful executions
    pub success_count: i64,
    /// Failed executions
    pub failure_count: i64,
    /// Cumulative execution time
    pub total_duration_ms: i64,
    /// Last execution time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_executed_at: Option<DateTime<Utc>>,
    /// Source event provenance
    #[serde(default)]
    pub source_event_ids: Vec<String>,
    /// When the procedure was created
    pub created_at: DateTime<Utc>,
}

impl Procedure {
    /// success_count / max(1, success_count + failure_count); derived, never
    /// stored, so it cannot go stale.
    pub fn effectiveness(&self) -> f64 {
        let total = self.success_count + self.failure_count;
        self.success_count as f64 / total.max(1) as f64
    }

    /// Mean execution duration across all runs, if any
    pub fn mean_duration_ms(&self) -> Option<i64> {
        let total = self.success_count + self.failure_count;
        (total > 0).then(|| self.total_duration_ms / total)
    }
}

/// Input for creating a procedure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProcedureInput {
    /// Name, unique per project
    pub name: String,
    /// What the procedure accomplishes
    pub description: String,
    /// Free-form category
    #[serde(default)]
    pub category: String,
    /// Ordered steps
    pub steps: Vec<ProcedureStep>,
    /// Preconditions
    #[serde(default)]
    pub preconditions: Vec<String>,
    /// Postconditions
    #[serde(default)]
    pub postconditions: Vec<String>,
    /// Source event provenance
    #[serde(default)]
    pub source_event_ids: Vec<String>,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn procedure(success: i64, failure: i64) -> Procedure {
        Procedure {
            id: "p1".into(),
            project_id: "proj".into(),
            name: "deploy".into(),
            description: "ship it".into(),
            category: "deployment".into(),
            steps: vec![],
            preconditions: vec![],
            postconditions: vec![],
            success_count: success,
            failure_count: failure,
            total_duration_ms: 9_000,
            last_executed_at: None,
            source_event_ids: vec![],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn effectiveness_handles_zero_runs() {
        assert_eq!(procedure(0, 0).effectiveness(), 0.0);
        assert!(procedure(0, 0).mean_duration_ms().is_none());
    }

    #[test]
    fn effectiveness_is_success_ratio() {
        assert!((procedure(3, 1).effectiveness() - 0.75).abs() < 1e-9);
        assert_eq!(procedure(3, 0).effectiveness(), 1.0);
        assert_eq!(procedure(3, 1).mean_duration_ms(), Some(2_250));
    }
}
