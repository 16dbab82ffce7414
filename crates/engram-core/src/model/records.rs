//! Bookkeeping rows: projects, estimate accuracy, consolidation runs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scoping root; every other entity carries a `project_id`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Human name
    pub name: String,
    /// Filesystem path, if the project maps to one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Primary language, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// When the project was first referenced
    pub created_at: DateTime<Utc>,
    /// Last time any operation touched the project
    pub last_accessed_at: DateTime<Utc>,
}

/// Estimation accuracy for one completed task; feeds expertise tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateAccuracyRecord {
    /// Owning project
    pub project_id: String,
    /// Completed task id
    pub task_id: String,
    /// Task category (first tag, or "general")
    pub task_type: String,
    /// Estimated minutes
    pub estimate_minutes: i64,
    /// Actual minutes
    pub actual_minutes: i64,
    /// min/max * 100, in [0, 100]
    pub accuracy: f64,
    /// actual/estimate; > 1 means underestimation
    pub bias_factor: f64,
    /// When the task completed
    pub recorded_at: DateTime<Utc>,
}

impl EstimateAccuracyRecord {
    /// Build a record from an estimate/actual pair
    pub fn from_effort(
        project_id: &str,
        task_id: &str,
        task_type: &str,
        estimate_minutes: i64,
        actual_minutes: i64,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        let (lo, hi) = if estimate_minutes <= actual_minutes {
            (estimate_minutes, actual_minutes)
        } else {
            (actual_minutes, estimate_minutes)
        };
        let accuracy = if hi <= 0 {
            0.0
        } else {
            lo as f64 / hi as f64 * 100.0
        };
        let bias_factor = if estimate_minutes <= 0 {
            1.0
        } else {
            actual_minutes as f64 / estimate_minutes as f64
        };
        Self {
            project_id: project_id.to_string(),
            task_id: task_id.to_string(),
            task_type: task_type.to_string(),
            estimate_minutes,
            actual_minutes,
            accuracy,
            bias_factor,
            recorded_at,
        }
    }
}

/// Summary of one consolidation run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationRunRecord {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Owning project
    pub project_id: String,
    /// When the run began
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: DateTime<Utc>,
    /// Strategy used
    pub strategy: String,
    /// Events examined
    pub events_scanned: i64,
    /// Patterns extracted (inserted or merged)
    pub patterns_extracted: i64,
    /// Events whose lifecycle transitioned to consolidated
    pub events_promoted: i64,
    /// Events archived by the archival pass
    pub events_archived: i64,
    /// Per-cluster error messages
    pub errors: Vec<String>,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accuracy_is_symmetric_ratio() {
        let now = Utc::now();
        let under = EstimateAccuracyRecord::from_effort("p", "t", "general", 60, 120, now);
        assert!((under.accuracy - 50.0).abs() < 1e-9);
        assert!((under.bias_factor - 2.0).abs() < 1e-9);

        let over = EstimateAccuracyRecord::from_effort("p", "t", "general", 120, 60, now);
        assert!((over.accuracy - 50.0).abs() < 1e-9);
        assert!((over.bias_factor - 0.5).abs() < 1e-9);

        let exact = EstimateAccuracyRecord::from_effort("p", "t", "general", 60, 60, now);
        assert!((exact.accuracy - 100.0).abs() < 1e-9);
    }

    #[test]
    fn zero_estimate_does_not_divide_by_zero() {
        let rec = EstimateAccuracyRecord::from_effort("p", "t", "general", 0, 30, Utc::now());
        assert_eq!(rec.accuracy, 0.0);
        assert_eq!(rec.bias_factor, 1.0);
    }
}
