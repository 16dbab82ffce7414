//! Meta layer - quality, expertise, cognitive load, memory health
//!
//! Read-mostly counters over the other layers. Expertise and health feed
//! tier-2 enrichment and the archival loop; cognitive load throttles
//! tier-3 synthesis when working memory saturates.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;
use crate::store::Store;

// ============================================================================
// REPORTS
// ============================================================================

/// Coarse expertise bands derived from the domain score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpertiseLevel {
    Novice,
    Competent,
    Proficient,
    Expert,
}

impl ExpertiseLevel {
    fn from_score(score: f64) -> Self {
        if score >= 0.75 {
            ExpertiseLevel::Expert
        } else if score >= 0.5 {
            ExpertiseLevel::Proficient
        } else if score >= 0.25 {
            ExpertiseLevel::Competent
        } else {
            ExpertiseLevel::Novice
        }
    }
}

/// Expertise reading for one domain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpertiseReport {
    /// The domain asked about (matched against memory tags)
    pub domain: String,
    /// Coarse band
    pub level: ExpertiseLevel,
    /// Composite score in [0, 1]
    pub score: f64,
    /// Memories tagged with the domain
    pub memory_count: i64,
    /// Total retrievals across those memories
    pub retrieval_count: i64,
}

/// Aggregate health reading for a project's memory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryHealth {
    /// Mean semantic quality in [0, 1]
    pub avg_quality: f64,
    /// consolidated events / (active + consolidated events)
    pub consolidation_coverage: f64,
    /// 1 - fraction of semantic memories unretrieved for 30 days
    pub freshness: f64,
    /// Weighted mean (quality 0.4, coverage 0.3, freshness 0.3)
    pub score: f64,
}

/// Per-layer row counts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub active_events: i64,
    pub consolidated_events: i64,
    pub archived_events: i64,
    pub semantic_memories: i64,
    pub procedures: i64,
    pub tasks: i64,
    pub goals: i64,
    pub entities: i64,
    pub relations: i64,
}

// ============================================================================
// LAYER
// ============================================================================

/// Meta-memory service
pub struct MetaLayer {
    store: Arc<Store>,
}

impl MetaLayer {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Expertise in a domain: log-scaled memory count, retrieval depth,
    /// and recency of the newest update.
    pub fn expertise(&self, project_id: &str, domain: &str) -> Result<ExpertiseReport> {
        let (count, retrievals, last_update) =
            self.store.semantic_domain_stats(project_id, domain)?;

        // ~12 tagged memories saturate the volume term
        let volume = ((1.0 + count as f64).ln() / (13.0_f64).ln()).min(1.0);
        // Retrievals per memory, saturating at 5
        let depth = if count == 0 {
            0.0
        } else {
            (retrievals as f64 / count as f64 / 5.0).min(1.0)
        };
        let recency = match last_update {
            Some(at) => {
                let days = (Utc::now() - at).num_days().max(0) as f64;
                (-days / 60.0).exp() // two-month half-life-ish falloff
            }
            None => 0.0,
        };
        let score = (0.5 * volume + 0.3 * depth + 0.2 * recency).clamp(0.0, 1.0);

        Ok(ExpertiseReport {
            domain: domain.trim().to_lowercase(),
            level: ExpertiseLevel::from_score(score),
            score,
            memory_count: count,
            retrieval_count: retrievals,
        })
    }

    /// Aggregate health reading
    pub fn memory_health(&self, project_id: &str) -> Result<MemoryHealth> {
        let (active, consolidated, _archived) = self.store.event_counts(project_id)?;
        let (total_memories, _consolidated_memories, avg_quality) =
            self.store.semantic_stats(project_id)?;

        let event_pool = active + consolidated;
        let consolidation_coverage = if event_pool == 0 {
            1.0
        } else {
            consolidated as f64 / event_pool as f64
        };

        let freshness = if total_memories == 0 {
            1.0
        } else {
            let stale = self
                .store
                .semantic_stale_count(project_id, Utc::now() - Duration::days(30))?;
            1.0 - (stale as f64 / total_memories as f64)
        };

        let score = (0.4 * avg_quality + 0.3 * consolidation_coverage + 0.3 * freshness)
            .clamp(0.0, 1.0);
        Ok(MemoryHealth {
            avg_quality,
            consolidation_coverage,
            freshness,
            score,
        })
    }

    /// Row counts across every layer
    pub fn memory_stats(&self, project_id: &str) -> Result<MemoryStats> {
        let (active, consolidated, archived) = self.store.event_counts(project_id)?;
        let (semantic, _, _) = self.store.semantic_stats(project_id)?;
        let (procedures, tasks, goals, entities, relations) =
            self.store.layer_counts(project_id)?;
        Ok(MemoryStats {
            active_events: active,
            consolidated_events: consolidated,
            archived_events: archived,
            semantic_memories: semantic,
            procedures,
            tasks,
            goals,
            entities,
            relations,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MemoryType, SemanticInput};
    use crate::store::test_util::test_store;

    #[test]
    fn expertise_grows_with_tagged_memories() {
        let (store, _dir) = test_store();
        let project = store.project_upsert("p", None).unwrap();
        let meta = MetaLayer::new(store.clone());

        let empty = meta.expertise(&project.id, "rust").unwrap();
        assert_eq!(empty.level, ExpertiseLevel::Novice);
        assert_eq!(empty.memory_count, 0);

        for i in 0..12 {
            store
                .semantic_insert(
                    &project.id,
                    &SemanticInput {
                        content: format!("rust insight {}", i),
                        memory_type: MemoryType::Fact,
                        tags: vec!["rust".into()],
                        quality_score: 0.7,
                        source_event_ids: vec![],
                    },
                    None,
                    None,
                )
                .unwrap();
        }
        let grown = meta.expertise(&project.id, "rust").unwrap();
        assert!(grown.score > empty.score);
        assert_eq!(grown.memory_count, 12);
        assert!(grown.level > ExpertiseLevel::Novice);
    }

    #[test]
    fn health_of_empty_project_is_neutral() {
        let (store, _dir) = test_store();
        let project = store.project_upsert("p", None).unwrap();
        let meta = MetaLayer::new(store);

        let health = meta.memory_health(&project.id).unwrap();
        assert!((health.consolidation_coverage - 1.0).abs() < 1e-9);
        assert!((health.freshness - 1.0).abs() < 1e-9);
        assert!(health.score <= 1.0);
    }

    #[test]
    fn stats_count_each_layer() {
        let (store, _dir) = test_store();
        let project = store.project_upsert("p", None).unwrap();
        let meta = MetaLayer::new(store.clone());

        store
            .semantic_insert(
                &project.id,
                &SemanticInput {
                    content: "one memory".into(),
                    memory_type: MemoryType::Fact,
                    tags: vec![],
                    quality_score: 0.5,
                    source_event_ids: vec![],
                },
                None,
                None,
            )
            .unwrap();

        let stats = meta.memory_stats(&project.id).unwrap();
        assert_eq!(stats.semantic_memories, 1);
        assert_eq!(stats.active_events, 0);
        assert_eq!(stats.procedures, 0);
    }
}
