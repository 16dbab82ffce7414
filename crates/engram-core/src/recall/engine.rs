//! The three-tier recall engine
//!
//! Tier 1 dispatches the classified layers' reads as blocking tasks joined
//! under one shared deadline; a layer that errors or overruns contributes
//! an empty slice and is reported in `failed_layers`. Tier 2 enriches and
//! re-scores with layer priors. Tier 3 hands bounded context to the
//! external reasoner when the query warrants synthesis and cognitive load
//! permits it.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{
    classify, Classification, Layer, RecallCache, RecallItem, RecallRequest, RecallResponse,
    ScoredRecall, SessionSnapshot,
};
use crate::activation::ActivationEngine;
use crate::config::RecallConfig;
use crate::error::Result;
use crate::flush::FlushHandle;
use crate::layers::{
    EpisodicLayer, GraphLayer, MetaLayer, ProceduralLayer, ProspectiveLayer, SemanticLayer,
};
use crate::model::{EventFilter, TaskStatus};
use crate::reasoner::{ContextSnippet, Reasoner};
use crate::store::{SemanticFilter, Store};

/// Cognitive load at or above this disables tier-3 synthesis
const LOAD_CEILING: f64 = 0.9;

/// Maximum snippets handed to the reasoner
const SYNTHESIS_CONTEXT_LIMIT: usize = 10;

/// Maximum characters per snippet
const SNIPPET_CHARS: usize = 400;

// ============================================================================
// ENGINE
// ============================================================================

/// Cascading recall over the memory layers
pub struct RecallEngine {
    store: Arc<Store>,
    episodic: Arc<EpisodicLayer>,
    semantic: Arc<SemanticLayer>,
    procedural: Arc<ProceduralLayer>,
    prospective: Arc<ProspectiveLayer>,
    graph: Arc<GraphLayer>,
    meta: Arc<MetaLayer>,
    activation: ActivationEngine,
    reasoner: Option<Arc<dyn Reasoner>>,
    flusher: FlushHandle,
    config: RecallConfig,
    cache: RecallCache,
}

impl RecallEngine {
    /// Assemble the engine from the layer services
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<Store>,
        episodic: Arc<EpisodicLayer>,
        semantic: Arc<SemanticLayer>,
        procedural: Arc<ProceduralLayer>,
        prospective: Arc<ProspectiveLayer>,
        graph: Arc<GraphLayer>,
        meta: Arc<MetaLayer>,
        activation: ActivationEngine,
        reasoner: Option<Arc<dyn Reasoner>>,
        flusher: FlushHandle,
        config: RecallConfig,
    ) -> Self {
        let cache = RecallCache::new(config.cache_capacity, config.cache_ttl_secs);
        Self {
            store,
            episodic,
            semantic,
            procedural,
            prospective,
            graph,
            meta,
            activation,
            reasoner,
            flusher,
            config,
            cache,
        }
    }

    /// Run the cascade. Never errors for "no results"; degraded responses
    /// are flagged instead.
    pub async fn recall(
        &self,
        project_id: &str,
        request: &RecallRequest,
        session: &SessionSnapshot,
    ) -> Result<RecallResponse> {
        let k = request.k.unwrap_or(self.config.default_k);
        let classification = classify(&request.query, session.phase.as_deref());
        let depth = self.resolve_depth(request, &classification, session);
        if k == 0 {
            return Ok(RecallResponse::empty(depth));
        }

        let epoch = self.store.epoch(project_id);
        if let Some(hit) = self
            .cache
            .get(project_id, &request.query, session, depth, epoch)
        {
            debug!(project_id, depth, "recall served from cache");
            return Ok(hit);
        }

        // Tier 1: concurrent layer reads under a shared deadline
        let (mut slices, failed_layers, top_semantic_similarity) = self
            .tier_one(project_id, &request.query, &classification, k)
            .await;
        let partial = !failed_layers.is_empty();

        let response = if depth == 1 {
            let mut results: Vec<ScoredRecall> = slices.drain().flat_map(|(_, v)| v).collect();
            sort_and_truncate(&mut results, k);
            RecallResponse {
                results,
                depth,
                partial,
                failed_layers,
                synthesized: false,
                cache_hit: false,
                expertise: None,
                cognitive_load: None,
            }
        } else {
            // Tier 2: enrichment + priors
            let (mut results, expertise, cognitive_load) = self
                .tier_two(project_id, &request.query, session, slices, k)
                .await?;

            // Tier 3: synthesized retrieval
            let mut synthesized = false;
            if depth == 3 {
                let load_ok = cognitive_load.map(|l| l < LOAD_CEILING).unwrap_or(true);
                let gate = classification.complex
                    || top_semantic_similarity
                        .map(|s| s < self.config.synthesis_similarity_gate)
                        .unwrap_or(true);
                if load_ok && gate {
                    synthesized =
                        self.tier_three(&request.query, &mut results);
                } else {
                    debug!(load_ok, gate, "tier-3 synthesis skipped");
                }
            }

            RecallResponse {
                results,
                depth,
                partial,
                failed_layers,
                synthesized,
                cache_hit: false,
                expertise,
                cognitive_load,
            }
        };

        self.touch_results(&response.results);
        self.cache
            .put(project_id, &request.query, session, depth, epoch, &response);
        Ok(response)
    }

    /// Adaptive depth: explicit wins (clamped); planning markers pick 3,
    /// live session context picks 2, simple factual queries pick 1.
    fn resolve_depth(
        &self,
        request: &RecallRequest,
        classification: &Classification,
        session: &SessionSnapshot,
    ) -> u8 {
        if let Some(depth) = request.cascade_depth {
            return depth.clamp(1, 3);
        }
        if classification.complex {
            3
        } else if !session.is_empty() {
            2
        } else if classification.simple_factual {
            1
        } else {
            2
        }
    }

    // ========================================================================
    // TIER 1
    // ========================================================================

    async fn tier_one(
        &self,
        project_id: &str,
        query: &str,
        classification: &Classification,
        k: usize,
    ) -> (
        HashMap<Layer, Vec<ScoredRecall>>,
        Vec<Layer>,
        Option<f32>,
    ) {
        let deadline = Instant::now() + Duration::from_millis(self.config.tier1_deadline_ms);
        let mut handles = Vec::with_capacity(classification.layers.len());
        for layer in &classification.layers {
            handles.push((*layer, self.dispatch_layer(*layer, project_id, query, k)));
        }

        let mut slices: HashMap<Layer, Vec<ScoredRecall>> = HashMap::new();
        let mut failed: Vec<Layer> = Vec::new();
        for (layer, mut handle) in handles {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, &mut handle).await {
                Ok(Ok(Ok(items))) => {
                    slices.insert(layer, items);
                }
                Ok(Ok(Err(e))) => {
                    warn!(layer = %layer, error = %e, "tier-1 layer read failed");
                    failed.push(layer);
                }
                Ok(Err(join_err)) => {
                    warn!(layer = %layer, error = %join_err, "tier-1 layer task panicked");
                    failed.push(layer);
                }
                Err(_) => {
                    warn!(layer = %layer, "tier-1 layer read abandoned at deadline");
                    handle.abort();
                    failed.push(layer);
                }
            }
        }

        let top_semantic_similarity = slices.get(&Layer::Semantic).and_then(|items| {
            items
                .iter()
                .filter_map(|r| match &r.item {
                    RecallItem::Semantic { similarity, .. } => *similarity,
                    _ => None,
                })
                .fold(None, |acc: Option<f32>, s| Some(acc.map_or(s, |a| a.max(s))))
        });

        (slices, failed, top_semantic_similarity)
    }

    /// Spawn one layer's read as a blocking task
    fn dispatch_layer(
        &self,
        layer: Layer,
        project_id: &str,
        query: &str,
        k: usize,
    ) -> tokio::task::JoinHandle<Result<Vec<ScoredRecall>>> {
        let project = project_id.to_string();
        let query = query.to_string();
        match layer {
            Layer::Episodic => {
                let episodic = self.episodic.clone();
                tokio::task::spawn_blocking(move || {
                    let hits =
                        episodic.search_events(&project, &query, &EventFilter::default(), k)?;
                    Ok(hits
                        .into_iter()
                        .map(|hit| ScoredRecall {
                            layer: Layer::Episodic,
                            id: hit.event.id.clone(),
                            score: hit.score,
                            item: RecallItem::Episodic { event: hit.event },
                        })
                        .collect())
                })
            }
            Layer::Semantic => {
                let semantic = self.semantic.clone();
                tokio::task::spawn_blocking(move || {
                    let hits =
                        semantic.search_quiet(&project, &query, k, &SemanticFilter::default())?;
                    Ok(hits
                        .into_iter()
                        .map(|hit| ScoredRecall {
                            layer: Layer::Semantic,
                            id: hit.memory.id.clone(),
                            score: hit.score,
                            item: RecallItem::Semantic {
                                memory: hit.memory,
                                similarity: hit.similarity,
                            },
                        })
                        .collect())
                })
            }
            Layer::Procedural => {
                let procedural = self.procedural.clone();
                tokio::task::spawn_blocking(move || {
                    let procedures = procedural.find(&project, &query, k)?;
                    Ok(procedures
                        .into_iter()
                        .map(|procedure| ScoredRecall {
                            layer: Layer::Procedural,
                            id: procedure.id.clone(),
                            score: procedure.effectiveness().max(0.1) as f32,
                            item: RecallItem::Procedure { procedure },
                        })
                        .collect())
                })
            }
            Layer::Prospective => {
                let prospective = self.prospective.clone();
                tokio::task::spawn_blocking(move || {
                    let tokens: Vec<String> = query
                        .to_lowercase()
                        .split_whitespace()
                        .filter(|t| t.len() > 3)
                        .map(str::to_string)
                        .collect();
                    let tasks = prospective.list_tasks(&project, None, k * 3)?;
                    Ok(tasks
                        .into_iter()
                        .filter(|task| {
                            let haystack = format!(
                                "{} {} {}",
                                task.title.to_lowercase(),
                                task.description.to_lowercase(),
                                task.tags.join(" ").to_lowercase()
                            );
                            tokens.is_empty()
                                || tokens.iter().any(|t| haystack.contains(t.as_str()))
                        })
                        .take(k)
                        .map(|task| ScoredRecall {
                            layer: Layer::Prospective,
                            id: task.id.clone(),
                            score: task.priority as f32 / 10.0,
                            item: RecallItem::Task { task },
                        })
                        .collect())
                })
            }
            Layer::Graph => {
                let graph = self.graph.clone();
                tokio::task::spawn_blocking(move || {
                    let hits = graph.search(&project, &query, k)?;
                    Ok(hits
                        .into_iter()
                        .map(|hit| ScoredRecall {
                            layer: Layer::Graph,
                            id: hit.entity.id.clone(),
                            score: hit.entity.importance as f32,
                            item: RecallItem::Entity { entity: hit.entity },
                        })
                        .collect())
                })
            }
        }
    }

    // ========================================================================
    // TIER 2
    // ========================================================================

    /// Cross-layer enrichment: graph neighborhoods, session context, meta
    /// hints; merged, deduplicated by (layer, id), re-scored with priors.
    async fn tier_two(
        &self,
        project_id: &str,
        query: &str,
        session: &SessionSnapshot,
        slices: HashMap<Layer, Vec<ScoredRecall>>,
        k: usize,
    ) -> Result<(Vec<ScoredRecall>, Option<crate::layers::ExpertiseReport>, Option<f64>)> {
        let mut merged: HashMap<(Layer, String), ScoredRecall> = HashMap::new();
        let mut insert = |mut item: ScoredRecall| {
            item.score *= item.layer.prior();
            let key = (item.layer, item.id.clone());
            match merged.get(&key) {
                Some(existing) if existing.score >= item.score => {}
                _ => {
                    merged.insert(key, item);
                }
            }
        };

        // Seed entities for neighborhood expansion: graph hits plus the
        // entity back-links on recalled events
        let mut seed_entities: Vec<String> = Vec::new();
        for items in slices.values() {
            for scored in items {
                match &scored.item {
                    RecallItem::Entity { entity } => seed_entities.push(entity.id.clone()),
                    RecallItem::Episodic { event } => {
                        if let Some(entity_id) = &event.entity_id {
                            seed_entities.push(entity_id.clone());
                        }
                    }
                    _ => {}
                }
            }
        }
        for (_, items) in slices {
            for item in items {
                insert(item);
            }
        }

        // Graph expansion (depth 1) and a follow-up semantic pass over the
        // neighborhood's vocabulary
        if !seed_entities.is_empty() {
            seed_entities.sort();
            seed_entities.dedup();
            match self.graph.neighbors(&seed_entities) {
                Ok(neighbors) => {
                    for entity in neighbors.iter().take(k) {
                        insert(ScoredRecall {
                            layer: Layer::Graph,
                            id: entity.id.clone(),
                            score: 0.5 * entity.importance as f32,
                            item: RecallItem::Entity {
                                entity: entity.clone(),
                            },
                        });
                    }
                    for entity in neighbors.iter().take(3) {
                        let hits = self.semantic.search_quiet(
                            project_id,
                            &entity.name,
                            3,
                            &SemanticFilter::default(),
                        )?;
                        for hit in hits {
                            insert(ScoredRecall {
                                layer: Layer::Semantic,
                                id: hit.memory.id.clone(),
                                score: 0.6 * hit.score,
                                item: RecallItem::Semantic {
                                    memory: hit.memory,
                                    similarity: hit.similarity,
                                },
                            });
                        }
                    }
                }
                Err(e) => debug!(error = %e, "graph expansion skipped"),
            }
        }

        // Session context injection: the running session's tail and any
        // in-flight tasks
        if let Some(session_id) = &session.session_id {
            let recent = self.store.event_query(
                project_id,
                &EventFilter {
                    session_id: Some(session_id.clone()),
                    limit: Some(5),
                    order_by: crate::model::EventOrder::Timestamp,
                    ..Default::default()
                },
            )?;
            for event in recent {
                insert(ScoredRecall {
                    layer: Layer::Episodic,
                    id: event.id.clone(),
                    score: 0.4 * Layer::Episodic.prior(),
                    item: RecallItem::Episodic { event },
                });
            }
        }
        if session.task.is_some() {
            for task in self
                .prospective
                .list_tasks(project_id, Some(TaskStatus::InProgress), 3)?
            {
                insert(ScoredRecall {
                    layer: Layer::Prospective,
                    id: task.id.clone(),
                    score: 0.4 * Layer::Prospective.prior(),
                    item: RecallItem::Task { task },
                });
            }
        }

        // Meta hints: expertise in the inferred domain + cognitive load
        let domain = infer_domain(query);
        let expertise = match domain {
            Some(domain) => self.meta.expertise(project_id, &domain).ok(),
            None => None,
        };
        let cognitive_load = self.current_load(project_id).ok();

        let mut results: Vec<ScoredRecall> = merged.into_values().collect();
        sort_and_truncate(&mut results, k);
        Ok((results, expertise, cognitive_load))
    }

    fn current_load(&self, project_id: &str) -> Result<f64> {
        let candidates = self.episodic.active_events(project_id, 64)?;
        let working = self
            .activation
            .select_working_memory(candidates, Utc::now(), None);
        Ok(self.activation.cognitive_load(&working))
    }

    // ========================================================================
    // TIER 3
    // ========================================================================

    /// Delegate to the reasoner; prepends synthesized answers on success.
    /// Returns whether synthesis ran.
    fn tier_three(&self, query: &str, results: &mut Vec<ScoredRecall>) -> bool {
        let Some(reasoner) = &self.reasoner else {
            return false;
        };
        let context: Vec<ContextSnippet> = results
            .iter()
            .take(SYNTHESIS_CONTEXT_LIMIT)
            .map(|scored| ContextSnippet {
                layer: scored.layer.as_str().to_string(),
                id: scored.id.clone(),
                text: truncate_chars(item_text(&scored.item), SNIPPET_CHARS),
                score: scored.score,
            })
            .collect();

        match reasoner.synthesize(query, &context) {
            Ok(answers) => {
                let mut synthesized: Vec<ScoredRecall> = answers
                    .into_iter()
                    .map(|answer| ScoredRecall {
                        layer: Layer::Semantic,
                        id: uuid::Uuid::new_v4().to_string(),
                        score: answer.confidence as f32,
                        item: RecallItem::Synthesized { answer },
                    })
                    .collect();
                synthesized.append(results);
                *results = synthesized;
                true
            }
            Err(e) => {
                debug!(error = %e, "reasoner unavailable, returning tier-2 results");
                false
            }
        }
    }

    // ========================================================================
    // SIDE EFFECTS
    // ========================================================================

    /// Access-stat updates for returned items, batched through the flusher
    fn touch_results(&self, results: &[ScoredRecall]) {
        let now = Utc::now();
        self.flusher.touch_events(
            results.iter().filter_map(|r| match &r.item {
                RecallItem::Episodic { event } => Some(event.id.as_str()),
                _ => None,
            }),
            now,
        );
        self.flusher.touch_memories(
            results.iter().filter_map(|r| match &r.item {
                RecallItem::Semantic { memory, .. } => Some(memory.id.as_str()),
                _ => None,
            }),
            now,
        );
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn sort_and_truncate(results: &mut Vec<ScoredRecall>, k: usize) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    results.truncate(k);
}

/// Longest word over three characters stands in for the query's domain
fn infer_domain(query: &str) -> Option<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .filter(|w| w.len() > 3)
        .max_by_key(|w| w.len())
        .map(str::to_string)
}

fn item_text(item: &RecallItem) -> &str {
    match item {
        RecallItem::Episodic { event } => &event.content,
        RecallItem::Semantic { memory, .. } => &memory.content,
        RecallItem::Procedure { procedure } => &procedure.description,
        RecallItem::Task { task } => &task.title,
        RecallItem::Entity { entity } => &entity.name,
        RecallItem::Synthesized { answer } => &answer.text,
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    text.chars().take(max).collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_inference_prefers_longest_token() {
        assert_eq!(
            infer_domain("what do we know about authentication flows"),
            Some("authentication".to_string())
        );
        assert_eq!(infer_domain("a an it"), None);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo");
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[test]
    fn sort_is_deterministic_on_ties() {
        let item = |id: &str, score: f32| ScoredRecall {
            layer: Layer::Semantic,
            id: id.to_string(),
            score,
            item: RecallItem::Synthesized {
                answer: crate::reasoner::SynthesizedAnswer {
                    text: String::new(),
                    confidence: 0.0,
                    citations: vec![],
                },
            },
        };
        let mut results = vec![item("b", 0.5), item("a", 0.5), item("c", 0.9)];
        sort_and_truncate(&mut results, 3);
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }
}
