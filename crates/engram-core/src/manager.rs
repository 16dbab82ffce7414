//! Memory manager - the top-level façade
//!
//! Binds the store, layers, consolidation pipeline, and recall engine
//! behind the operation surface an agent runtime calls (`remember`,
//! `recall`, `record_event`, `run_consolidation`, ...). Owns the
//! background machinery: the consolidation scheduler (session-end triggers
//! plus periodic light/archival ticks), the access-stat flusher, the
//! recall cache, and the session context.
//!
//! Shutdown order: drain the flusher, stop the scheduler, drop the store.
//!
//! Construction requires a running tokio runtime (background workers spawn
//! immediately).

use chrono::Utc;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::activation::{ActivatedEvent, ActivationEngine};
use crate::config::{ConsolidationStrategy, EngineConfig};
use crate::consolidation::{ConsolidationReport, Consolidator, RunOptions};
use crate::embeddings::{EmbeddingProvider, SeededProvider};
use crate::error::{EngineError, Result};
use crate::flush::AccessFlusher;
use crate::layers::{
    EpisodicLayer, ExpertiseReport, GraphHit, GraphLayer, MemoryHealth, MemoryStats, MetaLayer,
    ProceduralLayer, ProspectiveLayer, ScoredEvent, SemanticLayer,
};
use crate::model::{
    EntityInput, EpisodicEvent, EventFilter, EventInput, Goal, GoalInput, Procedure,
    ProcedureInput, Project, RecordOutcome, Relation, RelationType, SemanticInput, SemanticMemory,
    Task, TaskInput, TaskUpdate,
};
use crate::recall::{RecallEngine, RecallRequest, RecallResponse, SessionSnapshot};
use crate::reasoner::Reasoner;
use crate::store::{SemanticFilter, SemanticHit, Store};

// ============================================================================
// BUILDER
// ============================================================================

/// Options for constructing a [`MemoryManager`]
pub struct ManagerOptions {
    /// Database path; None uses the platform data directory
    pub db_path: Option<PathBuf>,
    /// Engine configuration
    pub config: EngineConfig,
    /// Embedding provider; None uses the deterministic seeded provider
    pub embedder: Option<Arc<dyn EmbeddingProvider>>,
    /// External reasoner; None disables validation and tier-3 synthesis
    pub reasoner: Option<Arc<dyn Reasoner>>,
    /// Whether to start the periodic schedulers (tests usually disable)
    pub start_schedulers: bool,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            db_path: None,
            config: EngineConfig::default(),
            embedder: None,
            reasoner: None,
            start_schedulers: true,
        }
    }
}

// ============================================================================
// MANAGER
// ============================================================================

/// Top-level memory system façade
pub struct MemoryManager {
    store: Arc<Store>,
    episodic: Arc<EpisodicLayer>,
    semantic: Arc<SemanticLayer>,
    procedural: Arc<ProceduralLayer>,
    prospective: Arc<ProspectiveLayer>,
    graph: Arc<GraphLayer>,
    meta: Arc<MetaLayer>,
    consolidator: Arc<Consolidator>,
    recall_engine: RecallEngine,
    activation: ActivationEngine,
    flusher: Mutex<Option<AccessFlusher>>,
    scheduler: Mutex<Option<SchedulerHandle>>,
    session: RwLock<SessionSnapshot>,
    config: EngineConfig,
}

struct SchedulerHandle {
    stop: tokio::sync::watch::Sender<bool>,
    worker: tokio::task::JoinHandle<()>,
}

impl MemoryManager {
    /// Build the manager and spawn its background workers
    pub fn new(options: ManagerOptions) -> Result<Self> {
        let config = options.config;
        let base_embedder: Arc<dyn EmbeddingProvider> = options
            .embedder
            .unwrap_or_else(|| Arc::new(SeededProvider::default()));
        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::new(crate::embeddings::CachedProvider::new(base_embedder, 128));
        let store = Arc::new(Store::open_with_dimensions(
            options.db_path,
            config.reader_pool_size.max(2),
            embedder.dimensions(),
        )?);

        let flusher = AccessFlusher::spawn(store.clone(), config.flush.clone());
        let flush_handle = flusher.handle();
        let activation = ActivationEngine::new(config.activation.clone());

        let episodic = Arc::new(EpisodicLayer::new(
            store.clone(),
            embedder.clone(),
            activation.clone(),
            flush_handle.clone(),
        ));
        let semantic = Arc::new(SemanticLayer::new(
            store.clone(),
            embedder.clone(),
            config.semantic.clone(),
            flush_handle.clone(),
        ));
        let procedural = Arc::new(ProceduralLayer::new(store.clone()));
        let prospective = Arc::new(ProspectiveLayer::new(store.clone()));
        let graph = Arc::new(GraphLayer::new(store.clone()));
        let meta = Arc::new(MetaLayer::new(store.clone()));
        let consolidator = Arc::new(Consolidator::new(
            store.clone(),
            embedder.clone(),
            options.reasoner.clone(),
            config.consolidation.clone(),
        ));

        let recall_engine = RecallEngine::new(
            store.clone(),
            episodic.clone(),
            semantic.clone(),
            procedural.clone(),
            prospective.clone(),
            graph.clone(),
            meta.clone(),
            activation.clone(),
            options.reasoner,
            flush_handle,
            config.recall.clone(),
        );

        let manager = Self {
            store,
            episodic,
            semantic,
            procedural,
            prospective,
            graph,
            meta,
            consolidator,
            recall_engine,
            activation,
            flusher: Mutex::new(Some(flusher)),
            scheduler: Mutex::new(None),
            session: RwLock::new(SessionSnapshot::default()),
            config,
        };
        if options.start_schedulers {
            manager.start_scheduler();
        }
        Ok(manager)
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Direct store access (read-side helpers, tests)
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    // ========================================================================
    // PROJECTS & SESSION CONTEXT
    // ========================================================================

    /// Find-or-create a project by name
    pub fn project(&self, name: &str, path: Option<&str>) -> Result<Project> {
        self.store.project_upsert(name, path)
    }

    /// Start (or switch) the active session
    pub fn begin_session(&self, session_id: &str) {
        if let Ok(mut session) = self.session.write() {
            session.session_id = Some(session_id.to_string());
        }
    }

    /// Update the working context carried into recall
    pub fn set_context(&self, task: Option<String>, phase: Option<String>) {
        if let Ok(mut session) = self.session.write() {
            session.task = task;
            session.phase = phase;
        }
    }

    /// Snapshot of the current session context
    pub fn session(&self) -> SessionSnapshot {
        self.session.read().map(|s| s.clone()).unwrap_or_default()
    }

    /// End a session: clears the context and triggers a light consolidation
    /// run for the project.
    pub async fn session_end(&self, project_id: &str, session_id: &str) -> Result<ConsolidationReport> {
        if let Ok(mut session) = self.session.write() {
            if session.session_id.as_deref() == Some(session_id) {
                *session = SessionSnapshot::default();
            }
        }
        info!(project_id, session_id, "session ended, running light consolidation");
        self.run_consolidation(project_id, None, false).await
    }

    // ========================================================================
    // EPISODIC OPERATIONS
    // ========================================================================

    /// Record an experiential event (dedup by content hash)
    pub fn record_event(&self, project_id: &str, input: &EventInput) -> Result<RecordOutcome> {
        self.store.project_require(project_id)?;
        self.episodic.record_event(project_id, input)
    }

    /// Query the event log; empty queries return the filter's most recent
    pub fn recall_events(
        &self,
        project_id: &str,
        query: &str,
        filter: &EventFilter,
        k: usize,
    ) -> Result<Vec<ScoredEvent>> {
        self.episodic.recall_events(project_id, query, filter, k)
    }

    /// Chronological session timeline with a replay cursor
    pub fn session_timeline(
        &self,
        project_id: &str,
        session_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<EpisodicEvent>> {
        self.episodic
            .session_timeline(project_id, session_id, offset, limit)
    }

    /// Current working memory: top-N active events by activation
    pub fn get_working_memory(
        &self,
        project_id: &str,
        n: Option<usize>,
    ) -> Result<Vec<ActivatedEvent>> {
        let candidates = self.episodic.active_events(project_id, 256)?;
        Ok(self
            .activation
            .select_working_memory(candidates, Utc::now(), n))
    }

    // ========================================================================
    // SEMANTIC OPERATIONS
    // ========================================================================

    /// Store knowledge directly
    pub fn remember(&self, project_id: &str, input: &SemanticInput) -> Result<SemanticMemory> {
        self.store.project_require(project_id)?;
        self.semantic.remember(project_id, input)
    }

    /// Hybrid semantic search (no cascade)
    pub fn search_memories(
        &self,
        project_id: &str,
        query: &str,
        k: usize,
        filter: &SemanticFilter,
    ) -> Result<Vec<SemanticHit>> {
        self.semantic.search(project_id, query, k, filter)
    }

    /// Edit a memory in place (reconsolidation rules apply)
    pub fn update_memory(&self, id: &str, content: &str) -> Result<SemanticMemory> {
        self.semantic.update_content(id, content)
    }

    /// Forget a memory (soft lowers quality, hard deletes)
    pub fn forget(&self, id: &str, hard: bool) -> Result<()> {
        self.semantic.forget(id, hard)
    }

    // ========================================================================
    // CASCADING RECALL
    // ========================================================================

    /// Cascaded recall across all layers using the current session context
    pub async fn recall(&self, project_id: &str, request: &RecallRequest) -> Result<RecallResponse> {
        let session = self.session();
        self.recall_engine
            .recall(project_id, request, &session)
            .await
    }

    // ========================================================================
    // PROCEDURAL OPERATIONS
    // ========================================================================

    /// Create a reusable procedure
    pub fn create_procedure(&self, project_id: &str, input: &ProcedureInput) -> Result<Procedure> {
        self.store.project_require(project_id)?;
        self.procedural.create(project_id, input)
    }

    /// Find procedures by query, most effective first
    pub fn find_procedures(&self, project_id: &str, query: &str, k: usize) -> Result<Vec<Procedure>> {
        self.procedural.find(project_id, query, k)
    }

    /// Record an execution outcome for a procedure
    pub fn record_procedure_execution(
        &self,
        id: &str,
        success: bool,
        duration_ms: i64,
    ) -> Result<Procedure> {
        self.procedural.record_execution(id, success, duration_ms)
    }

    // ========================================================================
    // PROSPECTIVE OPERATIONS
    // ========================================================================

    /// Create a task
    pub fn create_task(&self, project_id: &str, input: &TaskInput) -> Result<Task> {
        self.store.project_require(project_id)?;
        self.prospective.create_task(project_id, input)
    }

    /// Update a task (status transitions validated)
    pub fn update_task(&self, id: &str, update: &TaskUpdate) -> Result<Task> {
        self.prospective.update_task(id, update)
    }

    /// Complete a task, recording estimate accuracy when possible
    pub fn complete_task(&self, id: &str, effort_actual_minutes: Option<i64>) -> Result<Task> {
        self.prospective.complete_task(id, effort_actual_minutes)
    }

    /// Declare a blocking dependency between two tasks
    pub fn add_task_dependency(
        &self,
        from_task_id: &str,
        to_task_id: &str,
    ) -> Result<crate::model::TaskDependency> {
        self.prospective.add_dependency(from_task_id, to_task_id)
    }

    /// Create a goal
    pub fn create_goal(&self, project_id: &str, input: &GoalInput) -> Result<Goal> {
        self.store.project_require(project_id)?;
        self.prospective.create_goal(project_id, input)
    }

    // ========================================================================
    // GRAPH OPERATIONS
    // ========================================================================

    /// Create or extend a graph entity
    pub fn create_entity(&self, project_id: &str, input: &EntityInput) -> Result<crate::model::Entity> {
        self.store.project_require(project_id)?;
        self.graph.create_entity(project_id, input)
    }

    /// Create a directed relation between entities
    pub fn create_relation(
        &self,
        project_id: &str,
        from_entity_id: &str,
        to_entity_id: &str,
        relation_type: RelationType,
    ) -> Result<Relation> {
        self.graph.create_relation(
            project_id,
            from_entity_id,
            to_entity_id,
            relation_type,
            Default::default(),
        )
    }

    /// Search the knowledge graph
    pub fn search_graph(&self, project_id: &str, query: &str, k: usize) -> Result<Vec<GraphHit>> {
        self.graph.search(project_id, query, k)
    }

    // ========================================================================
    // CONSOLIDATION & META
    // ========================================================================

    /// Run consolidation now. Concurrent runs for the same project coalesce.
    pub async fn run_consolidation(
        &self,
        project_id: &str,
        strategy: Option<ConsolidationStrategy>,
        archive: bool,
    ) -> Result<ConsolidationReport> {
        self.store.project_require(project_id)?;
        let consolidator = self.consolidator.clone();
        let semantic = self.semantic.clone();
        let project = project_id.to_string();
        let options = RunOptions { strategy, archive };
        tokio::task::spawn_blocking(move || {
            // Window maintenance rides along with every run
            if let Err(e) = semantic.close_windows(&project) {
                debug!(error = %e, "window maintenance failed");
            }
            consolidator.run(&project, &options)
        })
        .await
        .map_err(|e| EngineError::Internal(format!("consolidation task failed: {}", e)))?
    }

    /// Aggregate health reading
    pub fn memory_health(&self, project_id: &str) -> Result<MemoryHealth> {
        self.meta.memory_health(project_id)
    }

    /// Expertise in a domain
    pub fn get_expertise(&self, project_id: &str, domain: &str) -> Result<ExpertiseReport> {
        self.meta.expertise(project_id, domain)
    }

    /// Per-layer row counts
    pub fn memory_stats(&self, project_id: &str) -> Result<MemoryStats> {
        self.meta.memory_stats(project_id)
    }

    /// Regenerate missing/stale embeddings across episodic and semantic rows
    pub fn reembed(&self, project_id: &str, limit: usize) -> Result<usize> {
        let events = self.episodic.reembed_pass(project_id, limit)?;
        let memories = self.semantic.reembed_pass(project_id, limit)?;
        Ok(events + memories)
    }

    // ========================================================================
    // BACKGROUND WORK & SHUTDOWN
    // ========================================================================

    fn start_scheduler(&self) {
        let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
        let store = self.store.clone();
        let consolidator = self.consolidator.clone();
        let light_every = std::time::Duration::from_secs(self.config.scheduler.light_interval_secs);
        let archive_every =
            std::time::Duration::from_secs(self.config.scheduler.archival_interval_secs);

        let worker = tokio::spawn(async move {
            let mut light = tokio::time::interval(light_every);
            let mut archival = tokio::time::interval(archive_every);
            // The immediate first tick would consolidate on startup; skip it
            light.tick().await;
            archival.tick().await;
            loop {
                let archive = tokio::select! {
                    _ = light.tick() => false,
                    _ = archival.tick() => true,
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                        continue;
                    }
                };
                let projects = match store.project_list() {
                    Ok(projects) => projects,
                    Err(e) => {
                        warn!(error = %e, "scheduler project sweep failed");
                        continue;
                    }
                };
                for project in projects {
                    let consolidator = consolidator.clone();
                    let options = RunOptions {
                        strategy: None,
                        archive,
                    };
                    let project_id = project.id.clone();
                    let result = tokio::task::spawn_blocking(move || {
                        consolidator.run(&project_id, &options)
                    })
                    .await;
                    match result {
                        Ok(Ok(report)) => debug!(
                            project = %project.name,
                            patterns = report.record.patterns_extracted,
                            "scheduled consolidation tick"
                        ),
                        Ok(Err(e)) => warn!(project = %project.name, error = %e, "scheduled consolidation failed"),
                        Err(e) => warn!(error = %e, "scheduled consolidation task panicked"),
                    }
                }
            }
            debug!("consolidation scheduler stopped");
        });

        if let Ok(mut slot) = self.scheduler.lock() {
            *slot = Some(SchedulerHandle {
                stop: stop_tx,
                worker,
            });
        }
    }

    /// Graceful shutdown: drain the flusher, stop the scheduler, release
    /// the store. Idempotent.
    pub async fn shutdown(&self) {
        let flusher = self.flusher.lock().ok().and_then(|mut slot| slot.take());
        if let Some(flusher) = flusher {
            flusher.shutdown().await;
        }
        let handle = self.scheduler.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            let _ = handle.stop.send(true);
            if let Err(e) = handle.worker.await {
                warn!(error = %e, "scheduler join failed");
            }
        }
        info!("memory manager shut down");
    }
}

// ============================================================================
// TESTS
// ============================================================================
