//! Episodic events - the append-only experience log
//!
//! An event records one experience with scoring signals (importance,
//! contextuality, actionability), a lifecycle status driving visibility,
//! and a content hash for dedup. Hashing covers the semantic payload only:
//! id, lifecycle fields, and access stats are explicitly excluded so that
//! re-recording the same experience collides.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// EVENT VOCABULARY
// ============================================================================

/// What kind of experience the event records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// Something the agent did
    #[default]
    Action,
    /// A choice between alternatives
    Decision,
    /// Something the agent noticed
    Observation,
    /// A failure or fault
    Error,
    /// An exchange with the user or another agent
    Interaction,
    /// New knowledge acquired
    Learning,
}

impl EventType {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Action => "action",
            EventType::Decision => "decision",
            EventType::Observation => "observation",
            EventType::Error => "error",
            EventType::Interaction => "interaction",
            EventType::Learning => "learning",
        }
    }

    /// Parse from stored text, defaulting unknown values to `Action`
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "decision" => EventType::Decision,
            "observation" => EventType::Observation,
            "error" => EventType::Error,
            "interaction" => EventType::Interaction,
            "learning" => EventType::Learning,
            _ => EventType::Action,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the recorded experience turned out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
    Partial,
    #[default]
    Unknown,
}

impl Outcome {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
            Outcome::Partial => "partial",
            Outcome::Unknown => "unknown",
        }
    }

    /// Parse from stored text
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "success" => Outcome::Success,
            "failure" => Outcome::Failure,
            "partial" => Outcome::Partial,
            _ => Outcome::Unknown,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// LIFECYCLE
// ============================================================================

/// Event lifecycle status - drives working-memory and recall visibility
///
/// Transitions: `active -> consolidated`, `active|consolidated -> archived`.
/// Everything else is a caller bug surfaced as `InvalidTransition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStatus {
    /// Freshly recorded; visible to working memory and default recall
    #[default]
    Active,
    /// Promoted into a semantic pattern by consolidation
    Consolidated,
    /// Aged out; retained for audit, invisible to default recall
    Archived,
}

impl LifecycleStatus {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStatus::Active => "active",
            LifecycleStatus::Consolidated => "consolidated",
            LifecycleStatus::Archived => "archived",
        }
    }

    /// Parse from stored text
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "consolidated" => LifecycleStatus::Consolidated,
            "archived" => LifecycleStatus::Archived,
            _ => LifecycleStatus::Active,
        }
    }

    /// Whether the transition `self -> to` is allowed
    pub fn can_transition(&self, to: LifecycleStatus) -> bool {
        matches!(
            (self, to),
            (LifecycleStatus::Active, LifecycleStatus::Consolidated)
                | (LifecycleStatus::Active, LifecycleStatus::Archived)
                | (LifecycleStatus::Consolidated, LifecycleStatus::Archived)
        )
    }
}

impl std::fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// CONTEXT
// ============================================================================

/// Typed context captured alongside an event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
    /// Working directory at the time of the event
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// Files involved
    #[serde(default)]
    pub files: Vec<String>,
    /// Task the agent was pursuing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    /// Work phase (e.g. "debugging", "planning")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

impl EventContext {
    /// Normalized copy used for hashing: trimmed strings, sorted file list,
    /// empty strings collapsed to None.
    pub fn normalized(&self) -> EventContext {
        let clean = |s: &Option<String>| {
            s.as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
        };
        let mut files: Vec<String> = self
            .files
            .iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect();
        files.sort();
        files.dedup();
        EventContext {
            cwd: clean(&self.cwd),
            files,
            task: clean(&self.task),
            phase: clean(&self.phase),
        }
    }

    /// True when no field carries information
    pub fn is_empty(&self) -> bool {
        self.cwd.is_none() && self.files.is_empty() && self.task.is_none() && self.phase.is_none()
    }
}

// ============================================================================
// EVENT
// ============================================================================

/// One recorded experience
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodicEvent {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Owning project
    pub project_id: String,
    /// Caller-provided session grouping key
    pub session_id: String,
    /// When the experience happened
    pub timestamp: DateTime<Utc>,
    /// Kind of experience
    pub event_type: EventType,
    /// What happened
    pub content: String,
    /// Typed context at the time of recording
    pub context: EventContext,
    /// How it turned out
    pub outcome: Outcome,
    /// Importance in [0, 1]
    pub importance: f64,
    /// How context-bound the event is, in [0, 1]
    pub contextuality: f64,
    /// How actionable the event is, in [0, 1]
    pub actionability: f64,
    /// SHA-256 of the normalized semantic payload
    pub content_hash: String,
    /// Visibility-driving lifecycle status
    pub lifecycle_status: LifecycleStatus,
    /// Confidence of the consolidation that promoted this event
    pub consolidation_score: f64,
    /// Last time the event was recalled or touched
    pub last_activation: DateTime<Utc>,
    /// Times the event has been recalled; monotonically non-decreasing
    pub activation_count: i64,
    /// Optional back-link to a dominant graph entity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

impl EpisodicEvent {
    /// Age since last activation, in seconds (never negative)
    pub fn seconds_since_activation(&self, now: DateTime<Utc>) -> f64 {
        (now - self.last_activation).num_milliseconds().max(0) as f64 / 1000.0
    }
}

// ============================================================================
// INPUT & FILTERS
// ============================================================================

/// Input for recording a new event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EventInput {
    /// Session grouping key (boundaries are caller-provided)
    pub session_id: String,
    /// Kind of experience
    #[serde(default)]
    pub event_type: EventType,
    /// What happened
    pub content: String,
    /// Typed context
    #[serde(default)]
    pub context: EventContext,
    /// How it turned out
    #[serde(default)]
    pub outcome: Outcome,
    /// Importance in [0, 1]
    #[serde(default = "default_half")]
    pub importance: f64,
    /// Contextuality in [0, 1]
    #[serde(default = "default_half")]
    pub contextuality: f64,
    /// Actionability in [0, 1]
    #[serde(default = "default_half")]
    pub actionability: f64,
}

fn default_half() -> f64 {
    0.5
}

impl Default for EventInput {
    fn default() -> Self {
        Self {
            session_id: String::new(),
            event_type: EventType::default(),
            content: String::new(),
            context: EventContext::default(),
            outcome: Outcome::default(),
            importance: 0.5,
            contextuality: 0.5,
            actionability: 0.5,
        }
    }
}

impl EventInput {
    /// Deterministic SHA-256 over the canonical semantic payload.
    ///
    /// Covers {event_type, content, normalized context, session_id, outcome};
    /// excludes id, lifecycle fields, and access stats. Key order is fixed
    /// and content whitespace is collapsed so cosmetic variations collide.
    pub fn content_hash(&self) -> String {
        let canonical_content = self.content.split_whitespace().collect::<Vec<_>>().join(" ");
        // Fixed field order; serde_json preserves struct order
        let payload = serde_json::json!({
            "content": canonical_content,
            "context": self.context.normalized(),
            "eventType": self.event_type.as_str(),
            "outcome": self.outcome.as_str(),
            "sessionId": self.session_id.trim(),
        });
        let bytes = serde_json::to_vec(&payload).unwrap_or_default();
        let digest = Sha256::digest(&bytes);
        format!("{:x}", digest)
    }
}

/// Ordering for event queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOrder {
    /// Newest first
    #[default]
    Timestamp,
    /// Highest activation signal first (count, then recency)
    Activation,
}

/// Filter for event queries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFilter {
    /// Inclusive time range
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
    /// Restrict to one session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Restrict to these event types
    #[serde(default)]
    pub event_types: Vec<EventType>,
    /// Restrict to these lifecycle statuses; empty means `active` +
    /// `consolidated` (archived events are opt-in)
    #[serde(default)]
    pub lifecycle_statuses: Vec<LifecycleStatus>,
    /// Include archived events when no explicit status set is given
    #[serde(default)]
    pub include_archived: bool,
    /// Maximum rows
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Row offset (session replay cursor)
    #[serde(default)]
    pub offset: usize,
    /// Sort order
    #[serde(default)]
    pub order_by: EventOrder,
}

/// Result of `record_event`: duplicate hashes are a status, not an error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum RecordOutcome {
    /// The event was stored
    Stored { id: String },
    /// An identical payload already exists; nothing was written
    Duplicate { id: String },
}

impl RecordOutcome {
    /// Id of the stored or pre-existing event
    pub fn id(&self) -> &str {
        match self {
            RecordOutcome::Stored { id } | RecordOutcome::Duplicate { id } => id,
        }
    }

    /// True when the call deduplicated
    pub fn is_duplicate(&self) -> bool {
        matches!(self, RecordOutcome::Duplicate { .. })
    }
}

// ============================================================================
// TESTS
// ============================================================================
