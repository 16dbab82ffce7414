//! Activation engine - ACT-R-inspired scoring and working-memory selection
//!
//! Each active event gets a score combining rehearsal (how often and how
//! recently it was activated) with its intrinsic signals:
//!
//! ```text
//! activation(e) = decay_w * ln(1 + activation_count * recency(e))
//!              + importance_w * importance
//!              + actionability_w * actionability
//!              + contextuality_w * contextuality
//!
//! recency(e) = exp(-lambda * age_since_last_activation / time_unit)
//! ```
//!
//! The score is strictly increasing in activation count and importance and,
//! for any rehearsed event, strictly decreasing in age since the last
//! activation. Working memory is the top-N active events by this score,
//! N clamped to Miller's 7±2 band.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ActivationConfig;
use crate::model::EpisodicEvent;

// ============================================================================
// ENGINE
// ============================================================================

/// Computes activation scores and working-memory rankings
#[derive(Debug, Clone, Default)]
pub struct ActivationEngine {
    config: ActivationConfig,
}

/// An event with its activation reading
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivatedEvent {
    /// The event
    pub event: EpisodicEvent,
    /// Activation score at ranking time
    pub activation: f64,
}

impl ActivationEngine {
    /// Create an engine with the given config
    pub fn new(config: ActivationConfig) -> Self {
        Self { config }
    }

    /// Current configuration
    pub fn config(&self) -> &ActivationConfig {
        &self.config
    }

    /// Exponential recency factor in (0, 1]
    pub fn recency(&self, event: &EpisodicEvent, now: DateTime<Utc>) -> f64 {
        let age = event.seconds_since_activation(now);
        (-self.config.lambda * age / self.config.time_unit_secs).exp()
    }

    /// Activation score for one event
    pub fn score(&self, event: &EpisodicEvent, now: DateTime<Utc>) -> f64 {
        let rehearsal = (1.0 + event.activation_count as f64 * self.recency(event, now)).ln();
        self.config.decay_weight * rehearsal
            + self.config.importance_weight * event.importance
            + self.config.actionability_weight * event.actionability
            + self.config.contextuality_weight * event.contextuality
    }

    /// Rank events by activation, timestamp-descending tiebreak
    pub fn rank(&self, events: Vec<EpisodicEvent>, now: DateTime<Utc>) -> Vec<ActivatedEvent> {
        let mut scored: Vec<ActivatedEvent> = events
            .into_iter()
            .map(|event| {
                let activation = self.score(&event, now);
                ActivatedEvent { event, activation }
            })
            .collect();
        scored.sort_by(|a, b| {
            b.activation
                .partial_cmp(&a.activation)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.event.timestamp.cmp(&a.event.timestamp))
        });
        scored
    }

    /// Top-N working-memory slots from the candidate set. `n` overrides the
    /// configured slot count; either way the Miller band applies.
    pub fn select_working_memory(
        &self,
        events: Vec<EpisodicEvent>,
        now: DateTime<Utc>,
        n: Option<usize>,
    ) -> Vec<ActivatedEvent> {
        let slots = match n {
            Some(n) => n.clamp(5, 9),
            None => self.config.clamped_slots(),
        };
        let mut ranked = self.rank(events, now);
        ranked.truncate(slots);
        ranked
    }

    /// Share of working-memory slots whose activation clears the floor;
    /// the cognitive-load reading used to throttle tier-3 retrieval.
    pub fn cognitive_load(&self, working_memory: &[ActivatedEvent]) -> f64 {
        let slots = self.config.clamped_slots();
        if slots == 0 {
            return 0.0;
        }
        let loaded = working_memory
            .iter()
            .take(slots)
            .filter(|item| item.activation >= self.config.activation_floor)
            .count();
        loaded as f64 / slots as f64
    }
}

// ============================================================================
// TESTS
// ============================================================================
