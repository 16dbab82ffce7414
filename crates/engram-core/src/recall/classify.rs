//! Rule-based query classification
//!
//! Cheap keyword heuristics map a query onto target layers; no LLM is
//! involved. Planning markers flag the query as complex (a tier-3
//! candidate), and the session phase can pull extra layers in.

use super::Layer;

/// Classification outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Layers tier 1 should query, in prior order
    pub layers: Vec<Layer>,
    /// Planning/reasoning markers present (tier-3 candidate)
    pub complex: bool,
    /// Nothing but the semantic default matched (depth-1 candidate)
    pub simple_factual: bool,
    /// Meta terms present: attach expertise/load hints in tier 2
    pub wants_meta: bool,
}

const TEMPORAL_TERMS: &[&str] = &[
    "when", "yesterday", "today", "last time", "last week", "recently", "ago", "earlier",
    "happened", "did we",
];

const PROCEDURAL_TERMS: &[&str] = &[
    "how do", "how to", "procedure", "steps", "workflow", "process for", "runbook",
];

const PROSPECTIVE_TERMS: &[&str] = &[
    "task", "tasks", "todo", "to-do", "goal", "goals", "deadline", "due", "pending", "blocked",
];

const GRAPH_TERMS: &[&str] = &[
    "depends", "dependency", "uses", "used by", "connected", "relation", "related to", "linked",
    "graph",
];

const META_TERMS: &[&str] = &[
    "what do we know", "how much do we know", "coverage", "expertise", "memory health",
    "do we understand",
];

const PLANNING_TERMS: &[&str] = &["decompose", "plan", "strategy", "validate", "recommend"];

/// Classify a query against the layer vocabulary
pub fn classify(query: &str, phase: Option<&str>) -> Classification {
    let lowered = query.to_lowercase();
    let contains_any = |terms: &[&str]| terms.iter().any(|t| lowered.contains(t));

    let mut layers: Vec<Layer> = Vec::new();
    let mut push = |layer: Layer, layers: &mut Vec<Layer>| {
        if !layers.contains(&layer) {
            layers.push(layer);
        }
    };

    let mut matched_specific = false;
    if contains_any(TEMPORAL_TERMS) {
        push(Layer::Episodic, &mut layers);
        matched_specific = true;
    }
    if contains_any(PROCEDURAL_TERMS) {
        push(Layer::Procedural, &mut layers);
        matched_specific = true;
    }
    if contains_any(PROSPECTIVE_TERMS) {
        push(Layer::Prospective, &mut layers);
        matched_specific = true;
    }
    if contains_any(GRAPH_TERMS) {
        push(Layer::Graph, &mut layers);
        matched_specific = true;
    }
    let wants_meta = contains_any(META_TERMS);

    // Debugging sessions always look at the event log
    if phase.map(|p| p.eq_ignore_ascii_case("debugging")).unwrap_or(false) {
        push(Layer::Episodic, &mut layers);
    }

    // The semantic layer is the default target for everything
    push(Layer::Semantic, &mut layers);

    let complex = contains_any(PLANNING_TERMS);
    let simple_factual = !matched_specific && !complex && !wants_meta;

    // Stable prior order keeps cache keys and tier-1 dispatch deterministic
    let ordered: Vec<Layer> = Layer::all()
        .into_iter()
        .filter(|l| layers.contains(l))
        .collect();

    Classification {
        layers: ordered,
        complex,
        simple_factual,
        wants_meta,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temporal_queries_target_episodic() {
        let c = classify("when did we last fix the auth bug", None);
        assert!(c.layers.contains(&Layer::Episodic));
        assert!(c.layers.contains(&Layer::Semantic));
        assert!(!c.simple_factual);
    }

    #[test]
    fn how_to_targets_procedural() {
        let c = classify("how do we deploy to staging", None);
        assert!(c.layers.contains(&Layer::Procedural));
    }

    #[test]
    fn task_queries_target_prospective() {
        let c = classify("which tasks are still pending", None);
        assert!(c.layers.contains(&Layer::Prospective));
    }

    #[test]
    fn relational_queries_target_graph() {
        let c = classify("what depends on the api gateway", None);
        assert!(c.layers.contains(&Layer::Graph));
    }

    #[test]
    fn meta_queries_set_the_flag() {
        let c = classify("what do we know about caching here", None);
        assert!(c.wants_meta);
        assert!(c.layers.contains(&Layer::Semantic));
    }

    #[test]
    fn plain_queries_are_simple_factual() {
        let c = classify("postgres connection string format", None);
        assert_eq!(c.layers, vec![Layer::Semantic]);
        assert!(c.simple_factual);
        assert!(!c.complex);
    }

    #[test]
    fn planning_terms_flag_complex() {
        let c = classify("recommend a strategy to decompose this migration", None);
        assert!(c.complex);
        assert!(!c.simple_factual);
    }

    #[test]
    fn debugging_phase_adds_episodic() {
        let c = classify("null pointer in the parser", Some("debugging"));
        assert!(c.layers.contains(&Layer::Episodic));
        // Phase injection alone doesn't make it non-factual
        let without = classify("null pointer in the parser", None);
        assert!(!without.layers.contains(&Layer::Episodic));
    }

    #[test]
    fn layer_order_is_stable() {
        let c = classify("when did the task graph deploy break", None);
        let priors: Vec<f32> = c.layers.iter().map(|l| l.prior()).collect();
        assert!(priors.windows(2).all(|w| w[0] >= w[1]));
    }
}
