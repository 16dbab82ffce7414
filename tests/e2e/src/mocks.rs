//! Reasoner test doubles

use engram_core::{
    ClusterSummary, ContextSnippet, EngineError, MemoryType, Reasoner, Result, SynthesizedAnswer,
    ValidationVerdict,
};

/// Accepts every cluster and synthesizes one answer citing the context
pub struct EchoReasoner;

impl Reasoner for EchoReasoner {
    fn validate(&self, summary: &ClusterSummary) -> Result<ValidationVerdict> {
        Ok(ValidationVerdict {
            accept: true,
            pattern_text: Some(format!(
                "pattern over {} events: {}",
                summary.event_count, summary.representative_content
            )),
            confidence: summary.initial_confidence.max(0.75),
            memory_type: MemoryType::Pattern,
        })
    }

    fn synthesize(
        &self,
        query: &str,
        context: &[ContextSnippet],
    ) -> Result<Vec<SynthesizedAnswer>> {
        let citations: Vec<(String, String)> = context
            .iter()
            .map(|snippet| (snippet.layer.clone(), snippet.id.clone()))
            .collect();
        Ok(vec![SynthesizedAnswer {
            text: format!("synthesized answer for: {}", query),
            confidence: 0.9,
            citations,
        }])
    }
}

/// Always unavailable; recall must degrade, consolidation must skip
pub struct UnavailableReasoner;

impl Reasoner for UnavailableReasoner {
    fn validate(&self, _summary: &ClusterSummary) -> Result<ValidationVerdict> {
        Err(EngineError::Unavailable("reasoner offline".into()))
    }

    fn synthesize(
        &self,
        _query: &str,
        _context: &[ContextSnippet],
    ) -> Result<Vec<SynthesizedAnswer>> {
        Err(EngineError::Unavailable("reasoner offline".into()))
    }
}
