use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Every tunable of the retrieval engine. Missing fields in a config file
/// fall back to these defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // Seed resolution and tracing
    pub seed_top_k: usize,
    pub trace_top_k: usize,
    pub sub_question_trace_top_k: usize,
    pub consolidated_trace_top_k: usize,
    pub ppr_enabled: bool,

    // Chunk retrieval
    pub max_chunks_per_entity: usize,
    pub keyword_top_k: usize,
    pub vector_top_k: usize,
    pub rrf_k: f64,
    pub max_per_section: usize,
    pub max_per_document: usize,
    pub max_chunks: usize,
    pub min_documents: usize,
    pub max_relationships: usize,
    pub coverage_enabled: bool,

    // Thematic route
    pub community_top_k: usize,
    pub hubs_per_community: usize,

    // Multi-hop route
    pub max_sub_questions: usize,
    pub discovery_concurrency: usize,
    pub max_redecompose_attempts: usize,
    pub confidence: ConfidenceWeights,

    // Whole query
    pub deadline_ms: u64,
    pub sentence_citations: bool,
    /// Degrade a thematic query on an unprepared tenant to the focused route
    /// instead of failing with `PrerequisitesMissing`.
    pub debug_fallback: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed_top_k: 3,
            trace_top_k: 20,
            sub_question_trace_top_k: 5,
            consolidated_trace_top_k: 30,
            ppr_enabled: true,
            max_chunks_per_entity: 3,
            keyword_top_k: 20,
            vector_top_k: 20,
            rrf_k: 60.0,
            max_per_section: 3,
            max_per_document: 6,
            max_chunks: 24,
            min_documents: 3,
            max_relationships: 30,
            coverage_enabled: true,
            community_top_k: 3,
            hubs_per_community: 5,
            max_sub_questions: 5,
            discovery_concurrency: 4,
            max_redecompose_attempts: 1,
            confidence: ConfidenceWeights::default(),
            deadline_ms: 120_000,
            sentence_citations: true,
            debug_fallback: false,
        }
    }
}

impl EngineConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

/// Empirically tuned confidence heuristics for the decomposition loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceWeights {
    pub satisfied_weight: f64,
    pub diversity_weight: f64,
    pub concentration_penalty: f64,
    pub concentration_penalty_cap: f64,
    /// A sub-question with fewer evidence nodes than this is "thin".
    pub min_evidence_per_question: usize,
    pub redecompose_score_below: f64,
    pub redecompose_diversity_below: f64,
    pub concentration_score_below: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            satisfied_weight: 0.6,
            diversity_weight: 0.4,
            concentration_penalty: 0.05,
            concentration_penalty_cap: 0.2,
            min_evidence_per_question: 2,
            redecompose_score_below: 0.5,
            redecompose_diversity_below: 0.3,
            concentration_score_below: 0.7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"max_per_section": 2, "confidence": {"satisfied_weight": 0.5}}"#)
                .unwrap();

        assert_eq!(config.max_per_section, 2);
        assert_eq!(config.max_per_document, 6);
        assert_eq!(config.confidence.satisfied_weight, 0.5);
        assert_eq!(config.confidence.diversity_weight, 0.4);
        assert_eq!(config.deadline(), Duration::from_secs(120));
    }
}
