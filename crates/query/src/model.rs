use serde::{Deserialize, Serialize};

use index::{Relationship, SourceChunk};

/// Retrieval strategy chosen for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Focused questions about specific named entities.
    Local,
    /// Thematic, corpus-wide questions answered from communities.
    Global,
    /// Questions needing several linked facts; decomposed into sub-questions.
    MultiHop,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Local => "local",
            Route::Global => "global",
            Route::MultiHop => "multi_hop",
        }
    }
}

/// A retrieval path that failed and was skipped for this query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalPath {
    Graph,
    Keyword,
    Vector,
    Relationships,
    Coverage,
    Walk,
    Communities,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceNode {
    pub entity_name: String,
    pub score: f64,
}

impl EvidenceNode {
    pub fn new(entity_name: impl Into<String>, score: f64) -> Self {
        Self {
            entity_name: entity_name.into(),
            score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubQuestion {
    pub text: String,
    pub index: usize,
    pub resolved_entities: Vec<String>,
    pub evidence_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceMetrics {
    pub score: f64,
    pub satisfied_ratio: f64,
    pub entity_diversity: f64,
    pub thin_questions: Vec<String>,
    pub concentrated_entities: Vec<String>,
}

/// One marker the answer used, resolved to its source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub marker: String,
    pub chunk_id: String,
    pub document_id: String,
    pub document_title: String,
    pub document_source: String,
    pub section_path: Vec<String>,
    /// Character offset of the cited sentence in its document, when known.
    pub offset: Option<usize>,
    pub length: Option<usize>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefusalReason {
    /// Nothing was found before generation.
    NoEvidence,
    /// Evidence existed but none of it was citable text.
    NoCitableEvidence,
    /// The generated answer cited no known source.
    NoCitationsInAnswer,
}

/// Everything a route gathered for one query.
#[derive(Debug, Clone)]
pub struct EvidenceBundle {
    pub route: Route,
    pub seeds: Vec<String>,
    pub evidence: Vec<EvidenceNode>,
    pub relationships: Vec<Relationship>,
    pub chunks: Vec<SourceChunk>,
    pub communities: Vec<String>,
    pub sub_questions: Vec<SubQuestion>,
    pub confidence: Option<ConfidenceMetrics>,
    pub redecompose_attempts: usize,
    pub decomposition_failed: bool,
    pub coverage_added: usize,
    pub coverage_intent: bool,
    pub degraded_paths: Vec<RetrievalPath>,
    /// Query embedding computed during vector search, reused by gap-fill.
    pub query_embedding: Option<Vec<f32>>,
}

impl EvidenceBundle {
    pub fn new(route: Route) -> Self {
        Self {
            route,
            seeds: Vec::new(),
            evidence: Vec::new(),
            relationships: Vec::new(),
            chunks: Vec::new(),
            communities: Vec::new(),
            sub_questions: Vec::new(),
            confidence: None,
            redecompose_attempts: 0,
            decomposition_failed: false,
            coverage_added: 0,
            coverage_intent: false,
            degraded_paths: Vec::new(),
            query_embedding: None,
        }
    }

    pub fn record_degraded(&mut self, path: RetrievalPath) {
        if !self.degraded_paths.contains(&path) {
            self.degraded_paths.push(path);
        }
    }
}

/// Result of retrieval: either enough evidence to generate from, or a
/// decision to refuse before any generative call.
#[derive(Debug, Clone)]
pub enum EvidenceOutcome {
    Ready(EvidenceBundle),
    Refuse {
        reason: RefusalReason,
        bundle: EvidenceBundle,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryDiagnostics {
    pub route: Route,
    pub seeds: Vec<String>,
    pub evidence: Vec<EvidenceNode>,
    pub communities: Vec<String>,
    pub relationships: usize,
    pub chunks_retrieved: usize,
    pub coverage_added: usize,
    pub coverage_intent: bool,
    pub sub_questions: Vec<SubQuestion>,
    pub confidence: Option<ConfidenceMetrics>,
    pub redecompose_attempts: usize,
    pub decomposition_failed: bool,
    pub degraded_paths: Vec<RetrievalPath>,
    pub elapsed_ms: u64,
}

impl QueryDiagnostics {
    pub fn from_bundle(bundle: &EvidenceBundle, elapsed_ms: u64) -> Self {
        Self {
            route: bundle.route,
            seeds: bundle.seeds.clone(),
            evidence: bundle.evidence.clone(),
            communities: bundle.communities.clone(),
            relationships: bundle.relationships.len(),
            chunks_retrieved: bundle.chunks.len(),
            coverage_added: bundle.coverage_added,
            coverage_intent: bundle.coverage_intent,
            sub_questions: bundle.sub_questions.clone(),
            confidence: bundle.confidence.clone(),
            redecompose_attempts: bundle.redecompose_attempts,
            decomposition_failed: bundle.decomposition_failed,
            degraded_paths: bundle.degraded_paths.clone(),
            elapsed_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub refused: bool,
    pub refusal_reason: Option<RefusalReason>,
    pub citations: Vec<Citation>,
    pub diagnostics: QueryDiagnostics,
}
