pub mod citations;
pub mod confidence;
pub mod config;
pub mod coverage;
pub mod decompose;
pub mod diversify;
pub mod engine;
pub mod error;
pub mod fusion;
pub mod gate;
pub mod global_search;
pub mod local_search;
pub mod model;
pub mod multihop;
pub mod retriever;
pub mod router;
pub mod tracer;

pub use citations::{assemble_context, extract_citations, AssembledContext, CitationMap};
pub use confidence::{compute_confidence, redecompose_cause, RedecomposeCause};
pub use config::{ConfidenceWeights, EngineConfig};
pub use coverage::{gap_fill, CoverageFill, CoverageIntent, PatternCoverageIntent};
pub use decompose::{sanitize_sub_questions, Decomposer, Decomposition};
pub use diversify::{diversify, merge_with_document_diversity};
pub use engine::QueryEngine;
pub use error::QueryError;
pub use fusion::reciprocal_rank_fusion;
pub use gate::REFUSAL_MESSAGE;
pub use global_search::GlobalSearchEngine;
pub use local_search::LocalSearchEngine;
pub use model::{
    Citation, ConfidenceMetrics, EvidenceBundle, EvidenceNode, EvidenceOutcome, QueryDiagnostics,
    QueryResponse, RefusalReason, RetrievalPath, Route, SubQuestion,
};
pub use multihop::{next_phase, DecompositionLoop, LoopPhase, LoopSignals, MultiHopSearchEngine};
pub use retriever::HybridChunkRetriever;
pub use router::{parse_route_label, route_query, LlmRouteClassifier, RouteClassifier};
pub use tracer::{GraphEvidenceTracer, Trace};
