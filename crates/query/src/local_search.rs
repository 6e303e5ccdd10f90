use tracing::info;

use crate::config::EngineConfig;
use crate::model::{EvidenceBundle, RetrievalPath, Route};
use crate::retriever::HybridChunkRetriever;
use crate::tracer::GraphEvidenceTracer;
use extract::SeedResolver;

/// Focused route: seeds from the question, a graph walk around them, then
/// mentioning chunks backed up by keyword/vector hits.
pub struct LocalSearchEngine {
    resolver: SeedResolver,
    tracer: GraphEvidenceTracer,
    retriever: HybridChunkRetriever,
    config: EngineConfig,
}

impl LocalSearchEngine {
    pub fn new(
        resolver: SeedResolver,
        tracer: GraphEvidenceTracer,
        retriever: HybridChunkRetriever,
        config: EngineConfig,
    ) -> Self {
        Self {
            resolver,
            tracer,
            retriever,
            config,
        }
    }

    pub async fn search(&self, query: &str) -> EvidenceBundle {
        let mut bundle = EvidenceBundle::new(Route::Local);

        bundle.seeds = self.resolver.disambiguate(query, self.config.seed_top_k).await;
        let trace = self
            .tracer
            .trace(query, &bundle.seeds, self.config.trace_top_k)
            .await;
        if trace.walk_degraded {
            bundle.record_degraded(RetrievalPath::Walk);
        }
        bundle.evidence = trace.nodes;

        self.retriever.collect(query, &mut bundle, false).await;

        info!(
            seeds = bundle.seeds.len(),
            evidence = bundle.evidence.len(),
            relationships = bundle.relationships.len(),
            chunks = bundle.chunks.len(),
            "Local search retrieved evidence"
        );
        bundle
    }
}
