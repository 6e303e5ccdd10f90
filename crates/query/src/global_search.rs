use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::QueryError;
use crate::model::{EvidenceBundle, RetrievalPath, Route};
use crate::retriever::HybridChunkRetriever;
use crate::tracer::GraphEvidenceTracer;
use communities::{extract_hub_entities, CommunityMatcher};
use index::GraphModel;

/// Thematic route: matched communities supply hub entities that seed the
/// graph walk; hybrid hits are merged breadth-first across documents.
pub struct GlobalSearchEngine {
    matcher: CommunityMatcher,
    tracer: GraphEvidenceTracer,
    retriever: HybridChunkRetriever,
    config: EngineConfig,
}

impl GlobalSearchEngine {
    pub fn new(
        matcher: CommunityMatcher,
        tracer: GraphEvidenceTracer,
        retriever: HybridChunkRetriever,
        config: EngineConfig,
    ) -> Self {
        Self {
            matcher,
            tracer,
            retriever,
            config,
        }
    }

    /// Fails with `PrerequisitesMissing` when the tenant has no communities or
    /// no relationships yet.
    pub async fn search(&self, query: &str, model: &GraphModel) -> Result<EvidenceBundle, QueryError> {
        if model.communities.is_empty() {
            return Err(QueryError::PrerequisitesMissing(
                "no communities have been built for this tenant".to_string(),
            ));
        }
        if model.relationships.is_empty() {
            return Err(QueryError::PrerequisitesMissing(
                "no relationships have been extracted for this tenant".to_string(),
            ));
        }

        let mut bundle = EvidenceBundle::new(Route::Global);

        let matched = match self
            .matcher
            .match_communities(query, &model.communities, self.config.community_top_k)
            .await
        {
            Ok(matched) => matched,
            Err(e) => {
                warn!(error = %e, "Community matching failed, continuing with text search");
                bundle.record_degraded(RetrievalPath::Communities);
                Vec::new()
            }
        };
        let communities: Vec<_> = matched.into_iter().map(|m| m.community).collect();
        bundle.communities = communities.iter().map(|c| c.title.clone()).collect();

        bundle.seeds = extract_hub_entities(model, &communities, self.config.hubs_per_community);
        let trace = self
            .tracer
            .trace(query, &bundle.seeds, self.config.trace_top_k)
            .await;
        if trace.walk_degraded {
            bundle.record_degraded(RetrievalPath::Walk);
        }
        bundle.evidence = trace.nodes;

        self.retriever.collect(query, &mut bundle, true).await;

        info!(
            communities = bundle.communities.len(),
            hubs = bundle.seeds.len(),
            evidence = bundle.evidence.len(),
            chunks = bundle.chunks.len(),
            "Global search retrieved evidence"
        );
        Ok(bundle)
    }
}
