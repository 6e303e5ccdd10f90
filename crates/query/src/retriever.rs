use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::coverage;
use crate::diversify::{diversify, merge_with_document_diversity};
use crate::fusion::reciprocal_rank_fusion;
use crate::model::{EvidenceBundle, EvidenceNode, RetrievalPath};
use index::{name_key, EmbeddingClient, GraphStore, Relationship, SourceChunk};

/// Fused keyword + vector hits for a query.
#[derive(Debug, Clone, Default)]
pub struct HybridHits {
    pub chunks: Vec<SourceChunk>,
    pub query_embedding: Option<Vec<f32>>,
    pub degraded: Vec<RetrievalPath>,
}

/// Graph-derived material for a set of evidence nodes.
#[derive(Debug, Clone, Default)]
pub struct GraphMaterial {
    pub chunks: Vec<SourceChunk>,
    pub relationships: Vec<Relationship>,
    pub degraded: Vec<RetrievalPath>,
}

/// Collects text evidence from the graph edges and from the text indexes.
#[derive(Clone)]
pub struct HybridChunkRetriever {
    store: Arc<dyn GraphStore>,
    embedding_client: Arc<dyn EmbeddingClient>,
    config: EngineConfig,
}

impl HybridChunkRetriever {
    pub fn new(
        store: Arc<dyn GraphStore>,
        embedding_client: Arc<dyn EmbeddingClient>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            embedding_client,
            config,
        }
    }

    /// Mentioning chunks and relationships for the evidence entities. Chunks
    /// are scored by their entity's evidence score, best first.
    pub async fn graph_material(&self, evidence: &[EvidenceNode]) -> GraphMaterial {
        let mut material = GraphMaterial::default();
        if evidence.is_empty() {
            return material;
        }

        let names: Vec<String> = evidence.iter().map(|n| n.entity_name.clone()).collect();
        let entities = match self.store.find_entities_by_name_or_alias(&names).await {
            Ok(entities) => entities,
            Err(e) => {
                warn!(error = %e, "Entity lookup failed, skipping graph chunks");
                material.degraded.push(RetrievalPath::Graph);
                material.degraded.push(RetrievalPath::Relationships);
                return material;
            }
        };

        let mut entity_ids = Vec::new();
        for name in &names {
            if let Some(entity) = entities.iter().find(|e| e.matches(name)) {
                if !entity_ids.contains(&entity.graph_id) {
                    entity_ids.push(entity.graph_id.clone());
                }
            }
        }
        if entity_ids.is_empty() {
            return material;
        }

        let (chunks, relationships) = tokio::join!(
            self.store
                .chunks_mentioning(&entity_ids, self.config.max_chunks_per_entity),
            self.store
                .co_occurring_entities(&entity_ids, self.config.max_relationships),
        );

        match chunks {
            Ok(chunks) => material.chunks = score_by_evidence(chunks, evidence),
            Err(e) => {
                warn!(error = %e, "Mentioning-chunk lookup failed");
                material.degraded.push(RetrievalPath::Graph);
            }
        }
        match relationships {
            Ok(relationships) => material.relationships = relationships,
            Err(e) => {
                warn!(error = %e, "Relationship lookup failed");
                material.degraded.push(RetrievalPath::Relationships);
            }
        }

        debug!(
            entities = entity_ids.len(),
            chunks = material.chunks.len(),
            relationships = material.relationships.len(),
            "Collected graph material"
        );
        material
    }

    /// Keyword and vector search in parallel, fused with RRF. Either path may
    /// fail independently; the other still contributes.
    pub async fn hybrid_hits(&self, query: &str) -> HybridHits {
        let (keyword, vector) = tokio::join!(
            self.store.keyword_search(query, self.config.keyword_top_k),
            self.vector_hits(query),
        );

        let mut hits = HybridHits::default();
        let keyword = match keyword {
            Ok(keyword) => keyword.into_iter().map(|(c, _)| c).collect(),
            Err(e) => {
                warn!(error = %e, "Keyword search failed");
                hits.degraded.push(RetrievalPath::Keyword);
                Vec::new()
            }
        };
        let vector = match vector {
            Ok((embedding, vector)) => {
                hits.query_embedding = Some(embedding);
                vector
            }
            Err(e) => {
                warn!(error = %e, "Vector search failed");
                hits.degraded.push(RetrievalPath::Vector);
                Vec::new()
            }
        };

        hits.chunks = reciprocal_rank_fusion(&[keyword, vector], self.config.rrf_k);
        debug!(fused = hits.chunks.len(), "Fused keyword and vector hits");
        hits
    }

    async fn vector_hits(&self, query: &str) -> Result<(Vec<f32>, Vec<SourceChunk>)> {
        let embedding = self.embedding_client.embed_query(query).await?;
        let hits = self
            .store
            .vector_search(&embedding, self.config.vector_top_k)
            .await?;
        Ok((embedding, hits.into_iter().map(|(c, _)| c).collect()))
    }

    /// Focused merge: graph chunks first, hybrid hits as a safety net, then
    /// section/document caps and the chunk budget.
    pub fn merge_focused(&self, graph: Vec<SourceChunk>, hybrid: Vec<SourceChunk>) -> Vec<SourceChunk> {
        let mut candidates = graph;
        candidates.extend(hybrid);
        let mut merged = diversify(
            candidates,
            self.config.max_per_section,
            self.config.max_per_document,
        );
        merged.truncate(self.config.max_chunks);
        merged
    }

    /// Thematic merge: capped graph chunks, then hybrid hits pulled in
    /// breadth-first across documents.
    pub fn merge_thematic(&self, graph: Vec<SourceChunk>, hybrid: &[SourceChunk]) -> Vec<SourceChunk> {
        let mut base = diversify(graph, self.config.max_per_section, self.config.max_per_document);
        base.truncate(self.config.max_chunks);
        merge_with_document_diversity(
            base,
            hybrid,
            self.config.min_documents,
            self.config.max_per_section,
            self.config.max_per_document,
            self.config.max_chunks,
        )
    }

    /// Graph material plus hybrid hits for `query`, written into `bundle`.
    pub async fn collect(&self, query: &str, bundle: &mut EvidenceBundle, thematic: bool) {
        let (material, hits) =
            tokio::join!(self.graph_material(&bundle.evidence), self.hybrid_hits(query));

        for path in material.degraded.iter().chain(hits.degraded.iter()) {
            bundle.record_degraded(*path);
        }
        bundle.relationships = material.relationships;
        bundle.query_embedding = hits.query_embedding;
        bundle.chunks = if thematic {
            self.merge_thematic(material.chunks, &hits.chunks)
        } else {
            self.merge_focused(material.chunks, hits.chunks)
        };
    }

    /// Runs coverage gap-fill over the bundle's chunks.
    pub async fn coverage_fill(&self, bundle: &mut EvidenceBundle) {
        let embedding = bundle.query_embedding.clone();
        match coverage::gap_fill(self.store.as_ref(), &mut bundle.chunks, embedding.as_deref()).await {
            Ok(fill) => {
                bundle.coverage_added += fill.added;
                if !fill.failed.is_empty() {
                    bundle.record_degraded(RetrievalPath::Coverage);
                }
            }
            Err(e) => {
                warn!(error = %e, "Coverage gap-fill failed");
                bundle.record_degraded(RetrievalPath::Coverage);
            }
        }
    }
}

fn score_by_evidence(chunks: Vec<SourceChunk>, evidence: &[EvidenceNode]) -> Vec<SourceChunk> {
    let scores: HashMap<String, f64> = evidence
        .iter()
        .map(|n| (name_key(&n.entity_name), n.score))
        .collect();

    let mut scored: Vec<SourceChunk> = chunks
        .into_iter()
        .map(|chunk| {
            let score = scores.get(&name_key(&chunk.entity_name)).copied().unwrap_or(0.0);
            chunk.with_score(score)
        })
        .collect();
    scored.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Route;
    use async_trait::async_trait;
    use index::{Entity, InMemoryStore, StoreOperation, StoredChunk, KEYWORD_MATCH};

    struct FixedEmbeddings;

    #[async_trait]
    impl EmbeddingClient for FixedEmbeddings {
        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
    }

    fn store() -> InMemoryStore {
        InMemoryStore::new("tenant")
            .with_entity(Entity::new("e1", "Acme Corp"))
            .with_entity(Entity::new("e2", "Beta Ltd"))
            .with_relationship("e1", "e2", "supplies parts to")
            .with_chunk(
                StoredChunk::new(SourceChunk::new("c1", "d1", "Acme Corp pays the invoice."))
                    .mentioning("e1")
                    .with_embedding(vec![1.0, 0.0]),
            )
            .with_chunk(
                StoredChunk::new(SourceChunk::new("c2", "d2", "Beta Ltd ships the goods."))
                    .mentioning("e2"),
            )
            .with_chunk(StoredChunk::new(SourceChunk::new(
                "c3",
                "d3",
                "The invoice is due within thirty days.",
            )))
    }

    fn retriever(store: InMemoryStore) -> HybridChunkRetriever {
        HybridChunkRetriever::new(
            Arc::new(store),
            Arc::new(FixedEmbeddings),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_graph_chunks_scored_by_evidence() {
        let retriever = retriever(store());
        let evidence = vec![EvidenceNode::new("Beta Ltd", 0.4), EvidenceNode::new("acme corp", 1.0)];

        let material = retriever.graph_material(&evidence).await;

        let ids: Vec<&str> = material.chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
        assert_eq!(material.chunks[0].relevance_score, 1.0);
        assert_eq!(material.relationships.len(), 1);
        assert!(material.degraded.is_empty());
    }

    #[tokio::test]
    async fn test_keyword_failure_still_returns_vector_hits() {
        let retriever = retriever(store().failing_on(StoreOperation::KeywordSearch));

        let hits = retriever.hybrid_hits("invoice").await;

        assert_eq!(hits.degraded, vec![RetrievalPath::Keyword]);
        assert_eq!(hits.chunks.len(), 1);
        assert_eq!(hits.chunks[0].chunk_id, "c1");
        assert!(hits.query_embedding.is_some());
    }

    #[tokio::test]
    async fn test_both_paths_failing_is_empty_not_error() {
        let retriever = retriever(
            store()
                .failing_on(StoreOperation::KeywordSearch)
                .failing_on(StoreOperation::VectorSearch),
        );
        let hits = retriever.hybrid_hits("invoice").await;
        assert!(hits.chunks.is_empty());
        assert_eq!(hits.degraded.len(), 2);
    }

    #[tokio::test]
    async fn test_collect_records_degraded_graph_path() {
        let retriever = retriever(store().failing_on(StoreOperation::ChunksMentioning));
        let mut bundle = EvidenceBundle::new(Route::Local);
        bundle.evidence = vec![EvidenceNode::new("Acme Corp", 1.0)];

        retriever.collect("invoice", &mut bundle, false).await;

        assert_eq!(bundle.degraded_paths, vec![RetrievalPath::Graph]);
        assert_eq!(bundle.relationships.len(), 1);
        let ids: Vec<&str> = bundle.chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c3"]);
        assert_eq!(bundle.chunks[1].entity_name, KEYWORD_MATCH);
    }

    #[tokio::test]
    async fn test_coverage_fill_marks_partial_failure_degraded() {
        let store = store()
            .with_document(index::DocumentRef::new("d1", "One"))
            .with_document(index::DocumentRef::new("d2", "Two"))
            .with_document(index::DocumentRef::new("d3", "Three"))
            .failing_lead_chunk_for("d2");
        let retriever = retriever(store);
        let mut bundle = EvidenceBundle::new(Route::Global);
        bundle.chunks = vec![SourceChunk::new("c1", "d1", "Acme Corp pays the invoice.")];

        retriever.coverage_fill(&mut bundle).await;

        assert_eq!(bundle.coverage_added, 1);
        assert_eq!(bundle.degraded_paths, vec![RetrievalPath::Coverage]);
        assert_eq!(bundle.chunks.last().map(|c| c.chunk_id.as_str()), Some("c3"));
    }
}
