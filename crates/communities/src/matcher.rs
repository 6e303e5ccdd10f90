use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use index::{cosine_similarity, Community, EmbeddingClient};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCommunity {
    pub community: Community,
    pub relevance_score: f32,
}

/// Ranks pre-computed community summaries against a query by embedding similarity.
#[derive(Clone)]
pub struct CommunityMatcher {
    embedding_client: Arc<dyn EmbeddingClient>,
}

impl CommunityMatcher {
    pub fn new(embedding_client: Arc<dyn EmbeddingClient>) -> Self {
        Self { embedding_client }
    }

    pub async fn match_communities(
        &self,
        query: &str,
        communities: &[Community],
        top_k: usize,
    ) -> Result<Vec<ScoredCommunity>> {
        if communities.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self
            .embedding_client
            .embed_query(query)
            .await
            .context("Failed to embed query")?;

        let mut scored = Vec::with_capacity(communities.len());
        for community in communities {
            let similarity = match &community.embedding {
                Some(embedding) => cosine_similarity(&query_embedding, embedding),
                None => {
                    let text = format!("{}\n{}", community.title, community.summary);
                    let embedding = self
                        .embedding_client
                        .embed_document(&text)
                        .await
                        .with_context(|| format!("Failed to embed community {}", community.id))?;
                    cosine_similarity(&query_embedding, &embedding)
                }
            };
            scored.push(ScoredCommunity {
                community: community.clone(),
                relevance_score: similarity,
            });
        }

        // Stable: equal scores keep store order.
        scored.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        scored.truncate(top_k);

        debug!(
            searched = communities.len(),
            matched = scored.len(),
            "Matched communities"
        );
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Embeds text as keyword presence flags.
    struct KeywordEmbeddings;

    #[async_trait]
    impl EmbeddingClient for KeywordEmbeddings {
        async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
            let text = text.to_lowercase();
            Ok(["payment", "termination", "privacy"]
                .iter()
                .map(|k| if text.contains(k) { 1.0 } else { 0.0 })
                .collect())
        }
    }

    fn community(id: &str, summary: &str) -> Community {
        Community {
            id: id.to_string(),
            title: format!("Community {}", id),
            summary: summary.to_string(),
            member_entity_ids: Default::default(),
            embedding: None,
        }
    }

    #[tokio::test]
    async fn test_ranks_by_similarity() {
        let matcher = CommunityMatcher::new(Arc::new(KeywordEmbeddings));
        let communities = vec![
            community("1", "Privacy obligations and data handling"),
            community("2", "Payment schedules and late payment fees"),
            community("3", "Termination rights"),
        ];

        let matched = matcher
            .match_communities("What are the payment terms?", &communities, 2)
            .await
            .unwrap();

        assert_eq!(matched.len(), 2);
        assert_eq!(matched[0].community.id, "2");
    }

    #[tokio::test]
    async fn test_uses_stored_embedding_when_present() {
        let matcher = CommunityMatcher::new(Arc::new(KeywordEmbeddings));
        let mut stored = community("9", "unrelated words");
        stored.embedding = Some(vec![0.0, 1.0, 0.0]);

        let matched = matcher
            .match_communities("termination", &[stored], 1)
            .await
            .unwrap();
        assert!((matched[0].relevance_score - 1.0).abs() < 1e-6);
    }
}
