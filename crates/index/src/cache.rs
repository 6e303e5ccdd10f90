use anyhow::Result;
use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use crate::schema::GraphModel;

/// Process-wide cache of graph-derived models, keyed by tenant id.
///
/// Concurrent loads for the same tenant may both run; the first insert wins
/// and the later result is discarded.
#[derive(Clone)]
pub struct GraphModelCache {
    models: Arc<DashMap<String, Arc<GraphModel>>>,
    max_tenants: usize,
}

impl GraphModelCache {
    pub fn new(max_tenants: usize) -> Self {
        Self {
            models: Arc::new(DashMap::new()),
            max_tenants: max_tenants.max(1),
        }
    }

    pub fn get(&self, group_id: &str) -> Option<Arc<GraphModel>> {
        self.models.get(group_id).map(|r| r.value().clone())
    }

    pub async fn get_or_load<F, Fut>(&self, group_id: &str, load: F) -> Result<Arc<GraphModel>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<GraphModel>>,
    {
        if let Some(model) = self.get(group_id) {
            return Ok(model);
        }

        let loaded = Arc::new(load().await?);
        debug!(
            group_id,
            entities = loaded.entities.len(),
            relationships = loaded.relationships.len(),
            communities = loaded.communities.len(),
            "Loaded graph model"
        );

        if !self.models.contains_key(group_id) && self.models.len() >= self.max_tenants {
            // Simple eviction: clear 25% when full
            let to_remove: Vec<_> = self
                .models
                .iter()
                .take((self.max_tenants / 4).max(1))
                .map(|r| r.key().clone())
                .collect();
            for key in to_remove {
                self.models.remove(&key);
            }
        }

        let entry = self.models.entry(group_id.to_string()).or_insert(loaded);
        Ok(entry.value().clone())
    }

    pub fn invalidate(&self, group_id: &str) {
        self.models.remove(group_id);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            tenants_cached: self.models.len(),
        }
    }
}

/// Text embeddings keyed by SHA-256 of the text.
pub struct EmbeddingCache {
    embeddings: DashMap<String, Vec<f32>>,
    max_entries: usize,
}

impl EmbeddingCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            embeddings: DashMap::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn set(&self, text: &str, embedding: Vec<f32>) {
        if self.embeddings.len() >= self.max_entries {
            let to_remove: Vec<_> = self
                .embeddings
                .iter()
                .take((self.max_entries / 4).max(1))
                .map(|r| r.key().clone())
                .collect();
            for key in to_remove {
                self.embeddings.remove(&key);
            }
        }
        self.embeddings.insert(hash_text(text), embedding);
    }

    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        self.embeddings
            .get(&hash_text(text))
            .map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Serialize)]
pub struct CacheStats {
    pub tenants_cached: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Entity;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn model_with(name: &str) -> GraphModel {
        GraphModel {
            entities: vec![Entity::new(name, name)],
            ..GraphModel::default()
        }
    }

    #[tokio::test]
    async fn test_get_or_load_loads_once() {
        let cache = GraphModelCache::new(8);
        let loads = AtomicUsize::new(0);

        for _ in 0..3 {
            let model = cache
                .get_or_load("tenant-a", || async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, anyhow::Error>(model_with("a"))
                })
                .await
                .unwrap();
            assert_eq!(model.entities[0].name, "a");
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_writer_wins() {
        let cache = GraphModelCache::new(8);
        cache
            .get_or_load("t", || async { Ok::<_, anyhow::Error>(model_with("first")) })
            .await
            .unwrap();

        // A racing loader that already finished loading still sees the first model.
        let entry = cache
            .models
            .entry("t".to_string())
            .or_insert(Arc::new(model_with("second")));
        assert_eq!(entry.value().entities[0].name, "first");
    }

    #[tokio::test]
    async fn test_failed_load_is_not_cached() {
        let cache = GraphModelCache::new(8);
        let result = cache
            .get_or_load("t", || async { Err::<GraphModel, _>(anyhow::anyhow!("store down")) })
            .await;
        assert!(result.is_err());
        assert!(cache.get("t").is_none());
    }

    #[tokio::test]
    async fn test_eviction_and_invalidate() {
        let cache = GraphModelCache::new(2);
        for tenant in ["a", "b", "c"] {
            cache
                .get_or_load(tenant, || async move { Ok::<_, anyhow::Error>(model_with(tenant)) })
                .await
                .unwrap();
        }
        assert!(cache.stats().tenants_cached <= 2);
        assert!(cache.get("c").is_some());

        cache.invalidate("c");
        assert!(cache.get("c").is_none());
    }

    #[test]
    fn test_embedding_cache_roundtrip() {
        let cache = EmbeddingCache::new(4);
        cache.set("hello", vec![1.0, 2.0]);
        assert_eq!(cache.get("hello"), Some(vec![1.0, 2.0]));
        assert_eq!(cache.get("other"), None);
    }
}
