use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::embeddings::cosine_similarity;
use crate::ppr::{self, PprParams};
use crate::schema::{
    name_key, Community, DocumentRef, Entity, GraphModel, KEYWORD_MATCH, Relationship,
    SourceChunk, VECTOR_MATCH,
};
use crate::store::GraphStore;

/// Store operations that can be made to fail, for exercising degraded paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    FindEntities,
    Walk,
    ChunksMentioning,
    CoOccurring,
    KeywordSearch,
    VectorSearch,
    ListDocuments,
    LeadChunk,
    LoadModel,
}

#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub chunk: SourceChunk,
    pub mentions: Vec<String>,
    pub embedding: Option<Vec<f32>>,
}

impl StoredChunk {
    pub fn new(chunk: SourceChunk) -> Self {
        Self {
            chunk,
            mentions: Vec::new(),
            embedding: None,
        }
    }

    pub fn mentioning(mut self, entity_id: impl Into<String>) -> Self {
        self.mentions.push(entity_id.into());
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// Store held entirely in memory. Chunk order is insertion order and doubles
/// as the chunk index within each document.
pub struct InMemoryStore {
    group_id: String,
    model: GraphModel,
    chunks: Vec<StoredChunk>,
    documents: Vec<DocumentRef>,
    failing: HashSet<StoreOperation>,
    failing_documents: HashSet<String>,
    calls: Mutex<HashMap<StoreOperation, usize>>,
}

impl InMemoryStore {
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            model: GraphModel::default(),
            chunks: Vec::new(),
            documents: Vec::new(),
            failing: HashSet::new(),
            failing_documents: HashSet::new(),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.model.entities.push(entity);
        self
    }

    pub fn with_relationship(mut self, source_id: &str, target_id: &str, description: &str) -> Self {
        let name_of = |id: &str| {
            self.model
                .entity_by_id(id)
                .map(|e| e.name.clone())
                .unwrap_or_else(|| id.to_string())
        };
        let relationship = Relationship {
            source_id: source_id.to_string(),
            source: name_of(source_id),
            target_id: target_id.to_string(),
            target: name_of(target_id),
            description: description.to_string(),
        };
        self.model.relationships.push(relationship);
        self
    }

    pub fn with_community(mut self, community: Community) -> Self {
        self.model.communities.push(community);
        self
    }

    pub fn with_document(mut self, document: DocumentRef) -> Self {
        self.documents.push(document);
        self
    }

    /// Adds a chunk, filling its document title/source from a registered document.
    pub fn with_chunk(mut self, mut stored: StoredChunk) -> Self {
        if let Some(doc) = self
            .documents
            .iter()
            .find(|d| d.document_id == stored.chunk.document_id)
        {
            if stored.chunk.document_title.is_empty() {
                stored.chunk.document_title = doc.title.clone();
            }
            if stored.chunk.document_source.is_empty() {
                stored.chunk.document_source = doc.source.clone();
            }
        }
        self.chunks.push(stored);
        self
    }

    pub fn failing_on(mut self, operation: StoreOperation) -> Self {
        self.failing.insert(operation);
        self
    }

    /// Makes lead-chunk lookups fail for one document only.
    pub fn failing_lead_chunk_for(mut self, document_id: impl Into<String>) -> Self {
        self.failing_documents.insert(document_id.into());
        self
    }

    /// Number of calls made for `operation`, successful or not.
    pub fn call_count(&self, operation: StoreOperation) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(&operation).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn enter(&self, operation: StoreOperation) -> Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(operation).or_insert(0) += 1;
        }
        if self.failing.contains(&operation) {
            anyhow::bail!("in-memory store configured to fail on {:?}", operation);
        }
        Ok(())
    }

    fn term_score(text: &str, terms: &[String]) -> f64 {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        terms
            .iter()
            .map(|term| {
                let tf = words.iter().filter(|w| *w == term).count() as f64;
                tf / (tf + 1.2)
            })
            .sum()
    }
}

#[async_trait]
impl GraphStore for InMemoryStore {
    fn group_id(&self) -> &str {
        &self.group_id
    }

    async fn find_entities_by_name_or_alias(&self, names: &[String]) -> Result<Vec<Entity>> {
        self.enter(StoreOperation::FindEntities)?;
        Ok(self.model.find_by_names(names))
    }

    async fn walk_importance(
        &self,
        seed_entity_ids: &[String],
        top_k: usize,
    ) -> Result<Vec<(Entity, f64)>> {
        self.enter(StoreOperation::Walk)?;
        Ok(ppr::personalized_pagerank(
            &self.model,
            seed_entity_ids,
            top_k,
            &PprParams::default(),
        ))
    }

    async fn chunks_mentioning(
        &self,
        entity_ids: &[String],
        max_per_entity: usize,
    ) -> Result<Vec<SourceChunk>> {
        self.enter(StoreOperation::ChunksMentioning)?;
        let mut out = Vec::new();
        for entity_id in entity_ids {
            let Some(entity) = self.model.entity_by_id(entity_id) else {
                continue;
            };
            let matches = self
                .chunks
                .iter()
                .filter(|c| c.mentions.iter().any(|m| m == entity_id))
                .take(max_per_entity)
                .map(|c| c.chunk.clone().with_provenance(entity.name.clone()));
            out.extend(matches);
        }
        Ok(out)
    }

    async fn co_occurring_entities(
        &self,
        entity_ids: &[String],
        max_results: usize,
    ) -> Result<Vec<Relationship>> {
        self.enter(StoreOperation::CoOccurring)?;
        Ok(self
            .model
            .relationships
            .iter()
            .filter(|r| {
                entity_ids.contains(&r.source_id) || entity_ids.contains(&r.target_id)
            })
            .take(max_results)
            .cloned()
            .collect())
    }

    async fn keyword_search(&self, text: &str, top_k: usize) -> Result<Vec<(SourceChunk, f64)>> {
        self.enter(StoreOperation::KeywordSearch)?;
        let terms: Vec<String> = name_key(text)
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2)
            .map(str::to_string)
            .collect();

        let mut scored: Vec<(SourceChunk, f64)> = self
            .chunks
            .iter()
            .map(|c| (c, Self::term_score(&c.chunk.text, &terms)))
            .filter(|(_, score)| *score > 0.0)
            .map(|(c, score)| (c.chunk.clone().with_provenance(KEYWORD_MATCH), score))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn vector_search(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<(SourceChunk, f64)>> {
        self.enter(StoreOperation::VectorSearch)?;
        let mut scored: Vec<(SourceChunk, f64)> = self
            .chunks
            .iter()
            .filter_map(|c| {
                let stored = c.embedding.as_ref()?;
                let score = cosine_similarity(embedding, stored) as f64;
                (score > 0.0).then(|| (c.chunk.clone().with_provenance(VECTOR_MATCH), score))
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn list_all_documents(&self) -> Result<Vec<DocumentRef>> {
        self.enter(StoreOperation::ListDocuments)?;
        Ok(self.documents.clone())
    }

    async fn lead_chunk_for_document(
        &self,
        document_id: &str,
        query_embedding: Option<&[f32]>,
    ) -> Result<Option<SourceChunk>> {
        self.enter(StoreOperation::LeadChunk)?;
        if self.failing_documents.contains(document_id) {
            anyhow::bail!("in-memory store configured to fail on lead chunk of {}", document_id);
        }
        let in_document: Vec<&StoredChunk> = self
            .chunks
            .iter()
            .filter(|c| c.chunk.document_id == document_id)
            .collect();

        // Ties keep the earliest chunk.
        if let Some(query) = query_embedding {
            let mut best: Option<(&StoredChunk, f32)> = None;
            for chunk in &in_document {
                let Some(embedding) = chunk.embedding.as_ref() else {
                    continue;
                };
                let score = cosine_similarity(query, embedding);
                if best.is_none_or(|(_, top)| score > top) {
                    best = Some((*chunk, score));
                }
            }
            if let Some((chunk, _)) = best {
                return Ok(Some(chunk.chunk.clone()));
            }
        }

        Ok(in_document.first().map(|c| c.chunk.clone()))
    }

    async fn load_graph_model(&self) -> Result<GraphModel> {
        self.enter(StoreOperation::LoadModel)?;
        Ok(self.model.clone())
    }
}
