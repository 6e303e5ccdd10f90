use anyhow::Result;
use async_trait::async_trait;

use crate::schema::{DocumentRef, Entity, GraphModel, Relationship, SourceChunk};

/// Read-only view of one tenant's property graph and its text indexes.
///
/// Every adapter is bound to a single tenant (`group_id`) at construction;
/// callers never pass tenant ids per call.
#[async_trait]
pub trait GraphStore: Send + Sync {
    fn group_id(&self) -> &str;

    /// Entities whose name or any alias matches one of `names`, ignoring case.
    async fn find_entities_by_name_or_alias(&self, names: &[String]) -> Result<Vec<Entity>>;

    /// Personalized importance walk seeded uniformly on `seed_entity_ids`.
    /// Scores are normalised so the best entity scores `1.0`.
    async fn walk_importance(
        &self,
        seed_entity_ids: &[String],
        top_k: usize,
    ) -> Result<Vec<(Entity, f64)>>;

    /// Chunks linked to each entity by a mentions edge, at most
    /// `max_per_entity` per entity, tagged with the mentioned entity's name.
    async fn chunks_mentioning(
        &self,
        entity_ids: &[String],
        max_per_entity: usize,
    ) -> Result<Vec<SourceChunk>>;

    async fn co_occurring_entities(
        &self,
        entity_ids: &[String],
        max_results: usize,
    ) -> Result<Vec<Relationship>>;

    async fn keyword_search(&self, text: &str, top_k: usize) -> Result<Vec<(SourceChunk, f64)>>;

    async fn vector_search(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<(SourceChunk, f64)>>;

    async fn list_all_documents(&self) -> Result<Vec<DocumentRef>>;

    /// Representative chunk for a document: the most similar chunk to
    /// `query_embedding` when given, otherwise the earliest chunk.
    async fn lead_chunk_for_document(
        &self,
        document_id: &str,
        query_embedding: Option<&[f32]>,
    ) -> Result<Option<SourceChunk>>;

    /// Entities, relationships and communities for the tenant.
    async fn load_graph_model(&self) -> Result<GraphModel>;
}
