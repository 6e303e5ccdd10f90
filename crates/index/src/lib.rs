pub mod cache;
pub mod embeddings;
pub mod memory_store;
pub mod neo4j_store;
pub mod ppr;
pub mod schema;
pub mod store;

pub use cache::{CacheStats, EmbeddingCache, GraphModelCache};
pub use embeddings::{cosine_similarity, CachedEmbeddings, EmbeddingClient, OllamaEmbeddings};
pub use memory_store::{InMemoryStore, StoreOperation, StoredChunk};
pub use neo4j_store::Neo4jStore;
pub use ppr::{personalized_pagerank, PprParams};
pub use schema::{
    name_key, Community, DocumentRef, Entity, GraphModel, Relationship, SourceChunk,
    COVERAGE_FILL, HYBRID_MATCH, KEYWORD_MATCH, VECTOR_MATCH,
};
pub use store::GraphStore;
