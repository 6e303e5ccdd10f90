use anyhow::{Context, Result};
use async_trait::async_trait;
use neo4rs::{Graph, Query, Row};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::GraphModelCache;
use crate::ppr::{self, PprParams};
use crate::schema::{
    name_key, Community, DocumentRef, Entity, GraphModel, KEYWORD_MATCH, Relationship,
    SourceChunk, VECTOR_MATCH,
};
use crate::store::GraphStore;

/// Shared projection for every query that yields chunks. Expects `c` bound to
/// a `:TextChunk` and `provenance` bound to a string.
const CHUNK_PROJECTION: &str = r#"
    OPTIONAL MATCH (c)-[:IN_SECTION]->(s:Section)
    OPTIONAL MATCH (c)-[:IN_DOCUMENT]->(d:Document)
    RETURN c.id AS chunk_id,
           coalesce(c.text, '') AS text,
           provenance,
           s.id AS section_id,
           coalesce(s.path, []) AS section_path,
           coalesce(d.id, '') AS document_id,
           coalesce(d.title, '') AS document_title,
           coalesce(d.source, '') AS document_source,
           c.page_number AS page_number,
           c.start_offset AS start_offset,
           c.end_offset AS end_offset,
           score
"#;

/// Cypher expression computing [`name_key`] of `expr`: lowercased, with
/// whitespace runs collapsed to single spaces.
fn cypher_name_key(expr: &str) -> String {
    format!(
        "reduce(k = '', w IN [t IN split(replace(replace(replace(toLower({expr}), '\\t', ' '), '\\n', ' '), '\\r', ' '), ' ') WHERE t <> ''] | k + CASE WHEN k = '' THEN '' ELSE ' ' END + w)"
    )
}

/// Neo4j-backed store for one tenant.
///
/// Expected schema: `(:TextChunk)-[:MENTIONS]->(:Entity)`,
/// `(:TextChunk)-[:IN_SECTION]->(:Section)`, `(:TextChunk)-[:IN_DOCUMENT]->(:Document)`,
/// `(:Entity)-[:RELATED_TO]->(:Entity)`, `(:Entity)-[:BELONGS_TO]->(:Community)`,
/// every node carrying `group_id`. Keyword search uses a full-text index and
/// vector search a vector index over `TextChunk.embedding`.
#[derive(Clone)]
pub struct Neo4jStore {
    graph: Graph,
    group_id: String,
    cache: Option<GraphModelCache>,
    fulltext_index: String,
    vector_index: String,
    ppr: PprParams,
}

impl Neo4jStore {
    pub fn new(graph: Graph, group_id: impl Into<String>) -> Self {
        Self {
            graph,
            group_id: group_id.into(),
            cache: None,
            fulltext_index: "textchunk_fulltext".to_string(),
            vector_index: "chunk_embedding".to_string(),
            ppr: PprParams::default(),
        }
    }

    pub fn with_cache(mut self, cache: GraphModelCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_indexes(mut self, fulltext_index: String, vector_index: String) -> Self {
        self.fulltext_index = fulltext_index;
        self.vector_index = vector_index;
        self
    }

    async fn graph_model(&self) -> Result<Arc<GraphModel>> {
        match &self.cache {
            Some(cache) => {
                cache
                    .get_or_load(&self.group_id, || self.fetch_graph_model())
                    .await
            }
            None => Ok(Arc::new(self.fetch_graph_model().await?)),
        }
    }

    async fn fetch_graph_model(&self) -> Result<GraphModel> {
        let entities = self.fetch_entities().await?;
        let relationships = self.fetch_relationships().await?;
        let communities = self.fetch_communities().await?;
        Ok(GraphModel {
            entities,
            relationships,
            communities,
        })
    }

    async fn fetch_entities(&self) -> Result<Vec<Entity>> {
        let query = Query::new(
            r#"
            MATCH (e:Entity {group_id: $group_id})
            RETURN e.id AS id, e.name AS name, coalesce(e.aliases, []) AS aliases
            ORDER BY e.id
            "#
            .to_string(),
        )
        .param("group_id", self.group_id.clone());

        self.collect_entities(query).await
    }

    async fn fetch_relationships(&self) -> Result<Vec<Relationship>> {
        let query = Query::new(
            r#"
            MATCH (a:Entity {group_id: $group_id})-[r:RELATED_TO]->(b:Entity {group_id: $group_id})
            RETURN a.id AS source_id, a.name AS source, b.id AS target_id, b.name AS target,
                   coalesce(r.description, '') AS description
            "#
            .to_string(),
        )
        .param("group_id", self.group_id.clone());

        self.collect_relationships(query).await
    }

    async fn fetch_communities(&self) -> Result<Vec<Community>> {
        let query = Query::new(
            r#"
            MATCH (c:Community {group_id: $group_id})
            OPTIONAL MATCH (e:Entity)-[:BELONGS_TO]->(c)
            RETURN c.id AS id, coalesce(c.title, '') AS title, coalesce(c.summary, '') AS summary,
                   c.embedding AS embedding, collect(e.id) AS member_ids
            ORDER BY c.id
            "#
            .to_string(),
        )
        .param("group_id", self.group_id.clone());

        let mut result = self
            .graph
            .execute(query)
            .await
            .context("Failed to load communities")?;

        let mut communities = Vec::new();
        while let Some(row) = result.next().await? {
            let embedding = row.get::<Option<Vec<f64>>>("embedding").ok().flatten();
            let member_ids: Vec<String> = row.get("member_ids").unwrap_or_default();
            communities.push(Community {
                id: row.get("id")?,
                title: row.get("title").unwrap_or_default(),
                summary: row.get("summary").unwrap_or_default(),
                member_entity_ids: member_ids.into_iter().collect(),
                embedding: embedding.map(|v| v.into_iter().map(|x| x as f32).collect()),
            });
        }

        Ok(communities)
    }

    async fn collect_entities(&self, query: Query) -> Result<Vec<Entity>> {
        let mut result = self
            .graph
            .execute(query)
            .await
            .context("Failed to query entities")?;

        let mut entities = Vec::new();
        while let Some(row) = result.next().await? {
            let aliases: Vec<String> = row.get("aliases").unwrap_or_default();
            entities.push(Entity {
                graph_id: row.get("id")?,
                name: row.get("name")?,
                aliases: aliases.into_iter().collect::<BTreeSet<_>>(),
            });
        }
        Ok(entities)
    }

    async fn collect_relationships(&self, query: Query) -> Result<Vec<Relationship>> {
        let mut result = self
            .graph
            .execute(query)
            .await
            .context("Failed to query relationships")?;

        let mut relationships = Vec::new();
        while let Some(row) = result.next().await? {
            relationships.push(Relationship {
                source_id: row.get("source_id")?,
                source: row.get("source")?,
                target_id: row.get("target_id")?,
                target: row.get("target")?,
                description: row.get("description").unwrap_or_default(),
            });
        }
        Ok(relationships)
    }

    async fn collect_chunks(&self, query: Query) -> Result<Vec<(SourceChunk, f64)>> {
        let mut result = self
            .graph
            .execute(query)
            .await
            .context("Failed to query chunks")?;

        let mut chunks = Vec::new();
        while let Some(row) = result.next().await? {
            let score: f64 = row.get::<Option<f64>>("score").ok().flatten().unwrap_or(0.0);
            chunks.push((chunk_from_row(&row)?, score));
        }
        Ok(chunks)
    }
}

fn chunk_from_row(row: &Row) -> Result<SourceChunk> {
    let optional_int = |key: &str| -> Option<i64> { row.get::<Option<i64>>(key).ok().flatten() };

    Ok(SourceChunk {
        chunk_id: row.get("chunk_id").context("Missing chunk_id")?,
        text: row.get("text").unwrap_or_default(),
        entity_name: row.get("provenance").unwrap_or_default(),
        section_path: row.get("section_path").unwrap_or_default(),
        section_id: row.get::<Option<String>>("section_id").ok().flatten(),
        document_id: row.get("document_id").unwrap_or_default(),
        document_title: row.get("document_title").unwrap_or_default(),
        document_source: row.get("document_source").unwrap_or_default(),
        relevance_score: 0.0,
        page_number: optional_int("page_number").and_then(|v| u32::try_from(v).ok()),
        start_offset: optional_int("start_offset").and_then(|v| usize::try_from(v).ok()),
        end_offset: optional_int("end_offset").and_then(|v| usize::try_from(v).ok()),
    })
}

/// Escape Lucene query syntax so free text never breaks the full-text call.
fn escape_lucene(text: &str) -> String {
    const SPECIAL: &[char] = &[
        '+', '-', '&', '|', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?', ':', '\\',
        '/',
    ];
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if SPECIAL.contains(&ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[async_trait]
impl GraphStore for Neo4jStore {
    fn group_id(&self) -> &str {
        &self.group_id
    }

    async fn find_entities_by_name_or_alias(&self, names: &[String]) -> Result<Vec<Entity>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = names.iter().map(|n| name_key(n)).collect();

        let cypher = format!(
            r#"
            MATCH (e:Entity {{group_id: $group_id}})
            WHERE {name} IN $names
               OR any(a IN coalesce(e.aliases, []) WHERE {alias} IN $names)
            RETURN e.id AS id, e.name AS name, coalesce(e.aliases, []) AS aliases
            "#,
            name = cypher_name_key("e.name"),
            alias = cypher_name_key("a"),
        );
        let query = Query::new(cypher)
        .param("group_id", self.group_id.clone())
        .param("names", keys);

        self.collect_entities(query).await
    }

    async fn walk_importance(
        &self,
        seed_entity_ids: &[String],
        top_k: usize,
    ) -> Result<Vec<(Entity, f64)>> {
        let model = self.graph_model().await?;
        Ok(ppr::personalized_pagerank(&model, seed_entity_ids, top_k, &self.ppr))
    }

    async fn chunks_mentioning(
        &self,
        entity_ids: &[String],
        max_per_entity: usize,
    ) -> Result<Vec<SourceChunk>> {
        if entity_ids.is_empty() || max_per_entity == 0 {
            return Ok(Vec::new());
        }

        let cypher = format!(
            r#"
            WITH $entity_ids AS ids
            UNWIND range(0, size(ids) - 1) AS position
            WITH ids[position] AS entity_id, position
            MATCH (e:Entity {{id: entity_id, group_id: $group_id}})<-[:MENTIONS]-(c:TextChunk)
            WITH position, e, c ORDER BY position, coalesce(c.chunk_index, 0)
            WITH position, e, collect(c)[..$max_per_entity] AS chunks
            UNWIND chunks AS c
            WITH c, e.name AS provenance, null AS score, position
            ORDER BY position
            {CHUNK_PROJECTION}
            "#
        );

        let query = Query::new(cypher)
            .param("group_id", self.group_id.clone())
            .param("entity_ids", entity_ids.to_vec())
            .param("max_per_entity", max_per_entity as i64);

        let chunks = self.collect_chunks(query).await?;
        debug!(
            entities = entity_ids.len(),
            chunks = chunks.len(),
            "Fetched mentioning chunks"
        );
        Ok(chunks.into_iter().map(|(chunk, _)| chunk).collect())
    }

    async fn co_occurring_entities(
        &self,
        entity_ids: &[String],
        max_results: usize,
    ) -> Result<Vec<Relationship>> {
        if entity_ids.is_empty() || max_results == 0 {
            return Ok(Vec::new());
        }

        let query = Query::new(
            r#"
            MATCH (a:Entity {group_id: $group_id})-[r:RELATED_TO]-(b:Entity {group_id: $group_id})
            WHERE a.id IN $entity_ids
            RETURN DISTINCT a.id AS source_id, a.name AS source, b.id AS target_id, b.name AS target,
                   coalesce(r.description, '') AS description
            LIMIT $max_results
            "#
            .to_string(),
        )
        .param("group_id", self.group_id.clone())
        .param("entity_ids", entity_ids.to_vec())
        .param("max_results", max_results as i64);

        self.collect_relationships(query).await
    }

    async fn keyword_search(&self, text: &str, top_k: usize) -> Result<Vec<(SourceChunk, f64)>> {
        let escaped = escape_lucene(text.trim());
        if escaped.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let cypher = format!(
            r#"
            CALL db.index.fulltext.queryNodes($index_name, $text) YIELD node, score
            WITH node AS c, score
            WHERE c.group_id = $group_id
            WITH c, score, $provenance AS provenance
            ORDER BY score DESC
            LIMIT $top_k
            {CHUNK_PROJECTION}
            "#
        );

        let query = Query::new(cypher)
            .param("index_name", self.fulltext_index.clone())
            .param("text", escaped)
            .param("group_id", self.group_id.clone())
            .param("provenance", KEYWORD_MATCH.to_string())
            .param("top_k", top_k as i64);

        self.collect_chunks(query).await
    }

    async fn vector_search(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<(SourceChunk, f64)>> {
        if embedding.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let cypher = format!(
            r#"
            CALL db.index.vector.queryNodes($index_name, $candidates, $embedding) YIELD node, score
            WITH node AS c, score
            WHERE c.group_id = $group_id
            WITH c, score, $provenance AS provenance
            ORDER BY score DESC
            LIMIT $top_k
            {CHUNK_PROJECTION}
            "#
        );

        let vector: Vec<f64> = embedding.iter().map(|x| *x as f64).collect();
        // Over-fetch so the tenant filter still leaves top_k candidates.
        let candidates = (top_k * 4) as i64;

        let query = Query::new(cypher)
            .param("index_name", self.vector_index.clone())
            .param("candidates", candidates)
            .param("embedding", vector)
            .param("group_id", self.group_id.clone())
            .param("provenance", VECTOR_MATCH.to_string())
            .param("top_k", top_k as i64);

        self.collect_chunks(query).await
    }

    async fn list_all_documents(&self) -> Result<Vec<DocumentRef>> {
        let query = Query::new(
            r#"
            MATCH (d:Document {group_id: $group_id})
            RETURN d.id AS id, coalesce(d.title, '') AS title, coalesce(d.source, '') AS source
            ORDER BY d.id
            "#
            .to_string(),
        )
        .param("group_id", self.group_id.clone());

        let mut result = self
            .graph
            .execute(query)
            .await
            .context("Failed to list documents")?;

        let mut documents = Vec::new();
        while let Some(row) = result.next().await? {
            documents.push(DocumentRef {
                document_id: row.get("id")?,
                title: row.get("title").unwrap_or_default(),
                source: row.get("source").unwrap_or_default(),
            });
        }
        Ok(documents)
    }

    async fn lead_chunk_for_document(
        &self,
        document_id: &str,
        query_embedding: Option<&[f32]>,
    ) -> Result<Option<SourceChunk>> {
        if let Some(embedding) = query_embedding {
            let cypher = format!(
                r#"
                MATCH (c:TextChunk)-[:IN_DOCUMENT]->(:Document {{id: $document_id, group_id: $group_id}})
                WHERE c.embedding IS NOT NULL
                WITH c, vector.similarity.cosine(c.embedding, $embedding) AS score, '' AS provenance
                ORDER BY score DESC
                LIMIT 1
                {CHUNK_PROJECTION}
                "#
            );
            let vector: Vec<f64> = embedding.iter().map(|x| *x as f64).collect();
            let query = Query::new(cypher)
                .param("document_id", document_id.to_string())
                .param("group_id", self.group_id.clone())
                .param("embedding", vector);

            match self.collect_chunks(query).await {
                Ok(mut chunks) if !chunks.is_empty() => return Ok(Some(chunks.remove(0).0)),
                Ok(_) => {}
                Err(e) => warn!(
                    document_id,
                    error = %e,
                    "Similarity lead-chunk lookup failed, using earliest chunk"
                ),
            }
        }

        let cypher = format!(
            r#"
            MATCH (c:TextChunk)-[:IN_DOCUMENT]->(:Document {{id: $document_id, group_id: $group_id}})
            WITH c, null AS score, '' AS provenance
            ORDER BY coalesce(c.chunk_index, 0) ASC
            LIMIT 1
            {CHUNK_PROJECTION}
            "#
        );
        let query = Query::new(cypher)
            .param("document_id", document_id.to_string())
            .param("group_id", self.group_id.clone());

        let mut chunks = self.collect_chunks(query).await?;
        Ok(if chunks.is_empty() {
            None
        } else {
            Some(chunks.remove(0).0)
        })
    }

    async fn load_graph_model(&self) -> Result<GraphModel> {
        Ok(self.graph_model().await?.as_ref().clone())
    }
}
