use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Provenance tag for chunks that came from the full-text index.
pub const KEYWORD_MATCH: &str = "keyword-match";
/// Provenance tag for chunks that came from the vector index.
pub const VECTOR_MATCH: &str = "vector-match";
/// Provenance tag for chunks that came from keyword+vector fusion.
pub const HYBRID_MATCH: &str = "hybrid-match";
/// Provenance tag for lead chunks appended by the coverage pass.
pub const COVERAGE_FILL: &str = "coverage-fill";

/// Case-insensitive, whitespace-collapsed key used for every name comparison.
pub fn name_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub graph_id: String,
    pub name: String,
    #[serde(default)]
    pub aliases: BTreeSet<String>,
}

impl Entity {
    pub fn new(graph_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            graph_id: graph_id.into(),
            name: name.into(),
            aliases: BTreeSet::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.insert(alias.into());
        self
    }

    /// True when `name` equals the display name or any alias, ignoring case.
    pub fn matches(&self, name: &str) -> bool {
        let key = name_key(name);
        name_key(&self.name) == key || self.aliases.iter().any(|a| name_key(a) == key)
    }
}

/// A text chunk as read from the store, with full document/section provenance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceChunk {
    pub chunk_id: String,
    pub text: String,
    /// Which retrieval path produced the chunk: an entity name or one of the
    /// synthetic tags in this module.
    pub entity_name: String,
    #[serde(default)]
    pub section_path: Vec<String>,
    pub section_id: Option<String>,
    pub document_id: String,
    #[serde(default)]
    pub document_title: String,
    #[serde(default)]
    pub document_source: String,
    pub relevance_score: f64,
    pub page_number: Option<u32>,
    pub start_offset: Option<usize>,
    pub end_offset: Option<usize>,
}

impl SourceChunk {
    pub fn new(
        chunk_id: impl Into<String>,
        document_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            text: text.into(),
            entity_name: String::new(),
            section_path: Vec::new(),
            section_id: None,
            document_id: document_id.into(),
            document_title: String::new(),
            document_source: String::new(),
            relevance_score: 0.0,
            page_number: None,
            start_offset: None,
            end_offset: None,
        }
    }

    pub fn with_provenance(mut self, tag: impl Into<String>) -> Self {
        self.entity_name = tag.into();
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.relevance_score = score;
        self
    }

    pub fn with_section(mut self, section_id: impl Into<String>, path: Vec<String>) -> Self {
        self.section_id = Some(section_id.into());
        self.section_path = path;
        self
    }

    pub fn with_document_title(mut self, title: impl Into<String>) -> Self {
        self.document_title = title.into();
        self
    }

    pub fn with_offsets(mut self, start: usize, end: usize) -> Self {
        self.start_offset = Some(start);
        self.end_offset = Some(end);
        self
    }

    /// Section identity used for diversification. Chunks without a section
    /// are grouped per document.
    pub fn section_key(&self) -> String {
        match &self.section_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => format!("{}::<root>", self.document_id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentRef {
    pub document_id: String,
    pub title: String,
    pub source: String,
}

impl DocumentRef {
    pub fn new(document_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            title: title.into(),
            source: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Community {
    pub id: String,
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub member_entity_ids: BTreeSet<String>,
    /// Pre-computed summary embedding, when the indexer stored one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relationship {
    pub source_id: String,
    pub source: String,
    pub target_id: String,
    pub target: String,
    #[serde(default)]
    pub description: String,
}

/// Graph-derived reference data for one tenant, loaded once and cached.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphModel {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub communities: Vec<Community>,
}

impl GraphModel {
    /// Relationship degree per entity id (undirected, self-loops ignored).
    pub fn degree_by_id(&self) -> HashMap<String, usize> {
        let mut degree: HashMap<String, usize> = HashMap::new();
        for rel in &self.relationships {
            if rel.source_id == rel.target_id {
                continue;
            }
            *degree.entry(rel.source_id.clone()).or_insert(0) += 1;
            *degree.entry(rel.target_id.clone()).or_insert(0) += 1;
        }
        degree
    }

    pub fn entity_by_id(&self, graph_id: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.graph_id == graph_id)
    }

    pub fn find_by_names(&self, names: &[String]) -> Vec<Entity> {
        self.entities
            .iter()
            .filter(|e| names.iter().any(|n| e.matches(n)))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_matches_name_or_alias_case_insensitively() {
        let entity = Entity::new("e1", "Acme Corp").with_alias("ACME Corporation");

        assert!(entity.matches("acme corp"));
        assert!(entity.matches("  Acme   Corp "));
        assert!(entity.matches("acme corporation"));
        assert!(!entity.matches("Acme"));
    }

    #[test]
    fn test_section_key_falls_back_to_document() {
        let chunk = SourceChunk::new("c1", "doc-1", "text");
        assert_eq!(chunk.section_key(), "doc-1::<root>");

        let chunk = chunk.with_section("s1", vec!["Intro".to_string()]);
        assert_eq!(chunk.section_key(), "s1");
    }

    #[test]
    fn test_degree_ignores_self_loops() {
        let model = GraphModel {
            entities: vec![Entity::new("a", "A"), Entity::new("b", "B")],
            relationships: vec![
                Relationship {
                    source_id: "a".into(),
                    source: "A".into(),
                    target_id: "b".into(),
                    target: "B".into(),
                    description: String::new(),
                },
                Relationship {
                    source_id: "a".into(),
                    source: "A".into(),
                    target_id: "a".into(),
                    target: "A".into(),
                    description: String::new(),
                },
            ],
            communities: Vec::new(),
        };

        let degree = model.degree_by_id();
        assert_eq!(degree.get("a"), Some(&1));
        assert_eq!(degree.get("b"), Some(&1));
    }
}
