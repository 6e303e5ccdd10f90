use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use index::{name_key, Community, GraphModel};

/// Chunk identifiers that leaked into the entity table during extraction.
static CHUNK_ARTIFACT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^doc_[a-z0-9]+_chunk_\d+$").expect("chunk artifact pattern is valid")
});

pub fn is_chunk_artifact(name: &str) -> bool {
    CHUNK_ARTIFACT.is_match(name.trim())
}

/// Most-connected member entities of each community, in community order.
///
/// Members are ranked by relationship degree (ties by name), chunk-id
/// artifacts are discarded, and names already taken by an earlier community
/// are skipped.
pub fn extract_hub_entities(
    model: &GraphModel,
    communities: &[Community],
    top_k_per_community: usize,
) -> Vec<String> {
    let degree = model.degree_by_id();
    let mut seen = HashSet::new();
    let mut hubs = Vec::new();

    for community in communities {
        let mut members: Vec<(&str, usize)> = community
            .member_entity_ids
            .iter()
            .filter_map(|id| model.entity_by_id(id))
            .filter(|entity| !is_chunk_artifact(&entity.name))
            .map(|entity| {
                (
                    entity.name.as_str(),
                    degree.get(&entity.graph_id).copied().unwrap_or(0),
                )
            })
            .collect();

        members.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let mut taken = 0;
        for (name, _) in members {
            if taken >= top_k_per_community {
                break;
            }
            if seen.insert(name_key(name)) {
                hubs.push(name.to_string());
                taken += 1;
            }
        }
    }

    hubs
}

#[cfg(test)]
mod tests {
    use super::*;
    use index::{Entity, Relationship};

    fn rel(a: &str, b: &str) -> Relationship {
        Relationship {
            source_id: a.into(),
            source: a.into(),
            target_id: b.into(),
            target: b.into(),
            description: String::new(),
        }
    }

    fn community(id: &str, members: &[&str]) -> Community {
        Community {
            id: id.into(),
            title: id.into(),
            summary: String::new(),
            member_entity_ids: members.iter().map(|m| m.to_string()).collect(),
            embedding: None,
        }
    }

    #[test]
    fn test_chunk_artifact_shape() {
        assert!(is_chunk_artifact("doc_3f9a1c_chunk_12"));
        assert!(is_chunk_artifact("DOC_ABC123_CHUNK_0"));
        assert!(!is_chunk_artifact("Acme Corp"));
        assert!(!is_chunk_artifact("doc_chunk"));
    }

    #[test]
    fn test_hubs_ranked_by_degree_and_filtered() {
        let model = GraphModel {
            entities: vec![
                Entity::new("a", "Acme"),
                Entity::new("b", "Beta"),
                Entity::new("c", "Gamma"),
                Entity::new("x", "doc_ff00_chunk_3"),
            ],
            relationships: vec![rel("a", "b"), rel("a", "c"), rel("x", "a"), rel("x", "b"), rel("x", "c")],
            communities: Vec::new(),
        };
        let communities = vec![community("1", &["a", "b", "c", "x"]), community("2", &["a", "c"])];

        let hubs = extract_hub_entities(&model, &communities, 2);

        // "x" has the highest degree but is an artifact; community 2 repeats Acme.
        assert_eq!(hubs, vec!["Acme", "Beta", "Gamma"]);
    }
}
