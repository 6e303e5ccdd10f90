use petgraph::graph::{NodeIndex, UnGraph};
use std::collections::HashMap;

use crate::schema::{Entity, GraphModel};

#[derive(Debug, Clone, Copy)]
pub struct PprParams {
    pub damping: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for PprParams {
    fn default() -> Self {
        Self {
            damping: 0.85,
            max_iterations: 50,
            tolerance: 1e-6,
        }
    }
}

/// Personalized PageRank over the undirected entity-relationship graph.
///
/// Teleport mass is spread uniformly over the seeds; mass on nodes with no
/// edges returns to the seeds. Results are sorted by score descending, ties
/// broken by seed order and then by model order, and normalised so the top
/// entity scores `1.0`.
pub fn personalized_pagerank(
    model: &GraphModel,
    seed_ids: &[String],
    top_k: usize,
    params: &PprParams,
) -> Vec<(Entity, f64)> {
    let mut graph: UnGraph<usize, ()> = UnGraph::new_undirected();
    let mut index_of: HashMap<&str, NodeIndex> = HashMap::new();

    for (i, entity) in model.entities.iter().enumerate() {
        if index_of.contains_key(entity.graph_id.as_str()) {
            continue;
        }
        let node = graph.add_node(i);
        index_of.insert(entity.graph_id.as_str(), node);
    }

    for rel in &model.relationships {
        let source = index_of.get(rel.source_id.as_str());
        let target = index_of.get(rel.target_id.as_str());
        if let (Some(&a), Some(&b)) = (source, target) {
            if a != b {
                graph.add_edge(a, b, ());
            }
        }
    }

    let mut seeds: Vec<NodeIndex> = Vec::new();
    for id in seed_ids {
        if let Some(&node) = index_of.get(id.as_str()) {
            if !seeds.contains(&node) {
                seeds.push(node);
            }
        }
    }

    if seeds.is_empty() || top_k == 0 {
        return Vec::new();
    }

    let n = graph.node_count();
    let mut teleport = vec![0.0; n];
    let share = 1.0 / seeds.len() as f64;
    for seed in &seeds {
        teleport[seed.index()] = share;
    }

    let mut rank = teleport.clone();
    for _ in 0..params.max_iterations {
        let mut next = vec![0.0; n];
        let mut dangling = 0.0;

        for node in graph.node_indices() {
            let mass = rank[node.index()];
            let degree = graph.neighbors(node).count();
            if degree == 0 {
                dangling += mass;
                continue;
            }
            let spread = params.damping * mass / degree as f64;
            for neighbor in graph.neighbors(node) {
                next[neighbor.index()] += spread;
            }
        }

        let restart = (1.0 - params.damping) + params.damping * dangling;
        for (value, t) in next.iter_mut().zip(&teleport) {
            *value += restart * t;
        }

        let delta: f64 = next.iter().zip(&rank).map(|(a, b)| (a - b).abs()).sum();
        rank = next;
        if delta < params.tolerance {
            break;
        }
    }

    let order_key = |node: NodeIndex| -> usize {
        seeds
            .iter()
            .position(|s| *s == node)
            .unwrap_or(seeds.len() + node.index())
    };

    let mut scored: Vec<(NodeIndex, f64)> = graph
        .node_indices()
        .map(|node| (node, rank[node.index()]))
        .filter(|(_, score)| *score > 0.0)
        .collect();
    scored.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then_with(|| order_key(a.0).cmp(&order_key(b.0)))
    });
    scored.truncate(top_k);

    let max = scored.first().map(|(_, s)| *s).unwrap_or(1.0);
    scored
        .into_iter()
        .map(|(node, score)| (model.entities[graph[node]].clone(), score / max))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Relationship;

    fn rel(a: &str, b: &str) -> Relationship {
        Relationship {
            source_id: a.to_string(),
            source: a.to_uppercase(),
            target_id: b.to_string(),
            target: b.to_uppercase(),
            description: String::new(),
        }
    }

    fn model(ids: &[&str], edges: &[(&str, &str)]) -> GraphModel {
        GraphModel {
            entities: ids.iter().map(|id| Entity::new(*id, id.to_uppercase())).collect(),
            relationships: edges.iter().map(|(a, b)| rel(a, b)).collect(),
            communities: Vec::new(),
        }
    }

    #[test]
    fn test_isolated_seed_scores_one() {
        let model = model(&["acme"], &[]);
        let result = personalized_pagerank(&model, &["acme".to_string()], 10, &PprParams::default());

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].0.name, "ACME");
        assert!((result[0].1 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_seed_outranks_neighbors_and_reaches_them() {
        let model = model(&["a", "b", "c", "d"], &[("a", "b"), ("b", "c")]);
        let result = personalized_pagerank(&model, &["a".to_string()], 10, &PprParams::default());

        let names: Vec<&str> = result.iter().map(|(e, _)| e.name.as_str()).collect();
        assert!(names.contains(&"B"));
        assert!(names.contains(&"C"));
        // unreachable nodes get no mass
        assert!(!names.contains(&"D"));
        assert!(result.iter().all(|(_, s)| *s <= 1.0 && *s > 0.0));
    }

    #[test]
    fn test_ties_follow_seed_order() {
        let model = model(&["x", "y"], &[]);
        let seeds = vec!["y".to_string(), "x".to_string()];
        let result = personalized_pagerank(&model, &seeds, 10, &PprParams::default());

        assert_eq!(result[0].0.graph_id, "y");
        assert_eq!(result[1].0.graph_id, "x");
    }

    #[test]
    fn test_unknown_seeds_yield_nothing() {
        let model = model(&["a"], &[]);
        let result = personalized_pagerank(&model, &["zzz".to_string()], 5, &PprParams::default());
        assert!(result.is_empty());
    }
}
