use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::model::EvidenceNode;
use index::{name_key, Entity, GraphStore};

/// Evidence nodes for one trace, plus whether the walk had to be skipped.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    pub nodes: Vec<EvidenceNode>,
    pub walk_degraded: bool,
}

/// Expands seed names into scored evidence by walking the entity graph.
#[derive(Clone)]
pub struct GraphEvidenceTracer {
    store: Arc<dyn GraphStore>,
    walk_enabled: bool,
}

impl GraphEvidenceTracer {
    pub fn new(store: Arc<dyn GraphStore>, walk_enabled: bool) -> Self {
        Self {
            store,
            walk_enabled,
        }
    }

    /// Walk mode returns the `top_k` most important entities near the seeds.
    /// When walking is disabled or the store fails, every seed is echoed back
    /// with score `1.0`. Names are unique in the result.
    pub async fn trace(&self, query: &str, seeds: &[String], top_k: usize) -> Trace {
        let seeds = dedupe_names(seeds.iter().map(String::as_str));
        if seeds.is_empty() || top_k == 0 {
            return Trace::default();
        }

        if !self.walk_enabled {
            return Trace {
                nodes: seed_echo(&seeds, top_k),
                walk_degraded: false,
            };
        }

        match self.walk(&seeds, top_k).await {
            Ok(nodes) => {
                debug!(query, seeds = seeds.len(), evidence = nodes.len(), "Traced evidence");
                Trace {
                    nodes,
                    walk_degraded: false,
                }
            }
            Err(e) => {
                warn!(error = %e, "Graph walk failed, echoing seeds as evidence");
                Trace {
                    nodes: seed_echo(&seeds, top_k),
                    walk_degraded: true,
                }
            }
        }
    }

    async fn walk(&self, seeds: &[String], top_k: usize) -> anyhow::Result<Vec<EvidenceNode>> {
        let entities = self.store.find_entities_by_name_or_alias(seeds).await?;

        // Seed order decides teleport order, so resolve in seed order.
        let mut seed_ids = Vec::new();
        for seed in seeds {
            if let Some(entity) = entities.iter().find(|e| e.matches(seed)) {
                if !seed_ids.contains(&entity.graph_id) {
                    seed_ids.push(entity.graph_id.clone());
                }
            }
        }
        if seed_ids.is_empty() {
            debug!(seeds = ?seeds, "No seed resolved to a graph entity");
            return Ok(Vec::new());
        }

        let ranked = self.store.walk_importance(&seed_ids, top_k).await?;
        Ok(rank_walk(ranked, &seed_ids, top_k))
    }
}

/// Orders walk results by score, best first. Equal scores put seeds first in
/// seed order; everything else keeps the store's order.
fn rank_walk(mut ranked: Vec<(Entity, f64)>, seed_ids: &[String], top_k: usize) -> Vec<EvidenceNode> {
    let seed_position = |entity: &Entity| {
        seed_ids
            .iter()
            .position(|id| *id == entity.graph_id)
            .unwrap_or(usize::MAX)
    };
    ranked.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then_with(|| seed_position(&a.0).cmp(&seed_position(&b.0)))
    });
    let nodes = ranked
        .into_iter()
        .map(|(entity, score)| EvidenceNode::new(entity.name, score));
    dedupe_nodes(nodes, top_k)
}

fn seed_echo(seeds: &[String], top_k: usize) -> Vec<EvidenceNode> {
    seeds
        .iter()
        .take(top_k)
        .map(|seed| EvidenceNode::new(seed.clone(), 1.0))
        .collect()
}

fn dedupe_names<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(name_key(name)))
        .map(str::to_string)
        .collect()
}

/// Keeps the first node per name, in input order.
pub(crate) fn dedupe_nodes(
    nodes: impl IntoIterator<Item = EvidenceNode>,
    limit: usize,
) -> Vec<EvidenceNode> {
    let mut seen = HashSet::new();
    nodes
        .into_iter()
        .filter(|node| seen.insert(name_key(&node.entity_name)))
        .take(limit)
        .collect()
}
