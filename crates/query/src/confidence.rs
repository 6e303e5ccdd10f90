use std::collections::{HashMap, HashSet};

use crate::config::ConfidenceWeights;
use crate::model::{ConfidenceMetrics, SubQuestion};
use index::name_key;

/// Why a decomposition should be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedecomposeCause {
    /// Entities dominate most sub-questions; consolidate around them.
    Concentration,
    /// Too little or too repetitive evidence; clarify the thin sub-questions.
    SparseEvidence,
}

pub fn compute_confidence(sub_questions: &[SubQuestion], weights: &ConfidenceWeights) -> ConfidenceMetrics {
    let n = sub_questions.len();
    if n == 0 {
        return ConfidenceMetrics {
            score: 0.0,
            satisfied_ratio: 0.0,
            entity_diversity: 0.0,
            thin_questions: Vec::new(),
            concentrated_entities: Vec::new(),
        };
    }

    let thin_questions: Vec<String> = sub_questions
        .iter()
        .filter(|q| q.evidence_count < weights.min_evidence_per_question)
        .map(|q| q.text.clone())
        .collect();
    let satisfied_ratio = (n - thin_questions.len()) as f64 / n as f64;

    // Mentions count every resolved entity; presence counts each entity once
    // per sub-question.
    let mut total_mentions = 0usize;
    let mut presence: HashMap<String, usize> = HashMap::new();
    let mut display: Vec<(String, String)> = Vec::new();
    for question in sub_questions {
        let mut in_question = HashSet::new();
        for entity in &question.resolved_entities {
            total_mentions += 1;
            let key = name_key(entity);
            if in_question.insert(key.clone()) {
                if !presence.contains_key(&key) {
                    display.push((key.clone(), entity.clone()));
                }
                *presence.entry(key).or_insert(0) += 1;
            }
        }
    }

    let entity_diversity = if total_mentions == 0 {
        0.0
    } else {
        presence.len() as f64 / total_mentions as f64
    };

    let concentrated_entities: Vec<String> = if n < 2 {
        Vec::new()
    } else {
        display
            .into_iter()
            .filter(|(key, _)| presence.get(key).is_some_and(|count| count * 2 > n))
            .map(|(_, name)| name)
            .collect()
    };

    let penalty = (weights.concentration_penalty * concentrated_entities.len() as f64)
        .min(weights.concentration_penalty_cap);
    let score = (weights.satisfied_weight * satisfied_ratio
        + weights.diversity_weight * entity_diversity
        - penalty)
        .clamp(0.0, 1.0);

    ConfidenceMetrics {
        score,
        satisfied_ratio,
        entity_diversity,
        thin_questions,
        concentrated_entities,
    }
}

/// `None` means confidence is good enough to synthesize.
pub fn redecompose_cause(
    metrics: &ConfidenceMetrics,
    sub_question_count: usize,
    weights: &ConfidenceWeights,
) -> Option<RedecomposeCause> {
    if !metrics.concentrated_entities.is_empty() && metrics.score < weights.concentration_score_below {
        return Some(RedecomposeCause::Concentration);
    }
    let low_score = metrics.score < weights.redecompose_score_below && sub_question_count > 1;
    let low_diversity =
        metrics.entity_diversity < weights.redecompose_diversity_below && sub_question_count > 2;
    (low_score || low_diversity).then_some(RedecomposeCause::SparseEvidence)
}
