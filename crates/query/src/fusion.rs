use std::collections::HashMap;

use index::{SourceChunk, HYBRID_MATCH};

/// Reciprocal Rank Fusion over ranked chunk lists.
///
/// Each chunk scores `sum(1 / (k + rank))` over the lists it appears in, with
/// 1-based ranks. The fused list is sorted by that score, ties keeping first
/// appearance order. A chunk found by more than one list is tagged
/// [`HYBRID_MATCH`]; otherwise it keeps its list's provenance.
pub fn reciprocal_rank_fusion(lists: &[Vec<SourceChunk>], k: f64) -> Vec<SourceChunk> {
    let mut fused: Vec<(SourceChunk, f64, usize)> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();

    for list in lists {
        for (rank, chunk) in list.iter().enumerate() {
            let contribution = 1.0 / (k + (rank + 1) as f64);
            match position.get(&chunk.chunk_id) {
                Some(&i) => {
                    fused[i].1 += contribution;
                    fused[i].2 += 1;
                }
                None => {
                    position.insert(chunk.chunk_id.clone(), fused.len());
                    fused.push((chunk.clone(), contribution, 1));
                }
            }
        }
    }

    fused.sort_by(|a, b| b.1.total_cmp(&a.1));
    fused
        .into_iter()
        .map(|(chunk, score, hits)| {
            let chunk = chunk.with_score(score);
            if hits > 1 {
                chunk.with_provenance(HYBRID_MATCH)
            } else {
                chunk
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use index::{KEYWORD_MATCH, VECTOR_MATCH};

    fn chunks(ids: &[&str], tag: &str) -> Vec<SourceChunk> {
        ids.iter()
            .map(|id| SourceChunk::new(*id, "d", "text").with_provenance(tag))
            .collect()
    }

    #[test]
    fn test_shared_chunk_wins() {
        let keyword = chunks(&["a", "b", "c"], KEYWORD_MATCH);
        let vector = chunks(&["c", "d"], VECTOR_MATCH);

        let fused = reciprocal_rank_fusion(&[keyword, vector], 60.0);
        let ids: Vec<&str> = fused.iter().map(|c| c.chunk_id.as_str()).collect();

        assert_eq!(ids, vec!["c", "a", "b", "d"]);
        assert_eq!(fused[0].entity_name, HYBRID_MATCH);
        assert_eq!(fused[1].entity_name, KEYWORD_MATCH);
        assert!((fused[0].relevance_score - (1.0 / 63.0 + 1.0 / 61.0)).abs() < 1e-12);
    }

    #[test]
    fn test_equal_scores_keep_first_appearance() {
        let fused = reciprocal_rank_fusion(
            &[chunks(&["x"], KEYWORD_MATCH), chunks(&["y"], VECTOR_MATCH)],
            60.0,
        );
        let ids: Vec<&str> = fused.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y"]);
    }

    #[test]
    fn test_empty_lists() {
        assert!(reciprocal_rank_fusion(&[Vec::new(), Vec::new()], 60.0).is_empty());
    }
}
