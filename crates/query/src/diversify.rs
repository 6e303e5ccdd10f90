use std::collections::{HashMap, HashSet};

use index::SourceChunk;

/// Greedy pass in input order that enforces per-section and per-document
/// caps. Duplicate chunk ids are dropped.
pub fn diversify(
    chunks: Vec<SourceChunk>,
    max_per_section: usize,
    max_per_document: usize,
) -> Vec<SourceChunk> {
    let mut per_section: HashMap<String, usize> = HashMap::new();
    let mut per_document: HashMap<String, usize> = HashMap::new();
    let mut seen = HashSet::new();
    let mut kept = Vec::new();

    for chunk in chunks {
        if seen.contains(&chunk.chunk_id) {
            continue;
        }
        let section = chunk.section_key();
        let in_section = per_section.get(&section).copied().unwrap_or(0);
        let in_document = per_document.get(&chunk.document_id).copied().unwrap_or(0);
        if in_section >= max_per_section || in_document >= max_per_document {
            continue;
        }

        *per_section.entry(section).or_insert(0) += 1;
        *per_document.entry(chunk.document_id.clone()).or_insert(0) += 1;
        seen.insert(chunk.chunk_id.clone());
        kept.push(chunk);
    }

    kept
}

/// Merges ranked `candidates` into `existing` in two passes.
///
/// The first pass takes the best candidate of each not-yet-represented
/// document whose section still has room, until `min_documents` distinct
/// documents are present; it may exceed `max_total`. The second pass fills the
/// remaining budget in rank order. Both passes honor `max_per_section` and
/// `max_per_document`.
pub fn merge_with_document_diversity(
    existing: Vec<SourceChunk>,
    candidates: &[SourceChunk],
    min_documents: usize,
    max_per_section: usize,
    max_per_document: usize,
    max_total: usize,
) -> Vec<SourceChunk> {
    let mut seen: HashSet<String> = existing.iter().map(|c| c.chunk_id.clone()).collect();
    let mut per_section: HashMap<String, usize> = HashMap::new();
    let mut per_document: HashMap<String, usize> = HashMap::new();
    for chunk in &existing {
        *per_section.entry(chunk.section_key()).or_insert(0) += 1;
        *per_document.entry(chunk.document_id.clone()).or_insert(0) += 1;
    }
    let mut merged = existing;

    let section_full =
        |counts: &HashMap<String, usize>, key: &str| counts.get(key).copied().unwrap_or(0) >= max_per_section;

    for candidate in candidates {
        if per_document.len() >= min_documents {
            break;
        }
        if seen.contains(&candidate.chunk_id) || per_document.contains_key(&candidate.document_id) {
            continue;
        }
        let section = candidate.section_key();
        if section_full(&per_section, &section) {
            continue;
        }
        *per_section.entry(section).or_insert(0) += 1;
        seen.insert(candidate.chunk_id.clone());
        per_document.insert(candidate.document_id.clone(), 1);
        merged.push(candidate.clone());
    }

    for candidate in candidates {
        if merged.len() >= max_total {
            break;
        }
        if seen.contains(&candidate.chunk_id) {
            continue;
        }
        let section = candidate.section_key();
        let in_document = per_document.get(&candidate.document_id).copied().unwrap_or(0);
        if section_full(&per_section, &section) || in_document >= max_per_document {
            continue;
        }
        *per_section.entry(section).or_insert(0) += 1;
        *per_document.entry(candidate.document_id.clone()).or_insert(0) += 1;
        seen.insert(candidate.chunk_id.clone());
        merged.push(candidate.clone());
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, doc: &str, section: &str) -> SourceChunk {
        SourceChunk::new(id, doc, "text").with_section(section, vec![section.to_string()])
    }

    fn ids(chunks: &[SourceChunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.chunk_id.as_str()).collect()
    }

    #[test]
    fn test_section_cap() {
        let chunks = (0..5).map(|i| chunk(&format!("c{}", i), "d1", "s1")).collect();
        let kept = diversify(chunks, 3, 6);
        assert_eq!(ids(&kept), vec!["c0", "c1", "c2"]);
    }

    #[test]
    fn test_document_cap_across_sections() {
        let chunks = (0..8)
            .map(|i| chunk(&format!("c{}", i), "d1", &format!("s{}", i % 4)))
            .collect();
        let kept = diversify(chunks, 3, 6);
        assert_eq!(kept.len(), 6);
    }

    #[test]
    fn test_chunks_without_section_share_root_bucket() {
        let chunks = (0..4)
            .map(|i| SourceChunk::new(format!("c{}", i), "d1", "text"))
            .collect();
        assert_eq!(diversify(chunks, 3, 6).len(), 3);
    }

    #[test]
    fn test_duplicates_dropped() {
        let kept = diversify(vec![chunk("a", "d1", "s"), chunk("a", "d1", "s")], 3, 6);
        assert_eq!(ids(&kept), vec!["a"]);
    }

    #[test]
    fn test_breadth_before_depth() {
        let existing = vec![chunk("a1", "A", "s"), chunk("a2", "A", "t")];
        let candidates = vec![
            chunk("a3", "A", "u"),
            chunk("a4", "A", "v"),
            chunk("b1", "B", "s"),
            chunk("c1", "C", "s"),
            chunk("b2", "B", "t"),
        ];

        let merged = merge_with_document_diversity(existing, &candidates, 3, 3, 6, 4);

        // B and C are pulled in ahead of better-ranked A chunks; then the
        // budget of 4 is already spent.
        assert_eq!(ids(&merged), vec!["a1", "a2", "b1", "c1"]);
    }

    #[test]
    fn test_fill_respects_document_cap() {
        let existing = vec![chunk("a1", "A", "s")];
        let candidates = vec![chunk("a2", "A", "s"), chunk("a3", "A", "s"), chunk("b1", "B", "s")];

        let merged = merge_with_document_diversity(existing, &candidates, 1, 3, 2, 10);
        assert_eq!(ids(&merged), vec!["a1", "a2", "b1"]);
    }

    #[test]
    fn test_merge_respects_section_cap() {
        let existing = vec![chunk("g1", "A", "s1"), chunk("g2", "A", "s1"), chunk("g3", "A", "s1")];
        let candidates = vec![
            chunk("h1", "A", "s1"),
            chunk("h2", "A", "s1"),
            chunk("b1", "B", "s2"),
            chunk("c1", "C", "s3"),
            chunk("h3", "A", "s4"),
        ];

        let merged = merge_with_document_diversity(existing, &candidates, 3, 3, 6, 24);

        assert_eq!(ids(&merged), vec!["g1", "g2", "g3", "b1", "c1", "h3"]);
    }

    #[test]
    fn test_first_pass_skips_full_section_for_same_document() {
        let existing = vec![chunk("a1", "A", "shared"), chunk("a2", "A", "shared")];
        let candidates = vec![chunk("b1", "B", "shared"), chunk("b2", "B", "own"), chunk("b3", "B", "shared")];

        let merged = merge_with_document_diversity(existing, &candidates, 2, 2, 6, 3);

        assert_eq!(ids(&merged), vec!["a1", "a2", "b2"]);
    }
}
