use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use unicode_segmentation::UnicodeSegmentation;

use crate::model::Citation;
use index::{Relationship, SourceChunk};

/// `[3]` or `[3a]`; the letter is consumed with the number so `[3a]` never
/// also reads as `[3]`.
static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d+)([a-z])?\]").expect("marker pattern is valid"));

const SENTENCE_LABELS: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone)]
struct CitationTarget {
    chunk: usize,
    offset: Option<usize>,
    length: Option<usize>,
    confidence: Option<f64>,
}

/// Marker to source lookup for one generation context.
#[derive(Debug, Clone, Default)]
pub struct CitationMap {
    chunks: Vec<SourceChunk>,
    targets: HashMap<String, CitationTarget>,
}

impl CitationMap {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn contains(&self, marker: &str) -> bool {
        self.targets.contains_key(marker)
    }

    pub fn resolve(&self, marker: &str) -> Option<Citation> {
        let target = self.targets.get(marker)?;
        let chunk = self.chunks.get(target.chunk)?;
        Some(Citation {
            marker: marker.to_string(),
            chunk_id: chunk.chunk_id.clone(),
            document_id: chunk.document_id.clone(),
            document_title: chunk.document_title.clone(),
            document_source: chunk.document_source.clone(),
            section_path: chunk.section_path.clone(),
            offset: target.offset,
            length: target.length,
            confidence: target.confidence,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssembledContext {
    pub text: String,
    pub citations: CitationMap,
}

/// Renders chunks with `[n]` markers (and `[na]` sentence markers when
/// `sentence_level` is set) followed by the relationship list.
pub fn assemble_context(
    chunks: &[SourceChunk],
    relationships: &[Relationship],
    sentence_level: bool,
) -> AssembledContext {
    let mut text = String::new();
    let mut targets = HashMap::new();

    if !chunks.is_empty() {
        text.push_str("SOURCES:\n");
    }
    for (i, chunk) in chunks.iter().enumerate() {
        let number = i + 1;
        targets.insert(
            format!("[{}]", number),
            CitationTarget {
                chunk: i,
                offset: None,
                length: None,
                confidence: None,
            },
        );
        text.push_str(&format!("[{}] {}\n", number, source_heading(chunk)));

        let sentences = if sentence_level { split_sentences(&chunk.text) } else { Vec::new() };
        if sentences.is_empty() || sentences.len() > SENTENCE_LABELS.len() {
            text.push_str(chunk.text.trim());
        } else {
            let confidence = chunk.relevance_score.clamp(0.0, 1.0);
            let mut rendered = Vec::with_capacity(sentences.len());
            for (label, sentence) in SENTENCE_LABELS.iter().zip(&sentences) {
                let marker = format!("[{}{}]", number, *label as char);
                rendered.push(format!("{} {}", marker, sentence.text));
                targets.insert(
                    marker,
                    CitationTarget {
                        chunk: i,
                        offset: chunk.start_offset.map(|start| start + sentence.char_offset),
                        length: Some(sentence.char_length),
                        confidence: Some(confidence),
                    },
                );
            }
            text.push_str(&rendered.join(" "));
        }
        text.push_str("\n\n");
    }

    if !relationships.is_empty() {
        text.push_str("RELATIONSHIPS:\n");
        for rel in relationships {
            if rel.description.trim().is_empty() {
                text.push_str(&format!("- {} -> {}\n", rel.source, rel.target));
            } else {
                text.push_str(&format!("- {} -> {}: {}\n", rel.source, rel.target, rel.description.trim()));
            }
        }
    }

    AssembledContext {
        text,
        citations: CitationMap {
            chunks: chunks.to_vec(),
            targets,
        },
    }
}

/// Citations for the markers present in `answer`, in order of first use.
/// Markers missing from the map are dropped.
pub fn extract_citations(answer: &str, map: &CitationMap) -> Vec<Citation> {
    let mut seen = HashSet::new();
    MARKER
        .find_iter(answer)
        .map(|m| m.as_str())
        .filter(|marker| seen.insert(marker.to_string()))
        .filter_map(|marker| map.resolve(marker))
        .collect()
}

fn source_heading(chunk: &SourceChunk) -> String {
    let mut parts = Vec::new();
    let title = if chunk.document_title.is_empty() {
        chunk.document_id.as_str()
    } else {
        chunk.document_title.as_str()
    };
    parts.push(title.to_string());
    parts.extend(chunk.section_path.iter().cloned());

    let mut heading = parts.join(" > ");
    if let Some(page) = chunk.page_number {
        heading.push_str(&format!(" (p. {})", page));
    }
    heading
}

struct Sentence<'a> {
    text: &'a str,
    char_offset: usize,
    char_length: usize,
}

fn split_sentences(text: &str) -> Vec<Sentence<'_>> {
    text.split_sentence_bound_indices()
        .filter_map(|(byte_start, segment)| {
            let leading = segment.len() - segment.trim_start().len();
            let trimmed = segment.trim();
            if trimmed.is_empty() {
                return None;
            }
            let start = byte_start + leading;
            Some(Sentence {
                text: trimmed,
                char_offset: text[..start].chars().count(),
                char_length: trimmed.chars().count(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks() -> Vec<SourceChunk> {
        vec![
            SourceChunk::new("c1", "d1", "Acme Corp shall pay the fee. Payment is due monthly.")
                .with_document_title("Master Agreement")
                .with_section("s1", vec!["Payment".to_string()])
                .with_score(0.8)
                .with_offsets(100, 152),
            SourceChunk::new("c2", "d2", "Beta Ltd ships the goods.").with_document_title("Supply Terms"),
        ]
    }

    #[test]
    fn test_context_carries_chunk_and_sentence_markers() {
        let context = assemble_context(&chunks(), &[], true);

        assert!(context.text.contains("[1] Master Agreement > Payment"));
        assert!(context.text.contains("[1a] Acme Corp shall pay the fee."));
        assert!(context.text.contains("[1b] Payment is due monthly."));
        assert!(context.text.contains("[2a] Beta Ltd ships the goods."));
        assert!(context.citations.contains("[1]"));
        assert!(!context.citations.contains("[1c]"));
        assert_eq!(context.citations.len(), 5);
    }

    #[test]
    fn test_sentence_offsets_are_document_relative() {
        let context = assemble_context(&chunks(), &[], true);
        let citation = context.citations.resolve("[1b]").unwrap();

        // "Acme Corp shall pay the fee. " is 29 characters.
        assert_eq!(citation.offset, Some(129));
        assert_eq!(citation.length, Some("Payment is due monthly.".len()));
        assert_eq!(citation.confidence, Some(0.8));

        let unknown_start = context.citations.resolve("[2a]").unwrap();
        assert_eq!(unknown_start.offset, None);
    }

    #[test]
    fn test_chunk_level_only() {
        let context = assemble_context(&chunks(), &[], false);
        assert!(!context.text.contains("[1a]"));
        assert_eq!(context.citations.len(), 2);
    }

    #[test]
    fn test_extracts_known_markers_once_in_order() {
        let context = assemble_context(&chunks(), &[], true);
        let answer = "Acme pays monthly [1b], as agreed [1]. Beta ships [2a][1b]. See also [7] and [3c].";

        let citations = extract_citations(answer, &context.citations);
        let markers: Vec<&str> = citations.iter().map(|c| c.marker.as_str()).collect();

        assert_eq!(markers, vec!["[1b]", "[1]", "[2a]"]);
        assert_eq!(citations[0].chunk_id, "c1");
        assert_eq!(citations[0].section_path, vec!["Payment"]);
        assert_eq!(citations[2].document_title, "Supply Terms");
    }

    #[test]
    fn test_sentence_marker_is_not_read_as_chunk_marker() {
        let context = assemble_context(&chunks(), &[], true);
        let citations = extract_citations("Only this [2a].", &context.citations);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].marker, "[2a]");
    }

    #[test]
    fn test_relationships_listed() {
        let rel = Relationship {
            source_id: "e1".into(),
            source: "Acme Corp".into(),
            target_id: "e2".into(),
            target: "Beta Ltd".into(),
            description: "supplies parts to".into(),
        };
        let context = assemble_context(&[], &[rel], true);
        assert!(context.text.contains("- Acme Corp -> Beta Ltd: supplies parts to"));
        assert!(context.citations.is_empty());
    }
}
