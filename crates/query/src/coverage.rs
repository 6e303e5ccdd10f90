use anyhow::Result;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, warn};

use index::{GraphStore, SourceChunk, COVERAGE_FILL};

/// Decides whether a query asks about every document rather than a subject.
pub trait CoverageIntent: Send + Sync {
    fn is_coverage_query(&self, query: &str) -> bool;
}

const DEFAULT_PATTERNS: &[&str] = &[
    r"(?i)\b(each|every|all)\s+(of\s+the\s+)?(documents?|contracts?|files?|agreements?|reports?|policies|sources?)\b",
    r"(?i)\bacross\s+(all|the|every)\s+(documents?|contracts?|files?|corpus)\b",
    r"(?i)\bsummari[sz]e\s+(each|every|all|the\s+corpus)\b",
    r"(?i)\b(list|compare)\s+(all|each|every)\b",
];

static DEFAULT_COVERAGE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    DEFAULT_PATTERNS
        .iter()
        .map(|p| Regex::new(p).expect("coverage pattern is valid"))
        .collect()
});

/// Regex-based coverage detection.
#[derive(Debug, Clone)]
pub struct PatternCoverageIntent {
    patterns: Vec<Regex>,
}

impl PatternCoverageIntent {
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }
}

impl Default for PatternCoverageIntent {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_COVERAGE.clone(),
        }
    }
}

impl CoverageIntent for PatternCoverageIntent {
    fn is_coverage_query(&self, query: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(query))
    }
}

/// Outcome of one gap-fill pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoverageFill {
    pub added: usize,
    /// Documents whose lead-chunk lookup failed.
    pub failed: Vec<String>,
}

/// Appends one lead chunk for every tenant document not yet represented in
/// `chunks`. Added chunks carry [`COVERAGE_FILL`] and score `0.0`. Running it
/// again over its own output adds nothing.
///
/// Only the document listing is fatal; a failed lookup for one document is
/// recorded in [`CoverageFill::failed`] and the pass moves on.
pub async fn gap_fill(
    store: &dyn GraphStore,
    chunks: &mut Vec<SourceChunk>,
    query_embedding: Option<&[f32]>,
) -> Result<CoverageFill> {
    let documents = store.list_all_documents().await?;
    let mut covered: HashSet<String> = chunks.iter().map(|c| c.document_id.clone()).collect();
    let mut seen: HashSet<String> = chunks.iter().map(|c| c.chunk_id.clone()).collect();
    let mut fill = CoverageFill::default();

    for document in documents {
        if covered.contains(&document.document_id) {
            continue;
        }
        let lead = match store
            .lead_chunk_for_document(&document.document_id, query_embedding)
            .await
        {
            Ok(Some(lead)) => lead,
            Ok(None) => continue,
            Err(e) => {
                warn!(document_id = %document.document_id, error = %e, "Lead chunk lookup failed");
                fill.failed.push(document.document_id);
                continue;
            }
        };
        if !seen.insert(lead.chunk_id.clone()) {
            continue;
        }

        let mut lead = lead.with_provenance(COVERAGE_FILL).with_score(0.0);
        if lead.document_title.is_empty() {
            lead.document_title = document.title.clone();
        }
        if lead.document_source.is_empty() {
            lead.document_source = document.source.clone();
        }
        covered.insert(document.document_id);
        chunks.push(lead);
        fill.added += 1;
    }

    debug!(
        added = fill.added,
        failed = fill.failed.len(),
        total = chunks.len(),
        "Coverage gap-fill complete"
    );
    Ok(fill)
}
