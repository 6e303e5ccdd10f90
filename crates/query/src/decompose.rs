use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::confidence::RedecomposeCause;
use crate::model::ConfidenceMetrics;
use extract::{parse_string_list, prompt, GenerativeClient};

/// Sub-questions shorter than this are fragments, not questions.
const MIN_SUB_QUESTION_CHARS: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition {
    pub questions: Vec<String>,
    /// The generative call failed and the original query is used as-is.
    pub failed: bool,
}

/// Splits a multi-hop question into self-contained sub-questions.
#[derive(Clone)]
pub struct Decomposer {
    llm: Arc<dyn GenerativeClient>,
    max_sub_questions: usize,
}

impl Decomposer {
    pub fn new(llm: Arc<dyn GenerativeClient>, max_sub_questions: usize) -> Self {
        Self {
            llm,
            max_sub_questions: max_sub_questions.max(1),
        }
    }

    /// Never empty: falls back to the original query.
    pub async fn decompose(&self, query: &str) -> Decomposition {
        let prompt = prompt::build_decomposition_prompt(query, self.max_sub_questions);
        let raw = match self.llm.complete(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Decomposition failed, using the original query");
                return Decomposition {
                    questions: vec![query.to_string()],
                    failed: true,
                };
            }
        };

        let mut questions = sanitize_sub_questions(parse_string_list(&raw), self.max_sub_questions);
        if questions.is_empty() {
            debug!("Decomposition produced nothing usable, using the original query");
            questions.push(query.to_string());
        }
        Decomposition {
            questions,
            failed: false,
        }
    }

    /// Asks for a corrected decomposition. Returns only questions not already
    /// in `previous`; empty when the model fails or has nothing new.
    pub async fn refine(
        &self,
        query: &str,
        cause: RedecomposeCause,
        metrics: &ConfidenceMetrics,
        previous: &[String],
        found_digest: &str,
    ) -> Vec<String> {
        let prompt = match cause {
            RedecomposeCause::Concentration => prompt::build_consolidation_prompt(
                query,
                &metrics.concentrated_entities,
                previous,
                self.max_sub_questions,
            ),
            RedecomposeCause::SparseEvidence => prompt::build_clarification_prompt(
                query,
                if metrics.thin_questions.is_empty() {
                    previous
                } else {
                    &metrics.thin_questions
                },
                found_digest,
                self.max_sub_questions,
            ),
        };

        let raw = match self.llm.complete(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, cause = ?cause, "Re-decomposition failed");
                return Vec::new();
            }
        };

        let known: HashSet<String> = previous.iter().map(|q| q.trim().to_lowercase()).collect();
        sanitize_sub_questions(parse_string_list(&raw), self.max_sub_questions)
            .into_iter()
            .filter(|q| !known.contains(&q.to_lowercase()))
            .collect()
    }
}

/// Drops fragments and punctuation-only items, removes case-insensitive
/// duplicates and caps the list at `max`.
pub fn sanitize_sub_questions(candidates: Vec<String>, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| c.chars().count() >= MIN_SUB_QUESTION_CHARS)
        .filter(|c| c.chars().any(char::is_alphanumeric))
        .filter(|c| seen.insert(c.to_lowercase()))
        .take(max)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Scripted(&'static str);

    #[async_trait]
    impl GenerativeClient for Scripted {
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            if self.0.is_empty() {
                anyhow::bail!("model offline");
            }
            Ok(self.0.to_string())
        }
    }

    fn metrics() -> ConfidenceMetrics {
        ConfidenceMetrics {
            score: 0.2,
            satisfied_ratio: 0.0,
            entity_diversity: 0.0,
            thin_questions: vec!["Who audits Acme?".into()],
            concentrated_entities: Vec::new(),
        }
    }

    #[test]
    fn test_sanitize_guards() {
        let cleaned = sanitize_sub_questions(
            vec![
                "?".into(),
                "-".into(),
                "a".into(),
                "..........".into(),
                "Who owns Acme Corp?".into(),
                "who owns acme corp?".into(),
            ],
            5,
        );
        assert_eq!(cleaned, vec!["Who owns Acme Corp?"]);
    }

    #[test]
    fn test_sanitize_caps_count() {
        let many = (0..9).map(|i| format!("Sub-question number {}", i)).collect();
        assert_eq!(sanitize_sub_questions(many, 5).len(), 5);
    }

    #[tokio::test]
    async fn test_unusable_output_falls_back_to_query() {
        let decomposer = Decomposer::new(Arc::new(Scripted(r#"["?", "-", "a"]"#)), 5);
        let result = decomposer.decompose("Who audits the parent of Acme?").await;

        assert_eq!(result.questions, vec!["Who audits the parent of Acme?"]);
        assert!(!result.failed);
    }

    #[tokio::test]
    async fn test_failure_is_flagged() {
        let decomposer = Decomposer::new(Arc::new(Scripted("")), 5);
        let result = decomposer.decompose("Who audits the parent of Acme?").await;

        assert_eq!(result.questions, vec!["Who audits the parent of Acme?"]);
        assert!(result.failed);
    }

    #[tokio::test]
    async fn test_refine_drops_known_questions() {
        let decomposer = Decomposer::new(
            Arc::new(Scripted(r#"["Who audits Acme?", "Which firm audits Acme Holdings?"]"#)),
            5,
        );
        let refined = decomposer
            .refine(
                "q",
                RedecomposeCause::SparseEvidence,
                &metrics(),
                &["who audits acme?".to_string()],
                "",
            )
            .await;
        assert_eq!(refined, vec!["Which firm audits Acme Holdings?"]);
    }
}
