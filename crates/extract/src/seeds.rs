use std::sync::Arc;
use tracing::{debug, warn};

use crate::llm::GenerativeClient;
use crate::normalizer::EntityNormalizer;
use crate::parse::parse_string_list;
use crate::prompt;

/// Generic finance/legal abbreviations that are almost never graph entities.
pub const GENERIC_TERMS: &[&str] = &[
    "ACH", "SWIFT", "VAT", "IBAN", "BIC", "EFT", "GST", "KYC", "AML", "SEPA", "RTGS", "EIN",
    "TIN", "SSN", "N/A", "NA", "TBD", "USD", "EUR", "GBP",
];

/// Turns a (sub-)question into a handful of candidate entity names.
#[derive(Clone)]
pub struct SeedResolver {
    llm: Arc<dyn GenerativeClient>,
    normalizer: EntityNormalizer,
    community_digest: Option<String>,
}

impl SeedResolver {
    pub fn new(llm: Arc<dyn GenerativeClient>) -> Self {
        Self {
            llm,
            normalizer: EntityNormalizer::new(),
            community_digest: None,
        }
    }

    pub fn with_community_digest(mut self, digest: String) -> Self {
        self.community_digest = (!digest.trim().is_empty()).then_some(digest);
        self
    }

    /// Never fails: model errors and empty results both yield no seeds.
    pub async fn disambiguate(&self, query: &str, top_k: usize) -> Vec<String> {
        let prompt = prompt::build_seed_prompt(query, self.community_digest.as_deref(), top_k);

        let raw = match self.llm.complete(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Seed resolution call failed, continuing without seeds");
                return Vec::new();
            }
        };

        let seeds = self.clean_seeds(parse_string_list(&raw), top_k);
        if seeds.is_empty() {
            debug!(query, "Seed resolution produced no usable entities");
        } else {
            debug!(query, seeds = ?seeds, "Resolved seeds");
        }
        seeds
    }

    /// Deterministic post-processing applied to whatever the model returned.
    pub fn clean_seeds(&self, candidates: Vec<String>, top_k: usize) -> Vec<String> {
        let cleaned = candidates
            .iter()
            .map(|c| self.normalizer.clean(c))
            .filter(|c| !is_generic_term(c))
            .filter(|c| looks_like_proper_noun(c));

        let mut seeds = self.normalizer.dedupe(cleaned);
        seeds.truncate(top_k);
        seeds
    }
}

fn is_generic_term(candidate: &str) -> bool {
    GENERIC_TERMS
        .iter()
        .any(|term| term.eq_ignore_ascii_case(candidate))
}

fn looks_like_proper_noun(candidate: &str) -> bool {
    candidate
        .chars()
        .any(|c| c.is_uppercase() || c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Scripted(anyhow::Result<String>);

    #[async_trait]
    impl GenerativeClient for Scripted {
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            match &self.0 {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(anyhow::anyhow!("{}", e)),
            }
        }
    }

    fn resolver(response: anyhow::Result<String>) -> SeedResolver {
        SeedResolver::new(Arc::new(Scripted(response)))
    }

    #[tokio::test]
    async fn test_filters_generic_and_lowercase_candidates() {
        let resolver = resolver(Ok(
            r#"["\"Acme Corp\"", "ACH", "payment terms", "Q3 2024", "vat"]"#.to_string(),
        ));

        let seeds = resolver.disambiguate("What does Acme owe?", 5).await;
        assert_eq!(seeds, vec!["Acme Corp", "Q3 2024"]);
    }

    #[tokio::test]
    async fn test_truncates_to_top_k() {
        let resolver = resolver(Ok(r#"["Alpha", "Beta", "Gamma", "Delta"]"#.to_string()));
        let seeds = resolver.disambiguate("q", 3).await;
        assert_eq!(seeds, vec!["Alpha", "Beta", "Gamma"]);
    }

    #[tokio::test]
    async fn test_model_failure_means_no_seeds() {
        let resolver = resolver(Err(anyhow::anyhow!("connection refused")));
        assert!(resolver.disambiguate("q", 3).await.is_empty());
    }

    #[test]
    fn test_dedupes_case_insensitively() {
        let resolver = resolver(Ok(String::new()));
        let seeds = resolver.clean_seeds(
            vec!["Acme Corp".into(), "ACME CORP".into(), "Beta Ltd".into()],
            5,
        );
        assert_eq!(seeds, vec!["Acme Corp", "Beta Ltd"]);
    }
}
