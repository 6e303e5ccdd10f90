use index::name_key;
use std::collections::HashSet;

const WRAPPING_QUOTES: &[char] = &['"', '\'', '`', '\u{201c}', '\u{201d}', '\u{2018}', '\u{2019}'];

/// Cleans model-produced entity strings and de-duplicates them by their
/// case-insensitive key, keeping the first spelling seen.
#[derive(Debug, Default, Clone)]
pub struct EntityNormalizer;

impl EntityNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Strip wrapping quotes and trailing list punctuation, collapse whitespace.
    pub fn clean(&self, raw: &str) -> String {
        let mut value = raw.trim();
        loop {
            let stripped = value
                .trim_start_matches(WRAPPING_QUOTES)
                .trim_end_matches(WRAPPING_QUOTES)
                .trim_end_matches([',', ';'])
                .trim();
            if stripped == value {
                break;
            }
            value = stripped;
        }
        value.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    pub fn key(&self, name: &str) -> String {
        name_key(name)
    }

    pub fn dedupe<I>(&self, names: I) -> Vec<String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut seen = HashSet::new();
        names
            .into_iter()
            .filter(|name| !name.trim().is_empty())
            .filter(|name| seen.insert(self.key(name)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_strips_quotes_and_spacing() {
        let normalizer = EntityNormalizer::new();

        assert_eq!(normalizer.clean("\"Acme Corp\""), "Acme Corp");
        assert_eq!(normalizer.clean("  'Beta   Ltd',"), "Beta Ltd");
        assert_eq!(normalizer.clean("\u{201c}Gamma\u{201d}"), "Gamma");
    }

    #[test]
    fn test_dedupe_preserves_first_seen_order() {
        let normalizer = EntityNormalizer::new();
        let names = vec![
            "Acme Corp".to_string(),
            "acme corp".to_string(),
            "Beta Ltd".to_string(),
        ];

        assert_eq!(normalizer.dedupe(names), vec!["Acme Corp", "Beta Ltd"]);
    }
}
