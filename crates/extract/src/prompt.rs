use index::Community;

const DIGEST_COMMUNITIES: usize = 5;
const DIGEST_SUMMARY_CHARS: usize = 200;

/// Short "what this corpus is about" hint built from community titles/summaries.
pub fn build_community_digest(communities: &[Community]) -> String {
    let mut digest = String::new();
    for community in communities.iter().take(DIGEST_COMMUNITIES) {
        let summary: String = community.summary.chars().take(DIGEST_SUMMARY_CHARS).collect();
        digest.push_str(&format!("- {}: {}\n", community.title, summary.trim()));
    }
    digest
}

pub fn build_seed_prompt(query: &str, community_digest: Option<&str>, top_k: usize) -> String {
    let domain = match community_digest {
        Some(digest) if !digest.trim().is_empty() => {
            format!("\nTOPICS IN THIS CORPUS:\n{}\n", digest.trim_end())
        }
        _ => String::new(),
    };

    format!(
        r#"Identify the named entities a knowledge-graph search needs in order to answer the question.
{}
RULES:
- Return the MINIMUM number of entities needed (at most {})
- Each entity must be distinct; never list synonyms or spellings of the same thing
- Prefer proper names: organizations, people, products, agreements, places
- Do not return generic terms, abbreviations or payment rails
- Output ONLY a JSON array of strings, no explanations

QUESTION: {}

JSON OUTPUT:"#,
        domain, top_k, query
    )
}

pub fn build_route_prompt(query: &str) -> String {
    format!(
        r#"Classify the question into exactly one retrieval strategy.

STRATEGIES:
- local: a focused question about specific named entities or facts
- global: a thematic or corpus-wide question (summaries, themes, comparisons across documents)
- multihop: a question that needs several linked facts combined in sequence

QUESTION: {}

Answer with one word: local, global or multihop.

STRATEGY:"#,
        query
    )
}

pub fn build_decomposition_prompt(query: &str, max_sub_questions: usize) -> String {
    format!(
        r#"Break the question into 2 to {} self-contained sub-questions that together answer it.

RULES:
- Every sub-question must keep ALL constraints of the original: numbers, thresholds, dates, jurisdictions, parties
- Each sub-question must be answerable on its own without the others
- Do not split one entity's mentions into separate sub-questions
- Output ONLY a JSON array of strings

QUESTION: {}

JSON OUTPUT:"#,
        max_sub_questions, query
    )
}

/// Refinement prompt used when one entity dominates most sub-questions.
pub fn build_consolidation_prompt(
    query: &str,
    dominant_entities: &[String],
    previous: &[String],
    max_sub_questions: usize,
) -> String {
    format!(
        r#"The previous decomposition over-split the question around the same entities: {}.

PREVIOUS SUB-QUESTIONS:
{}

Rewrite the decomposition so each dominant entity is handled in ONE consolidated sub-question,
keeping every constraint of the original question. Return 2 to {} sub-questions.
Output ONLY a JSON array of strings.

QUESTION: {}

JSON OUTPUT:"#,
        dominant_entities.join(", "),
        bullet_list(previous),
        max_sub_questions,
        query
    )
}

/// Refinement prompt used when some sub-questions found too little evidence.
pub fn build_clarification_prompt(
    query: &str,
    thin_questions: &[String],
    found_digest: &str,
    max_sub_questions: usize,
) -> String {
    format!(
        r#"Some sub-questions found little or no evidence in the knowledge graph.

LOW-EVIDENCE SUB-QUESTIONS:
{}

WHAT WAS FOUND SO FAR:
{}

Rewrite only the low-evidence sub-questions so they name concrete entities or terms likely to
appear in the documents, keeping every constraint of the original question.
Return 1 to {} sub-questions. Output ONLY a JSON array of strings.

QUESTION: {}

JSON OUTPUT:"#,
        bullet_list(thin_questions),
        if found_digest.trim().is_empty() {
            "(nothing)"
        } else {
            found_digest.trim_end()
        },
        max_sub_questions,
        query
    )
}

/// Final answer prompt. The context must already carry `[n]` / `[na]` markers.
pub fn build_synthesis_prompt(query: &str, context: &str) -> String {
    format!(
        r#"You are a helpful assistant answering questions based only on the provided evidence.

EVIDENCE:
{}

USER QUESTION: {}

INSTRUCTIONS:
- Answer using only the evidence above
- Cite every claim with the bracketed marker of its source, e.g. [2] or [2b]
- Only use markers that appear in the evidence
- If the evidence does not contain the answer, say that the information was not found
- Keep your answer concise and factual

ANSWER:"#,
        context, query
    )
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}
