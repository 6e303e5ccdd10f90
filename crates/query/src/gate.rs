use crate::model::{Citation, EvidenceBundle, RefusalReason};

/// The only text returned when the engine refuses to answer.
pub const REFUSAL_MESSAGE: &str =
    "The requested information was not found in the available documents.";

/// Refuse before generation when retrieval found nothing at all. Coverage
/// queries are exempt: they are answered from gap-fill chunks alone.
pub fn pre_generation_check(bundle: &EvidenceBundle, coverage_intent: bool) -> Option<RefusalReason> {
    let nothing_found =
        bundle.evidence.is_empty() && bundle.relationships.is_empty() && bundle.chunks.is_empty();
    (nothing_found && !coverage_intent).then_some(RefusalReason::NoEvidence)
}

/// Refuse when there is no text left to cite, even for coverage queries.
pub fn citable_evidence_check(bundle: &EvidenceBundle) -> Option<RefusalReason> {
    bundle
        .chunks
        .is_empty()
        .then_some(RefusalReason::NoCitableEvidence)
}

/// Refuse after generation when the answer cites none of its sources.
pub fn post_generation_check(citations: &[Citation]) -> Option<RefusalReason> {
    citations
        .is_empty()
        .then_some(RefusalReason::NoCitationsInAnswer)
}
