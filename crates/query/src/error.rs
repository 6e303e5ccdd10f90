use std::time::Duration;
use thiserror::Error;

/// Failures surfaced to the caller. Degraded retrieval paths and refusals are
/// not errors; they travel inside the response.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("prerequisites missing: {0}")]
    PrerequisitesMissing(String),

    #[error("generative call failed: {0:#}")]
    GenerativeCallFailed(anyhow::Error),

    #[error("query exceeded its deadline of {0:?}")]
    Timeout(Duration),

    #[error("graph store unavailable: {0:#}")]
    Store(anyhow::Error),
}

impl QueryError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::PrerequisitesMissing(_) => "prerequisites_missing",
            QueryError::GenerativeCallFailed(_) => "generative_call_failed",
            QueryError::Timeout(_) => "timeout",
            QueryError::Store(_) => "store_unavailable",
        }
    }
}
