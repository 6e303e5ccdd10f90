pub mod llm;
pub mod normalizer;
pub mod parse;
pub mod prompt;
pub mod retry;
pub mod seeds;

pub use llm::{GenerativeClient, OllamaClient};
pub use normalizer::EntityNormalizer;
pub use parse::parse_string_list;
pub use retry::{Attempt, RetryPolicy};
pub use seeds::SeedResolver;
