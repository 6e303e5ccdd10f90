pub mod hubs;
pub mod matcher;

pub use hubs::{extract_hub_entities, is_chunk_artifact};
pub use matcher::{CommunityMatcher, ScoredCommunity};
