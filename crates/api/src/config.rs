use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use extract::RetryPolicy;
use query::EngineConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mode: OperationMode,
    pub server: ServerConfig,
    pub neo4j: Neo4jConfig,
    pub ollama: OllamaConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    Fast,      // Shallower retrieval, short deadline
    Accurate,  // Broader retrieval, long deadline
    Balanced,  // Default
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub default_group_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub fulltext_index: String,
    pub vector_index: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
    pub generation_model: String,
    pub embedding_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_tenants: usize,
    pub max_embeddings: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            default_group_id: "default".to_string(),
        }
    }
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "neo4j".to_string(),
            fulltext_index: "textchunk_fulltext".to_string(),
            vector_index: "chunk_embedding".to_string(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            generation_model: "llama3".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 10000,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_tenants: 64,
            max_embeddings: 10000,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: OperationMode::Balanced,
            server: ServerConfig::default(),
            neo4j: Neo4jConfig::default(),
            ollama: OllamaConfig::default(),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn fast_mode() -> Self {
        let mut config = Self {
            mode: OperationMode::Fast,
            retry: RetryConfig {
                max_retries: 2,
                initial_backoff_ms: 500,
                max_backoff_ms: 5000,
            },
            cache: CacheConfig {
                max_tenants: 128,
                max_embeddings: 50000,
            },
            ..Self::default()
        };
        config.engine.trace_top_k = 10;
        config.engine.max_chunks = 12;
        config.engine.discovery_concurrency = 8;
        config.engine.max_redecompose_attempts = 0;
        config.engine.deadline_ms = 30_000;
        config
    }

    pub fn accurate_mode() -> Self {
        let mut config = Self {
            mode: OperationMode::Accurate,
            retry: RetryConfig {
                max_retries: 5,
                initial_backoff_ms: 2000,
                max_backoff_ms: 20000,
            },
            ..Self::default()
        };
        config.engine.trace_top_k = 30;
        config.engine.max_chunks = 36;
        config.engine.discovery_concurrency = 2;
        config.engine.max_redecompose_attempts = 2;
        config.engine.deadline_ms = 180_000;
        config
    }

    /// Preset from `GRAPHRAG_MODE`, replaced wholesale by the JSON file named
    /// in `GRAPHRAG_CONFIG` when set, then individual env overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("GRAPHRAG_MODE").ok().as_deref() {
            Some("fast") => Self::fast_mode(),
            Some("accurate") => Self::accurate_mode(),
            _ => Self::default(),
        };

        if let Ok(path) = std::env::var("GRAPHRAG_CONFIG") {
            config = Self::from_file(Path::new(&path))?;
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(uri) = lookup("NEO4J_URI") {
            self.neo4j.uri = uri;
        }
        if let Some(user) = lookup("NEO4J_USER") {
            self.neo4j.user = user;
        }
        if let Some(password) = lookup("NEO4J_PASSWORD") {
            self.neo4j.password = password;
        }
        if let Some(url) = lookup("OLLAMA_URL") {
            self.ollama.base_url = url;
        }
        if let Some(addr) = lookup("BIND_ADDR") {
            self.server.bind_addr = addr;
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_retries,
            self.retry.initial_backoff_ms,
            self.retry.max_backoff_ms,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_trade_depth_for_latency() {
        let fast = AppConfig::fast_mode();
        let accurate = AppConfig::accurate_mode();

        assert_eq!(fast.mode, OperationMode::Fast);
        assert!(fast.engine.deadline_ms < accurate.engine.deadline_ms);
        assert!(fast.engine.max_chunks < accurate.engine.max_chunks);
        assert_eq!(fast.engine.max_redecompose_attempts, 0);
        assert_eq!(AppConfig::default().engine.max_redecompose_attempts, 1);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config.apply_overrides(|key| match key {
            "NEO4J_URI" => Some("bolt://graph:7687".to_string()),
            "BIND_ADDR" => Some("127.0.0.1:8080".to_string()),
            _ => None,
        });

        assert_eq!(config.neo4j.uri, "bolt://graph:7687");
        assert_eq!(config.server.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.neo4j.user, "neo4j");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{"mode": "accurate", "engine": {"max_per_document": 4}, "ollama": {"generation_model": "mistral"}}"#,
        )
        .unwrap();

        assert_eq!(config.mode, OperationMode::Accurate);
        assert_eq!(config.engine.max_per_document, 4);
        assert_eq!(config.engine.max_per_section, 3);
        assert_eq!(config.ollama.generation_model, "mistral");
        assert_eq!(config.ollama.base_url, "http://localhost:11434");
    }
}
