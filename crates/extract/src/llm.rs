use anyhow::{anyhow, Result};
use reqwest::StatusCode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::retry::{Attempt, RetryPolicy};

/// Text-completion model. Implementations own any retry behaviour.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaClient {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            base_url,
            model,
            client: reqwest::Client::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn default() -> Self {
        Self::new(
            "http://localhost:11434".to_string(),
            "llama3".to_string(),
        )
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn generate(&self, prompt: &str) -> Result<String, Attempt<anyhow::Error>> {
        let url = format!("{}/api/generate", self.base_url);

        let request = OllamaRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                let transient = e.is_connect() || e.is_timeout() || e.is_request();
                let error = anyhow::Error::new(e).context("Failed to send request to Ollama");
                if transient {
                    Attempt::Transient(error)
                } else {
                    Attempt::Permanent(error)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error = anyhow!("Ollama request failed: {}", status);
            return Err(if is_transient_status(status) {
                Attempt::Transient(error)
            } else {
                Attempt::Permanent(error)
            });
        }

        let ollama_response: OllamaResponse = response.json().await.map_err(|e| {
            Attempt::Permanent(anyhow::Error::new(e).context("Failed to parse Ollama response"))
        })?;

        Ok(ollama_response.response)
    }
}

/// Server-side trouble and rate limiting are worth another attempt; other
/// client errors are not.
fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

#[async_trait]
impl GenerativeClient for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let operation = format!("ollama.generate[{}]", self.model);
        self.retry.execute(&operation, || self.generate(prompt)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
    }
}
