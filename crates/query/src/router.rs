use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::model::Route;
use extract::{prompt, GenerativeClient};

#[async_trait]
pub trait RouteClassifier: Send + Sync {
    async fn classify(&self, query: &str) -> Result<Route>;
}

/// Asks the generative model for a one-word strategy label.
pub struct LlmRouteClassifier {
    llm: Arc<dyn GenerativeClient>,
}

impl LlmRouteClassifier {
    pub fn new(llm: Arc<dyn GenerativeClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl RouteClassifier for LlmRouteClassifier {
    async fn classify(&self, query: &str) -> Result<Route> {
        let raw = self.llm.complete(&prompt::build_route_prompt(query)).await?;
        parse_route_label(&raw).ok_or_else(|| anyhow!("Unrecognised route label: {:?}", raw.trim()))
    }
}

/// Maps a free-form model label onto a route.
pub fn parse_route_label(raw: &str) -> Option<Route> {
    let label = raw.trim().to_lowercase();
    if label.contains("multi") || label.contains("hop") {
        Some(Route::MultiHop)
    } else if label.contains("global") || label.contains("thematic") {
        Some(Route::Global)
    } else if label.contains("local") || label.contains("focused") {
        Some(Route::Local)
    } else {
        None
    }
}

/// Classifies a query, defaulting to the focused route when the classifier
/// fails or answers nonsense.
pub async fn route_query(classifier: &dyn RouteClassifier, query: &str) -> Route {
    match classifier.classify(query).await {
        Ok(route) => {
            debug!(route = route.as_str(), "Classified query");
            route
        }
        Err(e) => {
            warn!(error = %e, "Route classification failed, using local route");
            Route::Local
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Label(&'static str);

    #[async_trait]
    impl GenerativeClient for Label {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            if self.0.is_empty() {
                anyhow::bail!("model offline");
            }
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn test_parse_route_label() {
        assert_eq!(parse_route_label(" Global\n"), Some(Route::Global));
        assert_eq!(parse_route_label("multihop"), Some(Route::MultiHop));
        assert_eq!(parse_route_label("multi-hop"), Some(Route::MultiHop));
        assert_eq!(parse_route_label("LOCAL"), Some(Route::Local));
        assert_eq!(parse_route_label("banana"), None);
    }

    #[tokio::test]
    async fn test_falls_back_to_local() {
        let offline = LlmRouteClassifier::new(Arc::new(Label("")));
        assert_eq!(route_query(&offline, "q").await, Route::Local);

        let nonsense = LlmRouteClassifier::new(Arc::new(Label("I think maybe")));
        assert_eq!(route_query(&nonsense, "q").await, Route::Local);

        let global = LlmRouteClassifier::new(Arc::new(Label("global")));
        assert_eq!(route_query(&global, "q").await, Route::Global);
    }
}
