use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::citations::{assemble_context, extract_citations};
use crate::config::EngineConfig;
use crate::coverage::{CoverageIntent, PatternCoverageIntent};
use crate::decompose::Decomposer;
use crate::error::QueryError;
use crate::gate::{self, REFUSAL_MESSAGE};
use crate::global_search::GlobalSearchEngine;
use crate::local_search::LocalSearchEngine;
use crate::model::{
    EvidenceBundle, EvidenceOutcome, QueryDiagnostics, QueryResponse, RefusalReason, Route,
};
use crate::multihop::{DecompositionLoop, MultiHopSearchEngine};
use crate::retriever::HybridChunkRetriever;
use crate::router::{route_query, LlmRouteClassifier, RouteClassifier};
use crate::tracer::GraphEvidenceTracer;
use communities::CommunityMatcher;
use extract::{prompt, GenerativeClient, SeedResolver};
use index::{EmbeddingClient, GraphStore};

/// Answers questions for one tenant: route, retrieve, gate, generate, cite.
pub struct QueryEngine {
    store: Arc<dyn GraphStore>,
    llm: Arc<dyn GenerativeClient>,
    embedding_client: Arc<dyn EmbeddingClient>,
    classifier: Arc<dyn RouteClassifier>,
    coverage: Arc<dyn CoverageIntent>,
    config: EngineConfig,
}

impl QueryEngine {
    pub fn new(
        store: Arc<dyn GraphStore>,
        llm: Arc<dyn GenerativeClient>,
        embedding_client: Arc<dyn EmbeddingClient>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            classifier: Arc::new(LlmRouteClassifier::new(llm.clone())),
            llm,
            embedding_client,
            coverage: Arc::new(PatternCoverageIntent::default()),
            config,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn RouteClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_coverage_intent(mut self, coverage: Arc<dyn CoverageIntent>) -> Self {
        self.coverage = coverage;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn answer(&self, query: &str) -> Result<QueryResponse, QueryError> {
        self.answer_with_route(query, None).await
    }

    /// Answers `query` on `route`, or on the classified route when `None`.
    /// The whole call is bounded by the configured deadline; dropping the
    /// in-flight work cancels any running sub-question tasks.
    pub async fn answer_with_route(
        &self,
        query: &str,
        route: Option<Route>,
    ) -> Result<QueryResponse, QueryError> {
        let deadline = self.config.deadline();
        match tokio::time::timeout(deadline, self.run(query, route)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    tenant = self.store.group_id(),
                    deadline_ms = self.config.deadline_ms,
                    "Query exceeded its deadline"
                );
                Err(QueryError::Timeout(deadline))
            }
        }
    }

    async fn run(&self, query: &str, route: Option<Route>) -> Result<QueryResponse, QueryError> {
        let started = Instant::now();
        let route = match route {
            Some(route) => route,
            None => route_query(self.classifier.as_ref(), query).await,
        };
        info!(tenant = self.store.group_id(), route = route.as_str(), "Answering query");

        let bundle = match self.retrieve(query, route).await? {
            EvidenceOutcome::Ready(bundle) => bundle,
            EvidenceOutcome::Refuse { reason, bundle } => {
                return Ok(refusal(reason, &bundle, started));
            }
        };

        let context = assemble_context(
            &bundle.chunks,
            &bundle.relationships,
            self.config.sentence_citations,
        );
        let answer = self
            .llm
            .complete(&prompt::build_synthesis_prompt(query, &context.text))
            .await
            .map_err(QueryError::GenerativeCallFailed)?;

        let citations = extract_citations(&answer, &context.citations);
        if let Some(reason) = gate::post_generation_check(&citations) {
            info!(markers = context.citations.len(), "Answer cited no sources, refusing");
            return Ok(refusal(reason, &bundle, started));
        }

        let diagnostics = QueryDiagnostics::from_bundle(&bundle, elapsed_ms(started));
        info!(
            route = route.as_str(),
            chunks = bundle.chunks.len(),
            citations = citations.len(),
            elapsed_ms = diagnostics.elapsed_ms,
            "Answered query"
        );
        Ok(QueryResponse {
            answer: answer.trim().to_string(),
            refused: false,
            refusal_reason: None,
            citations,
            diagnostics,
        })
    }

    /// Retrieval and the pre-generation gate, without any synthesis call.
    pub async fn retrieve(&self, query: &str, route: Route) -> Result<EvidenceOutcome, QueryError> {
        let model = self.store.load_graph_model().await;
        let digest = match &model {
            Ok(model) => prompt::build_community_digest(&model.communities),
            Err(e) => {
                warn!(error = %e, "Graph model unavailable, resolving seeds without corpus digest");
                String::new()
            }
        };

        let resolver = SeedResolver::new(self.llm.clone()).with_community_digest(digest);
        let tracer = GraphEvidenceTracer::new(self.store.clone(), self.config.ppr_enabled);
        let retriever = HybridChunkRetriever::new(
            self.store.clone(),
            self.embedding_client.clone(),
            self.config.clone(),
        );
        let local = LocalSearchEngine::new(
            resolver.clone(),
            tracer.clone(),
            retriever.clone(),
            self.config.clone(),
        );

        let mut bundle = match route {
            Route::Local => local.search(query).await,
            Route::Global => {
                let model = model.map_err(QueryError::Store)?;
                let global = GlobalSearchEngine::new(
                    CommunityMatcher::new(self.embedding_client.clone()),
                    tracer,
                    retriever.clone(),
                    self.config.clone(),
                );
                match global.search(query, &model).await {
                    Ok(bundle) => bundle,
                    Err(QueryError::PrerequisitesMissing(reason)) if self.config.debug_fallback => {
                        warn!(reason = %reason, "Thematic prerequisites missing, falling back to local route");
                        local.search(query).await
                    }
                    Err(e) => return Err(e),
                }
            }
            Route::MultiHop => {
                let decomposition = DecompositionLoop::new(
                    Decomposer::new(self.llm.clone(), self.config.max_sub_questions),
                    resolver,
                    tracer,
                    self.config.clone(),
                );
                MultiHopSearchEngine::new(decomposition, retriever.clone())
                    .search(query)
                    .await
            }
        };

        bundle.coverage_intent = self.coverage.is_coverage_query(query);
        if let Some(reason) = gate::pre_generation_check(&bundle, bundle.coverage_intent) {
            info!(route = route.as_str(), "No evidence found, refusing before generation");
            return Ok(EvidenceOutcome::Refuse { reason, bundle });
        }

        if self.config.coverage_enabled && (bundle.route != Route::Local || bundle.coverage_intent) {
            retriever.coverage_fill(&mut bundle).await;
        }

        if let Some(reason) = gate::citable_evidence_check(&bundle) {
            info!(route = route.as_str(), "No citable text found, refusing before generation");
            return Ok(EvidenceOutcome::Refuse { reason, bundle });
        }

        Ok(EvidenceOutcome::Ready(bundle))
    }
}

fn refusal(reason: RefusalReason, bundle: &EvidenceBundle, started: Instant) -> QueryResponse {
    QueryResponse {
        answer: REFUSAL_MESSAGE.to_string(),
        refused: true,
        refusal_reason: Some(reason),
        citations: Vec::new(),
        diagnostics: QueryDiagnostics::from_bundle(bundle, elapsed_ms(started)),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
