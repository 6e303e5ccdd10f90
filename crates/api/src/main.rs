mod config;
mod metrics;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn, Instrument};
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use extract::{GenerativeClient, OllamaClient};
use index::{
    CachedEmbeddings, EmbeddingCache, EmbeddingClient, GraphModelCache, Neo4jStore, OllamaEmbeddings,
};
use metrics::{Metrics, MetricsSnapshot, TimedOperation};
use query::{QueryEngine, QueryError, QueryResponse, Route};

#[derive(Clone)]
struct AppState {
    graph: neo4rs::Graph,
    llm: Arc<dyn GenerativeClient>,
    embeddings: Arc<dyn EmbeddingClient>,
    model_cache: GraphModelCache,
    config: Arc<AppConfig>,
    metrics: Arc<Metrics>,
}

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    group_id: Option<String>,
    /// Skips classification when set.
    route: Option<Route>,
}

#[derive(Serialize)]
struct HealthResponse {
    neo4j: String,
    ollama: String,
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

enum ApiError {
    EmptyQuery,
    Query(QueryError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::EmptyQuery => (
                StatusCode::BAD_REQUEST,
                "empty_query",
                "query must not be empty".to_string(),
            ),
            ApiError::Query(e) => {
                let status = match &e {
                    QueryError::PrerequisitesMissing(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    QueryError::GenerativeCallFailed(_) => StatusCode::BAD_GATEWAY,
                    QueryError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                    QueryError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
                };
                (status, e.code(), e.to_string())
            }
        };
        (status, Json(ErrorBody { code, message })).into_response()
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::load()?;
    info!(mode = ?config.mode, bind_addr = %config.server.bind_addr, "Loaded configuration");

    let graph = neo4rs::Graph::new(
        config.neo4j.uri.as_str(),
        config.neo4j.user.as_str(),
        config.neo4j.password.as_str(),
    )
    .await
    .context("Failed to connect to Neo4j")?;

    let llm: Arc<dyn GenerativeClient> = Arc::new(
        OllamaClient::new(
            config.ollama.base_url.clone(),
            config.ollama.generation_model.clone(),
        )
        .with_retry(config.retry_policy()),
    );
    let embeddings: Arc<dyn EmbeddingClient> = Arc::new(CachedEmbeddings::new(
        Arc::new(OllamaEmbeddings::new(
            config.ollama.base_url.clone(),
            config.ollama.embedding_model.clone(),
        )),
        Arc::new(EmbeddingCache::new(config.cache.max_embeddings)),
    ));

    let bind_addr = config.server.bind_addr.clone();
    let state = AppState {
        graph,
        llm,
        embeddings,
        model_cache: GraphModelCache::new(config.cache.max_tenants),
        config: Arc::new(config),
        metrics: Metrics::new(),
    };

    let app = Router::new()
        .route("/query", post(answer_query))
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

async fn answer_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let query = req.query.trim();
    if query.is_empty() {
        return Err(ApiError::EmptyQuery);
    }

    let group_id = req
        .group_id
        .unwrap_or_else(|| state.config.server.default_group_id.clone());
    let span = tracing::info_span!(
        "query",
        request_id = %uuid::Uuid::new_v4(),
        tenant = %group_id
    );

    let store = Arc::new(
        Neo4jStore::new(state.graph.clone(), group_id)
            .with_cache(state.model_cache.clone())
            .with_indexes(
                state.config.neo4j.fulltext_index.clone(),
                state.config.neo4j.vector_index.clone(),
            ),
    );
    let engine = QueryEngine::new(
        store,
        state.llm.clone(),
        state.embeddings.clone(),
        state.config.engine.clone(),
    );

    let timer = TimedOperation::start();
    let result = engine
        .answer_with_route(query, req.route)
        .instrument(span)
        .await;

    match result {
        Ok(response) => {
            state.metrics.record_answer(
                response.diagnostics.route.as_str(),
                response.refused,
                timer.elapsed(),
            );
            Ok(Json(response))
        }
        Err(e) => {
            warn!(code = e.code(), error = %e, "Query failed");
            state.metrics.record_failure(e.code(), timer.elapsed());
            Err(ApiError::Query(e))
        }
    }
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let neo4j = match state.graph.run(neo4rs::query("RETURN 1")).await {
        Ok(_) => "ok".to_string(),
        Err(e) => format!("error: {}", e),
    };

    let tags_url = format!("{}/api/tags", state.config.ollama.base_url.trim_end_matches('/'));
    let ollama = match reqwest::get(&tags_url).await {
        Ok(resp) if resp.status().is_success() => "ok".to_string(),
        Ok(resp) => format!("error: status {}", resp.status()),
        Err(e) => format!("error: {}", e),
    };

    let status = if neo4j == "ok" && ollama == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(HealthResponse { neo4j, ollama }))
}

async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(
        state
            .metrics
            .snapshot(state.model_cache.stats().tenants_cached),
    )
}
