//! HTTP API server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/search/add` | Index `{uuid, name, description}` |
//! | `POST` | `/api/search/query` | Similarity search `{query, top_k?}` |
//! | `POST` | `/api/search/query/artifacts` | Search and attach artifacts |
//! | `GET`  | `/api/search/health` | Health check |
//! | `GET`  | `/api/search/metrics` | Request counts per user, URL and status |
//!
//! Every route runs behind [`request_logging`], so responses always carry
//! `OSC-DM-Correlation-ID` and `OSC-DM-Username`.
//!
//! # Error Contract
//!
//! Handler failures return `500` with
//!
//! ```json
//! { "detail": "Unknown exception:<message>" }
//! ```

use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::artifacts::HttpArtifactLookup;
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::http_client::HttpClient;
use crate::index::SearchIndex;
use crate::loader::Loader;
use crate::middleware::{max_body_bytes, request_logging, HEADER_CORRELATION_ID};
use crate::models::{AddData, QueryData, SearchResponse};
use crate::registrar::HttpRegistrar;
use crate::state::{MetricsTable, StateRegistry, STATE_CONFIG, STATE_MAX_BODY_BYTES};
use crate::store::open_store;

pub const ENDPOINT_PREFIX: &str = "/api/search";

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub index: SearchIndex,
    pub state: Arc<StateRegistry>,
}

/// Builds the API router with CORS and the logging middleware installed.
///
/// The logging middleware is the outermost layer, so CORS preflight
/// answers are logged, counted and carry the trace headers too.
pub fn router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let registry = app_state.state.clone();
    let body_limit = max_body_bytes(&registry);

    Router::new()
        .route(&format!("{}/add", ENDPOINT_PREFIX), post(handle_add))
        .route(&format!("{}/query", ENDPOINT_PREFIX), post(handle_query))
        .route(
            &format!("{}/query/artifacts", ENDPOINT_PREFIX),
            post(handle_query_artifacts),
        )
        .route(&format!("{}/health", ENDPOINT_PREFIX), get(handle_health))
        .route(&format!("{}/metrics", ENDPOINT_PREFIX), get(handle_metrics))
        .with_state(app_state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(middleware::from_fn_with_state(registry, request_logging))
}

/// Starts the service: opens the index, spawns the registrar loader and
/// serves the API on `bind_addr` until Ctrl-C or SIGTERM.
pub async fn run_server(config: &Config, bind_addr: &str) -> Result<()> {
    let registry = Arc::new(StateRegistry::new());
    registry.set(STATE_CONFIG, config.clone());
    registry.set(STATE_MAX_BODY_BYTES, config.server.max_body_bytes);

    let http = HttpClient::new(&config.http)?;
    let store = open_store(&config.database).await?;
    let embedder = create_embedder(&config.embedding)?;
    let artifacts = Arc::new(HttpArtifactLookup::new(
        http.clone(),
        config.artifacts.clone(),
    ));
    let index = SearchIndex::new(store, embedder, artifacts);

    tracing::info!(
        collection = %config.database.collection_name,
        persist = config.database.persist,
        db_location = %config.database.db_location.display(),
        records = index.len().await?,
        "search index ready"
    );

    let token = CancellationToken::new();
    let loader = Loader::new(
        Arc::new(HttpRegistrar::new(http, config.registrar.clone())),
        index.clone(),
        Duration::from_secs(config.server.load_interval_seconds),
        config.registrar.skip_existing,
    );
    let loader_handle = loader.spawn(token.clone());

    let app = router(AppState {
        index,
        state: registry,
    });

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(%bind_addr, "START: service listening");

    let shutdown = token.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await?;

    token.cancel();
    if let Err(e) = loader_handle.await {
        tracing::error!(error = %e, "loader task failed");
    }

    tracing::info!(%bind_addr, "DONE: service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

/// Handler error that renders as `500 {"detail": "Unknown exception:<msg>"}`.
pub struct AppError {
    message: String,
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        let message = format!("Unknown exception:{}", err);
        tracing::error!("{}", message);
        Self { message }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                detail: self.message,
            }),
        )
            .into_response()
    }
}

// ============ Search ============

async fn handle_add(
    State(app): State<AppState>,
    Json(params): Json<AddData>,
) -> Result<StatusCode, AppError> {
    tracing::info!(uuid = %params.uuid, name = %params.name, "Received add request");
    app.index
        .add(&params.uuid, &params.name, &params.description)
        .await?;
    tracing::info!(uuid = %params.uuid, "data added");
    Ok(StatusCode::OK)
}

async fn handle_query(
    State(app): State<AppState>,
    Json(params): Json<QueryData>,
) -> Result<Json<SearchResponse>, AppError> {
    tracing::info!(query = %params.query, "Received query request");
    let data = app.index.search(&params.query, params.top_k).await?;
    Ok(Json(SearchResponse { data }))
}

async fn handle_query_artifacts(
    State(app): State<AppState>,
    headers: HeaderMap,
    Json(params): Json<QueryData>,
) -> Result<Json<SearchResponse>, AppError> {
    tracing::info!(query = %params.query, "Received artifact query request");
    let data = match headers
        .get(HEADER_CORRELATION_ID)
        .and_then(|v| v.to_str().ok())
    {
        Some(correlation_id) => {
            app.index
                .search_with_artifacts_correlated(&params.query, params.top_k, correlation_id)
                .await?
        }
        None => {
            app.index
                .search_with_artifacts(&params.query, params.top_k)
                .await?
        }
    };
    Ok(Json(SearchResponse { data }))
}

// ============ Monitor ============

#[derive(Serialize)]
struct HealthResponse {
    health: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        health: "OK".to_string(),
    })
}

#[derive(Serialize)]
struct MetricsResponse {
    metrics: MetricsTable,
}

async fn handle_metrics(State(app): State<AppState>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        metrics: app.state.metrics(),
    })
}
