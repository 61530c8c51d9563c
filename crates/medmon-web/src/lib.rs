//! Axum HTTP surface: manual scrapes, project setup, analysis, reports, and health.

pub mod report;

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use medmon_storage::{MediaStore, StoreError};
use medmon_sync::{
    setup_project, AnalysisPipeline, PipelineError, ProjectSetupRequest, ScrapeError, Scraper,
    SetupError, WorkerRegistry,
};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

pub use report::{format_report, media_format, ReportRow};

pub const CRATE_NAME: &str = "medmon-web";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MediaStore>,
    pub scraper: Scraper,
    pub pipeline: AnalysisPipeline,
    pub workers: WorkerRegistry,
}

impl AppState {
    pub fn new(scraper: Scraper, pipeline: AnalysisPipeline, workers: WorkerRegistry) -> Self {
        Self {
            store: scraper.store().clone(),
            scraper,
            pipeline,
            workers,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Scrape(#[from] ScrapeError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Setup(#[from] SetupError),
}

fn store_status(err: &StoreError) -> StatusCode {
    if err.is_unavailable() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(err) => store_status(err),
            Self::Scrape(ScrapeError::SourceNotFound(_)) => StatusCode::NOT_FOUND,
            Self::Scrape(ScrapeError::MissingUrl(_)) => StatusCode::BAD_REQUEST,
            Self::Scrape(ScrapeError::Store(err)) => store_status(err),
            Self::Scrape(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Pipeline(PipelineError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Pipeline(PipelineError::Unlinked(_)) => StatusCode::BAD_REQUEST,
            Self::Pipeline(PipelineError::Store(err)) => store_status(err),
            Self::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Setup(SetupError::Invalid(_)) => StatusCode::BAD_REQUEST,
            Self::Setup(SetupError::Store(err)) => store_status(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(%status, error = %self, "request failed");
        }
        let detail = match (&self, status) {
            (_, StatusCode::SERVICE_UNAVAILABLE) => "database unavailable".to_string(),
            _ => self.to_string(),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/scrape/rss", post(scrape_rss_handler))
        .route("/scrape/run-all", get(run_all_handler))
        .route("/setup/project", post(setup_project_handler))
        .route("/process/media-item/{id}", post(process_item_handler))
        .route("/process/all", get(list_analyses_handler))
        .route("/project/{id}/reports", get(project_reports_handler))
        .layer(cors)
        .with_state(Arc::new(state))
}

/// Binds `0.0.0.0:port` and serves until `shutdown` resolves.
pub async fn serve<F>(state: AppState, port: u16, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;
    info!(port, "http server listening");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("http server failed")?;
    Ok(())
}

async fn index_handler() -> Json<Value> {
    Json(json!({ "message": "Media Monitoring Backend is running." }))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    let workers = state.workers.snapshot();
    let status = if state.workers.all_running() { "ok" } else { "degraded" };
    match state.store.ping().await {
        Ok(()) => Json(json!({
            "status": status,
            "database": "ok",
            "workers": workers,
        }))
        .into_response(),
        Err(err) => {
            warn!(error = %err, "health check: database unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unavailable",
                    "database": err.to_string(),
                    "workers": workers,
                })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScrapeQuery {
    project_id: Uuid,
    source_id: Uuid,
}

async fn scrape_rss_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ScrapeQuery>,
) -> ApiResult {
    let (source, feed_url) = state.scraper.resolve_source(query.source_id).await?;
    let outcome = state
        .scraper
        .scrape_rss(query.project_id, source.id, &feed_url)
        .await?;
    Ok(Json(json!({
        "status": "success",
        "source": source.name,
        "feed_url": feed_url,
        "new_items": outcome.new_items,
        "reused_items": outcome.reused_items,
        "items": outcome.items,
    })))
}

async fn run_all_handler(State(state): State<Arc<AppState>>) -> ApiResult {
    let report = state.scraper.run_all().await?;
    if report.total_sources == 0 {
        return Ok(Json(json!({
            "status": "empty",
            "message": "No media sources with a base_url found.",
        })));
    }
    Ok(Json(json!({
        "status": "ok",
        "total_sources": report.total_sources,
        "total_scrapes": report.runs.len(),
        "details": report.runs,
    })))
}

async fn setup_project_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ProjectSetupRequest>,
) -> ApiResult {
    let report = setup_project(&state.scraper, &request).await?;
    Ok(Json(json!({
        "status": "success",
        "project_id": report.project_id,
        "scraping": report.scraping,
    })))
}

async fn process_item_handler(
    State(state): State<Arc<AppState>>,
    Path(media_id): Path<Uuid>,
) -> ApiResult {
    let report = state.pipeline.process(media_id).await?;
    Ok(Json(json!({
        "status": "success",
        "media_id": report.media_id,
        "final_relevant": report.final_relevant,
        "per_project_results": report.per_project_results,
    })))
}

async fn list_analyses_handler(State(state): State<Arc<AppState>>) -> ApiResult {
    let items = state.store.list_analyses().await?;
    Ok(Json(json!({ "count": items.len(), "items": items })))
}

async fn project_reports_handler(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
) -> ApiResult {
    let details = state
        .store
        .project_details(project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("project {project_id} not found")))?;

    let mut rows = Vec::new();
    for item in state.store.project_items(project_id).await? {
        // items awaiting analysis are left out of the report
        if let Some(analysis) = state.store.latest_analysis(item.item.id, project_id).await? {
            rows.push(format_report(&item, &analysis, &details));
        }
    }

    Ok(Json(json!({
        "project_id": project_id,
        "count": rows.len(),
        "items": rows,
    })))
}
