//! HTTP gateway: job submission, per-job SSE streams and prompt documents.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, Sse},
    routing::{get, post},
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AsgaConfig;
use crate::contracts::FeatureRequest;
use crate::error::AsgaError;
use crate::jobs::{JobInfo, JobManager};
use crate::validation::is_plain_name;
use crate::workflow::WorkflowEngine;

/// Shared state behind every route.
pub struct GatewayState {
    pub jobs: JobManager,
    pub prompt_dir: PathBuf,
}

impl GatewayState {
    pub fn new(jobs: JobManager, prompt_dir: impl Into<PathBuf>) -> Self {
        Self {
            jobs,
            prompt_dir: prompt_dir.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateJobRequest {
    user_story: String,
}

#[derive(Debug, Serialize)]
struct CreateJobResponse {
    job_id: Uuid,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    live_jobs: usize,
}

/// Error response structure.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(err: AsgaError) -> ApiError {
    let (status, code) = match &err {
        AsgaError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        AsgaError::Gone(_) => (StatusCode::GONE, "GONE"),
        AsgaError::AlreadySubscribed(_) => (StatusCode::CONFLICT, "ALREADY_SUBSCRIBED"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            code: code.to_string(),
        }),
    )
}

/// Build the router with all endpoints.
pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/jobs", post(create_job))
        .route("/jobs/{job_id}", get(stream_job))
        .route("/jobs/{job_id}/status", get(job_status))
        .route("/prompt/{name}", get(get_prompt))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind `host:port` from `config` and serve until Ctrl-C.
pub async fn serve(config: &AsgaConfig, engine: Arc<WorkflowEngine>) -> anyhow::Result<()> {
    let jobs = JobManager::new(engine, Duration::from_secs(config.job_retention_secs));
    let state = Arc::new(GatewayState::new(jobs, config.prompt_dir.clone()));

    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?;
    info!(addr = %listener.local_addr()?, "gateway listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

/// Start a workflow run; never waits for it.
async fn create_job(
    State(state): State<Arc<GatewayState>>,
    Json(body): Json<CreateJobRequest>,
) -> Json<CreateJobResponse> {
    let job_id = state.jobs.start(FeatureRequest::new(body.user_story));
    Json(CreateJobResponse { job_id })
}

fn parse_job_id(job_id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(job_id).map_err(|_| api_error(AsgaError::NotFound(job_id.to_string())))
}

/// One `data:` frame per stage event; the response ends with the job.
async fn stream_job(
    State(state): State<Arc<GatewayState>>,
    Path(job_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let id = parse_job_id(&job_id)?;
    let subscription = state.jobs.subscribe(id).map_err(api_error)?;
    Ok(Sse::new(
        subscription.map(|event| Event::default().json_data(event)),
    ))
}

/// Status, outcome and timestamps; does not claim the stream.
async fn job_status(
    State(state): State<Arc<GatewayState>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobInfo>, ApiError> {
    let id = parse_job_id(&job_id)?;
    state.jobs.info(id).map(Json).map_err(api_error)
}

async fn get_prompt(
    State(state): State<Arc<GatewayState>>,
    Path(name): Path<String>,
) -> Result<String, ApiError> {
    if !is_plain_name(&name) {
        return Err(api_error(AsgaError::NotFound(format!("prompt `{name}`"))));
    }
    let path = state.prompt_dir.join(format!("{name}.md"));
    match tokio::fs::read_to_string(&path).await {
        Ok(text) => Ok(text),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Err(api_error(AsgaError::NotFound(format!("prompt `{name}`"))))
        }
        Err(err) => Err(api_error(err.into())),
    }
}

async fn health_check(State(state): State<Arc<GatewayState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        live_jobs: state.jobs.live_jobs(),
    })
}
