use std::net::SocketAddr;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use conveyor_core::error::QueueError;
use conveyor_core::queue::{self, TaskCreate, TaskUpdate, lifecycle};
use conveyor_core::reaper::{self, ReaperConfig};
use conveyor_core::worker;
use conveyor_db::models::{Task, TaskStatus, Worker};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{err:#}"),
        }
    }
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Validation(msg) => Self::bad_request(msg),
            QueueError::NotFound { .. } => Self::not_found(err.to_string()),
            // Denied transitions surface as 404 for API uniformity.
            QueueError::Conflict { .. } => Self::not_found(err.to_string()),
            QueueError::Store(e) => Self::internal(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub items: Vec<Task>,
    pub total: i64,
}

#[derive(Debug, Deserialize)]
pub struct WorkerCreateRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct WorkerStatusRequest {
    pub status: String,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(pool: PgPool) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/api/tasks/", post(create_task).get(list_tasks))
        .route(
            "/api/tasks/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/api/tasks/{id}/pause", patch(pause_task))
        .route("/api/tasks/{id}/resume", patch(resume_task))
        .route("/api/workers/", post(create_worker))
        .route("/api/workers/{id}", get(get_worker))
        .route("/api/workers/{id}/heartbeat", patch(worker_heartbeat))
        .route("/api/workers/{id}/status", patch(set_worker_status))
        .layer(CorsLayer::permissive())
        .with_state(pool)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Run the control-plane server and the recovery reaper until Ctrl+C.
pub async fn run_serve(pool: PgPool, bind: &str, port: u16) -> Result<()> {
    let shutdown = CancellationToken::new();
    let reaper_handle = tokio::spawn(reaper::run(
        pool.clone(),
        ReaperConfig::from_env(),
        shutdown.clone(),
    ));

    let app = build_router(pool);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("conveyor serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    let _ = reaper_handle.await;
    tracing::info!("conveyor serve shut down");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    shutdown.cancel();
}

// ---------------------------------------------------------------------------
// Task handlers
// ---------------------------------------------------------------------------

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn create_task(
    State(pool): State<PgPool>,
    Json(input): Json<TaskCreate>,
) -> Result<impl IntoResponse, AppError> {
    let task = queue::create_task(&pool, input).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn list_tasks(
    State(pool): State<PgPool>,
    Query(params): Query<ListParams>,
) -> Result<Json<TaskListResponse>, AppError> {
    let skip = params.skip.unwrap_or(0);
    let limit = params.limit.unwrap_or(queue::DEFAULT_LIST_LIMIT);

    let (items, total) = match params.status.as_deref() {
        Some(raw) => {
            let status: TaskStatus = raw
                .to_lowercase()
                .parse()
                .map_err(|_| AppError::bad_request(format!("invalid status: {raw}")))?;
            let items = queue::list_tasks_by_status(&pool, status, skip, limit).await?;
            let total = queue::count_tasks_by_status(&pool, status).await?;
            (items, total)
        }
        None => {
            let items = queue::list_tasks(&pool, skip, limit).await?;
            let total = queue::count_tasks(&pool).await?;
            (items, total)
        }
    };

    Ok(Json(TaskListResponse { items, total }))
}

async fn get_task(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, AppError> {
    let task = queue::get_task(&pool, id).await?;
    Ok(Json(task))
}

async fn update_task(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(patch): Json<TaskUpdate>,
) -> Result<Json<Task>, AppError> {
    let task = queue::update_task(&pool, id, patch).await?;
    Ok(Json(task))
}

async fn delete_task(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    queue::delete_task(&pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn pause_task(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, AppError> {
    let task = lifecycle::pause_task(&pool, id).await?;
    Ok(Json(task))
}

async fn resume_task(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, AppError> {
    let task = lifecycle::resume_task(&pool, id).await?;
    Ok(Json(task))
}

// ---------------------------------------------------------------------------
// Worker handlers
// ---------------------------------------------------------------------------

async fn create_worker(
    State(pool): State<PgPool>,
    Json(input): Json<WorkerCreateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let worker = worker::register_worker(&pool, &input.name).await?;
    Ok((StatusCode::CREATED, Json(worker)))
}

async fn get_worker(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> Result<Json<Worker>, AppError> {
    let worker = worker::get_worker(&pool, id).await?;
    Ok(Json(worker))
}

async fn worker_heartbeat(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> Result<Json<Worker>, AppError> {
    let worker = worker::update_heartbeat(&pool, id).await?;
    Ok(Json(worker))
}

async fn set_worker_status(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(input): Json<WorkerStatusRequest>,
) -> Result<Json<Worker>, AppError> {
    let worker = worker::set_worker_status(&pool, id, &input.status).await?;
    Ok(Json(worker))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
