// src/api.rs
//
// HTTP control surface: thin handlers over the task registry. Everything
// else (validation, lifecycle, counters) lives in the task module.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::error::MonitorError;
use crate::task::{RegistryOverview, TaskConfig, TaskId, TaskRegistry, TaskSnapshot, TaskState};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TaskRegistry>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(registry: Arc<TaskRegistry>) -> Self {
        Self {
            registry,
            started_at: Instant::now(),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/monitor/start", post(start_task))
        .route("/monitor/status/{id}", get(task_status))
        .route("/monitor/stop/{id}", post(stop_task))
        .route("/monitor/overview", get(overview))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: f64,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs_f64(),
    })
}

#[derive(Serialize)]
struct StartResponse {
    task_id: TaskId,
    state: TaskState,
    started_at: DateTime<Utc>,
}

async fn start_task(
    State(state): State<AppState>,
    Json(cfg): Json<TaskConfig>,
) -> Result<Json<StartResponse>, MonitorError> {
    let task_id = state.registry.start(cfg).await?;
    let snapshot = state.registry.status(&task_id.to_string())?;
    Ok(Json(StartResponse {
        task_id,
        state: snapshot.state,
        started_at: snapshot.created_at,
    }))
}

async fn task_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskSnapshot>, MonitorError> {
    Ok(Json(state.registry.status(&id)?))
}

#[derive(Serialize)]
struct StopResponse {
    task_id: TaskId,
    state: TaskState,
    stopped_at: DateTime<Utc>,
}

async fn stop_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StopResponse>, MonitorError> {
    let snapshot = state.registry.stop(&id)?;
    Ok(Json(StopResponse {
        task_id: snapshot.task_id,
        state: snapshot.state,
        stopped_at: Utc::now(),
    }))
}

async fn overview(State(state): State<AppState>) -> Json<RegistryOverview> {
    Json(state.registry.overview())
}
