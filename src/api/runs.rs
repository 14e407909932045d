/// Run control REST API endpoints
///
/// Starting runs, reading and setting pause/stop run states (per workflow
/// and per global group key), and scale-group capacity management.

use crate::api::AppState;
use crate::runtime::coordinator::RunStateCoordinator;
use crate::runtime::engine::RunOptions;
use crate::runtime::error::EngineError;
use crate::workflow::types::RunState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Request body for starting a run
#[derive(Debug, Deserialize)]
pub struct StartRunRequest {
    #[serde(default = "default_loop_count")]
    pub loop_count: u32,
    #[serde(default)]
    pub global_key: Option<String>,
    /// Supply to reuse an orchestrator instance id (singleton semantics)
    #[serde(default)]
    pub instance_id: Option<String>,
}

fn default_loop_count() -> u32 {
    1
}

/// Response for a started run
#[derive(Debug, Serialize)]
pub struct StartRunResponse {
    pub workflow: String,
    pub instance_id: String,
    pub loop_count: u32,
}

/// Request body for setting a run state
#[derive(Debug, Deserialize)]
pub struct SetRunStateRequest {
    pub state: RunState,
}

/// Request body for setting scale-group capacity
#[derive(Debug, Deserialize)]
pub struct SetCapacityRequest {
    /// Maximum concurrent instances; 0 means unlimited
    pub max: u32,
}

/// Create run control routes
pub fn create_run_routes() -> Router<AppState> {
    Router::new()
        .route("/api/runs/{workflow}", post(start_run))
        .route(
            "/api/runstate/workflow/{name}",
            get(get_workflow_runstate).put(set_workflow_runstate),
        )
        .route(
            "/api/runstate/group/{key}",
            get(get_group_runstate).put(set_group_runstate),
        )
        .route(
            "/api/scalegroups/{id}",
            get(get_scale_group).put(set_scale_group),
        )
}

/// Start a workflow run in the background
///
/// POST /api/runs/:workflow
/// Body: { "loop_count": 3, "global_key": "batch-7" }
async fn start_run(
    State(state): State<AppState>,
    Path(workflow): Path<String>,
    Json(request): Json<StartRunRequest>,
) -> Result<Json<StartRunResponse>, (StatusCode, Json<Value>)> {
    let loop_count = request.loop_count;
    let options = RunOptions {
        loop_count,
        global_key: request.global_key,
        instance_id: request.instance_id,
    };

    match state.engine.start(&workflow, options) {
        Ok(instance_id) => {
            tracing::info!("🔥 Started run of workflow '{}' ({})", workflow, instance_id);
            Ok(Json(StartRunResponse {
                workflow,
                instance_id,
                loop_count,
            }))
        }
        Err(EngineError::WorkflowNotFound(_)) => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("workflow '{workflow}' not found") })),
        )),
        Err(e) => {
            tracing::error!("Failed to start run of '{}': {}", workflow, e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            ))
        }
    }
}

/// GET /api/runstate/workflow/:name
async fn get_workflow_runstate(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    read_runstate(&state, RunStateCoordinator::workflow_key(&name)).await
}

/// PUT /api/runstate/workflow/:name
/// Body: { "state": "paused" }
async fn set_workflow_runstate(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<SetRunStateRequest>,
) -> Result<Json<Value>, StatusCode> {
    write_runstate(&state, RunStateCoordinator::workflow_key(&name), request.state).await
}

/// GET /api/runstate/group/:key
async fn get_group_runstate(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    read_runstate(&state, RunStateCoordinator::group_key(&key)).await
}

/// PUT /api/runstate/group/:key
async fn set_group_runstate(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<SetRunStateRequest>,
) -> Result<Json<Value>, StatusCode> {
    write_runstate(&state, RunStateCoordinator::group_key(&key), request.state).await
}

async fn read_runstate(state: &AppState, key: String) -> Result<Json<Value>, StatusCode> {
    match state.store.run_state(&key).await {
        Ok(run_state) => Ok(Json(json!({ "state": run_state }))),
        Err(e) => {
            tracing::error!("Failed to read run state '{}': {}", key, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn write_runstate(
    state: &AppState,
    key: String,
    run_state: RunState,
) -> Result<Json<Value>, StatusCode> {
    match state.store.set_run_state(&key, run_state).await {
        Ok(()) => {
            tracing::info!("📊 Run state '{}' set to {:?}", key, run_state);
            Ok(Json(json!({ "state": run_state })))
        }
        Err(e) => {
            tracing::error!("Failed to set run state '{}': {}", key, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /api/scalegroups/:id
async fn get_scale_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    match state.store.capacity(&id).await {
        Ok(max) => Ok(Json(json!({ "id": id, "max": max }))),
        Err(e) => {
            tracing::error!("Failed to read scale group '{}': {}", id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// PUT /api/scalegroups/:id
/// Body: { "max": 4 }
async fn set_scale_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SetCapacityRequest>,
) -> Result<Json<Value>, StatusCode> {
    match state.store.set_capacity(&id, request.max).await {
        Ok(()) => {
            tracing::info!("📊 Scale group '{}' capacity set to {}", id, request.max);
            Ok(Json(json!({ "id": id, "max": request.max })))
        }
        Err(e) => {
            tracing::error!("Failed to set scale group '{}': {}", id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
