/// Workflow management REST API endpoints
///
/// CRUD operations for workflow definitions with hot-reload support: a
/// saved workflow is compiled and swapped into the registry immediately,
/// without affecting runs already in flight.

use crate::api::AppState;
use crate::workflow::types::Workflow;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};

/// Response for workflow save operations
#[derive(Debug, Serialize)]
pub struct WorkflowResponse {
    pub name: String,
    pub message: String,
}

/// Create workflow management routes
pub fn create_workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/api/workflows", get(list_workflows))
        .route(
            "/api/workflows/{name}",
            get(get_workflow).put(save_workflow).delete(delete_workflow),
        )
}

/// Save a workflow definition (create or update) and hot-reload it
///
/// PUT /api/workflows/:name
/// Body: { "name": "...", "steps": [...] }
async fn save_workflow(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(mut workflow): Json<Workflow>,
) -> Result<Json<WorkflowResponse>, (StatusCode, Json<Value>)> {
    // The URL is authoritative for the name
    workflow.name = name.clone();

    // Compile first so invalid graphs never reach storage
    if let Err(e) = state.registry.install(workflow.clone()) {
        tracing::warn!("Rejected workflow '{}': {}", name, e);
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": e.to_string() })),
        ));
    }

    if let Err(e) = state.storage.save_workflow(&workflow).await {
        tracing::error!("Failed to save workflow '{}': {}", name, e);
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "storage failure" })),
        ));
    }

    tracing::info!("🔥 Saved and hot-reloaded workflow: {}", name);

    Ok(Json(WorkflowResponse {
        name: name.clone(),
        message: format!("Workflow '{name}' saved"),
    }))
}

/// List all workflows
///
/// GET /api/workflows
async fn list_workflows(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    match state.storage.list_workflows().await {
        Ok(workflows) => Ok(Json(json!({ "workflows": workflows }))),
        Err(e) => {
            tracing::error!("Failed to list workflows: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Get a workflow definition by name
///
/// GET /api/workflows/:name
async fn get_workflow(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Workflow>, StatusCode> {
    match state.storage.get_workflow(&name).await {
        Ok(Some(workflow)) => Ok(Json(workflow)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to get workflow '{}': {}", name, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Delete a workflow
///
/// DELETE /api/workflows/:name
async fn delete_workflow(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    state.registry.remove(&name);

    match state.storage.delete_workflow(&name).await {
        Ok(true) => {
            tracing::info!("🗑️ Deleted workflow: {}", name);
            Ok(Json(json!({ "message": "Workflow deleted" })))
        }
        Ok(false) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to delete workflow '{}': {}", name, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
