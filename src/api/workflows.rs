/// Workflow management REST API endpoints
///
/// CRUD for workflow definitions with hot-reload: every successful change
/// lands in the store and the in-memory registry in the same request, and
/// emits the matching `workflow-*` event on the organization channel.

use crate::api::{api_error, organization_id, ApiError, AppState};
use crate::realtime::RealtimeEvent;
use crate::workflow::registry::compile_workflow;
use crate::workflow::types::Workflow;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

/// Response for workflow creation/update operations
#[derive(Debug, Serialize)]
pub struct WorkflowResponse {
    pub id: String,
    pub message: String,
}

/// Create workflow management routes
pub fn create_workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/api/workflows", post(create_workflow))
        .route("/api/workflows", get(list_workflows))
        .route("/api/workflows/{id}", get(get_workflow))
        .route("/api/workflows/{id}", put(update_workflow))
        .route("/api/workflows/{id}", delete(delete_workflow))
        .route("/api/workflows/{id}/duplicate", post(duplicate_workflow))
}

/// Validate a definition without mutating anything
///
/// Rejected definitions must leave no trace, so compilation runs before the
/// first write. Unknown node types are already rejected at deserialization.
fn validate_workflow(workflow: &Workflow) -> Result<(), ApiError> {
    if workflow.id.is_empty() || workflow.name.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "workflow id and name must be non-empty",
        ));
    }
    compile_workflow(workflow.clone())
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
    Ok(())
}

/// Persist + hot-reload, shared by every mutating endpoint
async fn save_and_reload(state: &AppState, workflow: &Workflow) -> Result<(), ApiError> {
    state.storage.save_workflow(workflow).await.map_err(|e| {
        tracing::error!("❌ Failed to save workflow: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to save workflow")
    })?;

    state.registry.reload_workflow(&workflow.id).await.map_err(|e| {
        tracing::error!("❌ Failed to reload workflow into registry: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to reload workflow")
    })?;

    Ok(())
}

/// Create a new workflow
///
/// POST /api/workflows
/// Body: the workflow definition (id, name, nodes, edges, enabled?)
async fn create_workflow(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut workflow): Json<Workflow>,
) -> Result<(StatusCode, Json<WorkflowResponse>), ApiError> {
    let org = organization_id(&headers);
    workflow.organization_id = org.clone();

    validate_workflow(&workflow)?;

    match state.storage.get_workflow(&workflow.id).await {
        Ok(Some(_)) => {
            return Err(api_error(StatusCode::CONFLICT, "workflow already exists"))
        }
        Ok(None) => {}
        Err(e) => {
            tracing::error!("❌ Workflow lookup failed: {}", e);
            return Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage error"));
        }
    }

    save_and_reload(&state, &workflow).await?;

    state
        .broadcaster
        .broadcast(&org, RealtimeEvent::WorkflowCreated { workflow_id: workflow.id.clone() })
        .await;

    tracing::info!("🔥 Created workflow: {} ({})", workflow.id, workflow.name);

    Ok((
        StatusCode::CREATED,
        Json(WorkflowResponse {
            id: workflow.id.clone(),
            message: format!("Workflow '{}' created successfully", workflow.name),
        }),
    ))
}

/// List the organization's workflows
///
/// GET /api/workflows
async fn list_workflows(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let org = organization_id(&headers);
    match state.storage.list_workflows(&org).await {
        Ok(workflows) => Ok(Json(json!({ "workflows": workflows }))),
        Err(e) => {
            tracing::error!("❌ Failed to list workflows: {}", e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage error"))
        }
    }
}

/// Fetch one workflow definition
///
/// GET /api/workflows/{id}
async fn get_workflow(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Workflow>, ApiError> {
    let org = organization_id(&headers);
    let workflow = fetch_org_workflow(&state, &org, &id).await?;
    Ok(Json(workflow))
}

/// Replace a workflow definition
///
/// PUT /api/workflows/{id}
async fn update_workflow(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(mut workflow): Json<Workflow>,
) -> Result<Json<WorkflowResponse>, ApiError> {
    let org = organization_id(&headers);

    // The stored row must already belong to the caller's organization.
    fetch_org_workflow(&state, &org, &id).await?;

    workflow.id = id;
    workflow.organization_id = org.clone();
    validate_workflow(&workflow)?;

    save_and_reload(&state, &workflow).await?;

    state
        .broadcaster
        .broadcast(&org, RealtimeEvent::WorkflowUpdated { workflow_id: workflow.id.clone() })
        .await;

    tracing::info!("🔄 Updated workflow: {} ({})", workflow.id, workflow.name);

    Ok(Json(WorkflowResponse {
        id: workflow.id.clone(),
        message: format!("Workflow '{}' updated successfully", workflow.name),
    }))
}

/// Delete a workflow definition
///
/// DELETE /api/workflows/{id}
///
/// Run history is kept; only the definition and its registry entry go away.
async fn delete_workflow(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let org = organization_id(&headers);

    let deleted = state.storage.delete_workflow(&org, &id).await.map_err(|e| {
        tracing::error!("❌ Failed to delete workflow: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage error")
    })?;

    if !deleted {
        return Err(api_error(StatusCode::NOT_FOUND, "workflow not found"));
    }

    state.registry.remove_workflow(&id);

    state
        .broadcaster
        .broadcast(&org, RealtimeEvent::WorkflowDeleted { workflow_id: id.clone() })
        .await;

    tracing::info!("🗑️ Deleted workflow: {}", id);

    Ok(Json(json!({ "id": id, "message": "Workflow deleted" })))
}

/// Duplicate a workflow under a fresh id
///
/// POST /api/workflows/{id}/duplicate
///
/// The copy starts disabled so it cannot fire until reviewed.
async fn duplicate_workflow(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<WorkflowResponse>), ApiError> {
    let org = organization_id(&headers);
    let source = fetch_org_workflow(&state, &org, &id).await?;

    let mut copy = source.clone();
    copy.id = Uuid::new_v4().to_string();
    copy.name = format!("{} (copy)", source.name);
    copy.enabled = false;

    save_and_reload(&state, &copy).await?;

    state
        .broadcaster
        .broadcast(&org, RealtimeEvent::WorkflowCreated { workflow_id: copy.id.clone() })
        .await;

    tracing::info!("📋 Duplicated workflow {} -> {}", id, copy.id);

    Ok((
        StatusCode::CREATED,
        Json(WorkflowResponse {
            id: copy.id,
            message: format!("Workflow '{}' duplicated", source.name),
        }),
    ))
}

/// Load a workflow and enforce organization ownership
async fn fetch_org_workflow(
    state: &AppState,
    org: &str,
    id: &str,
) -> Result<Workflow, ApiError> {
    match state.storage.get_workflow(id).await {
        Ok(Some(workflow)) if workflow.organization_id == org => Ok(workflow),
        // Cross-organization ids are indistinguishable from absent ones.
        Ok(_) => Err(api_error(StatusCode::NOT_FOUND, "workflow not found")),
        Err(e) => {
            tracing::error!("❌ Workflow lookup failed: {}", e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage error"))
        }
    }
}
