/// Execution, run-history and scheduling endpoints
///
/// On-demand execution drives the run to completion before responding; the
/// schedule endpoints only persist intent, execution happens in a later
/// sweep. The manual sweep entrypoint lets an external cron drive the
/// scheduler where the process itself is short-lived.

use crate::api::{api_error, organization_id, ApiError, AppState};
use crate::workflow::types::{parse_timestamp, ScheduleStatus, ScheduledWorkflow};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

/// Request body for on-demand execution
#[derive(Debug, Default, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub payload: Option<Value>,
    /// Override the entry points with a single start node
    #[serde(default)]
    pub start_node: Option<String>,
}

/// Request body for schedule creation
#[derive(Debug, Deserialize)]
pub struct CreateScheduleRequest {
    pub workflow_id: String,
    pub scheduled_at: String,
    #[serde(default)]
    pub payload: Option<Value>,
}

/// Create execution and scheduling routes
pub fn create_trigger_routes() -> Router<AppState> {
    Router::new()
        .route("/api/workflows/{id}/execute", post(execute_workflow))
        .route("/api/workflows/{id}/runs", get(list_runs))
        .route("/api/runs/{id}", get(get_run))
        .route("/api/schedules", post(create_schedule))
        .route("/api/schedules", get(list_schedules))
        .route("/api/schedules/{id}/cancel", post(cancel_schedule))
        .route("/api/scheduler/sweep", post(trigger_sweep))
}

/// Execute a workflow now
///
/// POST /api/workflows/{id}/execute
/// Body: { "payload": {...}?, "start_node": "..."? }
/// Returns: { "run_id": "..." } once the run has reached a terminal status.
async fn execute_workflow(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Option<Json<ExecuteRequest>>,
) -> Result<Json<Value>, ApiError> {
    let org = organization_id(&headers);
    let request = body.map(|Json(r)| r).unwrap_or_default();

    let run_id = state
        .executor
        .execute(&id, &org, request.payload, request.start_node.as_deref())
        .await
        .map_err(|e| {
            // Executor validation failures (unknown id, disabled, bad start
            // node) happen before any run row exists.
            tracing::warn!("⚠️ Execution rejected for {}: {}", id, e);
            api_error(StatusCode::BAD_REQUEST, e.to_string())
        })?;

    Ok(Json(json!({ "run_id": run_id })))
}

/// List runs of a workflow, newest first
///
/// GET /api/workflows/{id}/runs
async fn list_runs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let org = organization_id(&headers);
    match state.storage.list_runs(&org, &id).await {
        Ok(runs) => Ok(Json(json!({ "runs": runs }))),
        Err(e) => {
            tracing::error!("❌ Failed to list runs: {}", e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage error"))
        }
    }
}

/// Fetch one run with its node results
///
/// GET /api/runs/{id}
async fn get_run(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let org = organization_id(&headers);

    let run = state.storage.get_run(&org, &id).await.map_err(|e| {
        tracing::error!("❌ Run lookup failed: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage error")
    })?;
    let Some(run) = run else {
        return Err(api_error(StatusCode::NOT_FOUND, "run not found"));
    };

    let node_results = state.storage.get_node_results(&id).await.map_err(|e| {
        tracing::error!("❌ Node result lookup failed: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage error")
    })?;

    Ok(Json(json!({ "run": run, "node_results": node_results })))
}

/// Create a deferred execution request
///
/// POST /api/schedules
/// Body: { "workflow_id": "...", "scheduled_at": "RFC3339", "payload": {...}? }
/// Returns: { "schedule_id": "..." }
async fn create_schedule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateScheduleRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let org = organization_id(&headers);

    let scheduled_at = parse_future_timestamp(&request.scheduled_at, Utc::now())
        .map_err(|message| api_error(StatusCode::BAD_REQUEST, message))?;

    // The target must exist in the caller's organization before any intent
    // is persisted.
    match state.storage.get_workflow(&request.workflow_id).await {
        Ok(Some(workflow)) if workflow.organization_id == org => {}
        Ok(_) => return Err(api_error(StatusCode::NOT_FOUND, "workflow not found")),
        Err(e) => {
            tracing::error!("❌ Workflow lookup failed: {}", e);
            return Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage error"));
        }
    }

    let schedule = ScheduledWorkflow {
        id: Uuid::new_v4().to_string(),
        workflow_id: request.workflow_id,
        organization_id: org,
        scheduled_at,
        payload: request.payload,
        status: ScheduleStatus::Pending,
        executed_at: None,
        run_id: None,
        error_message: None,
        created_at: Utc::now(),
    };

    state.storage.insert_schedule(&schedule).await.map_err(|e| {
        tracing::error!("❌ Failed to insert schedule: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage error")
    })?;

    tracing::info!(
        "📅 Scheduled workflow {} at {} (schedule {})",
        schedule.workflow_id,
        schedule.scheduled_at,
        schedule.id
    );

    Ok((StatusCode::CREATED, Json(json!({ "schedule_id": schedule.id }))))
}

/// List the organization's schedules, newest first
///
/// GET /api/schedules
async fn list_schedules(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let org = organization_id(&headers);
    match state.storage.list_schedules(&org).await {
        Ok(schedules) => Ok(Json(json!({ "schedules": schedules }))),
        Err(e) => {
            tracing::error!("❌ Failed to list schedules: {}", e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage error"))
        }
    }
}

/// Cancel a pending schedule
///
/// POST /api/schedules/{id}/cancel
///
/// Only PENDING entries can be cancelled; anything already claimed,
/// terminal or cancelled answers 409.
async fn cancel_schedule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let org = organization_id(&headers);

    match state.storage.get_schedule(&org, &id).await {
        Ok(Some(_)) => {}
        Ok(None) => return Err(api_error(StatusCode::NOT_FOUND, "schedule not found")),
        Err(e) => {
            tracing::error!("❌ Schedule lookup failed: {}", e);
            return Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage error"));
        }
    }

    let cancelled = state.storage.cancel_schedule(&org, &id).await.map_err(|e| {
        tracing::error!("❌ Failed to cancel schedule: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage error")
    })?;

    if !cancelled {
        return Err(api_error(
            StatusCode::CONFLICT,
            "schedule is no longer pending",
        ));
    }

    tracing::info!("🚫 Cancelled schedule {}", id);
    Ok(Json(json!({ "id": id, "status": ScheduleStatus::Cancelled })))
}

/// Run one sweep pass on demand
///
/// POST /api/scheduler/sweep
/// Requires `x-sweep-secret` when a secret is configured.
async fn trigger_sweep(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    if let Some(expected) = &state.sweep_secret {
        let provided = headers
            .get("x-sweep-secret")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if provided != expected {
            return Err(api_error(StatusCode::UNAUTHORIZED, "invalid sweep secret"));
        }
    }

    let summary = state.scheduler.sweep().await.map_err(|e| {
        tracing::error!("❌ Manual sweep failed: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "sweep failed")
    })?;

    Ok(Json(json!({
        "processed": summary.processed,
        "results": summary.results,
    })))
}

/// Parse a schedule timestamp and require it to be strictly in the future
fn parse_future_timestamp(raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, String> {
    let parsed =
        parse_timestamp(raw).map_err(|_| format!("invalid RFC3339 timestamp: {raw}"))?;
    if parsed <= now {
        return Err("scheduled_at must be in the future".to_string());
    }
    Ok(parsed)
}
