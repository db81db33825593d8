/// HTTP API Layer
///
/// REST endpoints for workflow management, execution triggering, scheduling
/// and the live event stream. Every request is scoped to an organization
/// resolved from the `x-organization-id` header.

// Workflow definition endpoints (POST/GET/PUT/DELETE + duplicate)
pub mod workflows;

// Execution, run-history and scheduling endpoints
pub mod triggers;

// Server-sent event stream
pub mod events;

use crate::realtime::EventBroadcaster;
use crate::runtime::{SchedulerService, WorkflowExecutor};
use crate::workflow::registry::WorkflowRegistry;
use crate::workflow::storage::EngineStorage;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use serde_json::{json, Value};
use std::sync::Arc;

pub use events::create_event_routes;
pub use triggers::create_trigger_routes;
pub use workflows::create_workflow_routes;

/// Organization assumed when the caller sends no header
pub const DEFAULT_ORGANIZATION: &str = "default";

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    /// Durable store for workflows, runs and schedules
    pub storage: EngineStorage,
    /// Hot-reload registry for in-memory workflows
    pub registry: Arc<WorkflowRegistry>,
    /// Run orchestrator
    pub executor: Arc<WorkflowExecutor>,
    /// Background sweep service
    pub scheduler: Arc<SchedulerService>,
    /// Live event hub for the SSE stream
    pub broadcaster: Arc<EventBroadcaster>,
    /// Shared secret gating the manual sweep endpoint, when configured
    pub sweep_secret: Option<String>,
}

/// JSON error responses: `(status, {"error": "..."})`
pub type ApiError = (StatusCode, Json<Value>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

/// Resolve the caller's organization from the request headers
///
/// A missing or non-UTF-8 header falls back to the default organization
/// rather than rejecting the request.
pub fn organization_id(headers: &HeaderMap) -> String {
    headers
        .get("x-organization-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_ORGANIZATION)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn organization_falls_back_to_default() {
        let headers = HeaderMap::new();
        assert_eq!(organization_id(&headers), "default");

        let mut headers = HeaderMap::new();
        headers.insert("x-organization-id", HeaderValue::from_static(""));
        assert_eq!(organization_id(&headers), "default");
    }

    #[test]
    fn organization_header_is_honored() {
        let mut headers = HeaderMap::new();
        headers.insert("x-organization-id", HeaderValue::from_static("org-42"));
        assert_eq!(organization_id(&headers), "org-42");
    }
}
