/// Node handler registry and built-in handlers
///
/// Each node type maps to one handler through an explicit registry, instead
/// of type inspection at call sites. Handlers are pure with respect to the
/// engine: they receive the node params and the execution context, return a
/// JSON output on success and an error otherwise. The executor converts
/// errors into failed node results and wraps every invocation in a deadline,
/// so nothing here may crash or stall a run.

use crate::realtime::{EventBroadcaster, RealtimeEvent};
use crate::workflow::types::{NodeExecutionContext, NodeType};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::{collections::HashMap, sync::Arc, time::Duration};

/// Upper bound for a single delay node, so one node cannot hold a branch
/// anywhere near the executor's deadline
const MAX_DELAY_MS: u64 = 60_000;

/// Messaging channels the platform knows how to deliver to
const KNOWN_CHANNELS: &[&str] = &["email", "sms", "whatsapp", "slack", "discord"];

/// Contract for one node type's execution behavior
#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn execute(&self, params: &Value, ctx: &NodeExecutionContext) -> Result<Value>;
}

/// Explicit node-type → handler map
///
/// `resolve` returning None is reported by the executor as a failed node
/// result, never as a process crash.
pub struct HandlerRegistry {
    handlers: HashMap<NodeType, Arc<dyn NodeHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry with every built-in handler wired up
    pub fn with_builtins(broadcaster: Arc<EventBroadcaster>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let mut registry = Self::new();
        registry.register(
            NodeType::HttpRequest,
            Arc::new(HttpRequestHandler {
                client: client.clone(),
            }),
        );
        registry.register(
            NodeType::SendMessage,
            Arc::new(SendMessageHandler {
                client,
                broadcaster,
            }),
        );
        registry.register(NodeType::Delay, Arc::new(DelayHandler));
        registry.register(NodeType::Condition, Arc::new(ConditionHandler));
        registry.register(NodeType::RecordAttendance, Arc::new(RecordAttendanceHandler));
        registry.register(NodeType::CreateAssignment, Arc::new(CreateAssignmentHandler));
        registry
    }

    pub fn register(&mut self, node_type: NodeType, handler: Arc<dyn NodeHandler>) {
        self.handlers.insert(node_type, handler);
    }

    pub fn resolve(&self, node_type: &NodeType) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.get(node_type).cloned()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("missing required '{}' parameter", key))
}

/// Outbound HTTP call
///
/// Params: { "url", "method" (default GET), "headers": {..}, "body": {..} }
/// Output: { "status", "body" }
pub struct HttpRequestHandler {
    client: reqwest::Client,
}

#[async_trait]
impl NodeHandler for HttpRequestHandler {
    async fn execute(&self, params: &Value, _ctx: &NodeExecutionContext) -> Result<Value> {
        let url = required_str(params, "url")?;
        let method = params
            .get("method")
            .and_then(|v| v.as_str())
            .unwrap_or("GET")
            .to_uppercase();
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| anyhow!("unsupported HTTP method: {}", method))?;

        let mut request = self.client.request(method, url);
        if let Some(headers) = params.get("headers").and_then(|v| v.as_object()) {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(name, value);
                }
            }
        }
        if let Some(body) = params.get("body") {
            request = request.json(body);
        }

        let response = request.send().await.context("HTTP request failed")?;
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        if status >= 400 {
            bail!("HTTP request returned status {}", status);
        }

        Ok(json!({ "status": status, "body": body }))
    }
}

/// Messaging-channel send
///
/// The actual provider wire formats are external collaborators; delivery
/// goes through a per-workflow `webhook_url`. A channel with no configured
/// integration fails the node and surfaces an `integration-missing` event
/// so the dashboard can prompt the user to connect it.
pub struct SendMessageHandler {
    client: reqwest::Client,
    broadcaster: Arc<EventBroadcaster>,
}

#[async_trait]
impl NodeHandler for SendMessageHandler {
    async fn execute(&self, params: &Value, ctx: &NodeExecutionContext) -> Result<Value> {
        let channel = required_str(params, "channel")?;
        if !KNOWN_CHANNELS.contains(&channel) {
            bail!("unknown messaging channel: {}", channel);
        }
        let message = required_str(params, "message")?;

        let Some(webhook_url) = params.get("webhook_url").and_then(|v| v.as_str()) else {
            self.broadcaster
                .broadcast(
                    &ctx.organization_id,
                    RealtimeEvent::IntegrationMissing {
                        channel: channel.to_string(),
                    },
                )
                .await;
            bail!("no {} integration configured", channel);
        };

        let delivery = json!({
            "channel": channel,
            "to": params.get("to").cloned().unwrap_or(Value::Null),
            "text": message,
        });
        let response = self
            .client
            .post(webhook_url)
            .json(&delivery)
            .send()
            .await
            .with_context(|| format!("{} delivery failed", channel))?;

        if !response.status().is_success() {
            bail!("{} delivery returned status {}", channel, response.status().as_u16());
        }

        Ok(json!({ "channel": channel, "delivered": true }))
    }
}

/// Pause the branch for a bounded duration
pub struct DelayHandler;

#[async_trait]
impl NodeHandler for DelayHandler {
    async fn execute(&self, params: &Value, _ctx: &NodeExecutionContext) -> Result<Value> {
        let requested = params
            .get("duration_ms")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let duration_ms = requested.min(MAX_DELAY_MS);

        tokio::time::sleep(Duration::from_millis(duration_ms)).await;

        Ok(json!({ "delayed_ms": duration_ms }))
    }
}

/// Conditional branch decision
///
/// Either a literal { "value": bool } or a { "path": "$.field" } jsonpath
/// selector evaluated against the run payload. The output's `decision`
/// field drives the walker's branch-edge selection.
pub struct ConditionHandler;

#[async_trait]
impl NodeHandler for ConditionHandler {
    async fn execute(&self, params: &Value, ctx: &NodeExecutionContext) -> Result<Value> {
        let decision = if let Some(value) = params.get("value") {
            truthy(value)
        } else if let Some(path) = params.get("path").and_then(|v| v.as_str()) {
            let matches = jsonpath_lib::select(&ctx.payload, path)
                .map_err(|e| anyhow!("invalid condition path '{}': {}", path, e))?;
            matches.first().map(|v| truthy(v)).unwrap_or(false)
        } else {
            bail!("condition node requires a 'path' or 'value' parameter");
        };

        Ok(json!({ "decision": decision }))
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && s != "false",
        Value::Array(a) => !a.is_empty(),
        Value::Object(_) => true,
    }
}

/// Attendance domain action
///
/// Validates its params and produces a structured acknowledgement; the LMS
/// provider call itself is an external collaborator.
pub struct RecordAttendanceHandler;

#[async_trait]
impl NodeHandler for RecordAttendanceHandler {
    async fn execute(&self, params: &Value, _ctx: &NodeExecutionContext) -> Result<Value> {
        let session_id = required_str(params, "session_id")?;
        let member_ids = params
            .get("member_ids")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        let status = params
            .get("status")
            .and_then(|v| v.as_str())
            .unwrap_or("present");

        Ok(json!({
            "recorded": true,
            "session_id": session_id,
            "member_count": member_ids.len(),
            "status": status,
        }))
    }
}

/// Assignment domain action
pub struct CreateAssignmentHandler;

#[async_trait]
impl NodeHandler for CreateAssignmentHandler {
    async fn execute(&self, params: &Value, _ctx: &NodeExecutionContext) -> Result<Value> {
        let title = required_str(params, "title")?;
        let assignee_ids = params
            .get("assignee_ids")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(json!({
            "created": true,
            "title": title,
            "assignee_count": assignee_ids.len(),
            "due_date": params.get("due_date").cloned().unwrap_or(Value::Null),
        }))
    }
}
