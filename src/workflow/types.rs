/// Core workflow type definitions
///
/// Defines the fundamental structures for workflows, runs, node results and
/// scheduled invocations. These types are serialized/deserialized from JSON
/// for persistence and for the HTTP API.

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A complete workflow definition containing nodes and their connections
///
/// Workflows are stored as JSON in SQLite and compiled into adjacency-indexed
/// graphs for execution. Every workflow is owned by exactly one organization;
/// the engine never reads or mutates across organization boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique workflow identifier (e.g., "wf-attendance-reminder")
    pub id: String,
    /// Owning organization identifier
    pub organization_id: String,
    /// Human-readable workflow name
    pub name: String,
    /// Disabled workflows are kept in storage but refuse execution
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// List of nodes in this workflow
    pub nodes: Vec<Node>,
    /// List of edges connecting nodes
    pub edges: Vec<Edge>,
}

fn default_enabled() -> bool {
    true
}

impl Workflow {
    /// Look up a node by its id
    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == node_id)
    }
}

/// A single automation step in the workflow graph
///
/// Each node has a type that determines its behavior and a params object for
/// type-specific configuration. Nodes are immutable once a run starts
/// consuming them: the executor reads a registry snapshot at run start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique node identifier within the workflow (e.g., "n1", "notify-late")
    pub id: String,
    /// The type of node which determines execution behavior
    pub node_type: NodeType,
    /// Node-specific configuration parameters as flexible JSON
    #[serde(default)]
    pub params: Value,
}

/// Closed set of supported automation actions
///
/// Dispatch goes through the handler registry; adding a node type means
/// adding a variant here plus a handler registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// Outbound HTTP call
    /// Expected params: { "url": "...", "method": "POST", "headers": {...}, "body": {...} }
    HttpRequest,

    /// Messaging-channel send (email/sms/whatsapp/slack/discord)
    /// Expected params: { "channel": "slack", "message": "...", "webhook_url": "..." }
    SendMessage,

    /// Pause the branch for a bounded duration
    /// Expected params: { "duration_ms": 5000 }
    Delay,

    /// Conditional branch producing a boolean decision
    /// Expected params: { "path": "$.ok" } or { "value": true }
    Condition,

    /// Attendance domain action
    /// Expected params: { "session_id": "...", "member_ids": [...], "status": "present" }
    RecordAttendance,

    /// Assignment domain action
    /// Expected params: { "title": "...", "assignee_ids": [...], "due_date": "..." }
    CreateAssignment,
}

/// Directed transition between two nodes
///
/// The optional `source_handle` discriminator ("true"/"false") is used by
/// condition nodes to select the outgoing path that matches their decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Source node ID
    pub source: String,
    /// Target node ID
    pub target: String,
    /// Branch tag for condition nodes; absent on ordinary edges
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
}

/// Lifecycle of one workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "PENDING",
            RunStatus::Running => "RUNNING",
            RunStatus::Success => "SUCCESS",
            RunStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(RunStatus::Pending),
            "RUNNING" => Some(RunStatus::Running),
            "SUCCESS" => Some(RunStatus::Success),
            "FAILED" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

/// One concrete execution instance of a workflow
///
/// Created at execution start, mutated only by the executor call driving it,
/// terminal once status reaches SUCCESS or FAILED. Runs are append-only
/// history and may outlive their workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: String,
    pub workflow_id: String,
    pub organization_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Run-level fatal error (node ceiling, walker escape); per-node errors
    /// live on the individual node results instead
    pub error: Option<String>,
}

/// Recorded outcome of one node within one run
///
/// Appended exactly once per node invocation. The list doubles as audit
/// history and as the `previous_results` context threaded into later nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResult {
    pub node_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: i64,
}

/// Lifecycle of a deferred invocation request
///
/// PENDING → EXECUTING (claim) → EXECUTED | FAILED. CANCELLED is only
/// reachable from PENDING. Once claimed, a schedule always reaches a
/// terminal state; it never silently vanishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScheduleStatus {
    Pending,
    Executing,
    Executed,
    Failed,
    Cancelled,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Pending => "PENDING",
            ScheduleStatus::Executing => "EXECUTING",
            ScheduleStatus::Executed => "EXECUTED",
            ScheduleStatus::Failed => "FAILED",
            ScheduleStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ScheduleStatus::Pending),
            "EXECUTING" => Some(ScheduleStatus::Executing),
            "EXECUTED" => Some(ScheduleStatus::Executed),
            "FAILED" => Some(ScheduleStatus::Failed),
            "CANCELLED" => Some(ScheduleStatus::Cancelled),
            _ => None,
        }
    }
}

/// A deferred, time-triggered request to execute a workflow once
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledWorkflow {
    pub id: String,
    pub workflow_id: String,
    pub organization_id: String,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    pub status: ScheduleStatus,
    pub executed_at: Option<DateTime<Utc>>,
    /// Run produced by the sweep, once the schedule has executed
    pub run_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Runtime context passed to every node handler invocation
///
/// Carries the trigger payload plus the accumulated results of all nodes
/// executed earlier in the same run.
#[derive(Debug, Clone)]
pub struct NodeExecutionContext {
    pub run_id: String,
    pub workflow_id: String,
    pub organization_id: String,
    /// Payload injected at trigger time (on-demand body or schedule payload)
    pub payload: Value,
    /// NodeResults recorded so far, in execution order
    pub previous_results: Vec<NodeResult>,
}

impl NodeExecutionContext {
    /// Output of the most recently executed node, if any
    pub fn last_output(&self) -> Option<&Value> {
        self.previous_results.iter().rev().find_map(|r| r.output.as_ref())
    }
}

/// Persisted timestamp format: RFC3339 with millisecond precision and a Z
/// suffix, so lexicographic comparison in SQL matches chronological order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_round_trips_through_json() {
        let workflow = Workflow {
            id: "wf-1".into(),
            organization_id: "org-a".into(),
            name: "Reminder".into(),
            enabled: true,
            nodes: vec![Node {
                id: "n1".into(),
                node_type: NodeType::Delay,
                params: serde_json::json!({ "duration_ms": 0 }),
            }],
            edges: vec![Edge {
                source: "n1".into(),
                target: "n2".into(),
                source_handle: Some("true".into()),
            }],
        };

        let json = serde_json::to_string(&workflow).unwrap();
        let back: Workflow = serde_json::from_str(&json).unwrap();
        assert_eq!(back.nodes[0].node_type, NodeType::Delay);
        assert_eq!(back.edges[0].source_handle.as_deref(), Some("true"));
    }

    #[test]
    fn enabled_defaults_to_true_when_missing() {
        let json = r#"{
            "id": "wf-2",
            "organization_id": "org-a",
            "name": "Minimal",
            "nodes": [],
            "edges": []
        }"#;
        let workflow: Workflow = serde_json::from_str(json).unwrap();
        assert!(workflow.enabled);
    }

    #[test]
    fn statuses_round_trip_through_strings() {
        for status in [
            RunStatus::Pending,
            RunStatus::Running,
            RunStatus::Success,
            RunStatus::Failed,
        ] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        for status in [
            ScheduleStatus::Pending,
            ScheduleStatus::Executing,
            ScheduleStatus::Executed,
            ScheduleStatus::Failed,
            ScheduleStatus::Cancelled,
        ] {
            assert_eq!(ScheduleStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RunStatus::parse("BOGUS"), None);
    }

    #[test]
    fn timestamps_compare_lexicographically() {
        let earlier = format_timestamp(Utc::now());
        let later = format_timestamp(Utc::now() + chrono::Duration::seconds(90));
        assert!(earlier < later);
        assert!(parse_timestamp(&earlier).is_ok());
    }
}
