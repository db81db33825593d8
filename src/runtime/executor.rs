/// Workflow executor: orchestrates one run end to end
///
/// Creates the run record, walks the graph breadth-first via the graph
/// walker, dispatches node handlers through the registry under a deadline,
/// persists every node result, and emits progress events. A handler failure
/// is contained to its node: it blocks that node's outgoing edges but never
/// aborts sibling branches, and the run's aggregate status reflects it.

use crate::realtime::{EventBroadcaster, NodeStatusKind, RealtimeEvent};
use crate::runtime::handlers::HandlerRegistry;
use crate::runtime::walker::GraphWalker;
use crate::workflow::registry::WorkflowRegistry;
use crate::workflow::storage::EngineStorage;
use crate::workflow::types::{NodeExecutionContext, NodeResult, RunStatus, WorkflowRun};
use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Hard ceiling on node executions per run
///
/// The data model does not forbid cycles, so this bound is what guarantees
/// every run terminates. Exceeding it fails the run with a distinguished
/// error rather than hanging.
pub const MAX_NODE_EXECUTIONS: usize = 500;

/// Deadline wrapped around every handler invocation so one hung node cannot
/// stall a run indefinitely
const NODE_DEADLINE: Duration = Duration::from_secs(120);

/// Orchestrates workflow runs against the registry, handler map and store
pub struct WorkflowExecutor {
    registry: Arc<WorkflowRegistry>,
    handlers: Arc<HandlerRegistry>,
    storage: EngineStorage,
    broadcaster: Arc<EventBroadcaster>,
}

impl WorkflowExecutor {
    pub fn new(
        registry: Arc<WorkflowRegistry>,
        handlers: Arc<HandlerRegistry>,
        storage: EngineStorage,
        broadcaster: Arc<EventBroadcaster>,
    ) -> Self {
        Self {
            registry,
            handlers,
            storage,
            broadcaster,
        }
    }

    /// Execute a workflow and return the run id
    ///
    /// Validates that the workflow exists in the caller's organization and
    /// is enabled, then drives the run to a terminal status. The run record
    /// exists from the moment execution starts; progress is observable on
    /// the organization's event channel while this call is in flight.
    pub async fn execute(
        &self,
        workflow_id: &str,
        organization_id: &str,
        payload: Option<Value>,
        start_node: Option<&str>,
    ) -> Result<String> {
        let compiled = self
            .registry
            .get_workflow(workflow_id)
            .filter(|c| c.workflow.organization_id == organization_id)
            .ok_or_else(|| anyhow!("workflow not found: {}", workflow_id))?;

        if !compiled.workflow.enabled {
            bail!("workflow is disabled: {}", workflow_id);
        }

        let workflow = &compiled.workflow;
        let walker = GraphWalker::new(&workflow.nodes, &workflow.edges);
        let nodes_by_id: HashMap<&str, &crate::workflow::types::Node> =
            workflow.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        // Seed the queue: the explicitly requested start node, or every
        // entry point when none is specified.
        let mut queue: VecDeque<String> = match start_node {
            Some(start) => {
                if !nodes_by_id.contains_key(start) {
                    bail!("start node not found: {}", start);
                }
                VecDeque::from([start.to_string()])
            }
            None => {
                let entries = compiled.entry_node_ids.clone();
                if entries.is_empty() {
                    bail!("workflow has no entry node: {}", workflow_id);
                }
                entries.into()
            }
        };

        let run_id = uuid::Uuid::new_v4().to_string();
        let run = WorkflowRun {
            id: run_id.clone(),
            workflow_id: workflow_id.to_string(),
            organization_id: organization_id.to_string(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        };
        self.storage.create_run(&run).await?;

        tracing::info!("🚀 Starting run {} for workflow {}", run_id, workflow_id);
        self.broadcaster
            .broadcast(
                organization_id,
                RealtimeEvent::NewRun {
                    run_id: run_id.clone(),
                    workflow_id: workflow_id.to_string(),
                },
            )
            .await;

        let payload = payload.unwrap_or(Value::Null);
        let mut results: Vec<NodeResult> = Vec::new();
        let mut run_error: Option<String> = None;

        while let Some(node_id) = queue.pop_front() {
            if results.len() >= MAX_NODE_EXECUTIONS {
                run_error = Some(format!(
                    "node execution ceiling exceeded ({} nodes); check the graph for cycles",
                    MAX_NODE_EXECUTIONS
                ));
                tracing::error!("❌ Run {}: {}", run_id, run_error.as_deref().unwrap_or(""));
                break;
            }

            // An edge pointing at a node that was removed from the definition
            // mid-edit is a fatal authoring error, not a node failure.
            let Some(node) = nodes_by_id.get(node_id.as_str()) else {
                run_error = Some(format!("graph references unknown node: {}", node_id));
                break;
            };

            self.broadcaster
                .broadcast(
                    organization_id,
                    RealtimeEvent::NodeStatus {
                        run_id: run_id.clone(),
                        node_id: node_id.clone(),
                        status: NodeStatusKind::Running,
                        error: None,
                    },
                )
                .await;

            let ctx = NodeExecutionContext {
                run_id: run_id.clone(),
                workflow_id: workflow_id.to_string(),
                organization_id: organization_id.to_string(),
                payload: payload.clone(),
                previous_results: results.clone(),
            };

            let started = Instant::now();
            let outcome = match self.handlers.resolve(&node.node_type) {
                Some(handler) => {
                    match tokio::time::timeout(NODE_DEADLINE, handler.execute(&node.params, &ctx))
                        .await
                    {
                        Ok(Ok(output)) => Ok(output),
                        Ok(Err(e)) => Err(e.to_string()),
                        Err(_) => Err(format!(
                            "node timed out after {}s",
                            NODE_DEADLINE.as_secs()
                        )),
                    }
                }
                None => Err(format!(
                    "no handler registered for node type {:?}",
                    node.node_type
                )),
            };
            let duration_ms = started.elapsed().as_millis() as i64;

            let result = match outcome {
                Ok(output) => {
                    tracing::info!("✅ Node '{}' completed in {}ms", node_id, duration_ms);
                    NodeResult {
                        node_id: node_id.clone(),
                        success: true,
                        output: Some(output),
                        error: None,
                        duration_ms,
                    }
                }
                Err(error) => {
                    tracing::warn!("❌ Node '{}' failed in {}ms: {}", node_id, duration_ms, error);
                    NodeResult {
                        node_id: node_id.clone(),
                        success: false,
                        output: None,
                        error: Some(error),
                        duration_ms,
                    }
                }
            };

            self.storage
                .append_node_result(&run_id, results.len(), &result)
                .await?;
            self.broadcaster
                .broadcast(
                    organization_id,
                    RealtimeEvent::NodeStatus {
                        run_id: run_id.clone(),
                        node_id: node_id.clone(),
                        status: if result.success {
                            NodeStatusKind::Success
                        } else {
                            NodeStatusKind::Error
                        },
                        error: result.error.clone(),
                    },
                )
                .await;

            // A failed node blocks its own outgoing edges; sibling branches
            // already in the queue keep going.
            if result.success {
                for next in walker.next_nodes(&node_id, Some(&result)) {
                    queue.push_back(next);
                }
            }

            results.push(result);
        }

        let status = if run_error.is_some() || results.iter().any(|r| !r.success) {
            RunStatus::Failed
        } else {
            RunStatus::Success
        };

        // Terminal status is persisted before anything is emitted or
        // returned; a run is never left dangling in RUNNING.
        self.storage
            .finish_run(&run_id, status, run_error.as_deref())
            .await?;

        tracing::info!(
            "🎉 Run {} finished with status {} after {} node executions",
            run_id,
            status.as_str(),
            results.len()
        );

        self.broadcaster
            .broadcast(
                organization_id,
                RealtimeEvent::RunComplete {
                    run_id: run_id.clone(),
                    workflow_id: workflow_id.to_string(),
                    status,
                },
            )
            .await;
        if let Ok(stats) = self.storage.run_stats(organization_id).await {
            self.broadcaster
                .broadcast(organization_id, RealtimeEvent::StatsUpdate(stats))
                .await;
        }

        Ok(run_id)
    }
}
