/// Hot-reload workflow registry using ArcSwap
///
/// Provides lock-free, atomic updates to the in-memory workflow registry.
/// Each workflow update swaps the entire registry pointer, so concurrent
/// executions keep reading their snapshot while updates land instantly.

use crate::workflow::{storage::EngineStorage, types::Workflow};
use anyhow::{anyhow, Result};
use arc_swap::ArcSwap;
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::DiGraph;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

/// Lock-free registry of compiled workflows
///
/// The registry is the single in-memory source of truth for active
/// workflows; the executor reads a compiled snapshot at run start.
#[derive(Debug)]
pub struct WorkflowRegistry {
    /// Thread-safe atomic pointer to the workflow map
    workflows: ArcSwap<HashMap<String, CompiledWorkflow>>,

    /// Reference to persistent storage for reload operations
    storage: EngineStorage,
}

/// Compiled workflow with execution metadata
#[derive(Debug, Clone)]
pub struct CompiledWorkflow {
    /// Base workflow definition
    pub workflow: Workflow,

    /// Entry points: nodes that are no edge's target, in node array order.
    /// May be empty for purely cyclic graphs, which can only be started
    /// with an explicit start node.
    pub entry_node_ids: Vec<String>,
}

/// Compile a workflow and extract execution metadata
///
/// Validates the graph structure with petgraph: every edge must reference
/// known nodes and node ids must be unique. Cycles are not rejected — the
/// data model permits them and the executor bounds total node executions —
/// but they are logged, since they are almost always an authoring mistake.
pub fn compile_workflow(workflow: Workflow) -> Result<CompiledWorkflow> {
    let mut graph = DiGraph::<&str, ()>::new();
    let mut node_indices = HashMap::new();

    for node in &workflow.nodes {
        if node_indices.contains_key(node.id.as_str()) {
            return Err(anyhow!("duplicate node id: {}", node.id));
        }
        let index = graph.add_node(node.id.as_str());
        node_indices.insert(node.id.as_str(), index);
    }

    for edge in &workflow.edges {
        let source = node_indices
            .get(edge.source.as_str())
            .ok_or_else(|| anyhow!("edge references unknown node: {}", edge.source))?;
        let target = node_indices
            .get(edge.target.as_str())
            .ok_or_else(|| anyhow!("edge references unknown node: {}", edge.target))?;
        graph.add_edge(*source, *target, ());
    }

    if is_cyclic_directed(&graph) {
        tracing::warn!(
            "⚠️ Workflow '{}' contains a cycle; execution is bounded by the node ceiling",
            workflow.id
        );
    }

    let targets: HashSet<&str> = workflow.edges.iter().map(|e| e.target.as_str()).collect();
    let entry_node_ids: Vec<String> = workflow
        .nodes
        .iter()
        .filter(|node| !targets.contains(node.id.as_str()))
        .map(|node| node.id.clone())
        .collect();

    Ok(CompiledWorkflow {
        workflow,
        entry_node_ids,
    })
}

impl WorkflowRegistry {
    /// Create new registry instance with storage backend
    pub fn new(storage: EngineStorage) -> Self {
        Self {
            workflows: ArcSwap::new(Arc::new(HashMap::new())),
            storage,
        }
    }

    /// Initialize registry by loading all workflows from storage
    ///
    /// Called during application startup to populate the in-memory registry.
    pub async fn init_from_storage(&self) -> Result<()> {
        let stored_workflows = self.storage.load_all_workflows().await?;

        let mut compiled = HashMap::new();
        for (id, workflow) in stored_workflows {
            compiled.insert(id, compile_workflow(workflow)?);
        }

        // Atomic swap of the entire registry
        self.workflows.store(Arc::new(compiled));

        tracing::info!(
            "Initialized workflow registry with {} workflows",
            self.workflows.load().len()
        );

        Ok(())
    }

    /// Hot-reload a single workflow from storage
    ///
    /// Lock-free: clones the current map, inserts the recompiled entry and
    /// swaps the pointer. Concurrent executions keep their old snapshot.
    pub async fn reload_workflow(&self, workflow_id: &str) -> Result<()> {
        let workflow = self
            .storage
            .get_workflow(workflow_id)
            .await?
            .ok_or_else(|| anyhow!("workflow not found: {}", workflow_id))?;

        let compiled = compile_workflow(workflow)?;

        let current = self.workflows.load();
        let mut new_registry = (**current).clone();
        new_registry.insert(workflow_id.to_string(), compiled);
        self.workflows.store(Arc::new(new_registry));

        tracing::info!("Hot-reloaded workflow: {}", workflow_id);

        Ok(())
    }

    /// Get a workflow by ID (lock-free read)
    pub fn get_workflow(&self, workflow_id: &str) -> Option<CompiledWorkflow> {
        self.workflows.load().get(workflow_id).cloned()
    }

    /// List all active workflow IDs
    pub fn list_workflow_ids(&self) -> Vec<String> {
        self.workflows.load().keys().cloned().collect()
    }

    /// Remove a workflow from the registry
    pub fn remove_workflow(&self, workflow_id: &str) {
        let current = self.workflows.load();
        let mut new_registry = (**current).clone();

        if new_registry.remove(workflow_id).is_some() {
            self.workflows.store(Arc::new(new_registry));
            tracing::info!("Removed workflow from registry: {}", workflow_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::{Edge, Node, NodeType};
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    fn node(id: &str) -> Node {
        Node {
            id: id.into(),
            node_type: NodeType::Delay,
            params: json!({ "duration_ms": 0 }),
        }
    }

    fn edge(source: &str, target: &str) -> Edge {
        Edge {
            source: source.into(),
            target: target.into(),
            source_handle: None,
        }
    }

    fn workflow(nodes: Vec<Node>, edges: Vec<Edge>) -> Workflow {
        Workflow {
            id: "wf-1".into(),
            organization_id: "org-a".into(),
            name: "test".into(),
            enabled: true,
            nodes,
            edges,
        }
    }

    #[test]
    fn entry_points_are_nodes_without_incoming_edges() {
        let compiled = compile_workflow(workflow(
            vec![node("a"), node("b"), node("c"), node("d")],
            vec![edge("a", "c"), edge("b", "c"), edge("c", "d")],
        ))
        .unwrap();
        assert_eq!(compiled.entry_node_ids, vec!["a", "b"]);
    }

    #[test]
    fn unknown_edge_reference_is_rejected() {
        let err = compile_workflow(workflow(vec![node("a")], vec![edge("a", "ghost")]))
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn duplicate_node_ids_are_rejected() {
        let err = compile_workflow(workflow(vec![node("a"), node("a")], vec![])).unwrap_err();
        assert!(err.to_string().contains("duplicate node id"));
    }

    #[test]
    fn cyclic_workflow_compiles_with_no_entry_points() {
        let compiled = compile_workflow(workflow(
            vec![node("a"), node("b")],
            vec![edge("a", "b"), edge("b", "a")],
        ))
        .unwrap();
        assert!(compiled.entry_node_ids.is_empty());
    }

    #[tokio::test]
    async fn reload_and_remove_swap_the_registry() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let storage = EngineStorage::new(pool);
        storage.init_schema().await.unwrap();

        let registry = WorkflowRegistry::new(storage.clone());
        registry.init_from_storage().await.unwrap();
        assert!(registry.get_workflow("wf-1").is_none());

        storage
            .save_workflow(&workflow(vec![node("a")], vec![]))
            .await
            .unwrap();
        registry.reload_workflow("wf-1").await.unwrap();

        let compiled = registry.get_workflow("wf-1").unwrap();
        assert_eq!(compiled.entry_node_ids, vec!["a"]);

        registry.remove_workflow("wf-1");
        assert!(registry.get_workflow("wf-1").is_none());
    }
}
