/// Graph walker: computes which nodes run next
///
/// Pure graph logic with no state beyond the adjacency index, built once per
/// run from the edge list. Supports plain fan-out and conditional branch
/// edges; cycles are not detected here — the executor's node-execution
/// ceiling guarantees termination.

use crate::workflow::types::{Edge, Node, NodeResult};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Adjacency-indexed view of one workflow graph
#[derive(Debug)]
pub struct GraphWalker {
    /// source node id → outgoing (target, source_handle), in edge array order
    adjacency: HashMap<String, Vec<(String, Option<String>)>>,
    /// Node ids in definition order, for stable entry-point output
    node_order: Vec<String>,
    /// Every node id referenced as an edge target
    targets: HashSet<String>,
}

impl GraphWalker {
    /// Build the adjacency index once per run
    pub fn new(nodes: &[Node], edges: &[Edge]) -> Self {
        let mut adjacency: HashMap<String, Vec<(String, Option<String>)>> = HashMap::new();
        let mut targets = HashSet::new();

        for edge in edges {
            adjacency
                .entry(edge.source.clone())
                .or_default()
                .push((edge.target.clone(), edge.source_handle.clone()));
            targets.insert(edge.target.clone());
        }

        Self {
            adjacency,
            node_order: nodes.iter().map(|n| n.id.clone()).collect(),
            targets,
        }
    }

    /// Entry points: nodes that are no edge's target, in node array order
    pub fn entry_nodes(&self) -> Vec<String> {
        self.node_order
            .iter()
            .filter(|id| !self.targets.contains(id.as_str()))
            .cloned()
            .collect()
    }

    /// Next node ids to execute after `current`, given its result
    ///
    /// Ordinary nodes continue along every outgoing edge (parallel fan-out,
    /// edge array order). When any outgoing edge carries a branch handle the
    /// node is conditional: the boolean-like `decision` in the last output
    /// selects the matching "true"/"false" edges, untagged edges are always
    /// followed, and a decision with no matching edge terminates the branch
    /// without error.
    pub fn next_nodes(&self, current: &str, last_result: Option<&NodeResult>) -> Vec<String> {
        let Some(outgoing) = self.adjacency.get(current) else {
            return Vec::new();
        };

        let has_branches = outgoing.iter().any(|(_, handle)| handle.is_some());
        if !has_branches {
            return outgoing.iter().map(|(target, _)| target.clone()).collect();
        }

        let decision = last_result
            .and_then(|r| r.output.as_ref())
            .and_then(decision_value);

        outgoing
            .iter()
            .filter(|(_, handle)| match (handle, decision) {
                (None, _) => true,
                (Some(handle), Some(decision)) => handle == if decision { "true" } else { "false" },
                // No usable decision value: tagged edges terminate.
                (Some(_), None) => false,
            })
            .map(|(target, _)| target.clone())
            .collect()
    }
}

/// Extract a boolean-like decision from a conditional node's output
fn decision_value(output: &Value) -> Option<bool> {
    match output.get("decision")? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::NodeType;
    use serde_json::json;

    fn node(id: &str) -> Node {
        Node {
            id: id.into(),
            node_type: NodeType::Delay,
            params: Value::Null,
        }
    }

    fn edge(source: &str, target: &str) -> Edge {
        Edge {
            source: source.into(),
            target: target.into(),
            source_handle: None,
        }
    }

    fn branch(source: &str, target: &str, handle: &str) -> Edge {
        Edge {
            source: source.into(),
            target: target.into(),
            source_handle: Some(handle.into()),
        }
    }

    fn result_with_output(output: Value) -> NodeResult {
        NodeResult {
            node_id: "cond".into(),
            success: true,
            output: Some(output),
            error: None,
            duration_ms: 0,
        }
    }

    #[test]
    fn entry_nodes_follow_definition_order() {
        let nodes = vec![node("b"), node("a"), node("c")];
        let edges = vec![edge("b", "c")];
        let walker = GraphWalker::new(&nodes, &edges);
        assert_eq!(walker.entry_nodes(), vec!["b", "a"]);
    }

    #[test]
    fn plain_fan_out_preserves_edge_order() {
        let nodes = vec![node("a"), node("x"), node("y")];
        let edges = vec![edge("a", "y"), edge("a", "x")];
        let walker = GraphWalker::new(&nodes, &edges);
        assert_eq!(walker.next_nodes("a", None), vec!["y", "x"]);
    }

    #[test]
    fn leaf_node_has_no_continuation() {
        let walker = GraphWalker::new(&[node("a")], &[]);
        assert!(walker.next_nodes("a", None).is_empty());
    }

    #[test]
    fn true_decision_selects_only_the_true_edge() {
        let nodes = vec![node("cond"), node("yes"), node("no")];
        let edges = vec![branch("cond", "yes", "true"), branch("cond", "no", "false")];
        let walker = GraphWalker::new(&nodes, &edges);

        let result = result_with_output(json!({ "decision": true }));
        assert_eq!(walker.next_nodes("cond", Some(&result)), vec!["yes"]);

        let result = result_with_output(json!({ "decision": false }));
        assert_eq!(walker.next_nodes("cond", Some(&result)), vec!["no"]);
    }

    #[test]
    fn string_decisions_are_accepted() {
        let nodes = vec![node("cond"), node("yes")];
        let edges = vec![branch("cond", "yes", "true")];
        let walker = GraphWalker::new(&nodes, &edges);

        let result = result_with_output(json!({ "decision": "true" }));
        assert_eq!(walker.next_nodes("cond", Some(&result)), vec!["yes"]);
    }

    #[test]
    fn unmatched_handle_terminates_the_branch_without_error() {
        let nodes = vec![node("cond"), node("yes")];
        let edges = vec![branch("cond", "yes", "true")];
        let walker = GraphWalker::new(&nodes, &edges);

        let result = result_with_output(json!({ "decision": false }));
        assert!(walker.next_nodes("cond", Some(&result)).is_empty());
    }

    #[test]
    fn missing_decision_value_terminates_tagged_edges() {
        let nodes = vec![node("cond"), node("yes"), node("always")];
        let edges = vec![branch("cond", "yes", "true"), edge("cond", "always")];
        let walker = GraphWalker::new(&nodes, &edges);

        let result = result_with_output(json!({ "unrelated": 1 }));
        // The untagged edge still fires; the tagged one does not.
        assert_eq!(walker.next_nodes("cond", Some(&result)), vec!["always"]);
    }

    #[test]
    fn walker_is_deterministic_for_identical_inputs() {
        let nodes = vec![node("a"), node("b"), node("c")];
        let edges = vec![edge("a", "b"), edge("a", "c")];
        let first = GraphWalker::new(&nodes, &edges);
        let second = GraphWalker::new(&nodes, &edges);
        assert_eq!(first.next_nodes("a", None), second.next_nodes("a", None));
        assert_eq!(first.entry_nodes(), second.entry_nodes());
    }
}
