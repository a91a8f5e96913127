//! # Execution Routing Table
//!
//! Tracks which nodes follow each node through execution edges.
//!
//! Each execution output pin can lead to several nodes, and one node can have
//! several execution outputs. Statement order in the generated code follows
//! the order in which the edges were declared, so the table keeps that order
//! instead of grouping by pin name.

use std::collections::{HashMap, HashSet};

use crate::error::{CodegenError, Result};
use crate::graph::GraphIr;

pub struct ExecutionRouting {
    /// source_node_id -> every target, in edge declaration order
    successors: HashMap<String, Vec<String>>,

    /// Nodes with at least one incoming execution edge
    targets: HashSet<String>,
}

impl ExecutionRouting {
    /// Build the routing table from the graph's execution edges.
    ///
    /// Fails when an edge names a node instance the graph does not contain.
    pub fn build_from_graph(graph: &GraphIr) -> Result<Self> {
        let node_ids: HashSet<&str> = graph.nodes.iter().map(|node| node.id.as_str()).collect();
        let mut successors: HashMap<String, Vec<String>> = HashMap::new();
        let mut targets = HashSet::new();

        for edge in &graph.execution_edges {
            for node_id in [&edge.source_node, &edge.target_node] {
                if !node_ids.contains(node_id.as_str()) {
                    return Err(CodegenError::UnknownNodeInstance {
                        node_id: node_id.clone(),
                    });
                }
            }

            tracing::trace!(
                "[ROUTING]   ({}, {}) -> {}",
                edge.source_node,
                edge.source_pin,
                edge.target_node
            );
            let next = successors.entry(edge.source_node.clone()).or_default();
            if !next.contains(&edge.target_node) {
                next.push(edge.target_node.clone());
            }
            targets.insert(edge.target_node.clone());
        }

        tracing::debug!(
            edges = graph.execution_edges.len(),
            sources = successors.len(),
            "[ROUTING] Built execution routing table"
        );

        Ok(ExecutionRouting { successors, targets })
    }

    /// Every node that directly follows `node_id`, in declaration order.
    pub fn successors(&self, node_id: &str) -> &[String] {
        self.successors
            .get(node_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Whether anything flows into `node_id`.
    pub fn has_incoming(&self, node_id: &str) -> bool {
        self.targets.contains(node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NodeCategory, NodeInstance};

    fn graph() -> GraphIr {
        let mut graph = GraphIr::new("routing");
        for id in ["start", "a", "b", "c"] {
            graph.add_node(NodeInstance::new(id, "t", id, NodeCategory::Operation));
        }
        graph.connect_exec("start", "then", "b");
        graph.connect_exec("start", "else", "a");
        graph.connect_exec("start", "then", "c");
        graph
    }

    #[test]
    fn test_repeated_edges_collapse() {
        let mut graph = graph();
        graph.connect_exec("start", "else", "b");
        let routing = ExecutionRouting::build_from_graph(&graph).unwrap();
        assert_eq!(routing.successors("start"), ["b", "a", "c"]);
        assert!(routing.successors("c").is_empty());
    }

    #[test]
    fn test_successors_keep_declaration_order() {
        let routing = ExecutionRouting::build_from_graph(&graph()).unwrap();
        assert_eq!(routing.successors("start"), ["b", "a", "c"]);
        assert!(routing.has_incoming("a"));
        assert!(!routing.has_incoming("start"));
    }

    #[test]
    fn test_unknown_node_in_edge() {
        let mut graph = graph();
        graph.connect_exec("start", "then", "ghost");
        assert!(matches!(
            ExecutionRouting::build_from_graph(&graph),
            Err(CodegenError::UnknownNodeInstance { node_id }) if node_id == "ghost"
        ));
    }
}
