// SPDX-License-Identifier: MIT

//! Dependency graph builder - converts node and edge lists into adjacency form

use std::collections::{BTreeSet, HashMap, HashSet};

use super::types::{Edge, Node};
use crate::adk::error::{EngineError, Result};

/// Adjacency view of a graph
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Node ids in submission order
    pub order: Vec<String>,
    /// For each node, the nodes whose output it reads (sorted)
    pub dependencies: HashMap<String, BTreeSet<String>>,
    /// For each node, the nodes that read its output (edge order)
    pub dependents: HashMap<String, Vec<String>>,
    /// Nodes with no dependencies, in submission order
    pub start_nodes: Vec<String>,
}

impl DependencyGraph {
    /// Dependencies of a node, in ascending id order
    pub fn dependencies_of(&self, id: &str) -> impl Iterator<Item = &String> {
        self.dependencies.get(id).into_iter().flatten()
    }

    /// Dependents of a node, in edge order
    pub fn dependents_of(&self, id: &str) -> &[String] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.dependencies.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// A non-empty graph without any start node can only be cyclic
    pub fn is_all_cyclic(&self) -> bool {
        !self.order.is_empty() && self.start_nodes.is_empty()
    }
}

/// Build the dependency view of `nodes` and `edges`.
///
/// Duplicate edges between the same pair are collapsed. Edges that reference
/// unknown nodes or loop on a single node are rejected.
pub fn build(nodes: &[Node], edges: &[Edge]) -> Result<DependencyGraph> {
    let mut graph = DependencyGraph::default();
    let mut seen = HashSet::new();

    for node in nodes {
        if !seen.insert(node.id.as_str()) {
            return Err(EngineError::graph(format!(
                "duplicate node id '{}'",
                node.id
            )));
        }
        graph.order.push(node.id.clone());
        graph.dependencies.insert(node.id.clone(), BTreeSet::new());
        graph.dependents.insert(node.id.clone(), Vec::new());
    }

    for edge in edges {
        for endpoint in [&edge.source, &edge.target] {
            if !seen.contains(endpoint.as_str()) {
                return Err(EngineError::graph(format!(
                    "edge '{}' references unknown node '{}'",
                    edge.id, endpoint
                )));
            }
        }
        if edge.source == edge.target {
            return Err(EngineError::graph(format!(
                "edge '{}' is a self loop on '{}'",
                edge.id, edge.source
            )));
        }

        let inserted = graph
            .dependencies
            .get_mut(&edge.target)
            .map(|deps| deps.insert(edge.source.clone()))
            .unwrap_or(false);
        if !inserted {
            log::debug!("Ignoring duplicate edge {}", edge.id);
            continue;
        }
        if let Some(dependents) = graph.dependents.get_mut(&edge.source) {
            dependents.push(edge.target.clone());
        }
    }

    graph.start_nodes = graph
        .order
        .iter()
        .filter(|id| graph.dependencies[*id].is_empty())
        .cloned()
        .collect();

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodeflow::graph::types::NodeType;

    fn nodes(ids: &[&str]) -> Vec<Node> {
        ids.iter().map(|id| Node::new(*id, NodeType::Display)).collect()
    }

    #[test]
    fn test_build_diamond() {
        let nodes = nodes(&["a", "b", "c", "d"]);
        let edges = vec![
            Edge::new("a", "b"),
            Edge::new("a", "c"),
            Edge::new("b", "d"),
            Edge::new("c", "d"),
        ];

        let graph = build(&nodes, &edges).unwrap();

        assert_eq!(graph.start_nodes, vec!["a"]);
        assert_eq!(graph.dependents_of("a"), ["b", "c"]);
        assert_eq!(
            graph.dependencies_of("d").cloned().collect::<Vec<_>>(),
            vec!["b", "c"]
        );
        assert!(!graph.is_all_cyclic());
    }

    #[test]
    fn test_dependencies_sorted_regardless_of_edge_order() {
        let nodes = nodes(&["z", "a", "out"]);
        let edges = vec![Edge::new("z", "out"), Edge::new("a", "out")];

        let graph = build(&nodes, &edges).unwrap();
        assert_eq!(
            graph.dependencies_of("out").cloned().collect::<Vec<_>>(),
            vec!["a", "z"]
        );
    }

    #[test]
    fn test_duplicate_edges_are_collapsed() {
        let nodes = nodes(&["a", "b"]);
        let mut dup = Edge::new("a", "b");
        dup.id = "other".to_string();
        let edges = vec![Edge::new("a", "b"), dup];

        let graph = build(&nodes, &edges).unwrap();
        assert_eq!(graph.dependents_of("a").len(), 1);
        assert_eq!(graph.dependencies_of("b").count(), 1);
    }

    #[test]
    fn test_dangling_edge_is_graph_error() {
        let nodes = nodes(&["a"]);
        let edges = vec![Edge::new("a", "ghost")];

        let result = build(&nodes, &edges);
        assert!(matches!(result, Err(EngineError::Graph(msg)) if msg.contains("ghost")));
    }

    #[test]
    fn test_self_loop_is_graph_error() {
        let nodes = nodes(&["a"]);
        let edges = vec![Edge::new("a", "a")];

        assert!(matches!(build(&nodes, &edges), Err(EngineError::Graph(_))));
    }

    #[test]
    fn test_all_cyclic_has_no_start_nodes() {
        let nodes = nodes(&["a", "b"]);
        let edges = vec![Edge::new("a", "b"), Edge::new("b", "a")];

        let graph = build(&nodes, &edges).unwrap();
        assert!(graph.start_nodes.is_empty());
        assert!(graph.is_all_cyclic());
    }

    #[test]
    fn test_build_does_not_mutate_inputs() {
        let nodes = nodes(&["a", "b"]);
        let edges = vec![Edge::new("a", "b")];
        let (nodes_before, edges_before) = (nodes.clone(), edges.clone());

        let _ = build(&nodes, &edges).unwrap();
        assert_eq!(nodes, nodes_before);
        assert_eq!(edges, edges_before);
    }
}
