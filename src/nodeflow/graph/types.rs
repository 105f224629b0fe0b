// SPDX-License-Identifier: MIT

//! Graph type definitions
//!
//! Nodes and edges are plain data. A run takes a snapshot of a [Graph]; the
//! engine never stores runtime handles on the node records themselves.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::adk::error::{EngineError, Result};

/// Kind of work a node performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    /// Seed or upstream value, optionally merged with an extra value
    Input,
    /// Model completion
    Model,
    /// Model completion restricted to one capability server
    ToolModel,
    /// Opaque nested graph
    SubGraph,
    /// Fire-and-forget hand-off to an interactive shell
    Command,
    /// Passthrough that publishes its value for display
    Display,
    /// Terminal passthrough
    Output,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Input => "input",
            NodeType::Model => "model",
            NodeType::ToolModel => "tool-model",
            NodeType::SubGraph => "sub-graph",
            NodeType::Command => "command",
            NodeType::Display => "display",
            NodeType::Output => "output",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific node configuration
///
/// Every field is optional; handlers report a configuration error when a
/// field they need is missing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct NodeConfig {
    /// Model reference (model and tool-model nodes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Capability server reference (tool-model nodes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    /// System instructions for model nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Sub-graph reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_graph: Option<String>,
    /// Program to dispatch (command nodes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Fixed arguments placed before the input (command nodes)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Externally supplied extra value (input nodes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
}

/// A node in the graph
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Node {
    /// Unique identifier for this node
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub config: NodeConfig,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            node_type,
            config: NodeConfig::default(),
        }
    }

    pub fn with_config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }
}

/// A directed data-flow link from `source`'s output to `target`'s input
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Edge {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub target: String,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("{}->{}", source, target),
            source,
            target,
        }
    }
}

/// The node set and edge set submitted to a run
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Graph {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; ids must be unique
    pub fn add_node(&mut self, node: Node) -> Result<()> {
        if self.contains(&node.id) {
            return Err(EngineError::graph(format!(
                "duplicate node id '{}'",
                node.id
            )));
        }
        self.nodes.push(node);
        Ok(())
    }

    /// Connect two existing nodes.
    ///
    /// Returns `false` when the pair is already connected.
    pub fn connect(&mut self, source: &str, target: &str) -> Result<bool> {
        if source == target {
            return Err(EngineError::graph(format!("self loop on '{}'", source)));
        }
        for id in [source, target] {
            if !self.contains(id) {
                return Err(EngineError::graph(format!("unknown node '{}'", id)));
            }
        }
        if self
            .edges
            .iter()
            .any(|e| e.source == source && e.target == target)
        {
            return Ok(false);
        }
        self.edges.push(Edge::new(source, target));
        Ok(true)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    /// Sub-graph references made by this graph's nodes
    pub fn sub_graph_refs(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .iter()
            .filter(|n| n.node_type == NodeType::SubGraph)
            .filter_map(|n| n.config.sub_graph.as_deref())
    }
}
