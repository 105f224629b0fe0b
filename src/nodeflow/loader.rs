// SPDX-License-Identifier: MIT

//! Graph file loader - YAML documents used by the command line front end

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::adk::error::Result;
use crate::nodeflow::graph::{Edge, Graph, Node};
use crate::nodeflow::mcp::McpServerConfig;

fn default_provider() -> String {
    "openai".to_string()
}

/// Model reference as written in a graph file
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModelSpec {
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Provider-side model name
    pub model_name: String,
}

/// A graph file: the graph plus the collaborators it refers to
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub mcp_servers: Vec<McpServerConfig>,
    /// Reference name used by model nodes -> provider model
    #[serde(default)]
    pub models: HashMap<String, ModelSpec>,
    #[serde(default)]
    pub sub_graphs: HashMap<String, Graph>,
}

impl GraphDocument {
    /// The runnable graph; edges without an id get `source->target`
    pub fn graph(&self) -> Graph {
        Graph {
            nodes: self.nodes.clone(),
            edges: self
                .edges
                .iter()
                .map(|e| {
                    if e.id.is_empty() {
                        Edge::new(e.source.clone(), e.target.clone())
                    } else {
                        e.clone()
                    }
                })
                .collect(),
        }
    }
}

pub struct GraphLoader;

impl GraphLoader {
    /// Load a graph document from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<GraphDocument> {
        let content = fs::read_to_string(path)?;
        Self::parse_yaml(&content)
    }

    pub fn parse_yaml(content: &str) -> Result<GraphDocument> {
        Ok(serde_yaml::from_str(content)?)
    }
}
