// SPDX-License-Identifier: MIT

//! Typed error handling for nodeflow-rs
//!
//! [EngineError] is what a run reports. Collaborators (models, the resource
//! broker, sub-graph invokers) return their own narrower errors, which the
//! node runner wraps into [EngineError::ExternalCall] tagged with the node id.

use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the engine
pub type Result<T> = std::result::Result<T, EngineError>;

/// Top-level error type for graph runs
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed graph (dangling edge, self loop, duplicate node id)
    #[error("Graph error: {0}")]
    Graph(String),

    /// Nodes that never reached zero in-degree
    #[error("Cycle detected between nodes: {nodes:?}")]
    Cycle { nodes: Vec<String> },

    /// Entry node has neither upstream data nor a seed value
    #[error("Node '{node_id}' has no upstream connection and no input was supplied")]
    MissingInput { node_id: String },

    /// Node lacks required type-specific configuration
    #[error("Configuration error in node '{node_id}': {message}")]
    Configuration { node_id: String, message: String },

    /// A model, capability or sub-graph call failed
    #[error("{service} call failed in node '{node_id}': {message}")]
    ExternalCall {
        node_id: String,
        service: &'static str,
        message: String,
    },

    /// Node exceeded the configured per-node timeout
    #[error("Node '{node_id}' timed out after {after:?}")]
    Timeout { node_id: String, after: Duration },

    /// Caller requested a stop; remaining steps were not started
    #[error("Run was stopped before completion")]
    Stopped,

    /// Node id referenced by the caller is not part of the graph
    #[error("Node '{0}' not found in graph")]
    UnknownNode(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl EngineError {
    /// Create a graph error
    pub fn graph(message: impl Into<String>) -> Self {
        Self::Graph(message.into())
    }

    /// Create a configuration error for a node
    pub fn config(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            node_id: node_id.into(),
            message: message.into(),
        }
    }

    /// Wrap a collaborator failure with the node it happened in
    pub fn external(
        node_id: impl Into<String>,
        service: &'static str,
        err: impl std::fmt::Display,
    ) -> Self {
        Self::ExternalCall {
            node_id: node_id.into(),
            service,
            message: err.to_string(),
        }
    }
}

/// Model/LLM-specific errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// API key not configured
    #[error("API key not configured for provider: {0}")]
    ApiKeyMissing(String),

    /// Provider rejected the request
    #[error("API error from {provider}: {message}")]
    Api { provider: String, message: String },

    /// Invalid response from model
    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),

    /// HTTP request errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Anything raised by a custom model implementation
    #[error("{0}")]
    Other(String),
}

impl From<&str> for ModelError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for ModelError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

/// Resource broker errors
#[derive(Debug, Error)]
pub enum BrokerError {
    /// No server registered under this reference
    #[error("Unknown capability server: {0}")]
    UnknownServer(String),

    /// Handle was already released or never issued by this broker
    #[error("Handle {0} is not held")]
    NotHeld(uuid::Uuid),

    /// Server could not be started or connected
    #[error("Failed to connect to '{server}': {message}")]
    Connect { server: String, message: String },

    /// Capability enumeration or invocation failed
    #[error("Capability '{name}' failed: {message}")]
    Invoke { name: String, message: String },
}

/// Failure inside a nested sub-graph, surfaced as a single wrapped error
#[derive(Debug, Error)]
#[error("Sub-graph '{sub_graph}' failed: {message}")]
pub struct SubGraphError {
    pub sub_graph: String,
    pub message: String,
}
