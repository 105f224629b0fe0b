// SPDX-License-Identifier: MIT

//! Run state: outputs, input cache, durations and the execution log of one run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use uuid::Uuid;

use crate::adk::error::{EngineError, Result};
use crate::nodeflow::graph::{Graph, NodeType};

/// Status recorded for a node in the execution log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Running,
    Success,
    Error,
}

/// One execution log entry
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LogEntry {
    pub node_id: String,
    pub status: NodeStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Mutable record of a run's progress.
///
/// Owned by exactly one run at a time; a resume takes the previous state by
/// value and extends it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RunState {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Steps started so far, in order
    #[serde(default)]
    pub levels: Vec<Vec<String>>,
    #[serde(default)]
    pub node_outputs: HashMap<String, String>,
    #[serde(default)]
    pub node_input_cache: HashMap<String, String>,
    /// Milliseconds per node, last execution
    #[serde(default)]
    pub node_durations: HashMap<String, u64>,
    #[serde(default)]
    pub execution_log: Vec<LogEntry>,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            levels: Vec::new(),
            node_outputs: HashMap::new(),
            node_input_cache: HashMap::new(),
            node_durations: HashMap::new(),
            execution_log: Vec::new(),
        }
    }

    pub fn output(&self, node_id: &str) -> Option<&str> {
        self.node_outputs.get(node_id).map(String::as_str)
    }

    pub fn cached_input(&self, node_id: &str) -> Option<&str> {
        self.node_input_cache.get(node_id).map(String::as_str)
    }

    /// Last known status of a node
    pub fn status_of(&self, node_id: &str) -> Option<NodeStatus> {
        self.last_entry(node_id).map(|e| e.status)
    }

    pub fn last_entry(&self, node_id: &str) -> Option<&LogEntry> {
        self.execution_log.iter().rev().find(|e| e.node_id == node_id)
    }

    /// Log entries with the given status
    pub fn entries_with(&self, status: NodeStatus) -> impl Iterator<Item = &LogEntry> {
        self.execution_log.iter().filter(move |e| e.status == status)
    }

    pub(crate) fn mark_running(&mut self, node_id: &str, message: String) {
        self.push_entry(node_id, NodeStatus::Running, message, None);
    }

    pub(crate) fn record_success(&mut self, node_id: &str, output: String, elapsed: Duration) {
        let ms = elapsed.as_millis() as u64;
        self.node_durations.insert(node_id.to_string(), ms);
        self.push_entry(node_id, NodeStatus::Success, preview(&output), Some(ms));
        self.node_outputs.insert(node_id.to_string(), output);
    }

    pub(crate) fn record_failure(&mut self, node_id: &str, error: &EngineError, elapsed: Duration) {
        let ms = elapsed.as_millis() as u64;
        self.node_durations.insert(node_id.to_string(), ms);
        self.push_entry(node_id, NodeStatus::Error, error.to_string(), Some(ms));
        self.node_outputs.remove(node_id);
    }

    /// Drop stored outputs of nodes about to be re-run
    pub(crate) fn clear_outputs<'a>(&mut self, node_ids: impl IntoIterator<Item = &'a String>) {
        for id in node_ids {
            self.node_outputs.remove(id);
        }
    }

    fn push_entry(
        &mut self,
        node_id: &str,
        status: NodeStatus,
        message: String,
        duration_ms: Option<u64>,
    ) {
        self.execution_log.push(LogEntry {
            node_id: node_id.to_string(),
            status,
            message,
            timestamp: Utc::now(),
            duration_ms,
        });
    }

    /// Human-readable result of a run.
    ///
    /// Uses the output nodes' values when the graph has any, otherwise the
    /// values of terminal nodes (nodes nobody reads from).
    pub fn final_output(&self, graph: &Graph, separator: &str) -> String {
        let has_output_nodes = graph.nodes.iter().any(|n| n.node_type == NodeType::Output);
        let sources: HashSet<&str> = graph.edges.iter().map(|e| e.source.as_str()).collect();

        graph
            .nodes
            .iter()
            .filter(|n| {
                if has_output_nodes {
                    n.node_type == NodeType::Output
                } else {
                    !sources.contains(n.id.as_str())
                }
            })
            .filter_map(|n| self.output(&n.id))
            .collect::<Vec<_>>()
            .join(separator)
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 100;
    if text.chars().count() > LIMIT {
        format!("{}...", text.chars().take(LIMIT).collect::<String>())
    } else {
        text.to_string()
    }
}

/// Aggregate status of a run
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Error { node_id: String, message: String },
    /// A stop was requested between steps
    Stopped,
}

/// Outcome of a run or resume: status plus the full state
#[derive(Debug)]
pub struct RunResult {
    pub status: RunStatus,
    pub state: RunState,
    /// The first failing node's error, when status is `Error`
    pub error: Option<EngineError>,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// The state on success, the first node error otherwise
    pub fn into_result(self) -> Result<RunState> {
        match (self.status, self.error) {
            (RunStatus::Success, _) => Ok(self.state),
            (_, Some(err)) => Err(err),
            (RunStatus::Error { node_id, message }, None) => Err(EngineError::ExternalCall {
                node_id,
                service: "node",
                message,
            }),
            (RunStatus::Stopped, None) => Err(EngineError::Stopped),
        }
    }
}
