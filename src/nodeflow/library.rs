// SPDX-License-Identifier: MIT

//! Named sub-graphs, executed by the same engine that runs their parent

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;

use crate::adk::error::{EngineError, Result, SubGraphError};
use crate::nodeflow::config::EngineConfig;
use crate::nodeflow::engine::{Executor, RunResult, Services};
use crate::nodeflow::graph::Graph;

/// Runs a nested graph as one opaque string-to-string step
#[async_trait]
pub trait SubGraphInvoker: Send + Sync {
    async fn execute(
        &self,
        sub_graph_id: &str,
        input: String,
    ) -> std::result::Result<String, SubGraphError>;
}

/// Registry of graphs addressable from sub-graph nodes.
///
/// Nested runs get the library itself as their invoker, so sub-graphs may
/// reference other sub-graphs as long as no reference chain loops back.
pub struct GraphLibrary {
    graphs: RwLock<HashMap<String, Graph>>,
    services: Services,
    config: EngineConfig,
    me: Weak<GraphLibrary>,
}

impl GraphLibrary {
    pub fn new(services: Services, config: EngineConfig) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            graphs: RwLock::new(HashMap::new()),
            services,
            config,
            me: me.clone(),
        })
    }

    /// Register a graph under `id`, replacing any previous one.
    ///
    /// Fails when the new graph would make a sub-graph reference chain
    /// loop back on itself.
    pub async fn register(&self, id: impl Into<String>, graph: Graph) -> Result<()> {
        let id = id.into();
        let mut graphs = self.graphs.write().await;

        let previous = graphs.insert(id.clone(), graph);
        if let Some(path) = find_nesting_cycle(&graphs, &id) {
            match previous {
                Some(old) => graphs.insert(id.clone(), old),
                None => graphs.remove(&id),
            };
            return Err(EngineError::config(
                &id,
                format!("recursive sub-graph nesting: {}", path.join(" -> ")),
            ));
        }

        log::info!("Registered sub-graph {}", id);
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Option<Graph> {
        self.graphs.read().await.get(id).cloned()
    }

    /// Registered ids, sorted
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.graphs.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Reference path from `start` back to itself, if any
fn find_nesting_cycle(graphs: &HashMap<String, Graph>, start: &str) -> Option<Vec<String>> {
    fn visit(
        graphs: &HashMap<String, Graph>,
        start: &str,
        current: &str,
        path: &mut Vec<String>,
        seen: &mut HashSet<String>,
    ) -> bool {
        let Some(graph) = graphs.get(current) else {
            return false;
        };
        for next in graph.sub_graph_refs() {
            path.push(next.to_string());
            if next == start {
                return true;
            }
            if seen.insert(next.to_string()) && visit(graphs, start, next, path, seen) {
                return true;
            }
            path.pop();
        }
        false
    }

    let mut path = vec![start.to_string()];
    let mut seen = HashSet::new();
    visit(graphs, start, start, &mut path, &mut seen).then_some(path)
}

#[async_trait]
impl SubGraphInvoker for GraphLibrary {
    async fn execute(
        &self,
        sub_graph_id: &str,
        input: String,
    ) -> std::result::Result<String, SubGraphError> {
        let fail = |message: String| SubGraphError {
            sub_graph: sub_graph_id.to_string(),
            message,
        };

        let graph = self
            .get(sub_graph_id)
            .await
            .ok_or_else(|| fail("not registered".to_string()))?;

        let mut services = self.services.clone();
        if let Some(me) = self.me.upgrade() {
            services = services.with_sub_graphs(me);
        }

        log::info!("Executing sub-graph {}", sub_graph_id);
        let state = Executor::new(services)
            .with_config(self.config.clone())
            .run(&graph, Some(input))
            .await
            .and_then(RunResult::into_result)
            .map_err(|e| fail(e.to_string()))?;

        Ok(state.final_output(&graph, &self.config.merge_separator))
    }
}
