// SPDX-License-Identifier: MIT

//! Run executor - drives planned steps, merges inputs and records run state
//!
//! A step's nodes are launched together and awaited together on the current
//! task. A failing node lets the rest of its step finish, then the run stops
//! without starting another step.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use super::runner::{HandlerTable, NodeContext};
use super::state::{RunResult, RunState, RunStatus};
use super::{RunControl, Services};
use crate::adk::error::{EngineError, Result};
use crate::nodeflow::broker::{LeaseKey, NodeResources};
use crate::nodeflow::config::EngineConfig;
use crate::nodeflow::graph::{build, plan, DependencyGraph, Graph, Node, NodeType, StartSet};

/// Input used for the start node of a resumed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeInput {
    /// The input cached for that node by the previous run
    Cached,
    /// A caller-provided value
    Supplied(String),
    /// Explicitly run without any input
    Empty,
}

/// Where externally supplied input enters the graph
enum Seed {
    /// Every start node receives the same seed
    Roots(Option<String>),
    /// One node receives a fixed input regardless of its dependencies
    Node { id: String, input: Option<String> },
}

/// Outcome of one node task
type NodeOutcome = (String, Result<String>, Duration);

pub struct Executor {
    services: Services,
    handlers: HandlerTable,
    config: Arc<EngineConfig>,
}

impl Executor {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            handlers: HandlerTable::builtin(),
            config: Arc::new(EngineConfig::default()),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn with_handlers(mut self, handlers: HandlerTable) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the whole graph, feeding `seed` to its start nodes
    pub async fn run(&self, graph: &Graph, seed: Option<String>) -> Result<RunResult> {
        self.run_with_control(graph, seed, &RunControl::new()).await
    }

    /// Like [Executor::run], checking `control` before each level
    pub async fn run_with_control(
        &self,
        graph: &Graph,
        seed: Option<String>,
        control: &RunControl,
    ) -> Result<RunResult> {
        let graph = graph.clone();
        let deps = build(&graph.nodes, &graph.edges)?;
        check_entry_inputs(&graph, &deps, seed.as_deref())?;
        let levels = plan(&deps, &StartSet::Roots)?;

        log::info!(
            "Running graph with {} nodes in {} levels",
            deps.len(),
            levels.len()
        );

        let mut state = RunState::new();
        let (status, error) = self
            .execute_steps(&graph, &deps, levels, &mut state, &Seed::Roots(seed), control)
            .await;

        Ok(RunResult {
            status,
            state,
            error,
        })
    }

    /// Re-run `start` and everything downstream of it, reusing `prior`'s
    /// outputs for every node outside that set
    pub async fn resume_from(
        &self,
        graph: &Graph,
        prior: RunState,
        start: &str,
        input: ResumeInput,
    ) -> Result<RunResult> {
        self.resume_with_control(graph, prior, start, input, &RunControl::new())
            .await
    }

    pub async fn resume_with_control(
        &self,
        graph: &Graph,
        prior: RunState,
        start: &str,
        input: ResumeInput,
        control: &RunControl,
    ) -> Result<RunResult> {
        let graph = graph.clone();
        let deps = build(&graph.nodes, &graph.edges)?;
        if !deps.contains(start) {
            return Err(EngineError::UnknownNode(start.to_string()));
        }

        let start_input = match input {
            ResumeInput::Cached => Some(
                prior
                    .cached_input(start)
                    .ok_or_else(|| EngineError::MissingInput {
                        node_id: start.to_string(),
                    })?
                    .to_string(),
            ),
            ResumeInput::Supplied(value) => Some(value),
            ResumeInput::Empty => {
                log::warn!("Resuming from {} without input", start);
                None
            }
        };

        let steps = plan(&deps, &StartSet::From(start.to_string()))?;
        log::info!("Resuming from {}: {} nodes to re-run", start, steps.len());

        let mut state = prior;
        // outputs of the re-run set belong to the previous execution
        state.clear_outputs(steps.iter().flatten());
        let seed = Seed::Node {
            id: start.to_string(),
            input: start_input,
        };
        let (status, error) = self
            .execute_steps(&graph, &deps, steps, &mut state, &seed, control)
            .await;

        Ok(RunResult {
            status,
            state,
            error,
        })
    }

    async fn execute_steps(
        &self,
        graph: &Graph,
        deps: &DependencyGraph,
        steps: Vec<Vec<String>>,
        state: &mut RunState,
        seed: &Seed,
        control: &RunControl,
    ) -> (RunStatus, Option<EngineError>) {
        for (index, step) in steps.into_iter().enumerate() {
            if control.is_stopped() {
                log::warn!("Stop requested, not starting step {}", index);
                return (RunStatus::Stopped, None);
            }

            log::info!("Step {}: executing {} nodes: {:?}", index, step.len(), step);

            let mut tasks = Vec::with_capacity(step.len());
            for id in &step {
                let Some(node) = graph.node(id) else {
                    continue;
                };
                let input = self.node_input(deps, id, state, seed);
                log::debug!("Node {} input: {:?}", id, input);

                state
                    .node_input_cache
                    .insert(id.clone(), input.clone().unwrap_or_default());
                state.mark_running(id, format!("Running {} node", node.node_type));
                tasks.push(self.run_node(node, input, state.run_id));
            }
            state.levels.push(step);

            let mut failure: Option<(String, EngineError)> = None;
            for (node_id, outcome, elapsed) in join_all(tasks).await {
                match outcome {
                    Ok(output) => {
                        log::info!("Node {} completed in {:?}", node_id, elapsed);
                        state.record_success(&node_id, output, elapsed);
                    }
                    Err(e) => {
                        log::error!("Node {} failed: {}", node_id, e);
                        state.record_failure(&node_id, &e, elapsed);
                        if failure.is_none() {
                            failure = Some((node_id, e));
                        }
                    }
                }
            }

            if let Some((node_id, error)) = failure {
                return (
                    RunStatus::Error {
                        node_id,
                        message: error.to_string(),
                    },
                    Some(error),
                );
            }
        }

        (RunStatus::Success, None)
    }

    /// Merged input for a node.
    ///
    /// Start nodes get the seed; a single dependency passes its output through;
    /// several dependencies are joined in ascending id order, each part headed
    /// with its origin.
    fn node_input(
        &self,
        deps: &DependencyGraph,
        id: &str,
        state: &RunState,
        seed: &Seed,
    ) -> Option<String> {
        let parents: Vec<&String> = deps.dependencies_of(id).collect();

        match seed {
            Seed::Node { id: start, input } if start == id => return input.clone(),
            Seed::Roots(seed) if parents.is_empty() => return seed.clone(),
            _ => {}
        }

        match parents.as_slice() {
            [] => None,
            [only] => Some(upstream_output(state, id, only)),
            many => Some(
                many.iter()
                    .map(|parent| format!("[from {}]\n{}", parent, upstream_output(state, id, parent)))
                    .collect::<Vec<_>>()
                    .join(&self.config.merge_separator),
            ),
        }
    }

    /// Run one node with its own broker scope; every handle the node still
    /// holds afterwards is released whatever the outcome
    async fn run_node(&self, node: &Node, input: Option<String>, run_id: Uuid) -> NodeOutcome {
        let started = Instant::now();
        let ctx = NodeContext {
            node_id: node.id.clone(),
            run_id,
            services: self.services.clone(),
            resources: NodeResources::new(
                self.services.broker.clone(),
                LeaseKey {
                    run_id,
                    node_id: node.id.clone(),
                },
            ),
            config: self.config.clone(),
        };

        let outcome = match self.handlers.get(node.node_type) {
            None => Err(EngineError::config(
                &node.id,
                format!("no handler registered for '{}' nodes", node.node_type),
            )),
            Some(handler) => {
                let task = handler.run(node, input, &ctx);
                match self.config.node_timeout {
                    Some(limit) => match tokio::time::timeout(limit, task).await {
                        Ok(result) => result,
                        Err(_) => Err(EngineError::Timeout {
                            node_id: node.id.clone(),
                            after: limit,
                        }),
                    },
                    None => task.await,
                }
            }
        };

        ctx.resources.release_all().await;
        (node.id.clone(), outcome, started.elapsed())
    }
}

fn upstream_output(state: &RunState, id: &str, parent: &str) -> String {
    match state.output(parent) {
        Some(output) => output.to_string(),
        None => {
            log::warn!("Node {} reads {}, which has no stored output", id, parent);
            String::new()
        }
    }
}

/// Every input node without an upstream connection needs a seed or an extra value
fn check_entry_inputs(graph: &Graph, deps: &DependencyGraph, seed: Option<&str>) -> Result<()> {
    let seeded = seed.is_some_and(|s| !s.is_empty());

    for node in &graph.nodes {
        if node.node_type != NodeType::Input || deps.dependencies_of(&node.id).next().is_some() {
            continue;
        }
        let has_extra = node.config.extra.as_deref().is_some_and(|e| !e.is_empty());
        if !seeded && !has_extra {
            return Err(EngineError::MissingInput {
                node_id: node.id.clone(),
            });
        }
    }

    Ok(())
}
