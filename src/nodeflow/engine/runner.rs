// SPDX-License-Identifier: MIT

//! Node runner - per-type handlers behind one dispatch table
//!
//! Every handler has the same shape: node record, merged input, and a
//! [NodeContext] carrying collaborators plus the node's scoped broker access.
//! Adding a node type means registering another handler.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::Services;
use crate::adk::capability::{describe_capabilities, CapabilityDescriptor};
use crate::adk::error::{EngineError, Result};
use crate::adk::model::{Content, Model, Part};
use crate::nodeflow::broker::{NodeResources, ResourceHandle};
use crate::nodeflow::config::EngineConfig;
use crate::nodeflow::graph::{Node, NodeType};

const DEFAULT_INSTRUCTIONS: &str = "You are a helpful assistant.";

/// Everything a handler may touch while running one node
pub struct NodeContext {
    pub node_id: String,
    pub run_id: Uuid,
    pub services: Services,
    pub resources: NodeResources,
    pub config: Arc<EngineConfig>,
}

#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// Run a node. `input` is `None` only for start nodes without a seed.
    async fn run(&self, node: &Node, input: Option<String>, ctx: &NodeContext) -> Result<String>;
}

/// Node type to handler mapping
#[derive(Clone)]
pub struct HandlerTable {
    handlers: HashMap<NodeType, Arc<dyn NodeHandler>>,
}

impl HandlerTable {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Table with the built-in handler for every node type
    pub fn builtin() -> Self {
        let model: Arc<dyn NodeHandler> = Arc::new(ModelHandler);
        let passthrough: Arc<dyn NodeHandler> = Arc::new(PassthroughHandler);

        let mut table = Self::empty();
        table.register(NodeType::Input, Arc::new(InputHandler));
        table.register(NodeType::Model, model.clone());
        table.register(NodeType::ToolModel, model);
        table.register(NodeType::SubGraph, Arc::new(SubGraphHandler));
        table.register(NodeType::Command, Arc::new(CommandHandler));
        table.register(NodeType::Display, passthrough.clone());
        table.register(NodeType::Output, passthrough);
        table
    }

    /// Add or replace the handler for a node type
    pub fn register(&mut self, node_type: NodeType, handler: Arc<dyn NodeHandler>) {
        self.handlers.insert(node_type, handler);
    }

    pub fn get(&self, node_type: NodeType) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.get(&node_type).cloned()
    }
}

impl Default for HandlerTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Upstream value merged with the node's configured extra value
pub struct InputHandler;

#[async_trait]
impl NodeHandler for InputHandler {
    async fn run(&self, node: &Node, input: Option<String>, ctx: &NodeContext) -> Result<String> {
        let upstream = present(input.as_deref());
        let extra = present(node.config.extra.as_deref());

        Ok(match (upstream, extra) {
            (Some(up), Some(extra)) => format!("{}{}{}", up, ctx.config.merge_separator, extra),
            (Some(up), None) => up.to_string(),
            (None, Some(extra)) => extra.to_string(),
            (None, None) => String::new(),
        })
    }
}

/// Display and output nodes: value unchanged, published for observation
pub struct PassthroughHandler;

#[async_trait]
impl NodeHandler for PassthroughHandler {
    async fn run(&self, node: &Node, input: Option<String>, ctx: &NodeContext) -> Result<String> {
        let value = input.unwrap_or_default();
        if let Some(observer) = &ctx.services.observer {
            observer.publish(&node.id, &value);
        }
        Ok(value)
    }
}

/// Model completion, optionally restricted to one capability server
pub struct ModelHandler;

impl ModelHandler {
    async fn resolve_model(&self, node: &Node, ctx: &NodeContext) -> Result<Arc<dyn Model>> {
        let model_ref = present(node.config.model.as_deref())
            .ok_or_else(|| EngineError::config(&node.id, "no model reference set"))?;

        ctx.services
            .models
            .get(model_ref)
            .await
            .ok_or_else(|| EngineError::config(&node.id, format!("unknown model '{}'", model_ref)))
    }

    fn server<'a>(&self, node: &'a Node) -> Result<Option<&'a str>> {
        let server = present(node.config.server.as_deref());
        if node.node_type == NodeType::ToolModel && server.is_none() {
            return Err(EngineError::config(
                &node.id,
                "tool-model node requires a capability server",
            ));
        }
        Ok(server)
    }

    /// Model call with the capability list of a leased handle
    async fn complete_with_capabilities(
        &self,
        node: &Node,
        model: &dyn Model,
        handle: &ResourceHandle,
        input: String,
        ctx: &NodeContext,
    ) -> Result<String> {
        let capabilities = ctx
            .resources
            .list_capabilities(handle)
            .await
            .map_err(|e| EngineError::external(&node.id, "capability", e))?;

        log::debug!(
            "Node {} offered {} capabilities from '{}'",
            node.id,
            capabilities.len(),
            handle.server
        );

        let instructions = format!(
            "{}\n\nYou may only use the following capabilities from the '{}' server:\n{}\n\
             Do not call any capability that is not listed.",
            node.config
                .instructions
                .as_deref()
                .unwrap_or(DEFAULT_INSTRUCTIONS),
            handle.server,
            describe_capabilities(&capabilities)
        );

        let mut history = vec![
            Content::text("system", instructions),
            Content::text("user", input),
        ];

        let max_turns = ctx.config.max_tool_turns;
        for turn in 0..max_turns {
            log::debug!("Node {} turn {}/{}", node.id, turn + 1, max_turns);
            let response = model
                .generate_content(&history, None, Some(capabilities.as_slice()))
                .await
                .map_err(|e| EngineError::external(&node.id, "model", e))?;

            let calls: Vec<(Option<String>, String, Value)> = response
                .function_calls()
                .into_iter()
                .map(|(id, name, args)| (id.map(str::to_string), name.to_string(), args.clone()))
                .collect();

            if calls.is_empty() {
                return Ok(response.joined_text());
            }

            let mut responses = Vec::with_capacity(calls.len());
            for (id, name, args) in calls {
                let result = self
                    .invoke(node, &capabilities, handle, &name, args, ctx)
                    .await;
                if let Some(observer) = &ctx.services.observer {
                    observer.on_partial(&node.id, &name, &result.to_string());
                }
                responses.push(Part::FunctionResponse {
                    id,
                    name,
                    response: result,
                });
            }

            history.push(response);
            history.push(Content {
                role: "user".to_string(),
                parts: responses,
            });
        }

        Err(EngineError::external(
            &node.id,
            "model",
            format!("no final answer after {} capability turns", max_turns),
        ))
    }

    /// Invoke a capability; failures are reported back to the model as data
    async fn invoke(
        &self,
        node: &Node,
        capabilities: &[CapabilityDescriptor],
        handle: &ResourceHandle,
        name: &str,
        args: Value,
        ctx: &NodeContext,
    ) -> Value {
        if !capabilities.iter().any(|c| c.name == name) {
            log::warn!("Node {} requested unlisted capability {}", node.id, name);
            return json!({ "error": format!("capability '{}' is not available", name) });
        }

        log::info!("Node {} calling capability {}", node.id, name);
        match ctx.resources.invoke(handle, name, args).await {
            Ok(result) => result,
            Err(e) => {
                log::error!("Capability {} failed: {}", name, e);
                json!({ "error": e.to_string() })
            }
        }
    }
}

#[async_trait]
impl NodeHandler for ModelHandler {
    async fn run(&self, node: &Node, input: Option<String>, ctx: &NodeContext) -> Result<String> {
        let model = self.resolve_model(node, ctx).await?;
        let server = self.server(node)?;
        let input = input.unwrap_or_default();

        let Some(server) = server else {
            let history = vec![
                Content::text(
                    "system",
                    node.config
                        .instructions
                        .as_deref()
                        .unwrap_or(DEFAULT_INSTRUCTIONS),
                ),
                Content::text("user", input),
            ];
            let response = model
                .generate_content(&history, None, None)
                .await
                .map_err(|e| EngineError::external(&node.id, "model", e))?;
            return Ok(response.joined_text());
        };

        let handle = ctx
            .resources
            .acquire(server)
            .await
            .map_err(|e| EngineError::external(&node.id, "broker", e))?;

        let outcome = self
            .complete_with_capabilities(node, model.as_ref(), &handle, input, ctx)
            .await;
        ctx.resources.release(&handle).await;
        outcome
    }
}

/// Opaque nested graph: string in, string out
pub struct SubGraphHandler;

#[async_trait]
impl NodeHandler for SubGraphHandler {
    async fn run(&self, node: &Node, input: Option<String>, ctx: &NodeContext) -> Result<String> {
        let sub_graph = present(node.config.sub_graph.as_deref())
            .ok_or_else(|| EngineError::config(&node.id, "no sub-graph reference set"))?;
        let invoker = ctx
            .services
            .sub_graphs
            .as_ref()
            .ok_or_else(|| EngineError::config(&node.id, "no sub-graph invoker configured"))?;

        invoker
            .execute(sub_graph, input.unwrap_or_default())
            .await
            .map_err(|e| EngineError::external(&node.id, "sub-graph", e))
    }
}

/// Fire-and-forget hand-off to the shell; returns an acknowledgement
pub struct CommandHandler;

#[async_trait]
impl NodeHandler for CommandHandler {
    async fn run(&self, node: &Node, input: Option<String>, ctx: &NodeContext) -> Result<String> {
        let program = present(node.config.command.as_deref())
            .ok_or_else(|| EngineError::config(&node.id, "no command set"))?;
        let sink = ctx
            .services
            .commands
            .as_ref()
            .ok_or_else(|| EngineError::config(&node.id, "no command sink configured"))?;

        let command = build_command(program, &node.config.args, input.as_deref());
        log::info!("Node {} dispatching: {}", node.id, command);
        sink.send(command.clone());

        Ok(format!("Dispatched to shell: {}", command))
    }
}

/// `program args... 'input'`, with the input quoted for a POSIX shell
fn build_command(program: &str, args: &[String], input: Option<&str>) -> String {
    let mut parts = vec![program.to_string()];
    parts.extend(args.iter().cloned());
    if let Some(input) = present(input) {
        parts.push(shell_quote(input));
    }
    parts.join(" ")
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
