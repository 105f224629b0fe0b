//! Integration tests for graph loading and execution
//!
//! These tests drive whole runs through the public API using mock components.

use async_trait::async_trait;
use nodeflow_rs::adk::capability::CapabilityDescriptor;
use nodeflow_rs::adk::error::{BrokerError, EngineError, ModelError};
use nodeflow_rs::adk::model::{Content, GenerationConfig, Model, Part};
use nodeflow_rs::nodeflow::broker::{LeaseKey, ResourceBroker, ResourceHandle};
use nodeflow_rs::nodeflow::config::EngineConfig;
use nodeflow_rs::nodeflow::engine::{
    Executor, HandlerTable, NodeContext, NodeHandler, NodeStatus, ResumeInput, RunStatus, Services,
};
use nodeflow_rs::nodeflow::graph::{Graph, Node, NodeConfig, NodeType};
use nodeflow_rs::nodeflow::library::GraphLibrary;
use nodeflow_rs::nodeflow::loader::GraphLoader;
use nodeflow_rs::nodeflow::registry::ModelRegistry;
use nodeflow_rs::nodeflow::sinks::{ChannelCommandSink, ChannelObserver, Observation};
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// Mock Components
// ============================================================================

/// Upper-cases the last user message
struct UppercaseModel;

#[async_trait]
impl Model for UppercaseModel {
    async fn generate_content(
        &self,
        history: &[Content],
        _config: Option<&GenerationConfig>,
        _capabilities: Option<&[CapabilityDescriptor]>,
    ) -> Result<Content, ModelError> {
        let last = history.last().map(Content::joined_text).unwrap_or_default();
        Ok(Content::text("model", last.to_uppercase()))
    }
}

/// Calls one capability, then answers with whatever came back
struct ToolCallingModel {
    capability: String,
    calls: AtomicUsize,
}

impl ToolCallingModel {
    fn new(capability: &str) -> Self {
        Self {
            capability: capability.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Model for ToolCallingModel {
    async fn generate_content(
        &self,
        history: &[Content],
        _config: Option<&GenerationConfig>,
        capabilities: Option<&[CapabilityDescriptor]>,
    ) -> Result<Content, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if capabilities.is_none() {
            return Err(ModelError::from("expected capabilities"));
        }

        let answered = history.last().and_then(|c| {
            c.parts.iter().find_map(|p| match p {
                Part::FunctionResponse {
                    id: Some(id),
                    response,
                    ..
                } if id == "call-1" => Some(response.clone()),
                _ => None,
            })
        });

        Ok(match answered {
            Some(response) => Content::text("model", format!("answer: {}", response)),
            None => Content {
                role: "model".to_string(),
                parts: vec![Part::FunctionCall {
                    id: Some("call-1".to_string()),
                    name: self.capability.clone(),
                    args: json!({ "query": history[1].joined_text() }),
                }],
            },
        })
    }
}

/// Static schema for the mock capability
static LOOKUP_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "query": {"type": "string"}
        }
    })
});

/// Broker exposing a single `lookup` capability and counting handles
#[derive(Default)]
struct MockBroker {
    acquired: AtomicUsize,
    released: AtomicUsize,
    fail_invoke: bool,
    leases: Mutex<Vec<LeaseKey>>,
}

impl MockBroker {
    fn failing() -> Self {
        Self {
            fail_invoke: true,
            ..Default::default()
        }
    }

    fn outstanding(&self) -> usize {
        self.acquired.load(Ordering::SeqCst) - self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceBroker for MockBroker {
    async fn acquire(&self, server: &str, lease: &LeaseKey) -> Result<ResourceHandle, BrokerError> {
        if server != "lookup-server" {
            return Err(BrokerError::UnknownServer(server.to_string()));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        self.leases.lock().unwrap().push(lease.clone());
        Ok(ResourceHandle::new(server, lease.clone()))
    }

    async fn list_capabilities(
        &self,
        _handle: &ResourceHandle,
    ) -> Result<Vec<CapabilityDescriptor>, BrokerError> {
        Ok(vec![CapabilityDescriptor::new(
            "lookup",
            "Look up a fact",
            LOOKUP_SCHEMA.clone(),
        )])
    }

    async fn invoke(
        &self,
        _handle: &ResourceHandle,
        capability: &str,
        args: Value,
    ) -> Result<Value, BrokerError> {
        if self.fail_invoke {
            return Err(BrokerError::Invoke {
                name: capability.to_string(),
                message: "server crashed".to_string(),
            });
        }
        Ok(json!({ "fact": format!("known {}", args["query"].as_str().unwrap_or("")) }))
    }

    async fn release(&self, _handle: ResourceHandle) -> Result<(), BrokerError> {
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Acquires a handle and then fails without releasing it
struct LeakyHandler;

#[async_trait]
impl NodeHandler for LeakyHandler {
    async fn run(
        &self,
        node: &Node,
        _input: Option<String>,
        ctx: &NodeContext,
    ) -> nodeflow_rs::adk::error::Result<String> {
        ctx.resources
            .acquire("lookup-server")
            .await
            .map_err(|e| EngineError::external(&node.id, "broker", e))?;
        Err(EngineError::external(&node.id, "capability", "gave up"))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn model_node(id: &str, model: &str) -> Node {
    Node::new(id, NodeType::Model).with_config(NodeConfig {
        model: Some(model.to_string()),
        ..Default::default()
    })
}

fn tool_node(id: &str) -> Node {
    Node::new(id, NodeType::ToolModel).with_config(NodeConfig {
        model: Some("tools".to_string()),
        server: Some("lookup-server".to_string()),
        ..Default::default()
    })
}

fn pipeline(middle: Node) -> Graph {
    let mut graph = Graph::new();
    let middle_id = middle.id.clone();
    graph.add_node(Node::new("in", NodeType::Input)).unwrap();
    graph.add_node(middle).unwrap();
    graph.add_node(Node::new("out", NodeType::Output)).unwrap();
    graph.connect("in", &middle_id).unwrap();
    graph.connect(&middle_id, "out").unwrap();
    graph
}

async fn models() -> ModelRegistry {
    let registry = ModelRegistry::new();
    registry.register("upper", Arc::new(UppercaseModel)).await;
    registry
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_input_model_output_pipeline() {
    let (observer, mut rx) = ChannelObserver::new();
    let services = Services::default()
        .with_models(models().await)
        .with_observer(Arc::new(observer));
    let graph = pipeline(model_node("model_a", "upper"));

    let result = Executor::new(services)
        .run(&graph, Some("hello".to_string()))
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Success);
    let state = result.state;
    assert_eq!(state.output("out"), Some("HELLO"));
    assert_eq!(state.output("model_a"), Some("HELLO"));

    for id in ["in", "model_a", "out"] {
        assert_eq!(state.status_of(id), Some(NodeStatus::Success), "{}", id);
    }
    assert_eq!(state.entries_with(NodeStatus::Success).count(), 3);
    assert_eq!(state.entries_with(NodeStatus::Error).count(), 0);

    assert_eq!(
        rx.recv().await,
        Some(Observation::Value {
            node_id: "out".to_string(),
            value: "HELLO".to_string()
        })
    );
}

#[tokio::test]
async fn test_diamond_levels() {
    let mut graph = Graph::new();
    for id in ["A", "B", "C"] {
        let node_type = if id == "C" { NodeType::Output } else { NodeType::Input };
        graph.add_node(Node::new(id, node_type)).unwrap();
    }
    graph.connect("A", "C").unwrap();
    graph.connect("B", "C").unwrap();

    let result = Executor::new(Services::default())
        .run(&graph, Some("seed".to_string()))
        .await
        .unwrap();

    assert_eq!(result.state.levels, vec![vec!["A", "B"], vec!["C"]]);
    assert_eq!(
        result.state.output("C"),
        Some("[from A]\nseed\n\n---\n\n[from B]\nseed")
    );
}

#[tokio::test]
async fn test_cycle_reports_cycle_error() {
    let mut graph = Graph::new();
    for id in ["A", "B", "C"] {
        graph.add_node(Node::new(id, NodeType::Display)).unwrap();
    }
    graph.connect("A", "B").unwrap();
    graph.connect("B", "C").unwrap();
    graph.connect("C", "A").unwrap();

    let result = Executor::new(Services::default()).run(&graph, None).await;
    match result {
        Err(EngineError::Cycle { nodes }) => assert_eq!(nodes, vec!["A", "B", "C"]),
        other => panic!("expected cycle error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_tool_model_calls_capability_and_releases() {
    let broker = Arc::new(MockBroker::default());
    let model = Arc::new(ToolCallingModel::new("lookup"));
    let registry = ModelRegistry::new();
    registry.register("tools", model.clone()).await;
    let (observer, mut rx) = ChannelObserver::new();

    let services = Services::default()
        .with_models(registry)
        .with_broker(broker.clone())
        .with_observer(Arc::new(observer));

    let result = Executor::new(services)
        .run(&pipeline(tool_node("agent")), Some("rust".to_string()))
        .await
        .unwrap();

    let state = result.into_result().unwrap();
    assert_eq!(state.output("out"), Some(r#"answer: {"fact":"known rust"}"#));
    assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    assert_eq!(broker.acquired.load(Ordering::SeqCst), 1);
    assert_eq!(broker.outstanding(), 0);

    let lease = broker.leases.lock().unwrap()[0].clone();
    assert_eq!(lease.node_id, "agent");
    assert_eq!(lease.run_id, state.run_id);

    assert_eq!(
        rx.recv().await,
        Some(Observation::Partial {
            node_id: "agent".to_string(),
            capability: "lookup".to_string(),
            chunk: r#"{"fact":"known rust"}"#.to_string()
        })
    );
}

#[tokio::test]
async fn test_capability_failure_is_fed_back_to_model() {
    let broker = Arc::new(MockBroker::failing());
    let registry = ModelRegistry::new();
    registry
        .register("tools", Arc::new(ToolCallingModel::new("lookup")))
        .await;

    let services = Services::default()
        .with_models(registry)
        .with_broker(broker.clone());

    let state = Executor::new(services)
        .run(&pipeline(tool_node("agent")), Some("rust".to_string()))
        .await
        .unwrap()
        .into_result()
        .unwrap();

    let out = state.output("out").unwrap();
    assert!(out.starts_with("answer: "));
    assert!(out.contains("server crashed"));
    assert_eq!(broker.outstanding(), 0);
}

#[tokio::test]
async fn test_unlisted_capability_is_refused() {
    let broker = Arc::new(MockBroker::default());
    let registry = ModelRegistry::new();
    registry
        .register("tools", Arc::new(ToolCallingModel::new("delete_everything")))
        .await;

    let services = Services::default()
        .with_models(registry)
        .with_broker(broker.clone());

    let state = Executor::new(services)
        .run(&pipeline(tool_node("agent")), Some("x".to_string()))
        .await
        .unwrap()
        .into_result()
        .unwrap();

    assert!(state.output("agent").unwrap().contains("is not available"));
    assert_eq!(broker.outstanding(), 0);
}

#[tokio::test]
async fn test_failed_handler_releases_handle_once() {
    let broker = Arc::new(MockBroker::default());
    let mut handlers = HandlerTable::builtin();
    handlers.register(NodeType::Display, Arc::new(LeakyHandler));

    let mut graph = Graph::new();
    graph.add_node(Node::new("leaky", NodeType::Display)).unwrap();

    let result = Executor::new(Services::default().with_broker(broker.clone()))
        .with_handlers(handlers)
        .run(&graph, None)
        .await
        .unwrap();

    assert!(matches!(result.status, RunStatus::Error { ref node_id, .. } if node_id == "leaky"));
    assert_eq!(broker.acquired.load(Ordering::SeqCst), 1);
    assert_eq!(broker.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_timeout_releases_handle() {
    struct Stalling;

    #[async_trait]
    impl NodeHandler for Stalling {
        async fn run(
            &self,
            _node: &Node,
            _input: Option<String>,
            ctx: &NodeContext,
        ) -> nodeflow_rs::adk::error::Result<String> {
            ctx.resources.acquire("lookup-server").await.ok();
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            Ok(String::new())
        }
    }

    let broker = Arc::new(MockBroker::default());
    let mut handlers = HandlerTable::builtin();
    handlers.register(NodeType::Display, Arc::new(Stalling));

    let mut graph = Graph::new();
    graph.add_node(Node::new("stuck", NodeType::Display)).unwrap();

    let result = Executor::new(Services::default().with_broker(broker.clone()))
        .with_handlers(handlers)
        .with_config(
            EngineConfig::default().with_node_timeout(std::time::Duration::from_millis(50)),
        )
        .run(&graph, None)
        .await
        .unwrap();

    assert!(matches!(result.error, Some(EngineError::Timeout { .. })));
    assert_eq!(broker.outstanding(), 0);
}

#[tokio::test]
async fn test_missing_model_reference_fails_node() {
    let graph = pipeline(Node::new("model_a", NodeType::Model));

    let result = Executor::new(Services::default())
        .run(&graph, Some("hello".to_string()))
        .await
        .unwrap();

    assert!(matches!(
        result.status,
        RunStatus::Error { ref node_id, ref message }
            if node_id == "model_a" && message.contains("no model reference set")
    ));
    assert_eq!(result.state.output("in"), Some("hello"));
    assert!(result.state.output("out").is_none());
}

#[tokio::test]
async fn test_resume_after_run_is_identical() {
    let services = Services::default().with_models(models().await);
    let executor = Executor::new(services);
    let graph = pipeline(model_node("model_a", "upper"));

    let first = executor
        .run(&graph, Some("hello".to_string()))
        .await
        .unwrap();
    let before = first.state.node_outputs.clone();

    let resumed = executor
        .resume_from(&graph, first.state, "model_a", ResumeInput::Cached)
        .await
        .unwrap();

    assert!(resumed.is_success());
    assert_eq!(resumed.state.node_outputs, before);
}

#[tokio::test]
async fn test_resume_from_saved_json_state() {
    let services = Services::default().with_models(models().await);
    let executor = Executor::new(services);
    let graph = pipeline(model_node("model_a", "upper"));

    let first = executor.run(&graph, Some("abc".to_string())).await.unwrap();
    let saved = serde_json::to_string(&first.state).unwrap();
    let prior = serde_json::from_str(&saved).unwrap();

    let resumed = executor
        .resume_from(&graph, prior, "out", ResumeInput::Supplied("manual".into()))
        .await
        .unwrap();

    assert_eq!(resumed.state.output("out"), Some("manual"));
    assert_eq!(resumed.state.output("model_a"), Some("ABC"));
    assert_eq!(resumed.state.run_id, first.state.run_id);
}

#[tokio::test]
async fn test_sub_graph_node_runs_nested_graph() {
    let services = Services::default().with_models(models().await);
    let library = GraphLibrary::new(services.clone(), EngineConfig::default());
    library
        .register("shout", pipeline(model_node("inner_model", "upper")))
        .await
        .unwrap();

    let outer = pipeline(Node::new("nested", NodeType::SubGraph).with_config(NodeConfig {
        sub_graph: Some("shout".to_string()),
        ..Default::default()
    }));

    let state = Executor::new(services.with_sub_graphs(library))
        .run(&outer, Some("quiet".to_string()))
        .await
        .unwrap()
        .into_result()
        .unwrap();

    assert_eq!(state.output("out"), Some("QUIET"));
}

#[tokio::test]
async fn test_command_node_dispatches() {
    let (sink, mut rx) = ChannelCommandSink::new();
    let mut graph = pipeline(Node::new("shell", NodeType::Command).with_config(NodeConfig {
        command: Some("echo".to_string()),
        ..Default::default()
    }));
    // the input node appends its extra value to the seed
    graph.nodes[0].config.extra = Some("notes".to_string());

    let state = Executor::new(Services::default().with_commands(Arc::new(sink)))
        .run(&graph, Some("hi".to_string()))
        .await
        .unwrap()
        .into_result()
        .unwrap();

    let sent = rx.recv().await.unwrap();
    assert_eq!(sent, "echo 'hi\n\n---\n\nnotes'");
    assert_eq!(state.output("shell"), Some(format!("Dispatched to shell: {}", sent).as_str()));
}

#[tokio::test]
async fn test_loaded_document_runs() {
    let yaml = r#"
name: shout
models:
  upper:
    model_name: unused
nodes:
  - id: in
    type: input
  - id: loud
    type: model
    config:
      model: upper
  - id: out
    type: output
edges:
  - source: in
    target: loud
  - source: loud
    target: out
"#;
    let doc = GraphLoader::parse_yaml(yaml).unwrap();
    assert!(doc.models.contains_key("upper"));

    let state = Executor::new(Services::default().with_models(models().await))
        .run(&doc.graph(), Some("yaml".to_string()))
        .await
        .unwrap()
        .into_result()
        .unwrap();

    assert_eq!(state.final_output(&doc.graph(), "\n"), "YAML");
}
