// SPDX-License-Identifier: MIT

//! Graph execution engine

pub mod executor;
pub mod runner;
pub mod state;

pub use executor::{Executor, ResumeInput};
pub use runner::{HandlerTable, NodeContext, NodeHandler};
pub use state::{LogEntry, NodeStatus, RunResult, RunState, RunStatus};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::nodeflow::broker::ResourceBroker;
use crate::nodeflow::library::SubGraphInvoker;
use crate::nodeflow::registry::ModelRegistry;
use crate::nodeflow::sinks::{CommandSink, ObservationSink};

/// External collaborators available to node handlers
#[derive(Clone, Default)]
pub struct Services {
    pub models: ModelRegistry,
    pub broker: Option<Arc<dyn ResourceBroker>>,
    pub sub_graphs: Option<Arc<dyn SubGraphInvoker>>,
    pub commands: Option<Arc<dyn CommandSink>>,
    pub observer: Option<Arc<dyn ObservationSink>>,
}

impl Services {
    pub fn with_models(mut self, models: ModelRegistry) -> Self {
        self.models = models;
        self
    }

    pub fn with_broker(mut self, broker: Arc<dyn ResourceBroker>) -> Self {
        self.broker = Some(broker);
        self
    }

    pub fn with_sub_graphs(mut self, invoker: Arc<dyn SubGraphInvoker>) -> Self {
        self.sub_graphs = Some(invoker);
        self
    }

    pub fn with_commands(mut self, sink: Arc<dyn CommandSink>) -> Self {
        self.commands = Some(sink);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ObservationSink>) -> Self {
        self.observer = Some(observer);
        self
    }
}

/// Cooperative stop signal for a run.
///
/// A stop never interrupts nodes already in flight; the executor checks it
/// before starting each step.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    stopped: Arc<AtomicBool>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}
