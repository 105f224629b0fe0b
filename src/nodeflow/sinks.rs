// SPDX-License-Identifier: MIT

//! Write-only collaborators: observation sinks and command dispatch sinks

use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Receives values published by display/output nodes and live diagnostics.
/// The engine never reads anything back.
pub trait ObservationSink: Send + Sync {
    fn publish(&self, node_id: &str, value: &str);

    /// Intermediate capability results reported while a model node works
    fn on_partial(&self, _node_id: &str, _capability: &str, _chunk: &str) {}
}

/// Fire-and-forget hand-off to an interactive shell
pub trait CommandSink: Send + Sync {
    fn send(&self, command: String);
}

/// Observation sink that writes to the log
#[derive(Debug, Default, Clone)]
pub struct LogObserver;

impl ObservationSink for LogObserver {
    fn publish(&self, node_id: &str, value: &str) {
        log::info!("[{}] {}", node_id, value);
    }

    fn on_partial(&self, node_id: &str, capability: &str, chunk: &str) {
        log::debug!("[{}] {} -> {}", node_id, capability, chunk);
    }
}

/// One message emitted through a [ChannelObserver]
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Value {
        node_id: String,
        value: String,
    },
    Partial {
        node_id: String,
        capability: String,
        chunk: String,
    },
}

/// Observation sink that forwards everything to an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<Observation>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Observation>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ObservationSink for ChannelObserver {
    fn publish(&self, node_id: &str, value: &str) {
        let _ = self.tx.send(Observation::Value {
            node_id: node_id.to_string(),
            value: value.to_string(),
        });
    }

    fn on_partial(&self, node_id: &str, capability: &str, chunk: &str) {
        let _ = self.tx.send(Observation::Partial {
            node_id: node_id.to_string(),
            capability: capability.to_string(),
            chunk: chunk.to_string(),
        });
    }
}

/// Command sink that only logs what would have been dispatched
#[derive(Debug, Default, Clone)]
pub struct LogCommandSink;

impl CommandSink for LogCommandSink {
    fn send(&self, command: String) {
        log::info!("Command dispatched: {}", command);
    }
}

/// Command sink backed by an unbounded channel; never blocks the sender
#[derive(Debug, Clone)]
pub struct ChannelCommandSink {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelCommandSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Start a background worker that runs each command with `sh -c`, one at
    /// a time and in arrival order. Must be called inside a tokio runtime.
    ///
    /// The worker stops once every clone of the sink is dropped and the
    /// queue is empty; await [ShellWorker::finish] before exiting.
    pub fn spawn_shell() -> (Self, ShellWorker) {
        let (sink, mut rx) = Self::new();
        let handle = tokio::spawn(async move {
            let mut ran = 0;
            while let Some(command) = rx.recv().await {
                match Command::new("sh").arg("-c").arg(&command).status().await {
                    Ok(status) => log::info!("Shell command exited with {}: {}", status, command),
                    Err(e) => log::error!("Failed to start shell command '{}': {}", command, e),
                }
                ran += 1;
            }
            ran
        });
        (sink, ShellWorker { handle })
    }
}

/// Background task running the commands of a [ChannelCommandSink::spawn_shell] sink
#[derive(Debug)]
pub struct ShellWorker {
    handle: JoinHandle<usize>,
}

impl ShellWorker {
    /// Wait until every queued command has run; returns how many were run
    pub async fn finish(self) -> usize {
        match self.handle.await {
            Ok(ran) => {
                log::debug!("Shell worker finished after {} commands", ran);
                ran
            }
            Err(e) => {
                log::error!("Shell worker ended abnormally: {}", e);
                0
            }
        }
    }
}

impl CommandSink for ChannelCommandSink {
    fn send(&self, command: String) {
        if self.tx.send(command).is_err() {
            log::warn!("Command sink receiver is gone, command dropped");
        }
    }
}
