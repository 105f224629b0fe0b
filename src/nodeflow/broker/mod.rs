// SPDX-License-Identifier: MIT

//! Resource broker - pooled handles to capability servers
//!
//! Handles are owned by a [LeaseKey] (run id + node id) and tracked by the
//! broker, never stored on the node records. [NodeResources] scopes a broker to
//! one node task so the executor can return every handle exactly once.

pub mod mcp;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::adk::capability::CapabilityDescriptor;
use crate::adk::error::BrokerError;

pub use mcp::McpBroker;

/// Identifies the node task that owns a handle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaseKey {
    pub run_id: Uuid,
    pub node_id: String,
}

/// A leased handle to a capability server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    pub id: Uuid,
    pub server: String,
    pub lease: LeaseKey,
}

impl ResourceHandle {
    pub fn new(server: impl Into<String>, lease: LeaseKey) -> Self {
        Self {
            id: Uuid::new_v4(),
            server: server.into(),
            lease,
        }
    }
}

/// Pooling and lifecycle manager for capability servers
#[async_trait]
pub trait ResourceBroker: Send + Sync {
    /// Lease a handle to `server` for the node identified by `lease`
    async fn acquire(&self, server: &str, lease: &LeaseKey) -> Result<ResourceHandle, BrokerError>;

    /// Enumerate the capabilities behind a handle
    async fn list_capabilities(
        &self,
        handle: &ResourceHandle,
    ) -> Result<Vec<CapabilityDescriptor>, BrokerError>;

    /// Invoke one capability
    async fn invoke(
        &self,
        handle: &ResourceHandle,
        capability: &str,
        args: Value,
    ) -> Result<Value, BrokerError>;

    /// Return a handle to the pool
    async fn release(&self, handle: ResourceHandle) -> Result<(), BrokerError>;
}

/// Broker access scoped to a single node task.
///
/// Every acquired handle is remembered until it is released, so
/// [NodeResources::release_all] can return whatever a failed or timed-out
/// handler left behind. A handle is never released twice.
pub struct NodeResources {
    broker: Option<Arc<dyn ResourceBroker>>,
    lease: LeaseKey,
    held: Mutex<Vec<ResourceHandle>>,
}

impl NodeResources {
    pub fn new(broker: Option<Arc<dyn ResourceBroker>>, lease: LeaseKey) -> Self {
        Self {
            broker,
            lease,
            held: Mutex::new(Vec::new()),
        }
    }

    pub fn lease(&self) -> &LeaseKey {
        &self.lease
    }

    fn broker(&self, server: &str) -> Result<&Arc<dyn ResourceBroker>, BrokerError> {
        self.broker
            .as_ref()
            .ok_or_else(|| BrokerError::UnknownServer(server.to_string()))
    }

    /// Tracked handles; the lock is never held across an await
    fn tracked(&self) -> MutexGuard<'_, Vec<ResourceHandle>> {
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Lease a handle; it is tracked as soon as the broker issues it
    pub async fn acquire(&self, server: &str) -> Result<ResourceHandle, BrokerError> {
        let handle = self.broker(server)?.acquire(server, &self.lease).await?;
        self.tracked().push(handle.clone());
        log::debug!(
            "Node {} acquired handle {} on '{}'",
            self.lease.node_id,
            handle.id,
            server
        );
        Ok(handle)
    }

    pub async fn list_capabilities(
        &self,
        handle: &ResourceHandle,
    ) -> Result<Vec<CapabilityDescriptor>, BrokerError> {
        self.broker(&handle.server)?.list_capabilities(handle).await
    }

    pub async fn invoke(
        &self,
        handle: &ResourceHandle,
        capability: &str,
        args: Value,
    ) -> Result<Value, BrokerError> {
        self.broker(&handle.server)?
            .invoke(handle, capability, args)
            .await
    }

    /// Release one handle; a no-op if it was already returned
    pub async fn release(&self, handle: &ResourceHandle) {
        let taken = {
            let mut held = self.tracked();
            held.iter()
                .position(|h| h.id == handle.id)
                .map(|pos| held.remove(pos))
        };
        if let Some(handle) = taken {
            self.return_to_pool(handle).await;
        }
    }

    /// Release every handle still held by this node
    pub async fn release_all(&self) {
        let leftovers: Vec<ResourceHandle> = self.tracked().drain(..).collect();
        for handle in leftovers {
            log::debug!(
                "Releasing handle {} left by node {}",
                handle.id,
                self.lease.node_id
            );
            self.return_to_pool(handle).await;
        }
    }

    /// Number of handles currently held
    pub fn held(&self) -> usize {
        self.tracked().len()
    }

    async fn return_to_pool(&self, handle: ResourceHandle) {
        let Some(broker) = self.broker.as_ref() else {
            return;
        };
        let id = handle.id;
        if let Err(e) = broker.release(handle).await {
            log::warn!("Failed to release handle {}: {}", id, e);
        }
    }
}
