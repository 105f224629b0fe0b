// SPDX-License-Identifier: MIT

//! MCP-backed resource broker
//!
//! Pooling policy: one running session per server name, started on first
//! acquire and shared by every lease on that server. Each lease still gets its
//! own handle id so release can be tracked per node.

use async_trait::async_trait;
use rmcp::model::CallToolRequestParam;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{LeaseKey, ResourceBroker, ResourceHandle};
use crate::adk::capability::CapabilityDescriptor;
use crate::adk::error::BrokerError;
use crate::nodeflow::mcp::{McpServerConfig, McpService, McpServiceManager};

pub struct McpBroker {
    servers: HashMap<String, McpServerConfig>,
    manager: McpServiceManager,
    leases: Mutex<HashMap<Uuid, LeaseKey>>,
}

impl McpBroker {
    pub fn new(servers: impl IntoIterator<Item = McpServerConfig>) -> Self {
        Self {
            servers: servers
                .into_iter()
                .map(|config| (config.name.clone(), config))
                .collect(),
            manager: McpServiceManager::new(),
            leases: Mutex::new(HashMap::new()),
        }
    }

    /// Handles acquired and not yet released
    pub async fn outstanding(&self) -> Vec<LeaseKey> {
        self.leases.lock().await.values().cloned().collect()
    }

    async fn service(&self, handle: &ResourceHandle) -> Result<McpService, BrokerError> {
        if !self.leases.lock().await.contains_key(&handle.id) {
            return Err(BrokerError::NotHeld(handle.id));
        }
        self.manager
            .get_service(&handle.server)
            .await
            .ok_or_else(|| BrokerError::UnknownServer(handle.server.clone()))
    }
}

#[async_trait]
impl ResourceBroker for McpBroker {
    async fn acquire(&self, server: &str, lease: &LeaseKey) -> Result<ResourceHandle, BrokerError> {
        let config = self
            .servers
            .get(server)
            .ok_or_else(|| BrokerError::UnknownServer(server.to_string()))?;

        self.manager.get_or_create_service(config).await?;

        let handle = ResourceHandle::new(server, lease.clone());
        self.leases.lock().await.insert(handle.id, lease.clone());
        Ok(handle)
    }

    async fn list_capabilities(
        &self,
        handle: &ResourceHandle,
    ) -> Result<Vec<CapabilityDescriptor>, BrokerError> {
        let service = self.service(handle).await?;
        let service = service.read().await;

        let tools = service
            .list_all_tools()
            .await
            .map_err(|e| BrokerError::Invoke {
                name: "list_tools".to_string(),
                message: e.to_string(),
            })?;

        Ok(tools
            .into_iter()
            .map(|tool| CapabilityDescriptor {
                name: tool.name.to_string(),
                description: tool.description.as_deref().unwrap_or_default().to_string(),
                schema: Value::Object((*tool.input_schema).clone()),
            })
            .collect())
    }

    async fn invoke(
        &self,
        handle: &ResourceHandle,
        capability: &str,
        args: Value,
    ) -> Result<Value, BrokerError> {
        let service = self.service(handle).await?;
        let service = service.read().await;

        let arguments = match args {
            Value::Object(map) => Some(map),
            _ => None,
        };

        let invoke_err = |message: String| BrokerError::Invoke {
            name: capability.to_string(),
            message,
        };

        let result = service
            .call_tool(CallToolRequestParam {
                name: capability.to_string().into(),
                arguments,
            })
            .await
            .map_err(|e| invoke_err(e.to_string()))?;

        serde_json::to_value(result).map_err(|e| invoke_err(e.to_string()))
    }

    async fn release(&self, handle: ResourceHandle) -> Result<(), BrokerError> {
        match self.leases.lock().await.remove(&handle.id) {
            Some(lease) => {
                log::debug!(
                    "Released handle {} on '{}' (node {})",
                    handle.id,
                    handle.server,
                    lease.node_id
                );
                Ok(())
            }
            None => Err(BrokerError::NotHeld(handle.id)),
        }
    }
}
