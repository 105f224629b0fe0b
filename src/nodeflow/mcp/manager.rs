// SPDX-License-Identifier: MIT

use rmcp::service::{RoleClient, RunningService};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};

use super::{create_mcp_service, BasicClientHandler};
use crate::adk::error::BrokerError;

/// Configuration for an MCP server
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct McpServerConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// A running MCP session shared by every lease on the same server
pub type McpService = Arc<RwLock<RunningService<RoleClient, BasicClientHandler>>>;

/// Session slot for one server name, filled by the first successful start
type ServiceSlot = Arc<OnceCell<McpService>>;

/// Manages the lifecycle of MCP services, one session per server name.
///
/// The map lock only guards slot lookup. Starting a server happens inside
/// its own slot, so a slow start never blocks traffic to other servers.
pub struct McpServiceManager {
    services: RwLock<HashMap<String, ServiceSlot>>,
}

impl McpServiceManager {
    pub fn new() -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
        }
    }

    async fn slot(&self, name: &str) -> ServiceSlot {
        if let Some(slot) = self.services.read().await.get(name) {
            return slot.clone();
        }
        self.services
            .write()
            .await
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Get or create the MCP service for the given server configuration.
    ///
    /// Concurrent callers for the same server share one start; a failed start
    /// leaves the slot empty for the next caller.
    pub async fn get_or_create_service(
        &self,
        config: &McpServerConfig,
    ) -> Result<McpService, BrokerError> {
        let slot = self.slot(&config.name).await;
        slot.get_or_try_init(|| async {
            log::info!(
                "Creating MCP service '{}' with command: {} {:?}",
                config.name,
                config.command,
                config.args
            );
            Ok::<_, BrokerError>(Arc::new(RwLock::new(create_mcp_service(config).await?)))
        })
        .await
        .cloned()
    }

    /// Get an existing service by name; `None` while it is still starting
    pub async fn get_service(&self, name: &str) -> Option<McpService> {
        let services = self.services.read().await;
        services.get(name).and_then(|slot| slot.get().cloned())
    }

    /// Number of running sessions
    pub async fn len(&self) -> usize {
        self.services
            .read()
            .await
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for McpServiceManager {
    fn default() -> Self {
        Self::new()
    }
}
