// SPDX-License-Identifier: MIT

//! MCP client plumbing used by [crate::nodeflow::broker::McpBroker]

pub mod manager;

pub use manager::{McpServerConfig, McpServiceManager, McpService};

use rmcp::model::{ClientCapabilities, ClientInfo, Implementation};
use rmcp::service::{RoleClient, RunningService};
use rmcp::transport::child_process::TokioChildProcess;
use rmcp::{ClientHandler, ServiceExt};
use tokio::process::Command;

use crate::adk::error::BrokerError;

#[derive(Debug, Clone)]
pub struct BasicClientHandler;

impl ClientHandler for BasicClientHandler {
    fn get_info(&self) -> ClientInfo {
        ClientInfo {
            protocol_version: Default::default(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
        }
    }
}

/// Start an MCP server as a child process and connect to it over stdio.
pub async fn create_mcp_service(
    config: &McpServerConfig,
) -> Result<RunningService<RoleClient, BasicClientHandler>, BrokerError> {
    let connect_err = |message: String| BrokerError::Connect {
        server: config.name.clone(),
        message,
    };

    let mut server_cmd = Command::new(&config.command);
    server_cmd.args(&config.args);

    let transport = TokioChildProcess::new(server_cmd).map_err(|e| connect_err(e.to_string()))?;
    let service = BasicClientHandler
        .serve(transport)
        .await
        .map_err(|e| connect_err(e.to_string()))?;

    Ok(service)
}
