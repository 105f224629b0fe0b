// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An externally invokable operation exposed by a capability server.
///
/// Descriptors are plain data: they are listed through the resource broker,
/// embedded into a model's system instructions and offered to the model as
/// callable functions. Invocation always goes back through the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    /// Capability name (unique within one server)
    pub name: String,
    /// Human-readable description of what the capability does
    #[serde(default)]
    pub description: String,
    /// JSON schema for the capability's arguments
    #[serde(default)]
    pub schema: Value,
}

impl CapabilityDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
        }
    }
}

/// Render a capability list as a bullet block for system instructions
pub fn describe_capabilities(capabilities: &[CapabilityDescriptor]) -> String {
    capabilities
        .iter()
        .map(|c| {
            if c.description.is_empty() {
                format!("- {}", c.name)
            } else {
                format!("- {}: {}", c.name, c.description)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
