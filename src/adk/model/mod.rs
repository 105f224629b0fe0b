// SPDX-License-Identifier: MIT

//! Model module - defines the model client trait and shared message types
//!
//! Model implementations live in their own submodules:
//! - [openai] - OpenAI-compatible chat completion endpoints

pub mod openai;

use crate::adk::capability::CapabilityDescriptor;
use crate::adk::error::ModelError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Configuration for model generation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub top_p: Option<f32>,
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    /// A single-part text message
    pub fn text(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Concatenated text parts of this message
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Function calls requested in this message, in order, as
    /// `(call id, name, args)`
    pub fn function_calls(&self) -> Vec<(Option<&str>, &str, &serde_json::Value)> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::FunctionCall { id, name, args } => {
                    Some((id.as_deref(), name.as_str(), args))
                }
                _ => None,
            })
            .collect()
    }
}

/// Parts of a message - text, function calls, function responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Part {
    /// Regular text output from the model
    Text(String),
    /// Capability call requested by the model
    FunctionCall {
        /// Provider-assigned call id, echoed back in the matching response
        #[serde(default)]
        id: Option<String>,
        name: String,
        args: serde_json::Value,
    },
    /// Response from invoking a capability
    FunctionResponse {
        #[serde(default)]
        id: Option<String>,
        name: String,
        response: serde_json::Value,
    },
}

/// Core trait for model clients.
///
/// `capabilities` is `Some` only for tool-capable nodes; the model may answer
/// with [Part::FunctionCall] parts naming one of them.
#[async_trait]
pub trait Model: Send + Sync {
    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
        capabilities: Option<&[CapabilityDescriptor]>,
    ) -> Result<Content, ModelError>;
}
