// SPDX-License-Identifier: MIT

//! OpenAI Model - chat completion client for OpenAI-compatible endpoints

use super::{Content, GenerationConfig, Model, Part};
use crate::adk::capability::CapabilityDescriptor;
use crate::adk::error::ModelError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::env;

const PROVIDER: &str = "OpenAI";

/// OpenAI chat completion model
pub struct OpenAIModel {
    client: Client,
    api_key: String,
    model_name: String,
    base_url: String,
}

impl OpenAIModel {
    /// Create a new OpenAIModel
    ///
    /// Requires `OPENAI_API_KEY` environment variable to be set.
    /// Optionally uses `OPENAI_BASE_URL` for custom endpoints.
    pub fn new(model_name: impl Into<String>) -> Result<Self, ModelError> {
        let api_key =
            env::var("OPENAI_API_KEY").map_err(|_| ModelError::ApiKeyMissing(PROVIDER.into()))?;
        let base_url =
            env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        Ok(Self::with_endpoint(model_name, api_key, base_url))
    }

    /// Create a model against an explicit endpoint
    pub fn with_endpoint(
        model_name: impl Into<String>,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model_name: model_name.into(),
            base_url: base_url.into(),
        }
    }

    /// Convert internal Content to OpenAI messages.
    ///
    /// Function responses become one `tool` message each; calls without a
    /// provider id fall back to the capability name.
    fn content_to_openai_messages(content: &Content) -> Vec<Value> {
        let role = match content.role.as_str() {
            "model" => "assistant",
            other => other,
        };

        let tool_messages: Vec<Value> = content
            .parts
            .iter()
            .filter_map(|part| match part {
                Part::FunctionResponse { id, name, response } => Some(json!({
                    "role": "tool",
                    "tool_call_id": id.as_deref().unwrap_or(name),
                    "content": serde_json::to_string(response).unwrap_or_default()
                })),
                _ => None,
            })
            .collect();
        if !tool_messages.is_empty() {
            return tool_messages;
        }

        let mut tool_calls = Vec::new();
        for (id, name, args) in content.function_calls() {
            tool_calls.push(json!({
                "id": id.unwrap_or(name),
                "type": "function",
                "function": {
                    "name": name,
                    "arguments": serde_json::to_string(args).unwrap_or_default()
                }
            }));
        }

        let text_content = content.joined_text();
        let message = if !tool_calls.is_empty() {
            json!({
                "role": role,
                "content": if text_content.is_empty() { Value::Null } else { json!(text_content) },
                "tool_calls": tool_calls
            })
        } else {
            json!({
                "role": role,
                "content": text_content
            })
        };
        vec![message]
    }

    /// Convert capabilities to OpenAI function format
    fn capabilities_to_openai_format(capabilities: &[CapabilityDescriptor]) -> Vec<Value> {
        capabilities
            .iter()
            .map(|c| {
                let parameters = if c.schema.is_null() {
                    json!({"type": "object", "properties": {}})
                } else {
                    c.schema.clone()
                };
                json!({
                    "type": "function",
                    "function": {
                        "name": c.name,
                        "description": c.description,
                        "parameters": parameters
                    }
                })
            })
            .collect()
    }

    /// Parse OpenAI response into Content
    fn parse_openai_response(response: &Value) -> Result<Content, ModelError> {
        let choice = response["choices"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or_else(|| ModelError::InvalidResponse("no choices in response".into()))?;

        let message = &choice["message"];
        let mut parts = Vec::new();

        if let Some(content) = message["content"].as_str() {
            if !content.is_empty() {
                parts.push(Part::Text(content.to_string()));
            }
        }

        if let Some(tool_calls) = message["tool_calls"].as_array() {
            for tc in tool_calls {
                let name = tc["function"]["name"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                let args_str = tc["function"]["arguments"].as_str().unwrap_or("{}");
                let args: Value = serde_json::from_str(args_str).unwrap_or(json!({}));
                let id = tc["id"].as_str().map(str::to_string);

                parts.push(Part::FunctionCall { id, name, args });
            }
        }

        Ok(Content {
            role: "model".to_string(),
            parts,
        })
    }
}

#[async_trait]
impl Model for OpenAIModel {
    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
        capabilities: Option<&[CapabilityDescriptor]>,
    ) -> Result<Content, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);

        let messages: Vec<Value> = history
            .iter()
            .flat_map(Self::content_to_openai_messages)
            .collect();

        let mut body = json!({
            "model": self.model_name,
            "messages": messages
        });

        if let Some(cfg) = config {
            if let Some(temp) = cfg.temperature {
                body["temperature"] = json!(temp);
            }
            if let Some(max_tokens) = cfg.max_output_tokens {
                body["max_tokens"] = json!(max_tokens);
            }
            if let Some(top_p) = cfg.top_p {
                body["top_p"] = json!(top_p);
            }
        }

        if let Some(capabilities) = capabilities {
            if !capabilities.is_empty() {
                body["tools"] = json!(Self::capabilities_to_openai_format(capabilities));
                body["tool_choice"] = json!("auto");
            }
        }

        log::debug!(
            "OpenAI request body: {}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let text = resp.text().await?;
            return Err(ModelError::Api {
                provider: PROVIDER.to_string(),
                message: text,
            });
        }

        let resp_json: Value = resp.json().await?;
        log::debug!("OpenAI response: {}", resp_json);

        Self::parse_openai_response(&resp_json)
    }
}
