//! OpenAI-compatible chat-completions provider
//!
//! Works against xAI, OpenAI and any endpoint that speaks the
//! `/chat/completions` protocol with function calling.

use crate::*;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, trace, warn};

const XAI_API_BASE: &str = "https://api.x.ai/v1";
const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Chat-completions client
pub struct OpenAiCompatProvider {
    client: Client,
    api_key: String,
    api_base: String,
    default_model: String,
}

impl OpenAiCompatProvider {
    pub fn new(
        api_key: impl Into<String>,
        api_base: Option<String>,
        default_model: Option<String>,
    ) -> Self {
        let api_key = api_key.into();
        let is_xai = api_key.starts_with("xai-")
            || api_base
                .as_ref()
                .map(|b| b.contains("x.ai"))
                .unwrap_or(false);

        let api_base = api_base
            .map(|b| b.trim_end_matches('/').to_string())
            .unwrap_or_else(|| {
                if is_xai {
                    XAI_API_BASE.to_string()
                } else {
                    OPENAI_API_BASE.to_string()
                }
            });

        let default_model = default_model.unwrap_or_else(|| {
            if is_xai {
                "grok-2-1212".to_string()
            } else {
                "gpt-4o".to_string()
            }
        });

        Self {
            client: Client::new(),
            api_key,
            api_base,
            default_model,
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn build_request(&self, params: &ChatParams) -> serde_json::Value {
        let model = if params.model.is_empty() {
            self.default_model.clone()
        } else {
            params.model.clone()
        };

        let messages: Vec<serde_json::Value> = params
            .messages
            .iter()
            .map(|m| {
                let mut obj = json!({ "role": &m.role });
                if let Some(content) = &m.content {
                    obj["content"] = json!(content);
                }
                if let Some(tool_calls) = &m.tool_calls {
                    // the wire format carries arguments as a JSON string
                    let calls: Vec<serde_json::Value> = tool_calls
                        .iter()
                        .map(|c| {
                            json!({
                                "id": c.id,
                                "type": c.call_type,
                                "function": {
                                    "name": c.function.name,
                                    "arguments": c.function.arguments.to_string(),
                                }
                            })
                        })
                        .collect();
                    obj["tool_calls"] = json!(calls);
                }
                if let Some(tool_call_id) = &m.tool_call_id {
                    obj["tool_call_id"] = json!(tool_call_id);
                }
                if let Some(name) = &m.name {
                    obj["name"] = json!(name);
                }
                obj
            })
            .collect();

        let mut body = json!({
            "model": model,
            "messages": messages,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
        });

        if !params.tools.is_empty() {
            body["tools"] = json!(params.tools);
            body["tool_choice"] = match &params.tool_choice {
                ToolChoice::Auto => json!("auto"),
                ToolChoice::None => json!("none"),
            };
        }

        body
    }

    fn parse_response(&self, json: serde_json::Value) -> Result<ChatResponse> {
        let choice = json["choices"]
            .get(0)
            .ok_or(ProviderError::InvalidResponse)?;
        let message = &choice["message"];
        let content = message["content"].as_str().map(|s| s.to_string());
        let finish_reason = choice["finish_reason"]
            .as_str()
            .unwrap_or("stop")
            .to_string();

        let mut tool_calls = Vec::new();
        if let Some(calls) = message["tool_calls"].as_array() {
            for (i, call) in calls.iter().enumerate() {
                let function = &call["function"];
                let args = match &function["arguments"] {
                    serde_json::Value::String(s) => {
                        serde_json::from_str(s).unwrap_or_else(|_| json!(s))
                    }
                    serde_json::Value::Null => json!({}),
                    other => other.clone(),
                };

                let id = call["id"]
                    .as_str()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("call_{}", i));

                tool_calls.push(ToolCall {
                    id,
                    name: function["name"].as_str().unwrap_or("").to_string(),
                    arguments: args,
                });
            }
        }

        let usage = match json["usage"].as_object() {
            Some(usage) => {
                let field = |k: &str| usage.get(k).and_then(|v| v.as_u64()).unwrap_or(0) as u32;
                Usage {
                    prompt_tokens: field("prompt_tokens"),
                    completion_tokens: field("completion_tokens"),
                    total_tokens: field("total_tokens"),
                }
            }
            None => Usage::default(),
        };

        Ok(ChatResponse {
            content,
            tool_calls,
            finish_reason,
            usage,
        })
    }
}

#[async_trait::async_trait]
impl Provider for OpenAiCompatProvider {
    async fn chat(&self, params: ChatParams) -> Result<ChatResponse> {
        if !self.is_configured() {
            return Err(ProviderError::NoApiKey);
        }

        trace!("Sending chat request to {}", self.api_base);

        let url = format!("{}/chat/completions", self.api_base);
        let body = self.build_request(&params);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            if status.as_u16() == 429 {
                return Err(ProviderError::RateLimited);
            }
            let message = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(|s| s.to_string()))
                .unwrap_or_else(|| text.chars().take(200).collect());
            warn!("Model API returned {}: {}", status, message);
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let json: serde_json::Value = serde_json::from_str(&text)?;
        let response = self.parse_response(json)?;

        debug!(
            "Model replied with {} tool calls ({} tokens)",
            response.tool_calls.len(),
            response.usage.total_tokens
        );

        Ok(response)
    }

    fn default_model(&self) -> String {
        self.default_model.clone()
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}
