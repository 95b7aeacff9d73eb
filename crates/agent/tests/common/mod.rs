//! Shared test doubles for agent tests

#![allow(dead_code)]

use async_trait::async_trait;
use carescope_agent::tools::{ToolError, ToolResult, ToolTrait};
use carescope_provider::{ChatParams, ChatResponse, Provider, ProviderError, ToolCall};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Provider that replays a fixed script and records every request
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ChatResponse, ProviderError>>>,
    fallback: String,
    pub requests: Mutex<Vec<ChatParams>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<ChatResponse, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: "done".to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, index: usize) -> ChatParams {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn chat(&self, params: ChatParams) -> carescope_provider::Result<ChatResponse> {
        self.requests.lock().unwrap().push(params);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ChatResponse::text(self.fallback.clone())))
    }

    fn default_model(&self) -> String {
        "scripted-model".to_string()
    }

    fn is_configured(&self) -> bool {
        true
    }
}

pub fn call(id: &str, name: &str, arguments: Value) -> ChatResponse {
    ChatResponse::with_tool_calls(vec![ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    }])
}

pub fn call_no_args(id: &str, name: &str) -> ChatResponse {
    call(id, name, json!({}))
}

/// Tool with a fixed outcome that counts its invocations
pub struct StubTool {
    name: String,
    result: ToolResult,
    pub calls: AtomicUsize,
}

impl StubTool {
    pub fn ok(name: &str, output: &str) -> Self {
        Self {
            name: name.to_string(),
            result: Ok(output.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &str, err: ToolError) -> Self {
        Self {
            name: name.to_string(),
            result: Err(err),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolTrait for StubTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "stub tool"
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _args: Value) -> ToolResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}
