//! Test doubles for running the whole pipeline without a model

#![allow(dead_code)]

use async_trait::async_trait;
use carescope_agent::tools::{ToolError, ToolResult, ToolTrait};
use carescope_agent::ToolRegistry;
use carescope_provider::{ChatParams, ChatResponse, Provider, ProviderError, ToolCall};
use serde_json::{json, Value};
use std::sync::Mutex;

pub const ALL_TOOLS: [&str; 9] = [
    "query_covid_cases_by_year",
    "query_healthcare_access",
    "query_vaccine_providers",
    "web_search",
    "fetch_web_content",
    "hospital_beds",
    "emergency_visits",
    "hospital_utilization",
    "emerging_challenges",
];

/// A scripted misbehaviour for one tool-free call
#[derive(Debug, Clone, Copy)]
pub enum Hiccup {
    RateLimited,
    Blank,
    NoApiKey,
}

/// Provider that behaves like a cooperative model.
///
/// With tools on offer it calls the first tool once and then answers
/// "finding". Without tools it writes every `## ` heading it finds in the
/// last user message, each with a short body.
pub struct HeadingEchoProvider {
    pub requests: Mutex<Vec<ChatParams>>,
    closing: bool,
    hiccups: Vec<(usize, Hiccup)>,
}

impl HeadingEchoProvider {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            closing: true,
            hiccups: Vec::new(),
        }
    }

    /// Never write Recommendations or Conclusion
    pub fn without_closing() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            closing: false,
            hiccups: Vec::new(),
        }
    }

    /// Misbehave on the given tool-free calls, counted from zero in the
    /// order they arrive (COVID synthesis, context synthesis, closing)
    pub fn with_hiccups(hiccups: Vec<(usize, Hiccup)>) -> Self {
        Self {
            hiccups,
            ..Self::new()
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn tool_free_requests(&self) -> Vec<ChatParams> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.tools.is_empty())
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Provider for HeadingEchoProvider {
    async fn chat(&self, params: ChatParams) -> carescope_provider::Result<ChatResponse> {
        self.requests.lock().unwrap().push(params.clone());

        if let Some(tool) = params.tools.first() {
            let answered = params.messages.last().map(|m| m.role == "tool").unwrap_or(false);
            if answered {
                return Ok(ChatResponse::text("finding"));
            }
            return Ok(ChatResponse::with_tool_calls(vec![ToolCall {
                id: "call_1".to_string(),
                name: tool.function.name.clone(),
                arguments: json!({"task": "look it up", "state": "Test State"}),
            }]));
        }

        let index = self.tool_free_requests().len() - 1;
        match self.hiccups.iter().find(|(i, _)| *i == index).map(|(_, h)| *h) {
            Some(Hiccup::RateLimited) => return Err(ProviderError::RateLimited),
            Some(Hiccup::NoApiKey) => return Err(ProviderError::NoApiKey),
            Some(Hiccup::Blank) => return Ok(ChatResponse::text("")),
            None => {}
        }

        let prompt = params.last_user_message().unwrap_or_default();
        let mut out = String::new();
        for line in prompt.lines().filter(|l| l.starts_with("## ")) {
            let heading = line.trim_start_matches("## ").trim();
            if !self.closing && (heading == "Recommendations" || heading == "Conclusion") {
                continue;
            }
            out.push_str(&format!("{}\n\nAnalysis for {}.\n\n", line, heading));
        }
        Ok(ChatResponse::text(out))
    }

    fn default_model(&self) -> String {
        "echo-model".to_string()
    }

    fn is_configured(&self) -> bool {
        true
    }
}

pub struct StubTool {
    name: String,
    result: ToolResult,
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
        self.result.clone()
    }
}

/// Registry where every tool succeeds
pub fn stub_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for name in ALL_TOOLS {
        registry.register(StubTool {
            name: name.to_string(),
            result: Ok(format!("{} data", name)),
        });
    }
    registry
}

/// Stub registry with one tool replaced by a failing one
pub fn registry_with_failure(name: &str, err: ToolError) -> ToolRegistry {
    let mut registry = stub_registry();
    registry.register(StubTool {
        name: name.to_string(),
        result: Err(err),
    });
    registry
}
