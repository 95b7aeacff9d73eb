//! Single-tool worker agent

use std::sync::Arc;
use tracing::{debug, info, warn};

use carescope_provider::{ChatParams, Provider, ToolCallDef, ToolChoice};

use crate::context::ContextBuilder;
use crate::tools::{to_provider_tool, ToolError, ToolTrait};

/// Default tool-calling budget per task
pub const DEFAULT_MAX_STEPS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// The model produced a final answer
    Completed,
    /// The step budget ran out first
    Exhausted,
}

/// What a worker hands back to its manager
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub agent: String,
    pub answer: String,
    pub outcome: WorkerOutcome,
    /// Tool failures seen while working, in order
    pub degraded: Vec<String>,
    pub steps: u32,
}

impl WorkerReport {
    pub fn is_degraded(&self) -> bool {
        self.outcome == WorkerOutcome::Exhausted || !self.degraded.is_empty()
    }

    /// Reasons a manager should flag, empty when the run was clean
    pub fn reasons(&self) -> Vec<String> {
        let mut reasons = self.degraded.clone();
        if self.outcome == WorkerOutcome::Exhausted {
            reasons.push(format!(
                "{} stopped after {} steps without a final answer",
                self.agent, self.steps
            ));
        }
        reasons
    }
}

/// Agent that owns exactly one tool
pub struct WorkerAgent {
    name: String,
    description: String,
    tool: Arc<dyn ToolTrait>,
    provider: Arc<dyn Provider>,
    model: String,
    max_steps: u32,
    max_tokens: u32,
    temperature: f32,
    context: ContextBuilder,
}

impl WorkerAgent {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        tool: Arc<dyn ToolTrait>,
        provider: Arc<dyn Provider>,
    ) -> Self {
        let name = name.into();
        let description = description.into();
        let model = provider.default_model();
        Self {
            context: ContextBuilder::new(&name, &description),
            name,
            description,
            tool,
            provider,
            model,
            max_steps: DEFAULT_MAX_STEPS,
            max_tokens: 4096,
            temperature: 0.7,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn tool_name(&self) -> &str {
        self.tool.name()
    }

    async fn call_tool(&self, name: &str, args: serde_json::Value) -> Result<String, (ToolError, String)> {
        if name != self.tool.name() {
            let err = ToolError::UnknownTool(name.to_string());
            let rendered = format!("Error: {}", err);
            return Err((err, rendered));
        }

        self.tool.execute(args).await.map_err(|err| {
            let rendered = self.tool.render_failure(&err);
            (err, rendered)
        })
    }

    /// Work a task through the bounded tool-calling loop
    pub async fn run(&self, task: &str) -> crate::Result<WorkerReport> {
        info!("{} working on: {}", self.name, task);

        let mut messages = self.context.build_messages(
            self.context.worker_system_prompt(self.tool.name()),
            task,
        );
        let tools = vec![to_provider_tool(self.tool.as_ref())];
        let mut degraded = Vec::new();
        let mut partial: Option<String> = None;

        for step in 1..=self.max_steps {
            debug!("{} step {}", self.name, step);

            let params = ChatParams {
                model: self.model.clone(),
                messages: messages.clone(),
                tools: tools.clone(),
                max_tokens: self.max_tokens,
                temperature: self.temperature,
                tool_choice: ToolChoice::Auto,
            };
            let response = self.provider.chat(params).await?;

            if let Some(text) = response.text_content() {
                partial = Some(text.to_string());
            }

            if !response.has_tool_calls() {
                let answer = partial.unwrap_or_else(|| {
                    format!("{} finished without a written answer.", self.name)
                });
                return Ok(WorkerReport {
                    agent: self.name.clone(),
                    answer,
                    outcome: WorkerOutcome::Completed,
                    degraded,
                    steps: step,
                });
            }

            let tool_call_defs: Vec<ToolCallDef> = response
                .tool_calls
                .iter()
                .map(|tc| ToolCallDef::new(&tc.id, &tc.name, tc.arguments.clone()))
                .collect();
            ContextBuilder::add_assistant_message(
                &mut messages,
                response.content.as_deref(),
                Some(tool_call_defs),
            );

            for tool_call in &response.tool_calls {
                debug!("{} calling {}", self.name, tool_call.name);
                let result = match self
                    .call_tool(&tool_call.name, tool_call.arguments.clone())
                    .await
                {
                    Ok(result) => result,
                    Err((err, rendered)) => {
                        warn!("{}: {} failed: {}", self.name, tool_call.name, err);
                        degraded.push(format!("{}: {}", tool_call.name, err));
                        rendered
                    }
                };
                ContextBuilder::add_tool_result(
                    &mut messages,
                    &tool_call.id,
                    &tool_call.name,
                    &result,
                );
            }
        }

        warn!("{} exhausted {} steps", self.name, self.max_steps);
        let answer = partial.unwrap_or_else(|| {
            format!(
                "{} could not complete the task within {} steps.",
                self.name, self.max_steps
            )
        });

        Ok(WorkerReport {
            agent: self.name.clone(),
            answer,
            outcome: WorkerOutcome::Exhausted,
            degraded,
            steps: self.max_steps,
        })
    }
}
