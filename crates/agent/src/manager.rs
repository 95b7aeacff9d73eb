//! Manager agent: runs a plan over worker delegates and synthesizes the
//! findings with one model call.
//!
//! In scripted mode the plan is interpreted step by step, in order, with a
//! bounded number of attempts per step. In model-driven mode the delegates
//! are offered to the model as tools and the plan becomes the numbered
//! procedure in the prompt; only reachability is guaranteed there.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use carescope_config::DelegationMode;
use carescope_provider::{ChatParams, Message, Provider, ToolCallDef, ToolChoice};

use crate::context::ContextBuilder;
use crate::tools::{ToolError, ToolRegistry, ToolResult, ToolTrait};
use crate::worker::WorkerAgent;
use crate::AgentError;

/// Default attempts per plan step
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// One delegation: which worker, what to ask, and which earlier steps'
/// answers to pass along (zero-based step indices)
#[derive(Debug, Clone, PartialEq)]
pub struct PlanStep {
    pub delegate: String,
    pub task: String,
    pub context_from: Vec<usize>,
}

impl PlanStep {
    pub fn new(delegate: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            delegate: delegate.into(),
            task: task.into(),
            context_from: Vec::new(),
        }
    }

    pub fn with_context_from(mut self, steps: Vec<usize>) -> Self {
        self.context_from = steps;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
    pub max_attempts: u32,
}

impl Plan {
    pub fn new(steps: Vec<PlanStep>) -> Self {
        Self {
            steps,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Numbered procedure as shown to the model
    pub fn procedure(&self) -> String {
        self.steps
            .iter()
            .enumerate()
            .map(|(i, step)| format!("{}. Use {}: {}", i + 1, step.delegate, step.task))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Completed,
    /// The delegate answered but a tool failed or its budget ran out
    Degraded(Vec<String>),
    /// Every attempt failed outright
    Failed(String),
}

/// Result of one executed step
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub delegate: String,
    pub task: String,
    pub attempts: u32,
    pub answer: String,
    pub outcome: StepOutcome,
}

impl StepRecord {
    pub fn is_completed(&self) -> bool {
        self.outcome == StepOutcome::Completed
    }

    pub fn reasons(&self) -> Vec<String> {
        match &self.outcome {
            StepOutcome::Completed => Vec::new(),
            StepOutcome::Degraded(reasons) => reasons.clone(),
            StepOutcome::Failed(reason) => vec![format!("{}: {}", self.delegate, reason)],
        }
    }

    fn status_label(&self) -> &'static str {
        match self.outcome {
            StepOutcome::Completed => "completed",
            StepOutcome::Degraded(_) => "degraded",
            StepOutcome::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ManagerReport {
    pub manager: String,
    pub findings: Vec<StepRecord>,
    /// Markdown produced by the synthesis call; empty when every attempt
    /// failed or came back blank
    pub synthesis: String,
}

impl ManagerReport {
    /// Every degradation reason across all steps, in step order
    pub fn degraded_reasons(&self) -> Vec<String> {
        self.findings.iter().flat_map(StepRecord::reasons).collect()
    }

    pub fn is_degraded(&self) -> bool {
        self.findings.iter().any(|f| !f.is_completed())
    }

    /// Reasons from steps run by one of the named delegates
    pub fn reasons_for(&self, delegates: &[&str]) -> Vec<String> {
        self.findings
            .iter()
            .filter(|f| delegates.contains(&f.delegate.as_str()))
            .flat_map(StepRecord::reasons)
            .collect()
    }
}

/// Runs one worker up to `max_attempts` times until it comes back clean
async fn run_with_attempts(worker: &WorkerAgent, task: &str, max_attempts: u32) -> StepRecord {
    let mut best = None;
    let mut last_error = String::new();
    let mut attempts = 0;

    while attempts < max_attempts {
        attempts += 1;
        match worker.run(task).await {
            Ok(report) if !report.is_degraded() => {
                return StepRecord {
                    delegate: worker.name().to_string(),
                    task: task.to_string(),
                    attempts,
                    answer: report.answer,
                    outcome: StepOutcome::Completed,
                };
            }
            Ok(report) => {
                warn!(
                    "{} attempt {}/{} degraded: {:?}",
                    worker.name(),
                    attempts,
                    max_attempts,
                    report.reasons()
                );
                best = Some(report);
            }
            Err(e) => {
                warn!(
                    "{} attempt {}/{} failed: {}",
                    worker.name(),
                    attempts,
                    max_attempts,
                    e
                );
                last_error = e.to_string();
                if e.is_fatal() {
                    break;
                }
            }
        }
    }

    match best {
        Some(report) => StepRecord {
            delegate: worker.name().to_string(),
            task: task.to_string(),
            attempts,
            outcome: StepOutcome::Degraded(report.reasons()),
            answer: report.answer,
        },
        None => StepRecord {
            delegate: worker.name().to_string(),
            task: task.to_string(),
            attempts,
            answer: format!("{} returned no data: {}", worker.name(), last_error),
            outcome: StepOutcome::Failed(last_error),
        },
    }
}

/// A worker exposed to the model as a callable tool
pub struct DelegateTool {
    worker: Arc<WorkerAgent>,
    max_attempts: u32,
    calls: Mutex<u32>,
    records: Arc<Mutex<Vec<StepRecord>>>,
}

impl DelegateTool {
    pub fn new(
        worker: Arc<WorkerAgent>,
        max_attempts: u32,
        records: Arc<Mutex<Vec<StepRecord>>>,
    ) -> Self {
        Self {
            worker,
            max_attempts,
            calls: Mutex::new(0),
            records,
        }
    }
}

#[async_trait]
impl ToolTrait for DelegateTool {
    fn name(&self) -> &str {
        self.worker.name()
    }

    fn description(&self) -> &str {
        self.worker.description()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task": { "type": "string", "description": "What this agent should find out" }
            },
            "required": ["task"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let task = args["task"]
            .as_str()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("task is required".to_string()))?
            .to_string();

        {
            let mut calls = self.calls.lock().await;
            if *calls >= self.max_attempts {
                return Err(ToolError::Upstream(format!(
                    "{} already ran {} times; continue with existing data",
                    self.worker.name(),
                    self.max_attempts
                )));
            }
            *calls += 1;
        }

        let record = run_with_attempts(&self.worker, &task, 1).await;
        let answer = record.answer.clone();
        let failed = match &record.outcome {
            StepOutcome::Failed(reason) => Some(reason.clone()),
            _ => None,
        };
        self.records.lock().await.push(record);

        match failed {
            Some(reason) => Err(ToolError::Upstream(reason)),
            None => Ok(answer),
        }
    }
}

/// Agent that delegates to workers and writes sections from their findings
pub struct ManagerAgent {
    name: String,
    provider: Arc<dyn Provider>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    mode: DelegationMode,
    delegates: HashMap<String, Arc<WorkerAgent>>,
    context: ContextBuilder,
}

impl ManagerAgent {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        provider: Arc<dyn Provider>,
    ) -> Self {
        let name = name.into();
        let model = provider.default_model();
        Self {
            context: ContextBuilder::new(&name, description),
            name,
            provider,
            model,
            max_tokens: 8192,
            temperature: 0.7,
            mode: DelegationMode::default(),
            delegates: HashMap::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn with_mode(mut self, mode: DelegationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn add_delegate(&mut self, worker: WorkerAgent) {
        self.delegates
            .insert(worker.name().to_string(), Arc::new(worker));
    }

    pub fn delegate_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.delegates.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn delegate(&self, name: &str) -> crate::Result<&Arc<WorkerAgent>> {
        self.delegates
            .get(name)
            .ok_or_else(|| AgentError::DelegateNotFound(name.to_string()))
    }

    /// Execute the plan, then synthesize one markdown reply.
    ///
    /// `brief` states what to write, including the exact headings.
    pub async fn run(&self, plan: &Plan, brief: &str) -> crate::Result<ManagerReport> {
        if plan.steps.is_empty() {
            return Err(AgentError::EmptyPlan(self.name.clone()));
        }
        for step in &plan.steps {
            self.delegate(&step.delegate)?;
        }

        info!(
            "{} running {} steps ({:?})",
            self.name,
            plan.steps.len(),
            self.mode
        );

        let findings = match self.mode {
            DelegationMode::Scripted => self.run_scripted(plan).await?,
            DelegationMode::ModelDriven => self.run_model_driven(plan, brief).await?,
        };

        let degraded = findings.iter().filter(|f| !f.is_completed()).count();
        if degraded > 0 {
            warn!("{}: {} of {} steps degraded", self.name, degraded, findings.len());
        }

        let synthesis = self.synthesize(plan, brief, &findings).await?;
        Ok(ManagerReport {
            manager: self.name.clone(),
            findings,
            synthesis,
        })
    }

    async fn run_scripted(&self, plan: &Plan) -> crate::Result<Vec<StepRecord>> {
        let mut findings: Vec<StepRecord> = Vec::with_capacity(plan.steps.len());

        for (index, step) in plan.steps.iter().enumerate() {
            let worker = self.delegate(&step.delegate)?;

            let mut task = step.task.clone();
            for &from in &step.context_from {
                match findings.get(from) {
                    Some(prior) if from < index => {
                        task.push_str(&format!(
                            "\n\nContext from step {} ({}):\n{}",
                            from + 1,
                            prior.delegate,
                            prior.answer
                        ));
                    }
                    _ => warn!(
                        "{}: step {} asks for context from step {}, which has not run",
                        self.name,
                        index + 1,
                        from + 1
                    ),
                }
            }

            debug!("{}: step {} -> {}", self.name, index + 1, step.delegate);
            let mut record = run_with_attempts(worker, &task, plan.max_attempts).await;
            // keep the declared task, not the context-expanded prompt
            record.task = step.task.clone();
            findings.push(record);
        }

        Ok(findings)
    }

    async fn run_model_driven(&self, plan: &Plan, brief: &str) -> crate::Result<Vec<StepRecord>> {
        let records = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ToolRegistry::new();
        for name in self.delegate_names() {
            let worker = Arc::clone(self.delegate(&name)?);
            registry.register(DelegateTool::new(
                worker,
                plan.max_attempts,
                Arc::clone(&records),
            ));
        }

        let task = format!(
            "{}\n\nFollow these steps, calling the agents as tools:\n{}\n\n\
             Only retry an agent at most {} times. If still not resolved, continue with existing data.\n\
             Reply with a short note once every step has been attempted.",
            brief,
            plan.procedure(),
            plan.max_attempts
        );
        let mut messages = self
            .context
            .build_messages(self.context.manager_system_prompt(), &task);
        let tools = registry.definitions();
        let max_rounds = plan.steps.len() as u32 * plan.max_attempts + 2;

        for round in 1..=max_rounds {
            debug!("{} delegation round {}", self.name, round);
            let response = self
                .provider
                .chat(ChatParams {
                    model: self.model.clone(),
                    messages: messages.clone(),
                    tools: tools.clone(),
                    max_tokens: self.max_tokens,
                    temperature: self.temperature,
                    tool_choice: ToolChoice::Auto,
                })
                .await?;

            if !response.has_tool_calls() {
                break;
            }

            let defs: Vec<ToolCallDef> = response
                .tool_calls
                .iter()
                .map(|tc| ToolCallDef::new(&tc.id, &tc.name, tc.arguments.clone()))
                .collect();
            ContextBuilder::add_assistant_message(
                &mut messages,
                response.content.as_deref(),
                Some(defs),
            );

            for call in &response.tool_calls {
                let result = match registry.get(&call.name) {
                    Some(tool) => match tool.execute(call.arguments.clone()).await {
                        Ok(answer) => answer,
                        Err(e) => tool.render_failure(&e),
                    },
                    None => format!("Error: {}", ToolError::UnknownTool(call.name.clone())),
                };
                ContextBuilder::add_tool_result(&mut messages, &call.id, &call.name, &result);
            }
        }

        let findings = records.lock().await.clone();
        Ok(findings)
    }

    fn findings_block(findings: &[StepRecord]) -> String {
        findings
            .iter()
            .enumerate()
            .map(|(i, f)| {
                let mut block = format!(
                    "### Step {}: {} ({})\nTask: {}\n\n{}",
                    i + 1,
                    f.delegate,
                    f.status_label(),
                    f.task,
                    f.answer
                );
                let reasons = f.reasons();
                if !reasons.is_empty() {
                    block.push_str(&format!("\n\nData problems: {}", reasons.join("; ")));
                }
                block
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// One synthesis call, retried up to the plan's attempt budget. A blank
    /// reply counts as a failed attempt. Only fatal provider errors are
    /// returned; otherwise the synthesis comes back empty.
    async fn synthesize(
        &self,
        plan: &Plan,
        brief: &str,
        findings: &[StepRecord],
    ) -> crate::Result<String> {
        let prompt = format!(
            "{}\n\n## Procedure followed\n{}\n\n## Findings\n{}",
            brief,
            plan.procedure(),
            Self::findings_block(findings)
        );

        for attempt in 1..=plan.max_attempts {
            let result = self
                .provider
                .chat(ChatParams {
                    model: self.model.clone(),
                    messages: vec![
                        Message::system(self.context.manager_system_prompt()),
                        Message::user(prompt.clone()),
                    ],
                    tools: Vec::new(),
                    max_tokens: self.max_tokens,
                    temperature: self.temperature,
                    tool_choice: ToolChoice::None,
                })
                .await;

            match result {
                Ok(response) => match response.text_content() {
                    Some(text) => return Ok(text.to_string()),
                    None => warn!(
                        "{} synthesis attempt {}/{} came back blank",
                        self.name, attempt, plan.max_attempts
                    ),
                },
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => warn!(
                    "{} synthesis attempt {}/{} failed: {}",
                    self.name, attempt, plan.max_attempts, e
                ),
            }
        }

        warn!("{} wrote nothing; its sections will be missing", self.name);
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_procedure() {
        let plan = Plan::new(vec![
            PlanStep::new("hospital_beds_agent", "Analyze bed trends"),
            PlanStep::new("web_search_agent", "Search Ohio history").with_context_from(vec![0]),
        ]);

        assert_eq!(plan.max_attempts, 3);
        assert_eq!(
            plan.procedure(),
            "1. Use hospital_beds_agent: Analyze bed trends\n2. Use web_search_agent: Search Ohio history"
        );
        assert_eq!(plan.steps[1].context_from, vec![0]);
        assert_eq!(plan.with_max_attempts(0).max_attempts, 1);
    }

    #[test]
    fn test_step_record_reasons() {
        let mut record = StepRecord {
            delegate: "emergency_visits_agent".to_string(),
            task: "t".to_string(),
            attempts: 3,
            answer: String::new(),
            outcome: StepOutcome::Failed("rate limited".to_string()),
        };
        assert_eq!(record.reasons(), vec!["emergency_visits_agent: rate limited"]);
        assert_eq!(record.status_label(), "failed");

        record.outcome = StepOutcome::Degraded(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(record.reasons().len(), 2);

        record.outcome = StepOutcome::Completed;
        assert!(record.is_completed());
        assert!(record.reasons().is_empty());
    }
}
