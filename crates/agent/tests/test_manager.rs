//! Tests for the manager's plan interpreter and synthesis

mod common;

use carescope_agent::tools::ToolError;
use carescope_agent::{AgentError, ManagerAgent, Plan, PlanStep, StepOutcome, WorkerAgent};
use carescope_config::DelegationMode;
use carescope_provider::{ChatResponse, ProviderError};
use common::{call, call_no_args, ScriptedProvider, StubTool};
use serde_json::json;
use std::sync::Arc;

fn manager_with(
    provider: Arc<ScriptedProvider>,
    tools: Vec<(&str, Arc<StubTool>)>,
) -> ManagerAgent {
    let mut manager = ManagerAgent::new("healthcare_context_manager", "Writes context", provider.clone());
    for (agent, tool) in tools {
        manager.add_delegate(WorkerAgent::new(agent, format!("{} delegate", agent), tool, provider.clone()));
    }
    manager
}

#[tokio::test]
async fn test_scripted_plan_runs_in_order() {
    // each worker answers directly, then one synthesis call
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok(ChatResponse::text("beds finding")),
        Ok(ChatResponse::text("visits finding")),
        Ok(ChatResponse::text("## Historical Healthcare System Context\nText")),
    ]));
    let manager = manager_with(
        provider.clone(),
        vec![
            ("hospital_beds_agent", Arc::new(StubTool::ok("hospital_beds", "t"))),
            ("emergency_visits_agent", Arc::new(StubTool::ok("emergency_visits", "t"))),
        ],
    );

    let plan = Plan::new(vec![
        PlanStep::new("hospital_beds_agent", "Analyze bed trends"),
        PlanStep::new("emergency_visits_agent", "Analyze ED visits"),
    ]);
    let report = manager.run(&plan, "Write the context section").await.unwrap();

    assert_eq!(report.findings.len(), 2);
    assert_eq!(report.findings[0].delegate, "hospital_beds_agent");
    assert_eq!(report.findings[0].answer, "beds finding");
    assert_eq!(report.findings[1].delegate, "emergency_visits_agent");
    assert!(!report.is_degraded());
    assert_eq!(report.synthesis, "## Historical Healthcare System Context\nText");

    assert_eq!(provider.request_count(), 3);
    let synthesis = provider.request(2);
    assert!(synthesis.tools.is_empty());
    let prompt = synthesis.last_user_message().unwrap();
    assert!(prompt.starts_with("Write the context section"));
    assert!(prompt.contains("1. Use hospital_beds_agent: Analyze bed trends"));
    assert!(prompt.contains("### Step 2: emergency_visits_agent (completed)"));
}

#[tokio::test]
async fn test_step_retried_up_to_max_attempts_then_degraded() {
    // worker: tool call + answer, three times; then synthesis
    let mut script = Vec::new();
    for i in 0..3 {
        script.push(Ok(call_no_args(&format!("c{}", i), "hospital_beds")));
        script.push(Ok(ChatResponse::text("no data")));
    }
    script.push(Ok(ChatResponse::text("## Historical Healthcare System Context\nPartial")));
    let provider = Arc::new(ScriptedProvider::new(script));

    let tool = Arc::new(StubTool::failing(
        "hospital_beds",
        ToolError::NotFound("/d/beds.csv".to_string()),
    ));
    let manager = manager_with(provider.clone(), vec![("hospital_beds_agent", tool.clone())]);

    let plan = Plan::new(vec![PlanStep::new("hospital_beds_agent", "Analyze")]);
    let report = manager.run(&plan, "brief").await.unwrap();

    assert_eq!(tool.call_count(), 3);
    let step = &report.findings[0];
    assert_eq!(step.attempts, 3);
    assert_eq!(
        step.outcome,
        StepOutcome::Degraded(vec!["hospital_beds: File '/d/beds.csv' not found.".to_string()])
    );
    assert!(report.is_degraded());
    assert_eq!(
        report.reasons_for(&["hospital_beds_agent"]),
        vec!["hospital_beds: File '/d/beds.csv' not found."]
    );
    assert!(report.reasons_for(&["web_search_agent"]).is_empty());
    assert!(provider
        .request(6)
        .last_user_message()
        .unwrap()
        .contains("Data problems: hospital_beds"));
}

#[tokio::test]
async fn test_provider_failures_mark_step_failed_and_continue() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Err(ProviderError::RateLimited),
        Err(ProviderError::RateLimited),
        Ok(ChatResponse::text("search finding")),
        Ok(ChatResponse::text("## Emerging Challenges\nok")),
    ]));
    let manager = manager_with(
        provider.clone(),
        vec![
            ("hospital_utilization_agent", Arc::new(StubTool::ok("hospital_utilization", "t"))),
            ("web_search_agent", Arc::new(StubTool::ok("web_search", "{}"))),
        ],
    );

    let plan = Plan::new(vec![
        PlanStep::new("hospital_utilization_agent", "Summarize utilization"),
        PlanStep::new("web_search_agent", "Search"),
    ])
    .with_max_attempts(2);

    let report = manager.run(&plan, "brief").await.unwrap();
    assert!(matches!(report.findings[0].outcome, StepOutcome::Failed(_)));
    assert_eq!(report.findings[0].attempts, 2);
    assert!(report.findings[1].is_completed());
    assert_eq!(report.synthesis, "## Emerging Challenges\nok");
}

#[tokio::test]
async fn test_context_from_earlier_step() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok(ChatResponse::text("https://example.org/ohio-history")),
        Ok(ChatResponse::text("fetched")),
        Ok(ChatResponse::text("## Emerging Challenges\nok")),
    ]));
    let manager = manager_with(
        provider.clone(),
        vec![
            ("web_search_agent", Arc::new(StubTool::ok("web_search", "{}"))),
            ("fetch_web_content_agent", Arc::new(StubTool::ok("fetch_web_content", "page"))),
        ],
    );

    let plan = Plan::new(vec![
        PlanStep::new("web_search_agent", "Search Ohio history"),
        PlanStep::new("fetch_web_content_agent", "Fetch the most relevant results")
            .with_context_from(vec![0]),
    ]);
    let report = manager.run(&plan, "brief").await.unwrap();

    let fetch_task = provider.request(1).last_user_message().unwrap().to_string();
    assert!(fetch_task.starts_with("Fetch the most relevant results"));
    assert!(fetch_task.contains("Context from step 1 (web_search_agent):\nhttps://example.org/ohio-history"));
    assert_eq!(report.findings[1].task, "Fetch the most relevant results");
}

#[tokio::test]
async fn test_unregistered_delegate_is_unreachable() {
    let provider = Arc::new(ScriptedProvider::new(vec![]));
    let manager = manager_with(provider.clone(), vec![]);

    let plan = Plan::new(vec![PlanStep::new("shell_agent", "rm -rf")]);
    let err = manager.run(&plan, "brief").await.unwrap_err();

    assert!(matches!(err, AgentError::DelegateNotFound(name) if name == "shell_agent"));
    assert_eq!(provider.request_count(), 0);
}

#[tokio::test]
async fn test_empty_plan() {
    let provider = Arc::new(ScriptedProvider::new(vec![]));
    let manager = manager_with(
        provider.clone(),
        vec![("web_search_agent", Arc::new(StubTool::ok("web_search", "{}")))],
    );

    let err = manager.run(&Plan::new(vec![]), "brief").await.unwrap_err();
    assert!(matches!(err, AgentError::EmptyPlan(_)));
    assert_eq!(provider.request_count(), 0);
}

#[tokio::test]
async fn test_rate_limited_synthesis_is_retried() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok(ChatResponse::text("finding")),
        Err(ProviderError::RateLimited),
        Ok(ChatResponse::text("## Emerging Challenges\nok")),
    ]));
    let manager = manager_with(
        provider.clone(),
        vec![("web_search_agent", Arc::new(StubTool::ok("web_search", "{}")))],
    );

    let plan = Plan::new(vec![PlanStep::new("web_search_agent", "Search")]);
    let report = manager.run(&plan, "brief").await.unwrap();

    assert_eq!(report.synthesis, "## Emerging Challenges\nok");
    assert_eq!(provider.request_count(), 3);
    assert_eq!(
        provider.request(1).last_user_message(),
        provider.request(2).last_user_message()
    );
}

#[tokio::test]
async fn test_blank_synthesis_leaves_nothing_written() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok(ChatResponse::text("finding")),
        Ok(ChatResponse::text("   ")),
        Err(ProviderError::RateLimited),
    ]));
    let manager = manager_with(
        provider.clone(),
        vec![("web_search_agent", Arc::new(StubTool::ok("web_search", "{}")))],
    );

    let plan = Plan::new(vec![PlanStep::new("web_search_agent", "Search")]).with_max_attempts(2);
    let report = manager.run(&plan, "brief").await.unwrap();

    assert!(report.synthesis.is_empty());
    assert!(report.findings[0].is_completed());
    // one worker call plus two synthesis attempts
    assert_eq!(provider.request_count(), 3);
}

#[tokio::test]
async fn test_missing_api_key_is_not_retried() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Err(ProviderError::NoApiKey),
        Err(ProviderError::NoApiKey),
    ]));
    let manager = manager_with(
        provider.clone(),
        vec![("web_search_agent", Arc::new(StubTool::ok("web_search", "{}")))],
    );

    let plan = Plan::new(vec![PlanStep::new("web_search_agent", "Search")]);
    let err = manager.run(&plan, "brief").await.unwrap_err();

    assert!(err.is_fatal());
    assert_eq!(err.to_string(), "model call failed: no model API key configured");
    // one worker attempt, one synthesis attempt
    assert_eq!(provider.request_count(), 2);
}

#[tokio::test]
async fn test_model_driven_delegation() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        // manager delegates to the search agent
        Ok(call("m1", "web_search_agent", json!({"task": "Search Ohio hospitals"}))),
        // worker answers without using its tool
        Ok(ChatResponse::text("search finding")),
        // manager is done delegating
        Ok(ChatResponse::text("All steps attempted.")),
        // synthesis
        Ok(ChatResponse::text("## Emerging Challenges\nok")),
    ]));
    let manager = manager_with(
        provider.clone(),
        vec![
            ("web_search_agent", Arc::new(StubTool::ok("web_search", "{}"))),
            ("hospital_beds_agent", Arc::new(StubTool::ok("hospital_beds", "t"))),
        ],
    )
    .with_mode(DelegationMode::ModelDriven);

    let plan = Plan::new(vec![
        PlanStep::new("hospital_beds_agent", "Analyze beds"),
        PlanStep::new("web_search_agent", "Search"),
    ]);
    let report = manager.run(&plan, "brief").await.unwrap();

    // delegates are offered as tools, sorted by name
    let first = provider.request(0);
    let offered: Vec<_> = first.tools.iter().map(|t| t.function.name.clone()).collect();
    assert_eq!(offered, vec!["hospital_beds_agent", "web_search_agent"]);
    assert!(first
        .last_user_message()
        .unwrap()
        .contains("2. Use web_search_agent: Search"));

    // only the delegation the model made is recorded
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].delegate, "web_search_agent");
    assert_eq!(report.findings[0].task, "Search Ohio hospitals");
    assert_eq!(report.synthesis, "## Emerging Challenges\nok");

    let fed_back = provider.request(2);
    assert_eq!(
        fed_back.messages.last().unwrap().content.as_deref(),
        Some("search finding")
    );
}

#[tokio::test]
async fn test_model_driven_attempt_limit() {
    let mut script = Vec::new();
    for i in 0..3 {
        script.push(Ok(call(&format!("m{}", i), "web_search_agent", json!({"task": "Search"}))));
        if i < 2 {
            script.push(Ok(ChatResponse::text("finding")));
        }
    }
    script.push(Ok(ChatResponse::text("done")));
    script.push(Ok(ChatResponse::text("## Emerging Challenges\nok")));
    let provider = Arc::new(ScriptedProvider::new(script));

    let manager = manager_with(
        provider.clone(),
        vec![("web_search_agent", Arc::new(StubTool::ok("web_search", "{}")))],
    )
    .with_mode(DelegationMode::ModelDriven);

    let plan = Plan::new(vec![PlanStep::new("web_search_agent", "Search")]).with_max_attempts(2);
    let report = manager.run(&plan, "brief").await.unwrap();

    assert_eq!(report.findings.len(), 2);
    // third call refused: the refusal goes back to the model
    let refused = provider.request(5);
    assert!(refused
        .messages
        .last()
        .unwrap()
        .content
        .as_deref()
        .unwrap()
        .contains("already ran 2 times"));
}
