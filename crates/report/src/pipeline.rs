//! End-to-end report generation

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use carescope_agent::{default_registry, AgentError, ManagerAgent, ManagerReport, ToolRegistry, WorkerAgent};
use carescope_config::Config;
use carescope_provider::{OpenAiCompatProvider, Provider};

use crate::assembler::{Report, ReportAssembler};
use crate::parse::split_sections;
use crate::prompts::{self, SectionPlan, WorkerSpec};
use crate::sections::{SectionName, SectionText};
use crate::Result;

/// Anything that can turn a state name into a report
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    async fn generate(&self, state: &str) -> Result<Report>;
}

/// Runs the COVID-19 manager, the healthcare context manager and the
/// assembler, one after the other
pub struct ReportPipeline {
    config: Arc<Config>,
    provider: Arc<dyn Provider>,
    tools: ToolRegistry,
}

impl ReportPipeline {
    pub fn new(config: Arc<Config>, provider: Arc<dyn Provider>, tools: ToolRegistry) -> Self {
        Self {
            config,
            provider,
            tools,
        }
    }

    /// Build the model provider and the tool set from configuration.
    ///
    /// Without an API key the pipeline still builds; every generation then
    /// fails with a "no model API key configured" error.
    pub fn from_config(config: Arc<Config>) -> Self {
        let api_key = config.api_key().unwrap_or_else(|| {
            warn!("No model API key configured; report generation will fail until one is set");
            String::new()
        });

        let provider = OpenAiCompatProvider::new(
            api_key,
            config.model.api_base.clone(),
            Some(config.default_model()),
        );
        let tools = default_registry(&config);

        Self::new(config, Arc::new(provider), tools)
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    fn worker(&self, spec: &WorkerSpec) -> Result<WorkerAgent> {
        let tool = self
            .tools
            .get(spec.tool)
            .ok_or_else(|| AgentError::ToolNotFound(spec.tool.to_string()))?;
        let model = &self.config.model;

        Ok(
            WorkerAgent::new(spec.agent, spec.description, tool, Arc::clone(&self.provider))
                .with_model(&model.model)
                .with_max_steps(model.max_steps)
                .with_sampling(model.max_tokens, model.temperature),
        )
    }

    fn manager(&self, name: &str, description: &str, workers: &[WorkerSpec]) -> Result<ManagerAgent> {
        let model = &self.config.model;
        let mut manager = ManagerAgent::new(name, description, Arc::clone(&self.provider))
            .with_model(&model.model)
            .with_sampling(model.max_tokens, model.temperature)
            .with_mode(self.config.report.delegation);

        for spec in workers {
            manager.add_delegate(self.worker(spec)?);
        }
        Ok(manager)
    }

    async fn run_manager(
        &self,
        manager: ManagerAgent,
        plan: &SectionPlan,
        brief: &str,
        owned: &[SectionName],
    ) -> Result<BTreeMap<SectionName, SectionText>> {
        let report = manager.run(&plan.plan, brief).await?;
        Ok(sections_from(&report, plan, owned))
    }
}

/// Attach each finding's data problems to the sections its step feeds
fn sections_from(
    report: &ManagerReport,
    plan: &SectionPlan,
    owned: &[SectionName],
) -> BTreeMap<SectionName, SectionText> {
    let mut reasons: BTreeMap<SectionName, Vec<String>> = BTreeMap::new();
    for finding in &report.findings {
        let finding_reasons = finding.reasons();
        if finding_reasons.is_empty() {
            continue;
        }
        for section in plan.sections_for(&finding.delegate, &finding.task) {
            let entry = reasons.entry(section).or_default();
            for reason in &finding_reasons {
                if !entry.contains(reason) {
                    entry.push(reason.clone());
                }
            }
        }
    }

    let mut parsed = split_sections(&report.synthesis);
    let mut sections = BTreeMap::new();
    for &name in owned {
        let text = match parsed.remove(&name) {
            Some(body) if !body.is_empty() => {
                SectionText::with_reasons(body, reasons.remove(&name).unwrap_or_default())
            }
            _ => {
                warn!("{} did not write {}", report.manager, name);
                SectionText::missing()
            }
        };
        sections.insert(name, text);
    }

    if !parsed.is_empty() {
        debug!(
            "{} wrote sections it does not own: {:?}",
            report.manager,
            parsed.keys().collect::<Vec<_>>()
        );
    }
    sections
}

#[async_trait]
impl ReportGenerator for ReportPipeline {
    async fn generate(&self, state: &str) -> Result<Report> {
        let max_attempts = self.config.model.max_attempts;
        info!("Generating report for {}", state);

        let covid = self.manager(
            "covid_analysis_manager",
            "Coordinates COVID-19 data analysis and writes the core report sections",
            &prompts::COVID_WORKERS,
        )?;
        let plan = prompts::covid_plan(state, max_attempts);
        let mut sections = self
            .run_manager(covid, &plan, &prompts::covid_brief(state), &SectionName::COVID)
            .await?;
        info!("COVID-19 analysis finished for {}", state);

        let context = self.manager(
            "healthcare_context_manager",
            "Coordinates historical healthcare analysis and writes the context sections",
            &prompts::CONTEXT_WORKERS,
        )?;
        let plan = prompts::context_plan(state, max_attempts);
        sections.extend(
            self.run_manager(context, &plan, &prompts::context_brief(state), &SectionName::CONTEXT)
                .await?,
        );
        info!("Healthcare context analysis finished for {}", state);

        let model = &self.config.model;
        let report = ReportAssembler::new(Arc::clone(&self.provider))
            .with_model(&model.model)
            .with_sampling(model.max_tokens, model.temperature)
            .with_max_attempts(max_attempts)
            .with_flag_degraded(self.config.report.flag_degraded)
            .assemble(sections, state)
            .await?;

        Ok(report)
    }
}
