//! Data-access tools

pub mod pdf;
pub mod states;
pub mod trend;
pub mod warehouse;
pub mod web;

pub use pdf::PdfExtractTool;
pub use trend::{analyze_trends, render_trend_table, HospitalBedsTool, SubgroupTrend};
pub use warehouse::{
    CovidCasesTool, HealthcareAccessTool, SqlApiClient, VaccineProvidersTool,
};
pub use web::{FetchWebContentTool, WebSearchTool};

use async_trait::async_trait;
use carescope_config::Config;
use carescope_provider::Tool;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Typed tool failure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("File '{0}' not found.")]
    NotFound(String),

    #[error("{0} is not configured")]
    NotConfigured(String),

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("unable to extract text: {0}")]
    Extraction(String),

    #[error("tool '{0}' not found")]
    UnknownTool(String),
}

impl From<reqwest::Error> for ToolError {
    fn from(err: reqwest::Error) -> Self {
        ToolError::Upstream(err.to_string())
    }
}

pub type ToolResult = std::result::Result<String, ToolError>;

#[async_trait]
pub trait ToolTrait: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> Value;
    async fn execute(&self, args: Value) -> ToolResult;

    /// Text handed to the model in place of a result when `execute` fails
    fn render_failure(&self, err: &ToolError) -> String {
        format!("Error: {}", err)
    }
}

pub fn to_provider_tool(tool: &dyn ToolTrait) -> Tool {
    Tool::new(tool.name(), tool.description(), tool.parameters())
}

/// Parameter-less schema shared by the dataset tools
pub(crate) fn no_parameters() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// Schema with a single optional `state` filter
pub(crate) fn state_parameter(description: &str) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "state": { "type": "string", "description": description }
        }
    })
}

/// Tool registry, shared by reference between agents
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolTrait>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register<T: ToolTrait + 'static>(&mut self, tool: T) {
        self.register_shared(Arc::new(tool));
    }

    pub fn register_shared(&mut self, tool: Arc<dyn ToolTrait>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolTrait>> {
        self.tools.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Declarations sorted by name
    pub fn definitions(&self) -> Vec<Tool> {
        let mut names = self.names();
        names.sort();
        names
            .iter()
            .filter_map(|n| self.tools.get(n))
            .map(|t| to_provider_tool(t.as_ref()))
            .collect()
    }

    pub async fn execute(&self, name: &str, args: Value) -> ToolResult {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.execute(args).await
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Register every data-access tool described by the config
pub fn register_default_tools(registry: &mut ToolRegistry, config: &Config) {
    let datasets = &config.datasets;

    registry.register(HospitalBedsTool::new(
        datasets.path_of(&datasets.hospital_beds_csv),
    ));
    registry.register(PdfExtractTool::emergency_visits(datasets));
    registry.register(PdfExtractTool::hospital_utilization(datasets));
    registry.register(PdfExtractTool::emerging_challenges(datasets));

    registry.register(WebSearchTool::from_config(&config.search));
    registry.register(FetchWebContentTool::from_config(&config.search));

    registry.register(CovidCasesTool::new(config.warehouse.clone()));
    registry.register(VaccineProvidersTool::new(config.warehouse.clone()));
    registry.register(HealthcareAccessTool::new(config.warehouse.clone()));
}

/// Registry with every default tool
pub fn default_registry(config: &Config) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    register_default_tools(&mut registry, config);
    registry
}
