//! Agents for CareScope
//!
//! Tool adapters over datasets and remote APIs, single-tool worker agents
//! and the manager that runs a plan over its workers.

use thiserror::Error;

pub mod context;
pub mod manager;
pub mod tools;
pub mod worker;

pub use context::ContextBuilder;
pub use manager::{
    DelegateTool, ManagerAgent, ManagerReport, Plan, PlanStep, StepOutcome, StepRecord,
};
pub use tools::{default_registry, ToolError, ToolRegistry, ToolTrait};
pub use worker::{WorkerAgent, WorkerOutcome, WorkerReport};

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("delegate not found: {0}")]
    DelegateNotFound(String),

    #[error("model call failed: {0}")]
    Provider(#[from] carescope_provider::ProviderError),

    #[error("empty plan for {0}")]
    EmptyPlan(String),
}

impl AgentError {
    /// True when retrying cannot help, e.g. no model API key
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Provider(e) if e.is_fatal())
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
