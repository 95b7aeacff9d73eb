//! Report assembly for CareScope
//!
//! Runs the two managers, maps their findings onto the fixed section
//! structure and stitches everything into one markdown document.

pub mod assembler;
pub mod parse;
pub mod pipeline;
pub mod prompts;
pub mod sections;

pub use assembler::{report_title, Report, ReportAssembler, MISSING_PLACEHOLDER};
pub use parse::{demote_headings, split_sections};
pub use pipeline::{ReportGenerator, ReportPipeline};
pub use sections::{SectionName, SectionStatus, SectionText};

use carescope_agent::AgentError;
use carescope_provider::ProviderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("model call failed: {0}")]
    Provider(#[from] ProviderError),
}

/// Anything that stops a report from being produced at all
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Report(#[from] ReportError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
