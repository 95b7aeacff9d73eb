//! PDF report extraction

use async_trait::async_trait;
use carescope_config::DatasetConfig;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{no_parameters, ToolError, ToolResult, ToolTrait};

/// Reads the leading pages of one PDF report
pub struct PdfExtractTool {
    name: String,
    description: String,
    path: PathBuf,
    pages: usize,
}

impl PdfExtractTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        path: impl Into<PathBuf>,
        pages: usize,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            path: path.into(),
            pages,
        }
    }

    pub fn emergency_visits(datasets: &DatasetConfig) -> Self {
        Self::new(
            "emergency_visits",
            "Analyzes emergency department visits from a PDF file.",
            datasets.path_of(&datasets.emergency_visits_pdf),
            datasets.pdf_pages,
        )
    }

    pub fn hospital_utilization(datasets: &DatasetConfig) -> Self {
        Self::new(
            "hospital_utilization",
            "Extracts key insights from a hospital utilization research paper.",
            datasets.path_of(&datasets.hospital_utilization_pdf),
            datasets.pdf_pages,
        )
    }

    pub fn emerging_challenges(datasets: &DatasetConfig) -> Self {
        Self::new(
            "emerging_challenges",
            "Reads the first pages of the emerging healthcare challenges report.",
            datasets.path_of(&datasets.emerging_challenges_pdf),
            datasets.emerging_challenges_pages,
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn extract_leading_pages(path: &Path, pages: usize) -> Result<String, ToolError> {
    let texts = pdf_extract::extract_text_by_pages(path)
        .map_err(|e| ToolError::Extraction(e.to_string()))?;
    debug!("{:?} has {} pages, reading {}", path, texts.len(), pages);

    let content = texts
        .iter()
        .take(pages)
        .map(|page| page.trim())
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    if content.is_empty() {
        Err(ToolError::Extraction(
            "Unable to extract text from the PDF.".to_string(),
        ))
    } else {
        Ok(content)
    }
}

#[async_trait]
impl ToolTrait for PdfExtractTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        no_parameters()
    }

    async fn execute(&self, _args: Value) -> ToolResult {
        if !self.path.exists() {
            return Err(ToolError::NotFound(self.path.display().to_string()));
        }

        let path = self.path.clone();
        let pages = self.pages;
        tokio::task::spawn_blocking(move || extract_leading_pages(&path, pages))
            .await
            .map_err(|e| ToolError::Extraction(e.to_string()))?
    }
}
