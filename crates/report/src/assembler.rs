//! Stitches section texts into the final report and writes the closing
//! sections.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use carescope_provider::{ChatParams, Message, Provider, ToolChoice};

use crate::parse::{demote_headings, split_sections};
use crate::prompts;
use crate::sections::{SectionName, SectionStatus, SectionText};
use crate::ReportError;

pub const MISSING_PLACEHOLDER: &str =
    "_This section could not be generated from the available data._";

pub fn report_title(state: &str) -> String {
    format!(
        "COVID-19 Impact on Healthcare in {}: Comprehensive Analysis",
        state
    )
}

/// A finished report, one entry per fixed section in order
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub state: String,
    pub title: String,
    pub sections: Vec<(SectionName, SectionText)>,
    #[serde(skip)]
    flag_degraded: bool,
}

impl Report {
    pub fn new(
        state: impl Into<String>,
        sections: Vec<(SectionName, SectionText)>,
        flag_degraded: bool,
    ) -> Self {
        let state = state.into();
        Self {
            title: report_title(&state),
            state,
            sections,
            flag_degraded,
        }
    }

    pub fn section(&self, name: SectionName) -> Option<&SectionText> {
        self.sections
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, text)| text)
    }

    pub fn degraded_sections(&self) -> Vec<SectionName> {
        self.sections
            .iter()
            .filter(|(_, t)| t.status != SectionStatus::Complete)
            .map(|(n, _)| *n)
            .collect()
    }

    /// Render as markdown
    pub fn to_markdown(&self) -> String {
        let mut out = format!("# {}\n", self.title);

        for (name, text) in &self.sections {
            out.push_str(&format!("\n## {}\n\n", name.heading()));
            match &text.status {
                SectionStatus::Missing => out.push_str(MISSING_PLACEHOLDER),
                SectionStatus::Complete => out.push_str(&demote_headings(&text.body)),
                SectionStatus::Degraded(reasons) => {
                    out.push_str(&demote_headings(&text.body));
                    if self.flag_degraded {
                        out.push_str(&format!(
                            "\n\n> **Data note:** this section was written from incomplete data ({}).",
                            reasons.join("; ")
                        ));
                    }
                }
            }
            out.push('\n');
        }

        out
    }
}

/// Builds reports from section texts
pub struct ReportAssembler {
    provider: Arc<dyn Provider>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    max_attempts: u32,
    flag_degraded: bool,
}

impl ReportAssembler {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        let model = provider.default_model();
        Self {
            provider,
            model,
            max_tokens: 8192,
            temperature: 0.7,
            max_attempts: 3,
            flag_degraded: true,
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

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_flag_degraded(mut self, flag: bool) -> Self {
        self.flag_degraded = flag;
        self
    }

    /// Assemble the report.
    ///
    /// Provided sections are kept as they are; Recommendations and
    /// Conclusion are always written fresh from everything before them.
    pub async fn assemble(
        &self,
        mut provided: BTreeMap<SectionName, SectionText>,
        state: &str,
    ) -> Result<Report, ReportError> {
        for name in SectionName::CLOSING {
            if provided.remove(&name).is_some() {
                debug!("Dropping provided {} in favour of a fresh one", name);
            }
        }

        let mut sections: Vec<(SectionName, SectionText)> = Vec::with_capacity(SectionName::ALL.len());
        for name in SectionName::ALL.iter().take(SectionName::ALL.len() - SectionName::CLOSING.len()) {
            let text = provided.remove(name).unwrap_or_else(|| {
                warn!("No content for {}", name);
                SectionText::missing()
            });
            sections.push((*name, text));
        }

        let prior = Self::prior_content(&sections);
        let closing = self.write_closing(state, &prior).await?;
        let mut closing = split_sections(&closing);
        for name in SectionName::CLOSING {
            let text = match closing.remove(&name) {
                Some(body) if !body.is_empty() => SectionText::complete(body),
                _ => {
                    warn!("Model did not write {}", name);
                    SectionText::missing()
                }
            };
            sections.push((name, text));
        }

        let report = Report::new(state, sections, self.flag_degraded);
        info!(
            "Assembled report for {} ({} degraded sections)",
            state,
            report.degraded_sections().len()
        );
        Ok(report)
    }

    fn prior_content(sections: &[(SectionName, SectionText)]) -> String {
        sections
            .iter()
            .filter(|(_, text)| !text.is_missing())
            .map(|(name, text)| format!("## {}\n\n{}", name.heading(), demote_headings(&text.body)))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Closing sections markdown, or an empty string when every attempt
    /// failed or came back blank. Only fatal provider errors are returned.
    async fn write_closing(&self, state: &str, prior: &str) -> Result<String, ReportError> {
        let brief = prompts::closing_brief(state, prior);

        for attempt in 1..=self.max_attempts {
            let result = self
                .provider
                .chat(ChatParams {
                    model: self.model.clone(),
                    messages: vec![
                        Message::system(prompts::FINAL_SYSTEM),
                        Message::user(brief.clone()),
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
                        "Closing sections attempt {}/{} came back blank",
                        attempt, self.max_attempts
                    ),
                },
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => warn!(
                    "Closing sections attempt {}/{} failed: {}",
                    attempt, self.max_attempts, e
                ),
            }
        }

        Ok(String::new())
    }
}
