//! The fixed section structure of a report

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum SectionName {
    ExecutiveSummary,
    Introduction,
    PandemicTimeline,
    ComparativeAnalysis,
    SocialDeterminants,
    ProviderAvailability,
    LongTermImplications,
    HistoricalContext,
    EmergingChallenges,
    Recommendations,
    Conclusion,
}

impl SectionName {
    /// Every section in report order
    pub const ALL: [SectionName; 11] = [
        SectionName::ExecutiveSummary,
        SectionName::Introduction,
        SectionName::PandemicTimeline,
        SectionName::ComparativeAnalysis,
        SectionName::SocialDeterminants,
        SectionName::ProviderAvailability,
        SectionName::LongTermImplications,
        SectionName::HistoricalContext,
        SectionName::EmergingChallenges,
        SectionName::Recommendations,
        SectionName::Conclusion,
    ];

    /// Written by the COVID-19 analysis manager
    pub const COVID: [SectionName; 7] = [
        SectionName::ExecutiveSummary,
        SectionName::Introduction,
        SectionName::PandemicTimeline,
        SectionName::ComparativeAnalysis,
        SectionName::SocialDeterminants,
        SectionName::ProviderAvailability,
        SectionName::LongTermImplications,
    ];

    /// Written by the healthcare context manager
    pub const CONTEXT: [SectionName; 2] = [
        SectionName::HistoricalContext,
        SectionName::EmergingChallenges,
    ];

    /// Written fresh by the assembler
    pub const CLOSING: [SectionName; 2] = [SectionName::Recommendations, SectionName::Conclusion];

    pub fn heading(self) -> &'static str {
        match self {
            SectionName::ExecutiveSummary => "Executive Summary",
            SectionName::Introduction => "Introduction",
            SectionName::PandemicTimeline => "Pandemic Timeline and Healthcare Response",
            SectionName::ComparativeAnalysis => {
                "Comparative Analysis: Pre-Pandemic vs. Pandemic Healthcare"
            }
            SectionName::SocialDeterminants => "Social Determinants and COVID-19 Impact",
            SectionName::ProviderAvailability => "Healthcare Provider Availability",
            SectionName::LongTermImplications => "Long-Term Implications",
            SectionName::HistoricalContext => "Historical Healthcare System Context",
            SectionName::EmergingChallenges => "Emerging Challenges",
            SectionName::Recommendations => "Recommendations",
            SectionName::Conclusion => "Conclusion",
        }
    }

    /// Match a heading as a model tends to write it: case, surrounding
    /// emphasis, numbering and a trailing colon are ignored.
    pub fn from_heading(text: &str) -> Option<SectionName> {
        let cleaned = normalize(text);
        Self::ALL
            .iter()
            .copied()
            .find(|s| normalize(s.heading()) == cleaned)
    }

    /// Markdown skeleton listing the given sections as `##` headings
    pub fn outline(sections: &[SectionName]) -> String {
        sections
            .iter()
            .map(|s| format!("## {}", s.heading()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn normalize(text: &str) -> String {
    let text = text.trim().trim_matches(|c| c == '*' || c == '_').trim();
    let text = text
        .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')')
        .trim();
    text.trim_end_matches(':').trim().to_lowercase()
}

impl fmt::Display for SectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.heading())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SectionStatus {
    Complete,
    /// Written with partial data; reasons are shown to the reader
    Degraded(Vec<String>),
    Missing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionText {
    pub body: String,
    pub status: SectionStatus,
}

impl SectionText {
    pub fn complete(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            status: SectionStatus::Complete,
        }
    }

    pub fn degraded(body: impl Into<String>, reasons: Vec<String>) -> Self {
        Self {
            body: body.into(),
            status: SectionStatus::Degraded(reasons),
        }
    }

    pub fn missing() -> Self {
        Self {
            body: String::new(),
            status: SectionStatus::Missing,
        }
    }

    /// Complete unless there are reasons to flag
    pub fn with_reasons(body: impl Into<String>, reasons: Vec<String>) -> Self {
        if reasons.is_empty() {
            Self::complete(body)
        } else {
            Self::degraded(body, reasons)
        }
    }

    pub fn is_missing(&self) -> bool {
        self.status == SectionStatus::Missing
    }
}
