//! Delegates, plans and briefs for the two managers and the assembler

use carescope_agent::{Plan, PlanStep};

use crate::sections::SectionName;

/// A worker a manager can delegate to: agent name, the one tool it owns,
/// and what it is for
#[derive(Debug, Clone, Copy)]
pub struct WorkerSpec {
    pub agent: &'static str,
    pub tool: &'static str,
    pub description: &'static str,
}

pub const COVID_WORKERS: [WorkerSpec; 5] = [
    WorkerSpec {
        agent: "covid_cases_agent",
        tool: "query_covid_cases_by_year",
        description: "Retrieves year-over-year COVID-19 cases and deaths by state",
    },
    WorkerSpec {
        agent: "healthcare_access_agent",
        tool: "query_healthcare_access",
        description: "Retrieves emergency department visits, physician office visits and delayed care due to cost",
    },
    WorkerSpec {
        agent: "vaccine_providers_agent",
        tool: "query_vaccine_providers",
        description: "Retrieves COVID-19 vaccination provider counts by state",
    },
    WorkerSpec {
        agent: "web_search_agent",
        tool: "web_search",
        description: "Searches the web for COVID-19 and healthcare information",
    },
    WorkerSpec {
        agent: "fetch_web_content_agent",
        tool: "fetch_web_content",
        description: "Fetches detailed content from web pages found by a search",
    },
];

pub const CONTEXT_WORKERS: [WorkerSpec; 6] = [
    WorkerSpec {
        agent: "hospital_beds_agent",
        tool: "hospital_beds",
        description: "Analyzes community hospital bed availability trends",
    },
    WorkerSpec {
        agent: "emergency_visits_agent",
        tool: "emergency_visits",
        description: "Analyzes emergency department visit trends for the US",
    },
    WorkerSpec {
        agent: "hospital_utilization_agent",
        tool: "hospital_utilization",
        description: "Analyzes hospital utilization trends for the US",
    },
    WorkerSpec {
        agent: "emerging_challenges_agent",
        tool: "emerging_challenges",
        description: "Analyzes emerging challenges in the US health sector",
    },
    WorkerSpec {
        agent: "web_search_agent",
        tool: "web_search",
        description: "Searches the web for emerging challenges in the US health sector",
    },
    WorkerSpec {
        agent: "fetch_web_content_agent",
        tool: "fetch_web_content",
        description: "Fetches detailed content from web sources on emerging healthcare challenges",
    },
];

/// A plan plus, for each step, the sections its findings feed
#[derive(Debug, Clone)]
pub struct SectionPlan {
    pub plan: Plan,
    pub feeds: Vec<Vec<SectionName>>,
}

impl SectionPlan {
    fn from_steps(steps: Vec<(PlanStep, Vec<SectionName>)>, max_attempts: u32) -> Self {
        let (steps, feeds): (Vec<_>, Vec<_>) = steps.into_iter().unzip();
        Self {
            plan: Plan::new(steps).with_max_attempts(max_attempts),
            feeds,
        }
    }

    /// Sections fed by a finding. Matches the exact step first and falls
    /// back to every step of the same delegate.
    pub fn sections_for(&self, delegate: &str, task: &str) -> Vec<SectionName> {
        let exact: Vec<usize> = self
            .plan
            .steps
            .iter()
            .enumerate()
            .filter(|(_, s)| s.delegate == delegate && s.task == task)
            .map(|(i, _)| i)
            .collect();
        let indices = if exact.is_empty() {
            self.plan
                .steps
                .iter()
                .enumerate()
                .filter(|(_, s)| s.delegate == delegate)
                .map(|(i, _)| i)
                .collect()
        } else {
            exact
        };

        let mut sections: Vec<SectionName> = indices
            .into_iter()
            .flat_map(|i| self.feeds[i].iter().copied())
            .collect();
        sections.sort();
        sections.dedup();
        sections
    }
}

fn search(state: &str, query: &str) -> String {
    format!(
        "Search the web for \"{} {}\" and summarize the most relevant facts, figures and source URLs.",
        state, query
    )
}

pub fn covid_plan(state: &str, max_attempts: u32) -> SectionPlan {
    use SectionName::*;

    SectionPlan::from_steps(
        vec![
            (
                PlanStep::new(
                    "covid_cases_agent",
                    format!("Retrieve year-over-year COVID-19 cases and deaths for {} (state = \"{}\") and summarize the yearly figures and turning points.", state, state),
                ),
                vec![ExecutiveSummary, Introduction, PandemicTimeline],
            ),
            (
                PlanStep::new("web_search_agent", search(state, "COVID-19 healthcare impact overview")),
                vec![ExecutiveSummary, Introduction],
            ),
            (
                PlanStep::new(
                    "healthcare_access_agent",
                    format!("Retrieve healthcare access data for {}: emergency department visits, physician office visits and delayed healthcare due to cost. Summarize the trends by year.", state),
                ),
                vec![ComparativeAnalysis, SocialDeterminants],
            ),
            (
                PlanStep::new("web_search_agent", search(state, "pre-pandemic vs pandemic healthcare expenditure")),
                vec![ComparativeAnalysis],
            ),
            (
                PlanStep::new("web_search_agent", search(state, "social determinants health COVID hotspots")),
                vec![SocialDeterminants],
            ),
            (
                PlanStep::new(
                    "vaccine_providers_agent",
                    format!("Retrieve COVID-19 vaccination provider counts for {} (state = \"{}\") and describe provider distribution.", state, state),
                ),
                vec![ProviderAvailability],
            ),
            (
                PlanStep::new("web_search_agent", search(state, "healthcare provider availability COVID impact")),
                vec![ProviderAvailability],
            ),
            (
                PlanStep::new("web_search_agent", search(state, "long-term effects COVID healthcare access")),
                vec![LongTermImplications],
            ),
        ],
        max_attempts,
    )
}

pub fn context_plan(state: &str, max_attempts: u32) -> SectionPlan {
    use SectionName::*;

    SectionPlan::from_steps(
        vec![
            (
                PlanStep::new("hospital_beds_agent", "Analyze community hospital bed availability trends and report the largest changes."),
                vec![HistoricalContext],
            ),
            (
                PlanStep::new("emergency_visits_agent", "Analyze emergency department visit patterns from the report."),
                vec![HistoricalContext],
            ),
            (
                PlanStep::new("hospital_utilization_agent", "Summarize the hospital utilization research findings."),
                vec![HistoricalContext],
            ),
            (
                PlanStep::new("emerging_challenges_agent", "Summarize the emerging challenges in healthcare described in the report, especially staffing and bed shortages."),
                vec![EmergingChallenges],
            ),
            (
                PlanStep::new("web_search_agent", search(state, "healthcare system historical trends and challenges")),
                vec![EmergingChallenges],
            ),
            (
                PlanStep::new(
                    "fetch_web_content_agent",
                    "Fetch the content of the most relevant URLs from the search results and summarize what they add.",
                )
                .with_context_from(vec![4]),
                vec![EmergingChallenges],
            ),
        ],
        max_attempts,
    )
}

pub fn covid_brief(state: &str) -> String {
    format!(
        r#"You are a COVID-19 data analyst writing part of a comprehensive report on how the COVID-19 pandemic transformed healthcare in {state}.

Guidelines:
- Write every section in full, evidence-based prose with detailed quantitative analysis where the findings allow it.
- Each section should have several substantial paragraphs.
- Do not omit or abbreviate any section, and do not leave placeholder text.

Section guidance:
- Executive Summary and Introduction: overview of key findings and the context of COVID-19 in {state}.
- Pandemic Timeline and Healthcare Response: a timeline from the cases and deaths data, with turning points and policy changes.
- Comparative Analysis: pre-pandemic baseline against pandemic changes in emergency department and physician visits.
- Social Determinants and COVID-19 Impact: delayed care, vulnerable populations and geographic or demographic patterns.
- Healthcare Provider Availability: provider distribution, shortages and adaptations.
- Long-Term Implications: lasting changes to healthcare delivery and access, and policy implications.

Your output MUST use exactly these markdown headings, in this order:
{outline}"#,
        state = state,
        outline = SectionName::outline(&SectionName::COVID)
    )
}

pub fn context_brief(state: &str) -> String {
    format!(
        r#"You are an expert healthcare data analyst writing the historical healthcare system sections of a comprehensive report for {state}.

Write TWO detailed sections:
1. Historical Healthcare System Context: synthesize hospital bed trends over time, emergency department utilization patterns and overall hospital utilization, and relate them specifically to {state}.
2. Emerging Challenges: identify key emerging challenges in healthcare delivery, staffing shortages and their impacts, and potential hospital bed shortages, and how they affect {state}.

Each section should be comprehensive and data-driven, with several substantial paragraphs.

Your output MUST use exactly these markdown headings, in this order:
{outline}"#,
        state = state,
        outline = SectionName::outline(&SectionName::CONTEXT)
    )
}

pub const FINAL_SYSTEM: &str = "You are an expert healthcare data analyst finishing a policy report. \
Write in markdown, ground every point in the report content you are given, and do not rewrite existing sections.";

pub fn closing_brief(state: &str, prior: &str) -> String {
    format!(
        r#"Below are the completed sections of the report "COVID-19 Impact on Healthcare in {state}: Comprehensive Analysis".

Write the two closing sections:
- Recommendations: detailed, actionable recommendations based on all previous sections, several substantial paragraphs.
- Conclusion: synthesize the key findings and reinforce the most critical points.

Use exactly these markdown headings and nothing else at that level:
{outline}

The report so far:

{prior}"#,
        state = state,
        outline = SectionName::outline(&SectionName::CLOSING),
        prior = prior
    )
}
