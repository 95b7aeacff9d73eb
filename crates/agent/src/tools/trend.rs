//! Hospital bed trend summary over the community hospital beds CSV

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;
use tracing::debug;

use super::{no_parameters, ToolError, ToolResult, ToolTrait};

const ESTIMATE: &str = "ESTIMATE";
const TIME_PERIOD: &str = "TIME_PERIOD";
const SUBGROUP: &str = "SUBGROUP";

/// Trend statistics for one subgroup (usually a state)
#[derive(Debug, Clone, PartialEq)]
pub struct SubgroupTrend {
    pub subgroup: String,
    /// Mean of row-over-row percent changes, `None` with fewer than two rows
    pub average_change: Option<f64>,
    /// `(last - first) / first * 100` over the raw first and last rows,
    /// zero for a single row
    pub total_change: Option<f64>,
    pub start_year: Option<i64>,
    pub end_year: Option<i64>,
    /// First numeric estimate
    pub start_value: Option<f64>,
    /// Last numeric estimate
    pub end_value: Option<f64>,
}

#[derive(Default)]
struct Series {
    values: Vec<Option<f64>>,
    years: Vec<i64>,
}

fn parse_year(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    raw.parse::<i64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().map(|y| y as i64))
}

fn percent_change(from: f64, to: f64) -> Option<f64> {
    if from == 0.0 {
        None
    } else {
        Some((to - from) / from * 100.0)
    }
}

/// Row-over-row percent changes with gaps padded by the previous value.
///
/// A gap repeats the last estimate, so its change is zero and the next
/// numeric row is compared against that last estimate. Rows before the
/// first numeric estimate have no change.
fn padded_changes(values: &[Option<f64>]) -> Vec<f64> {
    let mut changes = Vec::new();
    let mut previous: Option<f64> = None;

    for value in values {
        match (previous, *value) {
            (Some(from), Some(to)) => {
                changes.extend(percent_change(from, to));
                previous = Some(to);
            }
            (Some(from), None) => changes.extend(percent_change(from, from)),
            (None, to) => previous = to,
        }
    }
    changes
}

/// Summarize the CSV per subgroup, sorted by subgroup name.
///
/// Values keep file order within each subgroup. Non-numeric estimates
/// count as gaps: they are padded for the average change, they still
/// count toward the year range, and a gap in the first or last row leaves
/// the total change undefined. A zero starting point gives no percent
/// change rather than an infinite one.
pub fn analyze_trends<R: Read>(reader: R) -> Result<Vec<SubgroupTrend>, ToolError> {
    let mut csv = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv
        .headers()
        .map_err(|e| ToolError::InvalidData(e.to_string()))?
        .clone();
    let column = |name: &str| headers.iter().position(|h| h == name);

    let (estimate, period, subgroup) =
        match (column(ESTIMATE), column(TIME_PERIOD), column(SUBGROUP)) {
            (Some(e), Some(p), Some(s)) => (e, p, s),
            _ => {
                return Err(ToolError::InvalidData(
                    "Required columns not found in the dataset.".to_string(),
                ))
            }
        };

    let mut groups: BTreeMap<String, Series> = BTreeMap::new();
    for record in csv.records() {
        let record = record.map_err(|e| ToolError::InvalidData(e.to_string()))?;
        let value = record
            .get(estimate)
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite());

        let series = groups
            .entry(record.get(subgroup).unwrap_or_default().to_string())
            .or_default();
        series.values.push(value);
        if let Some(year) = record.get(period).and_then(parse_year) {
            series.years.push(year);
        }
    }

    let trends = groups
        .into_iter()
        .map(|(name, series)| {
            let changes = padded_changes(&series.values);
            let average_change = if changes.is_empty() {
                None
            } else {
                Some(changes.iter().sum::<f64>() / changes.len() as f64)
            };

            let total_change = match series.values.as_slice() {
                [_] => Some(0.0),
                [Some(first), .., Some(last)] => percent_change(*first, *last),
                _ => None,
            };

            SubgroupTrend {
                subgroup: name,
                average_change,
                total_change,
                start_year: series.years.iter().min().copied(),
                end_year: series.years.iter().max().copied(),
                start_value: series.values.iter().flatten().next().copied(),
                end_value: series.values.iter().flatten().last().copied(),
            }
        })
        .collect();

    Ok(trends)
}

fn cell(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}", v))
        .unwrap_or_else(|| "NaN".to_string())
}

fn year_cell(value: Option<i64>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "NaN".to_string())
}

/// Render trends as a fixed-width text table
pub fn render_trend_table(trends: &[SubgroupTrend]) -> String {
    let headers = [
        SUBGROUP,
        "Average_Annual_Change",
        "Total_Change",
        "Start_Year",
        "End_Year",
        "Start_Value",
        "End_Value",
    ];

    let rows: Vec<[String; 7]> = trends
        .iter()
        .map(|t| {
            [
                t.subgroup.clone(),
                cell(t.average_change),
                cell(t.total_change),
                year_cell(t.start_year),
                year_cell(t.end_year),
                cell(t.start_value),
                cell(t.end_value),
            ]
        })
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (width, value) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(value.len());
        }
    }

    let format_line = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(widths.iter())
            .enumerate()
            .map(|(i, (c, w))| {
                if i == 0 {
                    format!("{:<width$}", c, width = w)
                } else {
                    format!("{:>width$}", c, width = w)
                }
            })
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![format_line(headers.to_vec())];
    for row in &rows {
        lines.push(format_line(row.iter().map(String::as_str).collect()));
    }
    lines.join("\n")
}

/// Community hospital bed availability trends
pub struct HospitalBedsTool {
    path: PathBuf,
}

impl HospitalBedsTool {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ToolTrait for HospitalBedsTool {
    fn name(&self) -> &str {
        "hospital_beds"
    }

    fn description(&self) -> &str {
        "Analyzes hospital bed availability trends from a CSV file."
    }

    fn parameters(&self) -> Value {
        no_parameters()
    }

    async fn execute(&self, _args: Value) -> ToolResult {
        if !self.path.exists() {
            return Err(ToolError::NotFound(self.path.display().to_string()));
        }

        debug!("Analyzing hospital beds from {:?}", self.path);
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| ToolError::InvalidData(e.to_string()))?;

        let trends = analyze_trends(bytes.as_slice())?;
        if trends.iter().all(|t| t.start_value.is_none()) {
            return Err(ToolError::InvalidData(
                "no numeric estimates in the dataset".to_string(),
            ));
        }
        Ok(render_trend_table(&trends))
    }
}
