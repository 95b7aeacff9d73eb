//! COVID-19 and healthcare access queries over the Snowflake SQL API
//!
//! Statements are sent to `/api/v2/statements` with positional bindings,
//! so the state filter never becomes part of the SQL text. Asynchronous
//! statements (HTTP 202) are polled a bounded number of times. Results
//! split into several partitions are fetched page by page.

use async_trait::async_trait;
use carescope_config::WarehouseConfig;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::states::postal_code;
use super::{state_parameter, ToolError, ToolResult, ToolTrait};

const STATEMENTS_PATH: &str = "/api/v2/statements";

const COVID_CASES_HEAD: &str = "WITH state_agg AS (
    SELECT EXTRACT(YEAR FROM date) AS year, state, MAX(cases) AS cases, MAX(deaths) AS deaths
    FROM COVID19_GLOBAL_DATA_ATLAS.HLS_COVID19_USA.COVID19_USA_CASES_DEATHS_BY_STATE_DAILY_NYT";

const COVID_CASES_TAIL: &str = "
    GROUP BY EXTRACT(YEAR FROM date), state
    ORDER BY state, year)
SELECT year, state,
    cases - LAG(cases, 1, 0) OVER (PARTITION BY state ORDER BY state, year) AS cases,
    deaths - LAG(deaths, 1, 0) OVER (PARTITION BY state ORDER BY state, year) AS deaths
FROM state_agg";

const VACCINE_PROVIDERS: &str = "SELECT LOC_ADMIN_STATE, COUNT(*) AS PROVIDER_COUNT
FROM COVID19_GLOBAL_DATA_ATLAS.HLS_COVID19_USA.COVID_19_US_VACCINATING_PROVIDER_LOCATIONS";

const VISITS_BY_PANEL: &str = r#"SELECT PANEL, UNIT, YEAR, ESTIMATE
FROM DIVERSITY_EQUITY_AND_INCLUSION__ACCESS_TO_HEALTHCARE.DEI_HEALTHCARE."Healthcare Visits by Age/Sex/Race - USA"
WHERE AGE = 'All ages' AND ESTIMATE > 0 AND UNIT = 'Number of visits in thousands'
AND PANEL = ?
ORDER BY YEAR DESC"#;

const DELAYED_CARE_BY_YEAR: &str = r#"SELECT YEAR, COUNT(*) AS COUNT
FROM DIVERSITY_EQUITY_AND_INCLUSION__ACCESS_TO_HEALTHCARE.DEI_HEALTHCARE."Delayed Healthcare Due to Cost - USA"
GROUP BY YEAR"#;

pub type Record = Map<String, Value>;

#[derive(Debug, Deserialize)]
struct ColumnType {
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartitionInfo {
    #[serde(default)]
    row_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    #[serde(default)]
    row_type: Vec<ColumnType>,
    #[serde(default)]
    partition_info: Vec<PartitionInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    #[serde(default)]
    result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    data: Vec<Vec<Option<String>>>,
    #[serde(default)]
    statement_handle: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn convert_cell(kind: &str, raw: Option<String>) -> Value {
    let Some(raw) = raw else {
        return Value::Null;
    };
    match kind {
        "fixed" | "real" | "float" | "number" => raw
            .parse::<i64>()
            .map(Value::from)
            .or_else(|_| raw.parse::<f64>().map(Value::from))
            .unwrap_or(Value::String(raw)),
        "boolean" => match raw.as_str() {
            "true" | "1" => Value::Bool(true),
            "false" | "0" => Value::Bool(false),
            _ => Value::String(raw),
        },
        _ => Value::String(raw),
    }
}

fn into_records(response: StatementResponse) -> Vec<Record> {
    let columns = response
        .result_set_meta_data
        .map(|m| m.row_type)
        .unwrap_or_default();

    response
        .data
        .into_iter()
        .map(|row| {
            columns
                .iter()
                .zip(row)
                .map(|(col, raw)| (col.name.clone(), convert_cell(&col.kind, raw)))
                .collect()
        })
        .collect()
}

/// Thin client for the Snowflake SQL REST API
pub struct SqlApiClient {
    config: WarehouseConfig,
    poll_interval: Duration,
    max_polls: u32,
}

impl SqlApiClient {
    pub fn new(config: WarehouseConfig) -> Self {
        let max_polls = config.statement_timeout_secs.clamp(1, 600) as u32;
        Self {
            config,
            poll_interval: Duration::from_secs(1),
            max_polls,
        }
    }

    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(&self.config.token)
            .header("X-Snowflake-Authorization-Token-Type", "PROGRAMMATIC_ACCESS_TOKEN")
            .header("Accept", "application/json")
            .header("User-Agent", concat!("carescope/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(self.config.statement_timeout_secs + 30))
    }

    fn statement_body(&self, statement: &str, bindings: &[&str]) -> Value {
        let mut body = json!({
            "statement": statement,
            "timeout": self.config.statement_timeout_secs,
        });

        for (key, value) in [
            ("database", &self.config.database),
            ("schema", &self.config.schema),
            ("warehouse", &self.config.warehouse),
        ] {
            if !value.is_empty() {
                body[key] = json!(value);
            }
        }
        if let Some(role) = self.config.role.as_ref().filter(|r| !r.is_empty()) {
            body["role"] = json!(role);
        }

        if !bindings.is_empty() {
            let bindings: Map<String, Value> = bindings
                .iter()
                .enumerate()
                .map(|(i, v)| ((i + 1).to_string(), json!({"type": "TEXT", "value": v})))
                .collect();
            body["bindings"] = Value::Object(bindings);
        }
        body
    }

    /// Run one statement and return its rows as records
    pub async fn query(&self, statement: &str, bindings: &[&str]) -> Result<Vec<Record>, ToolError> {
        if !self.is_configured() {
            return Err(ToolError::NotConfigured(
                "Snowflake warehouse credentials".to_string(),
            ));
        }

        let base = self.config.base_url();
        let client = reqwest::Client::new();
        let request_id = uuid::Uuid::new_v4();

        debug!("Submitting statement {} to {}", request_id, base);
        let response = self
            .request(client.post(format!("{}{}", base, STATEMENTS_PATH)))
            .query(&[("requestId", request_id.to_string())])
            .json(&self.statement_body(statement, bindings))
            .send()
            .await?;

        let mut status = response.status().as_u16();
        let mut payload = Self::read_payload(response).await?;

        let mut polls = 0;
        while status == 202 {
            let handle = payload
                .statement_handle
                .clone()
                .ok_or_else(|| ToolError::InvalidData("statement handle missing".to_string()))?;
            if polls >= self.max_polls {
                warn!("Statement {} still running after {} polls", handle, polls);
                return Err(ToolError::Upstream(format!(
                    "statement {} did not finish in time",
                    handle
                )));
            }
            polls += 1;
            tokio::time::sleep(self.poll_interval).await;

            let response = self
                .request(client.get(format!("{}{}/{}", base, STATEMENTS_PATH, handle)))
                .send()
                .await?;
            status = response.status().as_u16();
            payload = Self::read_payload(response).await?;
        }

        if status != 200 {
            return Err(ToolError::Upstream(format!(
                "warehouse returned {}: {}",
                status,
                payload.message.unwrap_or_default()
            )));
        }

        self.fetch_partitions(&client, &base, &mut payload).await?;
        Ok(into_records(payload))
    }

    /// Append partitions 1.. to the rows of partition 0
    async fn fetch_partitions(
        &self,
        client: &reqwest::Client,
        base: &str,
        payload: &mut StatementResponse,
    ) -> Result<(), ToolError> {
        let partitions = payload
            .result_set_meta_data
            .as_ref()
            .map_or(0, |m| m.partition_info.len());
        if partitions <= 1 {
            return Ok(());
        }

        let handle = payload
            .statement_handle
            .clone()
            .ok_or_else(|| ToolError::InvalidData("statement handle missing".to_string()))?;
        let expected: u64 = payload
            .result_set_meta_data
            .as_ref()
            .map_or(0, |m| m.partition_info.iter().map(|p| p.row_count).sum());
        debug!("Statement {} has {} partitions", handle, partitions);

        for partition in 1..partitions {
            let response = self
                .request(client.get(format!("{}{}/{}", base, STATEMENTS_PATH, handle)))
                .query(&[("partition", partition.to_string())])
                .send()
                .await?;
            let status = response.status().as_u16();
            let page = Self::read_payload(response).await?;
            if status != 200 {
                return Err(ToolError::Upstream(format!(
                    "warehouse returned {} for partition {}: {}",
                    status,
                    partition,
                    page.message.unwrap_or_default()
                )));
            }
            payload.data.extend(page.data);
        }

        if expected > 0 && payload.data.len() as u64 != expected {
            warn!(
                "Statement {} returned {} rows, partition info promised {}",
                handle,
                payload.data.len(),
                expected
            );
        }
        Ok(())
    }

    async fn read_payload(response: reqwest::Response) -> Result<StatementResponse, ToolError> {
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(StatementResponse {
                result_set_meta_data: None,
                data: Vec::new(),
                statement_handle: None,
                message: None,
            });
        }
        serde_json::from_str(&text).map_err(|e| ToolError::InvalidData(e.to_string()))
    }
}

#[derive(Deserialize, Default)]
struct StateArgs {
    #[serde(default)]
    state: Option<String>,
}

fn state_arg(args: Value) -> Result<Option<String>, ToolError> {
    if args.is_null() {
        return Ok(None);
    }
    let args: StateArgs =
        serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
    Ok(args.state.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
}

fn records_json(records: Vec<Record>) -> Value {
    Value::Array(records.into_iter().map(Value::Object).collect())
}

/// Year-over-year COVID-19 cases and deaths
pub struct CovidCasesTool {
    client: SqlApiClient,
}

impl CovidCasesTool {
    pub fn new(config: WarehouseConfig) -> Self {
        Self::with_client(SqlApiClient::new(config))
    }

    pub fn with_client(client: SqlApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolTrait for CovidCasesTool {
    fn name(&self) -> &str {
        "query_covid_cases_by_year"
    }

    fn description(&self) -> &str {
        "Retrieves year-over-year COVID-19 cases and deaths as JSON records."
    }

    fn parameters(&self) -> Value {
        state_parameter("Optional state filter. Omit for all states.")
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let state = state_arg(args)?;
        let records = match &state {
            Some(state) => {
                let statement = format!("{}\n    WHERE state = ?{}", COVID_CASES_HEAD, COVID_CASES_TAIL);
                self.client.query(&statement, &[state.as_str()]).await?
            }
            None => {
                let statement = format!("{}{}", COVID_CASES_HEAD, COVID_CASES_TAIL);
                self.client.query(&statement, &[]).await?
            }
        };
        Ok(records_json(records).to_string())
    }
}

/// COVID-19 vaccination provider counts per state
pub struct VaccineProvidersTool {
    client: SqlApiClient,
}

impl VaccineProvidersTool {
    pub fn new(config: WarehouseConfig) -> Self {
        Self::with_client(SqlApiClient::new(config))
    }

    pub fn with_client(client: SqlApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolTrait for VaccineProvidersTool {
    fn name(&self) -> &str {
        "query_vaccine_providers"
    }

    fn description(&self) -> &str {
        "Retrieves COVID-19 vaccination provider location counts by state as JSON records."
    }

    fn parameters(&self) -> Value {
        state_parameter("Optional full state name, e.g. Ohio. Omit for all states.")
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let code = state_arg(args)?.and_then(|s| postal_code(&s));
        let order = " GROUP BY LOC_ADMIN_STATE ORDER BY LOC_ADMIN_STATE";

        let records = match code {
            Some(code) => {
                let statement = format!("{} WHERE LOC_ADMIN_STATE = ?{}", VACCINE_PROVIDERS, order);
                self.client.query(&statement, &[code]).await?
            }
            None => {
                let statement = format!("{}{}", VACCINE_PROVIDERS, order);
                self.client.query(&statement, &[]).await?
            }
        };
        Ok(records_json(records).to_string())
    }
}

/// National emergency department visits, physician office visits and
/// delayed care due to cost
pub struct HealthcareAccessTool {
    client: SqlApiClient,
}

impl HealthcareAccessTool {
    pub fn new(config: WarehouseConfig) -> Self {
        Self::with_client(SqlApiClient::new(config))
    }

    pub fn with_client(client: SqlApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolTrait for HealthcareAccessTool {
    fn name(&self) -> &str {
        "query_healthcare_access"
    }

    fn description(&self) -> &str {
        "Retrieves healthcare access data: emergency department visits, physician office visits and delayed healthcare due to cost."
    }

    fn parameters(&self) -> Value {
        state_parameter("Optional state. The underlying data is national.")
    }

    async fn execute(&self, args: Value) -> ToolResult {
        // national tables: the state only shows up in the log
        if let Some(state) = state_arg(args)? {
            debug!("Healthcare access requested for {}, returning national data", state);
        }

        let emergency = self
            .client
            .query(VISITS_BY_PANEL, &["Hospital emergency departments"])
            .await?;
        let physician = self
            .client
            .query(VISITS_BY_PANEL, &["Physician offices"])
            .await?;
        let delayed = self.client.query(DELAYED_CARE_BY_YEAR, &[]).await?;

        Ok(json!({
            "emergency_dept_visits": records_json(emergency),
            "physician_visits": records_json(physician),
            "delayed_healthcare_by_year": records_json(delayed),
        })
        .to_string())
    }
}
