//! Web tools over the Tavily API: web_search and fetch_web_content

use async_trait::async_trait;
use carescope_config::SearchConfig;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{ToolError, ToolResult, ToolTrait};

const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);
const EXTRACT_TIMEOUT: Duration = Duration::from_secs(60);

/// Rendered in place of search results when the search fails
pub const EMPTY_SEARCH_RESULTS: &str = r#"{"results": []}"#;

/// Rendered in place of page content when extraction fails
pub const FETCH_PLACEHOLDER: &str =
    "No content could be retrieved from the requested pages; continue with the data already gathered.";

async fn post_json(api_base: &str, path: &str, api_key: &str, body: Value, timeout: Duration) -> Result<Value, ToolError> {
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/{}", api_base.trim_end_matches('/'), path))
        .bearer_auth(api_key)
        .json(&body)
        .timeout(timeout)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(ToolError::Upstream(format!(
            "search API returned {}: {}",
            status,
            text.chars().take(200).collect::<String>()
        )));
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| ToolError::InvalidData(e.to_string()))
}

/// Web search returning the raw Tavily payload
pub struct WebSearchTool {
    api_key: String,
    api_base: String,
    max_results: u32,
}

impl WebSearchTool {
    pub fn new(api_key: impl Into<String>, api_base: impl Into<String>, max_results: u32) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: api_base.into(),
            max_results,
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(&config.api_key, &config.api_base, config.max_results)
    }
}

#[derive(Deserialize)]
struct WebSearchArgs {
    query: String,
}

#[async_trait]
impl ToolTrait for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Searches the web for COVID-19 and healthcare information. Returns a JSON string of search results."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query about COVID-19 or healthcare" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let args: WebSearchArgs =
            serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        if self.api_key.is_empty() {
            return Err(ToolError::NotConfigured("TAVILY_API_KEY".to_string()));
        }
        debug!("Web search: {}", args.query);

        let body = json!({
            "query": args.query,
            "max_results": self.max_results,
        });
        let payload = post_json(&self.api_base, "search", &self.api_key, body, SEARCH_TIMEOUT).await?;
        Ok(payload.to_string())
    }

    fn render_failure(&self, _err: &ToolError) -> String {
        EMPTY_SEARCH_RESULTS.to_string()
    }
}

/// Page content extraction for URLs found by a search
pub struct FetchWebContentTool {
    api_key: String,
    api_base: String,
}

impl FetchWebContentTool {
    pub fn new(api_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: api_base.into(),
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(&config.api_key, &config.api_base)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Urls {
    Many(Vec<String>),
    One(String),
}

#[derive(Deserialize)]
struct FetchArgs {
    #[serde(alias = "url")]
    urls: Urls,
}

#[async_trait]
impl ToolTrait for FetchWebContentTool {
    fn name(&self) -> &str {
        "fetch_web_content"
    }

    fn description(&self) -> &str {
        "Fetches content from specific URLs for detailed information."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "urls": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "URLs to fetch content from"
                }
            },
            "required": ["urls"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let args: FetchArgs =
            serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        let urls = match args.urls {
            Urls::Many(urls) => urls,
            Urls::One(url) => vec![url],
        };
        if urls.is_empty() {
            return Err(ToolError::InvalidArguments("no urls given".to_string()));
        }
        if self.api_key.is_empty() {
            return Err(ToolError::NotConfigured("TAVILY_API_KEY".to_string()));
        }
        debug!("Fetching {} urls, first {}", urls.len(), urls[0]);

        let payload = post_json(
            &self.api_base,
            "extract",
            &self.api_key,
            json!({ "urls": urls }),
            EXTRACT_TIMEOUT,
        )
        .await?;

        payload["results"]
            .get(0)
            .and_then(|r| r["raw_content"].as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ToolError::InvalidData("no extracted content in response".to_string()))
    }

    fn render_failure(&self, _err: &ToolError) -> String {
        FETCH_PLACEHOLDER.to_string()
    }
}
