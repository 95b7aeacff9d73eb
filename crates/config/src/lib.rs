//! Configuration management for CareScope
//!
//! Loads model, search, warehouse and dataset settings from a JSON file and
//! overlays them with environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod paths;

pub use paths::{config_path, data_dir, datasets_dir, expand_home};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Language model settings shared by every agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Tool-calling steps a worker may take before giving up
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Attempts per plan step before the manager moves on
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_steps: default_max_steps(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_model() -> String {
    "grok-2-1212".to_string()
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_steps() -> u32 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

/// Web search / extract API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_search_base")]
    pub api_base: String,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: default_search_base(),
            max_results: default_max_results(),
        }
    }
}

impl SearchConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

fn default_search_base() -> String {
    "https://api.tavily.com".to_string()
}

fn default_max_results() -> u32 {
    5
}

/// Snowflake warehouse credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    #[serde(default)]
    pub user: String,
    /// Programmatic access token; older configs call it `password`
    #[serde(default, alias = "password")]
    pub token: String,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub warehouse: String,
    #[serde(default)]
    pub schema: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Overrides `https://{account}.snowflakecomputing.com`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_secs: u64,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            user: String::new(),
            token: String::new(),
            account: String::new(),
            database: String::new(),
            warehouse: String::new(),
            schema: String::new(),
            role: None,
            api_base: None,
            statement_timeout_secs: default_statement_timeout(),
        }
    }
}

impl WarehouseConfig {
    pub fn is_configured(&self) -> bool {
        !self.token.is_empty() && (!self.account.is_empty() || self.api_base.is_some())
    }

    /// Base URL of the SQL API
    pub fn base_url(&self) -> String {
        match &self.api_base {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!("https://{}.snowflakecomputing.com", self.account),
        }
    }
}

fn default_statement_timeout() -> u64 {
    60
}

/// Local dataset files read by the CSV and PDF tools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    #[serde(default = "default_datasets_dir")]
    pub dir: String,
    #[serde(default = "default_hospital_beds_csv")]
    pub hospital_beds_csv: String,
    #[serde(default = "default_emergency_visits_pdf")]
    pub emergency_visits_pdf: String,
    #[serde(default = "default_hospital_utilization_pdf")]
    pub hospital_utilization_pdf: String,
    #[serde(default = "default_emerging_challenges_pdf")]
    pub emerging_challenges_pdf: String,
    #[serde(default = "default_pdf_pages")]
    pub pdf_pages: usize,
    #[serde(default = "default_emerging_challenges_pages")]
    pub emerging_challenges_pages: usize,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            dir: default_datasets_dir(),
            hospital_beds_csv: default_hospital_beds_csv(),
            emergency_visits_pdf: default_emergency_visits_pdf(),
            hospital_utilization_pdf: default_hospital_utilization_pdf(),
            emerging_challenges_pdf: default_emerging_challenges_pdf(),
            pdf_pages: default_pdf_pages(),
            emerging_challenges_pages: default_emerging_challenges_pages(),
        }
    }
}

impl DatasetConfig {
    /// Dataset directory with `~` expanded
    pub fn dir_path(&self) -> PathBuf {
        expand_home(&self.dir)
    }

    pub fn path_of(&self, file: &str) -> PathBuf {
        self.dir_path().join(file)
    }
}

fn default_datasets_dir() -> String {
    "~/.carescope/data".to_string()
}

fn default_hospital_beds_csv() -> String {
    "DQS_Community_hospital_beds__by_state__United_States.csv".to_string()
}

fn default_emergency_visits_pdf() -> String {
    "EmergencyDepartment_Visits.pdf".to_string()
}

fn default_hospital_utilization_pdf() -> String {
    "HospitalUtilization.pdf".to_string()
}

fn default_emerging_challenges_pdf() -> String {
    "Emerging Challenges.pdf".to_string()
}

fn default_pdf_pages() -> usize {
    2
}

fn default_emerging_challenges_pages() -> usize {
    3
}

/// How a manager decides the order in which delegates run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DelegationMode {
    /// Steps run in declared order by the plan interpreter
    #[default]
    Scripted,
    /// Delegates are offered to the model as tools
    ModelDriven,
}

impl std::str::FromStr for DelegationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "scripted" => Ok(Self::Scripted),
            "model_driven" | "model" => Ok(Self::ModelDriven),
            other => Err(ConfigError::InvalidValue {
                key: "delegation".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Report assembly settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Mark sections built from failed or partial tool data
    #[serde(default = "default_true")]
    pub flag_degraded: bool,
    #[serde(default)]
    pub delegation: DelegationMode,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            flag_degraded: true,
            delegation: DelegationMode::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub datasets: DatasetConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub deploy: DeployConfig,
}

impl Config {
    /// Load from the default location
    pub async fn load() -> Result<Self> {
        let path = config_path();
        Self::load_from(&path).await
    }

    /// Load from a specific location, falling back to defaults
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        debug!("Reading config from {:?}", path);
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load the file, then the `.env` file, then the process environment
    pub async fn load_with_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!("Loaded environment from {:?}", path);
        }
        let mut config = Self::load().await?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Save to the default location
    pub async fn save(&self) -> Result<()> {
        let path = config_path();
        self.save_to(&path).await
    }

    /// Save to a specific location
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        debug!("Writing config to {:?}", path);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Overlay values from an environment lookup.
    ///
    /// Non-empty variables win over file values. The lookup is injected so
    /// callers can use the process environment or a fixed map.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("XAI_API_KEY").or_else(|| get("OPENAI_API_KEY")) {
            self.model.api_key = key;
        }
        if let Some(base) = get("CARESCOPE_API_BASE") {
            self.model.api_base = Some(base);
        }
        if let Some(model) = get("CARESCOPE_MODEL") {
            self.model.model = model;
        }
        if let Some(key) = get("TAVILY_API_KEY") {
            self.search.api_key = key;
        }

        let warehouse = &mut self.warehouse;
        if let Some(v) = get("SNOWFLAKE_USER") {
            warehouse.user = v;
        }
        if let Some(v) = get("SNOWFLAKE_TOKEN").or_else(|| get("SNOWFLAKE_PASSWORD")) {
            warehouse.token = v;
        }
        if let Some(v) = get("SNOWFLAKE_ACCOUNT") {
            warehouse.account = v;
        }
        if let Some(v) = get("SNOWFLAKE_DATABASE") {
            warehouse.database = v;
        }
        if let Some(v) = get("SNOWFLAKE_WAREHOUSE") {
            warehouse.warehouse = v;
        }
        if let Some(v) = get("SNOWFLAKE_SCHEMA") {
            warehouse.schema = v;
        }
        if let Some(v) = get("SNOWFLAKE_ROLE") {
            warehouse.role = Some(v);
        }

        if let Some(dir) = get("CARESCOPE_DATA_DIR") {
            self.datasets.dir = dir;
        }
        if let Some(mode) = get("CARESCOPE_DELEGATION") {
            self.report.delegation = mode.parse()?;
        }
        if let Some(host) = get("HOST") {
            self.deploy.host = host;
        }
        if let Some(port) = get("PORT") {
            self.deploy.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "PORT".to_string(),
                value: port.clone(),
            })?;
        }

        Ok(())
    }

    /// Model access configured
    pub fn has_api_key(&self) -> bool {
        !self.model.api_key.is_empty()
    }

    pub fn api_key(&self) -> Option<String> {
        if self.has_api_key() {
            Some(self.model.api_key.clone())
        } else {
            None
        }
    }

    pub fn default_model(&self) -> String {
        self.model.model.clone()
    }
}

/// Create the default config file and dataset directory
pub async fn init() -> Result<Config> {
    let config_path = config_path();

    if config_path.exists() {
        warn!("Config already exists at {:?}", config_path);
    } else {
        let config = Config::default();
        config.save().await?;
        info!("Created config at {:?}", config_path);
    }

    let config = Config::load().await?;
    let datasets = config.datasets.dir_path();
    paths::ensure_dir(&datasets).await?;
    info!("Dataset directory ready at {:?}", datasets);

    Ok(config)
}
