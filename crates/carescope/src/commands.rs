//! CareScope command implementations

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use carescope_agent::tools::states::{is_known_state, US_STATES};
use carescope_api::AppState;
use carescope_config::{self, Config};
use carescope_report::{ReportGenerator, ReportPipeline};

fn mark(ok: bool, yes: &'static str, no: &'static str) -> &'static str {
    if ok {
        yes
    } else {
        no
    }
}

fn pipeline(config: Config) -> ReportPipeline {
    if !config.has_api_key() {
        warn!("Set XAI_API_KEY or OPENAI_API_KEY, or add a key to ~/.carescope/config.json");
    }
    ReportPipeline::from_config(Arc::new(config))
}

/// Initialize config and dataset directory
pub async fn init_command() -> Result<()> {
    println!("◆ Initializing CareScope...");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = carescope_config::init().await?;

    println!("Config:   {}", carescope_config::config_path().display());
    println!("Datasets: {}", config.datasets.dir_path().display());
    println!("\n◆ CareScope initialized");
    println!("\nNext steps:");
    println!("  1. Set XAI_API_KEY (or OPENAI_API_KEY) and TAVILY_API_KEY");
    println!("  2. Set the SNOWFLAKE_* variables for warehouse access");
    println!("  3. Copy the hospital beds CSV and report PDFs into the dataset directory");
    println!("  4. Generate a report: carescope generate --state Ohio");

    Ok(())
}

/// Show configuration status
pub async fn status_command() -> Result<()> {
    let config_path = carescope_config::config_path();

    println!("◆ CareScope Status");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "Config:    {} {}",
        config_path.display(),
        mark(config_path.exists(), "[OK]", "[Missing]")
    );

    let config = Config::load_with_env().await?;
    let datasets = &config.datasets;
    println!(
        "Datasets:  {} {}",
        datasets.dir_path().display(),
        mark(datasets.dir_path().exists(), "[OK]", "[Missing]")
    );
    for file in [
        &datasets.hospital_beds_csv,
        &datasets.emergency_visits_pdf,
        &datasets.hospital_utilization_pdf,
        &datasets.emerging_challenges_pdf,
    ] {
        println!(
            "  {} {}",
            file,
            mark(datasets.path_of(file).exists(), "[OK]", "[Missing]")
        );
    }

    println!("Model:     {}", config.default_model());
    println!("API Key:   {}", mark(config.has_api_key(), "[Set]", "[Missing]"));
    println!(
        "Search:    {}",
        mark(config.search.is_configured(), "[Set]", "[Missing]")
    );
    println!(
        "Warehouse: {}",
        mark(config.warehouse.is_configured(), "[Set]", "[Missing]")
    );
    println!("Delegation: {:?}", config.report.delegation);

    println!("\n◆ Ready");
    Ok(())
}

/// List supported states
pub fn states_command() {
    for (name, code) in US_STATES {
        println!("{}  {}", code, name);
    }
}

async fn write_report(path: &Path, markdown: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, markdown)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Generate a report for one state
pub async fn generate_command(state: String, output: Option<PathBuf>) -> Result<()> {
    if !is_known_state(&state) {
        warn!("'{}' is not a US state name; warehouse lookups will find nothing", state);
    }

    let config = Config::load_with_env().await?;
    let pipeline = pipeline(config);

    let report = pipeline.generate(&state).await?;
    let markdown = report.to_markdown();

    match output {
        Some(path) => {
            write_report(&path, &markdown).await?;
            info!("Report written to {}", path.display());
        }
        None => println!("{}", markdown),
    }

    Ok(())
}

/// Start the HTTP server
pub async fn serve_command(host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = Config::load_with_env().await?;
    if let Some(host) = host {
        config.deploy.host = host;
    }
    if let Some(port) = port {
        config.deploy.port = port;
    }

    let addr: SocketAddr = format!("{}:{}", config.deploy.host, config.deploy.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.deploy.host, config.deploy.port
            )
        })?;

    println!("◆ Starting CareScope server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        "Model: {}, delegation: {:?}",
        config.default_model(),
        config.report.delegation
    );

    let generator: Arc<dyn ReportGenerator> = Arc::new(pipeline(config));
    carescope_api::serve(addr, AppState::new(generator)).await?;

    Ok(())
}
