//! CareScope - COVID-19 healthcare impact reports from multi-agent research

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{generate_command, init_command, serve_command, states_command, status_command};

/// CareScope - healthcare impact reports for US states
#[derive(Parser)]
#[command(name = "carescope")]
#[command(about = "◆ Multi-agent healthcare impact report generator")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config and dataset directory
    Init,
    /// Show configuration status
    Status,
    /// List the US states reports can be generated for
    States,
    /// Generate a report for one state
    Generate {
        /// State name, e.g. "Ohio"
        #[arg(short, long)]
        state: String,
        /// Write the markdown here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Verbose logging
        #[arg(short, long)]
        verbose: bool,
    },
    /// Start the HTTP server
    Serve {
        /// Address to bind (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
        /// Verbose logging
        #[arg(short, long)]
        verbose: bool,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // stdout is reserved for report output
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let verbose = matches!(
        cli.command,
        Commands::Generate { verbose: true, .. } | Commands::Serve { verbose: true, .. }
    );
    init_tracing(verbose);

    match cli.command {
        Commands::Init => {
            if let Err(e) = init_command().await {
                error!("Init failed: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Status => {
            if let Err(e) = status_command().await {
                error!("Status failed: {}", e);
                std::process::exit(1);
            }
        }
        Commands::States => states_command(),
        Commands::Generate { state, output, .. } => {
            if let Err(e) = generate_command(state, output).await {
                error!("Generate failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Commands::Serve { host, port, .. } => {
            if let Err(e) = serve_command(host, port).await {
                error!("Serve failed: {:#}", e);
                std::process::exit(1);
            }
        }
    }
}
