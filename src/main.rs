//! Sortify - Semantic File Routing Engine
//!
//! Command-line front end: inspect and validate configuration, and classify
//! a single request against a fresh engine.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sortify::{
    config::SortifyConfig,
    external::{HashingEmbedder, HttpReasoner, NoReasoner, Reasoner},
    ClassificationRequest, SortingCore,
};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sortify")]
#[command(version)]
#[command(about = "Semantic file routing engine")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SORTIFY_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },

    /// Validate the configuration file
    Check,

    /// Classify one request
    Classify {
        /// ClassificationRequest as JSON, or "-" to read it from stdin
        #[arg(short, long)]
        request: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries command output
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("sortify={}", log_level).into());
    tracing_subscriber::registry()
        .with(filter)
        .with(
            cli.json_logs
                .then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
        )
        .with(
            (!cli.json_logs).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        )
        .init();

    match cli.command {
        Commands::Config { default } => {
            let config = if default {
                SortifyConfig::default()
            } else {
                load_config(cli.config.as_ref())?
            };
            show_config(&config)?;
        }
        Commands::Check => {
            let path = cli
                .config
                .as_ref()
                .context("check requires --config <file>")?;
            let config = SortifyConfig::from_file(path)
                .with_context(|| format!("Invalid configuration: {}", path.display()))?;
            println!(
                "✓ {} is valid ({} voters, dimension {})",
                path.display(),
                config.weights.len(),
                config.dimension
            );
        }
        Commands::Classify { request } => {
            let config = load_config(cli.config.as_ref())?;
            classify(config, &request).await?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<SortifyConfig> {
    match path {
        Some(path) => SortifyConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration: {}", path.display())),
        None => Ok(SortifyConfig::default()),
    }
}

async fn classify(config: SortifyConfig, raw: &str) -> Result<()> {
    let json = if raw == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        raw.to_string()
    };
    let request: ClassificationRequest =
        serde_json::from_str(&json).context("Request is not a valid ClassificationRequest")?;

    let reasoner: Arc<dyn Reasoner> = match HttpReasoner::from_config(&config.reasoning)? {
        Some(http) => Arc::new(http),
        None => Arc::new(NoReasoner),
    };
    let embedder = Arc::new(HashingEmbedder::new(config.dimension));
    let core = SortingCore::new(config, embedder, reasoner)?;

    let classification = core.classify(&request).await?;
    println!("{}", serde_json::to_string_pretty(&classification)?);
    Ok(())
}

fn show_config(config: &SortifyConfig) -> Result<()> {
    let toml = toml::to_string_pretty(config)?;
    println!("{}", toml);
    Ok(())
}
