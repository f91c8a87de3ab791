use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use uex::loader::{CatalogSource, HttpCatalog};
use uex::models::UexConfig;
use uex::Engine;

#[derive(Parser, Debug)]
#[command(name = "uex", about = "UEX market cache and trade-route tools")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/uex.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one import cycle and print a summary
    Import {
        /// Fetch every entity type regardless of freshness
        #[arg(long)]
        force: bool,
    },
    /// Keep the local store in sync until interrupted
    Daemon,
    /// Print the tool descriptors
    Tools {
        /// Pretty-print the output JSON
        #[arg(long)]
        pretty: bool,
    },
    /// Call a tool with JSON arguments from a file or stdin
    Call {
        tool: String,

        /// Read the arguments from a file instead of stdin
        #[arg(short, long)]
        input: Option<String>,

        /// Pretty-print the output JSON
        #[arg(long)]
        pretty: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = UexConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config: {}", cli.config))?;
    let source: Arc<dyn CatalogSource> = Arc::new(
        HttpCatalog::from_config(&config.api).context("Failed to build catalog client")?,
    );
    let engine = Engine::open(config, source).context("Failed to open store")?;

    match cli.command {
        Command::Import { force } => {
            let report = engine
                .import(force)
                .await
                .map_err(|e| anyhow::anyhow!("Import failed: {e}"))?;
            print_json(&uex::report_json(&report), true)?;
        }
        Command::Daemon => {
            let daemon = engine.daemon();
            let cancel = daemon.cancel_token();
            tokio::spawn(async move {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Received shutdown signal");
                cancel.cancel();
            });
            daemon
                .run()
                .await
                .map_err(|e| anyhow::anyhow!("Daemon error: {e}"))?;
        }
        Command::Tools { pretty } => {
            engine
                .import(false)
                .await
                .map_err(|e| anyhow::anyhow!("Import failed: {e}"))?;
            let descriptors = engine
                .descriptors()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to describe tools: {e}"))?;
            print_json(&Value::Array(descriptors), pretty)?;
        }
        Command::Call {
            tool,
            input,
            pretty,
        } => {
            let raw = if let Some(path) = &input {
                std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read input: {path}"))?
            } else {
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .context("Failed to read from stdin")?;
                buf
            };
            let args: Value = if raw.trim().is_empty() {
                Value::Null
            } else {
                serde_json::from_str(&raw).context("Failed to parse arguments JSON")?
            };

            // The store must be current before tools answer anything but "loading".
            engine
                .import(false)
                .await
                .map_err(|e| anyhow::anyhow!("Import failed: {e}"))?;
            let response = engine.call(&tool, &args).await;
            print_json(&serde_json::to_value(&response)?, pretty)?;
        }
    }

    Ok(())
}

fn print_json(value: &Value, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{output}");
    Ok(())
}
