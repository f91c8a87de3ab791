use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use uex_loader::{
    BlacklistReconciler, CatalogSource, Daemon, HttpCatalog, ImportCompletion, Importer,
    VersionGuard,
};
use uex_models::{Readiness, UexConfig};
use uex_store::Store;

#[derive(Parser, Debug)]
#[command(
    name = "uex-loader",
    about = "UEX cache loader daemon - keeps the local SQLite catalog in sync with the remote trade catalog"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/uex.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = UexConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config: {}", cli.config))?;

    let store = Arc::new(
        Store::open(&config.store.sqlite_path)
            .with_context(|| format!("Failed to open store: {}", config.store.sqlite_path))?,
    );
    let source: Arc<dyn CatalogSource> = Arc::new(
        HttpCatalog::from_config(&config.api).context("Failed to build catalog client")?,
    );

    let readiness = Arc::new(Readiness::new());
    let guard = Arc::new(VersionGuard::new(
        store.clone(),
        source.clone(),
        config.import.plugin_version.clone(),
    ));
    let completion = Arc::new(ImportCompletion::new(
        BlacklistReconciler::new(store.clone(), &config.blacklist.directory),
        guard.clone(),
        readiness.clone(),
    ));
    let importer = Arc::new(
        Importer::new(store, source, config.import.clone()).with_listener(completion),
    );

    let daemon = Daemon::new(
        importer,
        guard,
        readiness,
        Duration::from_secs(config.import.check_interval_seconds),
    );
    let cancel = daemon.cancel_token();

    // Handle shutdown signals
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received shutdown signal");
        cancel.cancel();
    });

    daemon
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Daemon error: {e}"))?;

    Ok(())
}
