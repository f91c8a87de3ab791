//! UEX trade engine: a local cache of the UEX market catalog, a trade-route
//! optimizer and a small set of readiness-gated tools on top.
//!
//! [`Engine`] wires the store, importer, version guard, blacklist reconciler,
//! validators and tool dispatcher together. One engine is built per running
//! session and handed to whatever drives it.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use uex::models::UexConfig;
//! use uex::loader::HttpCatalog;
//!
//! # async fn run() -> Result<(), uex::loader::LoaderError> {
//! let config = UexConfig::default();
//! let source = Arc::new(HttpCatalog::from_config(&config.api)?);
//! let engine = uex::Engine::open(config, source)?;
//! engine.import(false).await?;
//! let response = engine.call("find_trade_routes", &serde_json::json!({})).await;
//! # Ok(())
//! # }
//! ```

pub use uex_loader as loader;
pub use uex_models as models;
pub use uex_store as store;
pub use uex_tools as tools;

use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uex_loader::{
    BlacklistReconciler, CatalogSource, Daemon, EntityOutcome, ImportCompletion, ImportListener,
    ImportReport, Importer, LoaderError, VersionGuard,
};
use uex_models::{Readiness, UexConfig};
use uex_store::{Catalog, Store};
use uex_tools::{
    RouteOptimizer, SimilarityMatcher, ToolDispatcher, ToolError, ToolResponse, Validators,
};

/// Signals emitted to whoever drives the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// The first import finished after a caller was turned away while loading.
    ToolsAvailable,
}

pub struct Engine {
    config: UexConfig,
    store: Arc<Store>,
    catalog: Arc<Catalog>,
    importer: Arc<Importer>,
    guard: Arc<VersionGuard>,
    completion: ImportCompletion,
    readiness: Arc<Readiness>,
    dispatcher: ToolDispatcher,
    events: broadcast::Sender<EngineEvent>,
}

impl Engine {
    /// Open the configured SQLite store and build an engine over it.
    pub fn open(
        config: UexConfig,
        source: Arc<dyn CatalogSource>,
    ) -> Result<Arc<Self>, LoaderError> {
        let path = Path::new(&config.store.sqlite_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let store = Arc::new(Store::open(path)?);
        Ok(Self::build(config, store, source))
    }

    /// Build an engine over an already opened store.
    pub fn build(
        config: UexConfig,
        store: Arc<Store>,
        source: Arc<dyn CatalogSource>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|engine: &Weak<Engine>| {
            let readiness = Arc::new(Readiness::new());
            let catalog = Arc::new(Catalog::new(store.clone()));
            let guard = Arc::new(VersionGuard::new(
                store.clone(),
                source.clone(),
                config.import.plugin_version.clone(),
            ));
            let completion = ImportCompletion::new(
                BlacklistReconciler::new(store.clone(), &config.blacklist.directory),
                guard.clone(),
                readiness.clone(),
            );
            let importer = Arc::new(
                Importer::new(store.clone(), source, config.import.clone())
                    .with_listener(Arc::new(Relay(engine.clone()))),
            );

            let validators = Arc::new(Validators::new(
                catalog.clone(),
                Arc::new(SimilarityMatcher::new(config.validation.match_threshold)),
                config.validation.clone(),
            ));
            let optimizer = Arc::new(RouteOptimizer::new(catalog.clone(), config.routes.clone()));
            let dispatcher =
                ToolDispatcher::new(validators, optimizer, catalog.clone(), readiness.clone());
            let (events, _) = broadcast::channel(16);

            Engine {
                config,
                store,
                catalog,
                importer,
                guard,
                completion,
                readiness,
                dispatcher,
                events,
            }
        })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn readiness(&self) -> &Arc<Readiness> {
        &self.readiness
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Check version parity, then run one import cycle. A rebuilt store forces
    /// every entity type to be fetched again.
    pub async fn import(&self, force_check: bool) -> Result<ImportReport, LoaderError> {
        let status = self.guard.check(&self.readiness).await?;
        self.importer.run_cycle(force_check || status.rebuilt()).await
    }

    /// A daemon that keeps this engine's store fresh until cancelled.
    pub fn daemon(&self) -> Daemon {
        Daemon::new(
            self.importer.clone(),
            self.guard.clone(),
            self.readiness.clone(),
            Duration::from_secs(self.config.import.check_interval_seconds),
        )
    }

    pub async fn descriptors(&self) -> Result<Vec<Value>, ToolError> {
        self.dispatcher.descriptors().await
    }

    pub async fn call(&self, tool: &str, args: &Value) -> ToolResponse {
        self.dispatcher.call(tool, args).await
    }
}

impl ImportListener for Engine {
    fn on_progress(&self, percent: u8) {
        self.completion.on_progress(percent);
    }

    fn on_import_completed(&self, total_rows: usize) {
        let notify = self.completion.complete(total_rows);
        // Blacklist flags may have changed, so candidate lists are rebuilt lazily.
        self.catalog.invalidate();
        if notify {
            info!("Tools are now available");
            if self.events.send(EngineEvent::ToolsAvailable).is_err() {
                debug!("No subscribers for engine events");
            }
        }
    }
}

/// Forwards importer callbacks to the engine that owns the importer.
struct Relay(Weak<Engine>);

impl ImportListener for Relay {
    fn on_progress(&self, percent: u8) {
        if let Some(engine) = self.0.upgrade() {
            engine.on_progress(percent);
        }
    }

    fn on_import_completed(&self, total_rows: usize) {
        if let Some(engine) = self.0.upgrade() {
            engine.on_import_completed(total_rows);
        }
    }
}

/// JSON summary of an import cycle.
pub fn report_json(report: &ImportReport) -> Value {
    let entities: Vec<Value> = report
        .outcomes
        .iter()
        .map(|(entity, outcome)| {
            let mut row = json!({ "entity": entity.table() });
            match outcome {
                EntityOutcome::Imported { rows, swept } => {
                    row["status"] = json!("imported");
                    row["rows"] = json!(rows);
                    row["swept"] = json!(swept);
                }
                EntityOutcome::SkippedFresh => row["status"] = json!("fresh"),
                EntityOutcome::SkippedSchemaMissing => row["status"] = json!("schema_missing"),
                EntityOutcome::Failed(error) => {
                    row["status"] = json!("failed");
                    row["error"] = json!(error);
                }
            }
            row
        })
        .collect();
    json!({
        "run_id": report.run_id,
        "total_rows": report.total_rows,
        "entities": entities,
    })
}
