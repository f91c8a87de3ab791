//! Staleness-driven import orchestration.
//!
//! Every entity type moves FRESH -> STALE (lifetime expired) -> IMPORTING -> FRESH.
//! A cycle visits every type in dependency order, imports the stale ones and
//! reports coarse progress: each visited type adds `100 / N` percent regardless
//! of how much work it took. That signal only has to be monotonic.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uex_models::{EntityType, ImportConfig, ParentSelector};
use uex_store::{Predicate, Query, Store, StoreError};

use crate::error::LoaderError;
use crate::sources::{CatalogSource, FetchParams};
use crate::writer::write_entity;

/// Observer of import cycles.
pub trait ImportListener: Send + Sync {
    fn on_progress(&self, _percent: u8) {}

    /// Called once at the end of every cycle with the number of rows written.
    fn on_import_completed(&self, total_rows: usize);
}

/// What happened to one entity type during a cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityOutcome {
    Imported { rows: usize, swept: usize },
    SkippedFresh,
    /// The table is missing, usually mid-migration.
    SkippedSchemaMissing,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportReport {
    pub run_id: i64,
    pub outcomes: Vec<(EntityType, EntityOutcome)>,
    pub total_rows: usize,
}

impl ImportReport {
    pub fn outcome(&self, entity: EntityType) -> Option<&EntityOutcome> {
        self.outcomes
            .iter()
            .find(|(e, _)| *e == entity)
            .map(|(_, o)| o)
    }

    pub fn imported(&self) -> impl Iterator<Item = EntityType> + '_ {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, EntityOutcome::Imported { .. }))
            .map(|(e, _)| *e)
    }

    pub fn failed(&self) -> impl Iterator<Item = EntityType> + '_ {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, EntityOutcome::Failed(_)))
            .map(|(e, _)| *e)
    }
}

pub struct Importer {
    store: Arc<Store>,
    source: Arc<dyn CatalogSource>,
    config: ImportConfig,
    listeners: Vec<Arc<dyn ImportListener>>,
    progress: AtomicU8,
    last_run_id: AtomicI64,
}

impl Importer {
    pub fn new(store: Arc<Store>, source: Arc<dyn CatalogSource>, config: ImportConfig) -> Self {
        Self {
            store,
            source,
            config,
            listeners: Vec::new(),
            progress: AtomicU8::new(0),
            last_run_id: AtomicI64::new(0),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn ImportListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Percentage of entity types visited in the current (or last) cycle.
    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::SeqCst)
    }

    /// True if the type was never imported or its lifetime has run out.
    pub fn needs_import(&self, entity: EntityType) -> Result<bool, StoreError> {
        self.needs_import_at(entity, Utc::now())
    }

    pub fn needs_import_at(
        &self,
        entity: EntityType,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(match self.store.import_meta(entity)? {
            None => true,
            Some(meta) => meta.imported_at + entity.tier().lifetime(&self.config) < now,
        })
    }

    /// Millisecond timestamp, strictly greater than any run id handed out before.
    fn next_run_id(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let previous = self
            .last_run_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        now.max(previous + 1)
    }

    /// Run one full cycle. `force_check` bypasses the lifetime gate.
    pub async fn run_cycle(&self, force_check: bool) -> Result<ImportReport, LoaderError> {
        let run_id = self.next_run_id();
        let order = import_order();
        let total = order.len();
        self.set_progress(0);
        info!(run_id, force_check, "Import cycle starting");

        let mut outcomes = Vec::with_capacity(total);
        let mut total_rows = 0;

        for (done, entity) in order.into_iter().enumerate() {
            let outcome = if !force_check && !self.needs_import(entity)? {
                debug!(entity = %entity, "Skipping fresh entity");
                EntityOutcome::SkippedFresh
            } else {
                self.import_entity(entity, run_id).await
            };

            if let EntityOutcome::Imported { rows, .. } = outcome {
                total_rows += rows;
            }
            outcomes.push((entity, outcome));
            self.set_progress(((done + 1) * 100 / total) as u8);
        }

        self.set_progress(100);
        info!(run_id, total_rows, "Import cycle complete");
        for listener in &self.listeners {
            listener.on_import_completed(total_rows);
        }

        Ok(ImportReport {
            run_id,
            outcomes,
            total_rows,
        })
    }

    async fn import_entity(&self, entity: EntityType, run_id: i64) -> EntityOutcome {
        match self.store.table_exists(entity) {
            Ok(true) => {}
            Ok(false) => {
                warn!(entity = %entity, "Table missing, skipping import");
                return EntityOutcome::SkippedSchemaMissing;
            }
            Err(e) => {
                error!(entity = %entity, error = %e, "Failed to probe table");
                return EntityOutcome::Failed(e.to_string());
            }
        }

        let started = Instant::now();
        let records = match self.fetch_records(entity).await {
            Ok(records) => records,
            Err(e) => {
                warn!(entity = %entity, error = %e, "Fetch failed, entity stays stale");
                return EntityOutcome::Failed(e.to_string());
            }
        };

        match write_entity(&self.store, entity, run_id, &records, started) {
            Ok(outcome) => {
                info!(
                    entity = %entity,
                    rows = outcome.written,
                    swept = outcome.swept,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Imported entity"
                );
                EntityOutcome::Imported {
                    rows: outcome.written,
                    swept: outcome.swept,
                }
            }
            Err(StoreError::Schema(message)) => {
                warn!(entity = %entity, error = %message, "Schema missing during write");
                EntityOutcome::SkippedSchemaMissing
            }
            Err(e) => {
                error!(entity = %entity, error = %e, "Failed to write entity");
                EntityOutcome::Failed(e.to_string())
            }
        }
    }

    /// Fetch all records of one type, once per parent id if the fetch is parameterized.
    ///
    /// A failure for any parent id fails the whole type, so a partial result never
    /// sweeps rows that merely went unfetched.
    async fn fetch_records(&self, entity: EntityType) -> Result<Vec<Value>, LoaderError> {
        let endpoint = entity.endpoint();
        let Some(dependency) = entity.fetch_dependency() else {
            return self.source.fetch(endpoint, &FetchParams::new()).await;
        };

        let ids = self.parent_ids(dependency.parent, dependency.selector)?;
        let mut records = Vec::new();
        for id in ids {
            let params = vec![(dependency.param.to_string(), id.to_string())];
            match self.source.fetch(endpoint, &params).await {
                Ok(batch) => records.extend(batch),
                Err(e) => {
                    warn!(
                        entity = %entity,
                        param = dependency.param,
                        id,
                        error = %e,
                        "Parameterized fetch failed"
                    );
                    return Err(e);
                }
            }
        }
        Ok(records)
    }

    fn parent_ids(
        &self,
        parent: EntityType,
        selector: ParentSelector,
    ) -> Result<Vec<i64>, StoreError> {
        let mut query = Query::new(parent).order_asc("id");
        query = match selector {
            ParentSelector::Available => query.filter(Predicate::eq("is_available", true)),
            ParentSelector::BuyableAndSellable => query
                .filter(Predicate::eq("is_buyable", true))
                .filter(Predicate::eq("is_sellable", true)),
            ParentSelector::All => query,
        };
        Ok(self
            .store
            .query(&query)?
            .iter()
            .filter_map(|record| record.get("id").and_then(Value::as_i64))
            .collect())
    }

    fn set_progress(&self, percent: u8) {
        let percent = percent.min(100);
        self.progress.store(percent, Ordering::SeqCst);
        for listener in &self.listeners {
            listener.on_progress(percent);
        }
    }
}

/// Every entity type, parents before the types whose fetch they parameterize.
pub fn import_order() -> Vec<EntityType> {
    fn visit(entity: EntityType, seen: &mut BTreeSet<EntityType>, order: &mut Vec<EntityType>) {
        if !seen.insert(entity) {
            return;
        }
        if let Some(dependency) = entity.fetch_dependency() {
            visit(dependency.parent, seen, order);
        }
        order.push(entity);
    }

    let mut seen = BTreeSet::new();
    let mut order = Vec::with_capacity(EntityType::ALL.len());
    for entity in EntityType::ALL {
        visit(entity, &mut seen, &mut order);
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_catalog;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        progress: Mutex<Vec<u8>>,
        completed: Mutex<Vec<usize>>,
    }

    impl ImportListener for Recorder {
        fn on_progress(&self, percent: u8) {
            self.progress.lock().unwrap().push(percent);
        }

        fn on_import_completed(&self, total_rows: usize) {
            self.completed.lock().unwrap().push(total_rows);
        }
    }

    fn importer(source: Arc<dyn CatalogSource>) -> Importer {
        let store = Arc::new(Store::open_in_memory().unwrap());
        Importer::new(store, source, ImportConfig::default())
    }

    #[test]
    fn order_puts_parents_first() {
        let order = import_order();
        assert_eq!(order.len(), EntityType::ALL.len());
        let pos = |e| order.iter().position(|x| *x == e).unwrap();
        for entity in EntityType::ALL {
            if let Some(dep) = entity.fetch_dependency() {
                assert!(pos(dep.parent) < pos(entity), "{entity} before {}", dep.parent);
            }
        }
    }

    #[test]
    fn run_ids_are_monotonic() {
        let importer = importer(Arc::new(sample_catalog()));
        let a = importer.next_run_id();
        let b = importer.next_run_id();
        assert!(b > a);
    }

    #[tokio::test]
    async fn cycle_imports_everything_once() {
        let recorder = Arc::new(Recorder::default());
        let importer = importer(Arc::new(sample_catalog())).with_listener(recorder.clone());

        let report = importer.run_cycle(false).await.unwrap();
        assert_eq!(report.failed().count(), 0);
        assert_eq!(report.imported().count(), EntityType::ALL.len());
        assert!(report.total_rows > 0);
        assert_eq!(importer.progress(), 100);

        let progress = recorder.progress.lock().unwrap().clone();
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(progress.last(), Some(&100));
        assert_eq!(*recorder.completed.lock().unwrap(), vec![report.total_rows]);

        // Everything is fresh now.
        let second = importer.run_cycle(false).await.unwrap();
        assert_eq!(second.imported().count(), 0);
        assert_eq!(second.total_rows, 0);

        // Forcing bypasses the lifetime gate.
        let forced = importer.run_cycle(true).await.unwrap();
        assert_eq!(forced.imported().count(), EntityType::ALL.len());
    }

    #[tokio::test]
    async fn routes_follow_tradable_commodities() {
        let source = Arc::new(sample_catalog());
        let importer = importer(source.clone());
        importer.run_cycle(false).await.unwrap();

        // Every stored route belongs to a buyable and sellable commodity.
        let ids = importer
            .parent_ids(EntityType::Commodity, ParentSelector::BuyableAndSellable)
            .unwrap();
        let routes = importer
            .store()
            .query(&Query::new(EntityType::CommodityRoute))
            .unwrap();
        assert!(!routes.is_empty());
        for route in routes {
            let commodity = route["id_commodity"].as_i64().unwrap();
            assert!(ids.contains(&commodity));
        }
    }

    #[tokio::test]
    async fn fetch_failure_keeps_entity_stale() {
        let source = Arc::new(sample_catalog());
        source.fail(EntityType::Vehicle);
        let importer = importer(source.clone());

        let report = importer.run_cycle(false).await.unwrap();
        assert!(matches!(
            report.outcome(EntityType::Vehicle),
            Some(EntityOutcome::Failed(_))
        ));
        assert!(matches!(
            report.outcome(EntityType::Terminal),
            Some(EntityOutcome::Imported { .. })
        ));
        assert!(importer.needs_import(EntityType::Vehicle).unwrap());
        assert!(!importer.needs_import(EntityType::Terminal).unwrap());

        source.recover(EntityType::Vehicle);
        let retry = importer.run_cycle(false).await.unwrap();
        assert_eq!(retry.imported().collect::<Vec<_>>(), vec![EntityType::Vehicle]);
    }

    #[tokio::test]
    async fn missing_table_is_skipped_not_fatal() {
        let importer = importer(Arc::new(sample_catalog()));
        importer.store().drop_table(EntityType::Item).unwrap();

        let report = importer.run_cycle(false).await.unwrap();
        assert_eq!(
            report.outcome(EntityType::Item),
            Some(&EntityOutcome::SkippedSchemaMissing)
        );
        assert!(matches!(
            report.outcome(EntityType::Category),
            Some(EntityOutcome::Imported { .. })
        ));
    }

    #[tokio::test]
    async fn lifetime_gate() {
        let importer = importer(Arc::new(sample_catalog()));
        importer.run_cycle(false).await.unwrap();

        let now = Utc::now();
        let short = ImportConfig::default().short_lifetime_seconds as i64;
        let later = now + chrono::Duration::seconds(short + 1);
        assert!(!importer.needs_import_at(EntityType::CommodityPrice, now).unwrap());
        assert!(importer
            .needs_import_at(EntityType::CommodityPrice, later)
            .unwrap());
        // A long-lived type is still fresh after the short window.
        assert!(!importer.needs_import_at(EntityType::Terminal, later).unwrap());
    }
}
