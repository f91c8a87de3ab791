//! Version parity between this engine, the remote catalog and the stored data.
//!
//! Two identifiers are tracked in the store's settings: the engine's own version
//! and the version string the remote catalog reports. A change in either means
//! the stored schema or its denormalized names can no longer be trusted, and the
//! whole store is destroyed and recreated before the next import.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};
use uex_models::Readiness;
use uex_store::{Store, StoreError};

use crate::error::LoaderError;
use crate::sources::CatalogSource;

pub const PLUGIN_VERSION_KEY: &str = "plugin_version";
pub const REMOTE_VERSION_KEY: &str = "remote_version";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionStatus {
    Unchanged,
    /// The store was rebuilt because a recorded version drifted.
    Rebuilt { what: &'static str, previous: String, current: String },
}

impl VersionStatus {
    pub fn rebuilt(&self) -> bool {
        matches!(self, VersionStatus::Rebuilt { .. })
    }
}

pub struct VersionGuard {
    store: Arc<Store>,
    source: Arc<dyn CatalogSource>,
    plugin_version: String,
    /// Remote version seen by the last check, recorded once an import completes.
    observed_remote: Mutex<Option<String>>,
}

impl VersionGuard {
    pub fn new(
        store: Arc<Store>,
        source: Arc<dyn CatalogSource>,
        plugin_version: impl Into<String>,
    ) -> Self {
        Self {
            store,
            source,
            plugin_version: plugin_version.into(),
            observed_remote: Mutex::new(None),
        }
    }

    /// Compare both versions against their last-seen values.
    ///
    /// Returns `VersionParity` on drift. A remote version that cannot be fetched
    /// counts as unchanged; the next check tries again. Values never recorded
    /// are not drift.
    pub async fn verify(&self) -> Result<(), LoaderError> {
        let remote = match self.source.remote_version().await {
            Ok(version) => {
                *self.observed() = Some(version.clone());
                Some(version)
            }
            Err(e) => {
                warn!(error = %e, "Remote catalog version unavailable, assuming unchanged");
                None
            }
        };

        match self.store.setting(PLUGIN_VERSION_KEY)? {
            Some(previous) if previous != self.plugin_version => {
                return Err(LoaderError::VersionParity {
                    what: "plugin",
                    previous,
                    current: self.plugin_version.clone(),
                });
            }
            Some(_) => {}
            None => self.store.set_setting(PLUGIN_VERSION_KEY, &self.plugin_version)?,
        }

        match (self.store.setting(REMOTE_VERSION_KEY)?, remote) {
            (Some(previous), Some(current)) if previous != current => {
                Err(LoaderError::VersionParity {
                    what: "remote catalog",
                    previous,
                    current,
                })
            }
            _ => Ok(()),
        }
    }

    /// Verify parity and, on drift, mark not ready and rebuild the store.
    pub async fn check(&self, readiness: &Readiness) -> Result<VersionStatus, LoaderError> {
        match self.verify().await {
            Ok(()) => Ok(VersionStatus::Unchanged),
            Err(LoaderError::VersionParity {
                what,
                previous,
                current,
            }) => {
                info!(
                    what,
                    previous = %previous,
                    current = %current,
                    "Version changed, rebuilding store"
                );
                readiness.mark_not_ready();
                self.store.rebuild()?;
                self.store.set_setting(PLUGIN_VERSION_KEY, &self.plugin_version)?;
                Ok(VersionStatus::Rebuilt {
                    what,
                    previous,
                    current,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Persist the remote version observed by the last check. Called when an import completes.
    pub fn commit_remote_version(&self) -> Result<(), StoreError> {
        if let Some(version) = self.observed().clone() {
            self.store.set_setting(REMOTE_VERSION_KEY, &version)?;
        }
        Ok(())
    }

    pub fn plugin_version(&self) -> &str {
        &self.plugin_version
    }

    fn observed(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.observed_remote
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StaticCatalog;
    use uex_models::EntityType;
    use uex_store::Query;

    fn guard(source: Arc<StaticCatalog>, plugin: &str, store: Arc<Store>) -> VersionGuard {
        VersionGuard::new(store, source, plugin)
    }

    #[tokio::test]
    async fn first_check_records_plugin_version() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let g = guard(Arc::new(StaticCatalog::new("4.0")), "1.0.0", store.clone());
        let readiness = Readiness::new();

        assert_eq!(g.check(&readiness).await.unwrap(), VersionStatus::Unchanged);
        assert_eq!(store.setting(PLUGIN_VERSION_KEY).unwrap().as_deref(), Some("1.0.0"));
        // The remote version is only recorded once an import completes.
        assert_eq!(store.setting(REMOTE_VERSION_KEY).unwrap(), None);
        g.commit_remote_version().unwrap();
        assert_eq!(store.setting(REMOTE_VERSION_KEY).unwrap().as_deref(), Some("4.0"));
    }

    #[tokio::test]
    async fn remote_drift_rebuilds_store() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let source = Arc::new(StaticCatalog::new("4.0"));
        let g = guard(source.clone(), "1.0.0", store.clone());
        let readiness = Readiness::new();

        g.check(&readiness).await.unwrap();
        g.commit_remote_version().unwrap();
        store
            .write_batch(|tx| {
                tx.execute(
                    "INSERT INTO commodities (id, name, uex_run_id) VALUES (1, 'Gold', 1)",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        readiness.mark_ready();

        source.set_version("4.1");
        let status = g.check(&readiness).await.unwrap();
        assert!(status.rebuilt());
        assert!(!readiness.is_ready());
        assert!(store.query(&Query::new(EntityType::Commodity)).unwrap().is_empty());
        assert_eq!(store.setting(REMOTE_VERSION_KEY).unwrap(), None);
        assert_eq!(store.setting(PLUGIN_VERSION_KEY).unwrap().as_deref(), Some("1.0.0"));
    }

    #[tokio::test]
    async fn plugin_drift_is_parity_error() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        store.set_setting(PLUGIN_VERSION_KEY, "0.9.0").unwrap();
        let g = guard(Arc::new(StaticCatalog::new("4.0")), "1.0.0", store.clone());

        match g.verify().await {
            Err(LoaderError::VersionParity { what, previous, current }) => {
                assert_eq!(what, "plugin");
                assert_eq!(previous, "0.9.0");
                assert_eq!(current, "1.0.0");
            }
            other => panic!("expected parity error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_remote_is_not_drift() {
        struct Offline;

        #[async_trait::async_trait]
        impl CatalogSource for Offline {
            async fn fetch(
                &self,
                endpoint: &str,
                _params: &crate::sources::FetchParams,
            ) -> Result<Vec<serde_json::Value>, LoaderError> {
                Err(LoaderError::fetch(endpoint, "offline"))
            }

            async fn remote_version(&self) -> Result<String, LoaderError> {
                Err(LoaderError::fetch("game_versions", "offline"))
            }
        }

        let store = Arc::new(Store::open_in_memory().unwrap());
        store.set_setting(REMOTE_VERSION_KEY, "4.0").unwrap();
        let g = VersionGuard::new(store, Arc::new(Offline), "1.0.0");
        assert_eq!(g.check(&Readiness::new()).await.unwrap(), VersionStatus::Unchanged);
    }
}
