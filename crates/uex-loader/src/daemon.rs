use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing;
use uex_models::Readiness;

use crate::error::LoaderError;
use crate::importer::{ImportReport, Importer};
use crate::version::VersionGuard;

/// The import daemon. Runs a version check and an import cycle immediately,
/// then again every check interval until cancelled.
pub struct Daemon {
    importer: Arc<Importer>,
    guard: Arc<VersionGuard>,
    readiness: Arc<Readiness>,
    interval: Duration,
    cancel: CancellationToken,
}

impl Daemon {
    pub fn new(
        importer: Arc<Importer>,
        guard: Arc<VersionGuard>,
        readiness: Arc<Readiness>,
        interval: Duration,
    ) -> Self {
        Self {
            importer,
            guard,
            readiness,
            interval,
            cancel: CancellationToken::new(),
        }
    }

    /// Returns a CancellationToken that can be used to trigger shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the daemon until cancelled.
    pub async fn run(&self) -> Result<(), LoaderError> {
        tracing::info!(interval_secs = self.interval.as_secs(), "Import daemon starting");

        // Run immediately on startup
        self.tick().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("Import daemon shutting down");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {
                    self.tick().await;
                }
            }
        }

        tracing::info!("Import daemon stopped");
        Ok(())
    }

    /// One scheduled check: version parity first, then an import cycle that is
    /// forced when the store was just rebuilt.
    pub async fn tick(&self) -> Option<ImportReport> {
        let force_check = match self.guard.check(&self.readiness).await {
            Ok(status) => status.rebuilt(),
            Err(e) => {
                tracing::error!(error = %e, "Version check failed");
                false
            }
        };

        match self.importer.run_cycle(force_check).await {
            Ok(report) => {
                let failed = report.failed().count();
                if failed > 0 {
                    tracing::warn!(failed, "Import cycle left entities stale");
                }
                Some(report)
            }
            Err(e) => {
                tracing::error!(error = %e, "Import cycle failed");
                None
            }
        }
    }
}
