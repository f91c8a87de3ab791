use std::sync::Arc;

use tracing::{error, info};
use uex_models::Readiness;

use crate::blacklist::BlacklistReconciler;
use crate::importer::ImportListener;
use crate::version::VersionGuard;

/// Bookkeeping after every import cycle: restore user flags from the blacklist
/// files, record the remote catalog version and flip readiness.
pub struct ImportCompletion {
    reconciler: BlacklistReconciler,
    guard: Arc<VersionGuard>,
    readiness: Arc<Readiness>,
}

impl ImportCompletion {
    pub fn new(
        reconciler: BlacklistReconciler,
        guard: Arc<VersionGuard>,
        readiness: Arc<Readiness>,
    ) -> Self {
        Self {
            reconciler,
            guard,
            readiness,
        }
    }

    pub fn readiness(&self) -> &Arc<Readiness> {
        &self.readiness
    }

    /// Run the completion steps. Returns true when a caller was turned away while
    /// loading and should now be told the tools are available.
    pub fn complete(&self, total_rows: usize) -> bool {
        self.reconciler.reconcile_all();
        if let Err(e) = self.guard.commit_remote_version() {
            error!(error = %e, "Failed to record remote catalog version");
        }
        let notify = self.readiness.mark_ready();
        info!(total_rows, notify, "Import completed, tools ready");
        notify
    }
}

impl ImportListener for ImportCompletion {
    fn on_progress(&self, percent: u8) {
        if !self.readiness.is_ready() {
            self.readiness.set_progress(percent);
        }
    }

    fn on_import_completed(&self, total_rows: usize) {
        self.complete(total_rows);
    }
}
