pub mod blacklist;
pub mod completion;
pub mod daemon;
pub mod error;
pub mod importer;
pub mod sources;
pub mod version;
pub mod writer;

pub mod test_support;

pub use blacklist::{BlacklistKind, BlacklistReconciler, ReconcileOutcome};
pub use completion::ImportCompletion;
pub use daemon::Daemon;
pub use error::LoaderError;
pub use importer::{import_order, EntityOutcome, ImportListener, ImportReport, Importer};
pub use sources::{CatalogSource, FetchParams, HttpCatalog};
pub use version::{VersionGuard, VersionStatus};
