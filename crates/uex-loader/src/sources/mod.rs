pub mod http;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::LoaderError;

/// Request parameters for one fetch, e.g. `[("id_commodity", "7")]`.
pub type FetchParams = Vec<(String, String)>;

/// Remote catalog the importer pulls entity records from. Mockable for testing.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch every record an endpoint serves for the given parameters.
    async fn fetch(&self, endpoint: &str, params: &FetchParams) -> Result<Vec<Value>, LoaderError>;

    /// Version string the remote catalog currently reports.
    async fn remote_version(&self) -> Result<String, LoaderError>;
}

pub use http::HttpCatalog;
