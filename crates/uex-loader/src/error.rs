use thiserror::Error;
use uex_store::StoreError;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The remote catalog could not be reached or answered with an error.
    #[error("Fetch error for {endpoint}: {message}")]
    Fetch { endpoint: String, message: String },

    /// A recorded version no longer matches; the store must be rebuilt.
    #[error("Version drift in {what}: {previous} -> {current}")]
    VersionParity {
        what: &'static str,
        previous: String,
        current: String,
    },

    #[error("Blacklist error: {0}")]
    Blacklist(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoaderError {
    pub fn fetch(endpoint: &str, message: impl Into<String>) -> Self {
        LoaderError::Fetch {
            endpoint: endpoint.to_string(),
            message: message.into(),
        }
    }
}
