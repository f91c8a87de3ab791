use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use uex_models::ApiConfig;

use super::{CatalogSource, FetchParams};
use crate::error::LoaderError;

/// Endpoint reporting the catalog's game versions.
const VERSION_ENDPOINT: &str = "game_versions";

/// Response wrapper every catalog endpoint answers with.
#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Value,
}

/// HTTP client for the remote catalog API.
pub struct HttpCatalog {
    http: Client,
    base_url: String,
    secret: Option<String>,
}

impl HttpCatalog {
    /// Build a client from config, reading the bearer secret from the configured env var.
    pub fn from_config(config: &ApiConfig) -> Result<Self, LoaderError> {
        let secret = std::env::var(&config.secret_env)
            .ok()
            .filter(|s| !s.trim().is_empty());
        if secret.is_none() {
            warn!(
                env = %config.secret_env,
                "No catalog API secret set, requests will be anonymous"
            );
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| LoaderError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret,
        })
    }

    async fn get(&self, endpoint: &str, params: &FetchParams) -> Result<Value, LoaderError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!(url = %url, ?params, "Fetching catalog endpoint");

        let mut request = self.http.get(&url).query(params);
        if let Some(secret) = &self.secret {
            request = request.bearer_auth(secret);
        }

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| LoaderError::fetch(endpoint, e.to_string()))?;
        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| LoaderError::fetch(endpoint, format!("invalid response body: {e}")))?;

        unpack(endpoint, envelope)
    }
}

fn unpack(endpoint: &str, envelope: Envelope) -> Result<Value, LoaderError> {
    if envelope.status != "ok" {
        return Err(LoaderError::fetch(
            endpoint,
            envelope
                .message
                .unwrap_or_else(|| format!("status {}", envelope.status)),
        ));
    }
    Ok(envelope.data)
}

/// An empty batch sweeps the whole table, so missing data is a failed fetch.
fn into_records(endpoint: &str, data: Value) -> Result<Vec<Value>, LoaderError> {
    match data {
        Value::Array(records) => Ok(records),
        Value::Null => Err(LoaderError::fetch(endpoint, "response carries no data")),
        other => Ok(vec![other]),
    }
}

fn live_version(endpoint: &str, data: &Value) -> Result<String, LoaderError> {
    match data.get("live") {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(LoaderError::fetch(endpoint, "response carries no live version")),
    }
}

#[async_trait]
impl CatalogSource for HttpCatalog {
    async fn fetch(&self, endpoint: &str, params: &FetchParams) -> Result<Vec<Value>, LoaderError> {
        into_records(endpoint, self.get(endpoint, params).await?)
    }

    async fn remote_version(&self) -> Result<String, LoaderError> {
        let data = self.get(VERSION_ENDPOINT, &FetchParams::new()).await?;
        live_version(VERSION_ENDPOINT, &data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(value: Value) -> Envelope {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn ok_envelope_yields_records() {
        let data = unpack(
            "commodities",
            envelope(json!({"status": "ok", "data": [{"id": 1}, {"id": 2}]})),
        )
        .unwrap();
        assert_eq!(into_records("commodities", data).unwrap().len(), 2);
    }

    #[test]
    fn error_status_is_fetch_error() {
        let result = unpack(
            "commodities",
            envelope(json!({"status": "missing_api_key", "message": "no key"})),
        );
        match result {
            Err(LoaderError::Fetch { endpoint, message }) => {
                assert_eq!(endpoint, "commodities");
                assert_eq!(message, "no key");
            }
            other => panic!("expected fetch error, got {other:?}"),
        }
    }

    #[test]
    fn single_object_and_missing_data() {
        assert_eq!(into_records("terminals", json!({"id": 1})).unwrap().len(), 1);
        assert!(into_records("terminals", json!([])).unwrap().is_empty());

        let data = unpack("terminals", envelope(json!({"status": "ok", "data": null}))).unwrap();
        match into_records("terminals", data) {
            Err(LoaderError::Fetch { endpoint, .. }) => assert_eq!(endpoint, "terminals"),
            other => panic!("expected fetch error, got {other:?}"),
        }
    }

    #[test]
    fn live_version_parsing() {
        assert_eq!(
            live_version(VERSION_ENDPOINT, &json!({"live": "4.0.2", "ptu": "4.1"})).unwrap(),
            "4.0.2"
        );
        assert!(live_version(VERSION_ENDPOINT, &json!({"ptu": "4.1"})).is_err());
    }

    #[test]
    fn from_config_trims_base_url() {
        let config = ApiConfig {
            base_url: "http://localhost:9999/2.0/".to_string(),
            secret_env: "UEX_TEST_SECRET_THAT_IS_NOT_SET".to_string(),
            ..Default::default()
        };
        let catalog = HttpCatalog::from_config(&config).unwrap();
        assert_eq!(catalog.base_url, "http://localhost:9999/2.0");
        assert!(catalog.secret.is_none());
    }
}
