use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{error, info, warn};
use uex_models::Readiness;
use uex_store::Catalog;
use uuid::Uuid;

use crate::error::ToolError;
use crate::optimizer::RouteOptimizer;
use crate::tools::{self, ToolKind};
use crate::validator::{ValidationFailure, Validators};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Ok,
    /// The store is still importing; nothing was executed.
    Loading,
    /// One or more parameters were rejected; nothing was executed.
    Invalid,
    Error,
}

/// The result of one tool call, in the shape handed back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResponse {
    pub call_id: Uuid,
    pub tool: String,
    pub status: CallStatus,
    pub response: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instant_response: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    /// The underlying error of a failed call, kept for diagnostics.
    #[serde(skip)]
    pub diagnostic: Option<String>,
}

/// Validates arguments and runs tools, answering "still loading" until the
/// first import has completed.
pub struct ToolDispatcher {
    validators: Arc<Validators>,
    optimizer: Arc<RouteOptimizer>,
    catalog: Arc<Catalog>,
    readiness: Arc<Readiness>,
}

impl ToolDispatcher {
    pub fn new(
        validators: Arc<Validators>,
        optimizer: Arc<RouteOptimizer>,
        catalog: Arc<Catalog>,
        readiness: Arc<Readiness>,
    ) -> Self {
        Self {
            validators,
            optimizer,
            catalog,
            readiness,
        }
    }

    pub fn readiness(&self) -> &Arc<Readiness> {
        &self.readiness
    }

    /// One descriptor per tool: name, description and parameter schema.
    pub async fn descriptors(&self) -> Result<Vec<Value>, ToolError> {
        let mut descriptors = Vec::with_capacity(ToolKind::ALL.len());
        for tool in ToolKind::ALL {
            let mut properties = Map::new();
            let mut required = Vec::new();
            for param in tool.parameters() {
                let candidates = if param.validator.kind.is_enumerable() {
                    Some(self.validators.candidates(&param.validator.kind).await?)
                } else {
                    None
                };
                let mut schema = param
                    .validator
                    .descriptor(candidates.as_deref().map(Vec::as_slice));
                schema["description"] = Value::String(param.description.to_string());
                properties.insert(param.name.to_string(), schema);
                if param.required {
                    required.push(param.name);
                }
            }
            descriptors.push(json!({
                "name": tool.name(),
                "description": tool.description(),
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                },
            }));
        }
        Ok(descriptors)
    }

    /// Run a tool call end to end. Never fails: every outcome is a response.
    pub async fn call(&self, tool_name: &str, args: &Value) -> ToolResponse {
        let call_id = Uuid::new_v4();
        let respond = |status: CallStatus,
                       response: Value,
                       instant_response: Option<String>,
                       notes: Vec<String>,
                       diagnostic: Option<String>| ToolResponse {
            call_id,
            tool: tool_name.to_string(),
            status,
            response,
            instant_response,
            notes,
            diagnostic,
        };

        let Some(tool) = ToolKind::from_name(tool_name) else {
            let e = ToolError::UnknownTool(tool_name.to_string());
            warn!(%call_id, tool = tool_name, "Unknown tool");
            return respond(
                CallStatus::Error,
                Value::String(e.to_string()),
                None,
                Vec::new(),
                Some(e.to_string()),
            );
        };

        if !self.readiness.is_ready() {
            self.readiness.note_pending_request();
            let e = ToolError::NotReady {
                percent: self.readiness.progress(),
            };
            info!(%call_id, tool = tool_name, "Tool called while loading");
            let text = e.to_string();
            return respond(
                CallStatus::Loading,
                Value::String(text.clone()),
                Some(text),
                Vec::new(),
                None,
            );
        }

        info!(%call_id, tool = tool_name, "Tool call");
        let (validated, mut notes) = match self.validate(tool, args).await {
            Ok(validated) => validated,
            Err(ToolError::Validation(failures)) => return invalid(respond, failures),
            Err(e) => return self.failed(call_id, tool, e, respond),
        };

        match self.execute(tool, validated).await {
            Ok(output) => {
                notes.extend(output.notes);
                respond(
                    CallStatus::Ok,
                    output.response,
                    output.instant_response,
                    notes,
                    None,
                )
            }
            Err(ToolError::Validation(failures)) => invalid(respond, failures),
            Err(e) => self.failed(call_id, tool, e, respond),
        }
    }

    /// Validate every parameter, collecting all failures before giving up.
    pub async fn validate(
        &self,
        tool: ToolKind,
        args: &Value,
    ) -> Result<(Map<String, Value>, Vec<String>), ToolError> {
        let empty = Map::new();
        let args = match args {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => {
                return Err(ToolError::Validation(vec![ValidationFailure::new(
                    "arguments",
                    "expected a JSON object.",
                )]))
            }
        };

        let params = tool.parameters();
        let mut failures = Vec::new();
        let mut validated = Map::new();
        let mut notes = Vec::new();

        for key in args.keys() {
            if !params.iter().any(|p| p.name == key.as_str()) {
                failures.push(ValidationFailure {
                    parameter: key.clone(),
                    message: "is not a parameter of this tool.".to_string(),
                    suggestions: params.iter().map(|p| p.name.to_string()).collect(),
                });
            }
        }

        for param in &params {
            let raw = match args.get(param.name) {
                None | Some(Value::Null) => {
                    if param.required {
                        failures.push(ValidationFailure::new(param.name, "is required."));
                    }
                    continue;
                }
                Some(raw) => raw,
            };
            match self.validators.validate(param.name, &param.validator, raw).await {
                Ok(v) => {
                    validated.insert(param.name.to_string(), v.value);
                    notes.extend(v.notes);
                }
                Err(ToolError::Validation(mut f)) => failures.append(&mut f),
                Err(e) => return Err(e),
            }
        }

        if failures.is_empty() {
            Ok((validated, notes))
        } else {
            Err(ToolError::Validation(failures))
        }
    }

    /// Run a tool body on the blocking pool; store reads hold a lock and do I/O.
    async fn execute(
        &self,
        tool: ToolKind,
        validated: Map<String, Value>,
    ) -> Result<tools::ToolOutput, ToolError> {
        let catalog = self.catalog.clone();
        let optimizer = self.optimizer.clone();
        tokio::task::spawn_blocking(move || tools::execute(tool, &catalog, &optimizer, validated))
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?
    }

    fn failed<F>(&self, call_id: Uuid, tool: ToolKind, e: ToolError, respond: F) -> ToolResponse
    where
        F: Fn(CallStatus, Value, Option<String>, Vec<String>, Option<String>) -> ToolResponse,
    {
        error!(%call_id, tool = tool.name(), error = %e, "Tool call failed");
        let text = format!(
            "Something went wrong while running {}. Please try again later.",
            tool.name()
        );
        respond(
            CallStatus::Error,
            Value::String(text.clone()),
            Some(text),
            Vec::new(),
            Some(e.to_string()),
        )
    }
}

fn invalid<F>(respond: F, failures: Vec<ValidationFailure>) -> ToolResponse
where
    F: Fn(CallStatus, Value, Option<String>, Vec<String>, Option<String>) -> ToolResponse,
{
    let text = failures
        .iter()
        .map(ValidationFailure::describe)
        .collect::<Vec<_>>()
        .join("\n");
    respond(
        CallStatus::Invalid,
        json!({ "errors": failures }),
        Some(text),
        Vec::new(),
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::SimilarityMatcher;
    use crate::test_support::seeded_catalog;
    use uex_models::{RouteConfig, ValidationConfig};

    async fn dispatcher(ready: bool) -> ToolDispatcher {
        let catalog = seeded_catalog().await;
        let validators = Arc::new(Validators::new(
            catalog.clone(),
            Arc::new(SimilarityMatcher::new(0.75)),
            ValidationConfig::default(),
        ));
        let optimizer = Arc::new(RouteOptimizer::new(catalog.clone(), RouteConfig::default()));
        let readiness = Arc::new(Readiness::new());
        if ready {
            readiness.mark_ready();
        }
        ToolDispatcher::new(validators, optimizer, catalog, readiness)
    }

    #[tokio::test]
    async fn loading_response_marks_pending_request() {
        let d = dispatcher(false).await;
        d.readiness().set_progress(40);

        let response = d.call("find_trade_routes", &json!({})).await;
        assert_eq!(response.status, CallStatus::Loading);
        assert!(response.instant_response.unwrap().contains("40%"));
        assert!(d.readiness().has_pending_request());
        assert!(d.readiness().mark_ready());
    }

    #[tokio::test]
    async fn every_invalid_parameter_is_reported() {
        let d = dispatcher(true).await;
        let response = d
            .call(
                "find_commodity_prices",
                &json!({ "star_system": "Sol", "limit": -3, "colour": "red" }),
            )
            .await;
        assert_eq!(response.status, CallStatus::Invalid);

        let mut params: Vec<String> = response.response["errors"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["parameter"].as_str().unwrap().to_string())
            .collect();
        params.sort();
        assert_eq!(params, vec!["colour", "commodity", "limit", "star_system"]);
    }

    #[tokio::test]
    async fn valid_call_carries_interpretation_notes() {
        let d = dispatcher(true).await;
        let response = d
            .call("find_trade_routes", &json!({ "ship": "caterpillar", "limit": 2 }))
            .await;
        assert_eq!(response.status, CallStatus::Ok);
        assert_eq!(response.response["routes"].as_array().unwrap().len(), 2);
        assert!(response.notes.iter().any(|n| n.contains("Drake Caterpillar")));
        assert!(response.instant_response.unwrap().starts_with("Best route: Laranite"));
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error_response() {
        let d = dispatcher(true).await;
        let response = d.call("find_pirates", &json!({})).await;
        assert_eq!(response.status, CallStatus::Error);
        assert!(response.diagnostic.unwrap().contains("find_pirates"));
    }

    #[tokio::test]
    async fn store_failures_become_generic_text() {
        let d = dispatcher(true).await;
        d.catalog.store().rebuild().unwrap();
        d.catalog
            .store()
            .write_batch(|tx| {
                tx.execute("DROP TABLE commodities_routes", [])?;
                Ok(())
            })
            .unwrap();

        let response = d.call("find_trade_routes", &json!({ "cargo_space": 10 })).await;
        assert_eq!(response.status, CallStatus::Error);
        assert!(response.instant_response.unwrap().starts_with("Something went wrong"));
        assert!(response.diagnostic.is_some());
    }

    #[tokio::test]
    async fn descriptors_embed_enumerable_candidates() {
        let d = dispatcher(true).await;
        let descriptors = d.descriptors().await.unwrap();
        assert_eq!(descriptors.len(), 4);

        let routes = &descriptors[0];
        assert_eq!(routes["name"], "find_trade_routes");
        let systems = &routes["parameters"]["properties"]["star_systems"];
        assert_eq!(systems["type"], "array");
        assert_eq!(systems["items"]["enum"], json!(["Pyro", "Stanton"]));

        let prices = &descriptors[1];
        assert_eq!(prices["parameters"]["required"], json!(["commodity"]));
        assert_eq!(prices["parameters"]["properties"]["mode"]["enum"], json!(["buy", "sell"]));
    }
}
