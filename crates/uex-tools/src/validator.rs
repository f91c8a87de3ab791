//! Fuzzy parameter validation.
//!
//! Identity-like kinds resolve free text against the live candidate set in the
//! store through a [`ClosestMatch`] implementation. Candidate lists are memoized
//! in the catalog's name cache, keyed by kind and filter.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::debug;
use uex_models::records::VEHICLE_ROLES;
use uex_models::ValidationConfig;
use uex_store::{Catalog, CommodityFilter, CompanyFilter, ItemFilter, VehicleFilter, VehicleKind};

use crate::error::ToolError;
use crate::matcher::ClosestMatch;

/// Comparison operators accepted in an item-attribute filter.
pub const ATTRIBUTE_OPERATORS: [&str; 7] = ["=", "!=", "<", "<=", ">", ">=", "contains"];

#[derive(Debug, Clone, PartialEq)]
pub enum ValidatorKind {
    Number {
        min: Option<f64>,
        max: Option<f64>,
        integer: bool,
    },
    Boolean,
    FreeString,
    /// A spaceship, by short or full name.
    Ship,
    /// Any vehicle, ground vehicles included.
    Vehicle,
    VehicleRole,
    StarSystem {
        available_only: bool,
    },
    Commodity(CommodityFilter),
    /// Anything a terminal can sit in, terminals included.
    Location,
    Company(CompanyFilter),
    Category,
    Item,
    /// `{ "attribute": .., "operator": .., "value": .. }` with a fuzzy attribute name.
    ItemAttributeFilter,
    Enum(Vec<String>),
}

impl ValidatorKind {
    /// Human label used in failure messages.
    pub fn label(&self) -> &'static str {
        match self {
            ValidatorKind::Number { .. } => "number",
            ValidatorKind::Boolean => "boolean",
            ValidatorKind::FreeString => "text",
            ValidatorKind::Ship => "ship",
            ValidatorKind::Vehicle => "vehicle",
            ValidatorKind::VehicleRole => "vehicle role",
            ValidatorKind::StarSystem { .. } => "star system",
            ValidatorKind::Commodity(_) => "commodity",
            ValidatorKind::Location => "location",
            ValidatorKind::Company(_) => "company",
            ValidatorKind::Category => "category",
            ValidatorKind::Item => "item",
            ValidatorKind::ItemAttributeFilter => "item attribute",
            ValidatorKind::Enum(_) => "option",
        }
    }

    /// Whether values of this kind are resolved against a candidate list.
    pub fn is_matched(&self) -> bool {
        !matches!(
            self,
            ValidatorKind::Number { .. } | ValidatorKind::Boolean | ValidatorKind::FreeString
        )
    }

    /// Whether the descriptor embeds the candidate list as an `enum`.
    pub fn is_enumerable(&self) -> bool {
        matches!(
            self,
            ValidatorKind::VehicleRole
                | ValidatorKind::Enum(_)
                | ValidatorKind::StarSystem { .. }
                | ValidatorKind::Category
        )
    }

    /// JSON-schema-like shape of a single value of this kind. `candidates` is
    /// embedded as an `enum` for enumerable kinds.
    pub fn descriptor(&self, candidates: Option<&[String]>) -> Value {
        let mut schema = match self {
            ValidatorKind::Number { min, max, integer } => {
                let mut s = json!({ "type": if *integer { "integer" } else { "number" } });
                if let Some(min) = min {
                    s["minimum"] = json!(min);
                }
                if let Some(max) = max {
                    s["maximum"] = json!(max);
                }
                s
            }
            ValidatorKind::Boolean => json!({ "type": "boolean" }),
            ValidatorKind::ItemAttributeFilter => json!({
                "type": "object",
                "properties": {
                    "attribute": { "type": "string" },
                    "operator": { "type": "string", "enum": ATTRIBUTE_OPERATORS },
                    "value": { "type": "string" },
                },
                "required": ["attribute", "value"],
            }),
            _ => json!({ "type": "string" }),
        };
        if self.is_enumerable() {
            if let Some(candidates) = candidates {
                schema["enum"] = json!(candidates);
            }
        }
        schema
    }

    fn cache_key(&self) -> String {
        format!("validator:{self:?}")
    }

    /// Load this kind's candidate display names from the catalog.
    fn load_candidates(&self, catalog: &Catalog) -> Result<Vec<String>, uex_store::StoreError> {
        Ok(match self {
            ValidatorKind::Number { .. } | ValidatorKind::Boolean | ValidatorKind::FreeString => {
                Vec::new()
            }
            ValidatorKind::Ship => vehicle_names(catalog, VehicleKind::Spaceship)?,
            ValidatorKind::Vehicle => vehicle_names(catalog, VehicleKind::Any)?,
            ValidatorKind::VehicleRole => VEHICLE_ROLES.iter().map(|r| r.to_string()).collect(),
            ValidatorKind::StarSystem { available_only } => catalog
                .star_systems(*available_only)?
                .into_iter()
                .map(|s| s.name)
                .collect(),
            ValidatorKind::Commodity(filter) => catalog
                .commodities(filter)?
                .into_iter()
                .map(|c| c.name)
                .collect(),
            ValidatorKind::Location => catalog.location_names()?,
            ValidatorKind::Company(filter) => catalog
                .companies(filter)?
                .into_iter()
                .map(|c| c.name)
                .collect(),
            ValidatorKind::Category => catalog.categories()?.into_iter().map(|c| c.name).collect(),
            ValidatorKind::Item => catalog
                .items(&ItemFilter::default())?
                .into_iter()
                .map(|i| i.name)
                .collect(),
            ValidatorKind::ItemAttributeFilter => catalog.item_attribute_names()?,
            ValidatorKind::Enum(values) => values.clone(),
        })
    }
}

fn vehicle_names(
    catalog: &Catalog,
    kind: VehicleKind,
) -> Result<Vec<String>, uex_store::StoreError> {
    let filter = VehicleFilter {
        kind,
        ..VehicleFilter::default()
    };
    // Rows come back ordered by short name; display names can repeat out of order.
    let names: BTreeSet<String> = catalog
        .vehicles(&filter)?
        .iter()
        .map(|v| v.display_name().to_string())
        .collect();
    Ok(names.into_iter().collect())
}

/// A validator instance: a kind, optionally applied element-wise to a list.
#[derive(Debug, Clone, PartialEq)]
pub struct Validator {
    pub kind: ValidatorKind,
    pub multiple: bool,
}

impl Validator {
    pub fn new(kind: ValidatorKind) -> Self {
        Self {
            kind,
            multiple: false,
        }
    }

    pub fn multiple(kind: ValidatorKind) -> Self {
        Self {
            kind,
            multiple: true,
        }
    }

    pub fn descriptor(&self, candidates: Option<&[String]>) -> Value {
        let item = self.kind.descriptor(candidates);
        if self.multiple {
            json!({ "type": "array", "items": item })
        } else {
            item
        }
    }
}

/// A canonical value plus advisory notes about how it was interpreted.
#[derive(Debug, Clone, PartialEq)]
pub struct Validated {
    pub value: Value,
    pub notes: Vec<String>,
}

/// One rejected parameter, with text the caller can act on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationFailure {
    pub parameter: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl ValidationFailure {
    pub fn new(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            message: message.into(),
            suggestions: Vec::new(),
        }
    }

    /// One line of user-facing text.
    pub fn describe(&self) -> String {
        if self.suggestions.is_empty() {
            format!("{}: {}", self.parameter, self.message)
        } else {
            format!(
                "{}: {} Did you mean one of: {}?",
                self.parameter,
                self.message,
                self.suggestions.join(", ")
            )
        }
    }
}

/// Why a single value was rejected, before it is tied to a parameter name.
#[derive(Debug, Clone, PartialEq)]
struct Rejection {
    message: String,
    suggestions: Vec<String>,
}

impl Rejection {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestions: Vec::new(),
        }
    }
}

pub struct Validators {
    catalog: Arc<Catalog>,
    matcher: Arc<dyn ClosestMatch>,
    config: ValidationConfig,
}

impl Validators {
    pub fn new(
        catalog: Arc<Catalog>,
        matcher: Arc<dyn ClosestMatch>,
        config: ValidationConfig,
    ) -> Self {
        Self {
            catalog,
            matcher,
            config,
        }
    }

    /// Candidate display names for `kind`, memoized until the next import.
    pub async fn candidates(&self, kind: &ValidatorKind) -> Result<Arc<Vec<String>>, ToolError> {
        if !kind.is_matched() {
            return Ok(Arc::new(Vec::new()));
        }
        let names = self
            .catalog
            .cached_names(&kind.cache_key(), |catalog| kind.load_candidates(catalog))
            .await?;
        Ok(names)
    }

    /// Validate `raw` for `parameter`.
    ///
    /// A rejected value comes back as `ToolError::Validation` naming the
    /// parameter; store failures propagate unchanged.
    pub async fn validate(
        &self,
        parameter: &str,
        validator: &Validator,
        raw: &Value,
    ) -> Result<Validated, ToolError> {
        let candidates = self.candidates(&validator.kind).await?;
        let reject = |r: Rejection| {
            ToolError::Validation(vec![ValidationFailure {
                parameter: parameter.to_string(),
                message: r.message,
                suggestions: r.suggestions,
            }])
        };

        if !validator.multiple {
            let (value, notes) = self
                .validate_one(&validator.kind, raw, &candidates)
                .await
                .map_err(reject)?;
            return Ok(Validated { value, notes });
        }

        let elements = match raw {
            Value::Array(elements) => elements.as_slice(),
            other => std::slice::from_ref(other),
        };
        let mut values = Vec::with_capacity(elements.len());
        let mut notes = Vec::new();
        for (index, element) in elements.iter().enumerate() {
            match self.validate_one(&validator.kind, element, &candidates).await {
                Ok((value, mut n)) => {
                    values.push(value);
                    notes.append(&mut n);
                }
                Err(r) => {
                    return Err(reject(Rejection {
                        message: format!("element {}: {}", index + 1, r.message),
                        suggestions: r.suggestions,
                    }))
                }
            }
        }
        Ok(Validated {
            value: Value::Array(values),
            notes,
        })
    }

    async fn validate_one(
        &self,
        kind: &ValidatorKind,
        raw: &Value,
        candidates: &[String],
    ) -> Result<(Value, Vec<String>), Rejection> {
        match kind {
            ValidatorKind::Number { min, max, integer } => {
                number(raw, *min, *max, *integer).map(|v| (v, Vec::new()))
            }
            ValidatorKind::Boolean => boolean(raw).map(|b| (Value::Bool(b), Vec::new())),
            ValidatorKind::FreeString => match raw.as_str().map(str::trim) {
                Some(s) if !s.is_empty() => Ok((Value::String(s.to_string()), Vec::new())),
                _ => Err(Rejection::new("expected non-empty text.")),
            },
            ValidatorKind::ItemAttributeFilter => self.attribute_filter(raw, candidates).await,
            _ => {
                let input = raw
                    .as_str()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| Rejection::new(format!("expected a {} name.", kind.label())))?;
                let (name, notes) = self.resolve(kind.label(), input, candidates).await?;
                Ok((Value::String(name), notes))
            }
        }
    }

    /// Fuzzy-resolve `input` to one of `candidates`.
    async fn resolve(
        &self,
        label: &str,
        input: &str,
        candidates: &[String],
    ) -> Result<(String, Vec<String>), Rejection> {
        if candidates.is_empty() {
            return Err(Rejection::new(format!("no {label} data is available yet.")));
        }
        let result = self.matcher.find_closest(input, candidates).await;
        match result.best {
            Some(best) => {
                debug!(label, input, matched = %best, "Resolved parameter");
                let notes = if best == input {
                    Vec::new()
                } else {
                    vec![format!("Interpreted '{input}' as {label} '{best}'.")]
                };
                Ok((best, notes))
            }
            None => Err(Rejection {
                message: format!("'{input}' is not a known {label}."),
                suggestions: result
                    .alternatives
                    .into_iter()
                    .take(self.config.max_suggestions)
                    .collect(),
            }),
        }
    }

    async fn attribute_filter(
        &self,
        raw: &Value,
        candidates: &[String],
    ) -> Result<(Value, Vec<String>), Rejection> {
        let object = raw.as_object().ok_or_else(|| {
            Rejection::new("expected an object with 'attribute', 'operator' and 'value'.")
        })?;
        let attribute = object
            .get("attribute")
            .and_then(Value::as_str)
            .ok_or_else(|| Rejection::new("missing 'attribute'."))?;
        let operator = object
            .get("operator")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or("=");
        if !ATTRIBUTE_OPERATORS.contains(&operator) {
            return Err(Rejection {
                message: format!("'{operator}' is not a supported operator."),
                suggestions: ATTRIBUTE_OPERATORS.iter().map(|o| o.to_string()).collect(),
            });
        }
        let value = match object.get("value") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(Rejection::new("missing 'value'.")),
        };

        let (attribute, notes) = self.resolve("item attribute", attribute, candidates).await?;
        let mut filter = Map::new();
        filter.insert("attribute".into(), Value::String(attribute));
        filter.insert("operator".into(), Value::String(operator.to_string()));
        filter.insert("value".into(), Value::String(value));
        Ok((Value::Object(filter), notes))
    }
}

fn number(
    raw: &Value,
    min: Option<f64>,
    max: Option<f64>,
    integer: bool,
) -> Result<Value, Rejection> {
    let n = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
    .ok_or_else(|| Rejection::new("expected a number."))?;

    if integer && n.fract() != 0.0 {
        return Err(Rejection::new(format!("expected a whole number, got {n}.")));
    }
    if let Some(min) = min.filter(|min| n < *min) {
        return Err(Rejection::new(format!("must be at least {min}.")));
    }
    if let Some(max) = max.filter(|max| n > *max) {
        return Err(Rejection::new(format!("must be at most {max}.")));
    }
    Ok(if integer { json!(n as i64) } else { json!(n) })
}

fn boolean(raw: &Value) -> Result<bool, Rejection> {
    match raw {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) if n.as_i64() == Some(1) => Ok(true),
        Value::Number(n) if n.as_i64() == Some(0) => Ok(false),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            _ => Err(Rejection::new("expected true or false.")),
        },
        _ => Err(Rejection::new("expected true or false.")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::SimilarityMatcher;
    use crate::test_support::{seeded_catalog, ScriptedMatcher};

    async fn validators() -> Validators {
        Validators::new(
            seeded_catalog().await,
            Arc::new(SimilarityMatcher::new(0.75)),
            ValidationConfig::default(),
        )
    }

    fn failures(err: ToolError) -> Vec<ValidationFailure> {
        match err {
            ToolError::Validation(f) => f,
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn commodity_typo_resolves_with_note() {
        let v = validators().await;
        let validated = v
            .validate(
                "commodity",
                &Validator::new(ValidatorKind::Commodity(CommodityFilter::default())),
                &json!("agricum"),
            )
            .await
            .unwrap();
        assert_eq!(validated.value, json!("Agricium"));
        assert_eq!(validated.notes.len(), 1);
    }

    #[tokio::test]
    async fn exact_match_has_no_note() {
        let v = validators().await;
        let validated = v
            .validate(
                "system",
                &Validator::new(ValidatorKind::StarSystem { available_only: true }),
                &json!("Pyro"),
            )
            .await
            .unwrap();
        assert_eq!(validated.value, json!("Pyro"));
        assert!(validated.notes.is_empty());
    }

    #[tokio::test]
    async fn filtered_candidates_reject_excluded_names() {
        let v = validators().await;
        let filter = CommodityFilter {
            buyable_and_sellable: true,
            ..CommodityFilter::default()
        };
        let err = v
            .validate(
                "commodity",
                &Validator::new(ValidatorKind::Commodity(filter)),
                &json!("Waste"),
            )
            .await
            .unwrap_err();
        let failures = failures(err);
        assert_eq!(failures[0].parameter, "commodity");
        assert!(!failures[0].suggestions.contains(&"Waste".to_string()));
    }

    #[tokio::test]
    async fn unknown_name_carries_suggestions() {
        let v = validators().await;
        let err = v
            .validate(
                "system",
                &Validator::new(ValidatorKind::StarSystem { available_only: false }),
                &json!("Sol"),
            )
            .await
            .unwrap_err();
        let failure = &failures(err)[0];
        let mut suggestions = failure.suggestions.clone();
        suggestions.sort();
        assert_eq!(suggestions, vec!["Nyx", "Pyro", "Stanton"]);
        assert!(failure.describe().contains("Did you mean"));
    }

    #[tokio::test]
    async fn multiple_mode_fails_whole_list() {
        let v = validators().await;
        let validator = Validator::multiple(ValidatorKind::Commodity(CommodityFilter::default()));

        let ok = v.validate("c", &validator, &json!(["gold", "Laranite"])).await.unwrap();
        assert_eq!(ok.value, json!(["Gold", "Laranite"]));

        let err = v
            .validate("c", &validator, &json!(["gold", "unobtainium"]))
            .await
            .unwrap_err();
        let failures = failures(err);
        assert_eq!(failures.len(), 1);
        assert!(failures[0].message.starts_with("element 2"));
    }

    #[tokio::test]
    async fn numbers_and_booleans() {
        let v = validators().await;
        let budget = Validator::new(ValidatorKind::Number {
            min: Some(0.0),
            max: None,
            integer: true,
        });
        assert_eq!(v.validate("b", &budget, &json!("12,000")).await.unwrap().value, json!(12000));
        assert!(v.validate("b", &budget, &json!(-1)).await.is_err());
        assert!(v.validate("b", &budget, &json!(1.5)).await.is_err());

        let flag = Validator::new(ValidatorKind::Boolean);
        assert_eq!(v.validate("f", &flag, &json!("yes")).await.unwrap().value, json!(true));
        assert!(v.validate("f", &flag, &json!("perhaps")).await.is_err());
    }

    #[tokio::test]
    async fn attribute_filter_resolves_name_and_defaults_operator() {
        let v = validators().await;
        let validated = v
            .validate(
                "filters",
                &Validator::new(ValidatorKind::ItemAttributeFilter),
                &json!({ "attribute": "grade", "value": "A" }),
            )
            .await
            .unwrap();
        assert_eq!(
            validated.value,
            json!({ "attribute": "Grade", "operator": "=", "value": "A" })
        );

        let err = v
            .validate(
                "filters",
                &Validator::new(ValidatorKind::ItemAttributeFilter),
                &json!({ "attribute": "Grade", "operator": "~", "value": "A" }),
            )
            .await
            .unwrap_err();
        assert!(failures(err)[0].suggestions.contains(&"contains".to_string()));
    }

    #[tokio::test]
    async fn validation_delegates_to_matcher() {
        let matcher = Arc::new(ScriptedMatcher::new().answer("tiny ship", Some("Cutlass Black")));
        let v = Validators::new(
            seeded_catalog().await,
            matcher.clone(),
            ValidationConfig::default(),
        );
        let validated = v
            .validate("ship", &Validator::new(ValidatorKind::Ship), &json!("tiny ship"))
            .await
            .unwrap();
        assert_eq!(validated.value, json!("Cutlass Black"));
        assert_eq!(matcher.calls(), 1);
        assert!(matcher.last_candidates().contains(&"Drake Caterpillar".to_string()));
        assert!(!matcher.last_candidates().contains(&"Tumbril Cyclone".to_string()));
    }

    #[test]
    fn enumerable_descriptor_embeds_candidates() {
        let roles: Vec<String> = VEHICLE_ROLES.iter().map(|r| r.to_string()).collect();
        let d = Validator::multiple(ValidatorKind::VehicleRole).descriptor(Some(&roles));
        assert_eq!(d["type"], "array");
        assert_eq!(d["items"]["enum"].as_array().unwrap().len(), 12);

        let d = ValidatorKind::Location.descriptor(Some(&roles));
        assert!(d.get("enum").is_none());
    }

    #[test]
    fn vehicle_names_are_unique() {
        let store = Arc::new(uex_store::Store::open_in_memory().unwrap());
        store
            .write_batch(|tx| {
                tx.execute_batch(
                    "INSERT INTO vehicles (id, name, name_full, is_spaceship, uex_run_id) VALUES
                         (1, 'Alpha', 'Drake Cutter', 1, 1),
                         (2, 'Beta', 'Aegis Avenger', 1, 1),
                         (3, 'Gamma', 'Drake Cutter', 1, 1);",
                )?;
                Ok(())
            })
            .unwrap();
        let catalog = Catalog::new(store);

        let names = vehicle_names(&catalog, VehicleKind::Spaceship).unwrap();
        assert_eq!(names, vec!["Aegis Avenger", "Drake Cutter"]);
    }
}
