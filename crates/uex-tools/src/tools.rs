//! The tool surface: four tools, their parameters and their bodies.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uex_models::{CommodityPrice, ItemAttribute, Vehicle};
use uex_store::{Catalog, CommodityFilter, CompanyFilter, ItemFilter, VehicleFilter};

use crate::error::ToolError;
use crate::optimizer::{RouteOptimizer, RouteRequest};
use crate::validator::{Validator, ValidatorKind};

/// Upper bound on rows any single tool returns.
pub const MAX_RESULTS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    FindTradeRoutes,
    FindCommodityPrices,
    FindVehicles,
    FindItems,
}

impl ToolKind {
    pub const ALL: [ToolKind; 4] = [
        ToolKind::FindTradeRoutes,
        ToolKind::FindCommodityPrices,
        ToolKind::FindVehicles,
        ToolKind::FindItems,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::FindTradeRoutes => "find_trade_routes",
            ToolKind::FindCommodityPrices => "find_commodity_prices",
            ToolKind::FindVehicles => "find_vehicles",
            ToolKind::FindItems => "find_items",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolKind::FindTradeRoutes => {
                "Find the most profitable commodity trade routes for a ship, cargo space or budget."
            }
            ToolKind::FindCommodityPrices => {
                "Find the best terminals to buy or sell one commodity at."
            }
            ToolKind::FindVehicles => {
                "Look up ships and ground vehicles by name, role or manufacturer, \
                 with where to buy or rent them."
            }
            ToolKind::FindItems => {
                "Look up items by name or category, optionally filtered by attributes, \
                 with where to buy them."
            }
        }
    }

    pub fn parameters(&self) -> Vec<ParameterSpec> {
        let tradable = || {
            ValidatorKind::Commodity(CommodityFilter {
                buyable_and_sellable: true,
                ..CommodityFilter::default()
            })
        };
        let systems = || ValidatorKind::StarSystem {
            available_only: true,
        };
        let count = |min: f64| ValidatorKind::Number {
            min: Some(min),
            max: None,
            integer: true,
        };

        match self {
            ToolKind::FindTradeRoutes => vec![
                ParameterSpec::optional(
                    "ship",
                    "Ship flown; supplies cargo capacity and docking needs.",
                    Validator::new(ValidatorKind::Ship),
                ),
                ParameterSpec::optional(
                    "cargo_space",
                    "Available cargo space in SCU.",
                    Validator::new(count(1.0)),
                ),
                ParameterSpec::optional(
                    "budget",
                    "Money available to buy cargo, in aUEC.",
                    Validator::new(ValidatorKind::Number {
                        min: Some(0.0),
                        max: None,
                        integer: false,
                    }),
                ),
                ParameterSpec::optional(
                    "commodities",
                    "Only trade these commodities.",
                    Validator::multiple(tradable()),
                ),
                ParameterSpec::optional(
                    "exclude_commodities",
                    "Never trade these commodities.",
                    Validator::multiple(tradable()),
                ),
                ParameterSpec::optional(
                    "allow_illegal",
                    "Include illegal commodities.",
                    Validator::new(ValidatorKind::Boolean),
                ),
                ParameterSpec::optional(
                    "star_systems",
                    "Only trade within these star systems.",
                    Validator::multiple(systems()),
                ),
                ParameterSpec::optional(
                    "exclude_star_systems",
                    "Avoid these star systems.",
                    Validator::multiple(systems()),
                ),
                ParameterSpec::optional(
                    "allow_star_system_change",
                    "Allow routes that jump to another star system.",
                    Validator::new(ValidatorKind::Boolean),
                ),
                ParameterSpec::optional(
                    "start_locations",
                    "Start at one of these locations.",
                    Validator::multiple(ValidatorKind::Location),
                ),
                ParameterSpec::optional(
                    "destinations",
                    "End at one of these locations.",
                    Validator::multiple(ValidatorKind::Location),
                ),
                ParameterSpec::optional(
                    "exclude_locations",
                    "Avoid these locations.",
                    Validator::multiple(ValidatorKind::Location),
                ),
                ParameterSpec::optional(
                    "limit",
                    "Number of routes to return.",
                    Validator::new(count(1.0)),
                ),
                ParameterSpec::optional(
                    "offset",
                    "Skip this many routes, for paging.",
                    Validator::new(count(0.0)),
                ),
            ],
            ToolKind::FindCommodityPrices => vec![
                ParameterSpec::required(
                    "commodity",
                    "Commodity to price.",
                    Validator::new(ValidatorKind::Commodity(CommodityFilter::default())),
                ),
                ParameterSpec::optional(
                    "mode",
                    "Whether to find where to buy or where to sell. Defaults to sell.",
                    Validator::new(ValidatorKind::Enum(vec!["buy".into(), "sell".into()])),
                ),
                ParameterSpec::optional(
                    "star_system",
                    "Only terminals in this star system.",
                    Validator::new(systems()),
                ),
                ParameterSpec::optional(
                    "location",
                    "Only terminals at this location.",
                    Validator::new(ValidatorKind::Location),
                ),
                ParameterSpec::optional(
                    "limit",
                    "Number of terminals to return.",
                    Validator::new(count(1.0)),
                ),
            ],
            ToolKind::FindVehicles => vec![
                ParameterSpec::optional(
                    "name",
                    "Vehicle name.",
                    Validator::new(ValidatorKind::Vehicle),
                ),
                ParameterSpec::optional(
                    "role",
                    "Vehicle role.",
                    Validator::new(ValidatorKind::VehicleRole),
                ),
                ParameterSpec::optional(
                    "manufacturer",
                    "Vehicle manufacturer.",
                    Validator::new(ValidatorKind::Company(CompanyFilter {
                        vehicle_manufacturer: true,
                        item_manufacturer: false,
                    })),
                ),
                ParameterSpec::optional(
                    "min_cargo",
                    "Minimum cargo capacity in SCU.",
                    Validator::new(count(0.0)),
                ),
            ],
            ToolKind::FindItems => vec![
                ParameterSpec::optional(
                    "names",
                    "Item names.",
                    Validator::multiple(ValidatorKind::Item),
                ),
                ParameterSpec::optional(
                    "category",
                    "Item category.",
                    Validator::new(ValidatorKind::Category),
                ),
                ParameterSpec::optional(
                    "attributes",
                    "Attribute filters, e.g. {\"attribute\": \"Grade\", \"value\": \"A\"}.",
                    Validator::multiple(ValidatorKind::ItemAttributeFilter),
                ),
            ],
        }
    }
}

/// One tool parameter and the validator that checks it.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub validator: Validator,
    pub required: bool,
}

impl ParameterSpec {
    pub fn required(name: &'static str, description: &'static str, validator: Validator) -> Self {
        Self {
            name,
            description,
            validator,
            required: true,
        }
    }

    pub fn optional(name: &'static str, description: &'static str, validator: Validator) -> Self {
        Self {
            name,
            description,
            validator,
            required: false,
        }
    }
}

/// What a tool body produced: the full response, a short line the caller can
/// show immediately, and notes queued while running.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub response: Value,
    pub instant_response: Option<String>,
    pub notes: Vec<String>,
}

/// Run `tool` against already validated arguments.
pub fn execute(
    tool: ToolKind,
    catalog: &Catalog,
    optimizer: &RouteOptimizer,
    args: Map<String, Value>,
) -> Result<ToolOutput, ToolError> {
    let args = Value::Object(args);
    match tool {
        ToolKind::FindTradeRoutes => {
            let request: RouteRequest = serde_json::from_value(args)?;
            let plan = optimizer.find_routes(&request)?;
            let instant_response = plan.routes.first().map(|r| {
                format!(
                    "Best route: {} from {} to {}, about {:.0} aUEC profit.",
                    r.commodity, r.origin_terminal, r.destination_terminal, r.profit
                )
            });
            Ok(ToolOutput {
                response: json!({ "routes": plan.routes, "example_mode": plan.example_mode }),
                instant_response,
                notes: plan.notes,
            })
        }
        ToolKind::FindCommodityPrices => commodity_prices(catalog, serde_json::from_value(args)?),
        ToolKind::FindVehicles => vehicles(catalog, serde_json::from_value(args)?),
        ToolKind::FindItems => items(catalog, serde_json::from_value(args)?),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
enum PriceMode {
    Buy,
    #[default]
    Sell,
}

#[derive(Debug, Deserialize)]
struct CommodityPriceArgs {
    commodity: String,
    #[serde(default)]
    mode: PriceMode,
    #[serde(default)]
    star_system: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

fn commodity_prices(
    catalog: &Catalog,
    args: CommodityPriceArgs,
) -> Result<ToolOutput, ToolError> {
    let commodity = catalog.commodity_by_name(&args.commodity)?.ok_or_else(|| {
        ToolError::Execution(format!("commodity '{}' is no longer in the catalog", args.commodity))
    })?;
    let location = args.location.map(|l| vec![l]);

    let mut prices: Vec<CommodityPrice> = catalog
        .commodity_prices(commodity.id, args.star_system.as_deref())?
        .into_iter()
        .filter(|p| match args.mode {
            PriceMode::Buy => p.price_buy > 0.0,
            PriceMode::Sell => p.price_sell > 0.0,
        })
        .filter(|p| {
            location.as_ref().map_or(true, |filter| {
                p.location_names()
                    .iter()
                    .any(|name| filter.iter().any(|f| f.eq_ignore_ascii_case(name)))
            })
        })
        .collect();
    match args.mode {
        PriceMode::Buy => prices.sort_by(|a, b| a.price_buy.total_cmp(&b.price_buy)),
        PriceMode::Sell => prices.sort_by(|a, b| b.price_sell.total_cmp(&a.price_sell)),
    }
    prices.truncate(args.limit.unwrap_or(5).clamp(1, MAX_RESULTS));

    let rows: Vec<Value> = prices
        .iter()
        .map(|p| {
            let (price, scu) = match args.mode {
                PriceMode::Buy => (p.price_buy, p.scu_buy),
                PriceMode::Sell => (p.price_sell, p.scu_sell),
            };
            json!({
                "terminal": p.terminal_name,
                "star_system": p.star_system_name,
                "price": price,
                "scu": scu,
            })
        })
        .collect();

    let verb = match args.mode {
        PriceMode::Buy => "buy",
        PriceMode::Sell => "sell",
    };
    let mut notes = Vec::new();
    if rows.is_empty() {
        notes.push(format!("No terminal {verb}s {} here.", commodity.name));
    }
    let instant_response = prices.first().map(|p| {
        format!(
            "Best place to {verb} {}: {}.",
            commodity.name,
            p.terminal_name.as_deref().unwrap_or("unknown")
        )
    });
    Ok(ToolOutput {
        response: json!({ "commodity": commodity.name, "mode": args.mode, "terminals": rows }),
        instant_response,
        notes,
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VehicleArgs {
    name: Option<String>,
    role: Option<String>,
    manufacturer: Option<String>,
    min_cargo: Option<i64>,
}

fn vehicles(catalog: &Catalog, args: VehicleArgs) -> Result<ToolOutput, ToolError> {
    let mut found: Vec<Vehicle> = match &args.name {
        Some(name) => catalog.vehicle_by_name(name)?.into_iter().collect(),
        None => catalog.vehicles(&VehicleFilter {
            role: args.role.clone(),
            company: args.manufacturer.clone(),
            min_scu: args.min_cargo,
            ..VehicleFilter::default()
        })?,
    };
    let mut notes = Vec::new();
    if found.len() > MAX_RESULTS {
        notes.push(format!(
            "{} vehicles match; showing the first {MAX_RESULTS}.",
            found.len()
        ));
        found.truncate(MAX_RESULTS);
    }

    let mut rows = Vec::with_capacity(found.len());
    for vehicle in &found {
        let purchase: Vec<Value> = catalog
            .vehicle_purchase_prices(vehicle.id)?
            .iter()
            .map(|p| price_row(&p.terminal_name, &p.star_system_name, p.price_buy))
            .collect();
        let rental: Vec<Value> = catalog
            .vehicle_rental_prices(vehicle.id)?
            .iter()
            .map(|p| price_row(&p.terminal_name, &p.star_system_name, p.price_rent))
            .collect();
        rows.push(json!({
            "name": vehicle.display_name(),
            "manufacturer": vehicle.company_name,
            "scu": vehicle.scu,
            "pad_type": vehicle.pad_type,
            "roles": vehicle.roles(),
            "ground_vehicle": vehicle.is_ground_vehicle,
            "purchase": purchase,
            "rental": rental,
        }));
    }
    if rows.is_empty() {
        notes.push("No vehicles match these filters.".to_string());
    }

    Ok(ToolOutput {
        instant_response: Some(format!("Found {} vehicle(s).", rows.len())),
        response: json!({ "vehicles": rows }),
        notes,
    })
}

fn price_row(terminal: &Option<String>, star_system: &Option<String>, price: f64) -> Value {
    json!({ "terminal": terminal, "star_system": star_system, "price": price })
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AttributeFilter {
    pub attribute: String,
    #[serde(default = "default_operator")]
    pub operator: String,
    pub value: String,
}

fn default_operator() -> String {
    "=".to_string()
}

impl AttributeFilter {
    /// Whether `attribute` satisfies this filter. Values compare numerically
    /// when both sides start with a number, otherwise case-insensitively.
    pub fn matches(&self, attribute: &ItemAttribute) -> bool {
        if !attribute.attribute_name.eq_ignore_ascii_case(&self.attribute) {
            return false;
        }
        let Some(actual) = attribute.value.as_deref() else {
            return false;
        };
        if self.operator == "contains" {
            return actual.to_lowercase().contains(&self.value.to_lowercase());
        }
        let ordering = match (leading_number(actual), leading_number(&self.value)) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => Some(actual.to_lowercase().cmp(&self.value.to_lowercase())),
        };
        let Some(ordering) = ordering else {
            return false;
        };
        match self.operator.as_str() {
            "=" => ordering == Ordering::Equal,
            "!=" => ordering != Ordering::Equal,
            "<" => ordering == Ordering::Less,
            "<=" => ordering != Ordering::Greater,
            ">" => ordering == Ordering::Greater,
            ">=" => ordering != Ordering::Less,
            _ => false,
        }
    }
}

fn leading_number(s: &str) -> Option<f64> {
    let s = s.trim();
    let end = s
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && *c == '-')))
        .map_or(s.len(), |(i, _)| i);
    s[..end].parse().ok()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ItemArgs {
    names: Vec<String>,
    category: Option<String>,
    attributes: Vec<AttributeFilter>,
}

fn items(catalog: &Catalog, args: ItemArgs) -> Result<ToolOutput, ToolError> {
    if args.names.is_empty() && args.category.is_none() {
        return Err(ToolError::Validation(vec![
            crate::validator::ValidationFailure::new(
                "names",
                "give item names or a category to search.",
            ),
        ]));
    }
    let category_ids: Vec<i64> = match &args.category {
        Some(name) => catalog
            .categories()?
            .into_iter()
            .filter(|c| &c.name == name)
            .map(|c| c.id)
            .collect(),
        None => Vec::new(),
    };
    let found = catalog.items(&ItemFilter {
        names: args.names.clone(),
        category_ids,
    })?;
    let ids: Vec<i64> = found.iter().map(|i| i.id).collect();

    let mut attributes: BTreeMap<i64, Vec<ItemAttribute>> = BTreeMap::new();
    for attribute in catalog.item_attributes(&ids)? {
        if let Some(id) = attribute.id_item {
            attributes.entry(id).or_default().push(attribute);
        }
    }
    let kept: Vec<_> = found
        .into_iter()
        .filter(|item| {
            let own = attributes.get(&item.id).map(Vec::as_slice).unwrap_or(&[]);
            args.attributes
                .iter()
                .all(|filter| own.iter().any(|a| filter.matches(a)))
        })
        .take(MAX_RESULTS)
        .collect();

    let kept_ids: Vec<i64> = kept.iter().map(|i| i.id).collect();
    let mut prices: BTreeMap<i64, Vec<Value>> = BTreeMap::new();
    for price in catalog.item_prices(&kept_ids)? {
        if let Some(id) = price.id_item {
            prices.entry(id).or_default().push(price_row(
                &price.terminal_name,
                &price.star_system_name,
                price.price_buy,
            ));
        }
    }

    let rows: Vec<Value> = kept
        .iter()
        .map(|item| {
            let attrs: Map<String, Value> = attributes
                .get(&item.id)
                .into_iter()
                .flatten()
                .map(|a| {
                    let value = match (&a.value, &a.unit) {
                        (Some(v), Some(u)) => format!("{v} {u}"),
                        (Some(v), None) => v.clone(),
                        (None, _) => String::new(),
                    };
                    (a.attribute_name.clone(), Value::String(value))
                })
                .collect();
            json!({
                "name": item.name,
                "category": item.category,
                "manufacturer": item.company_name,
                "attributes": attrs,
                "prices": prices.remove(&item.id).unwrap_or_default(),
            })
        })
        .collect();

    let notes = if rows.is_empty() {
        vec!["No items match these filters.".to_string()]
    } else {
        Vec::new()
    };
    Ok(ToolOutput {
        instant_response: Some(format!("Found {} item(s).", rows.len())),
        response: json!({ "items": rows }),
        notes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::seeded_catalog;
    use uex_models::RouteConfig;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn attribute(name: &str, value: &str) -> ItemAttribute {
        serde_json::from_value(json!({"id": 1, "attribute_name": name, "value": value})).unwrap()
    }

    #[test]
    fn tool_names_round_trip() {
        for tool in ToolKind::ALL {
            assert_eq!(ToolKind::from_name(tool.name()), Some(tool));
        }
        assert_eq!(ToolKind::from_name("launch_missiles"), None);
    }

    #[test]
    fn attribute_filters_compare_numbers_and_text() {
        let rate = attribute("Fire Rate", "50 rpm");
        let f = |op: &str, value: &str| AttributeFilter {
            attribute: "fire rate".into(),
            operator: op.into(),
            value: value.into(),
        };
        assert!(f(">", "40").matches(&rate));
        assert!(f("<=", "50").matches(&rate));
        assert!(!f("<", "9").matches(&rate));
        assert!(f("contains", "RPM").matches(&rate));

        let grade = attribute("Grade", "A");
        let g = AttributeFilter {
            attribute: "Grade".into(),
            operator: "=".into(),
            value: "a".into(),
        };
        assert!(g.matches(&grade));
        assert!(!g.matches(&rate));
    }

    #[tokio::test]
    async fn commodity_prices_rank_terminals() {
        let catalog = seeded_catalog().await;
        let optimizer = RouteOptimizer::new(catalog.clone(), RouteConfig::default());
        let out = execute(
            ToolKind::FindCommodityPrices,
            &catalog,
            &optimizer,
            args(json!({ "commodity": "Agricium", "mode": "sell" })),
        )
        .unwrap();
        let terminals = out.response["terminals"].as_array().unwrap();
        assert!(!terminals.is_empty());
        let prices: Vec<f64> = terminals.iter().map(|t| t["price"].as_f64().unwrap()).collect();
        assert!(prices.windows(2).all(|w| w[0] >= w[1]));
        assert!(out.instant_response.unwrap().contains("Agricium"));
    }

    #[tokio::test]
    async fn vehicles_include_prices() {
        let catalog = seeded_catalog().await;
        let optimizer = RouteOptimizer::new(catalog.clone(), RouteConfig::default());
        let out = execute(
            ToolKind::FindVehicles,
            &catalog,
            &optimizer,
            args(json!({ "name": "Drake Cutlass Black" })),
        )
        .unwrap();
        let vehicle = &out.response["vehicles"][0];
        assert_eq!(vehicle["name"], "Drake Cutlass Black");
        assert_eq!(vehicle["purchase"][0]["price"], 1700000.0);
        assert_eq!(vehicle["rental"][0]["price"], 85000.0);

        let out = execute(
            ToolKind::FindVehicles,
            &catalog,
            &optimizer,
            args(json!({ "role": "cargo", "min_cargo": 500 })),
        )
        .unwrap();
        assert_eq!(out.response["vehicles"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn items_filter_by_attribute() {
        let catalog = seeded_catalog().await;
        let optimizer = RouteOptimizer::new(catalog.clone(), RouteConfig::default());
        let out = execute(
            ToolKind::FindItems,
            &catalog,
            &optimizer,
            args(json!({
                "category": "Quantum Drives",
                "attributes": [{ "attribute": "Grade", "operator": "=", "value": "A" }],
            })),
        )
        .unwrap();
        let items = out.response["items"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["name"], "Expedition");
        assert_eq!(items[0]["attributes"]["Grade"], "A");
        assert_eq!(items[0]["prices"][0]["price"], 21000.0);
    }

    #[tokio::test]
    async fn items_need_a_name_or_category() {
        let catalog = seeded_catalog().await;
        let optimizer = RouteOptimizer::new(catalog.clone(), RouteConfig::default());
        let err = execute(ToolKind::FindItems, &catalog, &optimizer, Map::new()).unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
    }
}
