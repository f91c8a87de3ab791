//! Trade-route search over the precomputed route-candidate table.
//!
//! Every constraint becomes a predicate on `commodities_routes`; the tradable
//! volume and estimated profit are computed in SQL so ordering and paging
//! happen in the store.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uex_models::{CommodityRoute, EntityType, RouteConfig};
use uex_store::{Catalog, Expr, Op, Operand, Predicate, Query};

use crate::error::ToolError;

/// Constraints for one route search. Names are canonical (already validated).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RouteRequest {
    pub commodities: Vec<String>,
    pub exclude_commodities: Vec<String>,
    pub allow_illegal: bool,
    pub star_systems: Vec<String>,
    pub exclude_star_systems: Vec<String>,
    /// `None` allows routes between star systems.
    pub allow_star_system_change: Option<bool>,
    pub start_locations: Vec<String>,
    pub destinations: Vec<String>,
    pub exclude_locations: Vec<String>,
    pub ship: Option<String>,
    pub budget: Option<f64>,
    pub cargo_space: Option<i64>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteSummary {
    pub commodity: String,
    pub origin_terminal: String,
    pub origin_star_system: String,
    pub destination_terminal: String,
    pub destination_star_system: String,
    pub price_buy: f64,
    pub price_sell: f64,
    pub scu: f64,
    pub profit: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_services: Option<Vec<&'static str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_services: Option<Vec<&'static str>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutePlan {
    pub routes: Vec<RouteSummary>,
    pub notes: Vec<String>,
    /// No cargo, ship or budget was given; volumes are 1 SCU and results are illustrative.
    pub example_mode: bool,
}

pub struct RouteOptimizer {
    catalog: Arc<Catalog>,
    config: RouteConfig,
}

impl RouteOptimizer {
    pub fn new(catalog: Arc<Catalog>, config: RouteConfig) -> Self {
        Self { catalog, config }
    }

    pub fn find_routes(&self, request: &RouteRequest) -> Result<RoutePlan, ToolError> {
        let mut notes = Vec::new();
        let plan = self.plan(request, &mut notes)?;

        let query = plan.query;
        debug!(?query, "Route query");
        let rows: Vec<CommodityRoute> = self.catalog.store().query_as(&query)?;
        let routes: Vec<RouteSummary> = rows.iter().map(|r| self.summarize(r)).collect();
        if routes.is_empty() {
            notes.push("No trade routes match these constraints.".to_string());
        }
        info!(
            routes = routes.len(),
            example_mode = plan.example_mode,
            "Route search finished"
        );
        Ok(RoutePlan {
            routes,
            notes,
            example_mode: plan.example_mode,
        })
    }

    /// Translate a request into a route query, collecting advisory notes.
    fn plan(&self, request: &RouteRequest, notes: &mut Vec<String>) -> Result<Plan, ToolError> {
        let catalog = &self.catalog;
        let mut query = Query::new(EntityType::CommodityRoute)
            .filter(Predicate::new(
                "price_destination",
                Op::Gt,
                Operand::Column("price_origin".into()),
            ))
            .filter(Predicate::gt("price_origin", 0))
            // Below one unit on either side nothing can be traded.
            .filter(Predicate::ge("scu_origin", 1))
            .filter(Predicate::ge("scu_destination", 1));

        // Capacity
        let ship = match &request.ship {
            Some(name) => Some(catalog.vehicle_by_name(name)?.ok_or_else(|| {
                ToolError::Execution(format!("ship '{name}' is no longer in the catalog"))
            })?),
            None => None,
        };
        let max_scu = match (request.cargo_space, ship.as_ref().map(|s| s.scu)) {
            (Some(cargo), Some(ship_scu)) => {
                if cargo > ship_scu {
                    notes.push(format!(
                        "Cargo space capped at the ship's capacity of {ship_scu} SCU."
                    ));
                }
                Some(cargo.min(ship_scu))
            }
            (cargo, ship_scu) => cargo.or(ship_scu),
        };
        let example_mode = max_scu.is_none() && request.budget.is_none();
        let max_scu = if example_mode {
            notes.push(
                "No ship, cargo space or budget given: showing 1 SCU example routes. \
                 Results are illustrative only."
                    .to_string(),
            );
            Some(1)
        } else {
            max_scu
        };

        // Commodities
        let mut excluded: BTreeSet<i64> = catalog
            .excluded_commodity_ids(request.allow_illegal)?
            .into_iter()
            .collect();
        for name in &request.exclude_commodities {
            if let Some(c) = catalog.commodity_by_name(name)? {
                excluded.insert(c.id);
            }
        }
        if !request.commodities.is_empty() {
            let mut allowed = Vec::new();
            for name in &request.commodities {
                match catalog.commodity_by_name(name)? {
                    Some(c) if excluded.contains(&c.id) => notes.push(format!(
                        "{} is excluded (blacklisted or illegal) and was skipped.",
                        c.name
                    )),
                    Some(c) => allowed.push(c.id),
                    None => {}
                }
            }
            query = query.filter(Predicate::is_in("id_commodity", allowed));
        }
        if !excluded.is_empty() {
            query = query.filter(Predicate::not_in("id_commodity", excluded));
        }

        // Terminals
        let terminals = catalog.terminals()?;
        let excluded_terminals: Vec<i64> = terminals
            .iter()
            .filter(|t| t.is_blacklisted || t.is_located_in(&request.exclude_locations))
            .map(|t| t.id)
            .collect();
        if !excluded_terminals.is_empty() {
            query = query
                .filter(Predicate::not_in("id_terminal_origin", excluded_terminals.clone()))
                .filter(Predicate::not_in("id_terminal_destination", excluded_terminals));
        }
        if !request.start_locations.is_empty() {
            let ids = terminals
                .iter()
                .filter(|t| t.is_located_in(&request.start_locations))
                .map(|t| t.id);
            query = query.filter(Predicate::is_in("id_terminal_origin", ids));
        }
        if !request.destinations.is_empty() {
            let ids = terminals
                .iter()
                .filter(|t| t.is_located_in(&request.destinations))
                .map(|t| t.id);
            query = query.filter(Predicate::is_in("id_terminal_destination", ids));
        }
        if let Some(vehicle) = ship.as_ref().filter(|s| s.requires_loading_dock()) {
            notes.push(format!(
                "{} needs a loading dock at both ends.",
                vehicle.display_name()
            ));
            query = query
                .filter(Predicate::eq("origin_has_loading_dock", true))
                .filter(Predicate::eq("destination_has_loading_dock", true));
        }

        // Star systems
        if !request.star_systems.is_empty() {
            let ids = self.star_system_ids(&request.star_systems)?;
            query = query
                .filter(Predicate::is_in("id_star_system_origin", ids.clone()))
                .filter(Predicate::is_in("id_star_system_destination", ids));
        }
        if !request.exclude_star_systems.is_empty() {
            let ids = self.star_system_ids(&request.exclude_star_systems)?;
            query = query
                .filter(Predicate::not_in("id_star_system_origin", ids.clone()))
                .filter(Predicate::not_in("id_star_system_destination", ids));
        }
        if request.allow_star_system_change == Some(false) {
            query = query.filter(Predicate::column_eq(
                "id_star_system_origin",
                "id_star_system_destination",
            ));
        }

        // Budget
        if let Some(budget) = request.budget {
            query = query.filter(Predicate::le("price_origin", budget));
        }

        // Computed columns
        let mut caps = vec![Expr::col("scu_origin"), Expr::col("scu_destination")];
        if let Some(max_scu) = max_scu {
            caps.push(Expr::lit(max_scu));
        }
        if let Some(budget) = request.budget {
            caps.push(Expr::trunc(Expr::div(Expr::lit(budget), Expr::col("price_origin"))));
        }
        let scu_cargo = Expr::trunc(Expr::Min(caps));
        let profit = Expr::mul(
            scu_cargo.clone(),
            Expr::sub(Expr::col("price_destination"), Expr::col("price_origin")),
        );
        query = query
            .compute("scu_cargo", scu_cargo)
            .compute("profit_estimated", profit)
            .compute(
                "same_system",
                Expr::equals(
                    Expr::col("id_star_system_origin"),
                    Expr::col("id_star_system_destination"),
                ),
            );

        // Ordering and paging
        query = if example_mode {
            query.order_desc("score")
        } else {
            query.order_desc("profit_estimated")
        };
        let limit = request
            .limit
            .unwrap_or(self.config.default_count)
            .clamp(1, self.config.max_count.max(1));
        query = query
            .order_desc("same_system")
            .order_asc("distance")
            .limit(limit)
            .offset(request.offset.unwrap_or(0));

        Ok(Plan {
            query,
            example_mode,
        })
    }

    fn star_system_ids(&self, names: &[String]) -> Result<Vec<i64>, ToolError> {
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            if let Some(system) = self.catalog.star_system_by_name(name)? {
                ids.push(system.id);
            }
        }
        Ok(ids)
    }

    fn summarize(&self, route: &CommodityRoute) -> RouteSummary {
        let name = |n: &Option<String>| n.clone().unwrap_or_else(|| "unknown".to_string());
        let advanced = self.config.advanced_info;
        RouteSummary {
            commodity: name(&route.commodity_name),
            origin_terminal: name(&route.origin_terminal_name),
            origin_star_system: name(&route.origin_star_system_name),
            destination_terminal: name(&route.destination_terminal_name),
            destination_star_system: name(&route.destination_star_system_name),
            price_buy: route.price_origin,
            price_sell: route.price_destination,
            scu: route.scu_cargo.unwrap_or(0.0),
            profit: route.profit_estimated.unwrap_or(0.0),
            distance: route.distance.filter(|_| advanced),
            margin: advanced.then_some(route.price_margin),
            origin_services: advanced.then(|| {
                services(
                    route.origin_has_loading_dock,
                    route.origin_has_docking_port,
                    route.origin_has_freight_elevator,
                )
            }),
            destination_services: advanced.then(|| {
                services(
                    route.destination_has_loading_dock,
                    route.destination_has_docking_port,
                    route.destination_has_freight_elevator,
                )
            }),
        }
    }
}

struct Plan {
    query: Query,
    example_mode: bool,
}

fn services(loading_dock: bool, docking_port: bool, freight_elevator: bool) -> Vec<&'static str> {
    [
        (loading_dock, "loading dock"),
        (docking_port, "docking port"),
        (freight_elevator, "freight elevator"),
    ]
    .into_iter()
    .filter_map(|(has, label)| has.then_some(label))
    .collect()
}
