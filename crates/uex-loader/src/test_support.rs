//! Test support: an in-memory catalog source and a small consistent universe.
//!
//! `StaticCatalog` serves canned records per endpoint and applies fetch parameters
//! as equality filters, so parameterized fetches behave like the remote API.
//! Records can be swapped between cycles and endpoints told to fail.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{json, Value};
use uex_models::EntityType;

use crate::error::LoaderError;
use crate::sources::{CatalogSource, FetchParams};

pub struct StaticCatalog {
    records: Mutex<HashMap<String, Vec<Value>>>,
    failing: Mutex<HashSet<String>>,
    version: Mutex<String>,
    fetches: AtomicUsize,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StaticCatalog {
    pub fn new(version: &str) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            version: Mutex::new(version.to_string()),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Replace every record served for `entity`.
    pub fn set(&self, entity: EntityType, records: Vec<Value>) {
        guard(&self.records).insert(entity.endpoint().to_string(), records);
    }

    pub fn records(&self, entity: EntityType) -> Vec<Value> {
        guard(&self.records)
            .get(entity.endpoint())
            .cloned()
            .unwrap_or_default()
    }

    /// Stop serving the record of `entity` with the given id.
    pub fn remove(&self, entity: EntityType, id: i64) {
        if let Some(records) = guard(&self.records).get_mut(entity.endpoint()) {
            records.retain(|r| r.get("id").and_then(Value::as_i64) != Some(id));
        }
    }

    /// Make every fetch of `entity` fail until `recover` is called.
    pub fn fail(&self, entity: EntityType) {
        guard(&self.failing).insert(entity.endpoint().to_string());
    }

    pub fn recover(&self, entity: EntityType) {
        guard(&self.failing).remove(entity.endpoint());
    }

    pub fn set_version(&self, version: &str) {
        *guard(&self.version) = version.to_string();
    }

    /// Number of fetch calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

fn matches_param(record: &Value, key: &str, expected: &str) -> bool {
    match record.get(key) {
        Some(Value::Number(n)) => n.to_string() == expected,
        Some(Value::String(s)) => s == expected,
        _ => false,
    }
}

#[async_trait]
impl CatalogSource for StaticCatalog {
    async fn fetch(&self, endpoint: &str, params: &FetchParams) -> Result<Vec<Value>, LoaderError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if guard(&self.failing).contains(endpoint) {
            return Err(LoaderError::fetch(endpoint, "simulated outage"));
        }
        let records = guard(&self.records)
            .get(endpoint)
            .cloned()
            .unwrap_or_default();
        Ok(records
            .into_iter()
            .filter(|r| params.iter().all(|(k, v)| matches_param(r, k, v)))
            .collect())
    }

    async fn remote_version(&self) -> Result<String, LoaderError> {
        Ok(guard(&self.version).clone())
    }
}

/// A small universe: two reachable star systems, six terminals, a handful of
/// commodities with prices and precomputed routes, vehicles and items.
pub fn sample_catalog() -> StaticCatalog {
    let catalog = StaticCatalog::new("4.0.2");

    catalog.set(
        EntityType::StarSystem,
        vec![
            json!({"id": 1, "name": "Stanton", "code": "ST", "is_available": 1, "is_visible": 1, "is_default": 1}),
            json!({"id": 2, "name": "Pyro", "code": "PY", "is_available": 1, "is_visible": 1}),
            json!({"id": 3, "name": "Nyx", "code": "NX", "is_available": 0}),
        ],
    );
    catalog.set(
        EntityType::Planet,
        vec![
            json!({"id": 10, "id_star_system": 1, "name": "Hurston", "star_system_name": "Stanton", "is_available": 1}),
            json!({"id": 11, "id_star_system": 1, "name": "ArcCorp", "star_system_name": "Stanton", "is_available": 1}),
            json!({"id": 12, "id_star_system": 1, "name": "microTech", "star_system_name": "Stanton", "is_available": 1}),
            json!({"id": 13, "id_star_system": 1, "name": "Crusader", "star_system_name": "Stanton", "is_available": 1}),
            json!({"id": 20, "id_star_system": 2, "name": "Pyro I", "star_system_name": "Pyro", "is_available": 1}),
        ],
    );
    catalog.set(
        EntityType::Moon,
        vec![json!({"id": 30, "id_star_system": 1, "id_planet": 13, "name": "Daymar", "star_system_name": "Stanton", "planet_name": "Crusader"})],
    );
    catalog.set(
        EntityType::Orbit,
        vec![
            json!({"id": 40, "id_star_system": 1, "name": "Hurston", "is_planet": 1, "star_system_name": "Stanton"}),
            json!({"id": 41, "id_star_system": 1, "name": "ArcCorp", "is_planet": 1, "star_system_name": "Stanton"}),
        ],
    );
    catalog.set(
        EntityType::OrbitDistance,
        vec![
            json!({"id_star_system": 1, "id_orbit_origin": 40, "id_orbit_destination": 41, "distance": 12.5, "star_system_name": "Stanton"}),
            json!({"id_star_system": 1, "id_orbit_origin": 41, "id_orbit_destination": 40, "distance": 12.5, "star_system_name": "Stanton"}),
        ],
    );
    catalog.set(
        EntityType::City,
        vec![
            json!({"id": 50, "id_star_system": 1, "id_planet": 10, "name": "Lorville", "star_system_name": "Stanton", "planet_name": "Hurston"}),
            json!({"id": 51, "id_star_system": 1, "id_planet": 11, "name": "Area 18", "star_system_name": "Stanton", "planet_name": "ArcCorp"}),
        ],
    );
    catalog.set(
        EntityType::Outpost,
        vec![json!({"id": 60, "id_star_system": 1, "id_moon": 30, "name": "Shubin Mining Facility SAL-2", "star_system_name": "Stanton", "moon_name": "Daymar"})],
    );
    catalog.set(
        EntityType::PointOfInterest,
        vec![json!({"id": 70, "id_star_system": 1, "name": "Grim HEX", "star_system_name": "Stanton"})],
    );
    catalog.set(
        EntityType::SpaceStation,
        vec![
            json!({"id": 80, "id_star_system": 1, "id_planet": 12, "name": "Port Tressler", "star_system_name": "Stanton", "planet_name": "microTech"}),
            json!({"id": 81, "id_star_system": 2, "name": "Ruin Station", "star_system_name": "Pyro"}),
        ],
    );
    catalog.set(
        EntityType::Faction,
        vec![json!({"id": 1, "name": "United Empire of Earth"})],
    );
    catalog.set(
        EntityType::Company,
        vec![
            json!({"id": 1, "name": "Drake Interplanetary", "is_vehicle_manufacturer": 1}),
            json!({"id": 2, "name": "Crusader Industries", "is_vehicle_manufacturer": 1}),
            json!({"id": 3, "name": "Tumbril Land Systems", "is_vehicle_manufacturer": 1}),
            json!({"id": 4, "name": "Klaus & Werner", "is_item_manufacturer": 1}),
            json!({"id": 5, "name": "Musashi Industrial & Starflight Concern", "nickname": "MISC", "is_vehicle_manufacturer": 1}),
        ],
    );
    catalog.set(
        EntityType::Terminal,
        vec![
            json!({"id": 100, "id_star_system": 1, "id_planet": 11, "id_city": 51, "name": "TDD - Area 18", "code": "TDA18", "type": "commodity",
                   "has_loading_dock": 1, "has_docking_port": 0, "has_freight_elevator": 1,
                   "star_system_name": "Stanton", "planet_name": "ArcCorp", "city_name": "Area 18"}),
            json!({"id": 101, "id_star_system": 1, "id_planet": 10, "id_city": 50, "name": "Lorville - Central Business District", "code": "LOCBD", "type": "commodity",
                   "has_loading_dock": 1, "has_docking_port": 0, "has_freight_elevator": 1,
                   "star_system_name": "Stanton", "planet_name": "Hurston", "city_name": "Lorville"}),
            json!({"id": 102, "id_star_system": 1, "id_planet": 12, "id_space_station": 80, "name": "Port Tressler - Admin", "code": "PTADM", "type": "commodity",
                   "has_loading_dock": 0, "has_docking_port": 1, "has_freight_elevator": 1,
                   "star_system_name": "Stanton", "planet_name": "microTech", "space_station_name": "Port Tressler"}),
            json!({"id": 103, "id_star_system": 1, "id_planet": 13, "id_moon": 30, "id_outpost": 60, "name": "Shubin Mining Facility SAL-2", "code": "SAL2", "type": "commodity",
                   "has_loading_dock": 0, "has_docking_port": 0,
                   "star_system_name": "Stanton", "planet_name": "Crusader", "moon_name": "Daymar", "outpost_name": "Shubin Mining Facility SAL-2"}),
            json!({"id": 104, "id_star_system": 2, "id_space_station": 81, "name": "Ruin Station - Admin", "code": "RUIN", "type": "commodity",
                   "has_loading_dock": 1, "has_docking_port": 1,
                   "star_system_name": "Pyro", "space_station_name": "Ruin Station"}),
            json!({"id": 105, "id_star_system": 1, "id_poi": 70, "name": "Grim HEX - Admin", "code": "GRIM", "type": "commodity",
                   "has_loading_dock": 1, "has_docking_port": 1,
                   "star_system_name": "Stanton"}),
        ],
    );
    catalog.set(
        EntityType::Commodity,
        vec![
            json!({"id": 1, "name": "Agricium", "code": "AGRI", "kind": "Metal", "price_buy": 24.5, "price_sell": 27.6, "is_buyable": 1, "is_sellable": 1, "is_available": 1}),
            json!({"id": 2, "name": "Aluminum", "code": "ALUM", "kind": "Metal", "price_buy": 1.2, "price_sell": 1.4, "is_buyable": 1, "is_sellable": 1, "is_available": 1}),
            json!({"id": 3, "name": "Gold", "code": "GOLD", "kind": "Metal", "price_buy": 5.9, "price_sell": 6.5, "is_buyable": 1, "is_sellable": 1, "is_available": 1}),
            json!({"id": 4, "name": "WiDoW", "code": "WIDO", "kind": "Drug", "price_buy": 4000.0, "price_sell": 5000.0, "is_buyable": 1, "is_sellable": 1, "is_illegal": 1, "is_available": 1}),
            json!({"id": 5, "name": "Waste", "code": "WAST", "kind": "Waste", "price_sell": 0.1, "is_buyable": 0, "is_sellable": 1, "is_available": 1}),
            json!({"id": 6, "name": "Laranite", "code": "LARA", "kind": "Mineral", "price_buy": 27.0, "price_sell": 31.0, "is_buyable": 1, "is_sellable": 1, "is_available": 1}),
        ],
    );
    catalog.set(
        EntityType::CommodityStatus,
        vec![
            json!({"code": 1, "is_buy": 1, "name": "Out of Stock", "name_short": "OOS"}),
            json!({"code": 1, "is_buy": 0, "name": "No Demand", "name_short": "ND"}),
            json!({"code": 7, "is_buy": 1, "name": "Max Inventory", "name_short": "MAX"}),
        ],
    );
    catalog.set(
        EntityType::Vehicle,
        vec![
            json!({"id": 1, "id_company": 1, "name": "Caterpillar", "name_full": "Drake Caterpillar", "scu": 576, "pad_type": "L",
                   "is_spaceship": 1, "is_cargo": 1, "company_name": "Drake Interplanetary"}),
            json!({"id": 2, "id_company": 2, "name": "C2 Hercules", "name_full": "Crusader C2 Hercules Starlifter", "scu": 696, "pad_type": "L",
                   "is_spaceship": 1, "is_cargo": 1, "is_military": 1, "company_name": "Crusader Industries"}),
            json!({"id": 3, "id_company": 1, "name": "Cutlass Black", "name_full": "Drake Cutlass Black", "scu": 46, "pad_type": "M",
                   "is_spaceship": 1, "is_cargo": 1, "is_bounty_hunting": 1, "company_name": "Drake Interplanetary"}),
            json!({"id": 4, "id_company": 3, "name": "Cyclone", "name_full": "Tumbril Cyclone", "scu": 1,
                   "is_ground_vehicle": 1, "is_racing": 1, "company_name": "Tumbril Land Systems"}),
            json!({"id": 5, "id_company": 5, "name": "Freelancer", "name_full": "MISC Freelancer", "scu": 66, "pad_type": "M",
                   "is_spaceship": 1, "is_cargo": 1, "company_name": "Musashi Industrial & Starflight Concern"}),
        ],
    );
    catalog.set(
        EntityType::Category,
        vec![
            json!({"id": 1, "type": "item", "section": "Weapons", "name": "Personal Weapons", "is_game_related": 1}),
            json!({"id": 2, "type": "item", "section": "Systems", "name": "Quantum Drives", "is_game_related": 1}),
        ],
    );
    catalog.set(
        EntityType::Item,
        vec![
            json!({"id": 1, "id_category": 1, "id_company": 4, "name": "Arrowhead Sniper Rifle", "section": "Weapons", "category": "Personal Weapons", "company_name": "Klaus & Werner", "size": "3"}),
            json!({"id": 2, "id_category": 1, "id_company": 4, "name": "Gallant Rifle", "section": "Weapons", "category": "Personal Weapons", "company_name": "Klaus & Werner", "size": "2"}),
            json!({"id": 3, "id_category": 2, "name": "Atlas", "section": "Systems", "category": "Quantum Drives", "size": "1"}),
            json!({"id": 4, "id_category": 2, "name": "Expedition", "section": "Systems", "category": "Quantum Drives", "size": "1"}),
        ],
    );
    catalog.set(
        EntityType::ItemAttribute,
        vec![
            json!({"id": 1, "id_item": 3, "id_category": 2, "item_name": "Atlas", "attribute_name": "Grade", "value": "C"}),
            json!({"id": 2, "id_item": 4, "id_category": 2, "item_name": "Expedition", "attribute_name": "Grade", "value": "A"}),
            json!({"id": 3, "id_item": 3, "id_category": 2, "item_name": "Atlas", "attribute_name": "Class", "value": "Civilian"}),
            json!({"id": 4, "id_item": 4, "id_category": 2, "item_name": "Expedition", "attribute_name": "Class", "value": "Industrial"}),
            json!({"id": 5, "id_item": 1, "id_category": 1, "item_name": "Arrowhead Sniper Rifle", "attribute_name": "Fire Rate", "value": "50", "unit": "rpm"}),
        ],
    );
    catalog.set(
        EntityType::CommodityPrice,
        vec![
            json!({"id": 1, "id_commodity": 1, "id_star_system": 1, "id_terminal": 101, "price_buy": 24.5, "scu_buy": 500.0,
                   "commodity_name": "Agricium", "terminal_name": "Lorville - Central Business District", "star_system_name": "Stanton", "planet_name": "Hurston", "city_name": "Lorville"}),
            json!({"id": 2, "id_commodity": 1, "id_star_system": 1, "id_terminal": 100, "price_sell": 27.6, "scu_sell": 800.0,
                   "commodity_name": "Agricium", "terminal_name": "TDD - Area 18", "star_system_name": "Stanton", "planet_name": "ArcCorp", "city_name": "Area 18"}),
            json!({"id": 3, "id_commodity": 1, "id_star_system": 1, "id_terminal": 103, "price_buy": 24.0, "scu_buy": 100.0,
                   "commodity_name": "Agricium", "terminal_name": "Shubin Mining Facility SAL-2", "star_system_name": "Stanton", "moon_name": "Daymar"}),
            json!({"id": 4, "id_commodity": 1, "id_star_system": 1, "id_terminal": 102, "price_sell": 27.0, "scu_sell": 200.0,
                   "commodity_name": "Agricium", "terminal_name": "Port Tressler - Admin", "star_system_name": "Stanton", "space_station_name": "Port Tressler"}),
            json!({"id": 5, "id_commodity": 6, "id_star_system": 2, "id_terminal": 104, "price_sell": 31.0, "scu_sell": 600.0,
                   "commodity_name": "Laranite", "terminal_name": "Ruin Station - Admin", "star_system_name": "Pyro", "space_station_name": "Ruin Station"}),
            json!({"id": 6, "id_commodity": 6, "id_star_system": 1, "id_terminal": 101, "price_buy": 27.0, "scu_buy": 400.0,
                   "commodity_name": "Laranite", "terminal_name": "Lorville - Central Business District", "star_system_name": "Stanton", "city_name": "Lorville"}),
        ],
    );
    catalog.set(
        EntityType::CommodityRawPrice,
        vec![json!({"id": 1, "id_commodity": 6, "id_star_system": 1, "id_terminal": 103, "price_sell": 12.0, "commodity_name": "Laranite", "terminal_name": "Shubin Mining Facility SAL-2"})],
    );
    catalog.set(
        EntityType::CommodityRoute,
        vec![
            route(1, 1, "Agricium", (101, "Lorville - Central Business District", 1, "Stanton", true), (100, "TDD - Area 18", 1, "Stanton", true), (24.5, 27.6), (500.0, 800.0), 30.0, 80),
            route(2, 3, "Gold", (102, "Port Tressler - Admin", 1, "Stanton", false), (105, "Grim HEX - Admin", 1, "Stanton", true), (5.9, 6.5), (2000.0, 3000.0), 12.0, 50),
            route(3, 6, "Laranite", (101, "Lorville - Central Business District", 1, "Stanton", true), (104, "Ruin Station - Admin", 2, "Pyro", true), (27.0, 31.0), (400.0, 600.0), 120.0, 95),
            route(4, 4, "WiDoW", (105, "Grim HEX - Admin", 1, "Stanton", true), (104, "Ruin Station - Admin", 2, "Pyro", true), (4000.0, 5000.0), (50.0, 50.0), 110.0, 70),
            route(5, 2, "Aluminum", (100, "TDD - Area 18", 1, "Stanton", true), (101, "Lorville - Central Business District", 1, "Stanton", true), (1.2, 1.4), (5000.0, 5000.0), 30.0, 20),
            route(6, 1, "Agricium", (103, "Shubin Mining Facility SAL-2", 1, "Stanton", false), (102, "Port Tressler - Admin", 1, "Stanton", false), (24.0, 27.0), (100.0, 200.0), 8.0, 60),
        ],
    );
    catalog.set(
        EntityType::ItemPrice,
        vec![
            json!({"id": 1, "id_item": 1, "id_category": 1, "id_terminal": 100, "price_buy": 4500.0, "item_name": "Arrowhead Sniper Rifle", "terminal_name": "TDD - Area 18", "star_system_name": "Stanton"}),
            json!({"id": 2, "id_item": 3, "id_category": 2, "id_terminal": 102, "price_buy": 8000.0, "item_name": "Atlas", "terminal_name": "Port Tressler - Admin", "star_system_name": "Stanton"}),
            json!({"id": 3, "id_item": 4, "id_category": 2, "id_terminal": 104, "price_buy": 21000.0, "item_name": "Expedition", "terminal_name": "Ruin Station - Admin", "star_system_name": "Pyro"}),
        ],
    );
    catalog.set(
        EntityType::FuelPrice,
        vec![json!({"id": 1, "id_commodity": 7, "id_star_system": 1, "id_terminal": 105, "price_buy": 1.1, "commodity_name": "Hydrogen Fuel", "terminal_name": "Grim HEX - Admin"})],
    );
    catalog.set(
        EntityType::VehiclePurchasePrice,
        vec![
            json!({"id": 1, "id_vehicle": 1, "id_terminal": 100, "price_buy": 3100000.0, "vehicle_name": "Caterpillar", "terminal_name": "TDD - Area 18", "star_system_name": "Stanton"}),
            json!({"id": 2, "id_vehicle": 3, "id_terminal": 101, "price_buy": 1700000.0, "vehicle_name": "Cutlass Black", "terminal_name": "Lorville - Central Business District", "star_system_name": "Stanton"}),
        ],
    );
    catalog.set(
        EntityType::VehicleRentalPrice,
        vec![json!({"id": 1, "id_vehicle": 3, "id_terminal": 101, "price_rent": 85000.0, "vehicle_name": "Cutlass Black", "terminal_name": "Lorville - Central Business District", "star_system_name": "Stanton"})],
    );

    catalog
}

/// (terminal id, terminal name, star system id, star system name, has loading dock)
type RouteEnd<'a> = (i64, &'a str, i64, &'a str, bool);

#[allow(clippy::too_many_arguments)]
fn route(
    id: i64,
    id_commodity: i64,
    commodity: &str,
    origin: RouteEnd<'_>,
    destination: RouteEnd<'_>,
    (price_origin, price_destination): (f64, f64),
    (scu_origin, scu_destination): (f64, f64),
    distance: f64,
    score: i64,
) -> Value {
    json!({
        "id": id,
        "id_commodity": id_commodity,
        "id_terminal_origin": origin.0,
        "id_terminal_destination": destination.0,
        "id_star_system_origin": origin.2,
        "id_star_system_destination": destination.2,
        "commodity_name": commodity,
        "origin_terminal_name": origin.1,
        "destination_terminal_name": destination.1,
        "origin_star_system_name": origin.3,
        "destination_star_system_name": destination.3,
        "origin_has_loading_dock": origin.4,
        "destination_has_loading_dock": destination.4,
        "price_origin": price_origin,
        "price_destination": price_destination,
        "price_margin": price_destination - price_origin,
        "price_roi": (price_destination - price_origin) / price_origin * 100.0,
        "scu_origin": scu_origin,
        "scu_destination": scu_destination,
        "distance": distance,
        "score": score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn params_filter_records() {
        let catalog = sample_catalog();
        let params = vec![("id_commodity".to_string(), "1".to_string())];
        let routes = catalog
            .fetch(EntityType::CommodityRoute.endpoint(), &params)
            .await
            .unwrap();
        assert_eq!(routes.len(), 2);
        assert_eq!(catalog.fetch_count(), 1);
    }

    #[tokio::test]
    async fn failing_endpoint() {
        let catalog = sample_catalog();
        catalog.fail(EntityType::Terminal);
        let result = catalog
            .fetch(EntityType::Terminal.endpoint(), &FetchParams::new())
            .await;
        assert!(matches!(result, Err(LoaderError::Fetch { .. })));

        catalog.recover(EntityType::Terminal);
        catalog.remove(EntityType::Terminal, 100);
        let terminals = catalog
            .fetch(EntityType::Terminal.endpoint(), &FetchParams::new())
            .await
            .unwrap();
        assert_eq!(terminals.len(), 5);
    }
}
