//! Typed entity records hydrated from store rows.
//!
//! Store rows arrive as JSON maps with NULL columns omitted, so every optional
//! attribute is `#[serde(default)]`. Boolean columns are stored as 0/1.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::EntityType;

/// Deserialize a 0/1 (or boolean, or "1"/"0") column into `bool`.
pub mod flag {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Bool(b) => b,
            Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
            Value::String(s) => matches!(s.trim(), "1" | "true" | "yes"),
            _ => false,
        })
    }
}

/// Role flags a vehicle may carry; the column for role `r` is `is_{r}`.
pub const VEHICLE_ROLES: [&str; 12] = [
    "cargo",
    "mining",
    "salvage",
    "exploration",
    "industrial",
    "military",
    "racing",
    "passenger",
    "medical",
    "refuel",
    "repair",
    "bounty_hunting",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StarSystem {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub is_available: bool,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub is_default: bool,
    #[serde(default)]
    pub faction_name: Option<String>,
    #[serde(default)]
    pub jurisdiction_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Commodity {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub price_buy: f64,
    #[serde(default)]
    pub price_sell: f64,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub is_available: bool,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub is_buyable: bool,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub is_sellable: bool,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub is_illegal: bool,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub is_raw: bool,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub is_blacklisted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Terminal {
    pub id: i64,
    #[serde(default)]
    pub id_star_system: Option<i64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub is_available: bool,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub has_loading_dock: bool,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub has_docking_port: bool,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub has_freight_elevator: bool,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub is_blacklisted: bool,
    #[serde(default)]
    pub star_system_name: Option<String>,
    #[serde(default)]
    pub planet_name: Option<String>,
    #[serde(default)]
    pub orbit_name: Option<String>,
    #[serde(default)]
    pub moon_name: Option<String>,
    #[serde(default)]
    pub space_station_name: Option<String>,
    #[serde(default)]
    pub outpost_name: Option<String>,
    #[serde(default)]
    pub city_name: Option<String>,
    #[serde(default)]
    pub faction_name: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
}

impl Terminal {
    /// Every location name this terminal can be addressed by: its own names
    /// plus the denormalized names of the places containing it.
    pub fn location_names(&self) -> Vec<&str> {
        let mut names = vec![self.name.as_str()];
        let parents = [
            &self.nickname,
            &self.star_system_name,
            &self.planet_name,
            &self.orbit_name,
            &self.moon_name,
            &self.space_station_name,
            &self.outpost_name,
            &self.city_name,
        ];
        names.extend(parents.into_iter().flatten().map(|s| s.as_str()));
        names.retain(|n| !n.is_empty());
        names
    }

    /// Whether any of this terminal's location names is in `filter` (case-insensitive).
    pub fn is_located_in(&self, filter: &[String]) -> bool {
        self.location_names()
            .iter()
            .any(|name| filter.iter().any(|f| f.eq_ignore_ascii_case(name)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vehicle {
    pub id: i64,
    #[serde(default)]
    pub id_company: Option<i64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub name_full: Option<String>,
    #[serde(default)]
    pub scu: i64,
    #[serde(default)]
    pub crew: Option<String>,
    #[serde(default)]
    pub pad_type: Option<String>,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub is_spaceship: bool,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub is_ground_vehicle: bool,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub is_cargo: bool,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub is_mining: bool,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub is_salvage: bool,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub is_exploration: bool,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub is_industrial: bool,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub is_military: bool,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub is_racing: bool,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub is_passenger: bool,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub is_medical: bool,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub is_refuel: bool,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub is_repair: bool,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub is_bounty_hunting: bool,
    #[serde(default)]
    pub company_name: Option<String>,
}

impl Vehicle {
    /// Canonical display string used for matching and output.
    pub fn display_name(&self) -> &str {
        self.name_full
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.name)
    }

    pub fn has_role(&self, role: &str) -> bool {
        match role {
            "cargo" => self.is_cargo,
            "mining" => self.is_mining,
            "salvage" => self.is_salvage,
            "exploration" => self.is_exploration,
            "industrial" => self.is_industrial,
            "military" => self.is_military,
            "racing" => self.is_racing,
            "passenger" => self.is_passenger,
            "medical" => self.is_medical,
            "refuel" => self.is_refuel,
            "repair" => self.is_repair,
            "bounty_hunting" => self.is_bounty_hunting,
            _ => false,
        }
    }

    pub fn roles(&self) -> Vec<&'static str> {
        VEHICLE_ROLES
            .iter()
            .copied()
            .filter(|r| self.has_role(r))
            .collect()
    }

    /// Ground vehicles can only load and unload at terminals with a loading dock.
    pub fn requires_loading_dock(&self) -> bool {
        self.is_ground_vehicle
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Company {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub is_item_manufacturer: bool,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub is_vehicle_manufacturer: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: i64,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: i64,
    #[serde(default)]
    pub id_category: Option<i64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub vehicle_name: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemAttribute {
    pub id: i64,
    #[serde(default)]
    pub id_item: Option<i64>,
    #[serde(default)]
    pub item_name: Option<String>,
    #[serde(default)]
    pub attribute_name: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommodityPrice {
    pub id: i64,
    #[serde(default)]
    pub id_commodity: Option<i64>,
    #[serde(default)]
    pub id_terminal: Option<i64>,
    #[serde(default)]
    pub price_buy: f64,
    #[serde(default)]
    pub price_sell: f64,
    #[serde(default)]
    pub scu_buy: f64,
    #[serde(default)]
    pub scu_sell_stock: f64,
    #[serde(default)]
    pub scu_sell: f64,
    #[serde(default)]
    pub commodity_name: Option<String>,
    #[serde(default)]
    pub terminal_name: Option<String>,
    #[serde(default)]
    pub star_system_name: Option<String>,
    #[serde(default)]
    pub planet_name: Option<String>,
    #[serde(default)]
    pub orbit_name: Option<String>,
    #[serde(default)]
    pub space_station_name: Option<String>,
    #[serde(default)]
    pub city_name: Option<String>,
    #[serde(default)]
    pub outpost_name: Option<String>,
}

impl CommodityPrice {
    /// Location names carried by this observation, for location filtering.
    pub fn location_names(&self) -> Vec<&str> {
        [
            &self.terminal_name,
            &self.star_system_name,
            &self.planet_name,
            &self.orbit_name,
            &self.space_station_name,
            &self.city_name,
            &self.outpost_name,
        ]
        .into_iter()
        .flatten()
        .map(|s| s.as_str())
        .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemPrice {
    pub id: i64,
    #[serde(default)]
    pub id_item: Option<i64>,
    #[serde(default)]
    pub id_terminal: Option<i64>,
    #[serde(default)]
    pub price_buy: f64,
    #[serde(default)]
    pub price_sell: f64,
    #[serde(default)]
    pub item_name: Option<String>,
    #[serde(default)]
    pub terminal_name: Option<String>,
    #[serde(default)]
    pub star_system_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VehiclePurchasePrice {
    pub id: i64,
    #[serde(default)]
    pub id_vehicle: Option<i64>,
    #[serde(default)]
    pub price_buy: f64,
    #[serde(default)]
    pub terminal_name: Option<String>,
    #[serde(default)]
    pub star_system_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VehicleRentalPrice {
    pub id: i64,
    #[serde(default)]
    pub id_vehicle: Option<i64>,
    #[serde(default)]
    pub price_rent: f64,
    #[serde(default)]
    pub terminal_name: Option<String>,
    #[serde(default)]
    pub star_system_name: Option<String>,
}

/// A route-candidate row, plus the computed columns the optimizer adds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommodityRoute {
    pub id: i64,
    #[serde(default)]
    pub id_commodity: Option<i64>,
    #[serde(default)]
    pub id_star_system_origin: Option<i64>,
    #[serde(default)]
    pub id_star_system_destination: Option<i64>,
    #[serde(default)]
    pub id_terminal_origin: Option<i64>,
    #[serde(default)]
    pub id_terminal_destination: Option<i64>,
    #[serde(default)]
    pub price_origin: f64,
    #[serde(default)]
    pub price_destination: f64,
    #[serde(default)]
    pub price_margin: f64,
    #[serde(default)]
    pub scu_origin: f64,
    #[serde(default)]
    pub scu_destination: f64,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub score: i64,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub origin_has_loading_dock: bool,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub origin_has_docking_port: bool,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub origin_has_freight_elevator: bool,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub destination_has_loading_dock: bool,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub destination_has_docking_port: bool,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub destination_has_freight_elevator: bool,
    #[serde(default)]
    pub commodity_name: Option<String>,
    #[serde(default)]
    pub origin_star_system_name: Option<String>,
    #[serde(default)]
    pub origin_terminal_name: Option<String>,
    #[serde(default)]
    pub destination_star_system_name: Option<String>,
    #[serde(default)]
    pub destination_terminal_name: Option<String>,
    /// Tradable volume after cargo, budget, stock and demand caps.
    #[serde(default)]
    pub scu_cargo: Option<f64>,
    #[serde(default)]
    pub profit_estimated: Option<f64>,
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub same_system: bool,
}

/// Bookkeeping for the most recent import of one entity type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportMeta {
    pub entity: EntityType,
    pub run_id: i64,
    pub imported_at: DateTime<Utc>,
    pub row_count: i64,
    pub duration_ms: i64,
}
