use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::config::ImportConfig;

/// Staleness window an entity type belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    /// Volatile observation data (prices, routes).
    Short,
    /// Moderately volatile data (item, fuel and vehicle prices).
    Mid,
    /// Near-static catalog data.
    Long,
}

impl CacheTier {
    pub fn lifetime(&self, config: &ImportConfig) -> Duration {
        let seconds = match self {
            CacheTier::Short => config.short_lifetime_seconds,
            CacheTier::Mid => config.mid_lifetime_seconds,
            CacheTier::Long => config.long_lifetime_seconds,
        };
        Duration::seconds(seconds as i64)
    }
}

/// Which rows of a parent entity type parameterize a dependent fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentSelector {
    /// Rows flagged `is_available`.
    Available,
    /// Commodities that can be both bought and sold.
    BuyableAndSellable,
    /// Every row.
    All,
}

/// A fetch that must be issued once per id of a parent entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchDependency {
    pub parent: EntityType,
    /// Request parameter that receives the parent id.
    pub param: &'static str,
    pub selector: ParentSelector,
}

/// Every catalog and observation entity type held by the store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    StarSystem,
    Planet,
    Moon,
    Orbit,
    OrbitDistance,
    City,
    Outpost,
    PointOfInterest,
    SpaceStation,
    Faction,
    Company,
    Terminal,
    Commodity,
    CommodityStatus,
    Vehicle,
    Category,
    Item,
    ItemAttribute,
    CommodityPrice,
    CommodityRawPrice,
    CommodityRoute,
    ItemPrice,
    FuelPrice,
    VehiclePurchasePrice,
    VehicleRentalPrice,
}

impl EntityType {
    pub const ALL: [EntityType; 25] = [
        EntityType::StarSystem,
        EntityType::Planet,
        EntityType::Moon,
        EntityType::Orbit,
        EntityType::OrbitDistance,
        EntityType::City,
        EntityType::Outpost,
        EntityType::PointOfInterest,
        EntityType::SpaceStation,
        EntityType::Faction,
        EntityType::Company,
        EntityType::Terminal,
        EntityType::Commodity,
        EntityType::CommodityStatus,
        EntityType::Vehicle,
        EntityType::Category,
        EntityType::Item,
        EntityType::ItemAttribute,
        EntityType::CommodityPrice,
        EntityType::CommodityRawPrice,
        EntityType::CommodityRoute,
        EntityType::ItemPrice,
        EntityType::FuelPrice,
        EntityType::VehiclePurchasePrice,
        EntityType::VehicleRentalPrice,
    ];

    /// Store table holding this entity type.
    pub fn table(&self) -> &'static str {
        self.schema().name
    }

    /// Remote catalog endpoint serving this entity type.
    pub fn endpoint(&self) -> &'static str {
        match self {
            EntityType::StarSystem => "star_systems",
            EntityType::Planet => "planets",
            EntityType::Moon => "moons",
            EntityType::Orbit => "orbits",
            EntityType::OrbitDistance => "orbits_distances",
            EntityType::City => "cities",
            EntityType::Outpost => "outposts",
            EntityType::PointOfInterest => "poi",
            EntityType::SpaceStation => "space_stations",
            EntityType::Faction => "factions",
            EntityType::Company => "companies",
            EntityType::Terminal => "terminals",
            EntityType::Commodity => "commodities",
            EntityType::CommodityStatus => "commodities_status",
            EntityType::Vehicle => "vehicles",
            EntityType::Category => "categories",
            EntityType::Item => "items",
            EntityType::ItemAttribute => "items_attributes",
            EntityType::CommodityPrice => "commodities_prices_all",
            EntityType::CommodityRawPrice => "commodities_raw_prices_all",
            EntityType::CommodityRoute => "commodities_routes",
            EntityType::ItemPrice => "items_prices_all",
            EntityType::FuelPrice => "fuel_prices_all",
            EntityType::VehiclePurchasePrice => "vehicles_purchases_prices_all",
            EntityType::VehicleRentalPrice => "vehicles_rentals_prices_all",
        }
    }

    pub fn tier(&self) -> CacheTier {
        match self {
            EntityType::CommodityPrice
            | EntityType::CommodityRawPrice
            | EntityType::CommodityRoute => CacheTier::Short,
            EntityType::ItemPrice
            | EntityType::FuelPrice
            | EntityType::VehiclePurchasePrice
            | EntityType::VehicleRentalPrice => CacheTier::Mid,
            _ => CacheTier::Long,
        }
    }

    /// Parent entity type whose ids parameterize this type's fetch, if any.
    pub fn fetch_dependency(&self) -> Option<FetchDependency> {
        match self {
            EntityType::CommodityRoute => Some(FetchDependency {
                parent: EntityType::Commodity,
                param: "id_commodity",
                selector: ParentSelector::BuyableAndSellable,
            }),
            EntityType::OrbitDistance => Some(FetchDependency {
                parent: EntityType::StarSystem,
                param: "id_star_system",
                selector: ParentSelector::Available,
            }),
            EntityType::Item | EntityType::ItemAttribute => Some(FetchDependency {
                parent: EntityType::Category,
                param: "id_category",
                selector: ParentSelector::All,
            }),
            _ => None,
        }
    }

    /// Whether the table carries the user-owned `is_blacklisted` flag.
    pub fn is_blacklistable(&self) -> bool {
        self.schema().blacklistable
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .iter()
            .copied()
            .find(|ty| ty.table() == s || ty.endpoint() == s)
            .ok_or_else(|| format!("Unknown entity type: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_follow_volatility() {
        assert_eq!(EntityType::CommodityPrice.tier(), CacheTier::Short);
        assert_eq!(EntityType::CommodityRoute.tier(), CacheTier::Short);
        assert_eq!(EntityType::FuelPrice.tier(), CacheTier::Mid);
        assert_eq!(EntityType::Terminal.tier(), CacheTier::Long);
    }

    #[test]
    fn lifetime_reads_config() {
        let config = ImportConfig::default();
        assert_eq!(CacheTier::Short.lifetime(&config), Duration::hours(1));
        assert_eq!(CacheTier::Mid.lifetime(&config), Duration::hours(24));
        assert_eq!(CacheTier::Long.lifetime(&config), Duration::days(14));
    }

    #[test]
    fn routes_depend_on_tradable_commodities() {
        let dep = EntityType::CommodityRoute.fetch_dependency().unwrap();
        assert_eq!(dep.parent, EntityType::Commodity);
        assert_eq!(dep.param, "id_commodity");
        assert_eq!(dep.selector, ParentSelector::BuyableAndSellable);
        assert!(EntityType::Commodity.fetch_dependency().is_none());
    }

    #[test]
    fn parse_from_table_or_endpoint() {
        assert_eq!("terminals".parse::<EntityType>(), Ok(EntityType::Terminal));
        assert_eq!("poi".parse::<EntityType>(), Ok(EntityType::PointOfInterest));
        assert!("spaceships".parse::<EntityType>().is_err());
    }

    #[test]
    fn all_is_exhaustive_and_unique() {
        let mut tables: Vec<_> = EntityType::ALL.iter().map(|t| t.table()).collect();
        tables.sort();
        tables.dedup();
        assert_eq!(tables.len(), EntityType::ALL.len());
    }
}
