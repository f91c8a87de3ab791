//! Typed accessors over the query layer, one group per entity type.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;
use uex_models::{
    Category, Commodity, CommodityPrice, Company, EntityType, Item, ItemAttribute, ItemPrice,
    StarSystem, Terminal, Vehicle, VehiclePurchasePrice, VehicleRentalPrice,
};

use crate::error::StoreError;
use crate::memory::NameCache;
use crate::query::{Op, Operand, Predicate, Query};
use crate::store::Store;

/// Entity types whose `name` is a location a terminal can sit in.
pub const LOCATION_ENTITIES: [EntityType; 9] = [
    EntityType::StarSystem,
    EntityType::Planet,
    EntityType::Moon,
    EntityType::Orbit,
    EntityType::City,
    EntityType::Outpost,
    EntityType::PointOfInterest,
    EntityType::SpaceStation,
    EntityType::Terminal,
];

/// Returned by parent lookups when the referenced row is gone.
pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CommodityFilter {
    /// Only commodities that can be both bought and sold.
    pub buyable_and_sellable: bool,
    pub exclude_illegal: bool,
    pub exclude_blacklisted: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum VehicleKind {
    #[default]
    Any,
    Spaceship,
    GroundVehicle,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VehicleFilter {
    pub kind: VehicleKind,
    /// Role name from `VEHICLE_ROLES`; filters on its `is_<role>` column.
    pub role: Option<String>,
    pub company: Option<String>,
    /// Minimum cargo capacity in SCU.
    pub min_scu: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CompanyFilter {
    pub vehicle_manufacturer: bool,
    pub item_manufacturer: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ItemFilter {
    pub names: Vec<String>,
    pub category_ids: Vec<i64>,
}

/// Read-side view of the store used by the validator, optimizer and tools.
pub struct Catalog {
    store: Arc<Store>,
    names: NameCache,
}

impl Catalog {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            names: NameCache::new(256, Duration::from_secs(86_400)),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Candidate names memoized under `key` until the next completed import.
    pub async fn cached_names<F>(&self, key: &str, load: F) -> Result<Arc<Vec<String>>, StoreError>
    where
        F: FnOnce(&Self) -> Result<Vec<String>, StoreError>,
    {
        if let Some(names) = self.names.get(key).await {
            return Ok(names);
        }
        let names = Arc::new(load(self)?);
        debug!(key, count = names.len(), "Caching candidate names");
        self.names.insert(key.to_string(), names.clone()).await;
        Ok(names)
    }

    /// Drop every memoized candidate list.
    pub fn invalidate(&self) {
        self.names.invalidate_all();
    }

    // -------------------------------------------------------------------------
    // Locations
    // -------------------------------------------------------------------------

    pub fn star_systems(&self, available_only: bool) -> Result<Vec<StarSystem>, StoreError> {
        let mut query = Query::new(EntityType::StarSystem).order_asc("name");
        if available_only {
            query = query.filter(Predicate::eq("is_available", true));
        }
        self.store.query_as(&query)
    }

    pub fn star_system_by_name(&self, name: &str) -> Result<Option<StarSystem>, StoreError> {
        first(
            self.store
                .query_as(&Query::new(EntityType::StarSystem).filter(Predicate::eq("name", name))),
        )
    }

    /// Display name of a star system, or `"unknown"` for a dangling id.
    pub fn star_system_name(&self, id: i64) -> Result<String, StoreError> {
        let system: Option<StarSystem> = first(
            self.store
                .query_as(&Query::new(EntityType::StarSystem).filter(Predicate::eq("id", id))),
        )?;
        Ok(system.map_or_else(|| UNKNOWN.to_string(), |s| s.name))
    }

    pub fn terminals(&self) -> Result<Vec<Terminal>, StoreError> {
        self.store
            .query_as(&Query::new(EntityType::Terminal).order_asc("name"))
    }

    pub fn terminal_by_name(&self, name: &str) -> Result<Option<Terminal>, StoreError> {
        first(
            self.store
                .query_as(&Query::new(EntityType::Terminal).filter(Predicate::eq("name", name))),
        )
    }

    /// Every distinct location name, sorted.
    pub fn location_names(&self) -> Result<Vec<String>, StoreError> {
        let mut names = BTreeSet::new();
        for entity in LOCATION_ENTITIES {
            for record in self.store.query(&Query::new(entity))? {
                if let Some(name) = record.get("name").and_then(Value::as_str) {
                    if !name.is_empty() {
                        names.insert(name.to_string());
                    }
                }
            }
        }
        Ok(names.into_iter().collect())
    }

    // -------------------------------------------------------------------------
    // Goods
    // -------------------------------------------------------------------------

    pub fn commodities(&self, filter: &CommodityFilter) -> Result<Vec<Commodity>, StoreError> {
        let mut query = Query::new(EntityType::Commodity).order_asc("name");
        if filter.buyable_and_sellable {
            query = query
                .filter(Predicate::eq("is_buyable", true))
                .filter(Predicate::eq("is_sellable", true));
        }
        if filter.exclude_illegal {
            query = query.filter(Predicate::eq("is_illegal", false));
        }
        if filter.exclude_blacklisted {
            query = query.filter(Predicate::eq("is_blacklisted", false));
        }
        self.store.query_as(&query)
    }

    pub fn commodity_by_name(&self, name: &str) -> Result<Option<Commodity>, StoreError> {
        first(
            self.store
                .query_as(&Query::new(EntityType::Commodity).filter(Predicate::eq("name", name))),
        )
    }

    /// Ids of commodities flagged blacklisted, plus illegal ones unless they are allowed.
    pub fn excluded_commodity_ids(&self, allow_illegal: bool) -> Result<Vec<i64>, StoreError> {
        let mut terms = vec![("is_blacklisted".to_string(), Operand::Value(true.into()))];
        if !allow_illegal {
            terms.push(("is_illegal".to_string(), Operand::Value(true.into())));
        }
        let commodities: Vec<Commodity> = self
            .store
            .query_as(&Query::new(EntityType::Commodity).any(Op::Eq, terms))?;
        Ok(commodities.into_iter().map(|c| c.id).collect())
    }

    pub fn commodity_prices(
        &self,
        commodity_id: i64,
        star_system: Option<&str>,
    ) -> Result<Vec<CommodityPrice>, StoreError> {
        let mut query = Query::new(EntityType::CommodityPrice)
            .filter(Predicate::eq("id_commodity", commodity_id));
        if let Some(system) = star_system {
            query = query.filter(Predicate::eq("star_system_name", system));
        }
        self.store.query_as(&query)
    }

    pub fn categories(&self) -> Result<Vec<Category>, StoreError> {
        self.store
            .query_as(&Query::new(EntityType::Category).order_asc("name"))
    }

    pub fn items(&self, filter: &ItemFilter) -> Result<Vec<Item>, StoreError> {
        let mut query = Query::new(EntityType::Item).order_asc("name");
        if !filter.names.is_empty() {
            query = query.filter(Predicate::is_in("name", filter.names.clone()));
        }
        if !filter.category_ids.is_empty() {
            query = query.filter(Predicate::is_in("id_category", filter.category_ids.clone()));
        }
        self.store.query_as(&query)
    }

    pub fn item_attributes(&self, item_ids: &[i64]) -> Result<Vec<ItemAttribute>, StoreError> {
        self.store.query_as(
            &Query::new(EntityType::ItemAttribute)
                .filter(Predicate::is_in("id_item", item_ids.iter().copied())),
        )
    }

    /// Distinct attribute names across all items, sorted.
    pub fn item_attribute_names(&self) -> Result<Vec<String>, StoreError> {
        let attributes: Vec<ItemAttribute> =
            self.store.query_as(&Query::new(EntityType::ItemAttribute))?;
        let names: BTreeSet<String> = attributes
            .into_iter()
            .map(|a| a.attribute_name)
            .filter(|n| !n.is_empty())
            .collect();
        Ok(names.into_iter().collect())
    }

    pub fn item_prices(&self, item_ids: &[i64]) -> Result<Vec<ItemPrice>, StoreError> {
        self.store.query_as(
            &Query::new(EntityType::ItemPrice)
                .filter(Predicate::is_in("id_item", item_ids.iter().copied()))
                .order_asc("price_buy"),
        )
    }

    // -------------------------------------------------------------------------
    // Vehicles and organisations
    // -------------------------------------------------------------------------

    pub fn vehicles(&self, filter: &VehicleFilter) -> Result<Vec<Vehicle>, StoreError> {
        let mut query = Query::new(EntityType::Vehicle).order_asc("name");
        match filter.kind {
            VehicleKind::Any => {}
            VehicleKind::Spaceship => query = query.filter(Predicate::eq("is_spaceship", true)),
            VehicleKind::GroundVehicle => {
                query = query.filter(Predicate::eq("is_ground_vehicle", true))
            }
        }
        if let Some(role) = &filter.role {
            query = query.filter(Predicate::eq(format!("is_{role}"), true));
        }
        if let Some(company) = &filter.company {
            query = query.filter(Predicate::eq("company_name", company.as_str()));
        }
        if let Some(min_scu) = filter.min_scu {
            query = query.filter(Predicate::ge("scu", min_scu));
        }
        self.store.query_as(&query)
    }

    /// Look up a vehicle by its short or full name.
    pub fn vehicle_by_name(&self, name: &str) -> Result<Option<Vehicle>, StoreError> {
        first(self.store.query_as(&Query::new(EntityType::Vehicle).any(
            Op::Eq,
            vec![
                ("name_full".to_string(), Operand::Value(name.into())),
                ("name".to_string(), Operand::Value(name.into())),
            ],
        )))
    }

    pub fn vehicle_purchase_prices(
        &self,
        vehicle_id: i64,
    ) -> Result<Vec<VehiclePurchasePrice>, StoreError> {
        self.store.query_as(
            &Query::new(EntityType::VehiclePurchasePrice)
                .filter(Predicate::eq("id_vehicle", vehicle_id))
                .order_asc("price_buy"),
        )
    }

    pub fn vehicle_rental_prices(
        &self,
        vehicle_id: i64,
    ) -> Result<Vec<VehicleRentalPrice>, StoreError> {
        self.store.query_as(
            &Query::new(EntityType::VehicleRentalPrice)
                .filter(Predicate::eq("id_vehicle", vehicle_id))
                .order_asc("price_rent"),
        )
    }

    pub fn companies(&self, filter: &CompanyFilter) -> Result<Vec<Company>, StoreError> {
        let mut query = Query::new(EntityType::Company).order_asc("name");
        if filter.vehicle_manufacturer {
            query = query.filter(Predicate::eq("is_vehicle_manufacturer", true));
        }
        if filter.item_manufacturer {
            query = query.filter(Predicate::eq("is_item_manufacturer", true));
        }
        self.store.query_as(&query)
    }
}

fn first<T>(rows: Result<Vec<T>, StoreError>) -> Result<Option<T>, StoreError> {
    Ok(rows?.into_iter().next())
}
