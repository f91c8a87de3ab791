pub mod config;
pub mod entity;
pub mod readiness;
pub mod records;
pub mod schema;

pub use config::{
    ApiConfig, BlacklistConfig, ConfigError, ImportConfig, RouteConfig, StoreConfig, UexConfig,
    ValidationConfig,
};
pub use entity::{CacheTier, EntityType, FetchDependency, ParentSelector};
pub use readiness::Readiness;
pub use records::{
    Category, Commodity, CommodityPrice, CommodityRoute, Company, ImportMeta, Item, ItemAttribute,
    ItemPrice, StarSystem, Terminal, Vehicle, VehiclePurchasePrice, VehicleRentalPrice,
};
pub use schema::{Column, ColumnType, TableSchema, BLACKLIST_COLUMN, RUN_ID_COLUMN};
