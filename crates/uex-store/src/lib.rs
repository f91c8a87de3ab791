pub mod catalog;
pub mod error;
pub mod memory;
pub mod query;
pub mod store;

pub use catalog::{Catalog, CommodityFilter, CompanyFilter, ItemFilter, VehicleFilter, VehicleKind};
pub use error::StoreError;
pub use memory::NameCache;
pub use query::{Expr, Op, Operand, Param, Predicate, PredicateGroup, Query};
pub use store::{Record, Store};
