//! Table schema definitions for every entity type held by the store.
//!
//! Remote records are flat JSON objects whose keys are the column names below.
//! Parent display names (`star_system_name`, `terminal_name`, ...) are stored on
//! the child rows so filtering and display never need a join.

use crate::entity::EntityType;

/// Bookkeeping column tagging each row with the import run that last wrote it.
pub const RUN_ID_COLUMN: &str = "uex_run_id";

/// User-owned flag, restored from the blacklist files after every import.
pub const BLACKLIST_COLUMN: &str = "is_blacklisted";

/// One row per entity type describing its most recent import.
pub const IMPORT_META_DDL: &str = "\
CREATE TABLE IF NOT EXISTS import_meta (
    entity       TEXT PRIMARY KEY,
    run_id       INTEGER NOT NULL,
    imported_at  TEXT NOT NULL,
    row_count    INTEGER NOT NULL,
    duration_ms  INTEGER NOT NULL
);
";

/// Free-form key/value pairs (last-seen plugin and catalog versions).
pub const SETTINGS_DDL: &str = "\
CREATE TABLE IF NOT EXISTS settings (
    key    TEXT PRIMARY KEY,
    value  TEXT NOT NULL
);
";

/// Column data type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    /// Stored as 0/1 integer
    Boolean,
}

impl ColumnType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Integer | ColumnType::Boolean => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }
}

/// Column definition
#[derive(Debug, Clone)]
pub struct Column {
    pub name: &'static str,
    pub col_type: ColumnType,
}

impl Column {
    pub const fn int(name: &'static str) -> Self {
        Self {
            name,
            col_type: ColumnType::Integer,
        }
    }

    pub const fn real(name: &'static str) -> Self {
        Self {
            name,
            col_type: ColumnType::Real,
        }
    }

    pub const fn text(name: &'static str) -> Self {
        Self {
            name,
            col_type: ColumnType::Text,
        }
    }

    pub const fn flag(name: &'static str) -> Self {
        Self {
            name,
            col_type: ColumnType::Boolean,
        }
    }
}

/// Table schema definition
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [Column],
    /// Identity key; most tables use `id`, a few a composite key.
    pub key: &'static [&'static str],
    /// Adds the user-owned `is_blacklisted` column.
    pub blacklistable: bool,
}

impl TableSchema {
    /// Look up a remote-owned column.
    pub fn column(&self, name: &str) -> Option<&'static Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether `name` is a column of the stored table, bookkeeping columns included.
    pub fn has_column(&self, name: &str) -> bool {
        name == RUN_ID_COLUMN
            || (self.blacklistable && name == BLACKLIST_COLUMN)
            || self.column(name).is_some()
    }

    /// Columns referencing parent entities (`id_*`), indexed for filtering.
    pub fn foreign_id_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns
            .iter()
            .map(|c| c.name)
            .filter(|name| name.starts_with("id_"))
    }

    pub fn create_table_sql(&self) -> String {
        let mut lines: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("    {} {}", c.name, c.col_type.sql_type()))
            .collect();
        lines.push(format!("    {RUN_ID_COLUMN} INTEGER NOT NULL DEFAULT 0"));
        if self.blacklistable {
            lines.push(format!("    {BLACKLIST_COLUMN} INTEGER NOT NULL DEFAULT 0"));
        }
        lines.push(format!("    PRIMARY KEY ({})", self.key.join(", ")));

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
            self.name,
            lines.join(",\n")
        )
    }

    pub fn create_index_sql(&self) -> Vec<String> {
        let mut indexes = vec![format!(
            "CREATE INDEX IF NOT EXISTS idx_{name}_{RUN_ID_COLUMN} ON {name}({RUN_ID_COLUMN})",
            name = self.name
        )];
        for column in self.foreign_id_columns() {
            indexes.push(format!(
                "CREATE INDEX IF NOT EXISTS idx_{name}_{column} ON {name}({column})",
                name = self.name
            ));
        }
        indexes
    }
}

impl EntityType {
    pub fn schema(&self) -> &'static TableSchema {
        match self {
            EntityType::StarSystem => &STAR_SYSTEMS,
            EntityType::Planet => &PLANETS,
            EntityType::Moon => &MOONS,
            EntityType::Orbit => &ORBITS,
            EntityType::OrbitDistance => &ORBIT_DISTANCES,
            EntityType::City => &CITIES,
            EntityType::Outpost => &OUTPOSTS,
            EntityType::PointOfInterest => &POINTS_OF_INTEREST,
            EntityType::SpaceStation => &SPACE_STATIONS,
            EntityType::Faction => &FACTIONS,
            EntityType::Company => &COMPANIES,
            EntityType::Terminal => &TERMINALS,
            EntityType::Commodity => &COMMODITIES,
            EntityType::CommodityStatus => &COMMODITY_STATUSES,
            EntityType::Vehicle => &VEHICLES,
            EntityType::Category => &CATEGORIES,
            EntityType::Item => &ITEMS,
            EntityType::ItemAttribute => &ITEM_ATTRIBUTES,
            EntityType::CommodityPrice => &COMMODITY_PRICES,
            EntityType::CommodityRawPrice => &COMMODITY_RAW_PRICES,
            EntityType::CommodityRoute => &COMMODITY_ROUTES,
            EntityType::ItemPrice => &ITEM_PRICES,
            EntityType::FuelPrice => &FUEL_PRICES,
            EntityType::VehiclePurchasePrice => &VEHICLE_PURCHASE_PRICES,
            EntityType::VehicleRentalPrice => &VEHICLE_RENTAL_PRICES,
        }
    }
}

// =============================================================================
// Locations
// =============================================================================

pub static STAR_SYSTEMS: TableSchema = TableSchema {
    name: "star_systems",
    columns: &[
        Column::int("id"),
        Column::int("id_faction"),
        Column::text("name"),
        Column::text("code"),
        Column::flag("is_available"),
        Column::flag("is_visible"),
        Column::flag("is_default"),
        Column::text("faction_name"),
        Column::text("jurisdiction_name"),
        Column::int("date_modified"),
    ],
    key: &["id"],
    blacklistable: false,
};

pub static PLANETS: TableSchema = TableSchema {
    name: "planets",
    columns: &[
        Column::int("id"),
        Column::int("id_star_system"),
        Column::int("id_faction"),
        Column::text("name"),
        Column::text("name_origin"),
        Column::text("code"),
        Column::flag("is_available"),
        Column::flag("is_visible"),
        Column::text("star_system_name"),
        Column::text("faction_name"),
        Column::text("jurisdiction_name"),
        Column::int("date_modified"),
    ],
    key: &["id"],
    blacklistable: false,
};

pub static MOONS: TableSchema = TableSchema {
    name: "moons",
    columns: &[
        Column::int("id"),
        Column::int("id_star_system"),
        Column::int("id_planet"),
        Column::int("id_orbit"),
        Column::int("id_faction"),
        Column::text("name"),
        Column::text("code"),
        Column::flag("is_available"),
        Column::flag("is_visible"),
        Column::text("star_system_name"),
        Column::text("planet_name"),
        Column::text("orbit_name"),
        Column::text("faction_name"),
        Column::int("date_modified"),
    ],
    key: &["id"],
    blacklistable: false,
};

pub static ORBITS: TableSchema = TableSchema {
    name: "orbits",
    columns: &[
        Column::int("id"),
        Column::int("id_star_system"),
        Column::int("id_faction"),
        Column::text("name"),
        Column::text("name_origin"),
        Column::text("code"),
        Column::flag("is_available"),
        Column::flag("is_visible"),
        Column::flag("is_planet"),
        Column::flag("is_lagrange"),
        Column::flag("is_man_made"),
        Column::text("star_system_name"),
        Column::text("faction_name"),
        Column::int("date_modified"),
    ],
    key: &["id"],
    blacklistable: false,
};

pub static ORBIT_DISTANCES: TableSchema = TableSchema {
    name: "orbit_distances",
    columns: &[
        Column::int("id_star_system"),
        Column::int("id_orbit_origin"),
        Column::int("id_orbit_destination"),
        Column::real("distance"),
        Column::text("star_system_name"),
        Column::text("orbit_origin_name"),
        Column::text("orbit_destination_name"),
        Column::int("date_modified"),
    ],
    key: &["id_orbit_origin", "id_orbit_destination"],
    blacklistable: false,
};

pub static CITIES: TableSchema = TableSchema {
    name: "cities",
    columns: &[
        Column::int("id"),
        Column::int("id_star_system"),
        Column::int("id_planet"),
        Column::int("id_orbit"),
        Column::int("id_moon"),
        Column::int("id_faction"),
        Column::text("name"),
        Column::text("code"),
        Column::flag("is_available"),
        Column::flag("is_visible"),
        Column::flag("is_armistice"),
        Column::flag("is_landable"),
        Column::flag("has_trade_terminal"),
        Column::flag("has_loading_dock"),
        Column::flag("has_docking_port"),
        Column::flag("has_freight_elevator"),
        Column::text("star_system_name"),
        Column::text("planet_name"),
        Column::text("orbit_name"),
        Column::text("moon_name"),
        Column::text("faction_name"),
        Column::int("date_modified"),
    ],
    key: &["id"],
    blacklistable: false,
};

pub static OUTPOSTS: TableSchema = TableSchema {
    name: "outposts",
    columns: &[
        Column::int("id"),
        Column::int("id_star_system"),
        Column::int("id_planet"),
        Column::int("id_orbit"),
        Column::int("id_moon"),
        Column::int("id_faction"),
        Column::text("name"),
        Column::text("nickname"),
        Column::flag("is_available"),
        Column::flag("is_visible"),
        Column::flag("is_armistice"),
        Column::flag("has_trade_terminal"),
        Column::flag("has_loading_dock"),
        Column::text("star_system_name"),
        Column::text("planet_name"),
        Column::text("orbit_name"),
        Column::text("moon_name"),
        Column::text("faction_name"),
        Column::int("date_modified"),
    ],
    key: &["id"],
    blacklistable: false,
};

pub static POINTS_OF_INTEREST: TableSchema = TableSchema {
    name: "points_of_interest",
    columns: &[
        Column::int("id"),
        Column::int("id_star_system"),
        Column::int("id_planet"),
        Column::int("id_orbit"),
        Column::int("id_moon"),
        Column::int("id_space_station"),
        Column::int("id_city"),
        Column::int("id_outpost"),
        Column::int("id_faction"),
        Column::text("name"),
        Column::text("nickname"),
        Column::flag("is_available"),
        Column::flag("is_visible"),
        Column::flag("is_armistice"),
        Column::flag("has_trade_terminal"),
        Column::text("star_system_name"),
        Column::text("planet_name"),
        Column::text("orbit_name"),
        Column::text("moon_name"),
        Column::text("space_station_name"),
        Column::text("city_name"),
        Column::text("outpost_name"),
        Column::text("faction_name"),
        Column::int("date_modified"),
    ],
    key: &["id"],
    blacklistable: false,
};

pub static SPACE_STATIONS: TableSchema = TableSchema {
    name: "space_stations",
    columns: &[
        Column::int("id"),
        Column::int("id_star_system"),
        Column::int("id_planet"),
        Column::int("id_orbit"),
        Column::int("id_moon"),
        Column::int("id_city"),
        Column::int("id_faction"),
        Column::text("name"),
        Column::text("nickname"),
        Column::flag("is_available"),
        Column::flag("is_visible"),
        Column::flag("is_armistice"),
        Column::flag("is_lagrange"),
        Column::flag("is_jump_point"),
        Column::flag("has_trade_terminal"),
        Column::flag("has_refinery"),
        Column::flag("has_loading_dock"),
        Column::flag("has_docking_port"),
        Column::flag("has_freight_elevator"),
        Column::text("star_system_name"),
        Column::text("planet_name"),
        Column::text("orbit_name"),
        Column::text("moon_name"),
        Column::text("city_name"),
        Column::text("faction_name"),
        Column::int("date_modified"),
    ],
    key: &["id"],
    blacklistable: false,
};

pub static TERMINALS: TableSchema = TableSchema {
    name: "terminals",
    columns: &[
        Column::int("id"),
        Column::int("id_star_system"),
        Column::int("id_planet"),
        Column::int("id_orbit"),
        Column::int("id_moon"),
        Column::int("id_space_station"),
        Column::int("id_outpost"),
        Column::int("id_poi"),
        Column::int("id_city"),
        Column::int("id_faction"),
        Column::int("id_company"),
        Column::text("name"),
        Column::text("nickname"),
        Column::text("code"),
        Column::text("type"),
        Column::flag("is_available"),
        Column::flag("is_visible"),
        Column::flag("is_player_owned"),
        Column::flag("is_auto_load"),
        Column::flag("has_loading_dock"),
        Column::flag("has_docking_port"),
        Column::flag("has_freight_elevator"),
        Column::flag("is_refinery"),
        Column::flag("is_cargo_center"),
        Column::flag("is_medical"),
        Column::flag("is_food"),
        Column::flag("is_refuel"),
        Column::flag("is_repair"),
        Column::flag("is_nqa"),
        Column::text("star_system_name"),
        Column::text("planet_name"),
        Column::text("orbit_name"),
        Column::text("moon_name"),
        Column::text("space_station_name"),
        Column::text("outpost_name"),
        Column::text("city_name"),
        Column::text("faction_name"),
        Column::text("company_name"),
        Column::int("date_modified"),
    ],
    key: &["id"],
    blacklistable: true,
};

// =============================================================================
// Organisations
// =============================================================================

pub static FACTIONS: TableSchema = TableSchema {
    name: "factions",
    columns: &[
        Column::int("id"),
        Column::text("name"),
        Column::text("wiki"),
        Column::flag("is_piracy"),
        Column::flag("is_bounty_hunting"),
        Column::int("date_modified"),
    ],
    key: &["id"],
    blacklistable: false,
};

pub static COMPANIES: TableSchema = TableSchema {
    name: "companies",
    columns: &[
        Column::int("id"),
        Column::int("id_faction"),
        Column::text("name"),
        Column::text("nickname"),
        Column::text("industry"),
        Column::flag("is_item_manufacturer"),
        Column::flag("is_vehicle_manufacturer"),
        Column::text("faction_name"),
        Column::int("date_modified"),
    ],
    key: &["id"],
    blacklistable: false,
};

// =============================================================================
// Goods
// =============================================================================

pub static COMMODITIES: TableSchema = TableSchema {
    name: "commodities",
    columns: &[
        Column::int("id"),
        Column::int("id_parent"),
        Column::text("name"),
        Column::text("code"),
        Column::text("kind"),
        Column::int("weight_scu"),
        Column::real("price_buy"),
        Column::real("price_sell"),
        Column::flag("is_available"),
        Column::flag("is_visible"),
        Column::flag("is_raw"),
        Column::flag("is_refined"),
        Column::flag("is_mineral"),
        Column::flag("is_harvestable"),
        Column::flag("is_buyable"),
        Column::flag("is_sellable"),
        Column::flag("is_temporary"),
        Column::flag("is_illegal"),
        Column::flag("is_fuel"),
        Column::int("date_modified"),
    ],
    key: &["id"],
    blacklistable: true,
};

pub static COMMODITY_STATUSES: TableSchema = TableSchema {
    name: "commodity_statuses",
    columns: &[
        Column::int("code"),
        Column::flag("is_buy"),
        Column::text("name"),
        Column::text("name_short"),
        Column::text("name_abbr"),
        Column::text("percentage"),
        Column::text("colors"),
    ],
    key: &["code", "is_buy"],
    blacklistable: false,
};

pub static VEHICLES: TableSchema = TableSchema {
    name: "vehicles",
    columns: &[
        Column::int("id"),
        Column::int("id_company"),
        Column::int("id_parent"),
        Column::text("name"),
        Column::text("name_full"),
        Column::text("slug"),
        Column::text("uuid"),
        Column::int("scu"),
        Column::text("crew"),
        Column::real("mass"),
        Column::text("pad_type"),
        Column::flag("is_spaceship"),
        Column::flag("is_ground_vehicle"),
        Column::flag("is_cargo"),
        Column::flag("is_mining"),
        Column::flag("is_salvage"),
        Column::flag("is_exploration"),
        Column::flag("is_industrial"),
        Column::flag("is_military"),
        Column::flag("is_racing"),
        Column::flag("is_passenger"),
        Column::flag("is_medical"),
        Column::flag("is_refuel"),
        Column::flag("is_repair"),
        Column::flag("is_bounty_hunting"),
        Column::flag("is_concept"),
        Column::text("company_name"),
        Column::int("date_modified"),
    ],
    key: &["id"],
    blacklistable: false,
};

pub static CATEGORIES: TableSchema = TableSchema {
    name: "categories",
    columns: &[
        Column::int("id"),
        Column::text("type"),
        Column::text("section"),
        Column::text("name"),
        Column::flag("is_game_related"),
        Column::flag("is_mining"),
        Column::int("date_modified"),
    ],
    key: &["id"],
    blacklistable: false,
};

pub static ITEMS: TableSchema = TableSchema {
    name: "items",
    columns: &[
        Column::int("id"),
        Column::int("id_parent"),
        Column::int("id_category"),
        Column::int("id_company"),
        Column::int("id_vehicle"),
        Column::text("name"),
        Column::text("section"),
        Column::text("category"),
        Column::text("company_name"),
        Column::text("vehicle_name"),
        Column::text("slug"),
        Column::text("uuid"),
        Column::text("size"),
        Column::flag("is_exclusive_pledge"),
        Column::flag("is_exclusive_subscriber"),
        Column::flag("is_commodity"),
        Column::flag("is_harvestable"),
        Column::int("date_modified"),
    ],
    key: &["id"],
    blacklistable: false,
};

pub static ITEM_ATTRIBUTES: TableSchema = TableSchema {
    name: "item_attributes",
    columns: &[
        Column::int("id"),
        Column::int("id_item"),
        Column::int("id_category"),
        Column::int("id_category_attribute"),
        Column::text("category_name"),
        Column::text("item_name"),
        Column::text("attribute_name"),
        Column::text("value"),
        Column::text("unit"),
        Column::int("date_modified"),
    ],
    key: &["id"],
    blacklistable: false,
};

// =============================================================================
// Observations
// =============================================================================

pub static COMMODITY_PRICES: TableSchema = TableSchema {
    name: "commodity_prices",
    columns: &[
        Column::int("id"),
        Column::int("id_commodity"),
        Column::int("id_star_system"),
        Column::int("id_planet"),
        Column::int("id_orbit"),
        Column::int("id_moon"),
        Column::int("id_city"),
        Column::int("id_outpost"),
        Column::int("id_poi"),
        Column::int("id_terminal"),
        Column::real("price_buy"),
        Column::real("price_buy_avg"),
        Column::real("price_sell"),
        Column::real("price_sell_avg"),
        Column::real("scu_buy"),
        Column::real("scu_buy_avg"),
        Column::real("scu_sell_stock"),
        Column::real("scu_sell_stock_avg"),
        Column::real("scu_sell"),
        Column::real("scu_sell_avg"),
        Column::int("status_buy"),
        Column::int("status_sell"),
        Column::text("commodity_name"),
        Column::text("commodity_code"),
        Column::text("star_system_name"),
        Column::text("planet_name"),
        Column::text("orbit_name"),
        Column::text("moon_name"),
        Column::text("space_station_name"),
        Column::text("outpost_name"),
        Column::text("city_name"),
        Column::text("terminal_name"),
        Column::text("terminal_code"),
        Column::int("date_modified"),
    ],
    key: &["id"],
    blacklistable: false,
};

pub static COMMODITY_RAW_PRICES: TableSchema = TableSchema {
    name: "commodity_raw_prices",
    columns: &[
        Column::int("id"),
        Column::int("id_commodity"),
        Column::int("id_star_system"),
        Column::int("id_terminal"),
        Column::real("price_sell"),
        Column::real("price_sell_avg"),
        Column::text("commodity_name"),
        Column::text("commodity_code"),
        Column::text("star_system_name"),
        Column::text("terminal_name"),
        Column::int("date_modified"),
    ],
    key: &["id"],
    blacklistable: false,
};

pub static COMMODITY_ROUTES: TableSchema = TableSchema {
    name: "commodity_routes",
    columns: &[
        Column::int("id"),
        Column::int("id_commodity"),
        Column::int("id_star_system_origin"),
        Column::int("id_star_system_destination"),
        Column::int("id_planet_origin"),
        Column::int("id_planet_destination"),
        Column::int("id_terminal_origin"),
        Column::int("id_terminal_destination"),
        Column::text("code"),
        Column::real("price_origin"),
        Column::real("price_destination"),
        Column::real("price_margin"),
        Column::real("price_roi"),
        Column::real("scu_origin"),
        Column::real("scu_destination"),
        Column::real("distance"),
        Column::int("score"),
        Column::real("profit"),
        Column::real("investment"),
        Column::flag("origin_has_loading_dock"),
        Column::flag("origin_has_docking_port"),
        Column::flag("origin_has_freight_elevator"),
        Column::flag("destination_has_loading_dock"),
        Column::flag("destination_has_docking_port"),
        Column::flag("destination_has_freight_elevator"),
        Column::text("commodity_name"),
        Column::text("commodity_code"),
        Column::text("origin_star_system_name"),
        Column::text("origin_planet_name"),
        Column::text("origin_orbit_name"),
        Column::text("origin_terminal_name"),
        Column::text("destination_star_system_name"),
        Column::text("destination_planet_name"),
        Column::text("destination_orbit_name"),
        Column::text("destination_terminal_name"),
        Column::int("date_added"),
    ],
    key: &["id"],
    blacklistable: false,
};

pub static ITEM_PRICES: TableSchema = TableSchema {
    name: "item_prices",
    columns: &[
        Column::int("id"),
        Column::int("id_item"),
        Column::int("id_category"),
        Column::int("id_terminal"),
        Column::real("price_buy"),
        Column::real("price_sell"),
        Column::text("item_name"),
        Column::text("terminal_name"),
        Column::text("star_system_name"),
        Column::int("date_modified"),
    ],
    key: &["id"],
    blacklistable: false,
};

pub static FUEL_PRICES: TableSchema = TableSchema {
    name: "fuel_prices",
    columns: &[
        Column::int("id"),
        Column::int("id_commodity"),
        Column::int("id_star_system"),
        Column::int("id_terminal"),
        Column::real("price_buy"),
        Column::real("price_buy_avg"),
        Column::text("commodity_name"),
        Column::text("star_system_name"),
        Column::text("terminal_name"),
        Column::int("date_modified"),
    ],
    key: &["id"],
    blacklistable: false,
};

pub static VEHICLE_PURCHASE_PRICES: TableSchema = TableSchema {
    name: "vehicle_purchase_prices",
    columns: &[
        Column::int("id"),
        Column::int("id_vehicle"),
        Column::int("id_terminal"),
        Column::real("price_buy"),
        Column::text("vehicle_name"),
        Column::text("terminal_name"),
        Column::text("star_system_name"),
        Column::int("date_modified"),
    ],
    key: &["id"],
    blacklistable: false,
};

pub static VEHICLE_RENTAL_PRICES: TableSchema = TableSchema {
    name: "vehicle_rental_prices",
    columns: &[
        Column::int("id"),
        Column::int("id_vehicle"),
        Column::int("id_terminal"),
        Column::real("price_rent"),
        Column::text("vehicle_name"),
        Column::text("terminal_name"),
        Column::text("star_system_name"),
        Column::int("date_modified"),
    ],
    key: &["id"],
    blacklistable: false,
};
