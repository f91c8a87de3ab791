use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension, Transaction};
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};
use tracing::{debug, info};
use uex_models::schema::{IMPORT_META_DDL, SETTINGS_DDL};
use uex_models::{EntityType, ImportMeta};

use crate::error::StoreError;
use crate::query::Query;

/// One store row as an ordered JSON map; NULL columns are omitted.
pub type Record = Map<String, Value>;

/// Embedded SQLite store holding one table per entity type.
///
/// A single connection sits behind a `Mutex` since `rusqlite::Connection` is not `Sync`.
/// A write batch holds the lock until it commits, so readers never see a half-swept table.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) a file-backed store in WAL mode and create any missing tables.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Open an in-memory store. Useful for testing.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("SQLite mutex poisoned: {e}")))
    }

    /// Create every missing entity table plus the bookkeeping tables.
    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        create_schema(&conn)
    }

    pub fn table_exists(&self, entity: EntityType) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        table_exists(&conn, entity.table())
    }

    pub fn row_count(&self, entity: EntityType) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        require_table(&conn, entity)?;
        let count = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", entity.table()),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Run `f` inside one transaction, committed once when `f` succeeds.
    pub fn write_batch<R>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Drop every table and recreate the schema from scratch.
    pub fn rebuild(&self) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tables: Vec<String> = {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
            )?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            names
        };

        let tx = conn.transaction()?;
        for table in &tables {
            tx.execute_batch(&format!("DROP TABLE IF EXISTS {table}"))?;
        }
        create_schema(&tx)?;
        tx.commit()?;

        info!(dropped = tables.len(), "Store rebuilt");
        Ok(())
    }

    /// Drop one entity table. Readers see a `SchemaError` until the schema is ensured again.
    pub fn drop_table(&self, entity: EntityType) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", entity.table()))?;
        Ok(())
    }

    pub fn setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.lock()?;
        let value = conn
            .prepare_cached("SELECT value FROM settings WHERE key = ?1")?
            .query_row([key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }

    /// Bookkeeping for the most recent import of `entity`, if it was ever imported.
    pub fn import_meta(&self, entity: EntityType) -> Result<Option<ImportMeta>, StoreError> {
        let conn = self.lock()?;
        let raw = conn
            .prepare_cached(
                "SELECT entity, run_id, imported_at, row_count, duration_ms \
                 FROM import_meta WHERE entity = ?1",
            )?
            .query_row([entity.table()], raw_meta)
            .optional()?;
        raw.map(parse_meta).transpose()
    }

    pub fn all_import_meta(&self) -> Result<Vec<ImportMeta>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT entity, run_id, imported_at, row_count, duration_ms \
             FROM import_meta ORDER BY entity",
        )?;
        let rows = stmt
            .query_map([], raw_meta)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(parse_meta).collect()
    }

    /// Execute a query and return raw records.
    pub fn query(&self, query: &Query) -> Result<Vec<Record>, StoreError> {
        let (sql, params) = query.to_sql()?;
        let conn = self.lock()?;
        require_table(&conn, query.entity)?;
        debug!(entity = %query.entity, sql = %sql, "Executing query");

        let mut stmt = conn.prepare_cached(&sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Record::new();
            for (i, name) in columns.iter().enumerate() {
                if let Some(value) = json_value(row.get_ref(i)?) {
                    record.insert(name.clone(), value);
                }
            }
            records.push(record);
        }
        Ok(records)
    }

    /// Execute a query and hydrate each record into `T`.
    pub fn query_as<T: DeserializeOwned>(&self, query: &Query) -> Result<Vec<T>, StoreError> {
        self.query(query)?
            .into_iter()
            .map(|record| serde_json::from_value(Value::Object(record)).map_err(StoreError::from))
            .collect()
    }
}

/// Upsert the import bookkeeping row for one entity type.
pub fn write_import_meta(conn: &Connection, meta: &ImportMeta) -> Result<(), StoreError> {
    conn.prepare_cached(
        "INSERT OR REPLACE INTO import_meta (entity, run_id, imported_at, row_count, duration_ms) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?
    .execute(rusqlite::params![
        meta.entity.table(),
        meta.run_id,
        meta.imported_at.to_rfc3339(),
        meta.row_count,
        meta.duration_ms,
    ])?;
    Ok(())
}

/// Fail with a `SchemaError` when the entity's table is missing.
pub fn require_table(conn: &Connection, entity: EntityType) -> Result<(), StoreError> {
    if table_exists(conn, entity.table())? {
        Ok(())
    } else {
        Err(StoreError::Schema(format!("table {} does not exist", entity.table())))
    }
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool, StoreError> {
    let found = conn
        .prepare_cached("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")?
        .exists([name])?;
    Ok(found)
}

fn create_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(IMPORT_META_DDL)?;
    conn.execute_batch(SETTINGS_DDL)?;
    for entity in EntityType::ALL {
        let schema = entity.schema();
        conn.execute_batch(&schema.create_table_sql())?;
        for index in schema.create_index_sql() {
            conn.execute_batch(&index)?;
        }
    }
    Ok(())
}

type RawMeta = (String, i64, String, i64, i64);

fn raw_meta(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawMeta> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn parse_meta(raw: RawMeta) -> Result<ImportMeta, StoreError> {
    let (entity, run_id, imported_at, row_count, duration_ms) = raw;
    let entity = EntityType::from_str(&entity).map_err(StoreError::Schema)?;
    let imported_at = DateTime::parse_from_rfc3339(&imported_at)
        .map_err(|e| StoreError::Schema(format!("bad import timestamp for {entity}: {e}")))?
        .with_timezone(&Utc);
    Ok(ImportMeta {
        entity,
        run_id,
        imported_at,
        row_count,
        duration_ms,
    })
}

fn json_value(value: ValueRef<'_>) -> Option<Value> {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => None,
        ValueRef::Integer(i) => Some(Value::from(i)),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number),
        ValueRef::Text(t) => Some(Value::String(String::from_utf8_lossy(t).into_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Predicate;
    use uex_models::Commodity;

    fn seed_commodities(store: &Store) {
        store
            .write_batch(|tx| {
                tx.execute(
                    "INSERT INTO commodities (id, name, price_buy, is_buyable, is_illegal, uex_run_id) \
                     VALUES (1, 'Agricium', 24.5, 1, 0, 1), (2, 'WiDoW', NULL, 0, 1, 1)",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn schema_is_created_on_open() {
        let store = Store::open_in_memory().unwrap();
        for entity in EntityType::ALL {
            assert!(store.table_exists(entity).unwrap(), "{entity}");
        }
        assert_eq!(store.row_count(EntityType::Terminal).unwrap(), 0);
    }

    #[test]
    fn missing_table_is_schema_error() {
        let store = Store::open_in_memory().unwrap();
        store.drop_table(EntityType::Vehicle).unwrap();
        assert!(!store.table_exists(EntityType::Vehicle).unwrap());

        let result = store.query(&Query::new(EntityType::Vehicle));
        assert!(matches!(result, Err(StoreError::Schema(_))));
        assert!(matches!(
            store.row_count(EntityType::Vehicle),
            Err(StoreError::Schema(_))
        ));
    }

    #[test]
    fn records_omit_nulls_and_hydrate() {
        let store = Store::open_in_memory().unwrap();
        seed_commodities(&store);

        let records = store
            .query(&Query::new(EntityType::Commodity).filter(Predicate::eq("id", 2)))
            .unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].contains_key("price_buy"));
        assert_eq!(records[0]["name"], "WiDoW");

        let commodities: Vec<Commodity> = store
            .query_as(&Query::new(EntityType::Commodity).order_asc("id"))
            .unwrap();
        assert_eq!(commodities[0].name, "Agricium");
        assert!(commodities[0].is_buyable);
        assert!(commodities[1].is_illegal);
        assert_eq!(commodities[1].price_buy, 0.0);
    }

    #[test]
    fn failed_batch_rolls_back() {
        let store = Store::open_in_memory().unwrap();
        let result: Result<(), StoreError> = store.write_batch(|tx| {
            tx.execute("INSERT INTO factions (id, name) VALUES (1, 'UEE')", [])?;
            Err(StoreError::Schema("abort".into()))
        });
        assert!(result.is_err());
        assert_eq!(store.row_count(EntityType::Faction).unwrap(), 0);
    }

    #[test]
    fn settings_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.setting("plugin_version").unwrap(), None);
        store.set_setting("plugin_version", "1.2.0").unwrap();
        store.set_setting("plugin_version", "1.3.0").unwrap();
        assert_eq!(
            store.setting("plugin_version").unwrap().as_deref(),
            Some("1.3.0")
        );
    }

    #[test]
    fn import_meta_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.import_meta(EntityType::Terminal).unwrap().is_none());

        let meta = ImportMeta {
            entity: EntityType::Terminal,
            run_id: 42,
            imported_at: Utc::now(),
            row_count: 12,
            duration_ms: 80,
        };
        store.write_batch(|tx| write_import_meta(tx, &meta)).unwrap();

        let stored = store.import_meta(EntityType::Terminal).unwrap().unwrap();
        assert_eq!(stored.run_id, 42);
        assert_eq!(stored.row_count, 12);
        assert_eq!(stored.imported_at.timestamp(), meta.imported_at.timestamp());
        assert_eq!(store.all_import_meta().unwrap().len(), 1);
    }

    #[test]
    fn rebuild_wipes_everything() {
        let store = Store::open_in_memory().unwrap();
        seed_commodities(&store);
        store.set_setting("remote_version", "4.0").unwrap();
        store.drop_table(EntityType::Item).unwrap();

        store.rebuild().unwrap();

        assert_eq!(store.row_count(EntityType::Commodity).unwrap(), 0);
        assert!(store.table_exists(EntityType::Item).unwrap());
        assert_eq!(store.setting("remote_version").unwrap(), None);
    }
}
