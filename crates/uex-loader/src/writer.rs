//! Run-tagged import writes: insert-or-replace, sweep and bookkeeping in one transaction.

use std::time::Instant;

use chrono::Utc;
use rusqlite::Transaction;
use serde_json::Value;
use tracing::warn;
use uex_models::schema::{ColumnType, TableSchema, BLACKLIST_COLUMN, RUN_ID_COLUMN};
use uex_models::{EntityType, ImportMeta};
use uex_store::store::{require_table, write_import_meta};
use uex_store::{Param, Store, StoreError};

/// Result of writing one entity type's records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOutcome {
    pub written: usize,
    /// Records dropped for lacking an identity-key value.
    pub skipped: usize,
    /// Rows deleted because this run no longer carried them.
    pub swept: usize,
}

/// Replace the contents of `entity`'s table with `records`, tagged with `run_id`.
///
/// Rows are insert-or-replaced, every row still carrying an older run id is swept,
/// and `ImportMeta` is written, all inside one transaction. Blacklist flags of
/// replaced rows are carried over.
pub fn write_entity(
    store: &Store,
    entity: EntityType,
    run_id: i64,
    records: &[Value],
    started: Instant,
) -> Result<WriteOutcome, StoreError> {
    let schema = entity.schema();

    store.write_batch(|tx| {
        require_table(tx, entity)?;

        let flagged = if schema.blacklistable {
            blacklisted_keys(tx, schema)?
        } else {
            Vec::new()
        };

        let mut outcome = WriteOutcome::default();
        {
            let mut stmt = tx.prepare_cached(&insert_sql(schema))?;
            for record in records {
                let Some(object) = record.as_object() else {
                    outcome.skipped += 1;
                    continue;
                };
                let params: Vec<Param> = schema
                    .columns
                    .iter()
                    .map(|c| coerce(c.col_type, object.get(c.name)))
                    .chain(std::iter::once(Param::Integer(run_id)))
                    .collect();

                let key_missing = schema.key.iter().any(|key| {
                    schema
                        .columns
                        .iter()
                        .position(|c| c.name == *key)
                        .map_or(true, |i| params[i] == Param::Null)
                });
                if key_missing {
                    outcome.skipped += 1;
                    continue;
                }

                stmt.execute(rusqlite::params_from_iter(params.iter()))?;
                outcome.written += 1;
            }
        }

        if !flagged.is_empty() {
            restore_flags(tx, schema, &flagged)?;
        }

        outcome.swept = tx.execute(
            &format!("DELETE FROM {} WHERE {RUN_ID_COLUMN} != ?1", schema.name),
            [run_id],
        )?;

        write_import_meta(
            tx,
            &ImportMeta {
                entity,
                run_id,
                imported_at: Utc::now(),
                row_count: outcome.written as i64,
                duration_ms: started.elapsed().as_millis() as i64,
            },
        )?;

        if outcome.skipped > 0 {
            warn!(
                entity = %entity,
                skipped = outcome.skipped,
                "Skipped records without identity key"
            );
        }
        Ok(outcome)
    })
}

fn insert_sql(schema: &TableSchema) -> String {
    let mut columns: Vec<&str> = schema.columns.iter().map(|c| c.name).collect();
    columns.push(RUN_ID_COLUMN);
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT OR REPLACE INTO {} ({}) VALUES ({placeholders})",
        schema.name,
        columns.join(", ")
    )
}

/// Key tuples of rows currently flagged blacklisted.
fn blacklisted_keys(
    tx: &Transaction<'_>,
    schema: &TableSchema,
) -> Result<Vec<Vec<Param>>, StoreError> {
    let sql = format!(
        "SELECT {} FROM {} WHERE {BLACKLIST_COLUMN} = 1",
        schema.key.join(", "),
        schema.name
    );
    let mut stmt = tx.prepare(&sql)?;
    let width = schema.key.len();
    let keys = stmt
        .query_map([], |row| {
            (0..width)
                .map(|i| {
                    row.get::<_, rusqlite::types::Value>(i).map(|v| match v {
                        rusqlite::types::Value::Integer(i) => Param::Integer(i),
                        rusqlite::types::Value::Real(f) => Param::Real(f),
                        rusqlite::types::Value::Text(s) => Param::Text(s),
                        _ => Param::Null,
                    })
                })
                .collect::<Result<Vec<_>, _>>()
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(keys)
}

fn restore_flags(
    tx: &Transaction<'_>,
    schema: &TableSchema,
    keys: &[Vec<Param>],
) -> Result<(), StoreError> {
    let condition = schema
        .key
        .iter()
        .map(|k| format!("{k} = ?"))
        .collect::<Vec<_>>()
        .join(" AND ");
    let mut stmt = tx.prepare(&format!(
        "UPDATE {} SET {BLACKLIST_COLUMN} = 1 WHERE {condition}",
        schema.name
    ))?;
    for key in keys {
        stmt.execute(rusqlite::params_from_iter(key.iter()))?;
    }
    Ok(())
}

/// Convert a JSON attribute to the column's storage type. Unparseable values store NULL.
fn coerce(col_type: ColumnType, value: Option<&Value>) -> Param {
    let Some(value) = value else {
        return Param::Null;
    };
    match (col_type, value) {
        (_, Value::Null) => Param::Null,

        (ColumnType::Boolean, Value::Bool(b)) => Param::Integer(*b as i64),
        (ColumnType::Boolean, Value::Number(n)) => {
            Param::Integer((n.as_f64().unwrap_or(0.0) != 0.0) as i64)
        }
        (ColumnType::Boolean, Value::String(s)) => {
            Param::Integer(matches!(s.trim(), "1" | "true" | "yes") as i64)
        }

        (ColumnType::Integer, Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .map_or(Param::Null, Param::Integer),
        (ColumnType::Integer, Value::Bool(b)) => Param::Integer(*b as i64),
        (ColumnType::Integer, Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map_or(Param::Null, Param::Integer),

        (ColumnType::Real, Value::Number(n)) => n.as_f64().map_or(Param::Null, Param::Real),
        (ColumnType::Real, Value::String(s)) => {
            s.trim().parse::<f64>().map_or(Param::Null, Param::Real)
        }

        (ColumnType::Text, Value::String(s)) => Param::Text(s.clone()),
        (ColumnType::Text, Value::Number(n)) => Param::Text(n.to_string()),
        (ColumnType::Text, Value::Bool(b)) => Param::Text(b.to_string()),
        (ColumnType::Text, other) => Param::Text(other.to_string()),

        _ => Param::Null,
    }
}
