//! Round-trips the human-editable blacklist files into store flags.
//!
//! Each reconcile reads the kind's file, applies it to the store, deletes it and
//! writes a fresh one listing every candidate with its current flag. A file that
//! fails to parse is discarded and the kind's flags are reset, so a corrupt file
//! heals itself on the next pass. While a kind's table is empty (first run,
//! failed fetch, freshly rebuilt store) its file is left alone.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};
use uex_models::schema::BLACKLIST_COLUMN;
use uex_models::EntityType;
use uex_store::{Query, Store, StoreError};

use crate::error::LoaderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlacklistKind {
    Commodity,
    Terminal,
}

impl BlacklistKind {
    pub const ALL: [BlacklistKind; 2] = [BlacklistKind::Commodity, BlacklistKind::Terminal];

    pub fn entity(&self) -> EntityType {
        match self {
            BlacklistKind::Commodity => EntityType::Commodity,
            BlacklistKind::Terminal => EntityType::Terminal,
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            BlacklistKind::Commodity => "commodity_blacklist.txt",
            BlacklistKind::Terminal => "terminal_blacklist.txt",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            BlacklistKind::Commodity => "commodity",
            BlacklistKind::Terminal => "terminal",
        }
    }
}

/// One line of a blacklist file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlacklistEntry {
    pub id: i64,
    pub name: String,
    pub blacklisted: bool,
}

/// What a reconcile pass did with the file it found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The file parsed and its flags were applied.
    Applied { flagged: usize },
    /// The file was malformed at `line`; flags were reset.
    Corrupt { line: usize },
    /// No file existed; the current flags were written out.
    Missing,
    /// The kind's table holds no rows yet; the file was left untouched.
    Deferred,
}

/// A malformed blacklist line (1-based).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: usize,
    pub content: String,
}

pub struct BlacklistReconciler {
    store: Arc<Store>,
    directory: PathBuf,
}

impl BlacklistReconciler {
    pub fn new(store: Arc<Store>, directory: impl Into<PathBuf>) -> Self {
        Self {
            store,
            directory: directory.into(),
        }
    }

    pub fn path(&self, kind: BlacklistKind) -> PathBuf {
        self.directory.join(kind.file_name())
    }

    /// Reconcile every kind. A failure for one kind is logged and does not stop the others.
    pub fn reconcile_all(&self) -> Vec<(BlacklistKind, Result<ReconcileOutcome, LoaderError>)> {
        BlacklistKind::ALL
            .into_iter()
            .map(|kind| {
                let result = self.reconcile(kind);
                if let Err(e) = &result {
                    warn!(kind = kind.label(), error = %e, "Blacklist reconcile failed");
                }
                (kind, result)
            })
            .collect()
    }

    pub fn reconcile(&self, kind: BlacklistKind) -> Result<ReconcileOutcome, LoaderError> {
        if self.store.row_count(kind.entity())? == 0 {
            info!(kind = kind.label(), "No rows to reconcile, keeping blacklist file");
            return Ok(ReconcileOutcome::Deferred);
        }

        let path = self.path(kind);
        let outcome = match read_optional(&path)? {
            None => ReconcileOutcome::Missing,
            Some(contents) => {
                let outcome = match parse(&contents) {
                    Ok(entries) => {
                        let flagged = self.apply(kind, &entries)?;
                        info!(kind = kind.label(), flagged, "Applied blacklist file");
                        ReconcileOutcome::Applied { flagged }
                    }
                    Err(e) => {
                        warn!(
                            kind = kind.label(),
                            line = e.line,
                            content = %e.content,
                            "Corrupt blacklist file, resetting flags"
                        );
                        self.apply(kind, &[])?;
                        ReconcileOutcome::Corrupt { line: e.line }
                    }
                };
                fs::remove_file(&path)?;
                outcome
            }
        };

        self.regenerate(kind)?;
        Ok(outcome)
    }

    /// Reset every flag of `kind`, then set the ones the entries mark. Returns
    /// the number of rows flagged.
    fn apply(&self, kind: BlacklistKind, entries: &[BlacklistEntry]) -> Result<usize, StoreError> {
        let table = kind.entity().table();
        self.store.write_batch(|tx| {
            tx.execute(&format!("UPDATE {table} SET {BLACKLIST_COLUMN} = 0"), [])?;
            let mut stmt =
                tx.prepare(&format!("UPDATE {table} SET {BLACKLIST_COLUMN} = 1 WHERE id = ?1"))?;
            let mut flagged = 0;
            for entry in entries.iter().filter(|e| e.blacklisted) {
                flagged += stmt.execute([entry.id])?;
            }
            Ok(flagged)
        })
    }

    /// Write a fresh file listing every candidate of `kind` ordered by name.
    fn regenerate(&self, kind: BlacklistKind) -> Result<(), LoaderError> {
        let rows = self
            .store
            .query(&Query::new(kind.entity()).order_asc("name").order_asc("id"))?;
        let entries: Vec<BlacklistEntry> = rows
            .iter()
            .filter_map(|row| {
                Some(BlacklistEntry {
                    id: row.get("id")?.as_i64()?,
                    name: row.get("name").and_then(Value::as_str).unwrap_or("").to_string(),
                    blacklisted: row.get(BLACKLIST_COLUMN).and_then(Value::as_i64) == Some(1),
                })
            })
            .collect();

        fs::create_dir_all(&self.directory)?;
        fs::write(self.path(kind), render(kind, &entries))?;
        Ok(())
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, LoaderError> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Parse a blacklist file. Any malformed line rejects the whole file.
pub fn parse(contents: &str) -> Result<Vec<BlacklistEntry>, ParseError> {
    let mut entries = Vec::new();
    for (index, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let error = || ParseError {
            line: index + 1,
            content: raw.to_string(),
        };

        // Names may contain the separator; the id and flag never do.
        let (id, rest) = line.split_once('|').ok_or_else(error)?;
        let (name, flag) = rest.rsplit_once('|').ok_or_else(error)?;
        let id = id.trim().parse::<i64>().map_err(|_| error())?;
        let blacklisted = match flag.trim().to_ascii_lowercase().as_str() {
            "true" => true,
            "false" => false,
            _ => return Err(error()),
        };

        entries.push(BlacklistEntry {
            id,
            name: name.trim().to_string(),
            blacklisted,
        });
    }
    Ok(entries)
}

fn render(kind: BlacklistKind, entries: &[BlacklistEntry]) -> String {
    let mut out = format!(
        "# {} blacklist, rewritten after every import.\n\
         # One entry per line: <id> | <name> | <true|false>\n\
         # Set the last field to true to exclude the {} from trade routes.\n",
        capitalize(kind.label()),
        kind.label()
    );
    for entry in entries {
        out.push_str(&format!("{} | {} | {}\n", entry.id, entry.name, entry.blacklisted));
    }
    out
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::write_entity;
    use serde_json::json;
    use std::time::Instant;

    fn seeded() -> (Arc<Store>, tempfile::TempDir) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let commodities = vec![
            json!({"id": 1, "name": "Agricium"}),
            json!({"id": 2, "name": "Gold"}),
            json!({"id": 3, "name": "Aluminum"}),
        ];
        write_entity(&store, EntityType::Commodity, 1, &commodities, Instant::now()).unwrap();
        (store, tempfile::tempdir().unwrap())
    }

    fn flagged_ids(store: &Store) -> Vec<i64> {
        store
            .query(
                &Query::new(EntityType::Commodity)
                    .filter(uex_store::Predicate::eq(BLACKLIST_COLUMN, true))
                    .order_asc("id"),
            )
            .unwrap()
            .iter()
            .map(|r| r["id"].as_i64().unwrap())
            .collect()
    }

    #[test]
    fn parse_accepts_comments_and_separators_in_names() {
        let entries = parse("# header\n\n7 | Ore | Mined | TRUE\n8|Gold|false\n").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "Ore | Mined");
        assert!(entries[0].blacklisted);
        assert!(!entries[1].blacklisted);
    }

    #[test]
    fn parse_rejects_malformed_lines() {
        assert_eq!(parse("1 | Gold | maybe\n").unwrap_err().line, 1);
        assert_eq!(parse("# ok\nx | Gold | true\n").unwrap_err().line, 2);
        assert!(parse("1 Gold true").is_err());
    }

    #[test]
    fn missing_file_is_generated() {
        let (store, dir) = seeded();
        let reconciler = BlacklistReconciler::new(store, dir.path());

        let outcome = reconciler.reconcile(BlacklistKind::Commodity).unwrap();
        assert_eq!(outcome, ReconcileOutcome::Missing);

        let written = fs::read_to_string(reconciler.path(BlacklistKind::Commodity)).unwrap();
        let entries = parse(&written).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Agricium", "Aluminum", "Gold"]);
        assert!(entries.iter().all(|e| !e.blacklisted));
    }

    #[test]
    fn edited_file_is_applied_and_rewritten() {
        let (store, dir) = seeded();
        let reconciler = BlacklistReconciler::new(store.clone(), dir.path());
        let path = reconciler.path(BlacklistKind::Commodity);
        fs::write(&path, "2 | Gold | true\n3 | Aluminum | false\n99 | Gone | true\n").unwrap();

        let outcome = reconciler.reconcile(BlacklistKind::Commodity).unwrap();
        assert_eq!(outcome, ReconcileOutcome::Applied { flagged: 1 });
        assert_eq!(flagged_ids(&store), vec![2]);

        // The regenerated file reflects the store, dropping unknown ids.
        let entries = parse(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().any(|e| e.id == 2 && e.blacklisted));
        assert!(!entries.iter().any(|e| e.id == 99));
    }

    #[test]
    fn corrupt_file_resets_flags() {
        let (store, dir) = seeded();
        let reconciler = BlacklistReconciler::new(store.clone(), dir.path());
        let path = reconciler.path(BlacklistKind::Commodity);

        fs::write(&path, "1 | Agricium | true\n").unwrap();
        reconciler.reconcile(BlacklistKind::Commodity).unwrap();
        assert_eq!(flagged_ids(&store), vec![1]);

        fs::write(&path, "1 | Agricium | true\ngarbage\n").unwrap();
        let outcome = reconciler.reconcile(BlacklistKind::Commodity).unwrap();
        assert_eq!(outcome, ReconcileOutcome::Corrupt { line: 2 });
        assert!(flagged_ids(&store).is_empty());
        assert!(parse(&fs::read_to_string(&path).unwrap()).is_ok());
    }

    #[test]
    fn reconcile_all_covers_both_kinds() {
        let (store, dir) = seeded();
        let reconciler = BlacklistReconciler::new(store, dir.path());
        let results = reconciler.reconcile_all();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].1.as_ref().unwrap(), &ReconcileOutcome::Missing);
        // No terminals were imported, so there is nothing to list yet.
        assert_eq!(results[1].1.as_ref().unwrap(), &ReconcileOutcome::Deferred);
        assert!(reconciler.path(BlacklistKind::Commodity).exists());
        assert!(!reconciler.path(BlacklistKind::Terminal).exists());
    }

    #[test]
    fn empty_table_keeps_the_file() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let dir = tempfile::tempdir().unwrap();
        let reconciler = BlacklistReconciler::new(store.clone(), dir.path());
        let path = reconciler.path(BlacklistKind::Commodity);
        fs::write(&path, "2 | Gold | true\n").unwrap();

        let outcome = reconciler.reconcile(BlacklistKind::Commodity).unwrap();
        assert_eq!(outcome, ReconcileOutcome::Deferred);
        assert_eq!(fs::read_to_string(&path).unwrap(), "2 | Gold | true\n");

        let commodities = vec![json!({"id": 2, "name": "Gold"})];
        write_entity(&store, EntityType::Commodity, 1, &commodities, Instant::now()).unwrap();
        let outcome = reconciler.reconcile(BlacklistKind::Commodity).unwrap();
        assert_eq!(outcome, ReconcileOutcome::Applied { flagged: 1 });
        assert_eq!(flagged_ids(&store), vec![2]);
    }
}
