//! Stress tests for concurrent access to the file-backed store.
//!
//! These tests verify that WAL mode lets the import writer and request-path
//! readers work on the same database concurrently, and that a reader never
//! observes a table between an import's insert and its sweep.
//!
//! Run with:
//! ```bash
//! cargo test -p uex-loader --test wal_stress
//! ```

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Instant;

use serde_json::{json, Value};
use uex_loader::writer::write_entity;
use uex_models::EntityType;
use uex_store::{Query, Store};

fn routes(run: i64, count: i64) -> Vec<Value> {
    // Every run serves a disjoint id range, so a half-swept table would show
    // rows from two runs at once.
    (0..count)
        .map(|i| {
            json!({
                "id": run * 1000 + i,
                "id_commodity": 1,
                "commodity_name": "Agricium",
                "price_origin": 24.5,
                "price_destination": 27.6,
                "scu_origin": 500.0,
                "scu_destination": 800.0,
                "distance": run as f64,
            })
        })
        .collect()
}

/// Writer and readers on separate connections to the same file.
#[test]
fn concurrent_writer_and_readers_no_busy_errors() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("stress.db");

    let store = Store::open(&db_path).unwrap();
    write_entity(&store, EntityType::CommodityRoute, 1, &routes(1, 20), Instant::now()).unwrap();

    let runs = 100;
    let reader_count = 4;
    let reads_per_reader = 100;
    let barrier = Arc::new(Barrier::new(1 + reader_count));

    let writer_barrier = barrier.clone();
    let writer_path = db_path.clone();
    let writer_handle = thread::spawn(move || {
        let store = Store::open(&writer_path).unwrap();
        writer_barrier.wait();
        for run in 2..(2 + runs) {
            write_entity(
                &store,
                EntityType::CommodityRoute,
                run,
                &routes(run, 20),
                Instant::now(),
            )
            .unwrap();
        }
    });

    let reader_handles: Vec<_> = (0..reader_count)
        .map(|reader_id| {
            let b = barrier.clone();
            let p = db_path.clone();
            thread::spawn(move || {
                let store = Store::open(&p).unwrap();
                b.wait();
                let mut seen = 0usize;
                for _ in 0..reads_per_reader {
                    let rows = store
                        .query(&Query::new(EntityType::CommodityRoute))
                        .unwrap();
                    assert_eq!(rows.len(), 20, "Reader {reader_id} saw a partial import");
                    let run_ids: std::collections::BTreeSet<i64> = rows
                        .iter()
                        .map(|r| r["uex_run_id"].as_i64().unwrap())
                        .collect();
                    assert_eq!(run_ids.len(), 1, "Reader {reader_id} saw rows from two runs");
                    seen += rows.len();
                }
                seen
            })
        })
        .collect();

    writer_handle.join().expect("writer thread panicked");
    for handle in reader_handles {
        let seen = handle.join().expect("reader thread panicked");
        assert!(seen > 0);
    }
}

/// A single shared store serves readers while imports run on another thread.
#[test]
fn shared_store_serializes_import_and_reads() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path().join("shared.db")).unwrap());
    write_entity(&store, EntityType::CommodityRoute, 1, &routes(1, 10), Instant::now()).unwrap();

    let writer = {
        let store = store.clone();
        thread::spawn(move || {
            for run in 2..52 {
                write_entity(
                    &store,
                    EntityType::CommodityRoute,
                    run,
                    &routes(run, 10),
                    Instant::now(),
                )
                .unwrap();
            }
        })
    };

    for _ in 0..200 {
        let count = store.row_count(EntityType::CommodityRoute).unwrap();
        assert_eq!(count, 10);
    }
    writer.join().expect("writer thread panicked");

    let meta = store.import_meta(EntityType::CommodityRoute).unwrap().unwrap();
    assert_eq!(meta.run_id, 51);
    assert_eq!(meta.row_count, 10);
}
