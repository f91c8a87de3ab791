//! End-to-end tool scenarios.
//!
//! Each test imports a catalog universe into a file-backed store through the
//! real importer, then drives the validators, optimizer or dispatcher on top.

use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;
use uex_loader::test_support::{sample_catalog, StaticCatalog};
use uex_loader::{BlacklistReconciler, ImportCompletion, Importer, VersionGuard};
use uex_models::{EntityType, ImportConfig, Readiness, RouteConfig, ValidationConfig};
use uex_store::{Catalog, CommodityFilter, Store};
use uex_tools::{
    CallStatus, RouteOptimizer, RouteRequest, SimilarityMatcher, ToolDispatcher, ToolError,
    Validator, ValidatorKind, Validators,
};

struct World {
    _dir: TempDir,
    catalog: Arc<Catalog>,
    readiness: Arc<Readiness>,
    importer: Importer,
}

fn world(source: StaticCatalog) -> World {
    world_with_blacklists(source, &[])
}

/// Build a store and importer over `source`, seeding blacklist files first.
fn world_with_blacklists(source: StaticCatalog, files: &[(&str, &str)]) -> World {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path().join("uex.db")).unwrap());
    let source = Arc::new(source);
    let readiness = Arc::new(Readiness::new());

    let blacklist_dir = dir.path().join("blacklists");
    std::fs::create_dir_all(&blacklist_dir).unwrap();
    for (name, contents) in files {
        std::fs::write(blacklist_dir.join(name), contents).unwrap();
    }

    let guard = Arc::new(VersionGuard::new(store.clone(), source.clone(), "1.0.0"));
    let completion = Arc::new(ImportCompletion::new(
        BlacklistReconciler::new(store.clone(), blacklist_dir),
        guard,
        readiness.clone(),
    ));
    let importer =
        Importer::new(store.clone(), source, ImportConfig::default()).with_listener(completion);

    World {
        _dir: dir,
        catalog: Arc::new(Catalog::new(store)),
        readiness,
        importer,
    }
}

fn dispatcher(world: &World) -> ToolDispatcher {
    let validators = Arc::new(Validators::new(
        world.catalog.clone(),
        Arc::new(SimilarityMatcher::new(0.75)),
        ValidationConfig::default(),
    ));
    let optimizer = Arc::new(RouteOptimizer::new(
        world.catalog.clone(),
        RouteConfig::default(),
    ));
    ToolDispatcher::new(
        validators,
        optimizer,
        world.catalog.clone(),
        world.readiness.clone(),
    )
}

fn metals_only() -> StaticCatalog {
    let source = StaticCatalog::new("4.0");
    source.set(
        EntityType::Commodity,
        vec![
            json!({"id": 1, "name": "Agricium", "is_buyable": 1, "is_sellable": 1}),
            json!({"id": 2, "name": "Aluminum", "is_buyable": 1, "is_sellable": 1}),
            json!({"id": 3, "name": "Gold", "is_buyable": 1, "is_sellable": 1}),
        ],
    );
    source
}

fn route(id: i64, origin_system: i64, destination_system: i64, distance: f64, score: i64) -> Value {
    json!({
        "id": id,
        "id_commodity": 1,
        "commodity_name": "Agricium",
        "id_terminal_origin": id * 10,
        "id_terminal_destination": id * 10 + 1,
        "id_star_system_origin": origin_system,
        "id_star_system_destination": destination_system,
        "origin_terminal_name": format!("Origin {id}"),
        "destination_terminal_name": format!("Destination {id}"),
        "price_origin": 10.0,
        "price_destination": 15.0,
        "scu_origin": 100.0,
        "scu_destination": 100.0,
        "distance": distance,
        "score": score,
    })
}

#[tokio::test]
async fn scenario_fuzzy_metal_names() {
    let w = world(metals_only());
    w.importer.run_cycle(false).await.unwrap();

    let validators = Validators::new(
        w.catalog.clone(),
        Arc::new(SimilarityMatcher::new(0.75)),
        ValidationConfig::default(),
    );
    let commodity = Validator::new(ValidatorKind::Commodity(CommodityFilter::default()));

    let first = validators
        .validate("commodity", &commodity, &json!("agricum"))
        .await
        .unwrap();
    assert_eq!(first.value, json!("Agricium"));
    for _ in 0..3 {
        let again = validators
            .validate("commodity", &commodity, &json!("agricum"))
            .await
            .unwrap();
        assert_eq!(again, first);
    }

    match validators
        .validate("commodity", &commodity, &json!("titanium"))
        .await
    {
        Err(ToolError::Validation(failures)) => {
            let mut suggestions = failures[0].suggestions.clone();
            suggestions.sort();
            assert_eq!(suggestions, vec!["Agricium", "Aluminum", "Gold"]);
        }
        other => panic!("expected a validation failure, got {other:?}"),
    }
}

#[tokio::test]
async fn scenario_route_ranking_respects_cargo_cap() {
    let w = world(sample_catalog());
    w.importer.run_cycle(false).await.unwrap();
    let optimizer = RouteOptimizer::new(w.catalog.clone(), RouteConfig::default());

    for cap in [1_i64, 7, 150, 450, 10_000] {
        let plan = optimizer
            .find_routes(&RouteRequest {
                cargo_space: Some(cap),
                limit: Some(10),
                ..RouteRequest::default()
            })
            .unwrap();
        assert!(!plan.example_mode);
        assert!(!plan.routes.is_empty());
        for route in &plan.routes {
            assert!(route.scu <= cap as f64, "scu {} over cap {cap}", route.scu);
        }
        for pair in plan.routes.windows(2) {
            assert!(pair[0].profit >= pair[1].profit);
        }
    }
}

#[tokio::test]
async fn scenario_example_mode_orders_by_score() {
    let source = StaticCatalog::new("4.0");
    source.set(
        EntityType::Commodity,
        vec![json!({"id": 1, "name": "Agricium", "is_buyable": 1, "is_sellable": 1})],
    );
    // Equal profit per unit; the cross-system route is shorter and scores higher.
    source.set(
        EntityType::CommodityRoute,
        vec![route(1, 1, 1, 10.0, 40), route(2, 1, 2, 5.0, 90)],
    );
    let w = world(source);
    w.importer.run_cycle(false).await.unwrap();
    let optimizer = RouteOptimizer::new(w.catalog.clone(), RouteConfig::default());

    let example = optimizer.find_routes(&RouteRequest::default()).unwrap();
    assert!(example.example_mode);
    assert!(example.notes.iter().any(|n| n.contains("illustrative")));
    assert_eq!(example.routes[0].origin_terminal, "Origin 2");

    // With a real cargo cap profits tie, so the same-system route wins.
    let ranked = optimizer
        .find_routes(&RouteRequest {
            cargo_space: Some(100),
            ..RouteRequest::default()
        })
        .unwrap();
    assert_eq!(ranked.routes[0].origin_terminal, "Origin 1");
    assert_eq!(ranked.routes[0].profit, ranked.routes[1].profit);
}

#[tokio::test]
async fn scenario_untradable_routes_are_never_offered() {
    let source = StaticCatalog::new("4.0");
    source.set(
        EntityType::Commodity,
        vec![json!({"id": 1, "name": "Agricium", "is_buyable": 1, "is_sellable": 1})],
    );
    let mut no_demand = route(2, 1, 1, 10.0, 90);
    no_demand["scu_destination"] = json!(0.0);
    let mut unknown_demand = route(3, 1, 1, 10.0, 80);
    unknown_demand["scu_destination"] = Value::Null;
    let mut free_stock = route(4, 1, 1, 10.0, 70);
    free_stock["price_origin"] = json!(0.0);
    let mut fractional = route(5, 1, 1, 10.0, 60);
    fractional["scu_origin"] = json!(0.5);
    source.set(
        EntityType::CommodityRoute,
        vec![
            route(1, 1, 1, 10.0, 10),
            no_demand,
            unknown_demand,
            free_stock,
            fractional,
        ],
    );
    let w = world(source);
    w.importer.run_cycle(false).await.unwrap();
    let optimizer = RouteOptimizer::new(w.catalog.clone(), RouteConfig::default());

    let requests = [
        RouteRequest::default(),
        RouteRequest {
            budget: Some(1000.0),
            ..RouteRequest::default()
        },
        RouteRequest {
            cargo_space: Some(50),
            ..RouteRequest::default()
        },
    ];
    for request in &requests {
        let plan = optimizer.find_routes(request).unwrap();
        let origins: Vec<&str> = plan
            .routes
            .iter()
            .map(|r| r.origin_terminal.as_str())
            .collect();
        assert_eq!(origins, vec!["Origin 1"]);
        assert!(plan.routes[0].scu >= 1.0);
        assert!(plan.routes[0].profit > 0.0);
    }
}

#[tokio::test]
async fn scenario_tools_become_available_after_import() {
    let w = world(sample_catalog());
    let d = dispatcher(&w);

    let loading = d.call("find_vehicles", &json!({ "role": "cargo" })).await;
    assert_eq!(loading.status, CallStatus::Loading);
    assert!(w.readiness.has_pending_request());

    w.importer.run_cycle(false).await.unwrap();
    assert!(w.readiness.is_ready());
    assert!(!w.readiness.has_pending_request());

    let ready = d.call("find_vehicles", &json!({ "role": "cargo" })).await;
    assert_eq!(ready.status, CallStatus::Ok);
    assert_eq!(ready.response["vehicles"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn scenario_blacklisted_terminal_is_avoided() {
    let w = world_with_blacklists(
        sample_catalog(),
        &[("terminal_blacklist.txt", "100 | TDD - Area 18 | true\n")],
    );
    w.importer.run_cycle(false).await.unwrap();
    let d = dispatcher(&w);

    let response = d
        .call(
            "find_trade_routes",
            &json!({ "cargo_space": 100, "limit": 10 }),
        )
        .await;
    assert_eq!(response.status, CallStatus::Ok);
    let routes = response.response["routes"].as_array().unwrap();
    assert!(!routes.is_empty());
    for route in routes {
        assert_ne!(route["origin_terminal"], "TDD - Area 18");
        assert_ne!(route["destination_terminal"], "TDD - Area 18");
    }
}

#[tokio::test]
async fn scenario_invalid_call_reports_everything_at_once() {
    let w = world(sample_catalog());
    w.importer.run_cycle(false).await.unwrap();
    let d = dispatcher(&w);

    let response = d
        .call(
            "find_trade_routes",
            &json!({
                "ship": "Millennium Falcon",
                "commodities": ["gold", "unobtainium"],
                "budget": "lots",
            }),
        )
        .await;
    assert_eq!(response.status, CallStatus::Invalid);
    let errors = response.response["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 3);
    let text = response.instant_response.unwrap();
    assert!(text.contains("ship"));
    assert!(text.contains("commodities"));
    assert!(text.contains("budget"));
}
