use std::env;
use std::sync::{Arc, Mutex, OnceLock};

use anyhow::{bail, Context};
use boqtrack_cli::commands::{close, config, doctor, duplicates, migrate, reconcile};
use boqtrack_core::config::AppConfig;
use boqtrack_core::domain::delivery::{DeliveryCondition, NewDelivery, NewDeliveryItem};
use boqtrack_core::domain::material::{MaterialStatus, NewMaterial, ResourceType};
use boqtrack_core::domain::purchase_order::{NewPurchaseOrder, NewPurchaseOrderItem};
use boqtrack_core::domain::request::NewRequest;
use boqtrack_core::services::{ProcurementServices, RequestCreation};
use boqtrack_core::{Actor, ActorRole, InMemoryAuditSink, ProjectId, SiteId};
use boqtrack_db::{connect_with_settings, migrations, SqlProcurementStore};
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use tempfile::TempDir;

struct Seeded {
    request_id: String,
    purchase_order_id: String,
}

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("BOQTRACK_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("BOQTRACK_DATABASE_URL", "postgres://localhost/boqtrack")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn config_reports_env_sources() {
    with_env(
        &[
            ("BOQTRACK_DATABASE_URL", "sqlite::memory:"),
            ("BOQTRACK_PROCUREMENT_SEQUENCE_WIDTH", "6"),
        ],
        || {
            let result = config::run();
            assert_eq!(result.exit_code, 0);

            let payload = parse_payload(&result.output);
            let entries = payload["data"].as_array().expect("config entries");
            let width = entries
                .iter()
                .find(|entry| entry["key"] == "procurement.sequence_width")
                .expect("sequence width entry");
            assert_eq!(width["value"], "6");
            assert_eq!(width["source"], "env (BOQTRACK_PROCUREMENT_SEQUENCE_WIDTH)");
        },
    );
}

#[test]
fn doctor_passes_on_migrated_database() {
    let dir = TempDir::new().expect("tempdir");
    let url = database_url(&dir);
    with_env(&[("BOQTRACK_DATABASE_URL", url.as_str())], || {
        assert_eq!(migrate::run().exit_code, 0);

        let report = doctor::run(true);
        assert!(report.passed, "doctor report: {}", report.rendered);

        let payload = parse_payload(&report.rendered);
        assert_eq!(payload["overall_status"], "pass");
        assert_eq!(payload["checks"].as_array().map(Vec::len), Some(3));
    });
}

#[test]
fn doctor_flags_unmigrated_database() {
    with_env(&[("BOQTRACK_DATABASE_URL", "sqlite::memory:")], || {
        let report = doctor::run(true);
        assert!(!report.passed);

        let payload = parse_payload(&report.rendered);
        let schema = payload["checks"]
            .as_array()
            .and_then(|checks| checks.iter().find(|check| check["name"] == "schema_migrations"))
            .expect("schema check");
        assert_eq!(schema["status"], "fail");
    });
}

#[test]
fn reconcile_unknown_request_is_not_found() {
    let dir = TempDir::new().expect("tempdir");
    let url = database_url(&dir);
    with_env(&[("BOQTRACK_DATABASE_URL", url.as_str())], || {
        let result = reconcile::run("missing-request");
        assert_eq!(result.exit_code, 6);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "not_found");
        assert!(payload["correlation_id"].is_string());
    });
}

#[test]
fn reconcile_and_close_report_current_state() {
    let dir = TempDir::new().expect("tempdir");
    let url = database_url(&dir);
    let seeded = seed_partial_delivery(&url).expect("seed database");

    with_env(&[("BOQTRACK_DATABASE_URL", url.as_str())], || {
        let result = reconcile::run(&seeded.request_id);
        assert_eq!(result.exit_code, 0, "reconcile output: {}", result.output);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["changed"], false);

        let result = close::run(&seeded.purchase_order_id);
        assert_eq!(result.exit_code, 0, "close output: {}", result.output);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["closed"], false);
    });
}

#[test]
fn duplicates_lists_overlapping_requests() {
    let dir = TempDir::new().expect("tempdir");
    let url = database_url(&dir);
    let seeded = seed_partial_delivery(&url).expect("seed database");

    with_env(&[("BOQTRACK_DATABASE_URL", url.as_str())], || {
        let result = duplicates::run(
            "SITE-1",
            "2026-07-10T00:00:00Z",
            "2026-07-20T00:00:00Z",
            &["cement".to_string()],
        );
        assert_eq!(result.exit_code, 0, "duplicates output: {}", result.output);

        let payload = parse_payload(&result.output);
        let warnings = payload["data"].as_array().expect("warnings");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0]["request_id"], seeded.request_id.as_str());
        assert_eq!(warnings[0]["overlapping_materials"][0], "cement");
    });
}

#[test]
fn duplicates_rejects_inverted_window() {
    let dir = TempDir::new().expect("tempdir");
    let url = database_url(&dir);
    with_env(&[("BOQTRACK_DATABASE_URL", url.as_str())], || {
        let result =
            duplicates::run("SITE-1", "2026-07-20T00:00:00Z", "2026-07-10T00:00:00Z", &[]);
        assert_eq!(result.exit_code, 8);
        assert_eq!(parse_payload(&result.output)["error_class"], "bad_request");

        let result = duplicates::run("SITE-1", "next tuesday", "2026-07-10T00:00:00Z", &[]);
        assert_eq!(result.exit_code, 8);
    });
}

fn database_url(dir: &TempDir) -> String {
    format!("sqlite://{}", dir.path().join("boqtrack.db").display())
}

/// Request for 100 bags, ordered in full, 60 delivered.
fn seed_partial_delivery(url: &str) -> anyhow::Result<Seeded> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    runtime.block_on(async {
        let pool = connect_with_settings(url, 1, 5).await?;
        migrations::run_pending(&pool).await?;
        let store = Arc::new(SqlProcurementStore::new(pool.clone()));
        let services = ProcurementServices::new(
            store,
            Arc::new(InMemoryAuditSink::default()),
            &AppConfig::default(),
        );
        let engineer = Actor::new("eng-1", ActorRole::SiteEngineer);

        let start = Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).single().context("start")?;
        let end = Utc.with_ymd_and_hms(2026, 7, 15, 0, 0, 0).single().context("end")?;
        let creation = services
            .requests
            .create_request(
                &engineer,
                NewRequest {
                    project_id: ProjectId("PRJ-1".to_string()),
                    site_id: SiteId("SITE-1".to_string()),
                    title: "Slab pour".to_string(),
                    description: None,
                    planned_start: start,
                    planned_end: end,
                    emergency: false,
                    materials: vec![NewMaterial {
                        name: "Cement".to_string(),
                        quantity: Decimal::from(100),
                        unit: "bag".to_string(),
                        rate_estimate: Decimal::from(12),
                        resource_type: ResourceType::Material,
                    }],
                },
                None,
            )
            .await?;
        let RequestCreation::Created(created) = creation else {
            bail!("seed request was held back as a duplicate");
        };

        services
            .requests
            .review_material(
                &Actor::new("pm-1", ActorRole::ProjectManager),
                &created.materials[0].id,
                MaterialStatus::Approved,
                None,
            )
            .await?;

        let placed = services
            .purchase_orders
            .create_purchase_order(
                &Actor::new("buyer-1", ActorRole::Procurement),
                NewPurchaseOrder {
                    project_id: ProjectId("PRJ-1".to_string()),
                    site_id: None,
                    items: vec![NewPurchaseOrderItem {
                        request_id: created.request.id.clone(),
                        description: "Cement 50kg".to_string(),
                        quantity: Decimal::from(100),
                        unit_price: Decimal::from(11),
                    }],
                },
            )
            .await?;

        services
            .deliveries
            .record_delivery(
                &Actor::new("store-1", ActorRole::Storekeeper),
                NewDelivery {
                    purchase_order_id: placed.order.id.clone(),
                    delivered_at: start,
                    notes: None,
                    items: vec![NewDeliveryItem {
                        purchase_order_item_id: placed.items[0].id.clone(),
                        quantity: Decimal::from(60),
                        condition: DeliveryCondition::Good,
                        remarks: None,
                    }],
                },
            )
            .await?;

        pool.close().await;
        Ok::<_, anyhow::Error>(Seeded {
            request_id: created.request.id.0,
            purchase_order_id: placed.order.id.0,
        })
    })
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let keys = [
        "BOQTRACK_DATABASE_URL",
        "BOQTRACK_DATABASE_MAX_CONNECTIONS",
        "BOQTRACK_DATABASE_TIMEOUT_SECS",
        "BOQTRACK_LOGGING_LEVEL",
        "BOQTRACK_LOGGING_FORMAT",
        "BOQTRACK_LOG_LEVEL",
        "BOQTRACK_LOG_FORMAT",
        "BOQTRACK_PROCUREMENT_PURCHASE_ORDER_PREFIX",
        "BOQTRACK_PROCUREMENT_REQUEST_PREFIX",
        "BOQTRACK_PROCUREMENT_SEQUENCE_WIDTH",
        "BOQTRACK_DUPLICATES_ENABLED",
        "BOQTRACK_DUPLICATES_REQUIRE_MATERIAL_MATCH",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
