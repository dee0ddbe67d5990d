//! End-to-end audits of SQLite fixtures.
//!
//! Fixture databases are created through a separate read-write pool; the
//! audit itself opens them read-only.

#![cfg(feature = "sqlite")]
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use dbaudit_core::{
    AuditError, AuditOptions, CaptureContext, CaptureStore, MetadataProvider, ObjectId,
    ProviderRegistry, SourceConfig, SourceType, models::Fragment, run_target,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use tempfile::TempDir;

async fn execute(path: &Path, statements: &[&str]) {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("open fixture database");
    for statement in statements {
        sqlx::query(statement)
            .execute(&pool)
            .await
            .expect("run fixture statement");
    }
    pool.close().await;
}

fn shop_source(dir: &Path) -> SourceConfig {
    SourceConfig::new(
        SourceType::Sqlite,
        "shop",
        dir.join("shop.db").display().to_string(),
    )
    .with_metadata("NodeType,CaptureDate,PredicateTag")
    .with_parameters(
        "PredicateTag",
        serde_json::json!({
            "email_rule": {
                "object_type": "column",
                "uuid_substring": "email",
                "tag": "pii_email"
            }
        }),
    )
    .with_output(dir.join("shop_capture.json"))
}

async fn shop_fixture() -> (TempDir, SourceConfig) {
    let dir = TempDir::new().unwrap();
    execute(
        &dir.path().join("shop.db"),
        &["CREATE TABLE orders (email TEXT)"],
    )
    .await;
    let source = shop_source(dir.path());
    (dir, source)
}

fn uuids(store: &CaptureStore) -> Vec<&str> {
    store.objects.iter().map(|o| o.uuid.as_str()).collect()
}

#[tokio::test]
async fn test_sqlite_audit_tags_objects() {
    let (_dir, source) = shop_fixture().await;
    let summary = run_target("shop", &source, &ProviderRegistry::builtin(), &AuditOptions::default())
        .await
        .unwrap();
    assert_eq!(summary.discovered, 3);
    assert_eq!(summary.diagnostics, 0);

    let store = CaptureStore::load(&summary.output).await.unwrap();
    assert_eq!(uuids(&store), ["shop", "shop::orders", "shop::orders::email::TEXT"]);

    let database = store.object("shop").unwrap();
    assert_eq!(database.field_str("object_type"), Some("database"));
    assert!(database.field("tag_email_rule").is_none());

    let table = store.object("shop::orders").unwrap();
    assert_eq!(table.field_str("object_type"), Some("table"));

    let column = store.object("shop::orders::email::TEXT").unwrap();
    assert_eq!(column.field_str("object_type"), Some("column"));
    assert_eq!(column.field_str("tag_email_rule"), Some("pii_email"));
    let captured = column.field_str("capture_date").unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(captured).is_ok());

    assert_eq!(store.capture_events.len(), 1);
    assert!(store.capture_events[0].diagnostics.is_empty());
}

#[tokio::test]
async fn test_sqlite_rerun_after_schema_change() {
    let (dir, source) = shop_fixture().await;
    let registry = ProviderRegistry::builtin();

    let first = AuditOptions {
        comment: Some("initial".to_string()),
        ..Default::default()
    };
    run_target("shop", &source, &registry, &first).await.unwrap();

    execute(
        &dir.path().join("shop.db"),
        &["ALTER TABLE orders ADD COLUMN phone TEXT"],
    )
    .await;

    let second = AuditOptions {
        comment: Some("after phone".to_string()),
        ..Default::default()
    };
    let summary = run_target("shop", &source, &registry, &second).await.unwrap();
    assert_eq!(summary.total_objects, 4);
    assert_eq!(summary.capture_events, 2);

    let store = CaptureStore::load(&summary.output).await.unwrap();
    assert_eq!(
        uuids(&store),
        [
            "shop",
            "shop::orders",
            "shop::orders::email::TEXT",
            "shop::orders::phone::TEXT"
        ]
    );
    let comments: Vec<_> = store
        .capture_events
        .iter()
        .map(|e| e.comment.as_deref())
        .collect();
    assert_eq!(comments, [Some("initial"), Some("after phone")]);
    assert!(store.capture_events[0].timestamp <= store.capture_events[1].timestamp);
}

#[tokio::test]
async fn test_sqlite_vanished_column_is_retained() {
    let (dir, source) = shop_fixture().await;
    let registry = ProviderRegistry::builtin();
    run_target("shop", &source, &registry, &AuditOptions::default())
        .await
        .unwrap();

    execute(
        &dir.path().join("shop.db"),
        &["DROP TABLE orders", "CREATE TABLE orders (id INTEGER)"],
    )
    .await;
    let summary = run_target("shop", &source, &registry, &AuditOptions::default())
        .await
        .unwrap();

    let store = CaptureStore::load(&summary.output).await.unwrap();
    assert!(store.object("shop::orders::email::TEXT").is_some());
    assert!(store.object("shop::orders::id::INTEGER").is_some());
}

#[tokio::test]
async fn test_sqlite_reruns_are_deterministic_apart_from_capture_date() {
    let (dir, source) = shop_fixture().await;
    let registry = ProviderRegistry::builtin();

    let first_output = dir.path().join("first.json");
    let second_output = dir.path().join("second.json");
    run_target(
        "shop",
        &source.clone().with_output(&first_output),
        &registry,
        &AuditOptions::default(),
    )
    .await
    .unwrap();
    run_target(
        "shop",
        &source.clone().with_output(&second_output),
        &registry,
        &AuditOptions::default(),
    )
    .await
    .unwrap();

    let first = CaptureStore::load(&first_output).await.unwrap();
    let second = CaptureStore::load(&second_output).await.unwrap();
    let strip = |store: &CaptureStore| {
        store
            .objects
            .iter()
            .map(|o| o.without_fields(&["capture_date"]))
            .collect::<Vec<_>>()
    };
    assert_eq!(strip(&first), strip(&second));
}

#[tokio::test]
async fn test_merge_of_same_results_is_idempotent() {
    let (_dir, source) = shop_fixture().await;
    let summary = run_target("shop", &source, &ProviderRegistry::builtin(), &AuditOptions::default())
        .await
        .unwrap();
    let stored = CaptureStore::load(&summary.output).await.unwrap();

    let mut merged = stored.clone();
    merged.merge(stored.capture_events.clone(), stored.objects.clone());
    assert_eq!(merged.objects, stored.objects);
    assert_eq!(merged.capture_events.len(), stored.capture_events.len() + 1);
}

struct OfflineProvider {
    name: String,
}

#[async_trait]
impl MetadataProvider for OfflineProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn derive(
        &self,
        _id: &ObjectId,
        _context: &CaptureContext,
    ) -> dbaudit_core::Result<Vec<Fragment>> {
        Err(AuditError::provider_unavailable(&self.name, "service offline"))
    }
}

fn offline(
    name: &str,
    _parameters: Option<&serde_json::Value>,
) -> dbaudit_core::Result<Box<dyn MetadataProvider>> {
    Ok(Box::new(OfflineProvider {
        name: name.to_string(),
    }))
}

#[tokio::test]
async fn test_failing_provider_does_not_stop_the_audit() {
    let (_dir, source) = shop_fixture().await;
    let source = source.with_metadata("NodeType,Offline");
    let mut registry = ProviderRegistry::builtin();
    registry.register("Offline", offline);

    let summary = run_target("shop", &source, &registry, &AuditOptions::default())
        .await
        .unwrap();
    assert_eq!(summary.discovered, 3);
    assert_eq!(summary.diagnostics, 3);

    let store = CaptureStore::load(&summary.output).await.unwrap();
    for object in &store.objects {
        assert!(object.field("object_type").is_some());
    }
    let diagnostics = &store.capture_events[0].diagnostics;
    assert_eq!(diagnostics.len(), 3);
    assert!(diagnostics.iter().all(|d| d.contains("Offline")));
}

#[tokio::test]
async fn test_unknown_provider_leaves_store_untouched() {
    let (_dir, source) = shop_fixture().await;
    let source = source.with_metadata("NodeType,Offline");

    let result = run_target("shop", &source, &ProviderRegistry::builtin(), &AuditOptions::default()).await;
    assert!(matches!(result, Err(AuditError::UnknownProvider { .. })));
    assert!(!source.output_path().exists());
}
