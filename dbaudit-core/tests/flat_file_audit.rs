//! Audits of CSV targets through the public API.

#![allow(clippy::unwrap_used)]

use dbaudit_core::{
    AuditConfig, AuditOptions, CaptureStore, ProviderRegistry, SourceAdapter, SourceConfig,
    SourceType, create_adapter, run_target,
};
use tempfile::TempDir;

fn config_yaml(dir: &std::path::Path) -> String {
    format!(
        r#"
people:
  type: CSVDatabase
  path: {dir}/people.csv
  name: people
  metadata: NodeType,FindAndTag,MyTag1
  metadata_parameters:
    FindAndTag:
      contact:
        object_type: [column, table]
        uuid_substring: mail
        tag: contact
  UUID_DELIMETER: "|"
  output: {dir}/people_capture.json
"#,
        dir = dir.display()
    )
}

#[tokio::test]
async fn test_flat_file_enumeration() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("people.csv");
    std::fs::write(&path, " name , mail\nAda,ada@example.com\n").unwrap();

    let config = AuditConfig::from_yaml_str(&config_yaml(dir.path())).unwrap();
    let source = config.target("people").unwrap();
    let mut adapter = create_adapter(source).unwrap();
    adapter.connect().await.unwrap();

    assert_eq!(adapter.list_tables().await.unwrap(), ["people.csv"]);
    let columns = adapter.describe_columns("people.csv").await.unwrap();
    let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["name", "mail"]);
    assert_eq!(adapter.column_type("people.csv", "mail").await.unwrap(), "String");
}

#[tokio::test]
async fn test_flat_file_audit_with_legacy_names() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("people.csv"), "name,mail\n").unwrap();

    let config = AuditConfig::from_yaml_str(&config_yaml(dir.path())).unwrap();
    let source = config.target("people").unwrap();
    let summary = run_target("people", source, &ProviderRegistry::builtin(), &AuditOptions::default())
        .await
        .unwrap();
    assert_eq!(summary.discovered, 4);

    let store = CaptureStore::load(&summary.output).await.unwrap();
    let uuids: Vec<_> = store.objects.iter().map(|o| o.uuid.as_str()).collect();
    assert_eq!(
        uuids,
        [
            "people",
            "people|people.csv",
            "people|people.csv|name|String",
            "people|people.csv|mail|String"
        ]
    );

    let mail = store.object("people|people.csv|mail|String").unwrap();
    assert_eq!(mail.field_str("tag_contact"), Some("contact"));
    assert_eq!(mail.field_str("tag"), Some("mytag1"));
    assert!(store.object("people|people.csv|name|String").unwrap().field("tag_contact").is_none());

    // recorded configuration keeps the source settings
    let recorded = &store.capture_events[0].database_config;
    assert_eq!(recorded["name"], "people");
}

#[tokio::test]
async fn test_flat_file_with_trailing_comma_header_is_audited() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("people.csv"), "id,email,\n1,a@b.c,\n").unwrap();

    let source = SourceConfig::new(
        SourceType::Csv,
        "people",
        dir.path().join("people.csv").display().to_string(),
    )
    .with_metadata("NodeType")
    .with_output(dir.path().join("people_capture.json"));

    let summary = run_target("people", &source, &ProviderRegistry::builtin(), &AuditOptions::default())
        .await
        .unwrap();
    assert!(summary.written);
    assert_eq!(summary.discovered, 5);

    let store = CaptureStore::load(&summary.output).await.unwrap();
    let unnamed = store.object("people::people.csv::column_3::String").unwrap();
    assert_eq!(unnamed.field_str("object_type"), Some("column"));
}
