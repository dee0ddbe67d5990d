//! Discovery engine: walks one source and derives metadata for every object.
//!
//! A run moves linearly through
//! `Idle -> Connected -> Enumerating -> PerObjectMetadata -> Done`, or to
//! `Failed` from any state. Enumeration produces the database node, then
//! each table followed by its columns; the metadata phase then runs every
//! configured provider, in configured order, over every produced object.
//!
//! # Failure handling
//! - A table whose columns cannot be listed (`Schema`) is skipped entirely
//!   and recorded as a diagnostic.
//! - `ProviderUnavailable` / `ProviderFormat` cost only that provider's
//!   fragments for that object and are recorded as diagnostics.
//! - Anything else (connection loss, invalid identifiers) fails the run.

use crate::adapters::SourceAdapter;
use crate::error::{AuditError, Result};
use crate::models::ObjectRecord;
use crate::providers::{CaptureContext, MetadataProvider};
use std::fmt;
use tracing::Instrument;

/// Lifecycle of one discovery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Created, nothing done yet
    Idle,
    /// The adapter is connected
    Connected,
    /// Tables and columns are being listed
    Enumerating,
    /// Providers are running over the enumerated objects
    PerObjectMetadata,
    /// The run completed
    Done,
    /// The run stopped on a fatal error
    Failed,
}

/// What a diagnostic is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A table was skipped because it could not be described
    SkippedTable {
        /// Table as reported by the adapter
        table: String,
    },
    /// A provider failed for one object
    ProviderFailed {
        /// Name the provider was configured under
        provider: String,
        /// Identifier of the object being derived
        object: String,
    },
}

/// A non-fatal problem recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// What the diagnostic is about
    pub kind: DiagnosticKind,
    /// Error message of the underlying failure
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DiagnosticKind::SkippedTable { table } => {
                write!(f, "skipped table '{}': {}", table, self.message)
            }
            DiagnosticKind::ProviderFailed { provider, object } => {
                write!(f, "provider '{}' failed on '{}': {}", provider, object, self.message)
            }
        }
    }
}

/// Result of one discovery run.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOutcome {
    /// Object records in enumeration order
    pub objects: Vec<ObjectRecord>,
    /// Skipped tables and failed provider calls
    pub diagnostics: Vec<Diagnostic>,
}

/// Drives one source adapter and the configured providers.
///
/// The engine owns its providers and its log span; nothing is shared with
/// engines of other targets.
pub struct DiscoveryEngine {
    context: CaptureContext,
    providers: Vec<Box<dyn MetadataProvider>>,
    span: tracing::Span,
    state: EngineState,
}

impl fmt::Debug for DiscoveryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryEngine")
            .field("source", &self.context.source.name)
            .field(
                "providers",
                &self.providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("state", &self.state)
            .finish()
    }
}

impl DiscoveryEngine {
    /// Creates an idle engine.
    ///
    /// # Arguments
    /// * `context` - source configuration, capture timestamp and codec
    /// * `providers` - resolved providers in evaluation order
    /// * `span` - span all of this engine's logging is recorded under
    pub fn new(
        context: CaptureContext,
        providers: Vec<Box<dyn MetadataProvider>>,
        span: tracing::Span,
    ) -> Self {
        Self {
            context,
            providers,
            span,
            state: EngineState::Idle,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Run context handed to every provider.
    pub fn context(&self) -> &CaptureContext {
        &self.context
    }

    fn transition(&mut self, next: EngineState) {
        tracing::debug!("engine state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Runs discovery against `adapter`, connecting it if needed.
    ///
    /// The engine can run again after finishing; every run starts from `Idle`.
    ///
    /// # Errors
    /// Returns the first fatal error; the engine is then `Failed`.
    pub async fn discover(&mut self, adapter: &mut dyn SourceAdapter) -> Result<DiscoveryOutcome> {
        let span = self.span.clone();
        let result = self.run(adapter).instrument(span.clone()).await;

        if let Err(error) = &result {
            let _entered = span.enter();
            tracing::error!("discovery failed in state {:?}: {}", self.state, error);
            self.transition(EngineState::Failed);
        }

        result
    }

    async fn run(&mut self, adapter: &mut dyn SourceAdapter) -> Result<DiscoveryOutcome> {
        self.state = EngineState::Idle;

        adapter.connect().await?;
        self.transition(EngineState::Connected);

        let mut outcome = DiscoveryOutcome::default();

        self.transition(EngineState::Enumerating);
        outcome.objects = self.enumerate(&*adapter, &mut outcome.diagnostics).await?;
        tracing::info!(
            "enumerated {} objects from '{}'",
            outcome.objects.len(),
            adapter.database_name()
        );

        self.transition(EngineState::PerObjectMetadata);
        for record in &mut outcome.objects {
            derive_all(&self.providers, &self.context, record, &mut outcome.diagnostics).await?;
        }

        self.transition(EngineState::Done);
        Ok(outcome)
    }

    async fn enumerate(
        &self,
        adapter: &dyn SourceAdapter,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<Vec<ObjectRecord>> {
        let codec = &self.context.codec;
        let database = adapter.database_name();

        let mut objects = vec![ObjectRecord::new(codec.database(database)?)];

        for table in adapter.list_tables().await? {
            let columns = match adapter.describe_columns(&table).await {
                Ok(columns) => columns,
                Err(error) if error.is_schema_failure() => {
                    tracing::warn!("skipping table '{}': {}", table, error);
                    diagnostics.push(Diagnostic {
                        kind: DiagnosticKind::SkippedTable {
                            table: table.clone(),
                        },
                        message: error.to_string(),
                    });
                    continue;
                }
                Err(error) => return Err(error),
            };

            objects.push(ObjectRecord::new(codec.table(database, &table)?));
            for column in &columns {
                objects.push(ObjectRecord::new(codec.column(
                    database,
                    &table,
                    &column.name,
                    &column.data_type,
                )?));
            }
            tracing::trace!("table '{}': {} columns", table, columns.len());
        }

        Ok(objects)
    }
}

/// Runs every provider over one record, merging fragments in order.
async fn derive_all(
    providers: &[Box<dyn MetadataProvider>],
    context: &CaptureContext,
    record: &mut ObjectRecord,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<()> {
    for provider in providers {
        match provider.derive(&record.uuid, context).await {
            Ok(fragments) => {
                for fragment in fragments {
                    record.merge_fragment(fragment);
                }
            }
            Err(error) if error.is_provider_failure() => {
                tracing::warn!("{}", error);
                diagnostics.push(Diagnostic {
                    kind: DiagnosticKind::ProviderFailed {
                        provider: provider.name().to_string(),
                        object: record.uuid.to_string(),
                    },
                    message: provider_failure_message(&error),
                });
            }
            Err(error) => return Err(error),
        }
    }
    Ok(())
}

fn provider_failure_message(error: &AuditError) -> String {
    match error {
        AuditError::ProviderUnavailable { context, .. } => format!("unavailable: {}", context),
        AuditError::ProviderFormat { context, .. } => format!("malformed answer: {}", context),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ColumnInfo;
    use crate::config::SourceConfig;
    use crate::identifier::ObjectId;
    use crate::models::{Fragment, SourceType};
    use crate::providers::{ProviderRegistry, fragment};
    use async_trait::async_trait;
    use serde_json::json;

    /// In-memory source; tables listed in `vanished` fail to describe.
    struct MemorySource {
        connected: bool,
        tables: Vec<(String, Vec<ColumnInfo>)>,
        vanished: Vec<String>,
    }

    impl MemorySource {
        fn shop() -> Self {
            Self {
                connected: false,
                tables: vec![
                    (
                        "customers".to_string(),
                        vec![ColumnInfo::new("name", "TEXT")],
                    ),
                    (
                        "orders".to_string(),
                        vec![
                            ColumnInfo::new("id", "INTEGER"),
                            ColumnInfo::new("email", "TEXT"),
                        ],
                    ),
                ],
                vanished: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl SourceAdapter for MemorySource {
        async fn connect(&mut self) -> Result<()> {
            self.connected = true;
            Ok(())
        }

        async fn list_tables(&self) -> Result<Vec<String>> {
            Ok(self.tables.iter().map(|(name, _)| name.clone()).collect())
        }

        async fn list_columns(&self, table: &str) -> Result<Vec<String>> {
            Ok(self
                .describe_columns(table)
                .await?
                .into_iter()
                .map(|c| c.name)
                .collect())
        }

        async fn column_type(&self, table: &str, column: &str) -> Result<String> {
            self.describe_columns(table)
                .await?
                .into_iter()
                .find(|c| c.name == column)
                .map(|c| c.data_type)
                .ok_or_else(|| AuditError::schema(table, "no such column"))
        }

        async fn describe_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
            if self.vanished.iter().any(|t| t == table) {
                return Err(AuditError::schema(table, "table does not exist"));
            }
            self.tables
                .iter()
                .find(|(name, _)| name == table)
                .map(|(_, columns)| columns.clone())
                .ok_or_else(|| AuditError::schema(table, "table does not exist"))
        }

        fn source_type(&self) -> SourceType {
            SourceType::Sqlite
        }

        fn database_name(&self) -> &str {
            "shop"
        }

        fn is_connected(&self) -> bool {
            self.connected
        }
    }

    /// Fails with `ProviderUnavailable` on every column.
    struct FlakyProvider;

    #[async_trait]
    impl MetadataProvider for FlakyProvider {
        fn name(&self) -> &str {
            "Flaky"
        }

        async fn derive(&self, id: &ObjectId, _: &CaptureContext) -> Result<Vec<Fragment>> {
            if id.as_str().split("::").count() == 4 {
                Err(AuditError::provider_unavailable("Flaky", "service down"))
            } else {
                Ok(vec![fragment("flaky", "ok")])
            }
        }
    }

    fn engine(metadata: &str, extra: Vec<Box<dyn MetadataProvider>>) -> DiscoveryEngine {
        let source = SourceConfig::new(SourceType::Sqlite, "shop", "shop.db")
            .with_metadata(metadata)
            .with_parameters(
                "PredicateTag",
                json!({"email_rule": {"object_type": "column", "uuid_substring": "email", "tag": "pii_email"}}),
            );
        let mut providers = ProviderRegistry::builtin().resolve(&source).unwrap();
        providers.extend(extra);
        let context = CaptureContext::new(source, chrono::Utc::now()).unwrap();
        DiscoveryEngine::new(context, providers, tracing::Span::none())
    }

    fn uuids(outcome: &DiscoveryOutcome) -> Vec<&str> {
        outcome.objects.iter().map(|o| o.uuid.as_str()).collect()
    }

    #[tokio::test]
    async fn test_enumeration_order_and_metadata() {
        let mut engine = engine("NodeType,PredicateTag", Vec::new());
        let mut source = MemorySource::shop();

        let outcome = engine.discover(&mut source).await.unwrap();
        assert_eq!(engine.state(), EngineState::Done);
        assert!(source.is_connected());
        assert_eq!(
            uuids(&outcome),
            vec![
                "shop",
                "shop::customers",
                "shop::customers::name::TEXT",
                "shop::orders",
                "shop::orders::id::INTEGER",
                "shop::orders::email::TEXT",
            ]
        );

        let email = &outcome.objects[5];
        assert_eq!(email.field_str("object_type"), Some("column"));
        assert_eq!(email.field_str("tag_email_rule"), Some("pii_email"));
        assert_eq!(outcome.objects[0].field_str("object_type"), Some("database"));
        assert!(outcome.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_vanished_table_is_skipped_with_diagnostic() {
        let mut engine = engine("NodeType", Vec::new());
        let mut source = MemorySource::shop();
        source.vanished.push("customers".to_string());

        let outcome = engine.discover(&mut source).await.unwrap();
        assert_eq!(
            uuids(&outcome),
            vec![
                "shop",
                "shop::orders",
                "shop::orders::id::INTEGER",
                "shop::orders::email::TEXT",
            ]
        );
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(
            outcome.diagnostics[0].kind,
            DiagnosticKind::SkippedTable {
                table: "customers".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_provider_failure_is_isolated() {
        let mut engine = engine("NodeType", vec![Box::new(FlakyProvider)]);
        let mut source = MemorySource::shop();

        let outcome = engine.discover(&mut source).await.unwrap();
        assert_eq!(outcome.objects.len(), 6);
        // Three columns, one diagnostic each
        assert_eq!(outcome.diagnostics.len(), 3);
        for record in &outcome.objects {
            // NodeType still ran on every object
            assert!(record.field("object_type").is_some());
        }
        assert_eq!(outcome.objects[1].field_str("flaky"), Some("ok"));
        assert!(outcome.objects[2].field("flaky").is_none());
        assert!(outcome.diagnostics[0].to_string().contains("Flaky"));
    }

    #[tokio::test]
    async fn test_last_provider_wins_on_collision() {
        let mut engine = engine(
            "",
            vec![
                Box::new(crate::providers::StaticTagProvider::new("first", "one")),
                Box::new(crate::providers::StaticTagProvider::new("second", "two")),
            ],
        );
        let outcome = engine.discover(&mut MemorySource::shop()).await.unwrap();
        assert!(outcome.objects.iter().all(|o| o.field_str("tag") == Some("two")));
    }

    #[tokio::test]
    async fn test_invalid_identifier_fails_run() {
        let mut engine = engine("NodeType", Vec::new());
        let mut source = MemorySource::shop();
        source.tables.push(("bad::name".to_string(), Vec::new()));

        let result = engine.discover(&mut source).await;
        assert!(matches!(result, Err(AuditError::InvalidIdentifier { .. })));
        assert_eq!(engine.state(), EngineState::Failed);
    }

    #[tokio::test]
    async fn test_rerun_is_deterministic() {
        let mut engine = engine("NodeType,PredicateTag,CaptureDate", Vec::new());
        let mut source = MemorySource::shop();

        let first = engine.discover(&mut source).await.unwrap();
        let second = engine.discover(&mut source).await.unwrap();
        assert_eq!(first.objects, second.objects);
    }
}
