//! Per-target audit runner.
//!
//! One call to [`run_target`] audits one configured source end to end:
//! providers are resolved before any I/O, the adapter is connected and
//! walked by a fresh [`DiscoveryEngine`], and the outcome is merged into the
//! target's capture store. Nothing is shared between targets.

use crate::adapters::create_adapter;
use crate::config::SourceConfig;
use crate::engine::DiscoveryEngine;
use crate::error::{AuditError, Result};
use crate::logging::audit_span;
use crate::models::CaptureEvent;
use crate::providers::{CaptureContext, ProviderRegistry};
use crate::store::CaptureStore;
use chrono::Utc;
use std::path::PathBuf;
use tracing::Instrument;

/// Options for one audit run.
#[derive(Debug, Clone, Default)]
pub struct AuditOptions {
    /// Free-text comment recorded in the capture event
    pub comment: Option<String>,
    /// Discover and merge in memory but leave the store file untouched
    pub dry_run: bool,
    /// Start a fresh store when the existing one cannot be parsed
    pub overwrite_corrupt: bool,
}

/// What one audit run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditSummary {
    /// Target name from the configuration
    pub target: String,
    /// Objects discovered in this run
    pub discovered: usize,
    /// Objects in the store after merging
    pub total_objects: usize,
    /// Capture events in the store after merging
    pub capture_events: usize,
    /// Diagnostics recorded in this run
    pub diagnostics: usize,
    /// Capture store path
    pub output: PathBuf,
    /// Whether the store file was written
    pub written: bool,
}

/// Audits one target.
///
/// # Errors
/// - `UnknownProvider` or a provider configuration error, before any I/O
/// - `Connection` if the source cannot be opened
/// - `CorruptStore` if the existing store is unreadable and
///   `overwrite_corrupt` is not set
/// - `InvalidIdentifier` if a discovered name cannot form an identifier
pub async fn run_target(
    target: &str,
    source: &SourceConfig,
    registry: &ProviderRegistry,
    options: &AuditOptions,
) -> Result<AuditSummary> {
    let span = audit_span(target);
    run_target_in(target, source, registry, options, span.clone())
        .instrument(span)
        .await
}

async fn run_target_in(
    target: &str,
    source: &SourceConfig,
    registry: &ProviderRegistry,
    options: &AuditOptions,
    span: tracing::Span,
) -> Result<AuditSummary> {
    source.validate()?;
    let providers = registry.resolve(source)?;
    tracing::info!(
        "Auditing {} source '{}' with {} provider(s)",
        source.source_type,
        source.name,
        providers.len()
    );

    let timestamp = Utc::now();
    let context = CaptureContext::new(source.clone(), timestamp)?;
    let mut adapter = create_adapter(source)?;
    let mut engine = DiscoveryEngine::new(context, providers, span);
    let outcome = engine.discover(adapter.as_mut()).await?;

    let output = source.output_path();
    let mut store = match CaptureStore::load_or_default(&output).await {
        Ok(store) => store,
        Err(error @ AuditError::CorruptStore { .. }) => {
            if options.overwrite_corrupt {
                tracing::warn!("{}; starting a fresh store", error);
                CaptureStore::new()
            } else {
                return Err(error);
            }
        }
        Err(error) => return Err(error),
    };

    let diagnostics: Vec<String> = outcome.diagnostics.iter().map(ToString::to_string).collect();
    let event = CaptureEvent::new(timestamp, source.redacted_json()?, options.comment.clone())
        .with_diagnostics(diagnostics);

    let discovered = outcome.objects.len();
    let diagnostic_count = outcome.diagnostics.len();
    store.merge(vec![event], outcome.objects);

    let written = if options.dry_run {
        tracing::info!("Dry run: not writing {}", output.display());
        false
    } else {
        store.save(&output).await?;
        true
    };

    Ok(AuditSummary {
        target: target.to_string(),
        discovered,
        total_objects: store.objects.len(),
        capture_events: store.capture_events.len(),
        diagnostics: diagnostic_count,
        output,
        written,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;

    fn csv_source(dir: &std::path::Path) -> SourceConfig {
        let csv = dir.join("customers.csv");
        std::fs::write(&csv, "id,email\n1,someone@example.com\n").unwrap();
        SourceConfig::new(SourceType::Csv, "customers", csv.display().to_string())
            .with_metadata("NodeType,MyTag1")
            .with_output(dir.join("customers_capture.json"))
    }

    #[tokio::test]
    async fn test_unknown_provider_fails_before_io() {
        let source = SourceConfig::new(SourceType::Csv, "customers", "/nonexistent/customers.csv")
            .with_metadata("NodeType,Nope");
        let result = run_target(
            "customers",
            &source,
            &ProviderRegistry::builtin(),
            &AuditOptions::default(),
        )
        .await;
        assert!(matches!(result, Err(AuditError::UnknownProvider { .. })));
    }

    #[tokio::test]
    async fn test_connection_failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.json");
        let source = SourceConfig::new(SourceType::Csv, "customers", "/nonexistent/customers.csv")
            .with_output(&output);
        let result = run_target(
            "customers",
            &source,
            &ProviderRegistry::builtin(),
            &AuditOptions::default(),
        )
        .await;
        assert!(matches!(result, Err(AuditError::Connection { .. })));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_flat_file_audit_and_dry_run() {
        let dir = tempfile::tempdir().unwrap();
        let source = csv_source(dir.path());
        let registry = ProviderRegistry::builtin();

        let dry = AuditOptions {
            dry_run: true,
            ..Default::default()
        };
        let summary = run_target("customers", &source, &registry, &dry).await.unwrap();
        assert!(!summary.written);
        assert!(!summary.output.exists());

        let summary = run_target("customers", &source, &registry, &AuditOptions::default())
            .await
            .unwrap();
        assert!(summary.written);
        // database, the pseudo-table and two columns
        assert_eq!(summary.discovered, 4);
        assert_eq!(summary.capture_events, 1);

        let store = CaptureStore::load(&summary.output).await.unwrap();
        let column = store
            .object("customers::customers.csv::email::String")
            .unwrap();
        assert_eq!(column.field_str("object_type"), Some("column"));
        assert_eq!(column.field_str("tag"), Some("mytag1"));
    }

    #[tokio::test]
    async fn test_corrupt_store_requires_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let source = csv_source(dir.path());
        let registry = ProviderRegistry::builtin();
        std::fs::write(source.output_path(), "garbage").unwrap();

        let result = run_target("customers", &source, &registry, &AuditOptions::default()).await;
        assert!(matches!(result, Err(AuditError::CorruptStore { .. })));
        assert_eq!(std::fs::read_to_string(source.output_path()).unwrap(), "garbage");

        let overwrite = AuditOptions {
            overwrite_corrupt: true,
            comment: Some("rebuilt".to_string()),
            ..Default::default()
        };
        let summary = run_target("customers", &source, &registry, &overwrite)
            .await
            .unwrap();
        assert_eq!(summary.capture_events, 1);

        let store = CaptureStore::load(&summary.output).await.unwrap();
        assert_eq!(store.capture_events[0].comment.as_deref(), Some("rebuilt"));
    }
}
