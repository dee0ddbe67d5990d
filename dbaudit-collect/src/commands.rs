//! Command implementations.
//!
//! Commands return their human-readable output instead of printing it, so
//! `main.rs` decides where it goes and tests can inspect it.

use crate::{ALL_TARGETS, AuditArgs, TargetArgs};
use anyhow::{Context, Result};
use dbaudit_core::{
    AuditConfig, AuditOptions, AuditSummary, ProviderRegistry, SourceConfig, create_adapter,
    error::redact_connection_string, run_target,
};
use std::fmt::Write as _;
use tracing::{error, info};

/// Outcome of an `audit` command over one or more targets.
#[derive(Debug, Default)]
pub struct AuditReport {
    /// Summaries of the targets audited successfully, in run order
    pub succeeded: Vec<AuditSummary>,
    /// Target name and error message of every failed target
    pub failed: Vec<(String, String)>,
}

impl AuditReport {
    /// Whether every selected target was audited.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// One line per target.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for summary in &self.succeeded {
            let _ = writeln!(
                out,
                "{}: {} objects discovered, {} in store, {} capture events, {} diagnostics -> {}{}",
                summary.target,
                summary.discovered,
                summary.total_objects,
                summary.capture_events,
                summary.diagnostics,
                summary.output.display(),
                if summary.written { "" } else { " (not written)" }
            );
        }
        for (target, message) in &self.failed {
            let _ = writeln!(out, "{}: FAILED: {}", target, message);
        }
        out
    }
}

fn load_config(path: &std::path::Path) -> Result<AuditConfig> {
    AuditConfig::load(path)
        .with_context(|| format!("Failed to load configuration {}", path.display()))
}

/// Targets selected by name, or all targets in name order for `All`.
fn select_targets<'a>(config: &'a AuditConfig, target: &str) -> Result<Vec<(&'a str, &'a SourceConfig)>> {
    if target.eq_ignore_ascii_case(ALL_TARGETS) {
        return Ok(config
            .targets
            .iter()
            .map(|(name, source)| (name.as_str(), source))
            .collect());
    }

    let (name, source) = config
        .targets
        .get_key_value(target)
        .with_context(|| format!("No target named '{}' in configuration", target))?;
    Ok(vec![(name.as_str(), source)])
}

/// Audits the selected targets one after another.
///
/// A failing target is logged and recorded; the remaining targets still run.
///
/// # Errors
/// Only configuration loading and target selection fail the whole command.
pub async fn audit(args: &AuditArgs) -> Result<AuditReport> {
    let config = load_config(&args.config)?;
    let targets = select_targets(&config, &args.target)?;
    let registry = ProviderRegistry::builtin();
    let options = AuditOptions {
        comment: args.comment.clone(),
        dry_run: args.no_update,
        overwrite_corrupt: args.overwrite_corrupt,
    };

    let mut report = AuditReport::default();
    for (name, source) in targets {
        info!("Starting audit of target '{}'", name);
        match run_target(name, source, &registry, &options).await {
            Ok(summary) => {
                info!(
                    "✓ Target '{}' audited: {} objects",
                    name, summary.discovered
                );
                report.succeeded.push(summary);
            }
            Err(e) => {
                error!("Audit of target '{}' failed: {}", name, e);
                report.failed.push((name.to_string(), e.to_string()));
            }
        }
    }

    Ok(report)
}

/// Lists a target's tables and columns with their types.
pub async fn status(args: &TargetArgs) -> Result<String> {
    let config = load_config(&args.config)?;
    let source = config.target(&args.target)?;
    source.validate()?;

    let mut adapter = create_adapter(source)?;
    adapter.connect().await?;

    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", source.name, source.source_type);
    for table in adapter.list_tables().await? {
        match adapter.describe_columns(&table).await {
            Ok(columns) => {
                let _ = writeln!(out, "  {}", table);
                for column in columns {
                    let _ = writeln!(out, "    {}: {}", column.name, column.data_type);
                }
            }
            Err(e) if e.is_schema_failure() => {
                let _ = writeln!(out, "  {} (skipped: {})", table, e);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(out)
}

/// Connects to a target and reports success.
pub async fn test_connection(args: &TargetArgs) -> Result<String> {
    let config = load_config(&args.config)?;
    let source = config.target(&args.target)?;
    source.validate()?;
    let descriptor = source
        .descriptor()
        .map(|d| redact_connection_string(&d))
        .unwrap_or_default();

    info!("Testing connection to {}", descriptor);
    let mut adapter = create_adapter(source)?;
    adapter
        .connect()
        .await
        .with_context(|| format!("Connection test for target '{}' failed", args.target))?;

    Ok(format!(
        "Connection to {} source '{}' successful",
        source.source_type, source.name
    ))
}

/// Registered provider names, one per line.
pub fn providers() -> String {
    let mut out = String::new();
    for name in ProviderRegistry::builtin().names() {
        let _ = writeln!(out, "{}", name);
    }
    out
}

/// Sample configuration as YAML.
pub fn sample_config() -> Result<String> {
    Ok(AuditConfig::sample().to_yaml()?)
}
