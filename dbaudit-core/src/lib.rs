//! Core library for dbaudit.
//!
//! dbaudit discovers the schema of configured sources (SQL databases and
//! flat files), gives every database, table and column a stable delimited
//! identifier, attaches metadata derived by pluggable providers, and
//! accumulates the results of repeated runs in a capture store.
//!
//! # Pipeline
//! 1. [`ProviderRegistry::resolve`] turns configured provider names into
//!    providers, failing fast on unknown names.
//! 2. A [`SourceAdapter`] from [`create_adapter`] connects to the source and
//!    enumerates tables, columns and column types.
//! 3. The [`DiscoveryEngine`] builds identifiers with the
//!    [`IdentifierCodec`] and runs every provider over every object.
//! 4. The [`CaptureStore`] appends a capture event and merges the objects.
//!
//! [`audit::run_target`] chains these steps for one configured target.
//!
//! # Guarantees
//! - Sources are only read; SQL sessions are opened read-only
//! - Connection strings are redacted before they reach logs or capture files
//! - Identifiers are stable across runs over an unchanged source

pub mod adapters;
pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod identifier;
pub mod logging;
pub mod models;
pub mod providers;
pub mod store;

// Re-export commonly used types
pub use adapters::{ColumnInfo, ConnectionConfig, SourceAdapter, create_adapter};
pub use audit::{AuditOptions, AuditSummary, run_target};
pub use config::{AuditConfig, SourceConfig};
pub use engine::{Diagnostic, DiagnosticKind, DiscoveryEngine, DiscoveryOutcome, EngineState};
pub use error::{AuditError, Result};
pub use identifier::{DEFAULT_DELIMITER, IdentifierCodec, IdentifierParts, ObjectId, ObjectKind};
pub use logging::init_logging;
pub use models::{CaptureEvent, Fragment, ObjectRecord, SourceType};
pub use providers::{CaptureContext, MetadataProvider, ProviderRegistry};
pub use store::CaptureStore;
