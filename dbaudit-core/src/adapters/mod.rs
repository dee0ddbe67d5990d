//! Source adapters for schema enumeration.
//!
//! Every source (relational database, flat file) is reached through the
//! [`SourceAdapter`] capability set: connect once, list tables, list a
//! table's columns and report a column's type. The discovery engine only
//! talks to this trait, so new source kinds plug in without touching it.
//!
//! # Module Structure
//! - `config`: connection settings shared by the SQL adapters
//! - `sqlite`: SQLite files via `sqlite_master` and `pragma_table_info`
//! - `postgres` / `mysql`: `information_schema` catalogs
//! - `flat_file`: CSV files as a single pseudo-table

use crate::config::SourceConfig;
use crate::error::{AuditError, Result};
use crate::models::SourceType;
use async_trait::async_trait;

pub mod config;
pub mod flat_file;

#[cfg(any(feature = "sqlite", feature = "postgresql", feature = "mysql"))]
mod helpers;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgresql")]
pub mod postgres;

#[cfg(feature = "mysql")]
pub mod mysql;

pub use config::ConnectionConfig;
pub use flat_file::FlatFileSource;

/// A column name with its source-reported type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// Type as reported by the source
    pub data_type: String,
}

impl ColumnInfo {
    /// Creates a column description.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Capability set every source adapter implements.
///
/// # Contract
/// - `connect` is idempotent: calling it on a connected adapter is a no-op.
/// - `list_tables` returns names in a source-defined but stable order.
/// - `list_columns` and `column_type` fail with [`AuditError::Schema`] when
///   the table (or column) does not exist at call time.
/// - Listing before `connect` fails with [`AuditError::Connection`].
///
/// # Object Safety
/// This trait is object-safe; the factory hands out `Box<dyn SourceAdapter>`.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Opens the source.
    ///
    /// # Errors
    /// Returns `Connection` if the source is unreachable or malformed.
    async fn connect(&mut self) -> Result<()>;

    /// Lists table names.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Lists the column names of one table in ordinal order.
    async fn list_columns(&self, table: &str) -> Result<Vec<String>>;

    /// Reports the type of one column.
    async fn column_type(&self, table: &str, column: &str) -> Result<String>;

    /// Lists columns together with their types.
    ///
    /// The default implementation combines `list_columns` and
    /// `column_type`; adapters with a catalog that returns both at once
    /// override it with a single query.
    async fn describe_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let mut columns = Vec::new();
        for column in self.list_columns(table).await? {
            let data_type = self.column_type(table, &column).await?;
            columns.push(ColumnInfo::new(column, data_type));
        }
        Ok(columns)
    }

    /// Source type this adapter handles.
    fn source_type(&self) -> SourceType;

    /// Name used as the database segment of identifiers.
    fn database_name(&self) -> &str;

    /// Whether `connect` has succeeded.
    fn is_connected(&self) -> bool;
}

/// Creates the adapter selected by a source configuration.
///
/// The adapter is returned unconnected; no I/O happens here.
///
/// # Errors
/// Returns a configuration error for a missing descriptor, or
/// `UnsupportedFeature` when the driver for the source type is not compiled in.
pub fn create_adapter(config: &SourceConfig) -> Result<Box<dyn SourceAdapter>> {
    let descriptor = config.descriptor().ok_or_else(|| {
        AuditError::configuration(format!(
            "source '{}' needs a connection_string or path",
            config.name
        ))
    })?;

    match config.source_type {
        #[cfg(feature = "sqlite")]
        SourceType::Sqlite => Ok(Box::new(sqlite::SqliteSource::new(
            &descriptor,
            &config.name,
        )?)),
        #[cfg(not(feature = "sqlite"))]
        SourceType::Sqlite => Err(AuditError::unsupported_feature(
            "SQLite adapter",
            "Compile with --features sqlite to enable SQLite support",
        )),
        #[cfg(feature = "postgresql")]
        SourceType::Postgres => Ok(Box::new(postgres::PostgresSource::new(
            &descriptor,
            &config.name,
        )?)),
        #[cfg(not(feature = "postgresql"))]
        SourceType::Postgres => Err(AuditError::unsupported_feature(
            "PostgreSQL adapter",
            "Compile with --features postgresql to enable PostgreSQL support",
        )),
        #[cfg(feature = "mysql")]
        SourceType::Mysql => Ok(Box::new(mysql::MySqlSource::new(
            &descriptor,
            &config.name,
        )?)),
        #[cfg(not(feature = "mysql"))]
        SourceType::Mysql => Err(AuditError::unsupported_feature(
            "MySQL adapter",
            "Compile with --features mysql to enable MySQL support",
        )),
        SourceType::Csv => Ok(Box::new(FlatFileSource::new(&descriptor, &config.name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_csv_adapter_is_unconnected() {
        let config = SourceConfig::new(SourceType::Csv, "customers", "customers.csv");
        let adapter = create_adapter(&config).unwrap();
        assert_eq!(adapter.source_type(), SourceType::Csv);
        assert_eq!(adapter.database_name(), "customers");
        assert!(!adapter.is_connected());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_create_sqlite_adapter() {
        let config = SourceConfig::new(SourceType::Sqlite, "shop", "shop.db");
        let adapter = create_adapter(&config).unwrap();
        assert_eq!(adapter.source_type(), SourceType::Sqlite);
        assert!(!adapter.is_connected());
    }

    #[test]
    fn test_create_adapter_requires_descriptor() {
        let mut config = SourceConfig::new(SourceType::Sqlite, "shop", "shop.db");
        config.connection_string = None;
        assert!(matches!(
            create_adapter(&config),
            Err(AuditError::Configuration { .. })
        ));
    }
}
