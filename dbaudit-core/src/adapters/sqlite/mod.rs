//! SQLite source adapter.
//!
//! # Module Structure
//! - `connection`: connection string handling and pool creation
//!
//! # SQLite-Specific Behavior
//! - Tables come from `sqlite_master`, internal `sqlite_%` tables excluded
//! - Columns come from the `pragma_table_info` table-valued function
//! - A column declared without a type is reported as `BLOB`, the affinity
//!   SQLite gives such columns
//! - The file is opened read-only through a single connection

pub mod connection;


use super::helpers::bounded;
use super::{ColumnInfo, ConnectionConfig, SourceAdapter};
use crate::Result;
use crate::error::AuditError;
use crate::models::SourceType;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

pub use connection::{normalize_connection_string, validate_sqlite_connection_string};

/// Type reported for columns declared without one.
pub const UNDECLARED_TYPE: &str = "BLOB";

/// SQLite source adapter.
pub struct SqliteSource {
    /// Open pool once connected (single connection)
    pub(crate) pool: Option<SqlitePool>,
    pub(crate) config: ConnectionConfig,
    pub(crate) connection_string: String,
    pub(crate) database_name: String,
}

impl std::fmt::Debug for SqliteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSource")
            .field("database_name", &self.database_name)
            .field("config", &self.config)
            .field("connected", &self.pool.is_some())
            .finish_non_exhaustive()
    }
}

impl SqliteSource {
    fn pool(&self) -> Result<&SqlitePool> {
        self.pool
            .as_ref()
            .ok_or_else(|| AuditError::not_connected("SQLite source is not connected"))
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let pool = self.pool()?;
        let count: i64 = bounded(self.config.query_timeout, "table lookup", async {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(table)
            .fetch_one(pool)
            .await
            .map_err(|e| AuditError::connection_failed("Failed to query sqlite_master", e))
        })
        .await?;
        Ok(count > 0)
    }

    async fn ensure_table(&self, table: &str) -> Result<()> {
        if self.table_exists(table).await? {
            Ok(())
        } else {
            Err(AuditError::schema(table, "table does not exist"))
        }
    }
}

fn declared_type(raw: String) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        UNDECLARED_TYPE.to_string()
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl SourceAdapter for SqliteSource {
    async fn connect(&mut self) -> Result<()> {
        if self.pool.is_some() {
            return Ok(());
        }

        let pool = connection::create_sqlite_connection(&self.connection_string, &self.config).await?;

        // Opening is lazy about the file header; force a read so a missing or
        // non-SQLite file fails here instead of mid-enumeration.
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sqlite_master")
            .fetch_one(&pool)
            .await
            .map_err(|e| AuditError::connection_failed("Cannot read sqlite_master", e))?;

        tracing::debug!("Connected to SQLite source '{}'", self.database_name);
        self.pool = Some(pool);
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let pool = self.pool()?;
        bounded(self.config.query_timeout, "table enumeration", async {
            sqlx::query_scalar::<_, String>(
                r#"
                SELECT name
                FROM sqlite_master
                WHERE type = 'table'
                AND name NOT LIKE 'sqlite_%'
                ORDER BY name
                "#,
            )
            .fetch_all(pool)
            .await
            .map_err(|e| AuditError::connection_failed("Failed to enumerate tables", e))
        })
        .await
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<String>> {
        Ok(self
            .describe_columns(table)
            .await?
            .into_iter()
            .map(|column| column.name)
            .collect())
    }

    async fn column_type(&self, table: &str, column: &str) -> Result<String> {
        self.ensure_table(table).await?;
        let pool = self.pool()?;

        let raw: Option<String> = bounded(self.config.query_timeout, "column lookup", async {
            sqlx::query_scalar::<_, String>("SELECT type FROM pragma_table_info(?) WHERE name = ?")
                .bind(table)
                .bind(column)
                .fetch_optional(pool)
                .await
                .map_err(|e| AuditError::schema(table, format!("Failed to read column info: {}", e)))
        })
        .await?;

        raw.map(declared_type)
            .ok_or_else(|| AuditError::schema(table, format!("column '{}' does not exist", column)))
    }

    async fn describe_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        self.ensure_table(table).await?;
        let pool = self.pool()?;

        let rows = bounded(self.config.query_timeout, "column enumeration", async {
            sqlx::query("SELECT name, type FROM pragma_table_info(?) ORDER BY cid")
                .bind(table)
                .fetch_all(pool)
                .await
                .map_err(|e| AuditError::schema(table, format!("Failed to read column info: {}", e)))
        })
        .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row
                .try_get("name")
                .map_err(|e| AuditError::schema(table, format!("Failed to parse column name: {}", e)))?;
            let raw_type: String = row
                .try_get("type")
                .map_err(|e| AuditError::schema(table, format!("Failed to parse column type: {}", e)))?;
            columns.push(ColumnInfo::new(name, declared_type(raw_type)));
        }

        tracing::trace!("Table '{}' has {} columns", table, columns.len());
        Ok(columns)
    }

    fn source_type(&self) -> SourceType {
        SourceType::Sqlite
    }

    fn database_name(&self) -> &str {
        &self.database_name
    }

    fn is_connected(&self) -> bool {
        self.pool.is_some()
    }
}
