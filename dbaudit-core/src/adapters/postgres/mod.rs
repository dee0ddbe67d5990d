//! PostgreSQL source adapter.
//!
//! # Module Structure
//! - `connection`: connection string validation and pool creation
//! - `naming`: reported table names and their reverse mapping
//!
//! # PostgreSQL-Specific Behavior
//! - Base tables come from `information_schema.tables`, system schemas excluded
//! - Tables in `public` keep their bare name, others are named `schema.table`;
//!   parts containing `.` or `"` are double-quoted
//! - Column types are `information_schema.columns.data_type`
//! - Sessions are read-only with a server-side `statement_timeout`

mod connection;
mod naming;


use super::helpers::bounded;
use super::{ColumnInfo, ConnectionConfig, SourceAdapter};
use crate::Result;
use crate::error::AuditError;
use crate::models::SourceType;
use async_trait::async_trait;
use sqlx::{PgPool, Row};

pub use connection::validate_connection_string;

/// Schema whose tables are reported without qualification.
pub const DEFAULT_SCHEMA: &str = "public";

/// PostgreSQL source adapter.
pub struct PostgresSource {
    pub(crate) pool: Option<PgPool>,
    pub(crate) config: ConnectionConfig,
    pub(crate) connection_string: String,
    pub(crate) database_name: String,
}

impl std::fmt::Debug for PostgresSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresSource")
            .field(
                "connection_string",
                &crate::error::redact_connection_string(&self.connection_string),
            )
            .field("database_name", &self.database_name)
            .field("connected", &self.pool.is_some())
            .finish_non_exhaustive()
    }
}

impl PostgresSource {
    fn pool(&self) -> Result<&PgPool> {
        self.pool
            .as_ref()
            .ok_or_else(|| AuditError::not_connected("PostgreSQL source is not connected"))
    }

    async fn ensure_table(&self, schema: &str, table: &str, qualified: &str) -> Result<()> {
        let pool = self.pool()?;
        let count: i64 = bounded(self.config.query_timeout, "table lookup", async {
            sqlx::query_scalar::<_, i64>(
                r#"
                SELECT COUNT(*)
                FROM information_schema.tables
                WHERE table_schema = $1 AND table_name = $2
                "#,
            )
            .bind(schema)
            .bind(table)
            .fetch_one(pool)
            .await
            .map_err(|e| AuditError::connection_failed("Failed to query information_schema", e))
        })
        .await?;

        if count > 0 {
            Ok(())
        } else {
            Err(AuditError::schema(qualified, "table does not exist"))
        }
    }
}

#[async_trait]
impl SourceAdapter for PostgresSource {
    async fn connect(&mut self) -> Result<()> {
        if self.pool.is_some() {
            return Ok(());
        }

        let pool = connection::create_connection_pool(&self.connection_string, &self.config)?;

        // The pool is lazy; make the first round trip here.
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| {
                AuditError::connection_failed(
                    format!(
                        "Failed to connect to {}",
                        crate::error::redact_connection_string(&self.connection_string)
                    ),
                    e,
                )
            })?;

        tracing::debug!("Connected to PostgreSQL source '{}'", self.database_name);
        self.pool = Some(pool);
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let pool = self.pool()?;
        bounded(self.config.query_timeout, "table enumeration", async {
            sqlx::query_as::<_, (String, String)>(
                r#"
                SELECT table_schema::text, table_name::text
                FROM information_schema.tables
                WHERE table_type = 'BASE TABLE'
                AND table_schema NOT IN ('pg_catalog', 'information_schema')
                AND table_schema NOT LIKE 'pg_toast%'
                AND table_schema NOT LIKE 'pg_temp%'
                ORDER BY table_schema, table_name
                "#,
            )
            .fetch_all(pool)
            .await
            .map_err(|e| AuditError::connection_failed("Failed to enumerate tables", e))
        })
        .await
        .map(|tables| {
            tables
                .iter()
                .map(|(schema, table)| naming::qualify_table_name(schema, table))
                .collect()
        })
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
        let (schema, name) = naming::parse_table_name(table)?;
        self.ensure_table(&schema, &name, table).await?;
        let pool = self.pool()?;

        let data_type = bounded(self.config.query_timeout, "column lookup", async {
            sqlx::query_scalar::<_, String>(
                r#"
                SELECT data_type::text
                FROM information_schema.columns
                WHERE table_schema = $1 AND table_name = $2 AND column_name = $3
                "#,
            )
            .bind(schema.as_str())
            .bind(name.as_str())
            .bind(column)
            .fetch_optional(pool)
            .await
            .map_err(|e| AuditError::schema(table, format!("Failed to read column info: {}", e)))
        })
        .await?;

        data_type
            .ok_or_else(|| AuditError::schema(table, format!("column '{}' does not exist", column)))
    }

    async fn describe_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let (schema, name) = naming::parse_table_name(table)?;
        self.ensure_table(&schema, &name, table).await?;
        let pool = self.pool()?;

        let rows = bounded(self.config.query_timeout, "column enumeration", async {
            sqlx::query(
                r#"
                SELECT column_name::text AS column_name, data_type::text AS data_type
                FROM information_schema.columns
                WHERE table_schema = $1 AND table_name = $2
                ORDER BY ordinal_position
                "#,
            )
            .bind(schema.as_str())
            .bind(name.as_str())
            .fetch_all(pool)
            .await
            .map_err(|e| AuditError::schema(table, format!("Failed to read column info: {}", e)))
        })
        .await?;

        rows.iter()
            .map(|row| {
                let column: String = row.try_get("column_name").map_err(|e| {
                    AuditError::schema(table, format!("Failed to parse column name: {}", e))
                })?;
                let data_type: String = row.try_get("data_type").map_err(|e| {
                    AuditError::schema(table, format!("Failed to parse column type: {}", e))
                })?;
                Ok(ColumnInfo::new(column, data_type))
            })
            .collect()
    }

    fn source_type(&self) -> SourceType {
        SourceType::Postgres
    }

    fn database_name(&self) -> &str {
        &self.database_name
    }

    fn is_connected(&self) -> bool {
        self.pool.is_some()
    }
}
