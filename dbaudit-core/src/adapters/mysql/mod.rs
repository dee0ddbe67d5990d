//! MySQL source adapter.
//!
//! Enumerates base tables of the connection's default database through
//! `information_schema`. Catalog values are cast to `CHAR` because some
//! server versions report them as binary strings.

mod connection;


use super::helpers::bounded;
use super::{ColumnInfo, ConnectionConfig, SourceAdapter};
use crate::Result;
use crate::error::AuditError;
use crate::models::SourceType;
use async_trait::async_trait;
use sqlx::{MySqlPool, Row};

pub use connection::validate_mysql_connection_string;

/// MySQL source adapter.
pub struct MySqlSource {
    pub(crate) pool: Option<MySqlPool>,
    pub(crate) config: ConnectionConfig,
    pub(crate) connection_string: String,
    pub(crate) database_name: String,
}

impl std::fmt::Debug for MySqlSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlSource")
            .field(
                "connection_string",
                &crate::error::redact_connection_string(&self.connection_string),
            )
            .field("database_name", &self.database_name)
            .field("connected", &self.pool.is_some())
            .finish_non_exhaustive()
    }
}

impl MySqlSource {
    fn pool(&self) -> Result<&MySqlPool> {
        self.pool
            .as_ref()
            .ok_or_else(|| AuditError::not_connected("MySQL source is not connected"))
    }

    async fn ensure_table(&self, table: &str) -> Result<()> {
        let pool = self.pool()?;
        let count: i64 = bounded(self.config.query_timeout, "table lookup", async {
            sqlx::query_scalar::<_, i64>(
                r#"
                SELECT COUNT(*)
                FROM information_schema.tables
                WHERE table_schema = DATABASE() AND table_name = ?
                "#,
            )
            .bind(table)
            .fetch_one(pool)
            .await
            .map_err(|e| AuditError::connection_failed("Failed to query information_schema", e))
        })
        .await?;

        if count > 0 {
            Ok(())
        } else {
            Err(AuditError::schema(table, "table does not exist"))
        }
    }
}

#[async_trait]
impl SourceAdapter for MySqlSource {
    async fn connect(&mut self) -> Result<()> {
        if self.pool.is_some() {
            return Ok(());
        }

        let pool = connection::create_mysql_connection_pool(&self.connection_string, &self.config)?;

        sqlx::query_scalar::<_, i64>("SELECT 1")
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

        tracing::debug!("Connected to MySQL source '{}'", self.database_name);
        self.pool = Some(pool);
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let pool = self.pool()?;
        bounded(self.config.query_timeout, "table enumeration", async {
            sqlx::query_scalar::<_, String>(
                r#"
                SELECT CAST(table_name AS CHAR) AS name
                FROM information_schema.tables
                WHERE table_schema = DATABASE()
                AND table_type = 'BASE TABLE'
                ORDER BY table_name
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

        let data_type = bounded(self.config.query_timeout, "column lookup", async {
            sqlx::query_scalar::<_, String>(
                r#"
                SELECT CAST(data_type AS CHAR)
                FROM information_schema.columns
                WHERE table_schema = DATABASE() AND table_name = ? AND column_name = ?
                "#,
            )
            .bind(table)
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
        self.ensure_table(table).await?;
        let pool = self.pool()?;

        let rows = bounded(self.config.query_timeout, "column enumeration", async {
            sqlx::query(
                r#"
                SELECT CAST(column_name AS CHAR) AS column_name,
                       CAST(data_type AS CHAR) AS data_type
                FROM information_schema.columns
                WHERE table_schema = DATABASE() AND table_name = ?
                ORDER BY ordinal_position
                "#,
            )
            .bind(table)
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
        SourceType::Mysql
    }

    fn database_name(&self) -> &str {
        &self.database_name
    }

    fn is_connected(&self) -> bool {
        self.pool.is_some()
    }
}
