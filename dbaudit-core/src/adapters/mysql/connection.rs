//! MySQL connection handling.

use super::{ConnectionConfig, MySqlSource};
use crate::Result;
use crate::error::{AuditError, redact_connection_string};
use sqlx::MySqlPool;
use url::Url;

impl MySqlSource {
    /// Creates an unconnected MySQL source.
    ///
    /// # Errors
    /// Returns a configuration error if the connection string is malformed
    /// or names no database.
    pub fn new(connection_string: &str, database_name: &str) -> Result<Self> {
        validate_mysql_connection_string(connection_string)?;
        Ok(Self {
            pool: None,
            config: ConnectionConfig::default(),
            connection_string: connection_string.to_string(),
            database_name: database_name.to_string(),
        })
    }

    /// Closes the pool gracefully.
    pub async fn close(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
        }
    }
}

/// Validates MySQL connection string format.
///
/// The path must name a database: enumeration is scoped to `DATABASE()`.
///
/// # Errors
/// Returns error if connection string is invalid
pub fn validate_mysql_connection_string(connection_string: &str) -> Result<()> {
    let url = Url::parse(connection_string).map_err(|e| {
        AuditError::configuration(format!("Invalid MySQL connection string format: {}", e))
    })?;

    if url.scheme() != "mysql" {
        return Err(AuditError::configuration(
            "Connection string must use mysql:// scheme",
        ));
    }

    if url.host_str().is_none() {
        return Err(AuditError::configuration(
            "Connection string must specify a host",
        ));
    }

    if url.path().trim_start_matches('/').is_empty() {
        return Err(AuditError::configuration(
            "Connection string must specify a database",
        ));
    }

    Ok(())
}

/// Creates a lazy MySQL pool with read-only sessions.
pub(crate) fn create_mysql_connection_pool(
    connection_string: &str,
    config: &ConnectionConfig,
) -> Result<MySqlPool> {
    use sqlx::Executor;

    let query_timeout_ms = config.query_timeout.as_millis();
    let read_only = config.read_only;

    sqlx::mysql::MySqlPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.connect_timeout)
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                conn.execute(format!("SET max_execution_time = {}", query_timeout_ms).as_str())
                    .await?;

                if read_only {
                    conn.execute("SET SESSION TRANSACTION READ ONLY").await?;
                }

                Ok(())
            })
        })
        .connect_lazy(connection_string)
        .map_err(|e| {
            AuditError::connection_failed(
                format!(
                    "Failed to create MySQL connection pool to {}",
                    redact_connection_string(connection_string)
                ),
                e,
            )
        })
}
