//! PostgreSQL connection string validation and pool creation.

use super::{ConnectionConfig, PostgresSource};
use crate::Result;
use crate::error::{AuditError, redact_connection_string};
use sqlx::PgPool;
use std::time::Duration;
use url::Url;

impl PostgresSource {
    /// Creates an unconnected PostgreSQL source.
    ///
    /// Timeouts and pool size may be tuned through the query parameters
    /// `connect_timeout` (seconds), `statement_timeout` (milliseconds) and
    /// `pool_max_conns`.
    ///
    /// # Errors
    /// Returns a configuration error if the connection string is malformed.
    pub fn new(connection_string: &str, database_name: &str) -> Result<Self> {
        let config = parse_connection_config(connection_string)?;
        Ok(Self {
            pool: None,
            config,
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

/// Validates the scheme and host of a PostgreSQL connection string.
///
/// # Errors
/// Returns error if connection string is invalid
pub fn validate_connection_string(connection_string: &str) -> Result<()> {
    let url = Url::parse(connection_string).map_err(|e| {
        AuditError::configuration(format!(
            "Invalid PostgreSQL connection string format: {}",
            e
        ))
    })?;

    if !matches!(url.scheme(), "postgres" | "postgresql") {
        return Err(AuditError::configuration(
            "Connection string must use postgres:// or postgresql:// scheme",
        ));
    }

    if url.host_str().is_none() {
        return Err(AuditError::configuration(
            "Connection string must specify a host",
        ));
    }

    Ok(())
}

/// Derives connection settings from the connection string query parameters.
pub(crate) fn parse_connection_config(connection_string: &str) -> Result<ConnectionConfig> {
    validate_connection_string(connection_string)?;

    let url = Url::parse(connection_string)
        .map_err(|e| AuditError::configuration(format!("Invalid connection string: {}", e)))?;

    let mut config = ConnectionConfig::default();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "connect_timeout" => {
                if let Ok(secs) = value.parse::<u64>()
                    && secs > 0
                    && secs <= 300
                {
                    config.connect_timeout = Duration::from_secs(secs);
                }
            }
            "statement_timeout" => {
                if let Ok(millis) = value.parse::<u64>()
                    && millis > 0
                    && millis <= 300_000
                {
                    config.query_timeout = Duration::from_millis(millis);
                }
            }
            "pool_max_conns" => {
                if let Ok(max) = value.parse::<u32>()
                    && max > 0
                    && max <= 10
                {
                    config.max_connections = max;
                }
            }
            _ => {}
        }
    }

    config.validate()?;
    Ok(config)
}

/// Creates a lazy pool whose sessions are read-only with a statement timeout.
pub(crate) fn create_connection_pool(
    connection_string: &str,
    config: &ConnectionConfig,
) -> Result<PgPool> {
    use sqlx::Executor;

    let query_timeout_ms = config.query_timeout.as_millis();
    let read_only = config.read_only;

    sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.connect_timeout)
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                conn.execute(format!("SET statement_timeout = {}", query_timeout_ms).as_str())
                    .await?;

                let app_name = format!("dbaudit-{}", env!("CARGO_PKG_VERSION"));
                conn.execute(format!("SET application_name = '{}'", app_name).as_str())
                    .await?;

                if read_only {
                    conn.execute("SET default_transaction_read_only = on")
                        .await?;
                }

                Ok(())
            })
        })
        .connect_lazy(connection_string)
        .map_err(|e| {
            AuditError::connection_failed(
                format!(
                    "Failed to create PostgreSQL connection pool to {}",
                    redact_connection_string(connection_string)
                ),
                e,
            )
        })
}
