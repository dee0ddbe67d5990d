//! SQLite connection handling.
//!
//! # Connection Formats
//! - File-based: `sqlite:///path/to/database.db`, `sqlite://./relative.db`
//!   or a bare path ending in `.db`, `.sqlite`, `.sqlite3`
//! - In-memory: `sqlite::memory:` or `:memory:` (always empty, useful for tests)
//!
//! Databases are opened read-only and never created.

use super::{ConnectionConfig, SqliteSource};
use crate::Result;
use crate::error::{AuditError, redact_connection_string};
use sqlx::SqlitePool;

impl SqliteSource {
    /// Creates an unconnected SQLite source.
    ///
    /// # Arguments
    /// * `connection_string` - SQLite connection URL or file path
    /// * `database_name` - database segment for identifiers
    ///
    /// # Errors
    /// Returns a configuration error if the connection string is not a
    /// recognizable SQLite location.
    pub fn new(connection_string: &str, database_name: &str) -> Result<Self> {
        Self::with_config(connection_string, database_name, ConnectionConfig::default())
    }

    /// Creates an unconnected SQLite source with custom settings.
    pub fn with_config(
        connection_string: &str,
        database_name: &str,
        config: ConnectionConfig,
    ) -> Result<Self> {
        config.validate()?;
        validate_sqlite_connection_string(connection_string)?;

        Ok(Self {
            pool: None,
            config,
            connection_string: connection_string.to_string(),
            database_name: database_name.to_string(),
        })
    }

    /// Checks if the source is an in-memory database.
    pub fn is_in_memory(&self) -> bool {
        self.connection_string.contains(":memory:")
            || self.connection_string.contains("mode=memory")
    }

    /// Closes the connection gracefully.
    pub async fn close(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
        }
    }
}

/// Validates SQLite connection string format.
///
/// # Errors
/// Returns error if connection string is invalid
pub fn validate_sqlite_connection_string(connection_string: &str) -> Result<()> {
    if connection_string == ":memory:" {
        return Ok(());
    }

    if connection_string.ends_with(".db")
        || connection_string.ends_with(".sqlite")
        || connection_string.ends_with(".sqlite3")
    {
        return Ok(());
    }

    if connection_string.starts_with("sqlite:") {
        return Ok(());
    }

    Err(AuditError::configuration(
        "Invalid SQLite connection string format: expected sqlite:// URL, .db/.sqlite/.sqlite3 file path, or :memory:",
    ))
}

/// Normalizes a connection string to SQLite URL format.
pub fn normalize_connection_string(connection_string: &str) -> String {
    if connection_string == ":memory:" {
        return "sqlite::memory:".to_string();
    }

    if connection_string.starts_with("sqlite:") {
        return connection_string.to_string();
    }

    format!("sqlite://{}", connection_string)
}

/// Creates a SQLite pool with a single read-only connection.
pub(crate) async fn create_sqlite_connection(
    connection_string: &str,
    config: &ConnectionConfig,
) -> Result<SqlitePool> {
    use sqlx::sqlite::SqliteConnectOptions;
    use std::str::FromStr;

    let normalized = normalize_connection_string(connection_string);

    let mut options = SqliteConnectOptions::from_str(&normalized).map_err(|e| {
        AuditError::connection_failed(
            format!(
                "Invalid SQLite location {}",
                redact_connection_string(connection_string)
            ),
            e,
        )
    })?;

    options = options.create_if_missing(false);
    if config.read_only {
        options = options.read_only(true);
    }

    sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .acquire_timeout(config.connect_timeout)
        .connect_with(options)
        .await
        .map_err(|e| {
            AuditError::connection_failed(
                format!(
                    "Failed to open SQLite database {}",
                    redact_connection_string(connection_string)
                ),
                e,
            )
        })
}
