//! Connection settings for SQL sources.
//!
//! Schema discovery issues a handful of catalog queries per table, so the
//! defaults favor a single read-only connection with bounded timeouts.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pool and session settings applied when a SQL adapter connects.
///
/// # Example
/// ```rust
/// use dbaudit_core::adapters::ConnectionConfig;
/// use std::time::Duration;
///
/// let config = ConnectionConfig::default().with_connect_timeout(Duration::from_secs(5));
/// assert!(config.validate().is_ok());
/// assert_eq!(config.max_connections, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Connection/acquire timeout
    pub connect_timeout: Duration,
    /// Upper bound for a single catalog query
    pub query_timeout: Duration,
    /// Maximum number of pooled connections; enumeration is sequential
    pub max_connections: u32,
    /// Whether to open the session read-only
    pub read_only: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            query_timeout: Duration::from_secs(30),
            max_connections: 1,
            read_only: true,
        }
    }
}

impl ConnectionConfig {
    /// Validates the settings.
    ///
    /// # Errors
    /// Returns a configuration error for zero timeouts or connection counts.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_connections == 0 {
            return Err(crate::error::AuditError::configuration(
                "max_connections must be greater than 0",
            ));
        }

        if self.connect_timeout.is_zero() {
            return Err(crate::error::AuditError::configuration(
                "connect_timeout must be greater than 0",
            ));
        }

        if self.query_timeout.is_zero() {
            return Err(crate::error::AuditError::configuration(
                "query_timeout must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Builder method to set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builder method to set the query timeout.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }
}
