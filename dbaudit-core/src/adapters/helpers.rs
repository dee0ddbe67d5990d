//! Helper utilities shared by the SQL adapters.

use crate::error::{AuditError, Result};
use std::future::Future;
use std::time::Duration;

/// Runs a catalog query under the configured query timeout.
///
/// A timeout is reported as a connection failure: the source stopped
/// answering, which is fatal for the run rather than for one table.
pub(crate) async fn bounded<T, F>(timeout: Duration, what: &str, query: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, query).await {
        Ok(result) => result,
        Err(_) => Err(AuditError::not_connected(format!(
            "{} timed out after {}s",
            what,
            timeout.as_secs()
        ))),
    }
}
