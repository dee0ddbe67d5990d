//! `CaptureDate`: stamps the run's capture timestamp.

use super::{CaptureContext, MetadataProvider, fragment};
use crate::Result;
use crate::identifier::ObjectId;
use crate::models::Fragment;
use async_trait::async_trait;
use chrono::SecondsFormat;

/// Registry name.
pub const NAME: &str = "CaptureDate";

/// Field written by this provider; timestamp-bearing, so excluded when
/// comparing records across runs.
pub const FIELD: &str = "capture_date";

/// Stamps the run's capture timestamp.
#[derive(Debug, Clone)]
pub struct CaptureDateProvider {
    name: String,
}

impl CaptureDateProvider {
    /// Creates the provider under its configured name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

pub(crate) fn create(
    name: &str,
    _parameters: Option<&serde_json::Value>,
) -> Result<Box<dyn MetadataProvider>> {
    Ok(Box::new(CaptureDateProvider::new(name)))
}

#[async_trait]
impl MetadataProvider for CaptureDateProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn derive(&self, _id: &ObjectId, context: &CaptureContext) -> Result<Vec<Fragment>> {
        let stamp = context
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Micros, true);
        Ok(vec![fragment(FIELD, stamp)])
    }
}
