//! `StaticTag` (alias `MyTag1`): emits one constant tag on every object.
//!
//! Parameters: `{tag: <value>}`, defaulting to `"mytag1"`.

use super::{CaptureContext, MetadataProvider, fragment};
use crate::Result;
use crate::error::AuditError;
use crate::identifier::ObjectId;
use crate::models::Fragment;
use async_trait::async_trait;

/// Registry name.
pub const NAME: &str = "StaticTag";
/// Tag emitted when no `tag` parameter is configured.
pub const DEFAULT_TAG: &str = "mytag1";

/// Emits one fixed `tag` field on every object.
#[derive(Debug, Clone)]
pub struct StaticTagProvider {
    name: String,
    tag: serde_json::Value,
}

impl StaticTagProvider {
    /// Creates a provider emitting `tag`.
    pub fn new(name: &str, tag: impl Into<serde_json::Value>) -> Self {
        Self {
            name: name.to_string(),
            tag: tag.into(),
        }
    }
}

pub(crate) fn create(
    name: &str,
    parameters: Option<&serde_json::Value>,
) -> Result<Box<dyn MetadataProvider>> {
    let tag = match parameters {
        None => serde_json::Value::from(DEFAULT_TAG),
        Some(serde_json::Value::Object(map)) => map
            .get("tag")
            .cloned()
            .unwrap_or_else(|| serde_json::Value::from(DEFAULT_TAG)),
        Some(other) => {
            return Err(AuditError::configuration(format!(
                "{} parameters must be a mapping, got {}",
                name, other
            )));
        }
    };
    Ok(Box::new(StaticTagProvider::new(name, tag)))
}

#[async_trait]
impl MetadataProvider for StaticTagProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn derive(&self, _id: &ObjectId, _context: &CaptureContext) -> Result<Vec<Fragment>> {
        Ok(vec![fragment("tag", self.tag.clone())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceConfig;
    use crate::models::SourceType;
    use serde_json::json;

    async fn derive_with(parameters: Option<serde_json::Value>) -> Vec<Fragment> {
        let provider = create("MyTag1", parameters.as_ref()).unwrap();
        let source = SourceConfig::new(SourceType::Sqlite, "shop", "shop.db");
        let context = CaptureContext::new(source, chrono::Utc::now()).unwrap();
        provider
            .derive(&ObjectId::from_raw("shop"), &context)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_default_tag() {
        let fragments = derive_with(None).await;
        assert_eq!(fragments, vec![fragment("tag", "mytag1")]);
    }

    #[tokio::test]
    async fn test_configured_tag() {
        let fragments = derive_with(Some(json!({"tag": "customer_data"}))).await;
        assert_eq!(fragments[0]["tag"], "customer_data");
    }

    #[test]
    fn test_non_mapping_parameters_rejected() {
        assert!(create(NAME, Some(&json!("oops"))).is_err());
    }
}
