//! `NodeType`: classifies an object as database, table or column.

use super::{CaptureContext, MetadataProvider, fragment};
use crate::Result;
use crate::identifier::ObjectId;
use crate::models::Fragment;
use async_trait::async_trait;

/// Registry name.
pub const NAME: &str = "NodeType";

/// Emits `{object_type: database|table|column}` from the segment count.
#[derive(Debug, Clone)]
pub struct NodeTypeProvider {
    name: String,
}

impl NodeTypeProvider {
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
    Ok(Box::new(NodeTypeProvider::new(name)))
}

#[async_trait]
impl MetadataProvider for NodeTypeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn derive(&self, id: &ObjectId, context: &CaptureContext) -> Result<Vec<Fragment>> {
        let kind = context.codec.kind_of(id.as_str())?;
        Ok(vec![fragment("object_type", kind.as_str())])
    }
}
