//! `PredicateTag` (alias `FindAndTag`): rule-based tagging.
//!
//! Parameters map rule names to rules:
//!
//! ```yaml
//! PredicateTag:
//!   email_rule:
//!     object_type: column          # or a list: [table, column]
//!     uuid_substring: email
//!     tag: pii_email
//! ```
//!
//! A rule matches when the object's kind is one of its `object_type`s and
//! the identifier contains `uuid_substring`. Each match emits
//! `{tag_<rule>: <tag>}`. Rules are evaluated in rule-name order. Every
//! field is required: a rule without `object_type` could never match.

use super::{CaptureContext, MetadataProvider, fragment};
use crate::Result;
use crate::error::AuditError;
use crate::identifier::{ObjectId, ObjectKind};
use crate::models::Fragment;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Registry name.
pub const NAME: &str = "PredicateTag";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRule {
    object_type: OneOrMany,
    uuid_substring: String,
    tag: serde_json::Value,
}

/// One compiled tagging rule.
#[derive(Debug, Clone, PartialEq)]
pub struct TagRule {
    /// Rule name; the emitted field is `tag_<name>`
    pub name: String,
    /// Object kinds the rule applies to
    pub object_types: Vec<ObjectKind>,
    /// Text the identifier must contain
    pub uuid_substring: String,
    /// Value emitted on a match
    pub tag: serde_json::Value,
}

impl TagRule {
    /// Whether the rule applies to an object of `kind` with identifier `id`.
    pub fn matches(&self, kind: ObjectKind, id: &str) -> bool {
        self.object_types.contains(&kind) && id.contains(self.uuid_substring.as_str())
    }

    /// Key of the fragment this rule emits.
    pub fn field(&self) -> String {
        format!("tag_{}", self.name)
    }

    fn compile(provider: &str, name: &str, raw: RawRule) -> Result<Self> {
        let kinds = match raw.object_type {
            OneOrMany::One(kind) => vec![parse_kind(provider, name, &kind)?],
            OneOrMany::Many(kinds) => kinds
                .iter()
                .map(|kind| parse_kind(provider, name, kind))
                .collect::<Result<Vec<_>>>()?,
        };

        if kinds.is_empty() {
            return Err(AuditError::configuration(format!(
                "{} rule '{}': object_type cannot be empty",
                provider, name
            )));
        }

        if raw.uuid_substring.is_empty() {
            return Err(AuditError::configuration(format!(
                "{} rule '{}': uuid_substring cannot be empty",
                provider, name
            )));
        }

        Ok(Self {
            name: name.to_string(),
            object_types: kinds,
            uuid_substring: raw.uuid_substring,
            tag: raw.tag,
        })
    }
}

fn parse_kind(provider: &str, rule: &str, kind: &str) -> Result<ObjectKind> {
    ObjectKind::from_name(kind).ok_or_else(|| {
        AuditError::configuration(format!(
            "{} rule '{}': unknown object_type '{}' (expected database, table or column)",
            provider, rule, kind
        ))
    })
}

/// Emits one `tag_<rule>` field per matching rule.
#[derive(Debug, Clone)]
pub struct PredicateTagProvider {
    name: String,
    rules: Vec<TagRule>,
}

impl PredicateTagProvider {
    /// Creates a provider from already compiled rules, kept in the given order.
    pub fn new(name: &str, rules: Vec<TagRule>) -> Self {
        Self {
            name: name.to_string(),
            rules,
        }
    }

    /// Compiles a parameter block into a provider.
    ///
    /// # Errors
    /// Returns a configuration error if the block is missing, is not a
    /// mapping of rule names to rules, or a rule is malformed.
    pub fn from_parameters(name: &str, parameters: Option<&serde_json::Value>) -> Result<Self> {
        let parameters = parameters.ok_or_else(|| {
            AuditError::configuration(format!(
                "{} needs rules under metadata_parameters.{}",
                name, name
            ))
        })?;

        let raw: BTreeMap<String, RawRule> = serde_json::from_value(parameters.clone())
            .map_err(|e| AuditError::configuration(format!("{} rules are malformed: {}", name, e)))?;

        let rules = raw
            .into_iter()
            .map(|(rule, body)| TagRule::compile(name, &rule, body))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(name, rules))
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[TagRule] {
        &self.rules
    }
}

pub(crate) fn create(
    name: &str,
    parameters: Option<&serde_json::Value>,
) -> Result<Box<dyn MetadataProvider>> {
    Ok(Box::new(PredicateTagProvider::from_parameters(name, parameters)?))
}

#[async_trait]
impl MetadataProvider for PredicateTagProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn derive(&self, id: &ObjectId, context: &CaptureContext) -> Result<Vec<Fragment>> {
        let kind = context.codec.kind_of(id.as_str())?;
        Ok(self
            .rules
            .iter()
            .filter(|rule| rule.matches(kind, id.as_str()))
            .map(|rule| fragment(&rule.field(), rule.tag.clone()))
            .collect())
    }
}
