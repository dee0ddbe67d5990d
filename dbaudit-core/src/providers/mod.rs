//! Metadata providers and the registry that resolves them by name.
//!
//! A provider derives zero or more [`Fragment`]s for one object from its
//! identifier and the [`CaptureContext`] of the run. Providers are looked up
//! in a closed [`ProviderRegistry`] mapping names to factory functions; an
//! unknown name fails before any source is touched.
//!
//! # Built-in providers
//! | name | aliases | fragment |
//! |---|---|---|
//! | `NodeType` | | `object_type` |
//! | `CaptureDate` | | `capture_date` |
//! | `StaticTag` | `MyTag1` | `tag` |
//! | `PredicateTag` | `FindAndTag` | `tag_<rule>` per matching rule |
//! | `Classifier` | `GPTPII` | `pii` (columns only) |

use crate::config::SourceConfig;
use crate::error::{AuditError, Result};
use crate::identifier::{IdentifierCodec, IdentifierParts, ObjectId};
use crate::models::Fragment;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub mod capture_date;
#[cfg(feature = "classifier")]
pub mod classifier;
pub mod node_type;
pub mod predicate_tag;
pub mod static_tag;

pub use capture_date::CaptureDateProvider;
#[cfg(feature = "classifier")]
pub use classifier::ClassifierProvider;
pub use node_type::NodeTypeProvider;
pub use predicate_tag::PredicateTagProvider;
pub use static_tag::StaticTagProvider;

/// Run-wide context shared by every provider call of one audit run.
#[derive(Debug, Clone)]
pub struct CaptureContext {
    /// Full configuration of the source being audited
    pub source: SourceConfig,
    /// Capture timestamp of the run
    pub timestamp: DateTime<Utc>,
    /// Codec built from the source's delimiter
    pub codec: IdentifierCodec,
}

impl CaptureContext {
    /// Creates the context for one run.
    ///
    /// # Errors
    /// Returns a configuration error if the source's delimiter is empty.
    pub fn new(source: SourceConfig, timestamp: DateTime<Utc>) -> Result<Self> {
        let codec = source.codec()?;
        Ok(Self {
            source,
            timestamp,
            codec,
        })
    }

    /// Parses an identifier with the run's delimiter.
    pub fn parse(&self, id: &ObjectId) -> Result<IdentifierParts> {
        self.codec.parse(id.as_str())
    }
}

/// A pluggable unit deriving metadata for one object.
///
/// # Errors
/// `derive` may fail with `ProviderUnavailable` or `ProviderFormat`; the
/// engine records those and keeps going. Any other error ends the run.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Name the provider was configured under.
    fn name(&self) -> &str;

    /// Derives fragments for one object.
    async fn derive(&self, id: &ObjectId, context: &CaptureContext) -> Result<Vec<Fragment>>;
}

/// Constructs a provider from its configured name and parameter block.
pub type ProviderFactory =
    fn(name: &str, parameters: Option<&serde_json::Value>) -> Result<Box<dyn MetadataProvider>>;

/// Builds a single-entry fragment.
pub fn fragment(key: &str, value: impl Into<serde_json::Value>) -> Fragment {
    let mut fragment = Fragment::new();
    fragment.insert(key.to_string(), value.into());
    fragment
}

/// Closed mapping from provider names to factories.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, ProviderFactory>,
    aliases: BTreeMap<String, String>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.factories.keys().collect::<Vec<_>>())
            .field("aliases", &self.aliases)
            .finish()
    }
}

#[cfg(not(feature = "classifier"))]
fn classifier_not_compiled(
    _name: &str,
    _parameters: Option<&serde_json::Value>,
) -> Result<Box<dyn MetadataProvider>> {
    Err(AuditError::unsupported_feature(
        "Classifier provider",
        "builds without the classifier feature",
    ))
}

impl ProviderRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in provider and its aliases.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(node_type::NAME, node_type::create);
        registry.register(capture_date::NAME, capture_date::create);
        registry.register(static_tag::NAME, static_tag::create);
        registry.register(predicate_tag::NAME, predicate_tag::create);

        #[cfg(feature = "classifier")]
        registry.register(classifier::NAME, classifier::create);
        #[cfg(not(feature = "classifier"))]
        registry.register("Classifier", classifier_not_compiled);

        registry.register_alias("MyTag1", static_tag::NAME);
        registry.register_alias("FindAndTag", predicate_tag::NAME);
        registry.register_alias("GPTPII", "Classifier");
        registry
    }

    /// Adds or replaces a provider factory.
    pub fn register(&mut self, name: &str, factory: ProviderFactory) {
        self.factories.insert(name.to_string(), factory);
    }

    /// Makes `alias` resolve to the provider registered as `canonical`.
    pub fn register_alias(&mut self, alias: &str, canonical: &str) {
        self.aliases
            .insert(alias.to_string(), canonical.to_string());
    }

    /// All resolvable names (providers and aliases), sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .factories
            .keys()
            .chain(self.aliases.keys())
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Canonical provider name for a configured name, if registered.
    pub fn canonical_name<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        let canonical = self.aliases.get(name).map_or(name, String::as_str);
        self.factories
            .contains_key(canonical)
            .then_some(canonical)
    }

    /// Instantiates the providers configured for a source, in order.
    ///
    /// Parameters are looked up under the configured name first, then under
    /// the canonical name.
    ///
    /// # Errors
    /// Returns `UnknownProvider` for any unregistered name, checked for all
    /// names before any provider is constructed, or the factory's error.
    pub fn resolve(&self, source: &SourceConfig) -> Result<Vec<Box<dyn MetadataProvider>>> {
        let names = source.provider_names();

        let mut resolved = Vec::with_capacity(names.len());
        for name in &names {
            let canonical = self
                .canonical_name(name)
                .ok_or_else(|| AuditError::unknown_provider(name.clone()))?;
            resolved.push((name.as_str(), canonical));
        }

        resolved
            .into_iter()
            .map(|(name, canonical)| {
                let parameters = source
                    .parameters_for(name)
                    .or_else(|| source.parameters_for(canonical));
                let factory = self
                    .factories
                    .get(canonical)
                    .ok_or_else(|| AuditError::unknown_provider(name))?;
                factory(name, parameters)
            })
            .collect()
    }
}
