//! `Classifier` (alias `GPTPII`): asks an OpenAI-compatible chat completion
//! endpoint how likely a column is to hold personal data.
//!
//! Parameters:
//! - `endpoint`: chat completions URL (default: OpenAI's)
//! - `model`: model name (default `gpt-4o-mini`)
//! - `api_key_env`: environment variable holding the API key
//!   (default `OPENAI_API_KEY`)
//! - `timeout_secs`: per-request bound (default 30)
//!
//! Only column identifiers are classified; databases and tables yield no
//! fragment. Transport, auth and HTTP status failures are
//! `ProviderUnavailable`; an answer that is not `{"PII": "Not|Low|Medium|High"}`
//! is `ProviderFormat`.

use super::{CaptureContext, MetadataProvider, fragment};
use crate::Result;
use crate::error::AuditError;
use crate::identifier::{ObjectId, ObjectKind};
use crate::models::Fragment;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

/// Registry name.
pub const NAME: &str = "Classifier";

/// Accepted PII likelihood levels.
pub const LEVELS: [&str; 4] = ["Not", "Low", "Medium", "High"];

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Classifier parameter block.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassifierSettings {
    /// Chat completions URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Model name sent with each request
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Asks a remote model for the PII likelihood of each column.
pub struct ClassifierProvider {
    name: String,
    settings: ClassifierSettings,
    client: reqwest::Client,
}

impl std::fmt::Debug for ClassifierProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierProvider")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ClassifierProvider {
    /// Creates the provider. No request is made here.
    ///
    /// # Errors
    /// Returns a configuration error for a zero timeout, an endpoint that is
    /// not a URL, or an HTTP client that cannot be built.
    pub fn new(name: &str, settings: ClassifierSettings) -> Result<Self> {
        if settings.timeout_secs == 0 {
            return Err(AuditError::configuration(format!(
                "{}: timeout_secs must be greater than 0",
                name
            )));
        }

        url::Url::parse(&settings.endpoint).map_err(|e| {
            AuditError::configuration(format!(
                "{}: invalid endpoint '{}': {}",
                name, settings.endpoint, e
            ))
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| {
                AuditError::configuration(format!("{}: cannot build HTTP client: {}", name, e))
            })?;

        Ok(Self {
            name: name.to_string(),
            settings,
            client,
        })
    }

    fn api_key(&self) -> Result<String> {
        std::env::var(&self.settings.api_key_env).map_err(|_| {
            AuditError::provider_unavailable(
                &self.name,
                format!("environment variable {} is not set", self.settings.api_key_env),
            )
        })
    }

    fn request_body(&self, table: &str, column: &str, data_type: &str) -> Value {
        let prompt = format!(
            "Assess probability (Not, Low, Medium, High) that the following table definition \
             is used to store PII:\n Table Name: {}\n Column Name: {}\n Data Type: {}\n\
             Answer using JSON only, in this format {{\"PII\":\"Answer\"}}",
            table, column, data_type
        );

        json!({
            "model": self.settings.model,
            "temperature": 0.0,
            "max_tokens": 100,
            "messages": [
                {"role": "system", "content": "Your job is to find possible PII in database schema"},
                {"role": "user", "content": prompt}
            ]
        })
    }
}

pub(crate) fn create(
    name: &str,
    parameters: Option<&Value>,
) -> Result<Box<dyn MetadataProvider>> {
    let settings = match parameters {
        None => ClassifierSettings::default(),
        Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
            AuditError::configuration(format!("{} parameters are malformed: {}", name, e))
        })?,
    };
    Ok(Box::new(ClassifierProvider::new(name, settings)?))
}

/// Extracts the PII level from a chat completion response body.
///
/// The model's message content must itself be a JSON object with a `PII`
/// key (any case) holding one of [`LEVELS`]; a fenced code block around it
/// is tolerated.
pub fn parse_classification(provider: &str, body: &Value) -> Result<String> {
    let content = body
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            AuditError::provider_format(provider, "response has no choices[0].message.content")
        })?;

    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let answer: serde_json::Map<String, Value> = serde_json::from_str(trimmed).map_err(|e| {
        AuditError::provider_format(provider, format!("answer is not a JSON object: {}", e))
    })?;

    let level = answer
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("pii"))
        .and_then(|(_, value)| value.as_str())
        .ok_or_else(|| AuditError::provider_format(provider, "answer has no PII field"))?;

    LEVELS
        .iter()
        .find(|candidate| candidate.eq_ignore_ascii_case(level.trim()))
        .map(|candidate| (*candidate).to_string())
        .ok_or_else(|| {
            AuditError::provider_format(provider, format!("unexpected PII level '{}'", level))
        })
}

#[async_trait]
impl MetadataProvider for ClassifierProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn derive(&self, id: &ObjectId, context: &CaptureContext) -> Result<Vec<Fragment>> {
        let parts = context.parse(id)?;
        if parts.kind() != ObjectKind::Column {
            return Ok(Vec::new());
        }
        let (Some(table), Some(column), Some(data_type)) =
            (&parts.table, &parts.column, &parts.data_type)
        else {
            return Ok(Vec::new());
        };

        let api_key = self.api_key()?;

        let response = self
            .client
            .post(&self.settings.endpoint)
            .bearer_auth(api_key)
            .json(&self.request_body(table, column, data_type))
            .send()
            .await
            .map_err(|e| AuditError::provider_unavailable(&self.name, format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuditError::provider_unavailable(
                &self.name,
                format!("endpoint answered HTTP {}", status),
            ));
        }

        let body: Value = response.json().await.map_err(|e| {
            AuditError::provider_format(&self.name, format!("response is not JSON: {}", e))
        })?;

        let level = parse_classification(&self.name, &body)?;
        tracing::trace!("{} classified {} as {}", self.name, id, level);
        Ok(vec![fragment("pii", level)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceConfig;
    use crate::models::SourceType;

    fn completion(content: &str) -> Value {
        json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
    }

    fn context() -> CaptureContext {
        let source = SourceConfig::new(SourceType::Sqlite, "shop", "shop.db");
        CaptureContext::new(source, chrono::Utc::now()).unwrap()
    }

    #[test]
    fn test_parse_classification() {
        assert_eq!(
            parse_classification(NAME, &completion(r#"{"PII":"High"}"#)).unwrap(),
            "High"
        );
        assert_eq!(
            parse_classification(NAME, &completion("```json\n{\"pii\": \"low\"}\n```")).unwrap(),
            "Low"
        );
    }

    #[test]
    fn test_parse_classification_format_errors() {
        for body in [
            json!({"error": "nope"}),
            completion("High"),
            completion(r#"{"risk":"High"}"#),
            completion(r#"{"PII":"Extreme"}"#),
        ] {
            assert!(matches!(
                parse_classification(NAME, &body),
                Err(AuditError::ProviderFormat { .. })
            ));
        }
    }

    #[test]
    fn test_settings_validation() {
        assert!(create(NAME, None).is_ok());
        assert!(create(NAME, Some(&json!({"timeout_secs": 0}))).is_err());
        assert!(create(NAME, Some(&json!({"endpoint": "not a url"}))).is_err());
        assert!(create(NAME, Some(&json!({"temperature": 1}))).is_err());
    }

    #[tokio::test]
    async fn test_non_column_objects_are_skipped() {
        let provider = ClassifierProvider::new(NAME, ClassifierSettings::default()).unwrap();
        let fragments = provider
            .derive(&ObjectId::from_raw("shop::orders"), &context())
            .await
            .unwrap();
        assert!(fragments.is_empty());
    }

    #[tokio::test]
    async fn test_missing_api_key_is_unavailable() {
        let settings = ClassifierSettings {
            api_key_env: "DBAUDIT_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..Default::default()
        };
        let provider = ClassifierProvider::new(NAME, settings).unwrap();
        let result = provider
            .derive(&ObjectId::from_raw("shop::orders::email::TEXT"), &context())
            .await;
        assert!(matches!(result, Err(AuditError::ProviderUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unavailable() {
        let settings = ClassifierSettings {
            endpoint: "http://127.0.0.1:9/v1/chat/completions".to_string(),
            // Any variable that is set works as a key here
            api_key_env: "PATH".to_string(),
            timeout_secs: 2,
            ..Default::default()
        };
        let provider = ClassifierProvider::new(NAME, settings).unwrap();
        let result = provider
            .derive(&ObjectId::from_raw("shop::orders::email::TEXT"), &context())
            .await;
        assert!(matches!(result, Err(AuditError::ProviderUnavailable { .. })));
    }
}
