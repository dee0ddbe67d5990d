//! Core data models for captured objects and audit runs.
//!
//! Object records are open maps: apart from the mandatory `uuid`, every field
//! is contributed by a metadata provider. Field maps are `serde_json::Map`,
//! which keeps keys sorted, so a record always serializes the same way for
//! the same content.

use crate::identifier::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Small key/value map contributed by one metadata provider.
pub type Fragment = serde_json::Map<String, serde_json::Value>;

/// Supported source types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    #[serde(alias = "SQLite", alias = "SQLiteDatabase")]
    Sqlite,
    #[serde(alias = "postgresql", alias = "PostgreSQL")]
    Postgres,
    #[serde(alias = "MySQL")]
    Mysql,
    #[serde(alias = "CSV", alias = "CSVDatabase", alias = "flat_file")]
    Csv,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite => write!(f, "SQLite"),
            Self::Postgres => write!(f, "PostgreSQL"),
            Self::Mysql => write!(f, "MySQL"),
            Self::Csv => write!(f, "CSV"),
        }
    }
}

/// One discovered object with the metadata merged onto it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// Stable identifier of the object
    pub uuid: ObjectId,
    /// Provider-contributed fields, serialized alongside `uuid`
    #[serde(flatten)]
    pub fields: Fragment,
}

impl ObjectRecord {
    /// Creates a record carrying only its identifier.
    pub fn new(uuid: ObjectId) -> Self {
        Self {
            uuid,
            fields: Fragment::new(),
        }
    }

    /// Merges a fragment into the record; incoming keys overwrite existing ones.
    pub fn merge_fragment(&mut self, fragment: Fragment) {
        for (key, value) in fragment {
            // "uuid" is owned by the record itself
            if key == "uuid" {
                continue;
            }
            self.fields.insert(key, value);
        }
    }

    /// Looks up a metadata field.
    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.get(key)
    }

    /// Returns a string-valued field.
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(serde_json::Value::as_str)
    }

    /// Copy of the record without the given fields, used to compare records
    /// across runs while ignoring timestamp-bearing fields.
    pub fn without_fields(&self, keys: &[&str]) -> Self {
        let mut copy = self.clone();
        for key in keys {
            copy.fields.remove(*key);
        }
        copy
    }
}

/// Record of one audit run. Appended to the store and never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureEvent {
    /// Capture timestamp of the run
    pub timestamp: DateTime<Utc>,
    /// Full source configuration used for the run, connection string redacted
    pub database_config: serde_json::Value,
    /// Free-text comment given for the run
    #[serde(default)]
    pub comment: Option<String>,
    /// Tables skipped and provider calls that failed during the run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

impl CaptureEvent {
    /// Creates a capture event with no diagnostics.
    pub fn new(
        timestamp: DateTime<Utc>,
        database_config: serde_json::Value,
        comment: Option<String>,
    ) -> Self {
        Self {
            timestamp,
            database_config,
            comment,
            diagnostics: Vec::new(),
        }
    }

    /// Attaches diagnostics collected during the run.
    pub fn with_diagnostics(mut self, diagnostics: Vec<String>) -> Self {
        self.diagnostics = diagnostics;
        self
    }
}
