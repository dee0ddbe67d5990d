//! Stable object identifiers.
//!
//! Every discovered object is keyed by a delimited string built from a strict
//! prefix chain of schema facts:
//!
//! | segments | object   | shape                                  |
//! |----------|----------|----------------------------------------|
//! | 1        | database | `database`                             |
//! | 2        | table    | `database::table`                      |
//! | 4        | column   | `database::table::column::type`        |
//!
//! A column segment never appears without its type segment. Identifiers are
//! a pure function of the schema facts and the delimiter, so rediscovering an
//! unchanged source yields the same identifiers run after run. Metadata
//! providers and the capture store rely on that to recognize an object
//! across scans.
//!
//! Three-segment identifiers are rejected. Older producers emitted
//! `table::column::type` without a database segment; such input cannot be
//! told apart from a malformed four-segment id and is refused instead of
//! guessed at.

use crate::error::{AuditError, Result};
use serde::{Deserialize, Serialize};

/// Delimiter used when a source configuration does not set one.
pub const DEFAULT_DELIMITER: &str = "::";

/// Canonical identifier of a discovered object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Wraps an identifier string without validating it.
    ///
    /// Used when reading identifiers back from a capture store, where the
    /// delimiter that produced them is only known to the caller.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Kind of object an identifier denotes, derived from its segment count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// One segment: `database`
    Database,
    /// Two segments: `database::table`
    Table,
    /// Four segments: `database::table::column::type`
    Column,
}

impl ObjectKind {
    /// Lowercase name used in metadata fragments and rule configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Table => "table",
            Self::Column => "column",
        }
    }

    /// Parses a kind name as written in configuration files.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "database" => Some(Self::Database),
            "table" => Some(Self::Table),
            "column" => Some(Self::Column),
            _ => None,
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Segments recovered from an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierParts {
    /// Database segment, always present
    pub database: String,
    /// Table segment of table and column identifiers
    pub table: Option<String>,
    /// Column segment of column identifiers
    pub column: Option<String>,
    /// Column type segment, present exactly when `column` is
    pub data_type: Option<String>,
}

impl IdentifierParts {
    /// Kind of the object these segments describe.
    pub fn kind(&self) -> ObjectKind {
        match (&self.table, &self.column) {
            (None, _) => ObjectKind::Database,
            (Some(_), None) => ObjectKind::Table,
            (Some(_), Some(_)) => ObjectKind::Column,
        }
    }
}

/// Builds and parses identifiers with one fixed delimiter.
///
/// The delimiter comes from the source configuration, so the codec used to
/// parse an identifier must be built from the same configuration that built
/// it.
///
/// # Example
/// ```rust
/// use dbaudit_core::identifier::{IdentifierCodec, ObjectKind};
///
/// let codec = IdentifierCodec::default();
/// let id = codec.column("shop", "orders", "email", "TEXT")?;
/// assert_eq!(id.as_str(), "shop::orders::email::TEXT");
///
/// let parts = codec.parse(id.as_str())?;
/// assert_eq!(parts.kind(), ObjectKind::Column);
/// assert_eq!(parts.column.as_deref(), Some("email"));
/// # Ok::<(), dbaudit_core::AuditError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierCodec {
    delimiter: String,
}

impl Default for IdentifierCodec {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER.to_string(),
        }
    }
}

impl IdentifierCodec {
    /// Creates a codec for the given delimiter.
    ///
    /// # Errors
    /// Returns a configuration error if the delimiter is empty.
    pub fn new(delimiter: impl Into<String>) -> Result<Self> {
        let delimiter = delimiter.into();
        if delimiter.is_empty() {
            return Err(AuditError::configuration(
                "UUID_DELIMITER cannot be empty",
            ));
        }
        Ok(Self { delimiter })
    }

    /// The delimiter joining segments.
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Builds an identifier from a prefix chain of schema facts.
    ///
    /// # Errors
    /// Returns `InvalidIdentifier` if:
    /// - `database` is empty
    /// - `column` is given without `data_type` or the other way round
    /// - `column`/`data_type` are given without `table`
    /// - any segment is empty or contains the delimiter
    pub fn build(
        &self,
        database: &str,
        table: Option<&str>,
        column: Option<&str>,
        data_type: Option<&str>,
    ) -> Result<ObjectId> {
        let attempted = [Some(database), table, column, data_type]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(&self.delimiter);

        if database.is_empty() {
            return Err(AuditError::invalid_identifier(
                attempted,
                "database segment is empty",
            ));
        }

        let segments: Vec<&str> = match (table, column, data_type) {
            (None, None, None) => vec![database],
            (Some(table), None, None) => vec![database, table],
            (Some(table), Some(column), Some(data_type)) => {
                vec![database, table, column, data_type]
            }
            (None, _, _) => {
                return Err(AuditError::invalid_identifier(
                    attempted,
                    "column segments given without a table",
                ));
            }
            (Some(_), Some(_), None) => {
                return Err(AuditError::invalid_identifier(
                    attempted,
                    "column given without a type",
                ));
            }
            (Some(_), None, Some(_)) => {
                return Err(AuditError::invalid_identifier(
                    attempted,
                    "type given without a column",
                ));
            }
        };

        for segment in &segments {
            if segment.is_empty() {
                return Err(AuditError::invalid_identifier(attempted, "empty segment"));
            }
            if segment.contains(self.delimiter.as_str()) {
                return Err(AuditError::invalid_identifier(
                    attempted,
                    format!(
                        "segment '{}' contains the delimiter '{}'",
                        segment, self.delimiter
                    ),
                ));
            }
        }

        let joined = segments.join(&self.delimiter);

        // A segment ending in a partial delimiter can still shift the split
        // points ("a:" + "::" + "b" splits as "a" / ":b").
        if !joined.split(self.delimiter.as_str()).eq(segments.iter().copied()) {
            return Err(AuditError::invalid_identifier(
                joined,
                "segments do not split back unambiguously on the delimiter",
            ));
        }

        Ok(ObjectId(joined))
    }

    /// Identifier of a database node.
    pub fn database(&self, database: &str) -> Result<ObjectId> {
        self.build(database, None, None, None)
    }

    /// Identifier of a table node.
    pub fn table(&self, database: &str, table: &str) -> Result<ObjectId> {
        self.build(database, Some(table), None, None)
    }

    /// Identifier of a column node.
    pub fn column(
        &self,
        database: &str,
        table: &str,
        column: &str,
        data_type: &str,
    ) -> Result<ObjectId> {
        self.build(database, Some(table), Some(column), Some(data_type))
    }

    /// Splits an identifier back into its segments.
    ///
    /// # Errors
    /// Returns `InvalidIdentifier` unless the identifier has exactly 1, 2 or
    /// 4 non-empty segments. Three segments are reported as the legacy
    /// database-less form.
    pub fn parse(&self, identifier: &str) -> Result<IdentifierParts> {
        let parts: Vec<&str> = identifier.split(self.delimiter.as_str()).collect();

        if parts.iter().any(|part| part.is_empty()) {
            return Err(AuditError::invalid_identifier(identifier, "empty segment"));
        }

        match parts.as_slice() {
            [database] => Ok(IdentifierParts {
                database: (*database).to_string(),
                table: None,
                column: None,
                data_type: None,
            }),
            [database, table] => Ok(IdentifierParts {
                database: (*database).to_string(),
                table: Some((*table).to_string()),
                column: None,
                data_type: None,
            }),
            [database, table, column, data_type] => Ok(IdentifierParts {
                database: (*database).to_string(),
                table: Some((*table).to_string()),
                column: Some((*column).to_string()),
                data_type: Some((*data_type).to_string()),
            }),
            [_, _, _] => Err(AuditError::invalid_identifier(
                identifier,
                "three-segment identifiers (legacy table/column/type without database) are not accepted",
            )),
            other => Err(AuditError::invalid_identifier(
                identifier,
                format!("expected 1, 2 or 4 segments, found {}", other.len()),
            )),
        }
    }

    /// Kind of the object an identifier denotes.
    pub fn kind_of(&self, identifier: &str) -> Result<ObjectKind> {
        self.parse(identifier).map(|parts| parts.kind())
    }
}
