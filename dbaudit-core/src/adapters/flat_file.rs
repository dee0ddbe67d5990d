//! Flat-file (CSV) source adapter.
//!
//! A CSV file is exposed as a single pseudo-table named after the file.
//! Its header row provides the columns; CSV carries no type information, so
//! every column reports the generic type [`FLAT_FILE_COLUMN_TYPE`].
//! A header field that is empty after trimming is named `column_<n>` after
//! its 1-based position.

use super::{ColumnInfo, SourceAdapter};
use crate::Result;
use crate::error::AuditError;
use crate::models::SourceType;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Type reported for every flat-file column.
pub const FLAT_FILE_COLUMN_TYPE: &str = "String";

/// CSV source adapter.
#[derive(Debug, Clone)]
pub struct FlatFileSource {
    path: PathBuf,
    database_name: String,
    table_name: String,
    /// Header row, populated by `connect`
    headers: Option<Vec<String>>,
}

impl FlatFileSource {
    /// Creates an unconnected flat-file source. No I/O happens here.
    pub fn new(path: impl AsRef<Path>, database_name: &str) -> Self {
        let path = path.as_ref().to_path_buf();
        let table_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Self {
            path,
            database_name: database_name.to_string(),
            table_name,
            headers: None,
        }
    }

    /// Name of the single pseudo-table.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    fn headers_for(&self, table: &str) -> Result<&[String]> {
        let headers = self
            .headers
            .as_deref()
            .ok_or_else(|| AuditError::not_connected("flat-file source is not connected"))?;

        if table != self.table_name {
            return Err(AuditError::schema(
                table,
                format!("flat file only exposes table '{}'", self.table_name),
            ));
        }

        Ok(headers)
    }
}

/// Reads the header row of CSV content.
pub(crate) fn read_headers(content: &[u8]) -> std::result::Result<Vec<String>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content);

    Ok(reader
        .headers()?
        .iter()
        .map(|header| header.trim().to_string())
        .collect())
}

/// Names unnamed header fields `column_<n>` by 1-based position.
///
/// A placeholder already taken by a named header gets `_` appended until it
/// is unique.
pub(crate) fn name_unnamed_columns(headers: Vec<String>) -> Vec<String> {
    let named: HashSet<String> = headers.iter().filter(|h| !h.is_empty()).cloned().collect();
    headers
        .into_iter()
        .enumerate()
        .map(|(index, header)| {
            if !header.is_empty() {
                return header;
            }
            let mut placeholder = format!("column_{}", index + 1);
            while named.contains(&placeholder) {
                placeholder.push('_');
            }
            placeholder
        })
        .collect()
}

#[async_trait]
impl SourceAdapter for FlatFileSource {
    async fn connect(&mut self) -> Result<()> {
        if self.headers.is_some() {
            return Ok(());
        }

        let content = tokio::fs::read(&self.path).await.map_err(|e| {
            AuditError::connection_failed(format!("Cannot read {}", self.path.display()), e)
        })?;

        let headers = read_headers(&content).map_err(|e| {
            AuditError::connection_failed(
                format!("{} is not readable as CSV", self.path.display()),
                e,
            )
        })?;

        if headers.is_empty() || headers.iter().all(String::is_empty) {
            return Err(AuditError::not_connected(format!(
                "{} has no header row",
                self.path.display()
            )));
        }

        let unnamed = headers.iter().filter(|h| h.is_empty()).count();
        if unnamed > 0 {
            tracing::warn!(
                "{} has {} unnamed column(s); using positional names",
                self.path.display(),
                unnamed
            );
        }
        let headers = name_unnamed_columns(headers);

        tracing::debug!(
            "Opened flat file {} with {} columns",
            self.path.display(),
            headers.len()
        );
        self.headers = Some(headers);
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        if self.headers.is_none() {
            return Err(AuditError::not_connected("flat-file source is not connected"));
        }
        Ok(vec![self.table_name.clone()])
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<String>> {
        Ok(self.headers_for(table)?.to_vec())
    }

    async fn column_type(&self, table: &str, column: &str) -> Result<String> {
        if self.headers_for(table)?.iter().any(|header| header == column) {
            Ok(FLAT_FILE_COLUMN_TYPE.to_string())
        } else {
            Err(AuditError::schema(
                table,
                format!("column '{}' does not exist", column),
            ))
        }
    }

    async fn describe_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        Ok(self
            .headers_for(table)?
            .iter()
            .map(|header| ColumnInfo::new(header.clone(), FLAT_FILE_COLUMN_TYPE))
            .collect())
    }

    fn source_type(&self) -> SourceType {
        SourceType::Csv
    }

    fn database_name(&self) -> &str {
        &self.database_name
    }

    fn is_connected(&self) -> bool {
        self.headers.is_some()
    }
}
