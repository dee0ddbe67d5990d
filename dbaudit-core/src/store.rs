//! Capture store: the accumulated result of every audit run of one target.
//!
//! ```json
//! {
//!   "capture_events": [{"timestamp": "...", "database_config": {...}, "comment": null}],
//!   "objects": [{"uuid": "shop::orders", "object_type": "table"}]
//! }
//! ```
//!
//! # Merge semantics
//! - Capture events are appended; existing events are never edited.
//! - Objects are deduplicated by uuid. A rescanned object's newest record
//!   replaces the previous one in place, so objects keep the position they
//!   were first seen at.
//! - Objects that vanished from the source keep their last record: the
//!   store is an audit trail, not a live mirror.
//!
//! # Persistence
//! `save` writes the whole store to a temporary file in the destination
//! directory and renames it over the destination, so readers see either the
//! previous or the new store, never a partial write.

use crate::error::{AuditError, Result};
use crate::models::{CaptureEvent, ObjectRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Accumulated capture events and object records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureStore {
    /// One event per run, oldest first
    #[serde(default)]
    pub capture_events: Vec<CaptureEvent>,
    /// Object records keyed by uuid, in first-seen order
    #[serde(default)]
    pub objects: Vec<ObjectRecord>,
}

impl CaptureStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a store from disk.
    ///
    /// # Errors
    /// - `NotFound` if no file exists at `path`
    /// - `CorruptStore` if the file exists but is not a capture store
    /// - `Io` for any other read failure
    pub async fn load(path: &Path) -> Result<Self> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AuditError::NotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                return Err(AuditError::CorruptStore {
                    path: path.to_path_buf(),
                    context: format!("not valid UTF-8: {}", e),
                });
            }
            Err(e) => {
                return Err(AuditError::io(
                    format!("Failed to read capture store {}", path.display()),
                    e,
                ));
            }
        };

        Self::from_json(path, &content)
    }

    /// Loads a store, treating a missing file as a fresh store.
    ///
    /// # Errors
    /// Same as [`CaptureStore::load`] except `NotFound`.
    pub async fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path).await {
            Err(AuditError::NotFound { .. }) => {
                tracing::debug!("No capture store at {}, starting fresh", path.display());
                Ok(Self::new())
            }
            other => other,
        }
    }

    fn from_json(path: &Path, content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| AuditError::CorruptStore {
            path: path.to_path_buf(),
            context: e.to_string(),
        })
    }

    /// Merges the results of one run into the store.
    ///
    /// Objects already in the store with a duplicated uuid are collapsed
    /// with the same newest-wins rule.
    pub fn merge(&mut self, events: Vec<CaptureEvent>, objects: Vec<ObjectRecord>) {
        self.capture_events.extend(events);

        let existing = std::mem::take(&mut self.objects);
        let mut positions: HashMap<String, usize> = HashMap::with_capacity(existing.len());
        let mut merged: Vec<ObjectRecord> = Vec::with_capacity(existing.len() + objects.len());

        for record in existing.into_iter().chain(objects) {
            match positions.get(record.uuid.as_str()) {
                Some(&index) => merged[index] = record,
                None => {
                    positions.insert(record.uuid.as_str().to_string(), merged.len());
                    merged.push(record);
                }
            }
        }

        self.objects = merged;
    }

    /// Looks up an object record by uuid.
    pub fn object(&self, uuid: &str) -> Option<&ObjectRecord> {
        self.objects.iter().find(|record| record.uuid.as_str() == uuid)
    }

    /// Pretty JSON form of the store.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| AuditError::Serialization {
            context: "Failed to serialize capture store".to_string(),
            source: e,
        })
    }

    /// Atomically writes the store to `path`, creating parent directories.
    ///
    /// # Errors
    /// Returns `Io` if the directory, the temporary file or the rename fails.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        let destination = path.to_path_buf();
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        tokio::fs::create_dir_all(&directory).await.map_err(|e| {
            AuditError::io(format!("Failed to create directory {}", directory.display()), e)
        })?;

        tokio::task::spawn_blocking(move || write_atomically(&directory, &destination, &json))
            .await
            .map_err(|e| AuditError::io("Capture store writer panicked", std::io::Error::other(e)))??;

        tracing::info!(
            "Saved capture store with {} objects and {} events to {}",
            self.objects.len(),
            self.capture_events.len(),
            path.display()
        );
        Ok(())
    }
}

fn write_atomically(directory: &Path, destination: &Path, json: &str) -> Result<()> {
    let context = || format!("Failed to write capture store {}", destination.display());

    let mut file = tempfile::NamedTempFile::new_in(directory).map_err(|e| AuditError::io(context(), e))?;
    file.write_all(json.as_bytes())
        .and_then(|()| file.write_all(b"\n"))
        .and_then(|()| file.as_file().sync_all())
        .map_err(|e| AuditError::io(context(), e))?;
    file.persist(destination)
        .map_err(|e| AuditError::io(context(), e.error))?;
    Ok(())
}
