//! Persistence of extracted documents.
//!
//! One JSON file per source document, named after a UUID v5 of the source
//! path, so re-extracting a file replaces its previous record.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{DocexError, Result};
use crate::models::document::ExtractedDocument;

/// Processing status of a stored record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Saved and waiting for indexing.
    #[default]
    Pending,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    /// Path-addressed key.
    pub key: Uuid,
    pub source_path: String,
    pub status: DocumentStatus,
    pub saved_at: DateTime<Utc>,
    pub document: ExtractedDocument,
}

/// Storage collaborator for extracted documents.
pub trait DocumentStore {
    /// Upsert by source path. Always resets the status to pending.
    fn save(&self, document: &ExtractedDocument, source_path: &Path) -> Result<StoredDocument>;

    /// Look up by document id or store key.
    fn get(&self, id: &str) -> Result<Option<StoredDocument>>;

    /// All records, most recently extracted first.
    fn list(&self) -> Result<Vec<StoredDocument>>;
}

/// Stable key for a source path.
pub fn path_key(source_path: &Path) -> Uuid {
    let canonical = fs::canonicalize(source_path).unwrap_or_else(|_| source_path.to_path_buf());
    Uuid::new_v5(&Uuid::NAMESPACE_URL, canonical.to_string_lossy().as_bytes())
}

/// [`DocumentStore`] backed by a directory of JSON files.
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    /// Open a store, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn read_record(path: &Path) -> Result<StoredDocument> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| DocexError::Store(format!("{}: {}", path.display(), e)))
    }
}

impl DocumentStore for JsonDirStore {
    fn save(&self, document: &ExtractedDocument, source_path: &Path) -> Result<StoredDocument> {
        let key = path_key(source_path);
        let record = StoredDocument {
            key,
            source_path: source_path.display().to_string(),
            status: DocumentStatus::Pending,
            saved_at: Utc::now(),
            document: document.clone(),
        };

        let content = serde_json::to_string_pretty(&record)
            .map_err(|e| DocexError::Store(e.to_string()))?;
        let path = self.record_path(&key);
        fs::write(&path, content)?;

        debug!("Saved document {} to {}", document.id, path.display());
        Ok(record)
    }

    fn get(&self, id: &str) -> Result<Option<StoredDocument>> {
        let Ok(id) = Uuid::parse_str(id.trim()) else {
            return Ok(None);
        };

        let by_key = self.record_path(&id);
        if by_key.exists() {
            return Self::read_record(&by_key).map(Some);
        }

        Ok(self.list()?.into_iter().find(|r| r.document.id == id))
    }

    fn list(&self) -> Result<Vec<StoredDocument>> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_record(&path) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unreadable record: {}", e),
            }
        }

        records.sort_by(|a, b| b.document.extracted_at.cmp(&a.document.extracted_at));
        Ok(records)
    }
}
