//! Files selected by the user but not yet uploaded.
//!
//! The buffer never talks to the backend. Duplicates (same name, size and
//! modification time) are dropped silently on insert.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::{Error, Result};

/// Identity of a pending file for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PendingKey {
    pub name: String,
    pub size: u64,
    pub last_modified_ms: i64,
}

/// A file chosen for upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingFile {
    /// Display name sent to the backend
    pub name: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    /// Where the bytes are read from at upload time
    pub path: PathBuf,
}

impl PendingFile {
    pub fn new(name: impl Into<String>, size: u64, last_modified: DateTime<Utc>) -> Self {
        let name = name.into();
        Self {
            path: PathBuf::from(&name),
            name,
            size,
            last_modified,
        }
    }

    /// Describe a file on disk from its metadata.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file_error = |source| Error::File {
            path: path.display().to_string(),
            source,
        };

        let metadata = tokio::fs::metadata(path).await.map_err(file_error)?;
        let modified = metadata.modified().map_err(file_error)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            name,
            size: metadata.len(),
            last_modified: DateTime::<Utc>::from(modified),
            path: path.to_path_buf(),
        })
    }

    pub fn key(&self) -> PendingKey {
        PendingKey {
            name: self.name.clone(),
            size: self.size,
            last_modified_ms: self.last_modified.timestamp_millis(),
        }
    }
}

/// Ordered, duplicate-free list of files awaiting confirmation.
#[derive(Clone, Default)]
pub struct PendingBuffer {
    files: Arc<RwLock<Vec<PendingFile>>>,
}

impl PendingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append files whose key is not already present. Returns how many were added.
    pub async fn add_files(&self, incoming: impl IntoIterator<Item = PendingFile>) -> usize {
        let mut files = self.files.write().await;
        let mut added = 0;

        for file in incoming {
            let key = file.key();
            if files.iter().any(|existing| existing.key() == key) {
                tracing::debug!(file_name = %file.name, "Skipping duplicate pending file");
                continue;
            }
            files.push(file);
            added += 1;
        }

        added
    }

    /// Remove the entry at `index`, if any.
    pub async fn remove(&self, index: usize) -> Option<PendingFile> {
        let mut files = self.files.write().await;
        if index < files.len() {
            Some(files.remove(index))
        } else {
            None
        }
    }

    /// Remove every entry whose key is in `keys`.
    pub async fn remove_keys(&self, keys: &[PendingKey]) {
        self.files
            .write()
            .await
            .retain(|file| !keys.contains(&file.key()));
    }

    pub async fn clear(&self) {
        self.files.write().await.clear();
    }

    pub async fn snapshot(&self) -> Vec<PendingFile> {
        self.files.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }

    /// Combined byte size of all pending files.
    pub async fn total_size(&self) -> u64 {
        self.files.read().await.iter().map(|f| f.size).sum()
    }
}
