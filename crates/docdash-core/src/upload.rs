//! Upload coordination
//!
//! Confirmed files are uploaded strictly one after another: file n+1 is not
//! sent until file n has a response. A failed file is recorded and the batch
//! moves on. Once the batch is done, every file it attempted leaves the
//! pending buffer (failed ones included; the user re-selects to retry) and
//! the document registry is refreshed.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::backend::Backend;
use crate::pending::{PendingBuffer, PendingKey};
use crate::registry::DocumentRegistry;

/// Result of uploading one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum UploadStatus {
    Uploaded { document_id: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadOutcome {
    pub file_name: String,
    #[serde(flatten)]
    pub status: UploadStatus,
}

/// Aggregate result of one confirmed batch, outcomes in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadSummary {
    pub success_count: usize,
    pub fail_count: usize,
    pub outcomes: Vec<UploadOutcome>,
}

impl UploadSummary {
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }
}

/// Progress of the batch currently being uploaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadProgress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// File being sent right now
    pub current: Option<String>,
}

impl UploadProgress {
    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }
}

#[derive(Clone)]
pub struct UploadCoordinator {
    backend: Arc<dyn Backend>,
    registry: DocumentRegistry,
    progress: Arc<RwLock<UploadProgress>>,
    /// Serializes batches so two confirmations never interleave requests
    batch_lock: Arc<Mutex<()>>,
}

impl UploadCoordinator {
    pub fn new(backend: Arc<dyn Backend>, registry: DocumentRegistry) -> Self {
        Self {
            backend,
            registry,
            progress: Arc::new(RwLock::new(UploadProgress::default())),
            batch_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Upload a snapshot of the pending buffer.
    ///
    /// Individual failures are absorbed into the summary; this never fails.
    pub async fn confirm_upload(&self, pending: &PendingBuffer) -> UploadSummary {
        let _batch = self.batch_lock.lock().await;

        let files = pending.snapshot().await;
        if files.is_empty() {
            return UploadSummary::default();
        }

        tracing::info!(count = files.len(), "Uploading batch");
        *self.progress.write().await = UploadProgress {
            total: files.len(),
            ..Default::default()
        };

        let mut summary = UploadSummary::default();
        for file in &files {
            self.progress.write().await.current = Some(file.name.clone());

            let status = match self.backend.upload(file).await {
                Ok(document_id) => {
                    tracing::info!(file_name = %file.name, doc_id = %document_id, "Upload succeeded");
                    summary.success_count += 1;
                    self.progress.write().await.completed += 1;
                    UploadStatus::Uploaded { document_id }
                }
                Err(e) => {
                    tracing::warn!(file_name = %file.name, error = %e, "Upload failed");
                    summary.fail_count += 1;
                    self.progress.write().await.failed += 1;
                    UploadStatus::Failed {
                        error: e.to_string(),
                    }
                }
            };

            summary.outcomes.push(UploadOutcome {
                file_name: file.name.clone(),
                status,
            });
        }

        let attempted: Vec<PendingKey> = files.iter().map(|f| f.key()).collect();
        pending.remove_keys(&attempted).await;
        self.progress.write().await.current = None;

        tracing::info!(
            success = summary.success_count,
            failed = summary.fail_count,
            "Upload batch finished"
        );

        // A failed refresh is logged there; the poll loop catches up
        let _ = self.registry.refresh().await;

        summary
    }

    pub async fn progress(&self) -> UploadProgress {
        self.progress.read().await.clone()
    }
}
