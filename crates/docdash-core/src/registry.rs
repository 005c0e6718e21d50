//! Document registry
//!
//! Client-side view of every document the backend knows about. Each refresh
//! replaces the whole list with the backend's snapshot, with one exception:
//! a document that reached `completed` or `failed` keeps that status until
//! the user explicitly starts processing it again.
//!
//! Refreshes may overlap (poll tick, post-upload, post-delete). Snapshots
//! are applied in request order: a response that lands after a newer one
//! has already been applied is discarded.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::models::{Document, DocumentStatus, Task, TaskStatus};
use crate::notice::Notice;

/// What a document looked like when its start request was accepted.
#[derive(Debug, Clone)]
struct AwaitingStart {
    status: DocumentStatus,
    task_id: Option<String>,
    error_message: Option<String>,
}

impl AwaitingStart {
    fn of(doc: &Document) -> Self {
        Self {
            status: doc.status,
            task_id: doc.task_id.clone(),
            error_message: doc.error_message.clone(),
        }
    }

    /// The backend reported a status or error the request could not have seen.
    fn superseded_by(&self, doc: &Document) -> bool {
        doc.status != self.status || doc.error_message != self.error_message
    }
}

#[derive(Default)]
struct RegistryState {
    documents: Vec<Document>,
    /// Documents with an accepted "start processing" request
    awaiting: HashMap<String, AwaitingStart>,
    /// Terminal tasks from the latest task snapshot
    finished_tasks: HashMap<String, TaskStatus>,
    /// Generation of the snapshot currently held
    applied: u64,
    /// Processing failures not yet shown to the user
    notices: Vec<Notice>,
    last_refreshed: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl RegistryState {
    /// Drop awaiting marks whose document is now linked to a new task that
    /// already finished. A failed task on a failed document is a new failure.
    fn settle_awaiting(&mut self) {
        let mut settled = Vec::new();
        for doc in &self.documents {
            let Some(mark) = self.awaiting.get(&doc.document_id) else {
                continue;
            };
            let Some(task_id) = doc.task_id.as_deref() else {
                continue;
            };
            if mark.task_id.as_deref() == Some(task_id) {
                continue;
            }
            if let Some(status) = self.finished_tasks.get(task_id) {
                settled.push((doc, *status));
            }
        }

        for (doc, task_status) in settled {
            self.awaiting.remove(&doc.document_id);
            if task_status == TaskStatus::Failed && doc.status == DocumentStatus::Failed {
                warn_failed(doc);
                self.notices.push(Notice::processing_failed(
                    &doc.document_id,
                    &doc.file_name,
                    doc.error_message.as_deref(),
                ));
            }
        }
    }
}

fn warn_failed(doc: &Document) {
    tracing::warn!(
        doc_id = %doc.document_id,
        file_name = %doc.file_name,
        error = doc.error_message.as_deref().unwrap_or("unknown"),
        "Document processing failed"
    );
}

/// Owns the document list; all writes go through its methods.
#[derive(Clone)]
pub struct DocumentRegistry {
    backend: Arc<dyn Backend>,
    state: Arc<RwLock<RegistryState>>,
    /// Generation handed to the next refresh request
    requested: Arc<AtomicU64>,
}

impl DocumentRegistry {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            state: Arc::new(RwLock::new(RegistryState::default())),
            requested: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Replace the registry with a fresh backend snapshot.
    ///
    /// On failure the previous snapshot is kept and the error returned for
    /// logging; the next poll tick retries. Returns the number of documents
    /// held afterwards.
    pub async fn refresh(&self) -> Result<usize> {
        let generation = self.requested.fetch_add(1, Ordering::SeqCst) + 1;

        let snapshot = match self.backend.documents().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "Document refresh failed, keeping previous snapshot");
                let mut state = self.state.write().await;
                if generation > state.applied {
                    state.last_error = Some(e.to_string());
                }
                return Err(e);
            }
        };

        let mut state = self.state.write().await;
        if generation < state.applied {
            tracing::debug!(generation, applied = state.applied, "Discarding stale document snapshot");
            return Ok(state.documents.len());
        }
        state.applied = generation;

        let previous: HashMap<String, Document> = std::mem::take(&mut state.documents)
            .into_iter()
            .map(|doc| (doc.document_id.clone(), doc))
            .collect();

        let mut documents = Vec::with_capacity(snapshot.len());
        for mut doc in snapshot {
            let prior = previous.get(&doc.document_id);
            let awaiting = state.awaiting.get(&doc.document_id).cloned();

            if let Some(prior) = prior {
                if prior.status.is_terminal() && !doc.status.is_terminal() && awaiting.is_none() {
                    tracing::debug!(
                        doc_id = %doc.document_id,
                        held = %prior.status,
                        reported = %doc.status,
                        "Ignoring status regression"
                    );
                    doc.status = prior.status;
                    doc.error_message = prior.error_message.clone();
                    doc.chunks_count = prior.chunks_count;
                    doc.content_length = prior.content_length;
                }
            }

            let restarted = awaiting.is_some_and(|mark| mark.superseded_by(&doc));
            if restarted {
                state.awaiting.remove(&doc.document_id);
            }

            let newly_failed = doc.status == DocumentStatus::Failed
                && (restarted || prior.is_some_and(|p| p.status != DocumentStatus::Failed));
            if newly_failed {
                warn_failed(&doc);
                state.notices.push(Notice::processing_failed(
                    &doc.document_id,
                    &doc.file_name,
                    doc.error_message.as_deref(),
                ));
            }

            documents.push(doc);
        }

        let present: HashSet<&str> = documents.iter().map(|d| d.document_id.as_str()).collect();
        state.awaiting.retain(|id, _| present.contains(id.as_str()));

        let count = documents.len();
        state.documents = documents;
        state.settle_awaiting();
        state.last_refreshed = Some(Utc::now());
        state.last_error = None;

        tracing::debug!(count, "Documents refreshed");
        Ok(count)
    }

    /// Take note of which tasks have finished.
    ///
    /// A document waiting on a start request stops waiting once it is linked
    /// to a task that was not its task at request time and that task is
    /// terminal, even if the document record itself has not changed.
    pub async fn observe_tasks(&self, tasks: &[Task]) {
        let mut state = self.state.write().await;
        state.finished_tasks = tasks
            .iter()
            .filter(|t| t.status.is_terminal())
            .map(|t| (t.task_id.clone(), t.status))
            .collect();
        state.settle_awaiting();
    }

    /// Ask the backend to process a document.
    ///
    /// Refused locally, without a request, when the document is unknown or
    /// the backend has not flagged it as processable. While the request is
    /// outstanding, and until the backend reports a new status or error or a
    /// new task that already finished, the document is reported by
    /// [`awaiting_ids`](Self::awaiting_ids).
    pub async fn start_processing(&self, document_id: &str) -> Result<()> {
        {
            let mut state = self.state.write().await;
            let doc = state
                .documents
                .iter()
                .find(|d| d.document_id == document_id)
                .ok_or_else(|| Error::UnknownDocument(document_id.to_string()))?;
            if !doc.can_process {
                return Err(Error::NotProcessable(document_id.to_string()));
            }
            let mark = AwaitingStart::of(doc);
            state.awaiting.insert(document_id.to_string(), mark);
        }

        match self.backend.start_processing(document_id).await {
            Ok(()) => {
                tracing::info!(doc_id = %document_id, "Processing requested");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(doc_id = %document_id, error = %e, "Processing request failed");
                self.state.write().await.awaiting.remove(document_id);
                Err(e)
            }
        }
    }

    /// Delete documents on the backend, then refresh.
    ///
    /// Unguarded; user-facing paths go through the destructive action guard.
    /// The registry is untouched unless the backend confirms.
    pub(crate) async fn delete(&self, document_ids: &[String]) -> Result<()> {
        self.backend.delete_documents(document_ids).await?;
        tracing::info!(count = document_ids.len(), "Documents deleted");
        self.refresh_after_change().await;
        Ok(())
    }

    /// Remove every document on the backend, then refresh. Unguarded.
    pub(crate) async fn clear(&self) -> Result<()> {
        self.backend.clear_documents().await?;
        tracing::info!("All documents cleared");
        self.refresh_after_change().await;
        Ok(())
    }

    async fn refresh_after_change(&self) {
        // Failure already logged; the poll loop catches up
        let _ = self.refresh().await;
    }

    pub async fn documents(&self) -> Vec<Document> {
        self.state.read().await.documents.clone()
    }

    pub async fn get(&self, document_id: &str) -> Option<Document> {
        self.state
            .read()
            .await
            .documents
            .iter()
            .find(|d| d.document_id == document_id)
            .cloned()
    }

    pub async fn awaiting_ids(&self) -> HashSet<String> {
        self.state.read().await.awaiting.keys().cloned().collect()
    }

    /// Drain processing-failure notices collected by refreshes.
    pub async fn take_notices(&self) -> Vec<Notice> {
        std::mem::take(&mut self.state.write().await.notices)
    }

    pub async fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.last_refreshed
    }

    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.last_error.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{document, MockBackend};
    use std::time::Duration;

    fn registry_with(docs: Vec<Document>) -> (Arc<MockBackend>, DocumentRegistry) {
        let backend = Arc::new(MockBackend::new());
        backend.edit(|s| s.documents = docs);
        let registry = DocumentRegistry::new(backend.clone());
        (backend, registry)
    }

    fn set_status(backend: &MockBackend, id: &str, status: DocumentStatus) {
        backend.edit(|s| {
            if let Some(doc) = s.documents.iter_mut().find(|d| d.document_id == id) {
                doc.status = status;
            }
        });
    }

    #[tokio::test]
    async fn test_refresh_replaces_wholesale() {
        let (backend, registry) = registry_with(vec![
            document("d1", "a.pdf", DocumentStatus::Uploaded),
            document("d2", "b.pdf", DocumentStatus::Uploaded),
        ]);
        assert_eq!(registry.refresh().await.unwrap(), 2);

        backend.edit(|s| s.documents.retain(|d| d.document_id == "d2"));
        registry.refresh().await.unwrap();

        let ids: Vec<_> = registry
            .documents()
            .await
            .into_iter()
            .map(|d| d.document_id)
            .collect();
        assert_eq!(ids, vec!["d2"]);
    }

    #[tokio::test]
    async fn test_failed_poll_keeps_previous_snapshot() {
        let (backend, registry) =
            registry_with(vec![document("d1", "a.pdf", DocumentStatus::Uploaded)]);
        registry.refresh().await.unwrap();

        backend.edit(|s| s.fail_polls = true);
        assert!(registry.refresh().await.is_err());
        assert_eq!(registry.documents().await.len(), 1);
        assert!(registry.last_error().await.is_some());

        backend.edit(|s| s.fail_polls = false);
        registry.refresh().await.unwrap();
        assert!(registry.last_error().await.is_none());
    }

    #[tokio::test]
    async fn test_terminal_status_does_not_regress() {
        let (backend, registry) =
            registry_with(vec![document("d1", "a.pdf", DocumentStatus::Processing)]);
        registry.refresh().await.unwrap();

        backend.edit(|s| {
            s.documents[0].status = DocumentStatus::Completed;
            s.documents[0].chunks_count = Some(12);
        });
        registry.refresh().await.unwrap();

        // A stale replica reports the old state again
        backend.edit(|s| {
            s.documents[0].status = DocumentStatus::Processing;
            s.documents[0].chunks_count = None;
        });
        registry.refresh().await.unwrap();

        let doc = registry.get("d1").await.unwrap();
        assert_eq!(doc.status, DocumentStatus::Completed);
        assert_eq!(doc.chunks_count, Some(12));
    }

    #[tokio::test]
    async fn test_retry_after_failure_is_allowed() {
        let mut failed = document("d1", "a.pdf", DocumentStatus::Processing);
        failed.can_process = true;
        let (backend, registry) = registry_with(vec![failed]);
        registry.refresh().await.unwrap();

        backend.edit(|s| {
            s.documents[0].status = DocumentStatus::Failed;
            s.documents[0].error_message = Some("parser crashed".to_string());
        });
        registry.refresh().await.unwrap();

        registry.start_processing("d1").await.unwrap();
        assert!(registry.awaiting_ids().await.contains("d1"));

        // Backend has not moved yet: still awaiting, still failed
        registry.refresh().await.unwrap();
        assert!(registry.awaiting_ids().await.contains("d1"));

        set_status(&backend, "d1", DocumentStatus::Processing);
        registry.refresh().await.unwrap();
        assert_eq!(registry.get("d1").await.unwrap().status, DocumentStatus::Processing);
        assert!(registry.awaiting_ids().await.is_empty());
    }

    /// A document that failed, was retried and failed again before any poll
    /// saw it running.
    async fn retried_after_failure() -> (Arc<MockBackend>, DocumentRegistry) {
        let mut doc = document("d1", "a.pdf", DocumentStatus::Processing);
        doc.can_process = true;
        let (backend, registry) = registry_with(vec![doc]);
        registry.refresh().await.unwrap();

        backend.edit(|s| {
            s.documents[0].status = DocumentStatus::Failed;
            s.documents[0].error_message = Some("parser crashed".to_string());
        });
        registry.refresh().await.unwrap();
        assert_eq!(registry.take_notices().await.len(), 1);

        registry.start_processing("d1").await.unwrap();
        (backend, registry)
    }

    #[tokio::test]
    async fn test_retry_failing_again_with_new_error_is_reported() {
        let (backend, registry) = retried_after_failure().await;

        backend.edit(|s| s.documents[0].error_message = Some("second failure".to_string()));
        for _ in 0..5 {
            registry.refresh().await.unwrap();
        }

        assert!(registry.awaiting_ids().await.is_empty());
        assert_eq!(
            registry.take_notices().await,
            vec![Notice::processing_failed("d1", "a.pdf", Some("second failure"))]
        );
    }

    #[tokio::test]
    async fn test_retry_failing_again_with_same_error_is_reported() {
        let (backend, registry) = retried_after_failure().await;

        // New task, same message: only the task list shows the retry ended
        registry.refresh().await.unwrap();
        assert!(registry.awaiting_ids().await.contains("d1"));
        let running = backend.read(|s| s.tasks.clone());
        registry.observe_tasks(&running).await;
        assert!(registry.awaiting_ids().await.contains("d1"));

        backend.edit(|s| s.tasks[0].status = TaskStatus::Failed);
        let finished = backend.read(|s| s.tasks.clone());
        registry.observe_tasks(&finished).await;
        registry.refresh().await.unwrap();

        assert!(registry.awaiting_ids().await.is_empty());
        assert_eq!(
            registry.take_notices().await,
            vec![Notice::processing_failed("d1", "a.pdf", Some("parser crashed"))]
        );
    }

    #[tokio::test]
    async fn test_finished_task_seen_before_document_links_it() {
        let (backend, registry) = retried_after_failure().await;

        // Task list already shows the new task done; the document record
        // only links it on the next poll
        backend.edit(|s| s.tasks[0].status = TaskStatus::Completed);
        let finished = backend.read(|s| s.tasks.clone());
        backend.edit(|s| s.documents[0].task_id = None);
        registry.refresh().await.unwrap();
        registry.observe_tasks(&finished).await;
        assert!(registry.awaiting_ids().await.contains("d1"));

        backend.edit(|s| s.documents[0].task_id = Some("task-d1".to_string()));
        registry.refresh().await.unwrap();
        assert!(registry.awaiting_ids().await.is_empty());
        assert!(registry.take_notices().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_snapshot_does_not_overwrite_newer_one() {
        let (backend, registry) = registry_with(vec![]);
        backend.edit(|s| s.poll_delays.push_back(Duration::from_millis(200)));

        let slow = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.refresh().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        backend.edit(|s| s.documents.push(document("d1", "a.pdf", DocumentStatus::Uploaded)));
        assert_eq!(registry.refresh().await.unwrap(), 1);

        assert_eq!(slow.await.unwrap().unwrap(), 1);
        assert_eq!(registry.documents().await.len(), 1);
        assert_eq!(registry.get("d1").await.unwrap().file_name, "a.pdf");
    }

    #[tokio::test]
    async fn test_failure_notice_emitted_once_with_backend_message() {
        let (backend, registry) =
            registry_with(vec![document("d1", "a.pdf", DocumentStatus::Processing)]);
        registry.refresh().await.unwrap();
        assert!(registry.take_notices().await.is_empty());

        backend.edit(|s| {
            s.documents[0].status = DocumentStatus::Failed;
            s.documents[0].error_message = Some("unsupported encoding".to_string());
        });
        registry.refresh().await.unwrap();
        registry.refresh().await.unwrap();

        let notices = registry.take_notices().await;
        assert_eq!(
            notices,
            vec![Notice::processing_failed("d1", "a.pdf", Some("unsupported encoding"))]
        );
        assert!(registry.take_notices().await.is_empty());
    }

    #[tokio::test]
    async fn test_start_processing_refused_locally() {
        let (backend, registry) =
            registry_with(vec![document("d1", "a.pdf", DocumentStatus::Processing)]);
        registry.refresh().await.unwrap();
        let calls = backend.calls();

        assert!(matches!(
            registry.start_processing("d1").await,
            Err(Error::NotProcessable(_))
        ));
        assert!(matches!(
            registry.start_processing("nope").await,
            Err(Error::UnknownDocument(_))
        ));
        assert_eq!(backend.calls(), calls);
        assert!(registry.awaiting_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_start_clears_indicator() {
        let (backend, registry) =
            registry_with(vec![document("d1", "a.pdf", DocumentStatus::Uploaded)]);
        registry.refresh().await.unwrap();
        backend.edit(|s| s.reject_processing = true);

        assert!(registry.start_processing("d1").await.is_err());
        assert!(registry.awaiting_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_delete_leaves_registry() {
        let (backend, registry) =
            registry_with(vec![document("d1", "a.pdf", DocumentStatus::Uploaded)]);
        registry.refresh().await.unwrap();
        backend.edit(|s| s.reject_destructive = true);

        assert!(registry.delete(&["d1".to_string()]).await.is_err());
        assert!(registry.clear().await.is_err());
        assert_eq!(registry.documents().await.len(), 1);
    }
}
