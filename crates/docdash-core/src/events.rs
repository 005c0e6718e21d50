//! Change notifications for the embedding page.

use tokio::sync::mpsc;

use crate::logs::ConnectionState;
use crate::notice::Notice;
use crate::upload::UploadSummary;

/// Something changed; re-render.
#[derive(Debug, Clone)]
pub enum DashboardEvent {
    DocumentsRefreshed,
    TasksRefreshed,
    PendingChanged,
    UploadFinished(UploadSummary),
    /// Backend accepted a start request; the row shows as starting
    ProcessingRequested { document_id: String },
    LogAppended,
    LogsCleared,
    ConnectionChanged(ConnectionState),
    Notice(Notice),
}

/// Non-blocking sender side of the event channel.
///
/// A full or closed channel drops the event: the page re-renders from a
/// fresh snapshot anyway, so a lost tick only delays it.
#[derive(Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<DashboardEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<DashboardEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: DashboardEvent) {
        if let Some(tx) = &self.tx {
            if let Err(e) = tx.try_send(event) {
                tracing::trace!(error = %e, "Dropped dashboard event");
            }
        }
    }
}
