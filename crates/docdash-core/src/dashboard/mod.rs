//! The mounted dashboard.
//!
//! Mounting wires every coordinator to one backend and spawns three
//! independent loops: the document poll, the task poll and the log stream.
//! All of them hang off a single cancellation token, so [`Dashboard::unmount`]
//! (or dropping the dashboard) stops both timers and closes the stream with
//! a normal close code.


use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::backend::{Backend, HttpBackend};
use crate::config::Config;
use crate::error::Result;
use crate::events::{DashboardEvent, EventSink};
use crate::guard::{Confirm, DestructiveActionGuard, GuardOutcome};
use crate::logs::{LogStreamManager, LogTransport, WebSocketTransport};
use crate::notice::Notice;
use crate::pending::{PendingBuffer, PendingFile};
use crate::registry::DocumentRegistry;
use crate::tasks::TaskTracker;
use crate::upload::{UploadCoordinator, UploadProgress, UploadSummary};
use crate::view::{self, DashboardSnapshot, RenderModel};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// State scoped to one mounted view. Nothing survives a remount.
pub struct Dashboard {
    pending: PendingBuffer,
    registry: DocumentRegistry,
    tasks: TaskTracker,
    uploader: UploadCoordinator,
    guard: DestructiveActionGuard,
    logs: LogStreamManager,
    events: EventSink,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Dashboard {
    /// Mount against the HTTP backend and WebSocket log stream at `config.base_url`.
    pub fn connect(
        config: Config,
        confirm: Arc<dyn Confirm>,
    ) -> Result<(Self, mpsc::Receiver<DashboardEvent>)> {
        let config = config.sanitized();
        let backend = Arc::new(HttpBackend::new(&config)?);
        let transport = Arc::new(WebSocketTransport::new(&config.base_url)?);
        Ok(Self::mount(config, backend, transport, confirm))
    }

    /// Wire the coordinators and start the poll loops and log stream.
    ///
    /// Must be called from within a Tokio runtime. The receiver yields a
    /// [`DashboardEvent`] whenever something worth re-rendering happened.
    pub fn mount(
        config: Config,
        backend: Arc<dyn Backend>,
        transport: Arc<dyn LogTransport>,
        confirm: Arc<dyn Confirm>,
    ) -> (Self, mpsc::Receiver<DashboardEvent>) {
        let config = config.sanitized();
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let events = EventSink::new(tx);

        let registry = DocumentRegistry::new(backend.clone());
        let tasks = TaskTracker::new(backend.clone());
        let uploader = UploadCoordinator::new(backend.clone(), registry.clone());
        let guard = DestructiveActionGuard::new(registry.clone(), confirm);
        let logs = LogStreamManager::new(transport, &config, events.clone());

        let mut dashboard = Self {
            pending: PendingBuffer::new(),
            registry,
            tasks,
            uploader,
            guard,
            logs,
            events,
            cancel: CancellationToken::new(),
            handles: Vec::new(),
        };
        dashboard.spawn_loops(&config);

        tracing::info!(
            backend = backend.backend_name(),
            base_url = %config.base_url,
            "Dashboard mounted"
        );
        (dashboard, rx)
    }

    fn spawn_loops(&mut self, config: &Config) {
        let registry = self.registry.clone();
        let events = self.events.clone();
        self.handles.push(tokio::spawn(poll_every(
            "documents",
            config.document_poll_interval,
            self.cancel.child_token(),
            move || {
                let registry = registry.clone();
                let events = events.clone();
                async move {
                    if registry.refresh().await.is_ok() {
                        events.emit(DashboardEvent::DocumentsRefreshed);
                    }
                    for notice in registry.take_notices().await {
                        events.emit(DashboardEvent::Notice(notice));
                    }
                }
            },
        )));

        let tasks = self.tasks.clone();
        let registry = self.registry.clone();
        let events = self.events.clone();
        self.handles.push(tokio::spawn(poll_every(
            "tasks",
            config.task_poll_interval,
            self.cancel.child_token(),
            move || {
                let tasks = tasks.clone();
                let registry = registry.clone();
                let events = events.clone();
                async move {
                    if tasks.refresh().await.is_ok() {
                        registry.observe_tasks(&tasks.tasks().await).await;
                        events.emit(DashboardEvent::TasksRefreshed);
                    }
                    for notice in registry.take_notices().await {
                        events.emit(DashboardEvent::Notice(notice));
                    }
                }
            },
        )));

        self.handles.push(self.logs.spawn(self.cancel.child_token()));
    }

    /// Queue files for upload; returns how many were new.
    pub async fn add_files(&self, files: impl IntoIterator<Item = PendingFile>) -> usize {
        let added = self.pending.add_files(files).await;
        if added > 0 {
            self.events.emit(DashboardEvent::PendingChanged);
        }
        added
    }

    pub async fn remove_pending(&self, index: usize) -> Option<PendingFile> {
        let removed = self.pending.remove(index).await;
        if removed.is_some() {
            self.events.emit(DashboardEvent::PendingChanged);
        }
        removed
    }

    pub async fn clear_pending(&self) {
        self.pending.clear().await;
        self.events.emit(DashboardEvent::PendingChanged);
    }

    pub fn pending(&self) -> &PendingBuffer {
        &self.pending
    }

    /// Upload everything currently pending, one file at a time.
    pub async fn confirm_upload(&self) -> UploadSummary {
        let summary = self.uploader.confirm_upload(&self.pending).await;
        if summary.attempted() > 0 {
            self.events.emit(DashboardEvent::PendingChanged);
            self.events.emit(DashboardEvent::DocumentsRefreshed);
            self.events.emit(DashboardEvent::UploadFinished(summary.clone()));
        }
        summary
    }

    pub async fn upload_progress(&self) -> UploadProgress {
        self.uploader.progress().await
    }

    /// Request processing (or a retry) for one document.
    pub async fn start_processing(&self, document_id: &str) -> std::result::Result<(), Notice> {
        self.registry
            .start_processing(document_id)
            .await
            .map_err(|e| Notice::start_processing_failed(document_id, e))?;
        self.events.emit(DashboardEvent::ProcessingRequested {
            document_id: document_id.to_string(),
        });
        Ok(())
    }

    /// Delete documents, after the user confirms.
    pub async fn delete(&self, document_ids: &[String]) -> std::result::Result<GuardOutcome, Notice> {
        let outcome = self.guard.delete(document_ids).await?;
        if outcome == GuardOutcome::Done {
            self.events.emit(DashboardEvent::DocumentsRefreshed);
        }
        Ok(outcome)
    }

    /// Remove every document, after the user confirms.
    pub async fn clear(&self) -> std::result::Result<GuardOutcome, Notice> {
        let outcome = self.guard.clear().await?;
        if outcome == GuardOutcome::Done {
            self.events.emit(DashboardEvent::DocumentsRefreshed);
        }
        Ok(outcome)
    }

    pub async fn clear_logs(&self) {
        self.logs.clear().await;
    }

    /// Refresh documents and tasks now instead of waiting for the next tick.
    pub async fn refresh(&self) -> Result<()> {
        let (documents, tasks) = tokio::join!(self.registry.refresh(), self.tasks.refresh());
        if tasks.is_ok() {
            self.registry.observe_tasks(&self.tasks.tasks().await).await;
        }
        for notice in self.registry.take_notices().await {
            self.events.emit(DashboardEvent::Notice(notice));
        }
        documents?;
        tasks?;
        self.events.emit(DashboardEvent::DocumentsRefreshed);
        self.events.emit(DashboardEvent::TasksRefreshed);
        Ok(())
    }

    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    pub fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    pub fn logs(&self) -> &LogStreamManager {
        &self.logs
    }

    pub async fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            documents: self.registry.documents().await,
            tasks: self.tasks.tasks().await,
            awaiting: self.registry.awaiting_ids().await,
            logs: self.logs.entries().await,
            connection: self.logs.state().await,
            pending: self.pending.snapshot().await,
        }
    }

    pub async fn render(&self) -> RenderModel {
        view::reconcile(&self.snapshot().await)
    }

    /// Stop the poll loops, close the log stream and wait for all of it.
    pub async fn unmount(mut self) {
        self.cancel.cancel();
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Dashboard task ended abnormally");
            }
        }
        tracing::info!("Dashboard unmounted");
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Run `tick` immediately and then every `period` until cancelled.
///
/// An in-flight tick is abandoned on cancellation. Slow ticks push the
/// schedule back rather than bursting to catch up.
async fn poll_every<F, Fut>(
    what: &'static str,
    period: Duration,
    cancel: CancellationToken,
    mut tick: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tick() => {}
        }
    }

    tracing::debug!(what, "Poll loop stopped");
}
