//! In-memory backend and transport fakes shared by the unit tests.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::logs::{CloseCode, Frame, LogConnection, LogTransport};
use crate::models::{Document, DocumentStatus, MultimodalStats, Task, TaskStatus};
use crate::pending::PendingFile;

pub fn document(id: &str, name: &str, status: DocumentStatus) -> Document {
    Document {
        document_id: id.to_string(),
        file_name: name.to_string(),
        file_size: 1000,
        uploaded_at: Some(Utc::now()),
        status,
        task_id: None,
        can_process: matches!(status, DocumentStatus::Uploaded | DocumentStatus::Failed),
        chunks_count: None,
        content_length: None,
        error_message: None,
    }
}

pub fn task(id: &str, name: &str, status: TaskStatus, progress: f32) -> Task {
    Task {
        task_id: id.to_string(),
        file_name: name.to_string(),
        status,
        progress,
        stage: Some("parsing".to_string()),
        multimodal_stats: MultimodalStats::default(),
    }
}

#[derive(Default)]
pub struct MockState {
    pub documents: Vec<Document>,
    pub tasks: Vec<Task>,
    /// File names whose upload fails
    pub failing_uploads: HashSet<String>,
    pub fail_polls: bool,
    /// Per-call delays for `documents()`; the snapshot is taken before waiting
    pub poll_delays: VecDeque<Duration>,
    pub reject_destructive: bool,
    pub reject_processing: bool,
    /// File names in the order their upload was attempted
    pub upload_order: Vec<String>,
    next_id: usize,
}

/// Backend that keeps documents and tasks in memory and counts every call.
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
    calls: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn edit(&self, f: impl FnOnce(&mut MockState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn read<T>(&self, f: impl FnOnce(&MockState) -> T) -> T {
        f(&self.state.lock().unwrap())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn upload(&self, file: &PendingFile) -> Result<String> {
        self.record();
        let mut state = self.state.lock().unwrap();
        state.upload_order.push(file.name.clone());

        if state.failing_uploads.contains(&file.name) {
            return Err(Error::Rejected("upload refused".to_string()));
        }

        state.next_id += 1;
        let id = format!("doc-{}", state.next_id);
        let mut doc = document(&id, &file.name, DocumentStatus::Uploaded);
        doc.file_size = file.size;
        state.documents.push(doc);
        Ok(id)
    }

    async fn documents(&self) -> Result<Vec<Document>> {
        self.record();
        let (documents, delay) = {
            let mut state = self.state.lock().unwrap();
            if state.fail_polls {
                return Err(Error::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            (state.documents.clone(), state.poll_delays.pop_front())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(documents)
    }

    async fn start_processing(&self, document_id: &str) -> Result<()> {
        self.record();
        let mut state = self.state.lock().unwrap();
        if state.reject_processing {
            return Err(Error::Rejected("queue full".to_string()));
        }

        let task_id = format!("task-{}", document_id);
        let file_name = match state
            .documents
            .iter_mut()
            .find(|d| d.document_id == document_id)
        {
            Some(doc) => {
                // Status stays stale until the worker picks the job up
                doc.task_id = Some(task_id.clone());
                doc.can_process = false;
                doc.file_name.clone()
            }
            None => {
                return Err(Error::Status {
                    status: 404,
                    body: "not found".to_string(),
                })
            }
        };
        state
            .tasks
            .push(task(&task_id, &file_name, TaskStatus::Running, 40.0));
        Ok(())
    }

    async fn delete_documents(&self, document_ids: &[String]) -> Result<()> {
        self.record();
        let mut state = self.state.lock().unwrap();
        if state.reject_destructive {
            return Err(Error::Rejected("documents are locked".to_string()));
        }
        state
            .documents
            .retain(|d| !document_ids.contains(&d.document_id));
        Ok(())
    }

    async fn clear_documents(&self) -> Result<()> {
        self.record();
        let mut state = self.state.lock().unwrap();
        if state.reject_destructive {
            return Err(Error::Rejected("documents are locked".to_string()));
        }
        state.documents.clear();
        state.tasks.clear();
        Ok(())
    }

    async fn tasks(&self) -> Result<Vec<Task>> {
        self.record();
        let state = self.state.lock().unwrap();
        if state.fail_polls {
            return Err(Error::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(state.tasks.clone())
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}

/// What one scripted connection does.
pub enum Script {
    /// Deliver frames, then close with the code or stay open forever.
    Frames {
        frames: Vec<String>,
        then: Option<CloseCode>,
    },
    Refuse,
}

impl Script {
    pub fn frames_then_close(frames: Vec<String>, code: CloseCode) -> Self {
        Script::Frames {
            frames,
            then: Some(code),
        }
    }

    pub fn idle() -> Self {
        Script::Frames {
            frames: Vec::new(),
            then: None,
        }
    }
}

/// Transport that replays scripts in order; idle once they run out.
pub struct MockTransport {
    scripts: Mutex<VecDeque<Script>>,
    refuse_all: bool,
    connects: AtomicU32,
    closed: Arc<Mutex<Vec<CloseCode>>>,
}

impl MockTransport {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            refuse_all: false,
            connects: AtomicU32::new(0),
            closed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn refusing() -> Self {
        Self {
            refuse_all: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Codes we closed connections with, in order.
    pub fn closed_with(&self) -> Vec<CloseCode> {
        self.closed.lock().unwrap().clone()
    }
}

#[async_trait]
impl LogTransport for MockTransport {
    async fn connect(&self) -> Result<Box<dyn LogConnection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse_all {
            return Err(Error::Stream("connection refused".to_string()));
        }

        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(Script::idle);

        match script {
            Script::Refuse => Err(Error::Stream("connection refused".to_string())),
            Script::Frames { frames, then } => Ok(Box::new(MockConnection {
                frames: frames.into(),
                then,
                closed: self.closed.clone(),
            })),
        }
    }
}

struct MockConnection {
    frames: VecDeque<String>,
    then: Option<CloseCode>,
    closed: Arc<Mutex<Vec<CloseCode>>>,
}

#[async_trait]
impl LogConnection for MockConnection {
    async fn next_frame(&mut self) -> Frame {
        if let Some(raw) = self.frames.pop_front() {
            return Frame::Text(raw);
        }
        match self.then.take() {
            Some(code) => Frame::Close(code),
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self, code: CloseCode) {
        self.closed.lock().unwrap().push(code);
    }
}
