//! Task tracking for in-flight processing jobs.
//!
//! Holds the latest task snapshot only. Tasks know nothing about documents;
//! the view joins the two by task id. A terminal task never changes a
//! document's status here: the document registry's next refresh does that.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::backend::Backend;
use crate::error::Result;
use crate::models::Task;

#[derive(Default)]
struct TrackerState {
    tasks: Vec<Task>,
    last_refreshed: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Polled view of backend tasks.
#[derive(Clone)]
pub struct TaskTracker {
    backend: Arc<dyn Backend>,
    state: Arc<RwLock<TrackerState>>,
}

impl TaskTracker {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            state: Arc::new(RwLock::new(TrackerState::default())),
        }
    }

    /// Replace the task set with a fresh snapshot; keeps the old one on failure.
    pub async fn refresh(&self) -> Result<usize> {
        match self.backend.tasks().await {
            Ok(tasks) => {
                let count = tasks.len();
                let mut state = self.state.write().await;
                state.tasks = tasks;
                state.last_refreshed = Some(Utc::now());
                state.last_error = None;
                tracing::debug!(count, "Tasks refreshed");
                Ok(count)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Task refresh failed, keeping previous snapshot");
                self.state.write().await.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub async fn tasks(&self) -> Vec<Task> {
        self.state.read().await.tasks.clone()
    }

    pub async fn get(&self, task_id: &str) -> Option<Task> {
        self.state
            .read()
            .await
            .tasks
            .iter()
            .find(|t| t.task_id == task_id)
            .cloned()
    }

    /// Tasks that are still pending or running.
    pub async fn get_all_active(&self) -> Vec<Task> {
        self.state
            .read()
            .await
            .tasks
            .iter()
            .filter(|t| !t.status.is_terminal())
            .cloned()
            .collect()
    }

    pub async fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.last_refreshed
    }

    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.last_error.clone()
    }
}
