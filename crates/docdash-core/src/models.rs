//! Records mirrored from the processing backend.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Upload requested, not yet acknowledged by the backend.
    Pending,
    Uploaded,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    /// No further automatic transition leaves this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, DocumentStatus::Completed | DocumentStatus::Failed)
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentStatus::Pending => write!(f, "pending"),
            DocumentStatus::Uploaded => write!(f, "uploaded"),
            DocumentStatus::Processing => write!(f, "processing"),
            DocumentStatus::Completed => write!(f, "completed"),
            DocumentStatus::Failed => write!(f, "failed"),
        }
    }
}

/// The backend's record of an uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(alias = "id")]
    pub document_id: String,
    pub file_name: String,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub uploaded_at: Option<DateTime<Utc>>,
    pub status: DocumentStatus,
    /// Set once processing has started
    #[serde(default)]
    pub task_id: Option<String>,
    /// Whether the backend accepts a "start processing" request right now
    #[serde(default)]
    pub can_process: bool,
    #[serde(default)]
    pub chunks_count: Option<u64>,
    #[serde(default)]
    pub content_length: Option<u64>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Lifecycle of a backend processing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Images, tables and equations discovered vs. processed by a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultimodalStats {
    pub images_count: u32,
    pub images_processed: u32,
    pub tables_count: u32,
    pub tables_processed: u32,
    pub equations_count: u32,
    pub equations_processed: u32,
}

impl MultimodalStats {
    pub fn total(&self) -> u32 {
        self.images_count + self.tables_count + self.equations_count
    }

    pub fn processed(&self) -> u32 {
        self.images_processed + self.tables_processed + self.equations_processed
    }

    /// Processed share of discovered items as a percentage, `None` when
    /// nothing has been discovered yet.
    pub fn success_rate(&self) -> Option<f32> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        Some((self.processed() as f32 / total as f32 * 100.0).min(100.0))
    }
}

/// One in-flight processing job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    #[serde(default)]
    pub file_name: String,
    pub status: TaskStatus,
    /// Overall progress, 0-100
    #[serde(default)]
    pub progress: f32,
    /// Current stage label (e.g. "parsing", "multimodal", "indexing")
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub multimodal_stats: MultimodalStats,
}

impl Task {
    pub fn progress_percent(&self) -> f32 {
        if self.progress.is_finite() {
            self.progress.clamp(0.0, 100.0)
        } else {
            0.0
        }
    }
}

/// A log line pushed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEvent {
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Content hash over the message and a coarse timestamp bucket
    pub hash: String,
}

impl LogEvent {
    pub fn new(message: impl Into<String>, timestamp: DateTime<Utc>, window: Duration) -> Self {
        let message = message.into();
        let hash = dedup_hash(&message, timestamp, window);
        Self {
            message,
            timestamp,
            hash,
        }
    }
}

/// Two lines with equal text whose timestamps fall in the same window share a hash.
pub fn dedup_hash(message: &str, timestamp: DateTime<Utc>, window: Duration) -> String {
    let window_ms = (window.as_millis() as i64).max(1);
    let bucket = timestamp.timestamp_millis().div_euclid(window_ms);

    let mut hasher = blake3::Hasher::new();
    hasher.update(message.as_bytes());
    hasher.update(&bucket.to_le_bytes());
    hasher.finalize().to_hex().to_string()
}
