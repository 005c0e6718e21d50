//! Render model for the dashboard.
//!
//! [`reconcile`] joins the three independently refreshed sources (documents,
//! tasks, log lines) into what the page shows. It holds no state and is
//! recomputed on every tick or push event, so neither source ever has to
//! patch another.

use std::collections::{HashMap, HashSet};
use std::fmt::Display;

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::Serialize;

use crate::logs::ConnectionState;
use crate::models::{Document, DocumentStatus, LogEvent, MultimodalStats, Task, TaskStatus};
use crate::pending::PendingFile;

/// Everything the reconciler reads, captured at one instant.
#[derive(Debug, Clone)]
pub struct DashboardSnapshot {
    pub documents: Vec<Document>,
    pub tasks: Vec<Task>,
    /// Documents with an unconfirmed "start processing" request
    pub awaiting: HashSet<String>,
    pub logs: Vec<LogEvent>,
    pub connection: ConnectionState,
    pub pending: Vec<PendingFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderModel {
    pub rows: Vec<DocumentRow>,
    pub pending: Vec<PendingRow>,
    pub logs: Vec<LogLine>,
    pub connection: ConnectionState,
    pub summary: Summary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentRow {
    pub document_id: String,
    pub file_name: String,
    pub size_label: String,
    pub uploaded_label: Option<String>,
    pub can_process: bool,
    pub display: RowDisplay,
}

/// What a document row shows, in order of precedence.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowDisplay {
    /// The linked task is still running: show its live progress.
    Live {
        task_id: String,
        status: TaskStatus,
        progress: f32,
        progress_label: String,
        stage: Option<String>,
        multimodal: Option<MultimodalView>,
    },
    /// Processing was requested and the backend has not caught up yet.
    Starting,
    /// The document's own persisted state.
    Persisted {
        status: DocumentStatus,
        chunks_count: Option<u64>,
        content_length: Option<u64>,
        /// Backend error text, verbatim
        error: Option<String>,
    },
}

impl RowDisplay {
    /// Short status tag for the row.
    pub fn label(&self) -> String {
        match self {
            RowDisplay::Live { status, .. } => status.to_string(),
            RowDisplay::Starting => "starting".to_string(),
            RowDisplay::Persisted { status, .. } => status.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultimodalView {
    pub stats: MultimodalStats,
    /// e.g. "83.3%"
    pub success_rate_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingRow {
    pub name: String,
    pub size_label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogLine {
    pub time_label: String,
    pub message: String,
}

/// Row counts by what is displayed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub uploaded: usize,
    /// Live rows plus rows waiting for processing to start
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub queued_files: usize,
    pub queued_bytes: u64,
}

/// Build the render model using the local time zone for labels.
pub fn reconcile(snapshot: &DashboardSnapshot) -> RenderModel {
    reconcile_in(snapshot, &Local)
}

/// Build the render model, formatting times in `tz`.
pub fn reconcile_in<Tz>(snapshot: &DashboardSnapshot, tz: &Tz) -> RenderModel
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let tasks: HashMap<&str, &Task> = snapshot
        .tasks
        .iter()
        .map(|t| (t.task_id.as_str(), t))
        .collect();

    let mut summary = Summary {
        total: snapshot.documents.len(),
        queued_files: snapshot.pending.len(),
        queued_bytes: snapshot.pending.iter().map(|f| f.size).sum(),
        ..Default::default()
    };

    let rows: Vec<DocumentRow> = snapshot
        .documents
        .iter()
        .map(|doc| {
            let live = doc
                .task_id
                .as_deref()
                .and_then(|id| tasks.get(id))
                .filter(|task| !task.status.is_terminal());

            let display = match live {
                Some(task) => live_display(task),
                None if snapshot.awaiting.contains(&doc.document_id) => RowDisplay::Starting,
                None => RowDisplay::Persisted {
                    status: doc.status,
                    chunks_count: doc.chunks_count,
                    content_length: doc.content_length,
                    error: doc.error_message.clone(),
                },
            };

            match &display {
                RowDisplay::Live { .. } | RowDisplay::Starting => summary.processing += 1,
                RowDisplay::Persisted { status, .. } => match status {
                    DocumentStatus::Pending | DocumentStatus::Uploaded => summary.uploaded += 1,
                    DocumentStatus::Processing => summary.processing += 1,
                    DocumentStatus::Completed => summary.completed += 1,
                    DocumentStatus::Failed => summary.failed += 1,
                },
            }

            DocumentRow {
                document_id: doc.document_id.clone(),
                file_name: doc.file_name.clone(),
                size_label: format_file_size(doc.file_size),
                uploaded_label: doc.uploaded_at.map(|ts| format_timestamp_in(ts, tz)),
                can_process: doc.can_process,
                display,
            }
        })
        .collect();

    let pending = snapshot
        .pending
        .iter()
        .map(|f| PendingRow {
            name: f.name.clone(),
            size_label: format_file_size(f.size),
        })
        .collect();

    let logs = snapshot
        .logs
        .iter()
        .map(|event| LogLine {
            time_label: event
                .timestamp
                .with_timezone(tz)
                .format("%H:%M:%S")
                .to_string(),
            message: event.message.clone(),
        })
        .collect();

    RenderModel {
        rows,
        pending,
        logs,
        connection: snapshot.connection,
        summary,
    }
}

fn live_display(task: &Task) -> RowDisplay {
    let progress = task.progress_percent();
    let stats = task.multimodal_stats;
    let multimodal = (stats.total() > 0).then(|| MultimodalView {
        stats,
        success_rate_label: stats.success_rate().map(|rate| format!("{:.1}%", rate)),
    });

    RowDisplay::Live {
        task_id: task.task_id.clone(),
        status: task.status,
        progress,
        progress_label: format!("{:.0}%", progress),
        stage: task.stage.clone(),
        multimodal,
    }
}

/// Human-readable byte size, 1024-based.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    format_timestamp_in(ts, &Local)
}

pub fn format_timestamp_in<Tz>(ts: DateTime<Utc>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    ts.with_timezone(tz).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Fixed-width text progress bar, e.g. `[####------]`.
pub fn progress_bar(percent: f32, width: usize) -> String {
    let percent = if percent.is_finite() {
        percent.clamp(0.0, 100.0)
    } else {
        0.0
    };
    let filled = ((percent / 100.0) * width as f32).round() as usize;
    let filled = filled.min(width);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}
