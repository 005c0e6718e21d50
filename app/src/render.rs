//! Plain-text rendering of the dashboard render model.

use std::fmt::Write;

use docdash_core::view::{progress_bar, DocumentRow, RowDisplay};
use docdash_core::RenderModel;

const PROGRESS_WIDTH: usize = 20;

/// Render the model as a text table, followed by the pending queue and the
/// last `log_lines` log lines.
pub fn render_text(model: &RenderModel, log_lines: usize) -> String {
    let mut out = String::new();
    let summary = &model.summary;

    let _ = writeln!(
        out,
        "Documents ({}): {} uploaded, {} processing, {} completed, {} failed  [{}]",
        summary.total,
        summary.uploaded,
        summary.processing,
        summary.completed,
        summary.failed,
        model.connection
    );
    for row in &model.rows {
        let _ = writeln!(out, "  {}", format_row(row));
    }

    if !model.pending.is_empty() {
        let _ = writeln!(
            out,
            "Pending ({}, {})",
            summary.queued_files,
            docdash_core::view::format_file_size(summary.queued_bytes)
        );
        for file in &model.pending {
            let _ = writeln!(out, "  {:<32} {:>10}", file.name, file.size_label);
        }
    }

    if log_lines > 0 && !model.logs.is_empty() {
        let _ = writeln!(out, "Logs");
        let skip = model.logs.len().saturating_sub(log_lines);
        for line in &model.logs[skip..] {
            let _ = writeln!(out, "  {} {}", line.time_label, line.message);
        }
    }

    out
}

fn format_row(row: &DocumentRow) -> String {
    format!(
        "{:<14} {:<32} {:>10}  {:<10} {}",
        row.document_id,
        row.file_name,
        row.size_label,
        row.display.label(),
        detail(&row.display)
    )
    .trim_end()
    .to_string()
}

fn detail(display: &RowDisplay) -> String {
    match display {
        RowDisplay::Live {
            progress,
            progress_label,
            stage,
            multimodal,
            ..
        } => {
            let mut text = format!("{} {}", progress_bar(*progress, PROGRESS_WIDTH), progress_label);
            if let Some(stage) = stage {
                let _ = write!(text, " {}", stage);
            }
            if let Some(mm) = multimodal {
                let _ = write!(text, " (multimodal {}/{}", mm.stats.processed(), mm.stats.total());
                if let Some(rate) = &mm.success_rate_label {
                    let _ = write!(text, ", {}", rate);
                }
                text.push(')');
            }
            text
        }
        RowDisplay::Starting => "processing requested".to_string(),
        RowDisplay::Persisted {
            error: Some(error), ..
        } => error.clone(),
        RowDisplay::Persisted {
            chunks_count,
            content_length,
            ..
        } => match (chunks_count, content_length) {
            (Some(chunks), Some(chars)) => format!("{} chunks, {} chars", chunks, chars),
            (Some(chunks), None) => format!("{} chunks", chunks),
            _ => String::new(),
        },
    }
}
