//! One-shot subcommands.
//!
//! These drive the coordinators directly instead of mounting the full
//! dashboard, so no poll loop or log stream is started.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use docdash_core::guard::DestructiveActionGuard;
use docdash_core::pending::PendingBuffer;
use docdash_core::registry::DocumentRegistry;
use docdash_core::tasks::TaskTracker;
use docdash_core::upload::UploadCoordinator;
use docdash_core::view::{self, DashboardSnapshot};
use docdash_core::{Backend, ConnectionState, GuardOutcome, HttpBackend, PendingFile, UploadStatus};

use crate::render::render_text;
use crate::Context;

fn connect(ctx: &Context) -> anyhow::Result<Arc<dyn Backend>> {
    let backend = HttpBackend::new(&ctx.config)
        .with_context(|| format!("Cannot use backend at {}", ctx.config.base_url))?;
    Ok(Arc::new(backend))
}

/// Print the current documents and tasks once.
pub async fn list(ctx: Context) -> anyhow::Result<()> {
    let backend = connect(&ctx)?;
    let registry = DocumentRegistry::new(backend.clone());
    let tasks = TaskTracker::new(backend);

    registry.refresh().await.context("Failed to fetch documents")?;
    tasks.refresh().await.context("Failed to fetch tasks")?;

    let snapshot = DashboardSnapshot {
        documents: registry.documents().await,
        tasks: tasks.tasks().await,
        awaiting: Default::default(),
        logs: Vec::new(),
        connection: ConnectionState::Disconnected,
        pending: Vec::new(),
    };
    print!("{}", render_text(&view::reconcile(&snapshot), 0));
    Ok(())
}

/// Upload files sequentially and report each outcome.
pub async fn upload(ctx: Context, paths: Vec<PathBuf>) -> anyhow::Result<()> {
    let backend = connect(&ctx)?;
    let registry = DocumentRegistry::new(backend.clone());
    let uploader = UploadCoordinator::new(backend, registry);

    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        match PendingFile::from_path(path).await {
            Ok(file) => files.push(file),
            Err(e) => tracing::warn!(error = %e, "Skipping file"),
        }
    }

    let pending = PendingBuffer::new();
    let selected = files.len();
    let added = pending.add_files(files).await;
    if added < selected {
        tracing::info!(skipped = selected - added, "Skipped duplicate files");
    }
    if added == 0 {
        anyhow::bail!("Nothing to upload");
    }

    let summary = uploader.confirm_upload(&pending).await;
    for outcome in &summary.outcomes {
        match &outcome.status {
            UploadStatus::Uploaded { document_id } => {
                println!("uploaded  {}  {}", outcome.file_name, document_id)
            }
            UploadStatus::Failed { error } => {
                println!("failed    {}  {}", outcome.file_name, error)
            }
        }
    }
    println!(
        "{} uploaded, {} failed",
        summary.success_count, summary.fail_count
    );

    if summary.fail_count > 0 {
        anyhow::bail!(
            "{} of {} uploads failed",
            summary.fail_count,
            summary.attempted()
        );
    }
    Ok(())
}

/// Start or retry processing of one document.
pub async fn process(ctx: Context, document_id: String) -> anyhow::Result<()> {
    let registry = DocumentRegistry::new(connect(&ctx)?);
    registry.refresh().await.context("Failed to fetch documents")?;
    registry
        .start_processing(&document_id)
        .await
        .with_context(|| format!("Failed to start processing {}", document_id))?;
    println!("Processing requested for {}", document_id);
    Ok(())
}

/// Delete documents after confirmation.
pub async fn delete(ctx: Context, document_ids: Vec<String>) -> anyhow::Result<()> {
    let registry = DocumentRegistry::new(connect(&ctx)?);
    registry.refresh().await.context("Failed to fetch documents")?;

    let guard = DestructiveActionGuard::new(registry, ctx.confirm.clone());
    report(guard.delete(&document_ids).await?);
    Ok(())
}

/// Remove every document after confirmation.
pub async fn clear(ctx: Context) -> anyhow::Result<()> {
    let registry = DocumentRegistry::new(connect(&ctx)?);
    registry.refresh().await.context("Failed to fetch documents")?;

    let guard = DestructiveActionGuard::new(registry, ctx.confirm.clone());
    report(guard.clear().await?);
    Ok(())
}

fn report(outcome: GuardOutcome) {
    match outcome {
        GuardOutcome::Done => println!("Done"),
        GuardOutcome::Declined => println!("Cancelled"),
    }
}
