//! Docdash Core - Document and task coordination for the ingestion dashboard
//!
//! This crate contains everything the dashboard does between the user and the
//! processing backend:
//! - Pending file buffer with duplicate suppression
//! - Sequential upload batches with per-file outcomes
//! - Document registry with monotonic terminal states
//! - Task polling and live progress
//! - Log stream with bounded, deduplicated buffer and selective reconnect
//! - Confirmation guard for delete and clear
//! - Pure render model joining all of the above

pub mod backend;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod events;
pub mod guard;
pub mod logs;
pub mod models;
pub mod notice;
pub mod pending;
pub mod registry;
pub mod tasks;
pub mod upload;
pub mod view;

#[cfg(test)]
mod testing;

pub use backend::{Backend, HttpBackend};
pub use config::Config;
pub use dashboard::Dashboard;
pub use error::{Error, Result};
pub use events::DashboardEvent;
pub use guard::{Confirm, DestructiveAction, GuardOutcome};
pub use logs::{ConnectionState, LogStreamManager};
pub use models::{Document, DocumentStatus, LogEvent, MultimodalStats, Task, TaskStatus};
pub use notice::Notice;
pub use pending::PendingFile;
pub use upload::{UploadOutcome, UploadStatus, UploadSummary};
pub use view::RenderModel;
