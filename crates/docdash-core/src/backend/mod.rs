//! Processing backend abstraction
//!
//! Every coordinator talks to the backend through [`Backend`], so the HTTP
//! implementation can be swapped for an in-memory one in tests.

pub mod http;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Document, Task};
use crate::pending::PendingFile;

pub use http::HttpBackend;

/// Operations the dashboard core consumes from the processing backend.
///
/// None of these retry: polls re-attempt on their next tick and the
/// backend's operations are idempotent.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Upload one file, returning the backend-assigned document id.
    async fn upload(&self, file: &PendingFile) -> Result<String>;

    /// Full snapshot of known documents.
    async fn documents(&self) -> Result<Vec<Document>>;

    async fn start_processing(&self, document_id: &str) -> Result<()>;

    async fn delete_documents(&self, document_ids: &[String]) -> Result<()>;

    async fn clear_documents(&self) -> Result<()>;

    /// Full snapshot of active and recent tasks.
    async fn tasks(&self) -> Result<Vec<Task>>;

    /// Short name for logs (e.g. "http")
    fn backend_name(&self) -> &'static str;
}
