//! User-visible notices.
//!
//! Only outcomes the user has to act on are escalated: rejected destructive
//! actions, rejected processing requests, and processing failures reported by
//! the backend. Notices serialize to `{"code": "...", "message": "...", ...}`.

use serde::Serialize;

/// A notice the embedding page must show to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum Notice {
    DeleteFailed {
        message: String,
        document_ids: Vec<String>,
    },
    ClearFailed {
        message: String,
    },
    StartProcessingFailed {
        message: String,
        document_id: String,
    },
    ProcessingFailed {
        message: String,
        document_id: String,
        file_name: String,
    },
}

impl Notice {
    pub fn delete_failed(document_ids: &[String], err: impl std::fmt::Display) -> Self {
        Self::DeleteFailed {
            message: format!("Failed to delete documents: {}", err),
            document_ids: document_ids.to_vec(),
        }
    }

    pub fn clear_failed(err: impl std::fmt::Display) -> Self {
        Self::ClearFailed {
            message: format!("Failed to clear documents: {}", err),
        }
    }

    pub fn start_processing_failed(
        document_id: impl Into<String>,
        err: impl std::fmt::Display,
    ) -> Self {
        Self::StartProcessingFailed {
            message: format!("Failed to start processing: {}", err),
            document_id: document_id.into(),
        }
    }

    /// The backend's error text is kept verbatim.
    pub fn processing_failed(
        document_id: impl Into<String>,
        file_name: impl Into<String>,
        error: Option<&str>,
    ) -> Self {
        Self::ProcessingFailed {
            message: error.unwrap_or("Processing failed").to_string(),
            document_id: document_id.into(),
            file_name: file_name.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::DeleteFailed { message, .. } => message,
            Self::ClearFailed { message } => message,
            Self::StartProcessingFailed { message, .. } => message,
            Self::ProcessingFailed { message, .. } => message,
        }
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProcessingFailed {
                file_name, message, ..
            } => write!(f, "{}: {}", file_name, message),
            _ => write!(f, "{}", self.message()),
        }
    }
}

impl std::error::Error for Notice {}
