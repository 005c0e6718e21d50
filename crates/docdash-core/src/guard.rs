//! Confirmation gate for irreversible document actions.
//!
//! Nothing reaches the backend until the user has confirmed. A declined
//! prompt is a silent no-op; a rejected request comes back as a [`Notice`]
//! and the registry keeps its previous contents.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::notice::Notice;
use crate::registry::DocumentRegistry;

/// An action that needs explicit confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DestructiveAction {
    Delete {
        document_ids: Vec<String>,
        /// Names for the prompt; ids the registry does not know are shown as-is
        file_names: Vec<String>,
    },
    Clear {
        document_count: usize,
    },
}

impl DestructiveAction {
    /// Question to put to the user.
    pub fn prompt(&self) -> String {
        match self {
            DestructiveAction::Delete { file_names, .. } if file_names.len() == 1 => {
                format!("Delete {}? This cannot be undone.", file_names[0])
            }
            DestructiveAction::Delete { file_names, .. } => format!(
                "Delete {} documents ({})? This cannot be undone.",
                file_names.len(),
                file_names.join(", ")
            ),
            DestructiveAction::Clear { document_count } => format!(
                "Remove all {} documents from the backend? This cannot be undone.",
                document_count
            ),
        }
    }
}

/// Asks the user to confirm a destructive action.
#[async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, action: &DestructiveAction) -> bool;
}

#[async_trait]
impl<F> Confirm for F
where
    F: Fn(&DestructiveAction) -> bool + Send + Sync,
{
    async fn confirm(&self, action: &DestructiveAction) -> bool {
        self(action)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardOutcome {
    /// The user said no; nothing was sent.
    Declined,
    /// The backend accepted and the registry was refreshed.
    Done,
}

#[derive(Clone)]
pub struct DestructiveActionGuard {
    registry: DocumentRegistry,
    confirm: Arc<dyn Confirm>,
}

impl DestructiveActionGuard {
    pub fn new(registry: DocumentRegistry, confirm: Arc<dyn Confirm>) -> Self {
        Self { registry, confirm }
    }

    /// Delete the given documents after confirmation.
    pub async fn delete(&self, document_ids: &[String]) -> Result<GuardOutcome, Notice> {
        if document_ids.is_empty() {
            return Ok(GuardOutcome::Declined);
        }

        let mut file_names = Vec::with_capacity(document_ids.len());
        for id in document_ids {
            let name = match self.registry.get(id).await {
                Some(doc) => doc.file_name,
                None => id.clone(),
            };
            file_names.push(name);
        }

        let action = DestructiveAction::Delete {
            document_ids: document_ids.to_vec(),
            file_names,
        };
        if !self.confirm.confirm(&action).await {
            tracing::debug!(count = document_ids.len(), "Delete declined");
            return Ok(GuardOutcome::Declined);
        }

        self.registry.delete(document_ids).await.map_err(|e| {
            tracing::warn!(error = %e, "Delete rejected");
            Notice::delete_failed(document_ids, e)
        })?;
        Ok(GuardOutcome::Done)
    }

    /// Remove every document after confirmation.
    pub async fn clear(&self) -> Result<GuardOutcome, Notice> {
        let action = DestructiveAction::Clear {
            document_count: self.registry.documents().await.len(),
        };
        if !self.confirm.confirm(&action).await {
            tracing::debug!("Clear declined");
            return Ok(GuardOutcome::Declined);
        }

        self.registry.clear().await.map_err(|e| {
            tracing::warn!(error = %e, "Clear rejected");
            Notice::clear_failed(e)
        })?;
        Ok(GuardOutcome::Done)
    }
}
