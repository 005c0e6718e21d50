//! HTTP backend
//!
//! Uses reqwest against the processing backend's REST API. Multipart for
//! uploads, JSON everywhere else.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Backend;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{Document, Task};
use crate::pending::PendingFile;

/// REST client for the processing backend
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    success: bool,
    #[serde(default)]
    document_id: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ActionResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

impl ActionResponse {
    fn into_result(self) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            Err(Error::rejected(self.message))
        }
    }
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    document_ids: &'a [String],
}

impl HttpBackend {
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| Error::InvalidUrl(format!("{}: {}", config.base_url, e)))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(Error::InvalidUrl(config.base_url.clone()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Decode a JSON body, turning non-2xx statuses into [`Error::Status`].
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.bytes().await?;

    if !status.is_success() {
        return Err(Error::Status {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    }

    Ok(serde_json::from_slice(&body)?)
}

#[async_trait]
impl Backend for HttpBackend {
    async fn upload(&self, file: &PendingFile) -> Result<String> {
        let bytes = tokio::fs::read(&file.path)
            .await
            .map_err(|source| Error::File {
                path: file.path.display().to_string(),
                source,
            })?;

        let part = Part::bytes(bytes).file_name(file.name.clone());
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(self.endpoint(&["api", "upload"])?)
            .multipart(form)
            .send()
            .await?;

        let upload: UploadResponse = decode(response).await?;
        if !upload.success {
            return Err(Error::rejected(upload.message));
        }

        let document_id = upload.document_id.ok_or_else(|| {
            Error::rejected(Some("upload acknowledged without a document id".to_string()))
        })?;
        debug!(file_name = %file.name, document_id = %document_id, "Uploaded");
        Ok(document_id)
    }

    async fn documents(&self) -> Result<Vec<Document>> {
        let response = self
            .client
            .get(self.endpoint(&["api", "documents"])?)
            .send()
            .await?;
        decode(response).await
    }

    async fn start_processing(&self, document_id: &str) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint(&["api", "documents", document_id, "process"])?)
            .send()
            .await?;
        decode::<ActionResponse>(response).await?.into_result()
    }

    async fn delete_documents(&self, document_ids: &[String]) -> Result<()> {
        let response = self
            .client
            .delete(self.endpoint(&["api", "documents"])?)
            .json(&DeleteRequest { document_ids })
            .send()
            .await?;
        decode::<ActionResponse>(response).await?.into_result()
    }

    async fn clear_documents(&self) -> Result<()> {
        let response = self
            .client
            .delete(self.endpoint(&["api", "documents", "clear"])?)
            .send()
            .await?;
        decode::<ActionResponse>(response).await?.into_result()
    }

    async fn tasks(&self) -> Result<Vec<Task>> {
        let response = self
            .client
            .get(self.endpoint(&["api", "tasks"])?)
            .send()
            .await?;
        decode(response).await
    }

    fn backend_name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentStatus, TaskStatus};
    use axum::extract::{Multipart, Path};
    use axum::http::StatusCode;
    use axum::routing::{delete, get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn backend_for(base_url: &str) -> HttpBackend {
        HttpBackend::new(&Config::default().with_base_url(base_url)).unwrap()
    }

    async fn upload_handler(mut multipart: Multipart) -> Json<Value> {
        while let Some(field) = multipart.next_field().await.unwrap() {
            if field.name() == Some("file") {
                let name = field.file_name().unwrap_or_default().to_string();
                let len = field.bytes().await.unwrap().len();
                if name == "reject.pdf" {
                    return Json(json!({"success": false, "message": "unsupported format"}));
                }
                return Json(json!({"success": true, "document_id": format!("{}:{}", name, len)}));
            }
        }
        Json(json!({"success": false, "message": "no file field"}))
    }

    fn router() -> Router {
        Router::new()
            .route("/api/upload", post(upload_handler))
            .route(
                "/api/documents",
                get(|| async {
                    Json(json!([{
                        "document_id": "doc-1",
                        "file_name": "a.pdf",
                        "file_size": 1000,
                        "status": "uploaded",
                        "can_process": true
                    }]))
                })
                .delete(|Json(body): Json<Value>| async move {
                    let ids = body["document_ids"].as_array().map(|a| a.len()).unwrap_or(0);
                    Json(json!({"success": ids > 0, "message": "nothing to delete"}))
                }),
            )
            .route(
                "/api/documents/clear",
                delete(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "storage offline") }),
            )
            .route(
                "/api/documents/:id/process",
                post(|Path(id): Path<String>| async move {
                    Json(json!({"success": id == "doc-1"}))
                }),
            )
            .route(
                "/api/tasks",
                get(|| async {
                    Json(json!([{
                        "task_id": "task-1",
                        "file_name": "a.pdf",
                        "status": "running",
                        "progress": 40,
                        "stage": "parsing",
                        "multimodal_stats": {"images_count": 2, "images_processed": 1}
                    }]))
                }),
            )
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        let config = Config::default().with_base_url("ftp://example.com");
        assert!(matches!(HttpBackend::new(&config), Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let backend = backend_for("http://localhost:9621/rag/");
        let url = backend.endpoint(&["api", "documents", "a b", "process"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:9621/rag/api/documents/a%20b/process");
    }

    #[tokio::test]
    async fn test_documents_and_tasks_snapshots() {
        let backend = backend_for(&serve(router()).await);

        let documents = backend.documents().await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].status, DocumentStatus::Uploaded);
        assert!(documents[0].can_process);

        let tasks = backend.tasks().await.unwrap();
        assert_eq!(tasks[0].status, TaskStatus::Running);
        assert_eq!(tasks[0].progress_percent(), 40.0);
        assert_eq!(tasks[0].multimodal_stats.images_processed, 1);
    }

    #[tokio::test]
    async fn test_upload_sends_file_contents() {
        let backend = backend_for(&serve(router()).await);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.pdf");
        std::fs::write(&path, vec![0u8; 1000]).unwrap();

        let file = PendingFile::from_path(&path).await.unwrap();
        let document_id = backend.upload(&file).await.unwrap();
        assert_eq!(document_id, "a.pdf:1000");
    }

    #[tokio::test]
    async fn test_upload_rejection_and_missing_file() {
        let backend = backend_for(&serve(router()).await);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reject.pdf");
        std::fs::write(&path, b"%PDF").unwrap();

        let file = PendingFile::from_path(&path).await.unwrap();
        match backend.upload(&file).await {
            Err(Error::Rejected(message)) => assert_eq!(message, "unsupported format"),
            other => panic!("expected rejection, got {:?}", other),
        }

        std::fs::remove_file(&path).unwrap();
        assert!(matches!(backend.upload(&file).await, Err(Error::File { .. })));
    }

    #[tokio::test]
    async fn test_actions_map_failures() {
        let backend = backend_for(&serve(router()).await);

        backend.start_processing("doc-1").await.unwrap();
        assert!(matches!(
            backend.start_processing("doc-2").await,
            Err(Error::Rejected(_))
        ));

        backend.delete_documents(&["doc-1".to_string()]).await.unwrap();
        assert!(matches!(
            backend.delete_documents(&[]).await,
            Err(Error::Rejected(message)) if message == "nothing to delete"
        ));

        match backend.clear_documents().await {
            Err(Error::Status { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "storage offline");
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }
}
