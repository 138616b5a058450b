use crate::config::Config;
use crate::document::LocalDocument;
use crate::error::RemoteError;
use crate::models::*;
use crate::remote::RemoteService;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::future::Future;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

const API_KEY_HEADER: &str = "x-goog-api-key";
const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";

/// Gemini REST client covering the File API and `generateContent`.
///
/// Cancelling the token passed to [`with_cancellation`](Self::with_cancellation)
/// makes pending uploads and generate calls return
/// [`RemoteError::Interrupted`]. Deletions always run to completion.
#[derive(Clone)]
pub struct GeminiService {
    client: Client,
    config: Config,
    cancel: CancellationToken,
}

impl GeminiService {
    pub fn new(config: Config) -> Self {
        Self {
            client: Client::new(),
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/v1beta/{}", self.config.base_url, path)
    }

    fn model_path(&self) -> String {
        let model = self.config.model.as_str();
        if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        }
    }

    async fn interruptible<T, F>(&self, call: F) -> Result<T, RemoteError>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => Err(RemoteError::Interrupted),
            result = call => result,
        }
    }

    async fn start_upload(&self, document: &LocalDocument) -> Result<String, RemoteError> {
        let url = format!("{}/upload/v1beta/files", self.config.base_url);
        let metadata = UploadMetadata {
            file: UploadFileMetadata {
                display_name: document.display_name.clone(),
            },
        };

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, self.config.api_key.as_str())
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header(
                "X-Goog-Upload-Header-Content-Length",
                document.bytes.len().to_string(),
            )
            .header("X-Goog-Upload-Header-Content-Type", document.mime_type.as_str())
            .json(&metadata)
            .send()
            .await?;
        let response = check_status(response).await?;

        response
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                RemoteError::UnexpectedResponse("upload session returned no upload URL".into())
            })
    }

    async fn finish_upload(
        &self,
        upload_url: &str,
        document: &LocalDocument,
    ) -> Result<RemoteFile, RemoteError> {
        let response = self
            .client
            .post(upload_url)
            .header(API_KEY_HEADER, self.config.api_key.as_str())
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(document.bytes.clone())
            .send()
            .await?;
        let response = check_status(response).await?;

        let envelope: FileEnvelope = response.json().await?;
        Ok(envelope.file)
    }

    async fn get_file(&self, name: &str) -> Result<RemoteFile, RemoteError> {
        let response = self
            .client
            .get(self.api_url(name))
            .header(API_KEY_HEADER, self.config.api_key.as_str())
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Media files are processed remotely after upload and cannot be used in a
    /// prompt until they report `ACTIVE`.
    async fn wait_until_active(&self, mut file: RemoteFile) -> Result<RemoteFile, RemoteError> {
        let deadline = Instant::now() + self.config.upload_timeout;

        loop {
            match file.state {
                // Unspecified means the remote did not report any processing.
                FileState::Active | FileState::StateUnspecified => return Ok(file),
                FileState::Failed => {
                    let reason = file
                        .error
                        .as_ref()
                        .and_then(|e| e.message.clone())
                        .unwrap_or_else(|| "processing failed".to_string());
                    return Err(RemoteError::Processing {
                        name: file.name,
                        reason,
                    });
                }
                FileState::Processing => {}
            }

            if Instant::now() >= deadline {
                return Err(RemoteError::Processing {
                    name: file.name,
                    reason: format!(
                        "still processing after {}s",
                        self.config.upload_timeout.as_secs()
                    ),
                });
            }

            log::debug!("Waiting for {} to finish processing", file.name);
            self.interruptible(async {
                tokio::time::sleep(self.config.upload_poll_interval).await;
                Ok(())
            })
            .await?;
            file = self.interruptible(self.get_file(&file.name)).await?;
        }
    }

    /// Waits for `file` to become usable and turns it into a handle.
    async fn activate(
        &self,
        file: RemoteFile,
        document: &LocalDocument,
    ) -> Result<DocumentHandle, RemoteError> {
        let file = self.wait_until_active(file).await?;
        let uri = file.uri.ok_or_else(|| {
            RemoteError::UnexpectedResponse(format!("uploaded file {} has no URI", file.name))
        })?;

        Ok(DocumentHandle {
            name: file.name,
            uri,
            mime_type: file.mime_type.unwrap_or_else(|| document.mime_type.clone()),
        })
    }

    async fn delete_file(&self, name: &str) -> Result<(), RemoteError> {
        let response = self
            .client
            .delete(self.api_url(name))
            .header(API_KEY_HEADER, self.config.api_key.as_str())
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteService for GeminiService {
    async fn upload(&self, document: &LocalDocument) -> Result<DocumentHandle, RemoteError> {
        log::info!(
            "Uploading {} ({}, {} bytes)",
            document.display_name,
            document.mime_type,
            document.bytes.len()
        );

        // Only the start call may be abandoned; once finalize is sent a remote
        // file can exist and must be deleted on every failure path.
        let upload_url = self.interruptible(self.start_upload(document)).await?;
        let file = self.finish_upload(&upload_url, document).await?;
        let name = file.name.clone();

        match self.activate(file, document).await {
            Ok(handle) => {
                log::info!("Uploaded {} as {}", document.display_name, handle.name);
                Ok(handle)
            }
            Err(err) => {
                if let Err(cleanup) = self.delete_file(&name).await {
                    log::warn!("Failed to delete unusable upload {}: {}", name, cleanup);
                }
                Err(err)
            }
        }
    }

    async fn generate(
        &self,
        handle: &DocumentHandle,
        prompt: &str,
        response_schema: Option<&Value>,
    ) -> Result<String, RemoteError> {
        let request = build_generate_request(handle, prompt, response_schema);
        let url = self.api_url(&format!("{}:generateContent", self.model_path()));

        self.interruptible(async {
            let response = self
                .client
                .post(&url)
                .header(API_KEY_HEADER, self.config.api_key.as_str())
                .json(&request)
                .send()
                .await?;
            let response = check_status(response).await?;

            let parsed: GenerateContentResponse = response.json().await?;
            extract_text(parsed)
        })
        .await
    }

    async fn delete(&self, handle: &DocumentHandle) -> Result<(), RemoteError> {
        self.delete_file(&handle.name).await?;
        log::info!("Deleted remote file {}", handle.name);
        Ok(())
    }
}

fn build_generate_request(
    handle: &DocumentHandle,
    prompt: &str,
    response_schema: Option<&Value>,
) -> GenerateContentRequest {
    let generation_config = response_schema.map(|schema| GenerationConfig {
        response_mime_type: Some("application/json".to_string()),
        response_schema: Some(schema.clone()),
    });

    GenerateContentRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![Part::file(handle), Part::text(prompt)],
        }],
        generation_config,
    }
}

/// Concatenates the text parts of the first candidate.
fn extract_text(response: GenerateContentResponse) -> Result<String, RemoteError> {
    let block_reason = response
        .prompt_feedback
        .and_then(|f| f.block_reason)
        .map(|r| format!("prompt blocked ({r})"));

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(RemoteError::EmptyResponse(
            block_reason.unwrap_or_else(|| "no candidates returned".to_string()),
        ));
    };

    let texts: Vec<String> = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if texts.is_empty() {
        let reason = candidate
            .finish_reason
            .map(|r| format!("finish reason {r}"))
            .or(block_reason)
            .unwrap_or_else(|| "candidate has no text parts".to_string());
        return Err(RemoteError::EmptyResponse(reason));
    }

    Ok(texts.concat())
}

async fn check_status(response: Response) -> Result<Response, RemoteError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "failed to read error body".to_string());
    Err(map_http_error(status, &body))
}

fn map_http_error(status: StatusCode, body: &str) -> RemoteError {
    let message = serde_json::from_str::<ErrorWrapper>(body)
        .map(|wrapper| {
            let status_text = wrapper.error.status.unwrap_or_default();
            let msg = wrapper.error.message.unwrap_or_else(|| body.to_string());
            if status_text.is_empty() {
                msg
            } else {
                format!("{status_text}: {msg}")
            }
        })
        .unwrap_or_else(|_| body.trim().to_string());

    RemoteError::Api {
        status: status.as_u16(),
        message,
    }
}
