use crate::document::LocalDocument;
use crate::error::RemoteError;
use crate::models::DocumentHandle;
use async_trait::async_trait;
use serde_json::Value;

/// The three remote calls a document session is built from.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Uploads a validated document; the returned handle is usable for
    /// generation once this resolves.
    async fn upload(&self, document: &LocalDocument) -> Result<DocumentHandle, RemoteError>;

    /// Runs `prompt` against the uploaded document. With a schema, the remote
    /// is asked for JSON matching it.
    async fn generate(
        &self,
        handle: &DocumentHandle,
        prompt: &str,
        response_schema: Option<&Value>,
    ) -> Result<String, RemoteError>;

    async fn delete(&self, handle: &DocumentHandle) -> Result<(), RemoteError>;
}
