use crate::decoder::{Decoder, Structured, StructuredOutput, Text, Typed};
use crate::document::LocalDocument;
use crate::error::SessionError;
use crate::models::DocumentHandle;
use crate::remote::RemoteService;
use crate::schema::SchemaDescriptor;
use futures::future::LocalBoxFuture;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// One uploaded document and the queries run against it.
///
/// The session owns at most one remote file. [`close`](Self::close) deletes
/// it; dropping a loaded session schedules the deletion on the current tokio
/// runtime instead.
pub struct DocumentSession<R: RemoteService + 'static> {
    remote: Arc<R>,
    handle: Option<DocumentHandle>,
    session_id: Uuid,
}

impl<R: RemoteService + 'static> DocumentSession<R> {
    pub fn new(remote: Arc<R>) -> Self {
        Self {
            remote,
            handle: None,
            session_id: Uuid::new_v4(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.is_some()
    }

    pub fn handle(&self) -> Option<&DocumentHandle> {
        self.handle.as_ref()
    }

    /// Validates `path` locally and uploads it.
    ///
    /// Fails with [`SessionError::AlreadyLoaded`] if the session already holds
    /// a document; close it first.
    pub async fn load(&mut self, path: impl AsRef<Path>) -> Result<&DocumentHandle, SessionError> {
        let path = path.as_ref();
        if let Some(current) = &self.handle {
            return Err(SessionError::AlreadyLoaded {
                name: current.name.clone(),
            });
        }

        let document = LocalDocument::read(path).await?;
        let handle = self.remote.upload(&document).await.map_err(|err| {
            log::error!(
                "[{}] upload of {} failed: {}",
                self.session_id,
                path.display(),
                err
            );
            SessionError::Remote(err)
        })?;

        log::info!(
            "[{}] loaded {} as {}",
            self.session_id,
            path.display(),
            handle.name
        );
        Ok(self.handle.insert(handle))
    }

    /// Sends `prompt` against the loaded document and decodes the reply.
    pub async fn query<D: Decoder>(
        &self,
        prompt: &str,
        decoder: &D,
    ) -> Result<D::Output, SessionError> {
        let handle = self.handle.as_ref().ok_or(SessionError::NoDocumentLoaded)?;
        if prompt.trim().is_empty() {
            return Err(SessionError::InvalidPrompt("prompt is empty".into()));
        }

        let schema = decoder.response_schema();
        log::debug!(
            "[{}] querying {} (structured: {})",
            self.session_id,
            handle.name,
            schema.is_some()
        );

        let raw = self
            .remote
            .generate(handle, prompt, schema.as_ref())
            .await
            .map_err(|err| {
                log::error!("[{}] query on {} failed: {}", self.session_id, handle.name, err);
                SessionError::Remote(err)
            })?;

        decoder.decode(&raw).inspect_err(|err| {
            log::warn!("[{}] {}", self.session_id, err);
        })
    }

    pub async fn query_text(&self, prompt: &str) -> Result<String, SessionError> {
        self.query(prompt, &Text).await
    }

    pub async fn query_structured(
        &self,
        prompt: &str,
        schema: &SchemaDescriptor,
    ) -> Result<Map<String, Value>, SessionError> {
        self.query(prompt, &Structured(schema.clone())).await
    }

    pub async fn query_as<T: StructuredOutput>(&self, prompt: &str) -> Result<T, SessionError> {
        self.query(prompt, &Typed::<T>::new()).await
    }

    /// Deletes the remote file, if any. Safe to call repeatedly; a failed
    /// deletion is logged and otherwise ignored.
    pub async fn close(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        if let Err(err) = self.remote.delete(&handle).await {
            log::warn!(
                "[{}] failed to delete remote file {}: {}",
                self.session_id,
                handle.name,
                err
            );
        }
    }
}

impl<R: RemoteService + 'static> Drop for DocumentSession<R> {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                log::warn!(
                    "[{}] dropped while {} is loaded; deleting in background",
                    self.session_id,
                    handle.name
                );
                let remote = Arc::clone(&self.remote);
                let session_id = self.session_id;
                runtime.spawn(async move {
                    if let Err(err) = remote.delete(&handle).await {
                        log::warn!(
                            "[{}] failed to delete remote file {}: {}",
                            session_id,
                            handle.name,
                            err
                        );
                    }
                });
            }
            Err(_) => log::warn!(
                "[{}] dropped outside a runtime; remote file {} was not deleted",
                self.session_id,
                handle.name
            ),
        }
    }
}

/// Loads `path`, runs `body` against the session and closes it afterwards,
/// whether `body` succeeded or not.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use futures::FutureExt;
/// # use doc_session::{with_document, Config, GeminiService, SessionError};
/// # async fn demo() -> Result<(), SessionError> {
/// let remote = Arc::new(GeminiService::new(Config::from_env().unwrap()));
/// let summary = with_document(remote, "paper.pdf", |session| {
///     async move { session.query_text("Summarize this paper").await }.boxed_local()
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn with_document<R, T, E, F>(remote: Arc<R>, path: impl AsRef<Path>, body: F) -> Result<T, E>
where
    R: RemoteService + 'static,
    E: From<SessionError>,
    F: for<'s> FnOnce(&'s mut DocumentSession<R>) -> LocalBoxFuture<'s, Result<T, E>>,
{
    let mut session = DocumentSession::new(remote);
    session.load(path).await?;

    let outcome = body(&mut session).await;
    session.close().await;
    outcome
}
