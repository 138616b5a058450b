use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by a [`DocumentSession`](crate::DocumentSession).
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid input {}: {reason}", path.display())]
    InvalidInput { path: PathBuf, reason: String },

    #[error("invalid prompt: {0}")]
    InvalidPrompt(String),

    #[error("no document loaded; call load() before querying")]
    NoDocumentLoaded,

    #[error("a document is already loaded ({name}); close the session before loading another")]
    AlreadyLoaded { name: String },

    #[error("remote service error: {0}")]
    Remote(#[from] RemoteError),

    #[error("response did not match the requested schema: {reason}")]
    SchemaValidation { reason: String, raw: String },
}

impl SessionError {
    pub(crate) fn invalid_input(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn schema(reason: impl Into<String>, raw: &str) -> Self {
        Self::SchemaValidation {
            reason: reason.into(),
            raw: raw.to_string(),
        }
    }
}

/// Failures reported by (or while talking to) the remote service.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("file {name} did not become active: {reason}")]
    Processing { name: String, reason: String },

    #[error("no text in response: {0}")]
    EmptyResponse(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("interrupted")]
    Interrupted,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}
