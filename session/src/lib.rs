pub mod config;
pub mod decoder;
pub mod document;
pub mod error;
pub mod gemini_service;
pub mod models;
pub mod remote;
pub mod review;
pub mod schema;
pub mod session;

pub use config::{Config, DEFAULT_MODEL};
pub use decoder::{Decoder, Structured, StructuredOutput, Text, Typed};
pub use document::LocalDocument;
pub use error::{ConfigError, RemoteError, SessionError};
pub use gemini_service::GeminiService;
pub use models::DocumentHandle;
pub use remote::RemoteService;
pub use review::{review_prompt, Review};
pub use schema::{FieldType, ScalarType, SchemaDescriptor};
pub use session::{with_document, DocumentSession};
