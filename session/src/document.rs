use crate::error::SessionError;
use std::path::{Path, PathBuf};

/// Upper bound the remote File API accepts for a single upload.
pub const MAX_UPLOAD_BYTES: u64 = 2 * 1024 * 1024 * 1024;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Guessed MIME type -> name the remote expects. Anything not listed here is
/// rejected before upload.
const SUPPORTED_TYPES: &[(&str, &str)] = &[
    ("application/pdf", "application/pdf"),
    ("text/plain", "text/plain"),
    ("text/markdown", "text/markdown"),
    ("text/x-markdown", "text/markdown"),
    ("text/html", "text/html"),
    ("text/csv", "text/csv"),
    ("text/xml", "text/xml"),
    ("application/xml", "text/xml"),
    ("image/png", "image/png"),
    ("image/jpeg", "image/jpeg"),
    ("image/webp", "image/webp"),
    ("image/heic", "image/heic"),
    ("image/heif", "image/heif"),
    ("audio/wav", "audio/wav"),
    ("audio/x-wav", "audio/wav"),
    ("audio/mpeg", "audio/mp3"),
    ("audio/mp3", "audio/mp3"),
    ("audio/aiff", "audio/aiff"),
    ("audio/x-aiff", "audio/aiff"),
    ("audio/aac", "audio/aac"),
    ("audio/ogg", "audio/ogg"),
    ("audio/flac", "audio/flac"),
    ("audio/x-flac", "audio/flac"),
    ("video/mp4", "video/mp4"),
    ("video/mpeg", "video/mpeg"),
    ("video/quicktime", "video/mov"),
    ("video/x-msvideo", "video/avi"),
    ("video/x-flv", "video/x-flv"),
    ("video/webm", "video/webm"),
    ("video/x-ms-wmv", "video/wmv"),
    ("video/3gpp", "video/3gpp"),
];

/// A local file that passed validation and is ready to upload.
#[derive(Debug, Clone)]
pub struct LocalDocument {
    pub path: PathBuf,
    pub display_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl LocalDocument {
    /// Validates `path` and reads it into memory. Nothing here talks to the
    /// remote service.
    pub async fn read(path: &Path) -> Result<Self, SessionError> {
        let mime_type = upload_mime_type(path)?;

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| SessionError::invalid_input(path, format!("cannot access file: {e}")))?;
        if !metadata.is_file() {
            return Err(SessionError::invalid_input(path, "not a regular file"));
        }
        if metadata.len() == 0 {
            return Err(SessionError::invalid_input(path, "file is empty"));
        }
        if metadata.len() > MAX_UPLOAD_BYTES {
            return Err(SessionError::invalid_input(
                path,
                format!("file is {} bytes, limit is {MAX_UPLOAD_BYTES}", metadata.len()),
            ));
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| SessionError::invalid_input(path, format!("cannot read file: {e}")))?;

        if mime_type == "application/pdf" && !bytes.starts_with(PDF_MAGIC) {
            return Err(SessionError::invalid_input(
                path,
                "has a .pdf extension but is not a PDF",
            ));
        }

        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "document".to_string());

        log::debug!(
            "Validated {} ({}, {} bytes)",
            path.display(),
            mime_type,
            bytes.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            display_name,
            mime_type: mime_type.to_string(),
            bytes,
        })
    }
}

/// MIME type to declare on upload, derived from the file extension.
pub fn upload_mime_type(path: &Path) -> Result<&'static str, SessionError> {
    let guessed = mime_guess::from_path(path).first().ok_or_else(|| {
        SessionError::invalid_input(path, "cannot determine file type from extension")
    })?;

    SUPPORTED_TYPES
        .iter()
        .find(|(candidate, _)| *candidate == guessed.essence_str())
        .map(|(_, upload)| *upload)
        .ok_or_else(|| {
            SessionError::invalid_input(path, format!("unsupported file type {guessed}"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(suffix: &str, contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents).unwrap();
        file
    }

    #[test]
    fn maps_guessed_types_to_upload_names() {
        assert_eq!(upload_mime_type(Path::new("a.pdf")).unwrap(), "application/pdf");
        assert_eq!(upload_mime_type(Path::new("clip.MOV")).unwrap(), "video/mov");
        assert_eq!(upload_mime_type(Path::new("song.mp3")).unwrap(), "audio/mp3");
    }

    #[test]
    fn rejects_unsupported_extensions() {
        for name in ["archive.zip", "binary.exe", "no_extension"] {
            let err = upload_mime_type(Path::new(name)).unwrap_err();
            assert!(matches!(err, SessionError::InvalidInput { .. }), "{name}");
        }
    }

    #[tokio::test]
    async fn missing_file_is_invalid_input() {
        let err = LocalDocument::read(Path::new("definitely/missing.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn rejects_empty_and_fake_pdfs() {
        let empty = write_temp(".pdf", b"");
        let err = LocalDocument::read(empty.path()).await.unwrap_err();
        assert!(err.to_string().contains("empty"));

        let fake = write_temp(".pdf", b"hello world");
        let err = LocalDocument::read(fake.path()).await.unwrap_err();
        assert!(err.to_string().contains("not a PDF"));
    }

    #[tokio::test]
    async fn reads_valid_documents() {
        let pdf = write_temp(".pdf", b"%PDF-1.7\n%minimal\n");
        let doc = LocalDocument::read(pdf.path()).await.unwrap();
        assert_eq!(doc.mime_type, "application/pdf");
        assert!(doc.display_name.ends_with(".pdf"));
        assert_eq!(doc.bytes.len(), 18);
    }

    #[tokio::test]
    async fn directories_are_rejected() {
        let dir = tempfile::Builder::new().suffix(".pdf").tempdir().unwrap();
        let err = LocalDocument::read(dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("not a regular file"));
    }
}
