use doc_session::{Config, DocumentHandle, GeminiService, LocalDocument, RemoteError, RemoteService};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Local stand-in for the Gemini REST API. Answers the resumable upload
/// handshake, serves scripted file states and records each request line.
struct FakeGemini {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeGemini {
    async fn start(finalized: Value, polls: Vec<Value>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let log = requests.clone();
        let upload_url = format!("{base_url}/finalize");
        let mut polls = VecDeque::from(polls);
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let mut reader = BufReader::new(stream);

                let mut request_line = String::new();
                reader.read_line(&mut request_line).await.unwrap();
                let mut content_length = 0;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).await.unwrap();
                    if line.trim().is_empty() {
                        break;
                    }
                    if let Some((name, value)) = line.split_once(':') {
                        if name.eq_ignore_ascii_case("content-length") {
                            content_length = value.trim().parse().unwrap();
                        }
                    }
                }
                let mut body = vec![0; content_length];
                reader.read_exact(&mut body).await.unwrap();

                let mut parts = request_line.split_whitespace();
                let method = parts.next().unwrap_or_default().to_string();
                let path = parts.next().unwrap_or_default().to_string();
                log.lock().unwrap().push(format!("{method} {path}"));

                let (status, extra_header, reply) = match (method.as_str(), path.as_str()) {
                    ("POST", "/upload/v1beta/files") => (
                        "200 OK",
                        format!("x-goog-upload-url: {upload_url}\r\n"),
                        json!({}),
                    ),
                    ("POST", "/finalize") => {
                        ("200 OK", String::new(), json!({ "file": finalized.clone() }))
                    }
                    ("GET", _) => (
                        "200 OK",
                        String::new(),
                        polls.pop_front().unwrap_or_else(|| finalized.clone()),
                    ),
                    ("DELETE", _) => ("200 OK", String::new(), json!({})),
                    _ => ("404 Not Found", String::new(), json!({})),
                };

                let reply = reply.to_string();
                let response = format!(
                    "HTTP/1.1 {status}\r\ncontent-type: application/json\r\n{extra_header}content-length: {}\r\nconnection: close\r\n\r\n{reply}",
                    reply.len()
                );
                let mut stream = reader.into_inner();
                stream.write_all(response.as_bytes()).await.unwrap();
                stream.shutdown().await.ok();
            }
        });

        Self { base_url, requests }
    }

    fn config(&self) -> Config {
        let mut config = Config::new("test-key");
        config.base_url = self.base_url.clone();
        config.upload_poll_interval = Duration::from_millis(10);
        config.upload_timeout = Duration::from_secs(5);
        config
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

fn video() -> LocalDocument {
    LocalDocument {
        path: PathBuf::from("talk.mp4"),
        display_name: "talk.mp4".into(),
        mime_type: "video/mp4".into(),
        bytes: b"not really a video".to_vec(),
    }
}

fn file_state(state: &str) -> Value {
    json!({
        "name": "files/v1",
        "mimeType": "video/mp4",
        "uri": "https://example.test/v1beta/files/v1",
        "state": state
    })
}

#[tokio::test]
async fn polls_until_the_upload_is_active() {
    let fake = FakeGemini::start(
        json!({"name": "files/v1", "state": "PROCESSING"}),
        vec![file_state("PROCESSING"), file_state("ACTIVE")],
    )
    .await;
    let service = GeminiService::new(fake.config());

    let handle = service.upload(&video()).await.unwrap();
    assert_eq!(handle.name, "files/v1");
    assert_eq!(handle.uri, "https://example.test/v1beta/files/v1");
    assert_eq!(handle.mime_type, "video/mp4");
    assert_eq!(
        fake.requests(),
        vec![
            "POST /upload/v1beta/files",
            "POST /finalize",
            "GET /v1beta/files/v1",
            "GET /v1beta/files/v1",
        ]
    );
}

#[tokio::test]
async fn failed_processing_deletes_the_upload() {
    let mut failed = file_state("FAILED");
    failed["error"] = json!({"message": "unsupported codec"});
    let fake = FakeGemini::start(file_state("PROCESSING"), vec![failed]).await;
    let service = GeminiService::new(fake.config());

    match service.upload(&video()).await.unwrap_err() {
        RemoteError::Processing { name, reason } => {
            assert_eq!(name, "files/v1");
            assert!(reason.contains("unsupported codec"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(
        fake.requests().last().map(String::as_str),
        Some("DELETE /v1beta/files/v1")
    );
}

#[tokio::test]
async fn processing_timeout_deletes_the_upload() {
    let fake = FakeGemini::start(file_state("PROCESSING"), vec![]).await;
    let mut config = fake.config();
    config.upload_timeout = Duration::ZERO;
    let service = GeminiService::new(config);

    let err = service.upload(&video()).await.unwrap_err();
    assert!(matches!(err, RemoteError::Processing { .. }));
    assert_eq!(
        fake.requests(),
        vec![
            "POST /upload/v1beta/files",
            "POST /finalize",
            "DELETE /v1beta/files/v1",
        ]
    );
}

#[tokio::test]
async fn active_upload_without_uri_is_deleted() {
    let fake = FakeGemini::start(json!({"name": "files/x", "state": "ACTIVE"}), vec![]).await;
    let service = GeminiService::new(fake.config());

    let err = service.upload(&video()).await.unwrap_err();
    assert!(matches!(err, RemoteError::UnexpectedResponse(_)));
    assert_eq!(
        fake.requests().last().map(String::as_str),
        Some("DELETE /v1beta/files/x")
    );
}

#[tokio::test]
async fn interrupt_while_processing_deletes_the_upload() {
    let fake = FakeGemini::start(file_state("PROCESSING"), vec![]).await;
    let mut config = fake.config();
    config.upload_poll_interval = Duration::from_secs(60);
    let cancel = CancellationToken::new();
    let service = GeminiService::new(config).with_cancellation(cancel.clone());

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let err = service.upload(&video()).await.unwrap_err();
    assert!(matches!(err, RemoteError::Interrupted));
    assert_eq!(
        fake.requests(),
        vec![
            "POST /upload/v1beta/files",
            "POST /finalize",
            "DELETE /v1beta/files/v1",
        ]
    );
}

#[tokio::test]
async fn cancelled_service_skips_uploads_and_generation() {
    let fake = FakeGemini::start(file_state("ACTIVE"), vec![]).await;
    let cancel = CancellationToken::new();
    cancel.cancel();
    let service = GeminiService::new(fake.config()).with_cancellation(cancel);

    let err = service.upload(&video()).await.unwrap_err();
    assert!(matches!(err, RemoteError::Interrupted));

    let handle = DocumentHandle {
        name: "files/v1".into(),
        uri: "https://example.test/v1beta/files/v1".into(),
        mime_type: "video/mp4".into(),
    };
    let err = service.generate(&handle, "summarize", None).await.unwrap_err();
    assert!(matches!(err, RemoteError::Interrupted));
    assert!(fake.requests().is_empty());

    // Deletion is never cut short.
    service.delete(&handle).await.unwrap();
    assert_eq!(fake.requests(), vec!["DELETE /v1beta/files/v1"]);
}
