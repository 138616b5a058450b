use crate::cli::ChatArgs;
use crate::output;
use anyhow::{anyhow, Context, Result};
use doc_session::{
    with_document, Config, DocumentSession, GeminiService, RemoteError, RemoteService,
    SchemaDescriptor, SessionError,
};
use futures::FutureExt;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Serialize)]
struct Exchange {
    question: String,
    answer: Value,
}

pub async fn run(config: Config, args: ChatArgs, interrupt: CancellationToken) -> Result<()> {
    let schema = args.schema.as_deref().map(load_schema).transpose()?;
    let remote = Arc::new(
        GeminiService::new(config.with_model(&args.doc.model)).with_cancellation(interrupt),
    );

    let query = args.query.clone();
    let output: Option<PathBuf> = args.doc.output.clone();

    with_document(remote, &args.doc.input, move |session| {
        async move {
            match query {
                Some(prompt) => {
                    answer_once(session, &prompt, schema.as_ref(), output.as_deref()).await
                }
                None => interactive(session, schema.as_ref(), output.as_deref()).await,
            }
        }
        .boxed_local()
    })
    .await
    .with_context(|| format!("chatting with {}", args.doc.input.display()))
}

fn load_schema(path: &Path) -> Result<SchemaDescriptor> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading schema {}", path.display()))?;
    SchemaDescriptor::from_json(&raw).map_err(|e| anyhow!("schema {}: {e}", path.display()))
}

async fn ask<R: RemoteService + 'static>(
    session: &DocumentSession<R>,
    prompt: &str,
    schema: Option<&SchemaDescriptor>,
) -> Result<Value, SessionError> {
    match schema {
        Some(schema) => session
            .query_structured(prompt, schema)
            .await
            .map(Value::Object),
        None => session.query_text(prompt).await.map(Value::String),
    }
}

async fn answer_once<R: RemoteService + 'static>(
    session: &DocumentSession<R>,
    prompt: &str,
    schema: Option<&SchemaDescriptor>,
    output: Option<&Path>,
) -> Result<()> {
    match ask(session, prompt, schema).await? {
        Value::String(text) => output::write_text(&text, output),
        structured => output::write_json(&structured, output),
    }
}

async fn interactive<R: RemoteService + 'static>(
    session: &DocumentSession<R>,
    schema: Option<&SchemaDescriptor>,
    output: Option<&Path>,
) -> Result<()> {
    let mut editor = DefaultEditor::new().map_err(|e| anyhow!("starting line editor: {e}"))?;
    let mut transcript = Vec::new();

    println!("Ask questions about the document. Type 'exit' or press Ctrl-D to quit.");

    loop {
        let line = match editor.readline(">> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(err) => return Err(anyhow!("reading input: {err}")),
        };

        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }
        if matches!(prompt, "exit" | "quit") {
            break;
        }
        if let Err(err) = editor.add_history_entry(prompt) {
            log::debug!("Could not record history entry: {}", err);
        }

        match ask(session, prompt, schema).await {
            Ok(answer) => {
                print_answer(&answer)?;
                transcript.push(Exchange {
                    question: prompt.to_string(),
                    answer,
                });
            }
            Err(err @ SessionError::Remote(RemoteError::Interrupted)) => return Err(err.into()),
            // A failed question does not end the conversation.
            Err(err @ (SessionError::Remote(_) | SessionError::SchemaValidation { .. })) => {
                eprintln!("error: {err}");
            }
            Err(err) => return Err(err.into()),
        }
    }

    if let Some(path) = output {
        output::write_json(&transcript, Some(path))?;
    }
    Ok(())
}

fn print_answer(answer: &Value) -> Result<()> {
    match answer {
        Value::String(text) => println!("{text}\n"),
        structured => println!("{}\n", serde_json::to_string_pretty(structured)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn schema_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_schema_descriptor_files() {
        let file = schema_file(r#"{"title": "string", "pages": "integer?"}"#);
        let schema = load_schema(file.path()).unwrap();
        assert_eq!(schema.fields().len(), 2);
        assert!(schema.fields()[0].required);
        assert!(!schema.fields()[1].required);
    }

    #[test]
    fn bad_schema_files_name_the_path() {
        let file = schema_file(r#"{"title": "date"}"#);
        let err = load_schema(file.path()).unwrap_err();
        assert!(err.to_string().contains(&file.path().display().to_string()));

        assert!(load_schema(Path::new("no/such/schema.json")).is_err());
    }

    #[test]
    fn transcript_serializes_in_order() {
        let exchange = Exchange {
            question: "q".into(),
            answer: Value::String("a".into()),
        };
        assert_eq!(
            serde_json::to_string(&exchange).unwrap(),
            r#"{"question":"q","answer":"a"}"#
        );
    }
}
