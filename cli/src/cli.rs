use clap::{Parser, Subcommand};
use doc_session::DEFAULT_MODEL;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "docchat")]
#[command(about = "Review documents and media files, or chat with them, using Gemini")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a structured review of a document as JSON.
    Review(ReviewArgs),
    /// Ask questions about a document, once (-q) or interactively.
    Chat(ChatArgs),
}

#[derive(clap::Args, Debug)]
pub struct DocumentArgs {
    /// Document or media file to upload.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Write the result here instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Gemini model identifier.
    #[arg(long, default_value = DEFAULT_MODEL)]
    pub model: String,
}

#[derive(clap::Args, Debug)]
pub struct ReviewArgs {
    #[command(flatten)]
    pub doc: DocumentArgs,

    /// Extra instructions appended to the review prompt.
    #[arg(short, long)]
    pub query: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ChatArgs {
    #[command(flatten)]
    pub doc: DocumentArgs,

    /// Question to ask. Without it, starts an interactive session.
    #[arg(short, long)]
    pub query: Option<String>,

    /// JSON file mapping field names to types (e.g. {"title": "string"});
    /// answers are returned as JSON matching it.
    #[arg(long)]
    pub schema: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_review_with_short_flags() {
        let args =
            Args::try_parse_from(["docchat", "review", "-i", "paper.pdf", "-o", "out.json"]).unwrap();
        match args.command {
            Command::Review(r) => {
                assert_eq!(r.doc.input, PathBuf::from("paper.pdf"));
                assert_eq!(r.doc.output, Some(PathBuf::from("out.json")));
                assert_eq!(r.doc.model, DEFAULT_MODEL);
                assert!(r.query.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_chat_with_long_flags() {
        let args = Args::try_parse_from([
            "docchat",
            "chat",
            "--input",
            "talk.mp4",
            "--query",
            "who speaks first?",
            "--model",
            "gemini-2.5-pro",
            "--schema",
            "speaker.json",
        ])
        .unwrap();
        match args.command {
            Command::Chat(c) => {
                assert_eq!(c.query.as_deref(), Some("who speaks first?"));
                assert_eq!(c.doc.model, "gemini-2.5-pro");
                assert_eq!(c.schema, Some(PathBuf::from("speaker.json")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn input_is_required() {
        assert!(Args::try_parse_from(["docchat", "chat", "-q", "hi"]).is_err());
    }
}
