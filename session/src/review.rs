use crate::decoder::StructuredOutput;
use crate::schema::{FieldType, ScalarType, SchemaDescriptor};
use serde::{Deserialize, Serialize};

const REVIEW_PROMPT: &str = r#"You are an experienced reviewer. Read the attached document carefully and write a critical review of it.

INSTRUCTIONS:
1. Give the document's title as it appears in the document, or a short descriptive title if it has none
2. Summarize the main content and contributions in one paragraph
3. List concrete strengths and weaknesses, each as a single sentence
4. List actionable suggestions for improving the document
5. Score the overall quality from 1 (poor) to 10 (excellent)
6. Base every statement only on the attached document"#;

/// Structured review of a document, as produced by the `review` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub title: String,
    pub summary: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub suggestions: Vec<String>,
    pub score: u8,
}

impl StructuredOutput for Review {
    fn schema() -> SchemaDescriptor {
        let text_list = FieldType::Array(ScalarType::String);
        SchemaDescriptor::new()
            .required("title", FieldType::Scalar(ScalarType::String))
            .required("summary", FieldType::Scalar(ScalarType::String))
            .required("strengths", text_list)
            .required("weaknesses", text_list)
            .required("suggestions", text_list)
            .required("score", FieldType::Scalar(ScalarType::Integer))
    }

    fn check(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("review title is empty".into());
        }
        if !(1..=10).contains(&self.score) {
            return Err(format!("score {} is outside 1..=10", self.score));
        }
        Ok(())
    }
}

/// Builds the review prompt, appending the caller's extra instructions.
pub fn review_prompt(extra: Option<&str>) -> String {
    match extra.map(str::trim).filter(|e| !e.is_empty()) {
        Some(extra) => format!("{REVIEW_PROMPT}\n\nADDITIONAL INSTRUCTIONS:\n{extra}"),
        None => REVIEW_PROMPT.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{Decoder, Typed};
    use crate::error::SessionError;

    const REPLY: &str = r#"{
        "score": 7,
        "title": "Attention Is All You Need",
        "summary": "Introduces the Transformer.",
        "strengths": ["Simple architecture"],
        "weaknesses": ["Quadratic attention cost"],
        "suggestions": ["Discuss long inputs"]
    }"#;

    #[test]
    fn decodes_and_serializes_in_schema_order() {
        let review = Typed::<Review>::new().decode(REPLY).unwrap();
        assert_eq!(review.score, 7);

        let json = serde_json::to_string(&review).unwrap();
        assert!(json.starts_with(r#"{"title":"Attention Is All You Need","summary""#));
        assert!(json.ends_with(r#""score":7}"#));

        let back: Review = serde_json::from_str(&json).unwrap();
        assert_eq!(back, review);
    }

    #[test]
    fn rejects_out_of_range_scores() {
        let reply = REPLY.replace("\"score\": 7", "\"score\": 0");
        let err = Typed::<Review>::new().decode(&reply).unwrap_err();
        assert!(matches!(err, SessionError::SchemaValidation { .. }));
    }

    #[test]
    fn prompt_appends_extra_instructions() {
        assert_eq!(review_prompt(None), REVIEW_PROMPT);
        assert_eq!(review_prompt(Some("   ")), REVIEW_PROMPT);
        assert!(review_prompt(Some("Focus on methodology")).ends_with("Focus on methodology"));
    }
}
