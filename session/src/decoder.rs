use crate::error::SessionError;
use crate::schema::SchemaDescriptor;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::marker::PhantomData;
use std::sync::OnceLock;

/// Turns the raw reply of a query into a caller-facing value.
///
/// A decoder that returns a response schema asks the remote for JSON output;
/// one that returns `None` asks for free text.
pub trait Decoder {
    type Output;

    fn response_schema(&self) -> Option<Value>;

    fn decode(&self, raw: &str) -> Result<Self::Output, SessionError>;
}

/// Free text, returned exactly as the remote produced it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Text;

impl Decoder for Text {
    type Output = String;

    fn response_schema(&self) -> Option<Value> {
        None
    }

    fn decode(&self, raw: &str) -> Result<String, SessionError> {
        Ok(raw.to_string())
    }
}

/// Structured reply whose shape is only known at runtime.
#[derive(Debug, Clone)]
pub struct Structured(pub SchemaDescriptor);

impl Decoder for Structured {
    type Output = Map<String, Value>;

    fn response_schema(&self) -> Option<Value> {
        Some(self.0.to_response_schema())
    }

    fn decode(&self, raw: &str) -> Result<Map<String, Value>, SessionError> {
        let value = parse_json(raw)?;
        self.0
            .validate(&value)
            .map_err(|reason| SessionError::schema(reason, raw))
    }
}

/// A Rust type that can describe the structured reply it deserializes from.
pub trait StructuredOutput: DeserializeOwned {
    fn schema() -> SchemaDescriptor;

    /// Checks constraints the descriptor cannot express (ranges, non-empty
    /// strings, ...).
    fn check(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Structured reply decoded into a concrete type.
pub struct Typed<T>(PhantomData<fn() -> T>);

impl<T> Typed<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for Typed<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: StructuredOutput> Decoder for Typed<T> {
    type Output = T;

    fn response_schema(&self) -> Option<Value> {
        Some(T::schema().to_response_schema())
    }

    fn decode(&self, raw: &str) -> Result<T, SessionError> {
        let value = parse_json(raw)?;
        let fields = T::schema()
            .validate(&value)
            .map_err(|reason| SessionError::schema(reason, raw))?;
        let output: T = serde_json::from_value(Value::Object(fields))
            .map_err(|e| SessionError::schema(e.to_string(), raw))?;
        output
            .check()
            .map_err(|reason| SessionError::schema(reason, raw))?;
        Ok(output)
    }
}

fn parse_json(raw: &str) -> Result<Value, SessionError> {
    serde_json::from_str(strip_code_fence(raw))
        .map_err(|e| SessionError::schema(format!("reply is not valid JSON: {e}"), raw))
}

/// Removes a single Markdown code fence wrapping the whole reply, if any.
pub fn strip_code_fence(raw: &str) -> &str {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let re = FENCE.get_or_init(|| {
        Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n?```\s*$")
            .expect("fence pattern is valid")
    });
    match re.captures(raw).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => raw,
    }
}
