//! Schema descriptors: an ordered `field -> semantic type` declaration that is
//! rendered into the remote `responseSchema` and used to validate replies.

use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    String,
    Integer,
    Number,
    Boolean,
}

impl ScalarType {
    fn openapi_name(self) -> &'static str {
        match self {
            ScalarType::String => "STRING",
            ScalarType::Integer => "INTEGER",
            ScalarType::Number => "NUMBER",
            ScalarType::Boolean => "BOOLEAN",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            ScalarType::String => value.is_string(),
            ScalarType::Integer => value.is_i64() || value.is_u64(),
            ScalarType::Number => value.is_number(),
            ScalarType::Boolean => value.is_boolean(),
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::String => "string",
            ScalarType::Integer => "integer",
            ScalarType::Number => "number",
            ScalarType::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Scalar(ScalarType),
    Array(ScalarType),
}

impl FieldType {
    fn to_response_schema(self) -> Value {
        match self {
            FieldType::Scalar(s) => json!({ "type": s.openapi_name() }),
            FieldType::Array(s) => json!({
                "type": "ARRAY",
                "items": { "type": s.openapi_name() },
            }),
        }
    }

    fn check(self, value: &Value) -> Result<(), String> {
        match self {
            FieldType::Scalar(s) if s.matches(value) => Ok(()),
            FieldType::Array(s) => {
                let items = value
                    .as_array()
                    .ok_or_else(|| format!("expected {self}, got {}", kind_of(value)))?;
                match items.iter().position(|item| !s.matches(item)) {
                    Some(idx) => Err(format!(
                        "expected {self}, element {idx} is {}",
                        kind_of(&items[idx])
                    )),
                    None => Ok(()),
                }
            }
            FieldType::Scalar(_) => Err(format!("expected {self}, got {}", kind_of(value))),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Scalar(s) => write!(f, "{s}"),
            FieldType::Array(s) => write!(f, "{s}[]"),
        }
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, is_array) = match s.strip_suffix("[]") {
            Some(inner) => (inner, true),
            None => (s, false),
        };
        let scalar = match base.trim().to_ascii_lowercase().as_str() {
            "string" | "str" => ScalarType::String,
            "integer" | "int" => ScalarType::Integer,
            "number" | "float" => ScalarType::Number,
            "boolean" | "bool" => ScalarType::Boolean,
            other => return Err(format!("unknown field type '{other}'")),
        };
        Ok(if is_array {
            FieldType::Array(scalar)
        } else {
            FieldType::Scalar(scalar)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub ty: FieldType,
    pub required: bool,
}

/// Ordered description of the structured reply a query asks for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDescriptor {
    fields: Vec<FieldSpec>,
}

impl SchemaDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(self, name: impl Into<String>, ty: FieldType) -> Self {
        self.field(name, ty, true)
    }

    pub fn optional(self, name: impl Into<String>, ty: FieldType) -> Self {
        self.field(name, ty, false)
    }

    fn field(mut self, name: impl Into<String>, ty: FieldType, required: bool) -> Self {
        let name = name.into();
        self.fields.retain(|f| f.name != name);
        self.fields.push(FieldSpec { name, ty, required });
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parses a descriptor written as a JSON object of `"field": "type"`
    /// pairs. A trailing `?` on the type marks the field optional.
    pub fn from_json(raw: &str) -> Result<Self, String> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| format!("descriptor is not JSON: {e}"))?;
        let map = value
            .as_object()
            .ok_or_else(|| "descriptor must be a JSON object".to_string())?;

        let mut descriptor = Self::new();
        for (name, ty) in map {
            let ty = ty
                .as_str()
                .ok_or_else(|| format!("type of field '{name}' must be a string"))?
                .trim();
            let (ty, required) = match ty.strip_suffix('?') {
                Some(inner) => (inner, false),
                None => (ty, true),
            };
            let ty: FieldType = ty.parse().map_err(|e| format!("field '{name}': {e}"))?;
            descriptor = descriptor.field(name.as_str(), ty, required);
        }

        if descriptor.is_empty() {
            return Err("descriptor declares no fields".into());
        }
        Ok(descriptor)
    }

    /// Renders the OpenAPI-subset object the remote accepts as `responseSchema`.
    pub fn to_response_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            properties.insert(field.name.clone(), field.ty.to_response_schema());
        }
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();
        let ordering: Vec<&str> = self.fields.iter().map(|f| f.name.as_str()).collect();

        json!({
            "type": "OBJECT",
            "properties": properties,
            "required": required,
            "propertyOrdering": ordering,
        })
    }

    /// Checks `value` against the descriptor and returns its declared fields in
    /// declaration order. Keys the descriptor does not mention are dropped.
    pub fn validate(&self, value: &Value) -> Result<Map<String, Value>, String> {
        let object = value
            .as_object()
            .ok_or_else(|| format!("expected a JSON object, got {}", kind_of(value)))?;

        let mut out = Map::new();
        for field in &self.fields {
            match object.get(&field.name) {
                Some(Value::Null) | None if field.required => {
                    return Err(format!("missing required field '{}'", field.name));
                }
                Some(Value::Null) | None => {}
                Some(v) => {
                    field
                        .ty
                        .check(v)
                        .map_err(|e| format!("field '{}': {e}", field.name))?;
                    out.insert(field.name.clone(), v.clone());
                }
            }
        }
        Ok(out)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_descriptor_in_declaration_order() {
        let d = SchemaDescriptor::from_json(
            r#"{"title": "string", "authors": "string[]", "year": "integer?"}"#,
        )
        .unwrap();
        let names: Vec<_> = d.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["title", "authors", "year"]);
        assert_eq!(d.fields()[1].ty, FieldType::Array(ScalarType::String));
        assert!(!d.fields()[2].required);
    }

    #[test]
    fn rejects_unknown_types() {
        let err = SchemaDescriptor::from_json(r#"{"when": "date"}"#).unwrap_err();
        assert!(err.contains("unknown field type"));
        assert!(SchemaDescriptor::from_json("{}").is_err());
        assert!(SchemaDescriptor::from_json("[]").is_err());
    }

    #[test]
    fn response_schema_lists_required_and_ordering() {
        let d = SchemaDescriptor::new()
            .required("title", FieldType::Scalar(ScalarType::String))
            .optional("pages", FieldType::Scalar(ScalarType::Integer));
        let schema = d.to_response_schema();
        assert_eq!(schema["type"], "OBJECT");
        assert_eq!(schema["required"], json!(["title"]));
        assert_eq!(schema["propertyOrdering"], json!(["title", "pages"]));
        assert_eq!(schema["properties"]["pages"]["type"], "INTEGER");
    }

    #[test]
    fn validate_reorders_and_drops_unknown_keys() {
        let d = SchemaDescriptor::new()
            .required("b", FieldType::Scalar(ScalarType::Boolean))
            .required("a", FieldType::Array(ScalarType::Number));
        let out = d
            .validate(&json!({"a": [1, 2.5], "extra": 1, "b": true}))
            .unwrap();
        let keys: Vec<_> = out.keys().cloned().collect();
        assert_eq!(keys, ["b", "a"]);
    }

    #[test]
    fn validate_reports_missing_and_mistyped_fields() {
        let d = SchemaDescriptor::new().required("n", FieldType::Scalar(ScalarType::Integer));
        assert!(d.validate(&json!({})).unwrap_err().contains("missing"));
        assert!(d.validate(&json!({"n": null})).unwrap_err().contains("missing"));
        assert!(d.validate(&json!({"n": 1.5})).unwrap_err().contains("expected integer"));
        assert!(d.validate(&json!("n")).is_err());
    }
}
