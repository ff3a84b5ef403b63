//! Validation error types and JSON error format.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single field violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field path that failed validation (nested fields use dots: "address.city")
    pub field: String,
    /// The rule code (e.g., "email", "length", "type", "required")
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional rule parameters (e.g., min/max values)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<HashMap<String, serde_json::Value>>,
}

impl FieldError {
    /// Create a new field error.
    pub fn new(
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
            params: None,
        }
    }

    /// Attach a rule parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Prefix the field path, turning `city` into `address.city`.
    pub fn nested_under(mut self, parent: &str) -> Self {
        self.field = if self.field.is_empty() {
            parent.to_string()
        } else if self.field.starts_with('[') {
            format!("{}{}", parent, self.field)
        } else {
            format!("{}.{}", parent, self.field)
        };
        self
    }
}

#[derive(Serialize, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
    fields: Vec<FieldError>,
}

#[derive(Serialize, Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

/// Validation error containing every collected field violation.
///
/// Serializes to the standard error envelope:
///
/// ```json
/// {
///   "error": {
///     "type": "validation_error",
///     "message": "Validation failed",
///     "fields": [...]
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}: {} field error(s)", .fields.len())]
pub struct ValidationError {
    /// Collected field violations
    pub fields: Vec<FieldError>,
    /// Summary message (default: "Validation failed")
    pub message: String,
}

impl ValidationError {
    /// Create a new validation error with field errors.
    pub fn new(fields: Vec<FieldError>) -> Self {
        Self {
            fields,
            message: "Validation failed".to_string(),
        }
    }

    /// Create a validation error with a custom message.
    pub fn with_message(fields: Vec<FieldError>, message: impl Into<String>) -> Self {
        Self {
            fields,
            message: message.into(),
        }
    }

    /// Create a validation error for a single field.
    pub fn field(
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(vec![FieldError::new(field, code, message)])
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Add a field error.
    pub fn add(&mut self, error: FieldError) {
        self.fields.push(error);
    }

    /// Re-root every field path under `parent`.
    pub fn nested_under(self, parent: &str) -> Self {
        Self {
            fields: self
                .fields
                .into_iter()
                .map(|f| f.nested_under(parent))
                .collect(),
            message: self.message,
        }
    }

    /// Convert validator errors to our format, flattening nested structs and lists.
    pub fn from_validator_errors(errors: validator::ValidationErrors) -> Self {
        let mut fields = Vec::new();
        collect_validator_errors("", &errors, &mut fields);
        Self::new(fields)
    }
}

fn collect_validator_errors(
    prefix: &str,
    errors: &validator::ValidationErrors,
    out: &mut Vec<FieldError>,
) {
    use validator::ValidationErrorsKind;

    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };

        match kind {
            ValidationErrorsKind::Field(list) => {
                for error in list {
                    let message = error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Validation failed for field '{}'", path));

                    let mut field_error = FieldError::new(&path, error.code.to_string(), message);
                    for (key, value) in &error.params {
                        if key == "value" {
                            continue;
                        }
                        if let Ok(json_value) = serde_json::to_value(value) {
                            field_error = field_error.with_param(key.to_string(), json_value);
                        }
                    }
                    out.push(field_error);
                }
            }
            ValidationErrorsKind::Struct(inner) => collect_validator_errors(&path, inner, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect_validator_errors(&format!("{}[{}]", path, index), inner, out);
                }
            }
        }
    }
}

impl Serialize for ValidationError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        ErrorWrapper {
            error: ErrorBody {
                error_type: "validation_error".to_string(),
                message: self.message.clone(),
                fields: self.fields.clone(),
            },
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ValidationError {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let wrapper = ErrorWrapper::deserialize(deserializer)?;
        Ok(Self {
            fields: wrapper.error.fields,
            message: wrapper.error.message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_error_nesting() {
        let error = FieldError::new("city", "length", "too short").nested_under("address");
        assert_eq!(error.field, "address.city");

        let root = FieldError::new("", "type", "expected an integer").nested_under("page");
        assert_eq!(root.field, "page");
    }

    #[test]
    fn validation_error_serialization() {
        let error = ValidationError::field("email", "email", "Invalid email format");

        let json = serde_json::to_value(&error).unwrap();

        assert_eq!(json["error"]["type"], "validation_error");
        assert_eq!(json["error"]["message"], "Validation failed");
        assert_eq!(json["error"]["fields"][0]["field"], "email");
    }

    #[test]
    fn validation_error_display() {
        let error = ValidationError::new(vec![
            FieldError::new("email", "email", "Invalid email"),
            FieldError::new("age", "range", "Out of range"),
        ]);

        assert_eq!(error.to_string(), "Validation failed: 2 field error(s)");
    }

    #[test]
    fn params_are_kept_on_field_errors() {
        let error = FieldError::new("title", "length", "too long").with_param("max", 20);
        let params = error.params.unwrap();
        assert_eq!(params["max"], serde_json::json!(20));
    }
}
