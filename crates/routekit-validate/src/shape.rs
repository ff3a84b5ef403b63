//! Expected value shapes for action parameters.
//!
//! A parameter declares the shape its value should take. Raw request values
//! mostly arrive as strings (query, headers, cookies, route params), so
//! primitive shapes normalize strings into typed JSON values. Typed shapes
//! deserialize into a Rust type, optionally validate it, and re-serialize so
//! the result can travel in a type-erased argument list.

use crate::error::{FieldError, ValidationError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Number, Value};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Options controlling how a value is coerced into its shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoerceOptions {
    /// Deserialize typed shapes (primitive normalization always happens)
    pub transform: bool,
    /// Run validation rules on typed shapes
    pub validate: bool,
}

impl Default for CoerceOptions {
    fn default() -> Self {
        Self {
            transform: true,
            validate: true,
        }
    }
}

/// Type-erased coercion into a concrete Rust type.
pub trait ShapeCoercer: Send + Sync + 'static {
    /// Name of the target type, used in messages and fingerprints.
    fn type_name(&self) -> &'static str;

    /// Deserialize `value` into the target type, validate it when asked,
    /// and hand back its serialized form.
    fn apply(&self, value: Value, validate: bool) -> Result<Value, ValidationError>;
}

struct Typed<T> {
    validator: Option<fn(&T) -> Result<(), ValidationError>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ShapeCoercer for Typed<T>
where
    T: DeserializeOwned + Serialize + 'static,
{
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn apply(&self, value: Value, validate: bool) -> Result<Value, ValidationError> {
        let typed: T = serde_json::from_value(value).map_err(|e| {
            ValidationError::field(
                "",
                "shape",
                format!("Expected a value of type {}: {}", self.type_name(), e),
            )
        })?;

        if validate {
            if let Some(check) = self.validator {
                check(&typed)?;
            }
        }

        serde_json::to_value(&typed).map_err(|e| {
            ValidationError::field("", "shape", format!("Could not serialize value: {}", e))
        })
    }
}

/// The expected shape of a parameter value.
#[derive(Clone, Default)]
pub enum ValueShape {
    /// No coercion
    #[default]
    Any,
    String,
    Integer,
    Number,
    Boolean,
    /// Any JSON object
    Object,
    /// A list; a single scalar is promoted to a one-element list
    Array(Box<ValueShape>),
    /// A concrete Rust type
    Typed(Arc<dyn ShapeCoercer>),
}

impl ValueShape {
    /// Shape backed by a validated Rust type.
    pub fn of<T>() -> Self
    where
        T: DeserializeOwned + Serialize + validator::Validate + 'static,
    {
        Self::Typed(Arc::new(Typed::<T> {
            validator: Some(|value: &T| crate::CheckRules::check_rules(value)),
            _marker: PhantomData,
        }))
    }

    /// Shape backed by a Rust type without validation rules.
    pub fn deserialize<T>() -> Self
    where
        T: DeserializeOwned + Serialize + 'static,
    {
        Self::Typed(Arc::new(Typed::<T> {
            validator: None,
            _marker: PhantomData,
        }))
    }

    /// A list of `inner`.
    pub fn array(inner: ValueShape) -> Self {
        Self::Array(Box::new(inner))
    }

    /// Stable textual name of the shape.
    pub fn name(&self) -> String {
        match self {
            Self::Any => "any".to_string(),
            Self::String => "string".to_string(),
            Self::Integer => "integer".to_string(),
            Self::Number => "number".to_string(),
            Self::Boolean => "boolean".to_string(),
            Self::Object => "object".to_string(),
            Self::Array(inner) => format!("array<{}>", inner.name()),
            Self::Typed(coercer) => coercer.type_name().to_string(),
        }
    }

    /// Coerce a raw value into this shape.
    ///
    /// Violations are reported with an empty field path; callers nest them
    /// under the parameter name.
    pub fn coerce(&self, value: Value, options: CoerceOptions) -> Result<Value, ValidationError> {
        match self {
            Self::Any => Ok(value),
            Self::String => match value {
                Value::String(_) => Ok(value),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                other => Err(type_mismatch("a string", &other)),
            },
            Self::Integer => match value {
                Value::Number(ref n) if n.is_i64() || n.is_u64() => Ok(value),
                Value::String(ref s) => s
                    .trim()
                    .parse::<i64>()
                    .map(|n| Value::Number(n.into()))
                    .map_err(|_| type_mismatch("an integer", &value)),
                other => Err(type_mismatch("an integer", &other)),
            },
            Self::Number => match value {
                Value::Number(_) => Ok(value),
                Value::String(ref s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| type_mismatch("a number", &value)),
                other => Err(type_mismatch("a number", &other)),
            },
            Self::Boolean => match value {
                Value::Bool(_) => Ok(value),
                Value::String(ref s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" => Ok(Value::Bool(true)),
                    "false" | "0" => Ok(Value::Bool(false)),
                    _ => Err(type_mismatch("a boolean", &value)),
                },
                Value::Number(ref n) => match n.as_i64() {
                    Some(1) => Ok(Value::Bool(true)),
                    Some(0) => Ok(Value::Bool(false)),
                    _ => Err(type_mismatch("a boolean", &value)),
                },
                other => Err(type_mismatch("a boolean", &other)),
            },
            Self::Object => match value {
                Value::Object(_) => Ok(value),
                other => Err(type_mismatch("an object", &other)),
            },
            Self::Array(inner) => {
                let items = match value {
                    Value::Array(items) => items,
                    scalar => vec![scalar],
                };
                let mut coerced = Vec::with_capacity(items.len());
                let mut errors = ValidationError::new(Vec::new());
                for (index, item) in items.into_iter().enumerate() {
                    match inner.coerce(item, options) {
                        Ok(v) => coerced.push(v),
                        Err(e) => errors
                            .fields
                            .extend(e.nested_under(&format!("[{}]", index)).fields),
                    }
                }
                if errors.is_empty() {
                    Ok(Value::Array(coerced))
                } else {
                    Err(errors)
                }
            }
            Self::Typed(coercer) => {
                if options.transform {
                    coercer.apply(value, options.validate)
                } else {
                    Ok(value)
                }
            }
        }
    }
}

impl fmt::Debug for ValueShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueShape({})", self.name())
    }
}

impl PartialEq for ValueShape {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

fn type_mismatch(expected: &str, actual: &Value) -> ValidationError {
    let found = match actual {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    ValidationError::new(vec![FieldError::new(
        "",
        "type",
        format!("Expected {}, found {}", expected, found),
    )
    .with_param("expected", expected)])
}
