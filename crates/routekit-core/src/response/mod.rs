//! Action results and outgoing responses
//!
//! Handlers return anything implementing [`IntoActionOutput`]. The
//! [`ResponseMapper`] turns the resulting [`ActionOutput`] into an
//! [`OutgoingResponse`], which drivers translate into their native type.
//!
//! | Returned type | Output | Default content type |
//! |---------------|--------|----------------------|
//! | `()` | `Undefined` | none |
//! | `Option<T>` (`None`) | `Null` | none |
//! | `serde_json::Value` / [`Json<T>`] | `Json` | `application/json` |
//! | `String` / `&'static str` | `Text` | `text/plain; charset=utf-8` |
//! | [`Html<T>`] | `Html` | `text/html; charset=utf-8` |
//! | `Bytes` | `Bytes` | `application/octet-stream` |
//! | [`ActionOutput::stream`] | `Stream` | pass-through |

mod mapper;

pub use mapper::{apply_transform, ResponseMapper, ViewRenderer};

use crate::error::HttpError;
use bytes::Bytes;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Streaming body chunks.
pub type BodyStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

/// Result of an action, before response mapping.
pub enum ActionOutput {
    /// Nothing was returned
    Undefined,
    /// An explicit empty value
    Null,
    Json(Value),
    Text(String),
    Html(String),
    Bytes(Bytes),
    Stream(BodyStream),
}

impl ActionOutput {
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
    {
        Self::Stream(stream.boxed())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Json(_) => "json",
            Self::Text(_) => "text",
            Self::Html(_) => "html",
            Self::Bytes(_) => "bytes",
            Self::Stream(_) => "stream",
        }
    }
}

impl fmt::Debug for ActionOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(v) => f.debug_tuple("Json").field(v).finish(),
            Self::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Self::Html(s) => f.debug_tuple("Html").field(s).finish(),
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            other => f.write_str(other.kind()),
        }
    }
}

/// Conversion of handler return values.
pub trait IntoActionOutput {
    fn into_output(self) -> Result<ActionOutput, HttpError>;
}

impl IntoActionOutput for ActionOutput {
    fn into_output(self) -> Result<ActionOutput, HttpError> {
        Ok(self)
    }
}

impl IntoActionOutput for () {
    fn into_output(self) -> Result<ActionOutput, HttpError> {
        Ok(ActionOutput::Undefined)
    }
}

impl IntoActionOutput for Value {
    fn into_output(self) -> Result<ActionOutput, HttpError> {
        Ok(match self {
            Value::Null => ActionOutput::Null,
            other => ActionOutput::Json(other),
        })
    }
}

impl IntoActionOutput for String {
    fn into_output(self) -> Result<ActionOutput, HttpError> {
        Ok(ActionOutput::Text(self))
    }
}

impl IntoActionOutput for &'static str {
    fn into_output(self) -> Result<ActionOutput, HttpError> {
        Ok(ActionOutput::Text(self.to_string()))
    }
}

impl IntoActionOutput for Bytes {
    fn into_output(self) -> Result<ActionOutput, HttpError> {
        Ok(ActionOutput::Bytes(self))
    }
}

impl<T: IntoActionOutput> IntoActionOutput for Option<T> {
    fn into_output(self) -> Result<ActionOutput, HttpError> {
        match self {
            Some(inner) => inner.into_output(),
            None => Ok(ActionOutput::Null),
        }
    }
}

/// Serializable result written as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoActionOutput for Json<T> {
    fn into_output(self) -> Result<ActionOutput, HttpError> {
        serde_json::to_value(&self.0)
            .map_err(|e| {
                HttpError::internal("Failed to serialize response").with_internal(e.to_string())
            })?
            .into_output()
    }
}

/// Markup written as `text/html`.
#[derive(Debug, Clone)]
pub struct Html<T>(pub T);

impl<T: Into<String>> IntoActionOutput for Html<T> {
    fn into_output(self) -> Result<ActionOutput, HttpError> {
        Ok(ActionOutput::Html(self.0.into()))
    }
}

/// Body of an outgoing response.
pub enum ResponseBody {
    Empty,
    Full(Bytes),
    Stream(BodyStream),
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Full(bytes) => write!(f, "Full({} bytes)", bytes.len()),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Transport-neutral response produced by the pipeline.
#[derive(Debug)]
pub struct OutgoingResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl OutgoingResponse {
    /// Empty response with `status`.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: ResponseBody::Empty,
        }
    }

    pub fn text(status: StatusCode, text: String) -> Self {
        Self::new(status)
            .with_header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            )
            .with_body(ResponseBody::Full(Bytes::from(text)))
    }

    pub fn json(status: StatusCode, value: &Value) -> Self {
        Self::new(status)
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .with_body(ResponseBody::Full(Bytes::from(value.to_string())))
    }

    pub fn with_body(mut self, body: ResponseBody) -> Self {
        self.body = body;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Body bytes, unless the body is a stream.
    pub fn bytes(&self) -> Option<Bytes> {
        match &self.body {
            ResponseBody::Empty => Some(Bytes::new()),
            ResponseBody::Full(bytes) => Some(bytes.clone()),
            ResponseBody::Stream(_) => None,
        }
    }
}
