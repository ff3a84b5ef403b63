//! Per-request context
//!
//! A [`RequestContext`] is what the driver hands the executor: the raw
//! request head plus every section parameters are read from, already
//! parsed. It also owns the [`ResponseWriter`] shared with `Response`
//! parameters so actions and error middlewares can answer directly.

use crate::error::{HttpError, Result};
use crate::multipart::UploadedFile;
use crate::path_params::RouteParams;
use crate::response::OutgoingResponse;
use bytes::Bytes;
use http::header::{self, HeaderName, HeaderValue};
use http::{Extensions, HeaderMap, Method, StatusCode, Uri, Version};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

/// The raw request as received, without its body.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    pub remote_addr: Option<SocketAddr>,
}

impl RequestHead {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            remote_addr: None,
        }
    }

    pub fn from_parts(parts: &http::request::Parts, remote_addr: Option<SocketAddr>) -> Self {
        Self {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            version: parts.version,
            headers: parts.headers.clone(),
            remote_addr,
        }
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }
}

#[derive(Default)]
struct WriterState {
    status: Option<StatusCode>,
    headers: HeaderMap,
    written: bool,
    response: Option<OutgoingResponse>,
}

/// Handle on the response of the current request.
///
/// Cloning shares the same slot. Headers and the status set here are pending
/// until something writes; once a response is sent, the response mapper and
/// the error fallback leave it alone.
#[derive(Clone, Default)]
pub struct ResponseWriter {
    state: Arc<Mutex<WriterState>>,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, WriterState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Status used by the next write, and by the mapper when no annotation overrides it.
    pub fn status(&self, status: StatusCode) {
        self.lock().status = Some(status);
    }

    pub fn set_header(&self, name: HeaderName, value: HeaderValue) {
        self.lock().headers.insert(name, value);
    }

    /// Parse and set a header.
    pub fn header(&self, name: &str, value: &str) -> Result<()> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| HttpError::internal("Invalid header name").with_internal(e.to_string()))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| HttpError::internal("Invalid header value").with_internal(e.to_string()))?;
        self.set_header(name, value);
        Ok(())
    }

    pub fn is_written(&self) -> bool {
        self.lock().written
    }

    /// Send a complete response. Fails if one was already sent.
    pub fn send(&self, mut response: OutgoingResponse) -> Result<()> {
        let mut state = self.lock();
        if state.written {
            return Err(HttpError::internal("Response already written"));
        }
        for (name, value) in state.headers.iter() {
            if !response.headers.contains_key(name) {
                response.headers.insert(name.clone(), value.clone());
            }
        }
        state.written = true;
        state.response = Some(response);
        Ok(())
    }

    fn pending_status(&self) -> StatusCode {
        self.lock().status.unwrap_or(StatusCode::OK)
    }

    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send(OutgoingResponse::text(self.pending_status(), text.into()))
    }

    pub fn send_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let value = serde_json::to_value(value).map_err(|e| {
            HttpError::internal("Failed to serialize response").with_internal(e.to_string())
        })?;
        self.send(OutgoingResponse::json(self.pending_status(), &value))
    }

    /// Answer with the pending status and no body.
    pub fn end(&self) -> Result<()> {
        self.send(OutgoingResponse::new(self.pending_status()))
    }

    pub fn redirect(&self, location: &str) -> Result<()> {
        let value = HeaderValue::from_str(location).map_err(|e| {
            HttpError::internal("Invalid redirect target").with_internal(e.to_string())
        })?;
        self.send(OutgoingResponse::new(StatusCode::FOUND).with_header(header::LOCATION, value))
    }

    /// The sent response, taken out of the slot.
    pub(crate) fn take_sent(&self) -> Option<OutgoingResponse> {
        self.lock().response.take()
    }

    /// Pending status and headers.
    pub(crate) fn pending(&self) -> (Option<StatusCode>, HeaderMap) {
        let state = self.lock();
        (state.status, state.headers.clone())
    }
}

impl fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ResponseWriter")
            .field("status", &state.status)
            .field("written", &state.written)
            .finish()
    }
}

/// Everything the pipeline knows about the current request.
#[derive(Debug)]
pub struct RequestContext {
    head: Arc<RequestHead>,
    request_id: String,
    params: RouteParams,
    query: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
    body: Option<Value>,
    raw_body: Bytes,
    files: Vec<UploadedFile>,
    session: Option<Map<String, Value>>,
    response: ResponseWriter,
    extensions: Extensions,
}

impl RequestContext {
    /// Context for `head`, with query string and cookies parsed.
    pub fn new(head: RequestHead) -> Self {
        let query = head
            .uri
            .query()
            .map(parse_query)
            .unwrap_or_default();
        let cookies = parse_cookies(&head.headers);
        let request_id = head
            .headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Self {
            head: Arc::new(head),
            request_id,
            params: RouteParams::new(),
            query,
            cookies,
            body: None,
            raw_body: Bytes::new(),
            files: Vec::new(),
            session: None,
            response: ResponseWriter::new(),
            extensions: Extensions::new(),
        }
    }

    pub fn with_params(mut self, params: RouteParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_raw_body(mut self, raw: Bytes) -> Self {
        self.raw_body = raw;
        self
    }

    pub fn with_files(mut self, files: Vec<UploadedFile>) -> Self {
        self.files = files;
        self
    }

    pub fn with_session(mut self, session: Map<String, Value>) -> Self {
        self.session = Some(session);
        self
    }

    /// Attach the raw body and parse it by content type.
    ///
    /// JSON bodies become the body value; url-encoded forms become an
    /// object (repeated keys as arrays); multipart forms contribute their
    /// files and an object of their text fields; `text/*` bodies become a
    /// string. Anything else is only available raw.
    pub fn with_payload(mut self, raw: Bytes) -> Result<Self> {
        if raw.is_empty() {
            return Ok(self);
        }
        let content_type = self
            .head
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if essence == "application/json" || essence.ends_with("+json") {
            let value: Value = serde_json::from_slice(&raw)?;
            self.body = Some(value);
        } else if essence == "application/x-www-form-urlencoded" {
            let pairs = serde_urlencoded::from_bytes::<Vec<(String, String)>>(&raw)
                .map_err(|e| HttpError::bad_request(format!("Invalid form body: {}", e)))?;
            self.body = Some(group(&pairs));
        } else if essence == "multipart/form-data" {
            let boundary = crate::multipart::boundary(&content_type)
                .ok_or_else(|| HttpError::bad_request("Missing multipart boundary"))?;
            let form = crate::multipart::parse(&raw, boundary)?;
            self.body = Some(group(&form.fields));
            self.files = form.files;
        } else if essence.starts_with("text/") {
            self.body = Some(Value::String(String::from_utf8_lossy(&raw).into_owned()));
        }

        self.raw_body = raw;
        Ok(self)
    }

    pub fn head(&self) -> &Arc<RequestHead> {
        &self.head
    }

    pub fn method(&self) -> &Method {
        &self.head.method
    }

    pub fn path(&self) -> &str {
        self.head.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn params(&self) -> &RouteParams {
        &self.params
    }

    /// Captured route parameter.
    pub fn route_param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// Query value; a repeated key yields an array.
    pub fn query(&self, name: &str) -> Option<Value> {
        collect_named(&self.query, name)
    }

    /// Whole query string as an object.
    pub fn queries(&self) -> Value {
        group(&self.query)
    }

    /// Header value (names are case-insensitive); a repeated header yields an array.
    pub fn header(&self, name: &str) -> Option<Value> {
        let values: Vec<Value> = self
            .head
            .headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(|v| Value::String(v.to_string()))
            .collect();
        collapse(values)
    }

    /// Every header as an object keyed by lowercase name.
    pub fn header_map(&self) -> Value {
        let pairs: Vec<(String, String)> = self
            .head
            .headers
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();
        group(&pairs)
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn cookie_map(&self) -> Value {
        Value::Object(
            self.cookies
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// One field of the parsed body, when it is an object.
    pub fn body_field(&self, name: &str) -> Option<&Value> {
        self.body.as_ref()?.as_object()?.get(name)
    }

    pub fn raw_body(&self) -> &Bytes {
        &self.raw_body
    }

    pub fn files(&self) -> &[UploadedFile] {
        &self.files
    }

    /// Files uploaded under form field `name`.
    pub fn files_named(&self, name: &str) -> Vec<UploadedFile> {
        self.files
            .iter()
            .filter(|f| f.field() == name)
            .cloned()
            .collect()
    }

    pub fn session(&self) -> Option<&Map<String, Value>> {
        self.session.as_ref()
    }

    /// Session data, created empty on first access.
    pub fn session_mut(&mut self) -> &mut Map<String, Value> {
        self.session.get_or_insert_with(Map::new)
    }

    pub fn session_value(&self, name: &str) -> Option<&Value> {
        self.session.as_ref()?.get(name)
    }

    pub fn response(&self) -> &ResponseWriter {
        &self.response
    }

    /// Request-scoped data shared between middlewares and checkers.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    match serde_urlencoded::from_str::<Vec<(String, String)>>(query) {
        Ok(pairs) => pairs,
        Err(_e) => {
            crate::trace_debug!(error = %_e, "ignoring malformed query string");
            Vec::new()
        }
    }
}

fn parse_cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|raw| {
            cookie::Cookie::split_parse(raw.to_string())
                .filter_map(|c| c.ok())
                .map(|c| (c.name().to_string(), c.value().to_string()))
                .collect::<Vec<_>>()
        })
        .collect()
}

fn collapse(mut values: Vec<Value>) -> Option<Value> {
    match values.len() {
        0 => None,
        1 => values.pop(),
        _ => Some(Value::Array(values)),
    }
}

fn collect_named(pairs: &[(String, String)], name: &str) -> Option<Value> {
    collapse(
        pairs
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| Value::String(v.clone()))
            .collect(),
    )
}

fn group(pairs: &[(String, String)]) -> Value {
    let mut map = Map::new();
    for (key, _) in pairs {
        if map.contains_key(key) {
            continue;
        }
        if let Some(v) = collect_named(pairs, key) {
            map.insert(key.clone(), v);
        }
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(uri: &str, headers: &[(&str, &str)]) -> RequestContext {
        let mut head = RequestHead::new(Method::GET, uri.parse().unwrap());
        for (k, v) in headers {
            head.headers.append(
                HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        RequestContext::new(head)
    }

    #[test]
    fn query_values() {
        let ctx = context("/blogs?page=2&tag=a&tag=b&empty=", &[]);
        assert_eq!(ctx.query("page"), Some(json!("2")));
        assert_eq!(ctx.query("tag"), Some(json!(["a", "b"])));
        assert_eq!(ctx.query("empty"), Some(json!("")));
        assert_eq!(ctx.query("missing"), None);
        assert_eq!(ctx.queries(), json!({"page": "2", "tag": ["a", "b"], "empty": ""}));
    }

    #[test]
    fn headers_and_cookies() {
        let ctx = context(
            "/",
            &[
                ("X-Token", "abc"),
                ("cookie", "session=s1; theme=dark"),
                ("x-request-id", "req-42"),
            ],
        );
        assert_eq!(ctx.header("x-token"), Some(json!("abc")));
        assert_eq!(ctx.cookie("theme"), Some("dark"));
        assert_eq!(ctx.cookie_map(), json!({"session": "s1", "theme": "dark"}));
        assert_eq!(ctx.request_id(), "req-42");
    }

    #[test]
    fn generated_request_ids_are_unique() {
        let a = context("/", &[]);
        let b = context("/", &[]);
        assert_ne!(a.request_id(), b.request_id());
    }

    #[test]
    fn body_fields() {
        let ctx = context("/", &[]).with_body(json!({"title": "hello"}));
        assert_eq!(ctx.body_field("title"), Some(&json!("hello")));
        assert_eq!(ctx.body_field("other"), None);
    }

    #[test]
    fn writer_sends_once_and_keeps_pending_headers() {
        let writer = ResponseWriter::new();
        writer.header("x-trace", "1").unwrap();
        writer.status(StatusCode::CREATED);
        assert!(!writer.is_written());

        writer.send_text("done").unwrap();
        assert!(writer.is_written());
        assert!(writer.send_text("again").is_err());

        let sent = writer.take_sent().unwrap();
        assert_eq!(sent.status, StatusCode::CREATED);
        assert_eq!(sent.headers["x-trace"], "1");
        assert!(writer.is_written());
    }

    #[test]
    fn clones_share_the_slot() {
        let writer = ResponseWriter::new();
        let handle = writer.clone();
        handle.end().unwrap();
        assert!(writer.is_written());
    }

    #[test]
    fn payload_is_parsed_by_content_type() {
        let json_ctx = context("/", &[("content-type", "application/json; charset=utf-8")])
            .with_payload(Bytes::from_static(br#"{"title":"a"}"#))
            .unwrap();
        assert_eq!(json_ctx.body(), Some(&json!({"title": "a"})));

        let form = context("/", &[("content-type", "application/x-www-form-urlencoded")])
            .with_payload(Bytes::from_static(b"tag=a&tag=b&title=x"))
            .unwrap();
        assert_eq!(form.body(), Some(&json!({"tag": ["a", "b"], "title": "x"})));

        let text = context("/", &[("content-type", "text/plain")])
            .with_payload(Bytes::from_static(b"hi"))
            .unwrap();
        assert_eq!(text.body(), Some(&json!("hi")));

        let raw = context("/", &[("content-type", "application/octet-stream")])
            .with_payload(Bytes::from_static(b"\x00\x01"))
            .unwrap();
        assert_eq!(raw.body(), None);
        assert_eq!(raw.raw_body().len(), 2);
    }

    #[test]
    fn broken_json_is_a_bad_request() {
        let err = context("/", &[("content-type", "application/json")])
            .with_payload(Bytes::from_static(b"{nope"))
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
