use super::{ActionOutput, OutgoingResponse, ResponseBody};
use crate::config::{ErrorFormat, RoutingConfig, TransformOptions};
use crate::context::ResponseWriter;
use crate::error::{ErrorResponse, HttpError, Result};
use crate::metadata::{ActionMetadata, ControllerKind};
use bytes::Bytes;
use http::header::{self, HeaderName, HeaderValue};
use http::StatusCode;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Renders a named template with the action result as data.
pub trait ViewRenderer: Send + Sync + 'static {
    fn render(&self, template: &str, data: &Value) -> Result<String>;
}

/// Drop excluded keys at every depth, then keep only exposed keys of
/// top-level objects.
pub fn apply_transform(value: Value, options: &TransformOptions) -> Value {
    let value = strip(value, options);
    match (&options.expose, value) {
        (Some(expose), Value::Object(map)) => Value::Object(keep(map, expose)),
        (Some(expose), Value::Array(items)) => Value::Array(
            items
                .into_iter()
                .map(|item| match item {
                    Value::Object(map) => Value::Object(keep(map, expose)),
                    other => other,
                })
                .collect(),
        ),
        (_, value) => value,
    }
}

fn strip(value: Value, options: &TransformOptions) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| {
                    !options.exclude.iter().any(|e| e == key)
                        && !options
                            .exclude_prefixes
                            .iter()
                            .any(|p| key.starts_with(p.as_str()))
                })
                .map(|(key, v)| (key, strip(v, options)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(|v| strip(v, options)).collect()),
        other => other,
    }
}

fn keep(map: Map<String, Value>, expose: &[String]) -> Map<String, Value> {
    map.into_iter()
        .filter(|(key, _)| expose.iter().any(|e| e == key))
        .collect()
}

/// Replace `:key` placeholders in a redirect target with fields of `data`.
fn fill_placeholders(target: &str, data: &Map<String, Value>) -> String {
    let mut keys: Vec<&String> = data.keys().collect();
    // longest first so `:id` does not clobber `:id_2`
    keys.sort_by_key(|k| std::cmp::Reverse(k.len()));
    let mut url = target.to_string();
    for key in keys {
        let replacement = match &data[key.as_str()] {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        url = url.replace(&format!(":{}", key), &replacement);
    }
    url
}

fn status_from(code: u16) -> Result<StatusCode> {
    StatusCode::from_u16(code).map_err(|_| {
        HttpError::internal("Invalid response status").with_internal(format!("status {}", code))
    })
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| HttpError::internal("Invalid header value").with_internal(e.to_string()))
}

/// Turns action results and failures into outgoing responses.
#[derive(Clone)]
pub struct ResponseMapper {
    config: Arc<RoutingConfig>,
    renderer: Option<Arc<dyn ViewRenderer>>,
}

impl ResponseMapper {
    pub fn new(config: Arc<RoutingConfig>) -> Self {
        Self {
            config,
            renderer: None,
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn ViewRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Map a successful result. A response already sent through `writer` is
    /// returned untouched.
    pub fn map(
        &self,
        action: &ActionMetadata,
        output: ActionOutput,
        writer: &ResponseWriter,
    ) -> Result<OutgoingResponse> {
        if let Some(sent) = writer.take_sent() {
            return Ok(sent);
        }

        let annotations = &action.response;
        let (pending_status, pending_headers) = writer.pending();
        let explicit = annotations.status.or(pending_status);

        let mut response = if let Some(target) = &annotations.redirect {
            let location = match &output {
                ActionOutput::Text(url) => url.clone(),
                ActionOutput::Json(Value::Object(data)) => fill_placeholders(target, data),
                _ => target.clone(),
            };
            let status = explicit
                .filter(StatusCode::is_redirection)
                .unwrap_or(StatusCode::FOUND);
            OutgoingResponse::new(status).with_header(header::LOCATION, header_value(&location)?)
        } else if let Some(template) = &annotations.template {
            let renderer = self.renderer.as_ref().ok_or_else(|| {
                HttpError::unhandled(format!(
                    "template '{}' requested but no view renderer is configured",
                    template
                ))
            })?;
            let data = match output {
                ActionOutput::Json(value) => value,
                ActionOutput::Text(s) | ActionOutput::Html(s) => Value::String(s),
                _ => Value::Object(Map::new()),
            };
            let html = renderer.render(template, &data)?;
            OutgoingResponse::new(explicit.unwrap_or(StatusCode::OK))
                .with_header(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/html; charset=utf-8"),
                )
                .with_body(ResponseBody::Full(Bytes::from(html)))
        } else {
            self.map_output(action, output, explicit)?
        };

        if let Some(content_type) = &annotations.content_type {
            if !matches!(response.body, ResponseBody::Empty) {
                response
                    .headers
                    .insert(header::CONTENT_TYPE, header_value(content_type)?);
            }
        }
        if let Some(location) = &annotations.location {
            response
                .headers
                .insert(header::LOCATION, header_value(location)?);
        }
        for (name, value) in &annotations.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                HttpError::internal("Invalid header name").with_internal(e.to_string())
            })?;
            response.headers.insert(name, header_value(value)?);
        }
        for (name, value) in pending_headers.iter() {
            if !response.headers.contains_key(name) {
                response.headers.insert(name.clone(), value.clone());
            }
        }

        Ok(response)
    }

    fn map_output(
        &self,
        action: &ActionMetadata,
        output: ActionOutput,
        explicit: Option<StatusCode>,
    ) -> Result<OutgoingResponse> {
        let annotations = &action.response;
        let defaults = &self.config.defaults;
        let ok = explicit.unwrap_or(StatusCode::OK);

        let response = match output {
            ActionOutput::Undefined => {
                let status = match (annotations.undefined_status, defaults.undefined_result_code) {
                    (Some(status), _) => status,
                    (None, Some(code)) => status_from(code)?,
                    (None, None) => ok,
                };
                OutgoingResponse::new(status)
            }
            ActionOutput::Null => {
                let status = match (annotations.null_status, defaults.null_result_code) {
                    (Some(status), _) => status,
                    (None, Some(code)) => status_from(code)?,
                    (None, None) => explicit.unwrap_or(StatusCode::NO_CONTENT),
                };
                OutgoingResponse::new(status)
            }
            ActionOutput::Json(value) => {
                let value = if action.controller.transform_response && !self.config.transform.is_noop() {
                    apply_transform(value, &self.config.transform)
                } else {
                    value
                };
                OutgoingResponse::json(ok, &value)
            }
            ActionOutput::Text(text) => {
                let encode = action.controller.kind == ControllerKind::Json
                    && annotations.content_type.is_none();
                if encode {
                    OutgoingResponse::json(ok, &Value::String(text))
                } else {
                    OutgoingResponse::text(ok, text)
                }
            }
            ActionOutput::Html(html) => OutgoingResponse::new(ok)
                .with_header(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/html; charset=utf-8"),
                )
                .with_body(ResponseBody::Full(Bytes::from(html))),
            ActionOutput::Bytes(bytes) => OutgoingResponse::new(ok)
                .with_header(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/octet-stream"),
                )
                .with_body(ResponseBody::Full(bytes)),
            ActionOutput::Stream(stream) => {
                OutgoingResponse::new(ok).with_body(ResponseBody::Stream(stream))
            }
        };
        Ok(response)
    }

    /// Built-in status + message answer for a failure.
    pub fn map_error(&self, err: &HttpError, request_id: Option<&str>) -> OutgoingResponse {
        let expose = self.config.expose_internal_errors;
        if err.fields.is_some() || self.config.error_format == ErrorFormat::Json {
            match serde_json::to_value(ErrorResponse::new(err, expose, request_id)) {
                Ok(body) => return OutgoingResponse::json(err.status, &body),
                Err(_e) => {
                    crate::trace_error!(error = %_e, "failed to serialize error envelope");
                }
            }
        }
        OutgoingResponse::text(err.status, err.public_message(expose))
    }
}
