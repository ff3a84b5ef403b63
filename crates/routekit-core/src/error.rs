//! Error types for routekit
//!
//! Two families live here:
//!
//! - [`MetadataError`] is raised while building the route table. It is fatal:
//!   an application with inconsistent metadata never starts serving.
//! - [`HttpError`] is a per-request failure. Its [`ErrorKind`] is a closed set
//!   so the executor and the response mapper can map every failure centrally.

use crate::metadata::{MiddlewarePhase, MiddlewareTarget, ParamKind};
use http::{Method, StatusCode};
use routekit_validate::{FieldError, ValidationError};
use serde::Serialize;
use std::fmt;

/// Result type alias for request-time operations
pub type Result<T, E = HttpError> = std::result::Result<T, E>;

/// Closed set of request-time failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A required parameter was missing or empty
    ParamRequired,
    /// A `parse_json` parameter did not hold valid JSON
    ParseParam,
    /// A parameter failed shape coercion or validation rules
    ParamValidation,
    BadRequest,
    Unauthorized,
    /// A current user was required but none was available
    AuthorizationRequired,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    Conflict,
    Internal,
    /// A before-middleware stopped the chain without answering
    Aborted,
    /// Anything the action raised that was not an `HttpError`, including panics
    Unhandled,
}

impl ErrorKind {
    /// Status code used when the error does not override it.
    pub fn default_status(self) -> StatusCode {
        match self {
            Self::ParamRequired | Self::ParseParam | Self::ParamValidation | Self::BadRequest => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized | Self::AuthorizationRequired => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Internal | Self::Aborted | Self::Unhandled => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Identifier used in the JSON error envelope.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ParamRequired => "param_required",
            Self::ParseParam => "parse_param",
            Self::ParamValidation => "validation_error",
            Self::BadRequest => "bad_request",
            Self::Unauthorized => "unauthorized",
            Self::AuthorizationRequired => "authorization_required",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::Conflict => "conflict",
            Self::Internal => "internal_error",
            Self::Aborted => "aborted",
            Self::Unhandled => "unhandled_error",
        }
    }

    /// Server-side failures, logged at error level.
    pub fn is_server_error(self) -> bool {
        matches!(self, Self::Internal | Self::Aborted | Self::Unhandled)
    }

    /// Kinds whose message is replaced by a generic one in response bodies.
    /// An explicit `Internal` error keeps the message its raiser chose.
    pub fn masks_message(self) -> bool {
        matches!(self, Self::Aborted | Self::Unhandled)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request-time failure.
///
/// Actions, middlewares and checkers all fail with this type. The status
/// defaults to the one of the kind but can be overridden, so an action may
/// answer `418` while keeping the `BadRequest` kind.
#[derive(Debug, Clone)]
pub struct HttpError {
    /// Failure kind
    pub kind: ErrorKind,
    /// HTTP status code
    pub status: StatusCode,
    /// Human-readable error message
    pub message: String,
    /// Optional field-level violations
    pub fields: Option<Vec<FieldError>>,
    /// Internal details (logged, hidden from responses by default)
    pub(crate) internal: Option<String>,
}

impl HttpError {
    /// Create an error of `kind` with the kind's default status.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: kind.default_status(),
            message: message.into(),
            fields: None,
            internal: None,
        }
    }

    /// Override the status code.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Attach field violations.
    pub fn with_fields(mut self, fields: Vec<FieldError>) -> Self {
        self.fields = Some(fields);
        self
    }

    /// Add internal details (for logging, hidden from the response)
    pub fn with_internal(mut self, details: impl Into<String>) -> Self {
        self.internal = Some(details.into());
        self
    }

    /// Internal details, if any.
    pub fn internal_detail(&self) -> Option<&str> {
        self.internal.as_deref()
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// 405 listing the methods the path does accept.
    pub fn method_not_allowed(allowed: &[Method]) -> Self {
        let allowed: Vec<&str> = allowed.iter().map(Method::as_str).collect();
        Self::new(ErrorKind::MethodNotAllowed, "Method Not Allowed")
            .with_internal(format!("allowed: {}", allowed.join(", ")))
    }

    /// A required parameter was not provided.
    pub fn param_required(kind: ParamKind, name: Option<&str>) -> Self {
        let message = match name {
            Some(name) => format!("{} '{}' is required for request", kind.label(), name),
            None => format!("{} is required for request", kind.label()),
        };
        Self::new(ErrorKind::ParamRequired, message)
    }

    /// A `parse_json` parameter could not be decoded.
    pub fn parse_param(name: &str, cause: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::ParseParam,
            format!("Given parameter {} is invalid. Value cannot be parsed into JSON", name),
        )
        .with_internal(cause.to_string())
    }

    /// A parameter failed coercion or validation; violations are rooted at `name`.
    pub fn param_validation(name: Option<&str>, error: ValidationError) -> Self {
        let error = match name {
            Some(name) => error.nested_under(name),
            None => error,
        };
        let message = match name {
            Some(name) => format!("Invalid value for parameter '{}'", name),
            None => "Invalid request body".to_string(),
        };
        Self::new(ErrorKind::ParamValidation, message).with_fields(error.fields)
    }

    /// A current user was required but none was found.
    pub fn authorization_required(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthorizationRequired, message)
    }

    /// A before-middleware stopped the chain.
    pub fn aborted(step: &str) -> Self {
        Self::new(ErrorKind::Aborted, "Request processing was stopped")
            .with_internal(format!("stopped by {}", step))
    }

    /// A failure that was not raised as an `HttpError`.
    pub fn unhandled(cause: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Unhandled, "Internal Server Error").with_internal(cause.to_string())
    }

    /// Message safe to put in a response body.
    pub fn public_message(&self, expose_internal: bool) -> String {
        if expose_internal {
            if let Some(internal) = &self.internal {
                return format!("{}: {}", self.message, internal);
            }
        }
        if self.kind.masks_message() && !expose_internal {
            return "Internal Server Error".to_string();
        }
        self.message.clone()
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for HttpError {}

/// JSON representation of an error response
#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub error: ErrorBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorBody {
    #[serde(rename = "type")]
    pub error_type: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldError>>,
}

impl ErrorResponse {
    pub(crate) fn new(err: &HttpError, expose_internal: bool, request_id: Option<&str>) -> Self {
        Self {
            error: ErrorBody {
                error_type: err.kind.as_str(),
                message: err.public_message(expose_internal),
                fields: err.fields.clone(),
            },
            request_id: request_id.map(str::to_string),
        }
    }
}

impl From<serde_json::Error> for HttpError {
    fn from(err: serde_json::Error) -> Self {
        HttpError::bad_request(format!("Invalid JSON: {}", err))
    }
}

impl From<std::io::Error> for HttpError {
    fn from(err: std::io::Error) -> Self {
        HttpError::internal("I/O error").with_internal(err.to_string())
    }
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        HttpError::internal("HTTP error").with_internal(err.to_string())
    }
}

impl From<ValidationError> for HttpError {
    fn from(err: ValidationError) -> Self {
        Self::new(ErrorKind::ParamValidation, err.message.clone()).with_fields(err.fields)
    }
}

/// Build-time metadata inconsistency.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("{target}.{method}: parameter indices must be contiguous from 0, expected {expected} but found {found}")]
    NonContiguousParams {
        target: String,
        method: String,
        expected: usize,
        found: usize,
    },

    #[error("{target}.{method}: two parameters declared at index {index}")]
    DuplicateParamIndex {
        target: String,
        method: String,
        index: usize,
    },

    #[error("{target}.{method}: {kind} parameter at index {index} must not carry a name")]
    UnexpectedParamName {
        target: String,
        method: String,
        index: usize,
        kind: ParamKind,
    },

    #[error("{target}.{method}: {kind} parameter at index {index} requires a non-empty name")]
    MissingParamName {
        target: String,
        method: String,
        index: usize,
        kind: ParamKind,
    },

    #[error("parameter {index} declared for unknown action {target}.{method}")]
    OrphanParam {
        target: String,
        method: String,
        index: usize,
    },

    #[error("{descriptor} declared for unknown action {target}.{method}")]
    OrphanDescriptor {
        descriptor: &'static str,
        target: String,
        method: String,
    },

    #[error("{target}.{method}: route parameter '{name}' does not appear in route '{route}'")]
    UnknownRouteParam {
        target: String,
        method: String,
        name: String,
        route: String,
    },

    #[error("action {target}.{method} belongs to unregistered controller {target}")]
    UnknownController { target: String, method: String },

    #[error("{descriptor} bound to unregistered controller {target}")]
    UnknownControllerTarget {
        descriptor: &'static str,
        target: String,
    },

    #[error("controller {target} extends unregistered controller {parent}")]
    UnknownParent { target: String, parent: String },

    #[error("controller inheritance cycle through {target}")]
    InheritanceCycle { target: String },

    #[error("controller {target} registered twice")]
    DuplicateController { target: String },

    #[error("{verb} {path} is declared by both {existing} and {new}")]
    RouteConflict {
        verb: Method,
        path: String,
        existing: String,
        new: String,
    },

    #[error("invalid route '{route}': {source}")]
    InvalidRoute {
        route: String,
        #[source]
        source: crate::path::PathError,
    },

    #[error("route '{route}' cannot be matched: {reason}")]
    Unroutable { route: String, reason: String },

    #[error("middleware '{name}' with phase {phase:?} cannot be bound to {target}")]
    PhaseTargetMismatch {
        name: String,
        phase: MiddlewarePhase,
        target: MiddlewareTarget,
    },

    #[error("middleware '{name}' does not fit phase {phase:?}")]
    HandleMismatch {
        name: String,
        phase: MiddlewarePhase,
    },
}
