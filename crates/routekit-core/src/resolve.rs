//! Parameter resolution
//!
//! Turns one [`ParamMetadata`] and the request context into one argument.
//! Resolution order for value parameters:
//!
//! 1. read the raw value from its section (route, query, header, cookie,
//!    session, body)
//! 2. treat `null`, missing and `""` as absent; absent + required fails
//! 3. `parse_json` decodes string values
//! 4. the declared shape coerces (and for typed shapes validates) the value

use crate::auth::CurrentUserChecker;
use crate::config::{RoutingConfig, ValidationPolicy};
use crate::context::RequestContext;
use crate::error::HttpError;
use crate::handler::{Argument, Arguments};
use crate::metadata::{ParamKind, ParamMetadata};
use routekit_validate::{CoerceOptions, ValidationError};
use serde_json::Value;
use std::sync::Arc;

/// Resolves action parameters from a request context.
#[derive(Clone)]
pub struct ParamResolver {
    config: Arc<RoutingConfig>,
    current_user: Option<Arc<dyn CurrentUserChecker>>,
}

/// One resolved argument plus violations kept under `ValidationPolicy::Attach`.
type Resolved = (Argument, Option<ValidationError>);

impl ParamResolver {
    pub fn new(config: Arc<RoutingConfig>) -> Self {
        Self {
            config,
            current_user: None,
        }
    }

    pub fn with_current_user_checker(mut self, checker: Arc<dyn CurrentUserChecker>) -> Self {
        self.current_user = Some(checker);
        self
    }

    /// Resolve every parameter, in index order. The first failure wins.
    pub async fn resolve_all(
        &self,
        params: &[ParamMetadata],
        ctx: &RequestContext,
    ) -> Result<Arguments, HttpError> {
        let mut values = Vec::with_capacity(params.len());
        let mut violations = Vec::new();
        for param in params {
            let (argument, attached) = self.resolve_one(param, ctx).await?;
            if let Some(errors) = attached {
                violations.push((param.index, errors));
            }
            values.push(argument);
        }
        Ok(Arguments::new(values).with_violations(violations))
    }

    /// Resolve a single parameter.
    pub async fn resolve(
        &self,
        param: &ParamMetadata,
        ctx: &RequestContext,
    ) -> Result<Argument, HttpError> {
        self.resolve_one(param, ctx).await.map(|(argument, _)| argument)
    }

    async fn resolve_one(
        &self,
        param: &ParamMetadata,
        ctx: &RequestContext,
    ) -> Result<Resolved, HttpError> {
        let name = param.name.as_deref().unwrap_or_default();
        let raw = match param.kind {
            ParamKind::Request => return Ok((Argument::Request(ctx.head().clone()), None)),
            ParamKind::Response => return Ok((Argument::Response(ctx.response().clone()), None)),
            ParamKind::UploadedFile | ParamKind::UploadedFiles => {
                return self.resolve_upload(param, name, ctx).map(|a| (a, None))
            }
            ParamKind::CurrentUser => return self.resolve_current_user(param, ctx).await,
            ParamKind::Param => ctx.route_param(name).map(|v| Value::String(v.to_string())),
            ParamKind::Query => ctx.query(name),
            ParamKind::Queries => Some(ctx.queries()),
            ParamKind::Header => ctx.header(name),
            ParamKind::Headers => Some(ctx.header_map()),
            ParamKind::Cookie => ctx.cookie(name).map(|v| Value::String(v.to_string())),
            ParamKind::Cookies => Some(ctx.cookie_map()),
            ParamKind::Session => ctx.session_value(name).cloned(),
            ParamKind::Body => ctx.body().cloned(),
            ParamKind::BodyParam => ctx.body_field(name).cloned(),
        };

        let value = match raw {
            Some(value) if !is_empty(param.kind, &value) => value,
            _ if param.required => {
                return Err(HttpError::param_required(param.kind, param.name.as_deref()))
            }
            _ => return Ok((Argument::Undefined, None)),
        };

        let value = match value {
            Value::String(text) if param.parse_json => serde_json::from_str(&text)
                .map_err(|e| HttpError::parse_param(param_label(param), e))?,
            other => other,
        };

        let options = CoerceOptions {
            transform: param.transform.unwrap_or(self.config.class_transformer),
            validate: self.config.validation.enabled,
        };
        match param.shape.coerce(value.clone(), options) {
            Ok(coerced) => Ok((Argument::Value(coerced), None)),
            Err(errors) if self.config.validation.policy == ValidationPolicy::Attach => {
                crate::trace_debug!(param = param_label(param), "attaching parameter violations");
                Ok((Argument::Value(value), Some(errors.nested_under(param_label(param)))))
            }
            Err(errors) => Err(HttpError::param_validation(param.name.as_deref(), errors)),
        }
    }

    fn resolve_upload(
        &self,
        param: &ParamMetadata,
        name: &str,
        ctx: &RequestContext,
    ) -> Result<Argument, HttpError> {
        let files = ctx.files_named(name);
        if files.is_empty() {
            if param.required {
                return Err(HttpError::param_required(param.kind, Some(name)));
            }
            return Ok(Argument::Undefined);
        }

        let single = param.kind == ParamKind::UploadedFile;
        if let Some(options) = &param.upload {
            options
                .check(&files, single)
                .map_err(|errors| HttpError::param_validation(Some(name), errors))?;
        }

        let mut files = files;
        Ok(if single {
            // the first part sent under the field name wins
            Argument::File(files.swap_remove(0))
        } else {
            Argument::Files(files)
        })
    }

    async fn resolve_current_user(
        &self,
        param: &ParamMetadata,
        ctx: &RequestContext,
    ) -> Result<Resolved, HttpError> {
        let user = match &self.current_user {
            Some(checker) => checker.current_user(ctx).await?,
            None if param.required => {
                return Err(HttpError::unhandled(
                    "CurrentUser parameter declared but no current user checker is configured",
                ))
            }
            None => None,
        };
        match user {
            Some(user) if !user.is_null() => Ok((Argument::Value(user), None)),
            _ if param.required => Err(HttpError::authorization_required(
                "Authorization is required for request",
            )),
            _ => Ok((Argument::Undefined, None)),
        }
    }
}

fn param_label(param: &ParamMetadata) -> &str {
    param.name.as_deref().unwrap_or("body")
}

/// Whether a raw value counts as absent for `required` purposes.
fn is_empty(kind: ParamKind, value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Object(map) => kind == ParamKind::Body && map.is_empty(),
        _ => false,
    }
}
