//! The action execution pipeline
//!
//! ```text
//! authorize → before-chain → resolve params → invoke → interceptors
//!     → after-chain → map response
//! ```
//!
//! A failure at any stage goes to the error chain and then, if nothing has
//! answered yet, to the fallback mapping. [`ActionExecutor::execute`] always
//! produces a response.

use crate::auth::{AuthorizationChecker, CurrentUserChecker};
use crate::config::RoutingConfig;
use crate::context::RequestContext;
use crate::error::HttpError;
use crate::interceptor::intercept_all;
use crate::metadata::ActionMetadata;
use crate::middleware::{run_error_chain, run_steps};
use crate::resolve::ParamResolver;
use crate::response::{OutgoingResponse, ResponseMapper, ViewRenderer};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::Instrument;

/// Runs matched actions.
#[derive(Clone)]
pub struct ActionExecutor {
    config: Arc<RoutingConfig>,
    resolver: ParamResolver,
    mapper: ResponseMapper,
    authorization: Option<Arc<dyn AuthorizationChecker>>,
    current_user: Option<Arc<dyn CurrentUserChecker>>,
}

impl ActionExecutor {
    pub fn new(config: Arc<RoutingConfig>) -> Self {
        Self {
            resolver: ParamResolver::new(Arc::clone(&config)),
            mapper: ResponseMapper::new(Arc::clone(&config)),
            config,
            authorization: None,
            current_user: None,
        }
    }

    pub fn with_authorization_checker(mut self, checker: Arc<dyn AuthorizationChecker>) -> Self {
        self.authorization = Some(checker);
        self
    }

    pub fn with_current_user_checker(mut self, checker: Arc<dyn CurrentUserChecker>) -> Self {
        self.resolver = self.resolver.with_current_user_checker(Arc::clone(&checker));
        self.current_user = Some(checker);
        self
    }

    pub fn with_view_renderer(mut self, renderer: Arc<dyn ViewRenderer>) -> Self {
        self.mapper = self.mapper.with_renderer(renderer);
        self
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Run `action` for one request.
    pub async fn execute(&self, action: &ActionMetadata, ctx: RequestContext) -> OutgoingResponse {
        let span = tracing::info_span!(
            "action",
            action = %action.qualified_name(),
            method = %action.verb,
            path = %ctx.path(),
            request_id = %ctx.request_id()
        );
        self.run(action, ctx).instrument(span).await
    }

    /// Fallback rendering for failures that never reached an action
    /// (unmatched routes, unreadable bodies).
    pub fn render_error(&self, err: &HttpError, request_id: Option<&str>) -> OutgoingResponse {
        log_failure(err);
        self.mapper.map_error(err, request_id)
    }

    async fn run(&self, action: &ActionMetadata, mut ctx: RequestContext) -> OutgoingResponse {
        match self.pipeline(action, &mut ctx).await {
            Ok(response) => response,
            Err(err) => self.fail(action, err, &mut ctx).await,
        }
    }

    async fn pipeline(
        &self,
        action: &ActionMetadata,
        ctx: &mut RequestContext,
    ) -> Result<OutgoingResponse, HttpError> {
        self.authorize(action, ctx).await?;

        crate::trace_trace!(stage = "before_middleware");
        if let Some(step) = run_steps(&action.before, ctx).await? {
            return Err(HttpError::aborted(step));
        }

        crate::trace_trace!(stage = "resolving_params");
        let args = self.resolver.resolve_all(&action.params, ctx).await?;

        crate::trace_trace!(stage = "invoking");
        let handler = action.handler.clone();
        let output = AssertUnwindSafe(async move { handler.call(args).await })
            .catch_unwind()
            .await
            .map_err(|panic| HttpError::unhandled(panic_message(&*panic)))??;

        let output = intercept_all(&action.interceptors, ctx, output).await?;

        crate::trace_trace!(stage = "after_middleware");
        run_steps(&action.after, ctx).await?;

        crate::trace_trace!(stage = "mapping_response");
        self.mapper.map(action, output, ctx.response())
    }

    async fn authorize(&self, action: &ActionMetadata, ctx: &RequestContext) -> Result<(), HttpError> {
        let Some(roles) = &action.roles else {
            return Ok(());
        };
        let Some(checker) = &self.authorization else {
            return Err(HttpError::unhandled("authorization checker not configured"));
        };
        if checker.check(ctx, roles).await? {
            return Ok(());
        }

        let anonymous = match &self.current_user {
            Some(users) => users.current_user(ctx).await?.map_or(true, |u| u.is_null()),
            None => false,
        };
        Err(if anonymous {
            HttpError::authorization_required("Authorization is required for request")
        } else {
            HttpError::forbidden("Access is denied")
        })
    }

    async fn fail(
        &self,
        action: &ActionMetadata,
        err: HttpError,
        ctx: &mut RequestContext,
    ) -> OutgoingResponse {
        log_failure(&err);

        run_error_chain(&action.error, &err, ctx).await;
        if let Some(sent) = ctx.response().take_sent() {
            return sent;
        }

        if action.error.is_empty() || self.config.default_error_handler {
            self.mapper.map_error(&err, Some(ctx.request_id()))
        } else {
            OutgoingResponse::new(err.status)
        }
    }
}

fn log_failure(err: &HttpError) {
    if err.kind.is_server_error() {
        crate::trace_error!(
            kind = err.kind.as_str(),
            status = err.status.as_u16(),
            error = %err,
            internal = err.internal_detail().unwrap_or_default(),
            "action failed"
        );
    } else {
        crate::trace_debug!(
            kind = err.kind.as_str(),
            status = err.status.as_u16(),
            error = %err,
            "action failed"
        );
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("handler panicked: {}", message)
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestHead;
    use crate::error::ErrorKind;
    use crate::handler::{ActionHandler, Arguments};
    use crate::metadata::{
        ControllerKind, ControllerRef, MiddlewareHandle, MiddlewarePhase, MiddlewareRef, ParamKind,
        ParamMetadata, ResponseAnnotations,
    };
    use crate::middleware::{error_fn, from_fn, Flow};
    use http::{Method, StatusCode};
    use routekit_validate::ValueShape;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn action(handler: ActionHandler) -> ActionMetadata {
        ActionMetadata {
            controller: ControllerRef {
                target: "VideoController".into(),
                route: "/videos".into(),
                kind: ControllerKind::Json,
                transform_response: true,
            },
            declared_by: "VideoController".into(),
            method: "list".into(),
            verb: Method::GET,
            path: "/videos".into(),
            params: vec![],
            before: vec![],
            after: vec![],
            error: vec![],
            interceptors: vec![],
            response: ResponseAnnotations::default(),
            roles: None,
            handler,
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new(RequestHead::new(Method::GET, "/videos".parse().unwrap()))
    }

    fn executor(config: RoutingConfig) -> ActionExecutor {
        ActionExecutor::new(Arc::new(config))
    }

    fn not_found() -> ActionHandler {
        ActionHandler::sync(|_args| {
            Err::<(), _>(HttpError::not_found("Videos were not found."))
        })
    }

    fn text(response: &OutgoingResponse) -> String {
        String::from_utf8(response.bytes().unwrap().to_vec()).unwrap()
    }

    #[tokio::test]
    async fn success_is_mapped() {
        let action = action(ActionHandler::sync(|_args| {
            Ok::<_, HttpError>(json!({"id": 1, "title": "About me"}))
        }));
        let response = executor(RoutingConfig::default()).execute(&action, ctx()).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.content_type(), Some("application/json"));
    }

    #[tokio::test]
    async fn failures_use_the_fallback_mapping() {
        let response = executor(RoutingConfig::default())
            .execute(&action(not_found()), ctx())
            .await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(text(&response), "Videos were not found.");
    }

    #[tokio::test]
    async fn error_middleware_answers_instead_of_fallback() {
        let mut action = action(not_found());
        action.error.push(MiddlewareRef {
            phase: MiddlewarePhase::Error,
            priority: 0,
            handle: MiddlewareHandle::Error(Arc::new(error_fn(|err, ctx| {
                ctx.response().status(err.status);
                ctx.response().send_text(format!("custom: {}", err.message))?;
                Ok(Flow::Stop)
            }))),
        });
        let response = executor(RoutingConfig::default().default_error_handler(false))
            .execute(&action, ctx())
            .await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(text(&response), "custom: Videos were not found.");
    }

    #[tokio::test]
    async fn silent_error_middleware_gets_bare_status() {
        let mut action = action(not_found());
        action.error.push(MiddlewareRef {
            phase: MiddlewarePhase::Error,
            priority: 0,
            handle: MiddlewareHandle::Error(Arc::new(error_fn(|_err, _ctx| Ok(Flow::Continue)))),
        });

        let bare = executor(RoutingConfig::default().default_error_handler(false))
            .execute(&action, ctx())
            .await;
        assert_eq!(bare.status, StatusCode::NOT_FOUND);
        assert!(bare.bytes().map_or(true, |b| b.is_empty()));

        let mapped = executor(RoutingConfig::default()).execute(&action, ctx()).await;
        assert_eq!(text(&mapped), "Videos were not found.");
    }

    #[tokio::test]
    async fn required_param_failure_skips_the_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut action = action(ActionHandler::sync(move |_args: Arguments| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, HttpError>(())
        }));
        action.params.push(ParamMetadata {
            index: 0,
            kind: ParamKind::Query,
            name: Some("page".into()),
            shape: ValueShape::Integer,
            parse_json: false,
            required: true,
            transform: None,
            upload: None,
        });
        let response = executor(RoutingConfig::default()).execute(&action, ctx()).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn before_stop_aborts() {
        let mut action = action(ActionHandler::sync(|_args| Ok::<_, HttpError>(())));
        action.before.push(MiddlewareRef {
            phase: MiddlewarePhase::GlobalBefore,
            priority: 0,
            handle: MiddlewareHandle::Step(Arc::new(from_fn(|_ctx| Ok(Flow::Stop)).named("gate"))),
        });
        let response = executor(RoutingConfig::default()).execute(&action, ctx()).await;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn before_stop_after_writing_keeps_the_written_response() {
        let mut action = action(ActionHandler::sync(|_args| Ok::<_, HttpError>(())));
        action.before.push(MiddlewareRef {
            phase: MiddlewarePhase::GlobalBefore,
            priority: 0,
            handle: MiddlewareHandle::Step(Arc::new(from_fn(|ctx| {
                ctx.response().status(StatusCode::TOO_MANY_REQUESTS);
                ctx.response().send_text("slow down")?;
                Ok(Flow::Stop)
            }))),
        });
        let response = executor(RoutingConfig::default()).execute(&action, ctx()).await;
        assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn panics_become_unhandled() {
        let action = action(ActionHandler::sync(|_args| -> Result<(), HttpError> {
            panic!("boom")
        }));
        let response = executor(RoutingConfig::default().error_format(crate::config::ErrorFormat::Json))
            .execute(&action, ctx())
            .await;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = serde_json::from_slice(&response.bytes().unwrap()).unwrap();
        assert_eq!(body["error"]["type"], ErrorKind::Unhandled.as_str());
        assert_eq!(body["error"]["message"], "Internal Server Error");
    }

    #[tokio::test]
    async fn authorization() {
        let mut action = action(ActionHandler::sync(|_args| Ok::<_, HttpError>("secret")));
        action.roles = Some(vec!["admin".into()]);

        let unconfigured = executor(RoutingConfig::default()).execute(&action, ctx()).await;
        assert_eq!(unconfigured.status, StatusCode::INTERNAL_SERVER_ERROR);

        let checker = |ctx: &RequestContext, roles: &[String]| {
            ctx.header("x-role").and_then(|v| v.as_str().map(str::to_string))
                == roles.first().cloned()
        };
        let users = |ctx: &RequestContext| ctx.header("x-role");
        let guarded = executor(RoutingConfig::default())
            .with_authorization_checker(Arc::new(checker))
            .with_current_user_checker(Arc::new(users));

        let anonymous = guarded.execute(&action, ctx()).await;
        assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

        let mut head = RequestHead::new(Method::GET, "/videos".parse().unwrap());
        head.headers.insert("x-role", "editor".parse().unwrap());
        let denied = guarded.execute(&action, RequestContext::new(head)).await;
        assert_eq!(denied.status, StatusCode::FORBIDDEN);

        let mut head = RequestHead::new(Method::GET, "/videos".parse().unwrap());
        head.headers.insert("x-role", "admin".parse().unwrap());
        let allowed = guarded.execute(&action, RequestContext::new(head)).await;
        assert_eq!(allowed.status, StatusCode::OK);
    }
}
