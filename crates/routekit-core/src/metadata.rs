//! Descriptors and resolved metadata
//!
//! `*Args` types are what callers register in the
//! [`MetadataStorage`](crate::storage::MetadataStorage). The builder turns
//! them into the linked, immutable `*Metadata` types the executor runs.

use crate::handler::ActionHandler;
use crate::interceptor::Interceptor;
use crate::middleware::{ErrorMiddleware, Middleware};
use crate::multipart::UploadOptions;
use http::{Method, StatusCode};
use routekit_validate::ValueShape;
use std::fmt;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Controllers
// ---------------------------------------------------------------------------

/// Default response behavior of a controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ControllerKind {
    /// Strings are written as text
    #[default]
    Default,
    /// Results default to `application/json`, strings included
    Json,
}

/// A registered controller.
#[derive(Debug, Clone)]
pub struct ControllerArgs {
    pub target: String,
    pub route: String,
    pub kind: ControllerKind,
    /// Controller whose actions this one inherits
    pub extends: Option<String>,
    /// Roles required for every action, unless the action declares its own
    pub roles: Option<Vec<String>>,
    /// Apply the configured transform rules to JSON results
    pub transform_response: bool,
}

impl ControllerArgs {
    pub fn new(target: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            route: route.into(),
            kind: ControllerKind::Default,
            extends: None,
            roles: None,
            transform_response: true,
        }
    }

    /// A controller whose results default to JSON.
    pub fn json(target: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            kind: ControllerKind::Json,
            ..Self::new(target, route)
        }
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.extends = Some(parent.into());
        self
    }

    pub fn authorized<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = Some(roles.into_iter().map(Into::into).collect());
        self
    }

    pub fn transform_response(mut self, enabled: bool) -> Self {
        self.transform_response = enabled;
        self
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// A registered action. `target` and `method` are filled in by
/// [`MetadataStorage::register_action`](crate::storage::MetadataStorage::register_action).
#[derive(Debug, Clone)]
pub struct ActionArgs {
    pub target: String,
    pub method: String,
    pub verb: Method,
    pub route: String,
    pub handler: ActionHandler,
    pub roles: Option<Vec<String>>,
}

macro_rules! verb_constructors {
    ($($name:ident => $verb:ident),* $(,)?) => {
        $(
            pub fn $name(route: impl Into<String>, handler: ActionHandler) -> Self {
                Self::new(Method::$verb, route, handler)
            }
        )*
    };
}

impl ActionArgs {
    pub fn new(verb: Method, route: impl Into<String>, handler: ActionHandler) -> Self {
        Self {
            target: String::new(),
            method: String::new(),
            verb,
            route: route.into(),
            handler,
            roles: None,
        }
    }

    verb_constructors! {
        get => GET,
        post => POST,
        put => PUT,
        patch => PATCH,
        delete => DELETE,
        head => HEAD,
        options => OPTIONS,
    }

    pub fn authorized<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = Some(roles.into_iter().map(Into::into).collect());
        self
    }

    pub(crate) fn bind(mut self, target: &str, method: &str) -> Self {
        self.target = target.to_string();
        self.method = method.to_string();
        self
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Where a parameter value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// The raw request head
    Request,
    /// The response writer
    Response,
    /// A route placeholder
    Param,
    Query,
    /// The whole query string as an object
    Queries,
    Header,
    /// Every header as an object
    Headers,
    Cookie,
    /// Every cookie as an object
    Cookies,
    Session,
    /// The whole parsed body
    Body,
    /// One field of the parsed body
    BodyParam,
    UploadedFile,
    UploadedFiles,
    /// The value returned by the current-user checker
    CurrentUser,
}

impl ParamKind {
    /// Kinds that must carry a non-empty name.
    pub fn requires_name(self) -> bool {
        matches!(
            self,
            Self::Param
                | Self::Query
                | Self::Header
                | Self::Cookie
                | Self::Session
                | Self::BodyParam
                | Self::UploadedFile
                | Self::UploadedFiles
        )
    }

    /// Kinds that must not carry a name.
    pub fn forbids_name(self) -> bool {
        !self.requires_name()
    }

    /// `required` forced by the kind, if any.
    pub fn fixed_required(self) -> Option<bool> {
        match self {
            Self::Param | Self::Session => Some(true),
            Self::Request | Self::Response => Some(false),
            _ => None,
        }
    }

    /// Human-readable label used in error messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::Request => "Request",
            Self::Response => "Response",
            Self::Param => "Route parameter",
            Self::Query => "Query parameter",
            Self::Queries => "Query string",
            Self::Header => "Header",
            Self::Headers => "Headers",
            Self::Cookie => "Cookie",
            Self::Cookies => "Cookies",
            Self::Session => "Session value",
            Self::Body => "Request body",
            Self::BodyParam => "Body parameter",
            Self::UploadedFile => "Uploaded file",
            Self::UploadedFiles => "Uploaded files",
            Self::CurrentUser => "Current user",
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A registered action parameter.
///
/// ```ignore
/// storage.register_param("BlogController", "list", 0, ParamArgs::query("page").shape(ValueShape::Integer));
/// storage.register_param("BlogController", "create", 1, ParamArgs::body().required(true));
/// ```
#[derive(Debug, Clone)]
pub struct ParamArgs {
    pub target: String,
    pub method: String,
    pub index: usize,
    pub kind: ParamKind,
    pub name: Option<String>,
    pub shape: ValueShape,
    pub parse_json: bool,
    /// `None` falls back to `defaults.param_required`
    pub required: Option<bool>,
    /// Per-parameter override of `class_transformer`
    pub transform: Option<bool>,
    pub upload: Option<UploadOptions>,
}

impl ParamArgs {
    pub fn new(kind: ParamKind, name: Option<String>) -> Self {
        Self {
            target: String::new(),
            method: String::new(),
            index: 0,
            kind,
            name,
            shape: ValueShape::Any,
            parse_json: false,
            required: None,
            transform: None,
            upload: None,
        }
    }

    fn named(kind: ParamKind, name: impl Into<String>) -> Self {
        Self::new(kind, Some(name.into()))
    }

    pub fn request() -> Self {
        Self::new(ParamKind::Request, None)
    }

    pub fn response() -> Self {
        Self::new(ParamKind::Response, None)
    }

    pub fn param(name: impl Into<String>) -> Self {
        Self::named(ParamKind::Param, name)
    }

    pub fn query(name: impl Into<String>) -> Self {
        Self::named(ParamKind::Query, name)
    }

    pub fn queries() -> Self {
        Self::new(ParamKind::Queries, None)
    }

    pub fn header(name: impl Into<String>) -> Self {
        Self::named(ParamKind::Header, name)
    }

    pub fn headers() -> Self {
        Self::new(ParamKind::Headers, None)
    }

    pub fn cookie(name: impl Into<String>) -> Self {
        Self::named(ParamKind::Cookie, name)
    }

    pub fn cookies() -> Self {
        Self::new(ParamKind::Cookies, None)
    }

    pub fn session(name: impl Into<String>) -> Self {
        Self::named(ParamKind::Session, name)
    }

    pub fn body() -> Self {
        Self::new(ParamKind::Body, None)
    }

    pub fn body_param(name: impl Into<String>) -> Self {
        Self::named(ParamKind::BodyParam, name)
    }

    pub fn uploaded_file(name: impl Into<String>) -> Self {
        Self::named(ParamKind::UploadedFile, name)
    }

    pub fn uploaded_files(name: impl Into<String>) -> Self {
        Self::named(ParamKind::UploadedFiles, name)
    }

    pub fn current_user() -> Self {
        Self::new(ParamKind::CurrentUser, None)
    }

    pub fn shape(mut self, shape: ValueShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn parse_json(mut self, parse: bool) -> Self {
        self.parse_json = parse;
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }

    pub fn transform(mut self, transform: bool) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn upload(mut self, options: UploadOptions) -> Self {
        self.upload = Some(options);
        self
    }

    pub(crate) fn bind(mut self, target: &str, method: &str, index: usize) -> Self {
        self.target = target.to_string();
        self.method = method.to_string();
        self.index = index;
        self
    }
}

// ---------------------------------------------------------------------------
// Response handlers
// ---------------------------------------------------------------------------

/// A response annotation on an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseHandlerKind {
    HttpCode(StatusCode),
    ContentType(String),
    Location(String),
    Redirect(String),
    /// Template rendered by the configured view renderer
    Render(String),
    OnNull(StatusCode),
    OnUndefined(StatusCode),
    Header(String, String),
}

#[derive(Debug, Clone)]
pub struct ResponseHandlerArgs {
    pub target: String,
    pub method: String,
    pub kind: ResponseHandlerKind,
}

/// Response annotations of one action, folded from its response handlers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseAnnotations {
    pub status: Option<StatusCode>,
    pub content_type: Option<String>,
    pub location: Option<String>,
    pub redirect: Option<String>,
    pub template: Option<String>,
    pub null_status: Option<StatusCode>,
    pub undefined_status: Option<StatusCode>,
    pub headers: Vec<(String, String)>,
}

impl ResponseAnnotations {
    /// Fold handlers in registration order; later singular annotations win.
    pub(crate) fn fold<'a>(handlers: impl IntoIterator<Item = &'a ResponseHandlerArgs>) -> Self {
        let mut annotations = Self::default();
        for handler in handlers {
            match &handler.kind {
                ResponseHandlerKind::HttpCode(code) => annotations.status = Some(*code),
                ResponseHandlerKind::ContentType(ct) => annotations.content_type = Some(ct.clone()),
                ResponseHandlerKind::Location(url) => annotations.location = Some(url.clone()),
                ResponseHandlerKind::Redirect(url) => annotations.redirect = Some(url.clone()),
                ResponseHandlerKind::Render(t) => annotations.template = Some(t.clone()),
                ResponseHandlerKind::OnNull(code) => annotations.null_status = Some(*code),
                ResponseHandlerKind::OnUndefined(code) => {
                    annotations.undefined_status = Some(*code)
                }
                ResponseHandlerKind::Header(name, value) => {
                    annotations.headers.push((name.clone(), value.clone()))
                }
            }
        }
        annotations
    }
}

// ---------------------------------------------------------------------------
// Middlewares and interceptors
// ---------------------------------------------------------------------------

/// Where in the pipeline a middleware runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MiddlewarePhase {
    GlobalBefore,
    ControllerBefore,
    ActionBefore,
    ActionAfter,
    ControllerAfter,
    GlobalAfter,
    Error,
}

/// What a middleware or interceptor is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MiddlewareTarget {
    Global,
    Controller(String),
    Action { target: String, method: String },
}

impl MiddlewareTarget {
    pub fn action(target: impl Into<String>, method: impl Into<String>) -> Self {
        Self::Action {
            target: target.into(),
            method: method.into(),
        }
    }
}

impl fmt::Display for MiddlewareTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global scope"),
            Self::Controller(target) => write!(f, "controller {}", target),
            Self::Action { target, method } => write!(f, "action {}.{}", target, method),
        }
    }
}

/// A before/after step or an error step.
#[derive(Clone)]
pub enum MiddlewareHandle {
    Step(Arc<dyn Middleware>),
    Error(Arc<dyn ErrorMiddleware>),
}

impl MiddlewareHandle {
    pub fn name(&self) -> &str {
        match self {
            Self::Step(m) => m.name(),
            Self::Error(m) => m.name(),
        }
    }
}

impl fmt::Debug for MiddlewareHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MiddlewareHandle").field(&self.name()).finish()
    }
}

/// A registered middleware.
#[derive(Debug, Clone)]
pub struct MiddlewareArgs {
    pub phase: MiddlewarePhase,
    pub priority: i32,
    pub target: MiddlewareTarget,
    pub handle: MiddlewareHandle,
}

impl MiddlewareArgs {
    fn step(
        phase: MiddlewarePhase,
        target: MiddlewareTarget,
        priority: i32,
        middleware: impl Middleware,
    ) -> Self {
        Self {
            phase,
            priority,
            target,
            handle: MiddlewareHandle::Step(Arc::new(middleware)),
        }
    }

    pub fn global_before(priority: i32, middleware: impl Middleware) -> Self {
        Self::step(MiddlewarePhase::GlobalBefore, MiddlewareTarget::Global, priority, middleware)
    }

    pub fn global_after(priority: i32, middleware: impl Middleware) -> Self {
        Self::step(MiddlewarePhase::GlobalAfter, MiddlewareTarget::Global, priority, middleware)
    }

    pub fn controller_before(
        target: impl Into<String>,
        priority: i32,
        middleware: impl Middleware,
    ) -> Self {
        Self::step(
            MiddlewarePhase::ControllerBefore,
            MiddlewareTarget::Controller(target.into()),
            priority,
            middleware,
        )
    }

    pub fn controller_after(
        target: impl Into<String>,
        priority: i32,
        middleware: impl Middleware,
    ) -> Self {
        Self::step(
            MiddlewarePhase::ControllerAfter,
            MiddlewareTarget::Controller(target.into()),
            priority,
            middleware,
        )
    }

    pub fn action_before(
        target: impl Into<String>,
        method: impl Into<String>,
        priority: i32,
        middleware: impl Middleware,
    ) -> Self {
        Self::step(
            MiddlewarePhase::ActionBefore,
            MiddlewareTarget::action(target, method),
            priority,
            middleware,
        )
    }

    pub fn action_after(
        target: impl Into<String>,
        method: impl Into<String>,
        priority: i32,
        middleware: impl Middleware,
    ) -> Self {
        Self::step(
            MiddlewarePhase::ActionAfter,
            MiddlewareTarget::action(target, method),
            priority,
            middleware,
        )
    }

    /// Error middleware for every action.
    pub fn error(priority: i32, middleware: impl ErrorMiddleware) -> Self {
        Self::error_for(MiddlewareTarget::Global, priority, middleware)
    }

    /// Error middleware scoped to a controller or an action.
    pub fn error_for(
        target: MiddlewareTarget,
        priority: i32,
        middleware: impl ErrorMiddleware,
    ) -> Self {
        Self {
            phase: MiddlewarePhase::Error,
            priority,
            target,
            handle: MiddlewareHandle::Error(Arc::new(middleware)),
        }
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }
}

/// A registered interceptor.
#[derive(Clone)]
pub struct InterceptorArgs {
    pub priority: i32,
    pub target: MiddlewareTarget,
    pub interceptor: Arc<dyn Interceptor>,
}

impl InterceptorArgs {
    pub fn new(target: MiddlewareTarget, priority: i32, interceptor: impl Interceptor) -> Self {
        Self {
            priority,
            target,
            interceptor: Arc::new(interceptor),
        }
    }

    pub fn global(priority: i32, interceptor: impl Interceptor) -> Self {
        Self::new(MiddlewareTarget::Global, priority, interceptor)
    }
}

impl fmt::Debug for InterceptorArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorArgs")
            .field("priority", &self.priority)
            .field("target", &self.target)
            .field("interceptor", &self.interceptor.name())
            .finish()
    }
}

/// Any descriptor accepted by [`MetadataStorage::add`](crate::storage::MetadataStorage::add).
#[derive(Debug, Clone)]
pub enum Descriptor {
    Controller(ControllerArgs),
    Action(ActionArgs),
    Param(ParamArgs),
    Middleware(MiddlewareArgs),
    Interceptor(InterceptorArgs),
    ResponseHandler(ResponseHandlerArgs),
}

macro_rules! descriptor_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Descriptor {
                fn from(args: $ty) -> Self {
                    Descriptor::$variant(args)
                }
            }
        )*
    };
}

descriptor_from! {
    Controller(ControllerArgs),
    Action(ActionArgs),
    Param(ParamArgs),
    Middleware(MiddlewareArgs),
    Interceptor(InterceptorArgs),
    ResponseHandler(ResponseHandlerArgs),
}

// ---------------------------------------------------------------------------
// Resolved metadata
// ---------------------------------------------------------------------------

/// The parts of a controller an action needs at request time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerRef {
    pub target: String,
    pub route: String,
    pub kind: ControllerKind,
    pub transform_response: bool,
}

/// A resolved parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamMetadata {
    pub index: usize,
    pub kind: ParamKind,
    pub name: Option<String>,
    pub shape: ValueShape,
    pub parse_json: bool,
    pub required: bool,
    pub transform: Option<bool>,
    pub upload: Option<UploadOptions>,
}

/// A middleware bound into an action chain.
#[derive(Debug, Clone)]
pub struct MiddlewareRef {
    pub phase: MiddlewarePhase,
    pub priority: i32,
    pub handle: MiddlewareHandle,
}

impl MiddlewareRef {
    pub fn name(&self) -> &str {
        self.handle.name()
    }
}

/// An interceptor bound to an action.
#[derive(Clone)]
pub struct InterceptorRef {
    pub priority: i32,
    pub interceptor: Arc<dyn Interceptor>,
}

impl fmt::Debug for InterceptorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorRef")
            .field("priority", &self.priority)
            .field("interceptor", &self.interceptor.name())
            .finish()
    }
}

/// A routable action, fully linked.
#[derive(Debug, Clone)]
pub struct ActionMetadata {
    pub controller: ControllerRef,
    /// Controller that declared the action (differs from `controller` when inherited)
    pub declared_by: String,
    pub method: String,
    pub verb: Method,
    /// Full route: prefix + controller base + action route
    pub path: String,
    pub params: Vec<ParamMetadata>,
    pub before: Vec<MiddlewareRef>,
    pub after: Vec<MiddlewareRef>,
    pub error: Vec<MiddlewareRef>,
    pub interceptors: Vec<InterceptorRef>,
    pub response: ResponseAnnotations,
    pub roles: Option<Vec<String>>,
    pub handler: ActionHandler,
}

impl ActionMetadata {
    /// `Target.method`, used in logs.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.controller.target, self.method)
    }
}

/// A controller with its resolved actions.
#[derive(Debug, Clone)]
pub struct ControllerMetadata {
    pub target: String,
    pub route: String,
    pub kind: ControllerKind,
    pub extends: Option<String>,
    pub roles: Option<Vec<String>>,
    pub actions: Vec<Arc<ActionMetadata>>,
    /// Controller-level before middlewares, own and inherited
    pub before: Vec<MiddlewareRef>,
    /// Controller-level after middlewares, own and inherited
    pub after: Vec<MiddlewareRef>,
}
