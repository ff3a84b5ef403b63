//! # routekit core
//!
//! Metadata storage, route table builder, parameter resolver, action
//! executor and response mapper for controller-based routing.
//!
//! This crate is not meant to be used directly. Use `routekit` instead.

#[macro_use]
mod tracing_macros;

mod app;
pub mod auth;
mod builder;
pub mod config;
mod context;
pub mod driver;
mod error;
mod executor;
mod handler;
pub mod interceptor;
mod matcher;
pub mod metadata;
pub mod middleware;
pub mod multipart;
pub mod path;
mod path_params;
mod resolve;
pub mod response;
mod server;
pub mod storage;
mod table;
#[cfg(any(test, feature = "test-utils"))]
mod test_client;

// Public API
pub use app::{App, Application};
pub use auth::{AuthorizationChecker, CurrentUserChecker};
pub use builder::MetadataBuilder;
pub use config::{
    load_dotenv, ConfigError, ErrorFormat, RoutingConfig, TransformOptions, ValidationPolicy,
    DEFAULT_BODY_LIMIT,
};
pub use context::{RequestContext, RequestHead, ResponseWriter};
pub use driver::{dispatch, Driver};
pub use error::{ErrorKind, HttpError, MetadataError, Result};
pub use http::{Method, StatusCode};
pub use executor::ActionExecutor;
pub use handler::{ActionHandler, ActionResult, Argument, Arguments};
pub use interceptor::{interceptor_fn, Interceptor};
pub use matcher::{MatchOutcome, RouteMatch, RouteMatcher};
pub use metadata::{
    ActionArgs, ActionMetadata, ControllerArgs, ControllerKind, ControllerMetadata, Descriptor,
    InterceptorArgs, MiddlewareArgs, MiddlewarePhase, MiddlewareTarget, ParamArgs, ParamKind,
    ParamMetadata, ResponseAnnotations, ResponseHandlerArgs, ResponseHandlerKind,
};
pub use middleware::{error_fn, from_fn, ErrorMiddleware, Flow, Middleware};
pub use multipart::{UploadOptions, UploadedFile};
pub use path_params::RouteParams;
pub use resolve::ParamResolver;
pub use response::{
    ActionOutput, Html, IntoActionOutput, Json, OutgoingResponse, ResponseBody, ResponseMapper,
    ViewRenderer,
};
pub use routekit_validate::{FieldError, ValidationError, ValueShape};
pub use server::{into_hyper, HyperBody, HyperDriver, Server};
pub use storage::MetadataStorage;
pub use table::{RouteEntry, RouteFingerprint, RouteOverride, RouteTable};
#[cfg(any(test, feature = "test-utils"))]
pub use test_client::{TestClient, TestRequest, TestResponse};
