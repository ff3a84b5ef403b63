//! Before/after middleware and error middleware
//!
//! Middlewares are ordered steps. Each step gets the request context and
//! answers [`Flow::Continue`] to hand over to the next step or
//! [`Flow::Stop`] to end the chain. Registration decides where a step runs:
//!
//! ```text
//! global-before → controller-before → action-before → [action]
//!     → action-after → controller-after → global-after
//! ```
//!
//! Error middlewares form a separate chain that sees the failure.
//!
//! # Example
//!
//! ```rust,ignore
//! use routekit_core::middleware::{from_fn, Flow};
//!
//! storage.register_middleware(MiddlewareArgs::global_before(0, from_fn(|ctx| {
//!     ctx.response().header("x-powered-by", "routekit")?;
//!     Ok(Flow::Continue)
//! })));
//! ```

mod chain;

pub(crate) use chain::{run_error_chain, run_steps};

use crate::context::RequestContext;
use crate::error::HttpError;
use async_trait::async_trait;

/// Outcome of one middleware step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// A before or after step.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, ctx: &mut RequestContext) -> Result<Flow, HttpError>;

    /// Name used in logs and route table fingerprints.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A step of the error chain.
///
/// Error middlewares may answer through `ctx.response()`; when none does,
/// the executor's fallback answers.
#[async_trait]
pub trait ErrorMiddleware: Send + Sync + 'static {
    async fn on_error(&self, error: &HttpError, ctx: &mut RequestContext)
        -> Result<Flow, HttpError>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Middleware backed by a synchronous closure.
pub struct FnMiddleware<F> {
    f: F,
    name: &'static str,
}

impl<F> FnMiddleware<F> {
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

/// Build a middleware from a closure.
pub fn from_fn<F>(f: F) -> FnMiddleware<F>
where
    F: Fn(&mut RequestContext) -> Result<Flow, HttpError> + Send + Sync + 'static,
{
    FnMiddleware {
        f,
        name: "fn_middleware",
    }
}

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&mut RequestContext) -> Result<Flow, HttpError> + Send + Sync + 'static,
{
    async fn handle(&self, ctx: &mut RequestContext) -> Result<Flow, HttpError> {
        (self.f)(ctx)
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Error middleware backed by a synchronous closure.
pub struct FnErrorMiddleware<F> {
    f: F,
    name: &'static str,
}

impl<F> FnErrorMiddleware<F> {
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

/// Build an error middleware from a closure.
pub fn error_fn<F>(f: F) -> FnErrorMiddleware<F>
where
    F: Fn(&HttpError, &mut RequestContext) -> Result<Flow, HttpError> + Send + Sync + 'static,
{
    FnErrorMiddleware {
        f,
        name: "fn_error_middleware",
    }
}

#[async_trait]
impl<F> ErrorMiddleware for FnErrorMiddleware<F>
where
    F: Fn(&HttpError, &mut RequestContext) -> Result<Flow, HttpError> + Send + Sync + 'static,
{
    async fn on_error(
        &self,
        error: &HttpError,
        ctx: &mut RequestContext,
    ) -> Result<Flow, HttpError> {
        (self.f)(error, ctx)
    }

    fn name(&self) -> &str {
        self.name
    }
}
