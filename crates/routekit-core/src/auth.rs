//! Pluggable authorization callbacks
//!
//! routekit does not authenticate anyone. Actions (or whole controllers)
//! declare the roles they need, and the application supplies the checkers
//! that decide.

use crate::context::RequestContext;
use crate::error::HttpError;
use async_trait::async_trait;
use serde_json::Value;

/// Decides whether the current request may run an action that declares `roles`.
#[async_trait]
pub trait AuthorizationChecker: Send + Sync + 'static {
    async fn check(&self, ctx: &RequestContext, roles: &[String]) -> Result<bool, HttpError>;
}

/// Supplies the value of `CurrentUser` parameters.
#[async_trait]
pub trait CurrentUserChecker: Send + Sync + 'static {
    async fn current_user(&self, ctx: &RequestContext) -> Result<Option<Value>, HttpError>;
}

#[async_trait]
impl<F> AuthorizationChecker for F
where
    F: Fn(&RequestContext, &[String]) -> bool + Send + Sync + 'static,
{
    async fn check(&self, ctx: &RequestContext, roles: &[String]) -> Result<bool, HttpError> {
        Ok(self(ctx, roles))
    }
}

#[async_trait]
impl<F> CurrentUserChecker for F
where
    F: Fn(&RequestContext) -> Option<Value> + Send + Sync + 'static,
{
    async fn current_user(&self, ctx: &RequestContext) -> Result<Option<Value>, HttpError> {
        Ok(self(ctx))
    }
}
