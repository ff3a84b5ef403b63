//! Result interceptors
//!
//! An interceptor sees the successful result of an action before the
//! response mapper does and may replace it. Interceptors bound to an action
//! run global → controller → action, each group in ascending priority.
//!
//! # Example
//!
//! ```rust,ignore
//! use routekit_core::interceptor::interceptor_fn;
//!
//! // wrap every JSON result in an envelope
//! storage.register_interceptor(InterceptorArgs::global(0, interceptor_fn(|_ctx, output| {
//!     Ok(match output {
//!         ActionOutput::Json(data) => ActionOutput::Json(json!({ "data": data })),
//!         other => other,
//!     })
//! })));
//! ```

use crate::context::RequestContext;
use crate::error::HttpError;
use crate::metadata::InterceptorRef;
use crate::response::ActionOutput;
use async_trait::async_trait;

/// Transforms an action result.
#[async_trait]
pub trait Interceptor: Send + Sync + 'static {
    async fn intercept(
        &self,
        ctx: &RequestContext,
        output: ActionOutput,
    ) -> Result<ActionOutput, HttpError>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Interceptor backed by a synchronous closure.
pub struct FnInterceptor<F> {
    f: F,
    name: &'static str,
}

impl<F> FnInterceptor<F> {
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

pub fn interceptor_fn<F>(f: F) -> FnInterceptor<F>
where
    F: Fn(&RequestContext, ActionOutput) -> Result<ActionOutput, HttpError>
        + Send
        + Sync
        + 'static,
{
    FnInterceptor {
        f,
        name: "fn_interceptor",
    }
}

#[async_trait]
impl<F> Interceptor for FnInterceptor<F>
where
    F: Fn(&RequestContext, ActionOutput) -> Result<ActionOutput, HttpError>
        + Send
        + Sync
        + 'static,
{
    async fn intercept(
        &self,
        ctx: &RequestContext,
        output: ActionOutput,
    ) -> Result<ActionOutput, HttpError> {
        (self.f)(ctx, output)
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Thread `output` through `chain` in order.
pub(crate) async fn intercept_all(
    chain: &[InterceptorRef],
    ctx: &RequestContext,
    mut output: ActionOutput,
) -> Result<ActionOutput, HttpError> {
    for entry in chain {
        crate::trace_trace!(interceptor = entry.interceptor.name(), "running interceptor");
        output = entry.interceptor.intercept(ctx, output).await?;
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestHead;
    use http::Method;
    use serde_json::json;
    use std::sync::Arc;

    fn wrap(key: &'static str, priority: i32) -> InterceptorRef {
        InterceptorRef {
            priority,
            interceptor: Arc::new(interceptor_fn(move |_ctx, output| {
                Ok(match output {
                    ActionOutput::Json(v) => ActionOutput::Json(json!({ key: v })),
                    other => other,
                })
            })),
        }
    }

    #[tokio::test]
    async fn applied_in_chain_order() {
        let ctx = RequestContext::new(RequestHead::new(Method::GET, "/".parse().unwrap()));
        let chain = vec![wrap("inner", 0), wrap("outer", 1)];
        let output = intercept_all(&chain, &ctx, ActionOutput::Json(json!(1)))
            .await
            .unwrap();
        match output {
            ActionOutput::Json(v) => assert_eq!(v, json!({"outer": {"inner": 1}})),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn failure_stops_the_chain() {
        let ctx = RequestContext::new(RequestHead::new(Method::GET, "/".parse().unwrap()));
        let failing = InterceptorRef {
            priority: 0,
            interceptor: Arc::new(interceptor_fn(|_ctx, _output| {
                Err(HttpError::conflict("stale"))
            })),
        };
        let err = intercept_all(&[failing, wrap("never", 1)], &ctx, ActionOutput::Null)
            .await
            .unwrap_err();
        assert_eq!(err.message, "stale");
    }
}
