//! Running merged middleware chains

use super::Flow;
use crate::context::RequestContext;
use crate::error::HttpError;
use crate::metadata::{MiddlewareHandle, MiddlewareRef};

/// Run before/after steps in order until one stops or fails.
///
/// Returns the step that stopped the chain, if any.
pub(crate) async fn run_steps<'a>(
    steps: &'a [MiddlewareRef],
    ctx: &mut RequestContext,
) -> Result<Option<&'a str>, HttpError> {
    for step in steps {
        let MiddlewareHandle::Step(middleware) = &step.handle else {
            continue;
        };
        crate::trace_trace!(middleware = middleware.name(), phase = ?step.phase, "running middleware");
        match middleware.handle(ctx).await? {
            Flow::Continue => {}
            Flow::Stop => return Ok(Some(middleware.name())),
        }
    }
    Ok(None)
}

/// Run error steps in order until one stops. A failing error step is logged
/// and the chain moves on with the original error.
pub(crate) async fn run_error_chain(
    steps: &[MiddlewareRef],
    error: &HttpError,
    ctx: &mut RequestContext,
) {
    for step in steps {
        let MiddlewareHandle::Error(middleware) = &step.handle else {
            continue;
        };
        crate::trace_trace!(middleware = middleware.name(), "running error middleware");
        match middleware.on_error(error, ctx).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Stop) => break,
            Err(_e) => {
                crate::trace_warn!(
                    middleware = middleware.name(),
                    error = %_e,
                    "error middleware failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestHead;
    use crate::metadata::MiddlewarePhase;
    use crate::middleware::{error_fn, from_fn};
    use http::{Method, StatusCode};
    use std::sync::{Arc, Mutex};

    fn ctx() -> RequestContext {
        RequestContext::new(RequestHead::new(Method::GET, "/".parse().unwrap()))
    }

    fn recording(
        log: &Arc<Mutex<Vec<&'static str>>>,
        label: &'static str,
        flow: Flow,
    ) -> MiddlewareRef {
        let log = Arc::clone(log);
        MiddlewareRef {
            phase: MiddlewarePhase::GlobalBefore,
            priority: 0,
            handle: MiddlewareHandle::Step(Arc::new(
                from_fn(move |_ctx| {
                    log.lock().unwrap().push(label);
                    Ok(flow)
                })
                .named(label),
            )),
        }
    }

    #[tokio::test]
    async fn stops_at_first_stop() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let steps = vec![
            recording(&log, "a", Flow::Continue),
            recording(&log, "b", Flow::Stop),
            recording(&log, "c", Flow::Continue),
        ];
        let stopped = run_steps(&steps, &mut ctx()).await.unwrap();
        assert_eq!(stopped, Some("b"));
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn failures_propagate() {
        let steps = vec![MiddlewareRef {
            phase: MiddlewarePhase::ActionBefore,
            priority: 0,
            handle: MiddlewareHandle::Step(Arc::new(from_fn(|_ctx| {
                Err(HttpError::forbidden("no"))
            }))),
        }];
        let err = run_steps(&steps, &mut ctx()).await.unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn error_chain_survives_failing_steps() {
        let steps = vec![
            MiddlewareRef {
                phase: MiddlewarePhase::Error,
                priority: 0,
                handle: MiddlewareHandle::Error(Arc::new(error_fn(|_err, _ctx| {
                    Err(HttpError::internal("broken handler"))
                }))),
            },
            MiddlewareRef {
                phase: MiddlewarePhase::Error,
                priority: 1,
                handle: MiddlewareHandle::Error(Arc::new(error_fn(|err, ctx| {
                    ctx.response().status(err.status);
                    ctx.response().send_text(err.message.clone())?;
                    Ok(Flow::Stop)
                }))),
            },
        ];
        let mut context = ctx();
        run_error_chain(&steps, &HttpError::not_found("gone"), &mut context).await;
        assert!(context.response().is_written());
    }
}
