//! The seam between the pipeline and an HTTP server
//!
//! A driver knows how to read its server's native request into a
//! [`RequestContext`] and how to write an [`OutgoingResponse`] back.
//! [`dispatch`] does the rest: matching, 404/405 answers and execution.

use crate::context::RequestContext;
use crate::error::HttpError;
use crate::executor::ActionExecutor;
use crate::matcher::MatchOutcome;
use crate::response::OutgoingResponse;
use async_trait::async_trait;
use http::{header, HeaderValue, Method};

/// Binding to a concrete HTTP server.
#[async_trait]
pub trait Driver: Send + Sync {
    type Request: Send;
    type Response: Send;

    /// Find the action for a verb and a concrete path.
    fn match_route(&self, verb: &Method, path: &str) -> MatchOutcome;

    /// Read the native request: head, query, cookies and the parsed body.
    async fn extract_request_context(
        &self,
        request: Self::Request,
    ) -> Result<RequestContext, HttpError>;

    /// Turn the pipeline's response into the native one.
    async fn write_response(&self, response: OutgoingResponse) -> Self::Response;
}

/// Serve one native request through `driver` and `executor`.
pub async fn dispatch<D>(driver: &D, executor: &ActionExecutor, request: D::Request) -> D::Response
where
    D: Driver + ?Sized,
{
    let ctx = match driver.extract_request_context(request).await {
        Ok(ctx) => ctx,
        Err(err) => return driver.write_response(executor.render_error(&err, None)).await,
    };

    let start = std::time::Instant::now();
    let method = ctx.method().clone();
    let path = ctx.path().to_string();

    let response = match driver.match_route(&method, &path) {
        MatchOutcome::Found(matched) => {
            let action = matched.action;
            executor.execute(&action, ctx.with_params(matched.params)).await
        }
        MatchOutcome::NotFound => {
            let err = HttpError::not_found(format!("Cannot {} {}", method, path));
            executor.render_error(&err, Some(ctx.request_id()))
        }
        MatchOutcome::MethodNotAllowed(allowed) => {
            let err = HttpError::method_not_allowed(&allowed);
            let mut response = executor.render_error(&err, Some(ctx.request_id()));
            let allow = allowed
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            if let Ok(value) = HeaderValue::from_str(&allow) {
                response.headers.insert(header::ALLOW, value);
            }
            response
        }
    };

    log_request(&method, &path, response.status, start);
    driver.write_response(response).await
}

fn log_request(
    _method: &Method,
    _path: &str,
    status: http::StatusCode,
    _start: std::time::Instant,
) {
    if status.is_server_error() {
        crate::trace_error!(
            method = %_method,
            path = %_path,
            status = status.as_u16(),
            duration_ms = _start.elapsed().as_millis() as u64,
            "request failed"
        );
    } else {
        crate::trace_info!(
            method = %_method,
            path = %_path,
            status = status.as_u16(),
            duration_ms = _start.elapsed().as_millis() as u64,
            "request completed"
        );
    }
}
