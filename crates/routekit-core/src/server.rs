//! HTTP server implementation

use crate::context::{RequestContext, RequestHead};
use crate::driver::{dispatch, Driver};
use crate::error::{ErrorKind, HttpError};
use crate::executor::ActionExecutor;
use crate::matcher::{MatchOutcome, RouteMatcher};
use crate::response::{OutgoingResponse, ResponseBody};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::TryStreamExt;
use http::{header, Method, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, LengthLimitError, Limited, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Body type of responses written by [`HyperDriver`].
pub type HyperBody = UnsyncBoxBody<Bytes, io::Error>;

/// [`Driver`] for `hyper` 1.
pub struct HyperDriver {
    matcher: Arc<RouteMatcher>,
    body_limit: usize,
}

impl HyperDriver {
    pub fn new(matcher: Arc<RouteMatcher>, body_limit: usize) -> Self {
        Self {
            matcher,
            body_limit,
        }
    }
}

fn payload_too_large(limit: usize) -> HttpError {
    HttpError::new(
        ErrorKind::BadRequest,
        format!("Request body exceeds the limit of {} bytes", limit),
    )
    .with_status(StatusCode::PAYLOAD_TOO_LARGE)
}

#[async_trait]
impl Driver for HyperDriver {
    type Request = hyper::Request<Incoming>;
    type Response = hyper::Response<HyperBody>;

    fn match_route(&self, verb: &Method, path: &str) -> MatchOutcome {
        self.matcher.match_route(verb, path)
    }

    async fn extract_request_context(
        &self,
        request: Self::Request,
    ) -> Result<RequestContext, HttpError> {
        let (parts, body) = request.into_parts();
        let remote_addr = parts.extensions.get::<SocketAddr>().copied();

        let declared = parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > self.body_limit) {
            return Err(payload_too_large(self.body_limit));
        }

        let bytes = Limited::new(body, self.body_limit)
            .collect()
            .await
            .map_err(|e| {
                if e.downcast_ref::<LengthLimitError>().is_some() {
                    payload_too_large(self.body_limit)
                } else {
                    HttpError::bad_request("Failed to read request body")
                        .with_internal(e.to_string())
                }
            })?
            .to_bytes();

        RequestContext::new(RequestHead::from_parts(&parts, remote_addr)).with_payload(bytes)
    }

    async fn write_response(&self, response: OutgoingResponse) -> Self::Response {
        into_hyper(response)
    }
}

/// Convert a pipeline response into a hyper response.
pub fn into_hyper(response: OutgoingResponse) -> hyper::Response<HyperBody> {
    let body = match response.body {
        ResponseBody::Empty => Empty::<Bytes>::new().map_err(|never| match never {}).boxed_unsync(),
        ResponseBody::Full(bytes) => Full::new(bytes)
            .map_err(|never| match never {})
            .boxed_unsync(),
        ResponseBody::Stream(stream) => StreamBody::new(stream.map_ok(Frame::data)).boxed_unsync(),
    };
    let mut native = hyper::Response::new(body);
    *native.status_mut() = response.status;
    *native.headers_mut() = response.headers;
    native
}

/// Accept loop serving one [`HyperDriver`].
pub struct Server {
    driver: Arc<HyperDriver>,
    executor: Arc<ActionExecutor>,
}

impl Server {
    pub fn new(driver: HyperDriver, executor: ActionExecutor) -> Self {
        Self {
            driver: Arc::new(driver),
            executor: Arc::new(executor),
        }
    }

    /// Bind `addr` and serve until the listener fails.
    pub async fn run(self, addr: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr: SocketAddr = addr.parse()?;
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve connections accepted on `listener`.
    pub async fn serve(
        self,
        listener: TcpListener,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        crate::trace_info!(addr = ?listener.local_addr().ok(), "routekit server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let driver = Arc::clone(&self.driver);
            let executor = Arc::clone(&self.executor);

            tokio::spawn(async move {
                let service = service_fn(move |mut req: hyper::Request<Incoming>| {
                    let driver = Arc::clone(&driver);
                    let executor = Arc::clone(&executor);
                    req.extensions_mut().insert(remote_addr);
                    async move {
                        let response = dispatch(driver.as_ref(), &executor, req).await;
                        Ok::<_, Infallible>(response)
                    }
                });

                if let Err(_err) = http1::Builder::new().serve_connection(io, service).await {
                    crate::trace_error!(error = %_err, "connection error");
                }
            });
        }
    }
}
