//! TestClient for integration testing without network binding
//!
//! The client is a [`Driver`]: requests go through route matching, the
//! executor and the response mapper exactly as they would behind the hyper
//! server, only without a socket.
//!
//! # Example
//!
//! ```rust,ignore
//! use routekit_core::{App, TestClient, TestRequest};
//!
//! #[tokio::test]
//! async fn test_blogs() {
//!     let app = App::new(blog_storage()).build().unwrap();
//!     let client = TestClient::new(app);
//!
//!     let response = client.get("/blogs").await;
//!     response.assert_status(200);
//! }
//! ```

use crate::app::Application;
use crate::context::{RequestContext, RequestHead};
use crate::driver::{dispatch, Driver};
use crate::error::{ErrorKind, HttpError};
use crate::matcher::MatchOutcome;
use crate::response::{OutgoingResponse, ResponseBody};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

const TEST_BOUNDARY: &str = "routekit-test-boundary";

/// Test client for integration testing without network binding
pub struct TestClient {
    app: Application,
}

impl TestClient {
    /// Create a new test client from a built application
    pub fn new(app: Application) -> Self {
        Self { app }
    }

    pub fn app(&self) -> &Application {
        &self.app
    }

    /// Send a GET request
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(TestRequest::get(path)).await
    }

    /// Send a POST request with JSON body
    pub async fn post_json<T: Serialize>(&self, path: &str, body: &T) -> TestResponse {
        self.request(TestRequest::post(path).json(body)).await
    }

    /// Send a request with full control
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let response = client.request(
    ///     TestRequest::put("/blogs/1")
    ///         .header("Authorization", "Bearer token")
    ///         .json(&UpdateBlog { title: "Bob" })
    /// ).await;
    /// ```
    pub async fn request(&self, req: TestRequest) -> TestResponse {
        dispatch(self, self.app.executor(), req).await
    }
}

#[async_trait]
impl Driver for TestClient {
    type Request = TestRequest;
    type Response = TestResponse;

    fn match_route(&self, verb: &Method, path: &str) -> MatchOutcome {
        self.app.matcher().match_route(verb, path)
    }

    async fn extract_request_context(
        &self,
        req: TestRequest,
    ) -> Result<RequestContext, HttpError> {
        let uri = req
            .path
            .parse()
            .map_err(|_| HttpError::bad_request(format!("Invalid request path '{}'", req.path)))?;
        let mut head = RequestHead::new(req.method, uri);
        head.headers = req.headers;

        let mut body = req.body.unwrap_or_default();
        if !req.parts.is_empty() {
            body = encode_multipart(&req.parts);
            head.headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("multipart/form-data; boundary=routekit-test-boundary"),
            );
        }

        let limit = self.app.config().body_limit;
        if body.len() > limit {
            return Err(HttpError::new(
                ErrorKind::BadRequest,
                format!("Request body exceeds the limit of {} bytes", limit),
            )
            .with_status(StatusCode::PAYLOAD_TOO_LARGE));
        }

        let ctx = RequestContext::new(head).with_payload(body)?;
        Ok(match req.session {
            Some(session) => ctx.with_session(session),
            None => ctx,
        })
    }

    async fn write_response(&self, response: OutgoingResponse) -> TestResponse {
        TestResponse::from_outgoing(response).await
    }
}

#[derive(Debug, Clone)]
enum Part {
    Field(String, String),
    File {
        field: String,
        file_name: String,
        content_type: String,
        data: Bytes,
    },
}

fn encode_multipart(parts: &[Part]) -> Bytes {
    let mut out = Vec::new();
    for part in parts {
        out.extend_from_slice(format!("--{}\r\n", TEST_BOUNDARY).as_bytes());
        match part {
            Part::Field(name, value) => {
                out.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                out.extend_from_slice(value.as_bytes());
            }
            Part::File {
                field,
                file_name,
                content_type,
                data,
            } => {
                out.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                        field, file_name, content_type
                    )
                    .as_bytes(),
                );
                out.extend_from_slice(data);
            }
        }
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("--{}--\r\n", TEST_BOUNDARY).as_bytes());
    Bytes::from(out)
}

/// Test request builder
#[derive(Debug, Clone)]
pub struct TestRequest {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Option<Bytes>,
    parts: Vec<Part>,
    session: Option<Map<String, Value>>,
}

impl TestRequest {
    /// Create a new request with the given method and path
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            headers: HeaderMap::new(),
            body: None,
            parts: Vec::new(),
            session: None,
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: &str) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: &str) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: &str) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: &str) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Add a header to the request. Invalid names or values are ignored.
    pub fn header(mut self, key: &str, value: &str) -> Self {
        if let (Ok(name), Ok(val)) = (
            key.parse::<http::header::HeaderName>(),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, val);
        }
        self
    }

    /// Set the request body as JSON
    ///
    /// This automatically sets the Content-Type header to `application/json`.
    pub fn json<T: Serialize>(mut self, body: &T) -> Self {
        if let Ok(bytes) = serde_json::to_vec(body) {
            self.body = Some(Bytes::from(bytes));
            self.headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
        }
        self
    }

    /// Set the request body as raw bytes
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the Content-Type header
    pub fn content_type(self, content_type: &str) -> Self {
        self.header("content-type", content_type)
    }

    /// Add a text field; the request becomes `multipart/form-data`.
    pub fn form_field(mut self, name: &str, value: &str) -> Self {
        self.parts.push(Part::Field(name.to_string(), value.to_string()));
        self
    }

    /// Add a file part; the request becomes `multipart/form-data`.
    pub fn file(
        mut self,
        field: &str,
        file_name: &str,
        content_type: &str,
        data: impl Into<Bytes>,
    ) -> Self {
        self.parts.push(Part::File {
            field: field.to_string(),
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            data: data.into(),
        });
        self
    }

    /// Session values, as a session middleware would provide them.
    pub fn session(mut self, session: Map<String, Value>) -> Self {
        self.session = Some(session);
        self
    }
}

/// Test response with assertion helpers
#[derive(Debug)]
pub struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl TestResponse {
    async fn from_outgoing(response: OutgoingResponse) -> Self {
        let body = match response.body {
            ResponseBody::Empty => Bytes::new(),
            ResponseBody::Full(bytes) => bytes,
            ResponseBody::Stream(mut stream) => {
                let mut collected = Vec::new();
                while let Some(chunk) = stream.next().await {
                    match chunk {
                        Ok(bytes) => collected.extend_from_slice(&bytes),
                        Err(_) => break,
                    }
                }
                Bytes::from(collected)
            }
        };
        Self {
            status: response.status,
            headers: response.headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The body as a string, lossily decoded.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Assert that the response has the expected status code
    ///
    /// # Panics
    ///
    /// Panics if the status code doesn't match.
    pub fn assert_status<S>(&self, expected: S) -> &Self
    where
        S: TryInto<StatusCode>,
        S::Error: std::fmt::Debug,
    {
        let expected = expected.try_into().expect("invalid status code");
        assert_eq!(
            self.status, expected,
            "Expected status {}, got {}. Body: {}",
            expected,
            self.status,
            self.text()
        );
        self
    }

    /// Assert that the response has the expected header value
    ///
    /// # Panics
    ///
    /// Panics if the header doesn't exist or doesn't match.
    pub fn assert_header(&self, key: &str, expected: &str) -> &Self {
        let actual = self
            .headers
            .get(key)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        assert_eq!(
            actual, expected,
            "Expected header '{}' to be '{}', got '{}'",
            key, expected, actual
        );
        self
    }

    /// Assert that the response body matches the expected JSON value
    ///
    /// # Panics
    ///
    /// Panics if the body can't be parsed as JSON or doesn't match.
    pub fn assert_json<T: DeserializeOwned + PartialEq + std::fmt::Debug>(
        &self,
        expected: &T,
    ) -> &Self {
        let actual: T = self.json().expect("Failed to parse response body as JSON");
        assert_eq!(&actual, expected, "JSON body mismatch");
        self
    }

    pub fn assert_body_contains(&self, expected: &str) -> &Self {
        let body = self.text();
        assert!(
            body.contains(expected),
            "Expected body to contain '{}', got '{}'",
            expected,
            body
        );
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::App;
    use crate::handler::ActionHandler;
    use crate::metadata::{ActionArgs, ControllerArgs, ParamArgs};
    use crate::storage::MetadataStorage;
    use serde_json::json;

    fn client() -> TestClient {
        let mut storage = MetadataStorage::new();
        storage
            .register_controller(ControllerArgs::json("EchoController", "/echo"))
            .register_action(
                "EchoController",
                "echo",
                ActionArgs::post(
                    "/",
                    ActionHandler::sync(|args| Ok::<_, HttpError>(args.raw(0).cloned())),
                ),
            )
            .register_param("EchoController", "echo", 0, ParamArgs::body())
            .register_action(
                "EchoController",
                "upload",
                ActionArgs::post(
                    "/upload",
                    ActionHandler::sync(|args| -> Result<serde_json::Value, HttpError> {
                        let file = args.file(0)?;
                        Ok(json!({
                            "size": file.as_ref().map(|f| f.size()),
                            "title": args.raw(1).cloned(),
                        }))
                    }),
                ),
            )
            .register_param("EchoController", "upload", 0, ParamArgs::uploaded_file("photo"))
            .register_param("EchoController", "upload", 1, ParamArgs::body_param("title"));
        let config = crate::config::RoutingConfig::default().body_limit(512);
        TestClient::new(App::new(storage).config(config).build().unwrap())
    }

    #[tokio::test]
    async fn json_round_trip() {
        client()
            .post_json("/echo", &json!({"a": 1}))
            .await
            .assert_status(200)
            .assert_json(&json!({"a": 1}));
    }

    #[tokio::test]
    async fn multipart_files_and_fields() {
        let response = client()
            .request(
                TestRequest::post("/echo/upload")
                    .form_field("title", "cat")
                    .file("photo", "cat.png", "image/png", vec![0u8; 10]),
            )
            .await;
        response.assert_status(200).assert_json(&json!({"size": 10, "title": "cat"}));
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected() {
        let response = client()
            .request(TestRequest::post("/echo").body(vec![b'x'; 1000]).content_type("text/plain"))
            .await;
        response.assert_status(413);
    }

    #[tokio::test]
    async fn unknown_routes_and_methods() {
        let client = client();
        client.get("/nope").await.assert_status(404);
        client
            .get("/echo")
            .await
            .assert_status(405)
            .assert_header("allow", "POST");
    }
}
