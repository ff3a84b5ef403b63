use bytes::Bytes;
use futures_util::stream;
use proptest::prelude::*;
use routekit_core::{
    ActionArgs, ActionHandler, ActionOutput, App, ControllerArgs, HttpError, MetadataStorage,
    ParamArgs, RoutingConfig,
};
use serde_json::json;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

fn storage() -> MetadataStorage {
    let mut storage = MetadataStorage::new();
    storage
        .register_controller(ControllerArgs::json("BlogController", "/blogs"))
        .register_action(
            "BlogController",
            "list",
            ActionArgs::get(
                "/",
                ActionHandler::sync(|_args| {
                    Ok::<_, HttpError>(json!({"id": 1, "title": "About me"}))
                }),
            ),
        )
        .register_action(
            "BlogController",
            "feed",
            ActionArgs::get(
                "/feed",
                ActionHandler::sync(|_args| {
                    let chunks = vec![
                        Ok::<_, std::io::Error>(Bytes::from_static(b"hello ")),
                        Ok(Bytes::from_static(b"world")),
                    ];
                    Ok::<_, HttpError>(ActionOutput::stream(stream::iter(chunks)))
                }),
            ),
        )
        .register_action(
            "BlogController",
            "create",
            ActionArgs::post(
                "/",
                ActionHandler::sync(|args| {
                    let title = args.raw(0).cloned();
                    Ok::<_, HttpError>(json!({ "title": title }))
                }),
            ),
        )
        .register_param("BlogController", "create", 0, ParamArgs::body());
    storage
}

async fn serve(config: RoutingConfig) -> SocketAddr {
    let app = App::new(storage()).config(config).build().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(app.into_server().serve(listener));
    addr
}

async fn send(addr: SocketAddr, request: Vec<u8>) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&request).await.unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    // The server may reset the connection after an early answer.
    while let Ok(n) = stream.read(&mut buf).await {
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    String::from_utf8_lossy(&out).to_string()
}

fn get(path: &str) -> Vec<u8> {
    format!("GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n", path).into_bytes()
}

fn post(path: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
    let mut request = format!(
        "POST {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
        path,
        content_type,
        body.len()
    )
    .into_bytes();
    request.extend_from_slice(body);
    request
}

#[tokio::test]
async fn serves_json_over_http() {
    let addr = serve(RoutingConfig::default()).await;

    let response = send(addr, get("/blogs")).await;
    assert!(response.starts_with("HTTP/1.1 200 OK"), "{}", response);
    assert!(response.contains("content-type: application/json"));
    assert!(response.ends_with(r#"{"id":1,"title":"About me"}"#));
}

#[tokio::test]
async fn streams_are_written_chunked() {
    let addr = serve(RoutingConfig::default()).await;

    let response = send(addr, get("/blogs/feed")).await;
    assert!(response.starts_with("HTTP/1.1 200 OK"), "{}", response);
    assert!(response.contains("transfer-encoding: chunked"));
    assert!(response.contains("hello "));
    assert!(response.contains("world"));
}

#[tokio::test]
async fn unmatched_requests() {
    let addr = serve(RoutingConfig::default()).await;

    let response = send(addr, get("/videos")).await;
    assert!(response.starts_with("HTTP/1.1 404 Not Found"), "{}", response);
    assert!(response.ends_with("Cannot GET /videos"));

    let response = send(
        addr,
        b"DELETE /blogs HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n".to_vec(),
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 405"), "{}", response);
    assert!(response.contains("allow: GET, POST"));
}

#[tokio::test]
async fn json_bodies_reach_the_action() {
    let addr = serve(RoutingConfig::default()).await;

    let response = send(addr, post("/blogs", "application/json", br#"{"title":"Hi"}"#)).await;
    assert!(response.starts_with("HTTP/1.1 200 OK"), "{}", response);
    assert!(response.ends_with(r#"{"title":{"title":"Hi"}}"#));

    let response = send(addr, post("/blogs", "application/json", b"{oops")).await;
    assert!(response.starts_with("HTTP/1.1 400"), "{}", response);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_body_limit_is_enforced(body_len in 0usize..2048usize) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let response = rt.block_on(async {
            let addr = serve(RoutingConfig::default().body_limit(1024)).await;
            let body = vec![b'a'; body_len];
            send(addr, post("/blogs", "text/plain", &body)).await
        });

        if body_len > 1024 {
            prop_assert!(response.starts_with("HTTP/1.1 413"), "{}", response);
        } else {
            prop_assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
        }
    }
}
