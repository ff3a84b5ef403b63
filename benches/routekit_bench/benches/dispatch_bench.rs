//! Dispatch benchmarks
//!
//! Full pipeline per request through the in-process client: matching,
//! parameter resolution, middleware chains and response mapping.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use routekit_core::{
    from_fn, ActionArgs, ActionHandler, App, ControllerArgs, Flow, HttpError, MetadataStorage,
    MiddlewareArgs, ParamArgs, TestClient, TestRequest, ValueShape,
};
use serde_json::{json, Value};

fn client() -> TestClient {
    let mut storage = MetadataStorage::new();
    storage
        .register_controller(ControllerArgs::json("BlogController", "/blogs"))
        .register_action(
            "BlogController",
            "list",
            ActionArgs::get(
                "/",
                ActionHandler::sync(|_| Ok::<_, HttpError>(json!([{"id": 1, "title": "About me"}]))),
            ),
        )
        .register_action(
            "BlogController",
            "get",
            ActionArgs::get(
                "/:id",
                ActionHandler::sync(|args| -> Result<Value, HttpError> {
                    let id: u64 = args.value(0)?;
                    Ok(json!({ "id": id }))
                }),
            ),
        )
        .register_param(
            "BlogController",
            "get",
            0,
            ParamArgs::param("id").shape(ValueShape::Integer),
        )
        .register_action(
            "BlogController",
            "create",
            ActionArgs::post(
                "/",
                ActionHandler::sync(|args| Ok::<_, HttpError>(args.raw(0).cloned())),
            ),
        )
        .register_param("BlogController", "create", 0, ParamArgs::body());

    for priority in 0..5 {
        storage.register_middleware(MiddlewareArgs::global_before(
            priority,
            from_fn(|_| Ok(Flow::Continue)),
        ));
    }

    TestClient::new(App::new(storage).build().unwrap())
}

fn bench_dispatch(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let client = client();
    let mut group = c.benchmark_group("dispatch");

    group.bench_function("static_route", |b| {
        b.iter(|| rt.block_on(client.get(black_box("/blogs"))))
    });

    group.bench_function("route_param", |b| {
        b.iter(|| rt.block_on(client.get(black_box("/blogs/42"))))
    });

    group.bench_function("json_body", |b| {
        let body = json!({"title": "About me", "tags": ["rust", "http"]});
        b.iter(|| rt.block_on(client.request(TestRequest::post("/blogs").json(black_box(&body)))))
    });

    group.bench_function("not_found", |b| {
        b.iter(|| rt.block_on(client.get(black_box("/videos"))))
    });

    group.finish();
}

criterion_group!(benches, bench_dispatch);
criterion_main!(benches);
