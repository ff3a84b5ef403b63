//! Route table build benchmarks
//!
//! Measures descriptor validation and linking for growing numbers of
//! controllers and middlewares.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use routekit_core::{
    from_fn, ActionArgs, ActionHandler, ControllerArgs, Flow, HttpError, MetadataBuilder,
    MetadataStorage, MiddlewareArgs, ParamArgs, RoutingConfig,
};
use serde_json::json;

fn storage(controllers: usize, middlewares: usize) -> MetadataStorage {
    let mut storage = MetadataStorage::new();
    for c in 0..controllers {
        let target = format!("Controller{}", c);
        storage.register_controller(ControllerArgs::json(target.as_str(), format!("/c{}", c)));
        for (method, route) in [("list", "/"), ("get", "/:id"), ("tags", "/:id/tags/:tag")] {
            storage.register_action(
                &target,
                method,
                ActionArgs::get(route, ActionHandler::sync(|_| Ok::<_, HttpError>(json!([])))),
            );
        }
        storage
            .register_param(&target, "get", 0, ParamArgs::param("id"))
            .register_param(&target, "tags", 0, ParamArgs::param("id"))
            .register_param(&target, "tags", 1, ParamArgs::param("tag"))
            .register_param(&target, "tags", 2, ParamArgs::query("page"));
    }
    for m in 0..middlewares {
        storage.register_middleware(MiddlewareArgs::global_before(
            (m % 3) as i32,
            from_fn(|_| Ok(Flow::Continue)),
        ));
    }
    storage
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    let config = RoutingConfig::default();

    for controllers in [1, 10, 100].iter() {
        let storage = storage(*controllers, 5);
        group.bench_with_input(
            BenchmarkId::new("controllers", controllers),
            &storage,
            |b, storage| {
                b.iter(|| {
                    MetadataBuilder::new(black_box(storage), &config)
                        .build()
                        .unwrap()
                })
            },
        );
    }

    for middlewares in [0, 10, 50].iter() {
        let storage = storage(10, *middlewares);
        group.bench_with_input(
            BenchmarkId::new("middlewares", middlewares),
            &storage,
            |b, storage| {
                b.iter(|| {
                    MetadataBuilder::new(black_box(storage), &config)
                        .build()
                        .unwrap()
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_build);
criterion_main!(benches);
