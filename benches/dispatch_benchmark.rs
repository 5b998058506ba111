use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use restserver::{
    HttpRequestMethod::{self, *},
    Redirect, Route, Router, SimpleRedirect,
};
use std::{collections::HashMap, sync::Arc};

/// 每个资源一条精确路由和一条子路径路由
fn router_with(resources: usize) -> Router {
    let mut router = Router::new();
    for i in 0..resources {
        let uri = format!("/api/resource{}", i);
        router
            .route(Route::new(&uri, |_, _| Ok(())).methods(&[Get, Post]))
            .unwrap();
        router
            .route(Route::new(&uri, |_, _| Ok(())).scan_children(true))
            .unwrap();
    }
    router
        .route(Route::new("/", |_, _| Ok(())).scan_children(true))
        .unwrap();
    router
}

fn dispatch_exact_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_exact");

    for size in [10, 100, 1000].iter() {
        let router = router_with(*size);
        let uri = format!("/api/resource{}", size / 2);
        group.bench_with_input(BenchmarkId::from_parameter(size), &uri, |b, uri| {
            b.iter(|| black_box(router.dispatch(black_box(Get), black_box(uri))));
        });
    }

    group.finish();
}

fn dispatch_subtree_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_subtree");

    for size in [10, 100, 1000].iter() {
        let router = router_with(*size);
        let uri = format!("/api/resource{}/items/42", size / 2);
        group.bench_with_input(BenchmarkId::from_parameter(size), &uri, |b, uri| {
            b.iter(|| black_box(router.dispatch(black_box(Get), black_box(uri))));
        });
    }

    group.finish();
}

fn dispatch_outcomes_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_outcomes");

    let mut router = router_with(100);
    let table: HashMap<String, String> =
        [("/moved".to_string(), "/api/resource1".to_string())].into();
    let redirect: Arc<dyn Redirect> = Arc::new(SimpleRedirect::new("/old", table));
    router.add_redirect(redirect);

    let cases: [(&str, HttpRequestMethod, &str); 4] = [
        ("redirect", Get, "/old/moved"),
        ("head", Head, "/api/resource50"),
        ("method_not_allowed", Delete, "/api/resource50"),
        ("root_fallback", Get, "/static/app.js"),
    ];

    for (name, method, uri) in cases.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(name), uri, |b, uri| {
            b.iter(|| black_box(router.dispatch(black_box(*method), black_box(uri))));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    dispatch_exact_benchmark,
    dispatch_subtree_benchmark,
    dispatch_outcomes_benchmark
);
criterion_main!(benches);
