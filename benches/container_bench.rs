//! Benchmarks for the DI container

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use lifetime_di::{Container, ContainerBuilder, Func, Lazy, Meta};
use std::hint::black_box;
use std::sync::Arc;

#[allow(dead_code)]
struct SmallService {
    value: i32,
}

#[allow(dead_code)]
struct MediumService {
    name: String,
    values: Vec<i32>,
}

#[allow(dead_code)]
struct LargeService {
    data: Vec<u8>,
}

trait Handler: Send + Sync {
    fn handle(&self) -> usize;
}

struct HandlerA;
struct HandlerB;
struct HandlerC;

impl Handler for HandlerA {
    fn handle(&self) -> usize {
        1
    }
}

impl Handler for HandlerB {
    fn handle(&self) -> usize {
        2
    }
}

impl Handler for HandlerC {
    fn handle(&self) -> usize {
        3
    }
}

#[allow(dead_code)]
struct RequestHandler {
    small: Arc<SmallService>,
    medium: Arc<MediumService>,
}

fn populated() -> Container {
    let mut builder = ContainerBuilder::new();
    builder.register_instance(SmallService { value: 42 });
    builder
        .register(|_| {
            Ok(MediumService {
                name: "test".to_string(),
                values: vec![1, 2, 3, 4, 5],
            })
        })
        .instance_per_lifetime_scope();
    builder.register(|ctx| {
        Ok(RequestHandler {
            small: ctx.get()?,
            medium: ctx.get()?,
        })
    });
    builder
        .register(|_| Ok(HandlerA))
        .as_service(|h| h as Arc<dyn Handler>)
        .with_metadata_value("order", 1);
    builder
        .register(|_| Ok(HandlerB))
        .as_service(|h| h as Arc<dyn Handler>)
        .with_metadata_value("order", 2);
    builder
        .register(|_| Ok(HandlerC))
        .as_service(|h| h as Arc<dyn Handler>)
        .with_metadata_value("order", 3);
    builder.build()
}

fn bench_registration(c: &mut Criterion) {
    let mut group = c.benchmark_group("registration");

    group.bench_function("instance_small", |b| {
        b.iter(|| {
            let mut builder = ContainerBuilder::new();
            builder.register_instance(SmallService { value: 42 });
            black_box(builder.build())
        })
    });

    group.bench_function("delegate_as_service", |b| {
        b.iter(|| {
            let mut builder = ContainerBuilder::new();
            builder
                .register(|_| Ok(HandlerA))
                .as_service(|h| h as Arc<dyn Handler>)
                .single_instance();
            black_box(builder.build())
        })
    });

    group.bench_function("populated_build", |b| b.iter(|| black_box(populated())));

    group.finish();
}

fn bench_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution");
    group.throughput(Throughput::Elements(1));

    let container = populated();
    let scope = container.begin_scope().unwrap();

    group.bench_function("get_single_instance", |b| {
        b.iter(|| black_box(container.get::<SmallService>().unwrap()))
    });

    group.bench_function("get_per_scope_cached", |b| {
        b.iter(|| black_box(scope.get::<MediumService>().unwrap()))
    });

    group.bench_function("get_per_dependency_graph", |b| {
        b.iter(|| black_box(scope.get::<RequestHandler>().unwrap()))
    });

    group.bench_function("get_trait_service", |b| {
        b.iter(|| black_box(container.get::<dyn Handler>().unwrap()))
    });

    group.bench_function("contains_check", |b| {
        b.iter(|| black_box(container.contains::<SmallService>()))
    });

    group.bench_function("try_get_not_found", |b| {
        b.iter(|| black_box(container.try_get::<LargeService>().unwrap()))
    });

    group.finish();
}

fn bench_relationships(c: &mut Criterion) {
    let mut group = c.benchmark_group("relationships");

    let container = populated();

    group.bench_function("vec_of_three", |b| {
        b.iter(|| black_box(container.resolve::<Vec<Arc<dyn Handler>>>().unwrap()))
    });

    group.bench_function("vec_of_meta", |b| {
        b.iter(|| black_box(container.resolve::<Vec<Meta<dyn Handler>>>().unwrap()))
    });

    group.bench_function("lazy_create_and_value", |b| {
        b.iter(|| {
            let lazy = container.resolve::<Lazy<dyn Handler>>().unwrap();
            black_box(lazy.value().unwrap())
        })
    });

    let func = container.resolve::<Func<dyn Handler>>().unwrap();
    group.bench_function("func_call", |b| b.iter(|| black_box(func.call().unwrap())));

    group.finish();
}

fn bench_scopes(c: &mut Criterion) {
    let mut group = c.benchmark_group("scopes");

    let container = populated();

    group.bench_function("begin_and_dispose", |b| {
        b.iter(|| {
            let scope = container.begin_scope().unwrap();
            scope.dispose();
            black_box(scope)
        })
    });

    group.bench_function("request_lifecycle", |b| {
        b.iter(|| {
            let scope = container.begin_tagged_scope("request").unwrap();
            let handler = scope.get::<RequestHandler>().unwrap();
            black_box(handler);
        })
    });

    group.bench_function("nested_depth_4", |b| {
        b.iter(|| {
            // Parents must stay alive for the innermost scope to stay usable
            let mut scopes = vec![container.begin_scope().unwrap()];
            for _ in 0..3 {
                let next = scopes[scopes.len() - 1].begin_scope().unwrap();
                scopes.push(next);
            }
            black_box(scopes[3].get::<SmallService>().unwrap())
        })
    });

    group.finish();
}

fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");

    group.bench_function("concurrent_scopes_4", |b| {
        let container = populated();

        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let container = container.clone();
                    thread::spawn(move || {
                        for _ in 0..100 {
                            let scope = container.begin_scope().unwrap();
                            let _ = scope.get::<RequestHandler>().unwrap();
                        }
                    })
                })
                .collect();

            for h in handles {
                h.join().unwrap();
            }
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_registration,
    bench_resolution,
    bench_relationships,
    bench_scopes,
    bench_concurrent,
);

criterion_main!(benches);
