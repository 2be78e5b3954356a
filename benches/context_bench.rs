//! Benchmarks for the application context

use bean_context::{
    ApplicationContext, BeanType, Binding, ComponentCatalog, InjectCell, Param, PropertyResolver,
};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;

trait Store: Send + Sync {
    fn size(&self) -> usize;
}

struct MemoryStore {
    capacity: usize,
}

impl Store for MemoryStore {
    fn size(&self) -> usize {
        self.capacity
    }
}

struct Service {
    store: Arc<dyn Store>,
    label: InjectCell<String>,
}

#[derive(Default)]
struct Unused;

fn store_catalog() -> ComponentCatalog {
    ComponentCatalog::new().with(
        BeanType::builder::<MemoryStore>()
            .view::<dyn Store>(|s| s as Arc<dyn Store>)
            .component()
            .type_name("bench::MemoryStore")
            .constructor(vec![Param::value::<usize>("${store.capacity:1024}")], |args| {
                Ok(MemoryStore {
                    capacity: args.take(0)?,
                })
            })
            .build(),
    )
}

/// One store plus `services` beans depending on it
fn catalog(services: usize) -> ComponentCatalog {
    let mut catalog = store_catalog();
    for i in 0..services {
        catalog.register(
            BeanType::builder::<Service>()
                .field(
                    "label",
                    Binding::value::<String>("${service.label:bench}"),
                    |s: &Service, v: String| Ok(s.label.set(v)?),
                )
                .component()
                .type_name(format!("bench::Service{i}"))
                .named(format!("service{i}"))
                .constructor(vec![Param::autowired::<dyn Store>()], |args| {
                    Ok(Service {
                        store: args.take(0)?,
                        label: InjectCell::new(),
                    })
                })
                .build(),
        );
    }
    catalog
}

fn bench_bootstrap(c: &mut Criterion) {
    let mut group = c.benchmark_group("bootstrap");

    for services in [1usize, 10, 100] {
        let catalog = Arc::new(catalog(services));
        group.throughput(Throughput::Elements(services as u64 + 1));
        group.bench_with_input(BenchmarkId::from_parameter(services), &catalog, |b, catalog| {
            b.iter(|| {
                let context = ApplicationContext::builder(Arc::clone(catalog))
                    .build()
                    .unwrap();
                black_box(context)
            })
        });
    }

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");
    group.throughput(Throughput::Elements(1));

    let context = ApplicationContext::builder(catalog(10).with(
        BeanType::builder::<Unused>()
            .plain()
            .type_name("bench::Unused")
            .default_constructor()
            .build(),
    ))
    .build()
    .unwrap();

    group.bench_function("get_bean_by_trait", |b| {
        b.iter(|| {
            let store = context.get_bean::<dyn Store>().unwrap();
            black_box(store.size())
        })
    });

    group.bench_function("get_bean_named", |b| {
        b.iter(|| {
            let service = context.get_bean_named::<Service>("service7").unwrap();
            black_box(service.store.size())
        })
    });

    group.bench_function("get_bean_by_name", |b| {
        b.iter(|| black_box(context.get_bean_by_name("service3").unwrap()))
    });

    group.bench_function("get_beans", |b| {
        b.iter(|| black_box(context.get_beans::<Service>().unwrap().len()))
    });

    group.bench_function("exists_missing", |b| {
        b.iter(|| black_box(context.exists_bean("unused")))
    });

    group.finish();
}

fn bench_properties(c: &mut Criterion) {
    let mut group = c.benchmark_group("properties");
    group.throughput(Throughput::Elements(1));

    let properties = PropertyResolver::from_pairs([
        ("server.host", "localhost"),
        ("server.port", "8080"),
        ("server.url", "http://${server.host}:${server.port}"),
    ]);

    group.bench_function("get_as_u16", |b| {
        b.iter(|| black_box(properties.get_required_as::<u16>("server.port").unwrap()))
    });

    group.bench_function("nested_expression", |b| {
        b.iter(|| black_box(properties.get_required("server.url").unwrap()))
    });

    group.bench_function("default_expression", |b| {
        b.iter(|| black_box(properties.get_required("${server.timeout:30}").unwrap()))
    });

    group.finish();
}

fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");

    group.bench_function("concurrent_reads_4", |b| {
        let context = Arc::new(ApplicationContext::builder(catalog(10)).build().unwrap());

        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let context = Arc::clone(&context);
                    thread::spawn(move || {
                        for _ in 0..100 {
                            let _ = context.get_bean::<dyn Store>().unwrap();
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
    bench_bootstrap,
    bench_lookup,
    bench_properties,
    bench_concurrent,
);

criterion_main!(benches);
