// Benchmarks for centroid similarity, label resolution and plan matching
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ontomatch::testing::{ScriptedArbiter, TableEmbedder};
use ontomatch::{
    AttributeResolver, Classifier, ClassifyMode, Clause, Config, Context, FilterPlan, Item,
    MemoryStore, Occurrence, SavedFilter, Store, Vector,
};
use rand::prelude::*;
use std::hint::black_box;
use std::sync::Arc;

const DIM: usize = 256;

fn random_vector(rng: &mut impl Rng, dim: usize) -> Vec<f32> {
    (0..dim).map(|_| rng.random_range(-1.0f32..1.0f32)).collect()
}

fn benchmark_cosine(c: &mut Criterion) {
    let mut rng = rand::rng();
    let a = Vector::new(random_vector(&mut rng, DIM));
    let b = Vector::new(random_vector(&mut rng, DIM));

    c.bench_function("cosine_similarity_256", |bench| {
        bench.iter(|| black_box(a.cosine_similarity(black_box(&b))));
    });
}

fn benchmark_resolve(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("resolve_merge");

    for nodes in [100usize, 1_000, 10_000] {
        let mut rng = rand::rng();
        let store = Arc::new(MemoryStore::new());
        for i in 0..nodes {
            store
                .create_attr_node(&format!("attr-{}", i), Vector::new(random_vector(&mut rng, DIM)))
                .unwrap();
        }
        // Identical to the last node, so every resolution merges
        let probe = store.attr_nodes().unwrap().pop().unwrap().centroid.into_inner();
        let ctx = Context::builder(Config::default(), store)
            .embedder(Arc::new(TableEmbedder::new().with("probe", probe)))
            .arbiter(Arc::new(ScriptedArbiter::new()))
            .build();
        let resolver = AttributeResolver::new(&ctx);

        group.bench_with_input(BenchmarkId::from_parameter(nodes), &nodes, |b, _| {
            b.to_async(&rt).iter(|| async {
                black_box(resolver.resolve("probe").await.unwrap());
            });
        });
    }

    group.finish();
}

fn seeded_classifier(items: usize, filters: usize) -> Classifier {
    let mut rng = rand::rng();
    let store = Arc::new(MemoryStore::new());

    for i in 0..items {
        let id = format!("sku-{}", i);
        store.upsert_item(Item::new(&id, "Кабель", "")).unwrap();
        let section: f64 = rng.random_range(0.5..50.0);
        let voltage: f64 = rng.random_range(0.2..1.0);
        store
            .add_occurrences(vec![
                Occurrence::new(&id, "сечение", section.to_string()).with_number(section, Some("мм2")),
                Occurrence::new(&id, "напряжение", voltage.to_string()).with_number(voltage, Some("кВ")),
                Occurrence::new(&id, "материал", if i % 3 == 0 { "алюминий" } else { "медь" }),
            ])
            .unwrap();
    }

    for f in 0..filters {
        let plan = FilterPlan::new()
            .must(Clause::range("сечение", f as f64, f as f64 + 10.0).with_unit("мм2"))
            .must(Clause::gte("напряжение", 300.0).with_unit("В"))
            .must_not(Clause::eq("материал", "алюминий"));
        store
            .save_filter(SavedFilter::new(format!("f-{}", f), format!("filter {}", f), plan))
            .unwrap();
    }

    Classifier::new(&Context::builder(Config::default(), store).build())
}

fn benchmark_classify(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("classify_all_matching");
    group.sample_size(20);

    for items in [100usize, 1_000] {
        let classifier = seeded_classifier(items, 20);
        group.bench_with_input(BenchmarkId::from_parameter(items), &items, |b, _| {
            b.to_async(&rt).iter(|| async {
                black_box(classifier.classify(ClassifyMode::AllMatching).await.unwrap());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_cosine, benchmark_resolve, benchmark_classify);
criterion_main!(benches);
