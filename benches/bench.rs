//! Criterion benchmarks for the kontos attribute store:
//! - Change feed commit throughput
//! - Dictionary term and range lookup
//! - Posting materialization and iteration
//! - Attribute save

use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use kontos::attribute::multi_enum::MultiValueStringAttribute;
use kontos::attribute::saver::AttributeSaveTarget;
use kontos::attribute::{Change, CollectionType, Config};
use kontos::storage::memory::MemoryStorage;

const DOC_COUNT: u32 = 10_000;
const VOCABULARY: usize = 500;

fn term(i: usize) -> String {
    format!("term-{:04}", i % VOCABULARY)
}

fn populated_attr() -> Arc<MultiValueStringAttribute> {
    let attr = Arc::new(MultiValueStringAttribute::new(Config::new(
        "bench",
        CollectionType::Array,
    )));
    attr.add_docs(DOC_COUNT).unwrap();
    for doc in 0..DOC_COUNT {
        for k in 0..3 {
            attr.append_change(Change::insert(doc, term(doc as usize * 3 + k)))
                .unwrap();
        }
    }
    attr.on_commit().unwrap();
    attr
}

fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit");
    group.throughput(Throughput::Elements(DOC_COUNT as u64));

    group.bench_function("insert_10k_docs", |b| {
        b.iter(|| {
            let attr = MultiValueStringAttribute::new(Config::new(
                "bench",
                CollectionType::Array,
            ));
            attr.add_docs(DOC_COUNT).unwrap();
            for doc in 0..DOC_COUNT {
                attr.append_change(Change::insert(doc, term(doc as usize))).unwrap();
            }
            attr.on_commit().unwrap();
            black_box(attr.unique_value_count())
        })
    });

    let attr = populated_attr();
    group.bench_function("update_1k_docs", |b| {
        b.iter(|| {
            for doc in 0..1_000 {
                attr.append_change(Change::update(
                    doc,
                    vec![(term(doc as usize + 7), 1)],
                ))
                .unwrap();
            }
            attr.on_commit().unwrap();
            attr.reclaim_memory();
        })
    });
    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let attr = populated_attr();
    let mut group = c.benchmark_group("lookup");
    group.throughput(Throughput::Elements(1));

    group.bench_function("term", |b| {
        let needle = term(123);
        b.iter(|| black_box(attr.lookup_term(&needle)))
    });

    group.bench_function("doc_values", |b| {
        b.iter(|| black_box(attr.get_values(4_321)))
    });
    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let attr = populated_attr();
    let mut group = c.benchmark_group("search");
    group.throughput(Throughput::Elements(DOC_COUNT as u64));

    group.bench_function("term_postings", |b| {
        let needle = term(42);
        b.iter(|| {
            let mut context = attr.search_context(&needle);
            let mut it = context.create_posting_iterator(true).unwrap();
            let mut hits = 0u64;
            while !it.is_exhausted() {
                hits += 1;
                it.next().unwrap();
            }
            black_box(hits)
        })
    });

    group.bench_function("range_postings", |b| {
        let low = term(100);
        let high = term(150);
        b.iter(|| {
            let mut context = attr.range_search_context(&low, &high);
            let mut it = context.create_posting_iterator(true).unwrap();
            let mut hits = 0u64;
            while !it.is_exhausted() {
                hits += 1;
                it.next().unwrap();
            }
            black_box(hits)
        })
    });
    group.finish();
}

fn bench_save(c: &mut Criterion) {
    let attr = populated_attr();
    let mut group = c.benchmark_group("persistence");
    group.throughput(Throughput::Elements(DOC_COUNT as u64));

    group.bench_function("save_10k_docs", |b| {
        b.iter(|| {
            let target =
                AttributeSaveTarget::new(Arc::new(MemoryStorage::new()), "bench");
            attr.on_init_save().unwrap().save(&target).unwrap();
            black_box(target.exists())
        })
    });
    group.finish();
}

criterion_group!(benches, bench_commit, bench_lookup, bench_search, bench_save);
criterion_main!(benches);
