//! Benchmarks for trestle_graph
//!
//! Run with: cargo bench -p trestle_graph

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use trestle_graph::rdf::RdfTriple;
use trestle_graph::{Term, TriplePattern, TripleStore};

fn sample(i: usize) -> RdfTriple {
    RdfTriple::new(
        Term::iri(format!("http://example.org/user/{}", i % 10)),
        Term::iri(format!("http://example.org/prop/{}", i % 5)),
        Term::integer(i as i64),
    )
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    for size in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::new("memory", size), size, |b, &size| {
            b.iter(|| {
                let store = TripleStore::memory().unwrap();
                for i in 0..size {
                    store.add_triple(black_box(&sample(i)), None).unwrap();
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("memory_batch", size), size, |b, &size| {
            let triples: Vec<RdfTriple> = (0..size).map(sample).collect();
            b.iter(|| {
                let store = TripleStore::memory().unwrap();
                store.add_triples(black_box(&triples), None).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let store = TripleStore::memory().unwrap();
    let triples: Vec<RdfTriple> = (0..1000).map(sample).collect();
    store.add_triples(&triples, None).unwrap();

    let subject = store
        .lookup_existing(&Term::iri("http://example.org/user/5"))
        .unwrap()
        .unwrap();
    let predicate = store
        .lookup_existing(&Term::iri("http://example.org/prop/2"))
        .unwrap()
        .unwrap();

    let mut group = c.benchmark_group("scan");

    group.bench_function("by_subject", |b| {
        b.iter(|| {
            store
                .scan(black_box(TriplePattern::any().with_subject(subject)))
                .count()
        });
    });

    group.bench_function("by_predicate", |b| {
        b.iter(|| {
            store
                .scan(black_box(TriplePattern::any().with_predicate(predicate)))
                .count()
        });
    });

    group.bench_function("full", |b| {
        b.iter(|| store.scan(black_box(TriplePattern::any())).count());
    });

    group.finish();
}

fn bench_intern(c: &mut Criterion) {
    let store = TripleStore::memory().unwrap();
    let term = Term::lang_literal("a reasonably long literal value", "en");
    store.intern(&term).unwrap();

    c.bench_function("intern_cached", |b| {
        b.iter(|| store.intern(black_box(&term)).unwrap());
    });

    c.bench_function("lookup_missing", |b| {
        let missing = Term::iri("http://example.org/never-inserted");
        b.iter(|| store.lookup_existing(black_box(&missing)).unwrap());
    });
}

fn bench_load_turtle(c: &mut Criterion) {
    let mut doc = String::from("@prefix ex: <http://example.org/> .\n");
    for i in 0..1000 {
        doc.push_str(&format!(
            "ex:s{} ex:name \"node {}\"@en ; ex:rank {} ; ex:tags ( ex:a ex:b ) .\n",
            i, i, i
        ));
    }

    c.bench_function("load_turtle_1000_subjects", |b| {
        b.iter(|| {
            let store = TripleStore::memory().unwrap();
            store.load_turtle("bench.ttl", black_box(&doc)).unwrap()
        });
    });
}

criterion_group!(benches, bench_insert, bench_scan, bench_intern, bench_load_turtle);
criterion_main!(benches);
