//! Benchmarks for trestle_sparql
//!
//! Run with: cargo bench -p trestle_sparql

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use trestle_graph::rdf::RdfTriple;
use trestle_graph::{Term, TripleStore};
use trestle_sparql::{parse_query, QueryOptions, SparqlEngine};

const PREFIX: &str = "PREFIX ex: <http://example.org/> ";

fn populated(size: usize) -> TripleStore {
    let store = TripleStore::memory().unwrap();
    let triples: Vec<RdfTriple> = (0..size)
        .flat_map(|i| {
            let person = Term::iri(format!("http://example.org/person/{}", i));
            [
                RdfTriple::new(
                    person.clone(),
                    Term::iri("http://example.org/age"),
                    Term::integer((i % 90) as i64),
                ),
                RdfTriple::new(
                    person,
                    Term::iri("http://example.org/knows"),
                    Term::iri(format!("http://example.org/person/{}", (i + 1) % size)),
                ),
            ]
        })
        .collect();
    store.add_triples(&triples, None).unwrap();
    store
}

fn bench_parse(c: &mut Criterion) {
    let query = format!(
        "{}SELECT ?s (COUNT(?f) AS ?n) WHERE {{ ?s ex:knows ?f . ?f ex:age ?a \
         OPTIONAL {{ ?s ex:age ?b }} FILTER(?a > 30 && REGEX(STR(?s), \"1$\")) }} \
         GROUP BY ?s ORDER BY DESC(?n) LIMIT 10",
        PREFIX
    );
    c.bench_function("parse_query", |b| {
        b.iter(|| parse_query(black_box(&query)).unwrap())
    });
}

fn bench_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");

    for size in [100, 1000].iter() {
        let store = populated(*size);
        let engine = SparqlEngine::new(&store);

        group.bench_with_input(BenchmarkId::new("two_hop", size), size, |b, _| {
            let query = format!(
                "{}SELECT ?a WHERE {{ ?s ex:knows ?f . ?f ex:age ?a }}",
                PREFIX
            );
            b.iter(|| engine.query(black_box(&query)).unwrap())
        });

        group.bench_with_input(BenchmarkId::new("filter", size), size, |b, _| {
            let query = format!(
                "{}SELECT ?s WHERE {{ ?s ex:age ?a FILTER(?a >= 45) }}",
                PREFIX
            );
            b.iter(|| engine.query(black_box(&query)).unwrap())
        });

        group.bench_with_input(BenchmarkId::new("group_by", size), size, |b, _| {
            let query = format!(
                "{}SELECT ?a (COUNT(?s) AS ?n) WHERE {{ ?s ex:age ?a }} GROUP BY ?a",
                PREFIX
            );
            b.iter(|| engine.query(black_box(&query)).unwrap())
        });

        group.bench_with_input(BenchmarkId::new("absent_term", size), size, |b, _| {
            let query = format!("{}SELECT * WHERE {{ ?s ex:missing ?o }}", PREFIX);
            b.iter(|| engine.query(black_box(&query)).unwrap())
        });
    }

    group.finish();
}

fn bench_reorder(c: &mut Criterion) {
    let store = populated(1000);
    let query = format!(
        "{}SELECT ?s WHERE {{ ?s ex:knows ?f . ?s ex:age 7 }}",
        PREFIX
    );
    let mut group = c.benchmark_group("reorder");

    for reorder in [false, true] {
        let engine = SparqlEngine::with_options(
            &store,
            QueryOptions {
                reorder_patterns: reorder,
                ..QueryOptions::default()
            },
        );
        group.bench_with_input(BenchmarkId::new("patterns", reorder), &reorder, |b, _| {
            b.iter(|| engine.query(black_box(&query)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse, bench_queries, bench_reorder);
criterion_main!(benches);
