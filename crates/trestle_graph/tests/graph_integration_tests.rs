//! Integration tests for TripleStore
//!
//! Tests store operations across both backends, ingestion, interchange
//! formats and data integrity.

use std::collections::HashSet;
use trestle_graph::rdf::{ParserConfig, RdfTriple, TurtleParser};
use trestle_graph::{
    Error, RdfFormat, SimpleIndex, StoreConfig, Term, Triple, TriplePattern, TripleStore,
};

fn ex(local: &str) -> Term {
    Term::iri(format!("http://example.org/{}", local))
}

fn stores() -> Vec<(&'static str, TripleStore, Option<tempfile::TempDir>)> {
    let mut stores = vec![(
        "memory",
        TripleStore::open(StoreConfig::memory().with_scan_batch_size(3)).unwrap(),
        None,
    )];
    #[cfg(feature = "sqlite-backend")]
    {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::sqlite(dir.path().join("graph.db")).with_scan_batch_size(3);
        stores.push(("sqlite", TripleStore::open(config).unwrap(), Some(dir)));
    }
    stores
}

fn all(store: &TripleStore, pattern: TriplePattern) -> Vec<Triple> {
    store.scan(pattern).collect::<trestle_graph::Result<_>>().unwrap()
}

// ============================================================================
// Insert / Scan Tests
// ============================================================================

#[test]
fn test_insert_idempotence() {
    for (name, store, _dir) in stores() {
        let t = RdfTriple::new(ex("a"), ex("p"), Term::literal("1"));
        assert!(store.add_triple(&t, None).unwrap(), "{}", name);
        let before = all(&store, TriplePattern::any());

        assert!(!store.add_triple(&t, None).unwrap(), "{}", name);
        assert_eq!(store.count().unwrap(), 1, "{}", name);
        assert_eq!(all(&store, TriplePattern::any()), before, "{}", name);
    }
}

#[test]
fn test_three_row_scenario() {
    for (name, store, _dir) in stores() {
        store
            .load_turtle(
                "scenario.ttl",
                r#"@prefix ex: <http://example.org/> .
                   ex:a ex:p "1" , "2" .
                   ex:b ex:p "3" ."#,
            )
            .unwrap();

        let p = store.lookup_existing(&ex("p")).unwrap().unwrap();
        let rows: HashSet<(Term, Term)> = all(&store, TriplePattern::any().with_predicate(p))
            .iter()
            .map(|t| {
                let (triple, _) = store.decode(t).unwrap();
                (triple.subject, triple.object)
            })
            .collect();

        let expected: HashSet<(Term, Term)> = [
            (ex("a"), Term::literal("1")),
            (ex("a"), Term::literal("2")),
            (ex("b"), Term::literal("3")),
        ]
        .into_iter()
        .collect();
        assert_eq!(rows, expected, "{}", name);
    }
}

#[test]
fn test_every_pattern_shape_is_complete() {
    for (name, store, _dir) in stores() {
        let graphs = [None, Some(ex("g1")), Some(ex("g2"))];
        for (i, graph) in graphs.iter().enumerate() {
            for n in 0..4 {
                let t = RdfTriple::new(
                    ex(&format!("s{}", n % 2)),
                    ex(&format!("p{}", n % 3)),
                    Term::integer((i * 10 + n) as i64),
                );
                store.add_triple(&t, graph.as_ref()).unwrap();
            }
        }
        let everything = all(&store, TriplePattern::any());
        assert_eq!(everything.len(), 12, "{}", name);

        for stored in &everything {
            let ids = stored.to_array();
            for mask in 0u8..16 {
                let mut pattern = [None; 4];
                for (i, id) in ids.iter().enumerate() {
                    if mask & (1 << i) != 0 {
                        pattern[i] = Some(*id);
                    }
                }
                let pattern = TriplePattern::from_array(pattern);
                let hits = all(&store, pattern);
                assert!(hits.contains(stored), "{} mask {:04b}", name, mask);
                assert!(hits.iter().all(|t| pattern.matches(t)), "{}", name);
                assert_eq!(hits.len(), store.count_matching(&pattern).unwrap());
            }
        }
    }
}

#[test]
fn test_delete_by_pattern() {
    for (name, store, _dir) in stores() {
        for n in 0..10 {
            store
                .add_triple(&RdfTriple::new(ex("s"), ex("p"), Term::integer(n)), None)
                .unwrap();
        }
        store
            .add_triple(&RdfTriple::new(ex("t"), ex("p"), Term::integer(0)), None)
            .unwrap();

        let s = store.lookup_existing(&ex("s")).unwrap().unwrap();
        assert_eq!(
            store.delete(&TriplePattern::any().with_subject(s)).unwrap(),
            10,
            "{}",
            name
        );
        assert_eq!(store.count().unwrap(), 1, "{}", name);
        assert_eq!(store.delete(&TriplePattern::any().with_subject(s)).unwrap(), 0);
    }
}

// ============================================================================
// Ingestion Tests
// ============================================================================

#[test]
fn test_load_into_named_graph() {
    for (name, store, _dir) in stores() {
        let graph = ex("people");
        let count = store
            .load(
                "people.ttl",
                r#"@prefix foaf: <http://xmlns.com/foaf/0.1/> .
                   <http://example.org/alice> foaf:knows [ foaf:name "Bob" ] ;
                       foaf:interest ( "rdf" "sparql" ) ."#,
                RdfFormat::Turtle,
                Some(&graph),
            )
            .unwrap();
        // knows, name, interest, and two cells of first/rest
        assert_eq!(count, 7, "{}", name);
        assert_eq!(store.triples(None).unwrap().len(), 0, "{}", name);
        assert_eq!(store.triples(Some(&graph)).unwrap().len(), 7, "{}", name);
        assert_eq!(store.graph_names().unwrap(), vec![graph], "{}", name);
    }
}

#[test]
fn test_syntax_error_reports_source_and_position() {
    let store = TripleStore::memory().unwrap();
    let err = store
        .load_turtle("broken.ttl", "<http://a> <http://b> <http://c> .\n<http://a> <http://b> \"x\"@ .")
        .unwrap_err();
    match err {
        Error::Syntax {
            source_id, line, ..
        } => {
            assert_eq!(source_id, "broken.ttl");
            assert_eq!(line, 2);
        }
        other => panic!("unexpected error {:?}", other),
    }
    // The first statement was delivered before the error.
    assert_eq!(store.count().unwrap(), 1);
    // And the store is still usable.
    assert_eq!(
        store
            .load_turtle("fixed.ttl", "<http://a> <http://b> \"x\"@en .")
            .unwrap(),
        1
    );
}

#[test]
fn test_blank_nodes_do_not_merge_across_documents() {
    let store = TripleStore::memory().unwrap();
    let doc = "_:x <http://example.org/p> \"v\" .";
    store.load_turtle("one.ttl", doc).unwrap();
    store.load_turtle("two.ttl", doc).unwrap();
    assert_eq!(store.count().unwrap(), 2);
}

#[test]
fn test_seeded_parser_is_deterministic() {
    let doc = "[] <http://example.org/p> ( 1 2 ) .";
    let first = TurtleParser::new(ParserConfig::default().with_seed(42))
        .parse_to_vec("doc", doc)
        .unwrap();
    let second = TurtleParser::new(ParserConfig::default().with_seed(42))
        .parse_to_vec("doc", doc)
        .unwrap();
    assert_eq!(first, second);

    let store = TripleStore::memory().unwrap();
    let mut parser = TurtleParser::new(ParserConfig::default().with_seed(42));
    store.load_with(&mut parser, "doc", doc, None).unwrap();
    let mut stored = store.triples(None).unwrap();
    let mut expected = first.clone();
    stored.sort();
    expected.sort();
    assert_eq!(stored, expected);
}

// ============================================================================
// Interchange Tests
// ============================================================================

#[test]
fn test_turtle_export_reimports() {
    for (name, store, _dir) in stores() {
        store
            .load_turtle(
                "src.ttl",
                r#"@prefix ex: <http://example.org/> .
                   ex:a ex:p 1, 2.5, true, "x\ny"@en, ex:b ."#,
            )
            .unwrap();
        let exported = store.export(RdfFormat::Turtle, None).unwrap();

        let copy = TripleStore::memory().unwrap();
        copy.load_turtle("copy.ttl", &exported).unwrap();
        let original: HashSet<RdfTriple> = store.triples(None).unwrap().into_iter().collect();
        let reimported: HashSet<RdfTriple> = copy.triples(None).unwrap().into_iter().collect();
        assert_eq!(original, reimported, "{}", name);
    }
}

#[test]
fn test_simple_index_import() {
    let index = SimpleIndex::from_json(
        r#"{
            "http://example.org/alice": {
                "http://xmlns.com/foaf/0.1/name": [
                    {"value": "Alice", "type": "literal", "lang": "en"},
                    {"value": "42", "type": "literal", "datatype": "http://www.w3.org/2001/XMLSchema#integer"}
                ],
                "http://xmlns.com/foaf/0.1/knows": [
                    {"value": "n1", "type": "bnode"},
                    {"value": "http://example.org/bob", "type": "uri"}
                ]
            }
        }"#,
    )
    .unwrap();

    let store = TripleStore::memory().unwrap();
    assert_eq!(store.insert_simple_index(&index, None).unwrap(), 4);
    assert_eq!(store.count().unwrap(), 4);
    assert!(store
        .lookup_existing(&Term::integer(42))
        .unwrap()
        .is_some());

    let exported = store.simple_index(None).unwrap();
    assert_eq!(exported.len(), 4);
}

// ============================================================================
// Persistence Tests
// ============================================================================

#[cfg(feature = "sqlite-backend")]
#[test]
fn test_sqlite_reopen_keeps_ids() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ids.db");

    let id = {
        let store = TripleStore::sqlite(&path).unwrap();
        store
            .add_triple(&RdfTriple::new(ex("a"), ex("p"), Term::literal("v")), None)
            .unwrap();
        store.flush().unwrap();
        store.lookup_existing(&ex("a")).unwrap().unwrap()
    };

    let store = TripleStore::sqlite(&path).unwrap();
    assert_eq!(store.lookup_existing(&ex("a")).unwrap(), Some(id));
    assert_eq!(store.intern(&ex("a")).unwrap(), id);
    assert_eq!(store.resolve(id).unwrap(), ex("a"));
    assert_eq!(store.count().unwrap(), 1);
}
