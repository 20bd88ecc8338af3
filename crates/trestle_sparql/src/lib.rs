//! Trestle SPARQL - Query Engine for the Trestle Triple Store
//!
//! Parses SPARQL 1.1 text into an algebra tree, compiles it against a
//! [`TripleStore`] by translating every concrete term to its dictionary id,
//! and executes the plan as streaming nested-loop joins over the store's
//! permutation indexes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Trestle SPARQL                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  text ──► Lexer ──► Parser ──► Algebra                       │
//! │                                   │                          │
//! │                     ┌─────────────▼──────────────┐           │
//! │                     │ Compiler                    │           │
//! │                     │ term → id (lookup only)     │           │
//! │                     │ slots, dataset, graph scope │           │
//! │                     └─────────────┬──────────────┘           │
//! │                                   │                          │
//! │                     ┌─────────────▼──────────────┐           │
//! │                     │ Executor                    │           │
//! │                     │ lazy scans │ joins │ filters│           │
//! │                     └─────────────┬──────────────┘           │
//! │                                   │                          │
//! │                          QueryResults (JSON)                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use trestle_graph::TripleStore;
//! use trestle_sparql::SparqlEngine;
//!
//! let store = TripleStore::memory()?;
//! store.load_turtle("people.ttl", r#"
//!     @prefix ex: <http://example.org/> .
//!     ex:alice ex:knows ex:bob .
//!     ex:bob ex:knows ex:carol .
//! "#)?;
//!
//! let engine = SparqlEngine::new(&store);
//! let results = engine.query(
//!     "PREFIX ex: <http://example.org/> SELECT ?who WHERE { ex:alice ex:knows ?who }",
//! )?;
//! assert_eq!(results.rows().len(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! A pattern naming a term the store has never seen produces no solutions
//! without scanning anything. Filter type errors drop the offending solution;
//! storage faults abort the query.

pub mod algebra;
pub mod compile;
pub mod error;
pub mod executor;
pub mod expression;
pub mod lexer;
pub mod parser;
pub mod results;

pub use error::{Error, Result};
pub use parser::{parse_query, parse_update};
pub use results::{QueryResults, QuerySolution};

use algebra::{Query, Update, UpdateOperation};
use compile::{compile_query, CompiledForm};
use executor::Executor;
use indexmap::IndexMap;
use lexer::Token;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use trestle_graph::rdf::RdfTriple;
use trestle_graph::{Term, TripleStore};

/// What the default graph of a query without FROM is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultGraphMode {
    /// The merge of every graph in the store.
    #[default]
    Union,
    /// Only triples outside any named graph.
    DefaultOnly,
}

/// Cooperative cancellation flag, shared between the caller and a running
/// query.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-engine query settings.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub default_graph: DefaultGraphMode,
    /// Order the patterns of each basic graph pattern by estimated
    /// selectivity instead of the order written.
    pub reorder_patterns: bool,
    pub cancel: Option<CancelToken>,
}

impl QueryOptions {
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Runs SPARQL queries and updates against one store.
pub struct SparqlEngine<'a> {
    store: &'a TripleStore,
    options: QueryOptions,
}

impl<'a> SparqlEngine<'a> {
    pub fn new(store: &'a TripleStore) -> Self {
        Self::with_options(store, QueryOptions::default())
    }

    pub fn with_options(store: &'a TripleStore, options: QueryOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn store(&self) -> &'a TripleStore {
        self.store
    }

    /// Runs a SELECT, ASK or CONSTRUCT query.
    ///
    /// # Errors
    ///
    /// `Error::Syntax` with the position of malformed text,
    /// `Error::Unsupported` for recognised but unsupported constructs and
    /// `Error::Graph` for storage faults.
    pub fn query(&self, text: &str) -> Result<QueryResults> {
        let query = parse_query(text)?;
        self.evaluate(&query)
    }

    /// Applies INSERT DATA / DELETE DATA operations in order. Each operation
    /// is applied as one batch; operations before a failing one stay applied.
    pub fn update(&self, text: &str) -> Result<QueryResults> {
        let update = parse_update(text)?;
        self.apply(&update)
    }

    /// Runs `text` as an update when its first keyword after the prologue is
    /// an update verb, as a query otherwise.
    pub fn execute(&self, text: &str) -> Result<QueryResults> {
        if is_update(text)? {
            self.update(text)
        } else {
            self.query(text)
        }
    }

    /// Evaluates a parsed query.
    pub fn evaluate(&self, query: &Query) -> Result<QueryResults> {
        let compiled = compile_query(self.store, query, &self.options)?;
        let executor = Executor::new(
            self.store,
            compiled.slots.len(),
            self.options.cancel.as_ref(),
        );
        let mut solutions = executor
            .execute(&compiled.plan)
            .take_while(|_| !executor.is_cancelled());

        let results = match &compiled.form {
            CompiledForm::Select { variables, slots } => {
                let names: Arc<[String]> =
                    variables.iter().map(|v| v.name().to_string()).collect();
                let mut rows = Vec::new();
                for row in solutions {
                    let row = row?;
                    let values = slots
                        .iter()
                        .map(|slot| row[*slot].as_ref().map(|v| executor.term(v)).transpose())
                        .collect::<Result<Vec<_>>>()?;
                    rows.push(QuerySolution::new(names.clone(), values));
                }
                debug!("query produced {} solutions", rows.len());
                QueryResults::Solutions {
                    variables: names.to_vec(),
                    rows,
                }
            }
            CompiledForm::Ask => QueryResults::Boolean(solutions.next().transpose()?.is_some()),
            CompiledForm::Construct { template } => {
                let triples = executor.construct(template, solutions)?;
                debug!("query constructed {} triples", triples.len());
                QueryResults::Graph(triples)
            }
        };
        if executor.is_cancelled() {
            warn!("query cancelled, returning partial results");
        }
        Ok(results)
    }

    /// Applies a parsed update.
    pub fn apply(&self, update: &Update) -> Result<QueryResults> {
        let mut inserted = 0;
        let mut deleted = 0;
        for operation in &update.operations {
            match operation {
                UpdateOperation::InsertData(quads) => {
                    let mut by_graph: IndexMap<Option<&Term>, Vec<&RdfTriple>> = IndexMap::new();
                    for quad in quads {
                        by_graph
                            .entry(quad.graph.as_ref())
                            .or_default()
                            .push(&quad.triple);
                    }
                    for (graph, triples) in by_graph {
                        inserted += self.store.add_triples(triples, graph)?;
                    }
                }
                UpdateOperation::DeleteData(quads) => {
                    for quad in quads {
                        if self.store.remove_triple(&quad.triple, quad.graph.as_ref())? {
                            deleted += 1;
                        }
                    }
                }
            }
        }
        debug!("update inserted {} and deleted {} triples", inserted, deleted);
        Ok(QueryResults::Update { inserted, deleted })
    }
}

const UPDATE_VERBS: &[&str] = &[
    "INSERT", "DELETE", "LOAD", "CLEAR", "DROP", "CREATE", "ADD", "MOVE", "COPY", "WITH",
];

fn is_update(text: &str) -> Result<bool> {
    let tokens = lexer::tokenize(text)?;
    let mut tokens = tokens.iter().map(|t| &t.token).peekable();
    loop {
        match tokens.next() {
            Some(t) if t.is_keyword("BASE") => {
                tokens.next();
            }
            Some(t) if t.is_keyword("PREFIX") => {
                tokens.next();
                tokens.next();
            }
            Some(t @ Token::Name(_)) => {
                return Ok(UPDATE_VERBS.iter().any(|verb| t.is_keyword(verb)))
            }
            _ => return Ok(false),
        }
    }
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: &str = r#"
        @prefix ex: <http://example.org/> .
        ex:alice ex:name "Alice" ; ex:age 30 ; ex:knows ex:bob .
        ex:bob ex:name "Bob" ; ex:age 25 .
        ex:carol ex:name "Carol" ; ex:knows ex:alice .
    "#;

    fn store() -> TripleStore {
        let store = TripleStore::memory().unwrap();
        store.load_turtle("people.ttl", DATA).unwrap();
        store
    }

    fn select(store: &TripleStore, text: &str) -> Vec<QuerySolution> {
        let text = format!("PREFIX ex: <http://example.org/> {}", text);
        SparqlEngine::new(store).query(&text).unwrap().rows().to_vec()
    }

    fn names(rows: &[QuerySolution], var: &str) -> Vec<String> {
        let mut names: Vec<String> = rows
            .iter()
            .filter_map(|r| r.get(var).map(|t| t.value().to_string()))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_three_row_join() {
        let store = store();
        let rows = select(&store, "SELECT ?s ?n WHERE { ?s ex:name ?n }");
        assert_eq!(rows.len(), 3);
        assert_eq!(names(&rows, "n"), vec!["Alice", "Bob", "Carol"]);
    }

    #[test]
    fn test_optional_keeps_left() {
        let store = store();
        let rows = select(
            &store,
            "SELECT ?n ?age WHERE { ?s ex:name ?n OPTIONAL { ?s ex:age ?age } }",
        );
        assert_eq!(rows.len(), 3);
        let carol = rows
            .iter()
            .find(|r| r.get("n") == Some(&Term::literal("Carol")))
            .unwrap();
        assert_eq!(carol.get("age"), None);
    }

    #[test]
    fn test_absent_term_is_empty_not_error() {
        let store = store();
        let rows = select(&store, "SELECT * WHERE { ?s ex:neverSeen ?o }");
        assert!(rows.is_empty());
        assert_eq!(
            store
                .lookup_existing(&Term::iri("http://example.org/neverSeen"))
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_filter_type_error_drops_row() {
        let store = store();
        // ex:carol has no age, so the comparison is a type error
        let rows = select(
            &store,
            "SELECT ?n WHERE { ?s ex:name ?n OPTIONAL { ?s ex:age ?a } FILTER(?a > 26) }",
        );
        assert_eq!(names(&rows, "n"), vec!["Alice"]);
    }

    #[test]
    fn test_ask_and_construct() {
        let store = store();
        let engine = SparqlEngine::new(&store);
        let ask = engine
            .query("ASK { <http://example.org/alice> ?p <http://example.org/bob> }")
            .unwrap();
        assert_eq!(ask.boolean(), Some(true));

        let graph = engine
            .query(
                "PREFIX ex: <http://example.org/> \
                 CONSTRUCT { ?b ex:knownBy ?a } WHERE { ?a ex:knows ?b }",
            )
            .unwrap();
        assert_eq!(graph.triples().len(), 2);
    }

    #[test]
    fn test_aggregates() {
        let store = store();
        let rows = select(
            &store,
            "SELECT (COUNT(?s) AS ?people) (SUM(?age) AS ?total) WHERE { ?s ex:name ?n OPTIONAL { ?s ex:age ?age } }",
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("people"), Some(&Term::integer(3)));
        assert_eq!(rows[0].get("total"), Some(&Term::integer(55)));
    }

    #[test]
    fn test_update_then_query() {
        let store = store();
        let engine = SparqlEngine::new(&store);
        let result = engine
            .execute(
                "PREFIX ex: <http://example.org/> \
                 INSERT DATA { ex:dave ex:name \"Dave\" } ; \
                 DELETE DATA { ex:bob ex:age 25 }",
            )
            .unwrap();
        assert_eq!(
            result,
            QueryResults::Update {
                inserted: 1,
                deleted: 1
            }
        );
        assert_eq!(select(&store, "SELECT ?n { ?s ex:name ?n }").len(), 4);
        assert!(select(&store, "SELECT ?a { ex:bob ex:age ?a }").is_empty());
    }

    #[test]
    fn test_cancelled_query_returns_partial_results() {
        let store = store();
        let cancel = CancelToken::new();
        cancel.cancel();
        let engine =
            SparqlEngine::with_options(&store, QueryOptions::default().with_cancel(cancel));
        let results = engine.query("SELECT * { ?s ?p ?o }").unwrap();
        assert!(results.rows().is_empty());
    }

    #[test]
    fn test_named_graphs() {
        let store = store();
        let g = Term::iri("http://example.org/g");
        store
            .add_triple(
                &RdfTriple::new(
                    Term::iri("http://example.org/dave"),
                    Term::iri("http://example.org/name"),
                    Term::literal("Dave"),
                ),
                Some(&g),
            )
            .unwrap();

        // union default graph
        assert_eq!(select(&store, "SELECT ?n { ?s ex:name ?n }").len(), 4);
        // only the named graph
        let rows = select(&store, "SELECT ?n ?g { GRAPH ?g { ?s ex:name ?n } }");
        assert_eq!(names(&rows, "n"), vec!["Dave"]);
        assert_eq!(rows[0].get("g"), Some(&g));
        // FROM restricts the default graph
        let rows = select(&store, "SELECT ?n FROM ex:g { ?s ex:name ?n }");
        assert_eq!(names(&rows, "n"), vec!["Dave"]);

        let only_default = QueryOptions {
            default_graph: DefaultGraphMode::DefaultOnly,
            ..QueryOptions::default()
        };
        let rows = SparqlEngine::with_options(&store, only_default)
            .query("SELECT ?n { ?s <http://example.org/name> ?n }")
            .unwrap();
        assert_eq!(rows.rows().len(), 3);
    }

    #[test]
    fn test_is_update() {
        assert!(is_update("PREFIX ex: <http://e/> INSERT DATA { ex:a ex:b ex:c }").unwrap());
        assert!(!is_update("BASE <http://e/> SELECT * { ?s ?p ?o }").unwrap());
    }
}
