//! Trestle Graph - Embeddable RDF Triple Store
//!
//! Stores RDF quads as compact integer tuples. Every term (IRI, blank node or
//! literal) is interned once in a hash-keyed dictionary, and every quad is
//! kept under six permutations of its positions so that any triple pattern
//! becomes a range scan.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Trestle Graph                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │                    Ingestion                          │   │
//! │  │  Turtle / N-Triples parser │ Simple index import     │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                           │                                  │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │                   Triple Store                        │   │
//! │  │  ┌────────────────┐   ┌─────────────────────────┐    │   │
//! │  │  │ Term Dictionary│   │ SPOG POSG OSPG          │    │   │
//! │  │  │ blake3 ids     │   │ GSPO GPOS GOSP  Indexes │    │   │
//! │  │  └────────────────┘   └─────────────────────────┘    │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                           │                                  │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │              Storage Backends                         │   │
//! │  │  SQLite (terms + quads tables) │ Memory              │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                                                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use trestle_graph::{Term, TriplePattern, TripleStore};
//!
//! let store = TripleStore::memory()?;
//! store.load_turtle("people.ttl", r#"
//!     @prefix ex: <http://example.org/> .
//!     ex:alice ex:knows ex:bob ; ex:name "Alice" .
//! "#)?;
//!
//! let alice = store.lookup_existing(&Term::iri("http://example.org/alice"))?.unwrap();
//! let facts = store.scan(TriplePattern::any().with_subject(alice)).count();
//! assert_eq!(facts, 2);
//! # Ok::<(), trestle_graph::Error>(())
//! ```
//!
//! # Quads
//!
//! ```text
//! (subject, predicate, object, graph)
//!
//! Example:
//! (#1 ex:alice, #2 ex:knows, #3 ex:bob, #0 default graph)
//! ```
//!
//! Graph id `#0` is reserved for the default graph and never names a term.

pub mod backends;
pub mod config;
pub mod dictionary;
pub mod error;
pub mod index;
pub mod rdf;
pub mod simple_index;
pub mod store;
pub mod term;
pub mod triple;

// Re-exports
pub use config::{BackendConfig, StoreConfig};
pub use dictionary::{TermDictionary, TermId};
pub use error::{Error, Result};
pub use index::{Permutation, PermutationIndex};
pub use rdf::{ParserConfig, RdfFormat, RdfTriple};
pub use simple_index::{ObjectValue, SimpleIndex};
pub use store::{TripleScan, TripleStore};
pub use term::{Literal, Term, TermKind};
pub use triple::{Position, Triple, TriplePattern};

pub use backends::memory::MemoryBackend;
pub use backends::StorageBackend;

#[cfg(feature = "sqlite-backend")]
pub use backends::sqlite::SqliteBackend;

/// Holds statistics about a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GraphStats {
    /// The total number of stored triples, across all graphs.
    pub triple_count: usize,
    /// The number of dictionary entries.
    pub term_count: usize,
    /// The number of named graphs holding at least one triple.
    pub named_graph_count: usize,
    /// The approximate size of the store in bytes.
    pub storage_bytes: usize,
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
