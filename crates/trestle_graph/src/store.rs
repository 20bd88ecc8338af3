//! The core store.
//!
//! `TripleStore` ties a storage backend to the term dictionary: terms go in
//! as [`Term`] values, come out of the index as [`TermId`] tuples, and are
//! resolved back on the way out.

use crate::backends::{MemoryBackend, StorageBackend};
use crate::config::{BackendConfig, StoreConfig};
use crate::dictionary::{TermDictionary, TermId};
use crate::rdf::{ParserConfig, RdfFormat, RdfParser, RdfTriple};
use crate::simple_index::SimpleIndex;
use crate::term::Term;
use crate::triple::{Triple, TriplePattern};
use crate::{Error, GraphStats, Result};
use log::{debug, info, trace};
use std::sync::Arc;

#[cfg(feature = "sqlite-backend")]
use crate::backends::SqliteBackend;

/// Triples buffered by the loader before they are written as one batch.
const LOAD_BATCH: usize = 1024;

/// An RDF store: term dictionary plus permutation-indexed quads.
///
/// # Examples
///
/// ```
/// use trestle_graph::{Term, TriplePattern, TripleStore};
/// use trestle_graph::rdf::RdfTriple;
///
/// # fn main() -> trestle_graph::Result<()> {
/// let store = TripleStore::memory()?;
/// store.add_triple(
///     &RdfTriple::new(
///         Term::iri("http://ex.org/a"),
///         Term::iri("http://ex.org/p"),
///         Term::literal("1"),
///     ),
///     None,
/// )?;
///
/// let p = store.lookup_existing(&Term::iri("http://ex.org/p"))?.unwrap();
/// let hits: Vec<_> = store
///     .scan(TriplePattern::any().with_predicate(p))
///     .collect::<trestle_graph::Result<_>>()?;
/// assert_eq!(hits.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct TripleStore {
    backend: Arc<dyn StorageBackend>,
    dictionary: TermDictionary,
    config: StoreConfig,
}

impl TripleStore {
    /// Opens a store as described by `config`.
    ///
    /// # Errors
    ///
    /// `Error::Config` for invalid tuning values, `Error::BackendUnavailable`
    /// when the selected backend was not compiled in, and storage errors from
    /// opening the backend.
    pub fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let backend: Arc<dyn StorageBackend> = match &config.backend {
            BackendConfig::Memory => Arc::new(MemoryBackend::new()),
            #[cfg(feature = "sqlite-backend")]
            BackendConfig::Sqlite { path } => Arc::new(SqliteBackend::open(path)?),
            #[cfg(not(feature = "sqlite-backend"))]
            BackendConfig::Sqlite { .. } => {
                return Err(Error::BackendUnavailable(
                    "sqlite backend requires the `sqlite-backend` feature".into(),
                ))
            }
        };
        info!("opened triple store ({})", config.backend);
        Ok(Self::with_backend(backend, config))
    }

    /// An in-memory store with default tuning.
    pub fn memory() -> Result<Self> {
        Self::open(StoreConfig::memory())
    }

    /// A SQLite store at `path`, created if missing.
    #[cfg(feature = "sqlite-backend")]
    pub fn sqlite(path: impl Into<std::path::PathBuf>) -> Result<Self> {
        Self::open(StoreConfig::sqlite(path))
    }

    /// Wraps an already opened backend.
    pub fn with_backend(backend: Arc<dyn StorageBackend>, config: StoreConfig) -> Self {
        let dictionary = TermDictionary::new(backend.clone(), config.term_cache_capacity);
        Self {
            backend,
            dictionary,
            config,
        }
    }

    /// The configuration the store was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The term dictionary.
    pub fn dictionary(&self) -> &TermDictionary {
        &self.dictionary
    }

    /// Parser settings derived from the store configuration.
    pub fn parser_config(&self) -> ParserConfig {
        ParserConfig {
            default_prefixes: self.config.default_prefixes,
            ..Default::default()
        }
    }

    // ========== Terms ==========

    /// Returns the id for `term`, creating a dictionary entry if unseen.
    pub fn intern(&self, term: &Term) -> Result<TermId> {
        self.dictionary.intern(term)
    }

    /// Returns the term bound to `id`.
    pub fn resolve(&self, id: TermId) -> Result<Term> {
        self.dictionary.resolve(id)
    }

    /// Looks a term up without creating a dictionary entry.
    pub fn lookup_existing(&self, term: &Term) -> Result<Option<TermId>> {
        self.dictionary.lookup_existing(term)
    }

    /// Graph id for a graph name, `None` being the default graph.
    fn graph_id(&self, graph: Option<&Term>) -> Result<TermId> {
        match graph {
            None => Ok(TermId::DEFAULT_GRAPH),
            Some(term) if term.is_named_node() => self.intern(term),
            Some(term) => Err(Error::InvalidTriple(format!(
                "graph name must be an IRI, got {}",
                term
            ))),
        }
    }

    /// Like `graph_id` but never creates a dictionary entry.
    fn existing_graph_id(&self, graph: Option<&Term>) -> Result<Option<TermId>> {
        match graph {
            None => Ok(Some(TermId::DEFAULT_GRAPH)),
            Some(term) => self.lookup_existing(term),
        }
    }

    fn encode(&self, triple: &RdfTriple, graph: TermId) -> Result<Triple> {
        triple.validate()?;
        Ok(Triple::new(
            self.intern(&triple.subject)?,
            self.intern(&triple.predicate)?,
            self.intern(&triple.object)?,
            graph,
        ))
    }

    /// Resolves the ids of `triple` back to terms. The graph is `None` for the
    /// default graph.
    pub fn decode(&self, triple: &Triple) -> Result<(RdfTriple, Option<Term>)> {
        let graph = if triple.graph.is_default_graph() {
            None
        } else {
            Some(self.resolve(triple.graph)?)
        };
        Ok((
            RdfTriple::new(
                self.resolve(triple.subject)?,
                self.resolve(triple.predicate)?,
                self.resolve(triple.object)?,
            ),
            graph,
        ))
    }

    // ========== Triples ==========

    /// Adds a triple of terms to `graph` (`None` for the default graph).
    /// Returns true if it was new.
    ///
    /// # Errors
    ///
    /// `Error::InvalidTriple` for a literal subject, a non-IRI predicate or a
    /// non-IRI graph name.
    pub fn add_triple(&self, triple: &RdfTriple, graph: Option<&Term>) -> Result<bool> {
        let graph = self.graph_id(graph)?;
        let encoded = self.encode(triple, graph)?;
        self.backend.insert(&encoded)
    }

    /// Adds many triples to one graph in a single batch. Returns how many were
    /// new.
    pub fn add_triples<'a>(
        &self,
        triples: impl IntoIterator<Item = &'a RdfTriple>,
        graph: Option<&Term>,
    ) -> Result<usize> {
        let graph = self.graph_id(graph)?;
        let encoded = triples
            .into_iter()
            .map(|t| self.encode(t, graph))
            .collect::<Result<Vec<_>>>()?;
        self.backend.insert_batch(&encoded)
    }

    /// Removes a triple of terms from `graph`. Returns false if it was absent,
    /// including when one of its terms was never interned.
    pub fn remove_triple(&self, triple: &RdfTriple, graph: Option<&Term>) -> Result<bool> {
        let ids = [
            self.lookup_existing(&triple.subject)?,
            self.lookup_existing(&triple.predicate)?,
            self.lookup_existing(&triple.object)?,
            self.existing_graph_id(graph)?,
        ];
        match ids {
            [Some(s), Some(p), Some(o), Some(g)] => self.backend.remove(&Triple::new(s, p, o, g)),
            _ => Ok(false),
        }
    }

    fn check_ids(&self, triple: &Triple) -> Result<()> {
        for id in triple.to_array() {
            if !id.is_default_graph() && !self.backend.term_exists(id)? {
                return Err(Error::UnknownTermId(id));
            }
        }
        Ok(())
    }

    /// Inserts an id tuple. Returns true if it was new.
    ///
    /// # Errors
    ///
    /// `Error::UnknownTermId` if one of the ids was never interned.
    pub fn insert(&self, triple: Triple) -> Result<bool> {
        self.check_ids(&triple)?;
        self.backend.insert(&triple)
    }

    /// Inserts id tuples in one batch. Returns how many were new.
    pub fn insert_batch(&self, triples: &[Triple]) -> Result<usize> {
        for triple in triples {
            self.check_ids(triple)?;
        }
        let added = self.backend.insert_batch(triples)?;
        debug!("inserted {} of {} triples", added, triples.len());
        Ok(added)
    }

    /// Removes every triple matching `pattern`, returning how many went.
    pub fn delete(&self, pattern: &TriplePattern) -> Result<usize> {
        let removed = self.backend.remove_matching(pattern)?;
        debug!("deleted {} triples", removed);
        Ok(removed)
    }

    /// True if the exact tuple is stored.
    pub fn contains(&self, triple: &Triple) -> Result<bool> {
        Ok(self.backend.count(&TriplePattern::exact(triple))? > 0)
    }

    /// Lazily scans the triples matching `pattern`.
    ///
    /// Pages of `scan_batch_size` rows are fetched as the iterator advances.
    /// Dropping the iterator abandons the scan; calling `scan` again starts a
    /// fresh one over the current contents.
    pub fn scan(&self, pattern: TriplePattern) -> TripleScan {
        TripleScan::new(self.backend.clone(), pattern, self.config.scan_batch_size)
    }

    /// Total number of stored triples.
    pub fn count(&self) -> Result<usize> {
        self.backend.count(&TriplePattern::any())
    }

    /// Number of triples matching `pattern`.
    pub fn count_matching(&self, pattern: &TriplePattern) -> Result<usize> {
        self.backend.count(pattern)
    }

    /// Ids of the named graphs holding at least one triple.
    pub fn graphs(&self) -> Result<Vec<TermId>> {
        Ok(self
            .backend
            .graphs()?
            .into_iter()
            .filter(|g| !g.is_default_graph())
            .collect())
    }

    /// Names of the named graphs holding at least one triple.
    pub fn graph_names(&self) -> Result<Vec<Term>> {
        self.graphs()?.into_iter().map(|g| self.resolve(g)).collect()
    }

    /// Returns statistics about the store.
    pub fn stats(&self) -> Result<GraphStats> {
        Ok(GraphStats {
            triple_count: self.count()?,
            term_count: self.dictionary.len()?,
            named_graph_count: self.graphs()?.len(),
            storage_bytes: self.backend.size_bytes(),
        })
    }

    /// Removes every triple and term.
    pub fn clear(&self) -> Result<()> {
        self.backend.clear()?;
        self.dictionary.clear_cache()
    }

    /// Flushes pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.backend.flush()
    }

    /// Resolved triples of one graph (`None` for the default graph).
    pub fn triples(&self, graph: Option<&Term>) -> Result<Vec<RdfTriple>> {
        let Some(graph) = self.existing_graph_id(graph)? else {
            return Ok(Vec::new());
        };
        self.scan(TriplePattern::any().with_graph(graph))
            .map(|triple| Ok(self.decode(&triple?)?.0))
            .collect()
    }

    // ========== Import / export ==========

    /// Parses `text` and adds its triples to `graph`. Returns the number of
    /// triples delivered by the parser.
    ///
    /// Triples parsed before a syntax error stay in the store.
    pub fn load(
        &self,
        source_id: &str,
        text: &str,
        format: RdfFormat,
        graph: Option<&Term>,
    ) -> Result<usize> {
        let mut parser = format.parser(self.parser_config());
        self.load_with(parser.as_mut(), source_id, text, graph)
    }

    /// Parses Turtle into the default graph.
    pub fn load_turtle(&self, source_id: &str, text: &str) -> Result<usize> {
        self.load(source_id, text, RdfFormat::Turtle, None)
    }

    /// Like [`load`](Self::load) with a caller-supplied parser.
    pub fn load_with(
        &self,
        parser: &mut dyn RdfParser,
        source_id: &str,
        text: &str,
        graph: Option<&Term>,
    ) -> Result<usize> {
        let graph = self.graph_id(graph)?;
        let mut pending: Vec<Triple> = Vec::with_capacity(LOAD_BATCH);
        let mut added = 0;

        let result = {
            let mut sink = |triple: RdfTriple| -> Result<()> {
                pending.push(self.encode(&triple, graph)?);
                if pending.len() >= LOAD_BATCH {
                    added += self.backend.insert_batch(&pending)?;
                    pending.clear();
                }
                Ok(())
            };
            parser.parse(source_id, text, &mut sink)
        };
        added += self.backend.insert_batch(&pending)?;

        let delivered = result?;
        debug!(
            "loaded {}: {} triples parsed, {} new",
            source_id, delivered, added
        );
        Ok(delivered)
    }

    /// Exports one graph in the simple index shape.
    pub fn simple_index(&self, graph: Option<&Term>) -> Result<SimpleIndex> {
        Ok(SimpleIndex::from_triples(&self.triples(graph)?))
    }

    /// Imports a simple index into `graph`. Returns how many triples were new.
    pub fn insert_simple_index(&self, index: &SimpleIndex, graph: Option<&Term>) -> Result<usize> {
        let triples = index.to_triples()?;
        trace!("importing simple index with {} triples", triples.len());
        self.add_triples(&triples, graph)
    }

    /// Serializes one graph.
    pub fn export(&self, format: RdfFormat, graph: Option<&Term>) -> Result<String> {
        format.serializer().serialize(&self.triples(graph)?)
    }
}

impl std::fmt::Debug for TripleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TripleStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A lazy, paged scan over the triples matching a pattern.
///
/// Pages are fetched in the order of the permutation chosen for the pattern,
/// each page starting strictly after the last triple of the previous one. No
/// lock is held between pages.
pub struct TripleScan {
    backend: Arc<dyn StorageBackend>,
    pattern: TriplePattern,
    batch: usize,
    cursor: Option<Triple>,
    page: std::vec::IntoIter<Triple>,
    exhausted: bool,
}

impl TripleScan {
    fn new(backend: Arc<dyn StorageBackend>, pattern: TriplePattern, batch: usize) -> Self {
        Self {
            backend,
            pattern,
            batch: batch.max(1),
            cursor: None,
            page: Vec::new().into_iter(),
            exhausted: false,
        }
    }

    /// The pattern being scanned.
    pub fn pattern(&self) -> &TriplePattern {
        &self.pattern
    }

    fn fetch(&mut self) -> Result<()> {
        let page = self
            .backend
            .scan_page(&self.pattern, self.cursor.as_ref(), self.batch)?;
        trace!("scan page of {} rows for {:?}", page.len(), self.pattern);
        if page.len() < self.batch {
            self.exhausted = true;
        }
        self.cursor = page.last().copied();
        self.page = page.into_iter();
        Ok(())
    }
}

impl Iterator for TripleScan {
    type Item = Result<Triple>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(triple) = self.page.next() {
                return Some(Ok(triple));
            }
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.fetch() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
    }
}
