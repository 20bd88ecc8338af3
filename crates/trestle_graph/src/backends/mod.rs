//! Storage backends for the triple store
//!
//! Two backends are supported:
//! - Memory: In-memory tables (testing/ephemeral)
//! - SQLite: Relational `terms` and `quads` tables (persistent)
//!
//! A backend owns both persisted tables of a store: the term table (one row
//! per dictionary entry) and the triple table (one row per `(s, p, o, g)` id
//! tuple, reachable through every [`Permutation`](crate::index::Permutation)).

pub mod memory;

#[cfg(feature = "sqlite-backend")]
pub mod sqlite;

use crate::dictionary::TermId;
use crate::term::Term;
use crate::triple::{Triple, TriplePattern};
use crate::Result;

/// Trait for storage backends
pub trait StorageBackend: Send + Sync {
    /// Fetch the term stored under `id`.
    fn get_term(&self, id: TermId) -> Result<Option<Term>>;

    /// Exact-match lookup by canonical form. `hash` is the term hash and is
    /// used as an index accelerator only.
    fn find_term(&self, hash: u64, canonical: &str) -> Result<Option<TermId>>;

    /// Check whether an id is already bound to some term
    fn term_exists(&self, id: TermId) -> Result<bool> {
        Ok(self.get_term(id)?.is_some())
    }

    /// Store a new dictionary entry.
    fn put_term(&self, id: TermId, hash: u64, canonical: &str, term: &Term) -> Result<()>;

    /// Number of dictionary entries
    fn term_count(&self) -> Result<usize>;

    /// Store a triple. Returns false if it was already present.
    fn insert(&self, triple: &Triple) -> Result<bool>;

    /// Store many triples. Returns how many were new.
    fn insert_batch(&self, triples: &[Triple]) -> Result<usize> {
        let mut added = 0;
        for triple in triples {
            if self.insert(triple)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Remove a triple. Returns false if it was absent.
    fn remove(&self, triple: &Triple) -> Result<bool>;

    /// Remove every triple matching `pattern`, returning how many went.
    fn remove_matching(&self, pattern: &TriplePattern) -> Result<usize> {
        let mut removed = 0;
        loop {
            let page = self.scan_page(pattern, None, 512)?;
            if page.is_empty() {
                return Ok(removed);
            }
            for triple in &page {
                if self.remove(triple)? {
                    removed += 1;
                }
            }
        }
    }

    /// Fetch up to `limit` triples matching `pattern`, in the order of the
    /// permutation chosen for the pattern, strictly after `after`.
    fn scan_page(
        &self,
        pattern: &TriplePattern,
        after: Option<&Triple>,
        limit: usize,
    ) -> Result<Vec<Triple>>;

    /// Count triples matching `pattern`
    fn count(&self, pattern: &TriplePattern) -> Result<usize>;

    /// Distinct graph ids, including the default graph if it holds triples
    fn graphs(&self) -> Result<Vec<TermId>>;

    /// Remove every triple and term
    fn clear(&self) -> Result<()>;

    /// Get storage size in bytes (approximate)
    fn size_bytes(&self) -> usize;

    /// Flush pending writes to disk
    fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Close the backend
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

// Re-exports
pub use memory::MemoryBackend;

#[cfg(feature = "sqlite-backend")]
pub use self::sqlite::SqliteBackend;
