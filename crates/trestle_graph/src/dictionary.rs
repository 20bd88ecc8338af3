//! The term dictionary.
//!
//! Every RDF term stored in a graph is replaced by a [`TermId`]. Identities
//! are derived from a blake3 hash of the term's kind tag and canonical form,
//! so the same document produces the same ids regardless of ingestion order.
//! The hash only chooses the *first candidate* id: the exact-match table keyed
//! by canonical string is authoritative, and a candidate already bound to a
//! different term is resolved by probing forward to the next free id.

use crate::backends::StorageBackend;
use crate::term::{Term, TermKind};
use crate::{Error, Result};
use log::{trace, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

/// Ids are kept within 63 bits so they fit a signed SQL integer.
const ID_MASK: u64 = u64::MAX >> 1;

/// Store-local identity of an RDF term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TermId(u64);

impl TermId {
    /// Reserved marker for the default graph. Never assigned to a term.
    pub const DEFAULT_GRAPH: TermId = TermId(0);

    /// Wraps a raw id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The first candidate id for a term hash.
    pub fn from_hash(hash: u64) -> Self {
        let id = hash & ID_MASK;
        Self(if id == 0 { 1 } else { id })
    }

    /// The next candidate after a collision, wrapping within 63 bits.
    pub fn next_probe(self) -> Self {
        Self::from_hash(self.0.wrapping_add(1))
    }

    /// The raw value.
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// The value as stored in SQL tables.
    pub fn as_i64(self) -> i64 {
        self.0 as i64
    }

    /// Reads an id back from an SQL column.
    pub fn from_i64(raw: i64) -> Self {
        Self(raw as u64)
    }

    /// True for the default-graph marker.
    pub fn is_default_graph(self) -> bool {
        self == Self::DEFAULT_GRAPH
    }
}

impl fmt::Display for TermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hashes a term's discriminator and canonical form.
pub fn term_hash(kind: TermKind, canonical: &str) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[kind.tag()]);
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(bytes) & ID_MASK
}

/// Bounded cache in front of the backend's term table.
#[derive(Default)]
struct TermCache {
    by_id: HashMap<TermId, Term>,
    by_canonical: HashMap<String, TermId>,
    capacity: usize,
}

impl TermCache {
    fn remember(&mut self, id: TermId, canonical: String, term: Term) {
        if self.capacity == 0 {
            return;
        }
        if self.by_id.len() >= self.capacity {
            trace!("term cache full ({} entries), clearing", self.by_id.len());
            self.by_id.clear();
            self.by_canonical.clear();
        }
        self.by_id.insert(id, term);
        self.by_canonical.insert(canonical, id);
    }
}

/// Assigns and resolves term identities.
pub struct TermDictionary {
    backend: Arc<dyn StorageBackend>,
    cache: RwLock<TermCache>,
    /// Serializes allocation so two writers can't claim the same probe slot.
    intern_lock: Mutex<()>,
}

impl TermDictionary {
    /// Creates a dictionary over the backend's term table.
    pub fn new(backend: Arc<dyn StorageBackend>, cache_capacity: usize) -> Self {
        Self {
            backend,
            cache: RwLock::new(TermCache {
                capacity: cache_capacity,
                ..Default::default()
            }),
            intern_lock: Mutex::new(()),
        }
    }

    /// Returns the id for `term`, creating a dictionary entry if unseen.
    pub fn intern(&self, term: &Term) -> Result<TermId> {
        let canonical = term.canonical();
        if let Some(id) = self.cached_id(&canonical)? {
            return Ok(id);
        }

        let _guard = self
            .intern_lock
            .lock()
            .map_err(|_| Error::Storage("lock poisoned".into()))?;

        let hash = term_hash(term.kind(), &canonical);
        if let Some(id) = self.backend.find_term(hash, &canonical)? {
            self.remember(id, canonical, term.clone())?;
            return Ok(id);
        }

        let mut candidate = TermId::from_hash(hash);
        while self.backend.term_exists(candidate)? {
            warn!("term id collision on {} for {}, probing", candidate, canonical);
            candidate = candidate.next_probe();
        }
        self.backend.put_term(candidate, hash, &canonical, term)?;
        trace!("interned {} as {}", canonical, candidate);

        self.remember(candidate, canonical, term.clone())?;
        Ok(candidate)
    }

    /// Interns every term, preserving order.
    pub fn intern_all<'a>(&self, terms: impl IntoIterator<Item = &'a Term>) -> Result<Vec<TermId>> {
        terms.into_iter().map(|t| self.intern(t)).collect()
    }

    /// Returns the term bound to `id`.
    ///
    /// # Errors
    ///
    /// `Error::UnknownTermId` if the id was never interned in this store.
    pub fn resolve(&self, id: TermId) -> Result<Term> {
        {
            let cache = self
                .cache
                .read()
                .map_err(|_| Error::Storage("lock poisoned".into()))?;
            if let Some(term) = cache.by_id.get(&id) {
                return Ok(term.clone());
            }
        }
        match self.backend.get_term(id)? {
            Some(term) => {
                self.remember(id, term.canonical(), term.clone())?;
                Ok(term)
            }
            None => Err(Error::UnknownTermId(id)),
        }
    }

    /// Looks a term up without creating an entry.
    pub fn lookup_existing(&self, term: &Term) -> Result<Option<TermId>> {
        let canonical = term.canonical();
        if let Some(id) = self.cached_id(&canonical)? {
            return Ok(Some(id));
        }
        let hash = term_hash(term.kind(), &canonical);
        let found = self.backend.find_term(hash, &canonical)?;
        if let Some(id) = found {
            self.remember(id, canonical, term.clone())?;
        }
        Ok(found)
    }

    /// Number of dictionary entries.
    pub fn len(&self) -> Result<usize> {
        self.backend.term_count()
    }

    /// True when no term has been interned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Drops all cached entries.
    pub fn clear_cache(&self) -> Result<()> {
        let mut cache = self
            .cache
            .write()
            .map_err(|_| Error::Storage("lock poisoned".into()))?;
        cache.by_id.clear();
        cache.by_canonical.clear();
        Ok(())
    }

    fn cached_id(&self, canonical: &str) -> Result<Option<TermId>> {
        let cache = self
            .cache
            .read()
            .map_err(|_| Error::Storage("lock poisoned".into()))?;
        Ok(cache.by_canonical.get(canonical).copied())
    }

    fn remember(&self, id: TermId, canonical: String, term: Term) -> Result<()> {
        let mut cache = self
            .cache
            .write()
            .map_err(|_| Error::Storage("lock poisoned".into()))?;
        cache.remember(id, canonical, term);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryBackend;

    fn dictionary() -> TermDictionary {
        TermDictionary::new(Arc::new(MemoryBackend::new()), 16)
    }

    #[test]
    fn test_intern_is_deterministic() {
        let dict = dictionary();
        let a = dict.intern(&Term::iri("http://ex.org/a")).unwrap();
        let b = dict.intern(&Term::iri("http://ex.org/a")).unwrap();
        assert_eq!(a, b);
        assert_eq!(dict.len().unwrap(), 1);
    }

    #[test]
    fn test_distinct_terms_distinct_ids() {
        let dict = dictionary();
        let terms = [
            Term::iri("x"),
            Term::blank("x"),
            Term::literal("x"),
            Term::lang_literal("x", "en"),
            Term::typed_literal("x", "http://ex.org/dt"),
        ];
        let ids = dict.intern_all(terms.iter()).unwrap();
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), terms.len());
    }

    #[test]
    fn test_ids_are_order_independent() {
        let one = dictionary();
        let two = dictionary();
        let a = Term::iri("http://ex.org/a");
        let b = Term::literal("b");
        let a1 = one.intern(&a).unwrap();
        let b1 = one.intern(&b).unwrap();
        let b2 = two.intern(&b).unwrap();
        let a2 = two.intern(&a).unwrap();
        assert_eq!(a1, a2);
        assert_eq!(b1, b2);
    }

    #[test]
    fn test_resolve_round_trip() {
        let dict = dictionary();
        let term = Term::lang_literal("bonjour", "fr");
        let id = dict.intern(&term).unwrap();
        dict.clear_cache().unwrap();
        assert_eq!(dict.resolve(id).unwrap(), term);
    }

    #[test]
    fn test_resolve_unknown() {
        let dict = dictionary();
        let err = dict.resolve(TermId::new(12345)).unwrap_err();
        assert!(matches!(err, Error::UnknownTermId(id) if id == TermId::new(12345)));
        assert!(dict.resolve(TermId::DEFAULT_GRAPH).is_err());
    }

    #[test]
    fn test_lookup_existing_does_not_create() {
        let dict = dictionary();
        assert_eq!(dict.lookup_existing(&Term::iri("nope")).unwrap(), None);
        assert!(dict.is_empty().unwrap());
        let id = dict.intern(&Term::iri("yes")).unwrap();
        assert_eq!(dict.lookup_existing(&Term::iri("yes")).unwrap(), Some(id));
    }

    #[test]
    fn test_collision_probes_forward() {
        let backend = Arc::new(MemoryBackend::new());
        let dict = TermDictionary::new(backend.clone(), 0);
        let term = Term::iri("http://ex.org/victim");
        let canonical = term.canonical();
        let hash = term_hash(TermKind::NamedNode, &canonical);

        // Occupy the term's natural slot with an unrelated term.
        let squatter = Term::iri("http://ex.org/squatter");
        backend
            .put_term(TermId::from_hash(hash), 7, &squatter.canonical(), &squatter)
            .unwrap();

        let id = dict.intern(&term).unwrap();
        assert_eq!(id, TermId::from_hash(hash).next_probe());
        assert_eq!(dict.resolve(id).unwrap(), term);
        assert_eq!(dict.resolve(TermId::from_hash(hash)).unwrap(), squatter);
        assert_eq!(dict.intern(&term).unwrap(), id);
    }

    #[test]
    fn test_from_hash_never_default_graph() {
        assert_eq!(TermId::from_hash(0), TermId::new(1));
        assert_eq!(TermId::from_hash(1 << 63), TermId::new(1));
        assert_eq!(TermId::new(ID_MASK).next_probe(), TermId::new(1));
    }

    #[test]
    fn test_cache_eviction_keeps_answers() {
        let dict = TermDictionary::new(Arc::new(MemoryBackend::new()), 2);
        let ids: Vec<_> = (0..10)
            .map(|i| dict.intern(&Term::integer(i)).unwrap())
            .collect();
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(dict.resolve(*id).unwrap(), Term::integer(i as i64));
        }
    }
}
