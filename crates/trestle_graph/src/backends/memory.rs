//! In-memory storage backend

use super::StorageBackend;
use crate::dictionary::TermId;
use crate::index::PermutationIndex;
use crate::term::Term;
use crate::triple::{Triple, TriplePattern};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
struct TermTable {
    by_id: HashMap<TermId, Term>,
    by_canonical: HashMap<String, TermId>,
}

/// In-memory storage backend for testing and ephemeral stores
pub struct MemoryBackend {
    terms: RwLock<TermTable>,
    triples: RwLock<PermutationIndex>,
}

impl MemoryBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self {
            terms: RwLock::new(TermTable::default()),
            triples: RwLock::new(PermutationIndex::new()),
        }
    }

    fn read_triples(&self) -> Result<std::sync::RwLockReadGuard<'_, PermutationIndex>> {
        self.triples
            .read()
            .map_err(|_| Error::Storage("lock poisoned".into()))
    }

    fn write_triples(&self) -> Result<std::sync::RwLockWriteGuard<'_, PermutationIndex>> {
        self.triples
            .write()
            .map_err(|_| Error::Storage("lock poisoned".into()))
    }

    fn read_terms(&self) -> Result<std::sync::RwLockReadGuard<'_, TermTable>> {
        self.terms
            .read()
            .map_err(|_| Error::Storage("lock poisoned".into()))
    }

    fn write_terms(&self) -> Result<std::sync::RwLockWriteGuard<'_, TermTable>> {
        self.terms
            .write()
            .map_err(|_| Error::Storage("lock poisoned".into()))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryBackend {
    fn get_term(&self, id: TermId) -> Result<Option<Term>> {
        Ok(self.read_terms()?.by_id.get(&id).cloned())
    }

    fn find_term(&self, _hash: u64, canonical: &str) -> Result<Option<TermId>> {
        Ok(self.read_terms()?.by_canonical.get(canonical).copied())
    }

    fn term_exists(&self, id: TermId) -> Result<bool> {
        Ok(self.read_terms()?.by_id.contains_key(&id))
    }

    fn put_term(&self, id: TermId, _hash: u64, canonical: &str, term: &Term) -> Result<()> {
        let mut terms = self.write_terms()?;
        terms.by_id.insert(id, term.clone());
        terms.by_canonical.insert(canonical.to_string(), id);
        Ok(())
    }

    fn term_count(&self) -> Result<usize> {
        Ok(self.read_terms()?.by_id.len())
    }

    fn insert(&self, triple: &Triple) -> Result<bool> {
        Ok(self.write_triples()?.insert(triple))
    }

    fn insert_batch(&self, triples: &[Triple]) -> Result<usize> {
        let mut index = self.write_triples()?;
        Ok(triples.iter().filter(|t| index.insert(t)).count())
    }

    fn remove(&self, triple: &Triple) -> Result<bool> {
        Ok(self.write_triples()?.remove(triple))
    }

    fn remove_matching(&self, pattern: &TriplePattern) -> Result<usize> {
        let mut index = self.write_triples()?;
        let doomed: Vec<Triple> = index.range(pattern, None).collect();
        for triple in &doomed {
            index.remove(triple);
        }
        Ok(doomed.len())
    }

    fn scan_page(
        &self,
        pattern: &TriplePattern,
        after: Option<&Triple>,
        limit: usize,
    ) -> Result<Vec<Triple>> {
        Ok(self.read_triples()?.range(pattern, after).take(limit).collect())
    }

    fn count(&self, pattern: &TriplePattern) -> Result<usize> {
        let index = self.read_triples()?;
        if pattern.is_wildcard() {
            return Ok(index.len());
        }
        Ok(index.range(pattern, None).count())
    }

    fn graphs(&self) -> Result<Vec<TermId>> {
        Ok(self.read_triples()?.graphs())
    }

    fn clear(&self) -> Result<()> {
        self.write_triples()?.clear();
        let mut terms = self.write_terms()?;
        terms.by_id.clear();
        terms.by_canonical.clear();
        Ok(())
    }

    fn size_bytes(&self) -> usize {
        let triples = self.triples.read().map(|i| i.len()).unwrap_or(0);
        let terms = self
            .terms
            .read()
            .map(|t| {
                t.by_canonical
                    .keys()
                    .map(|k| k.len() * 2 + 16)
                    .sum::<usize>()
            })
            .unwrap_or(0);
        // Six permutation keys of four ids per triple.
        triples * 6 * 32 + terms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_backend_basic_operations() {
        let backend = MemoryBackend::new();
        let triple = Triple::in_default_graph(TermId::new(1), TermId::new(2), TermId::new(3));

        assert!(backend.insert(&triple).unwrap());
        assert_eq!(backend.count(&TriplePattern::any()).unwrap(), 1);
        assert!(backend.size_bytes() > 0);

        assert!(backend.remove(&triple).unwrap());
        assert_eq!(backend.count(&TriplePattern::any()).unwrap(), 0);
    }

    #[test]
    fn test_scan_page_respects_limit() {
        let backend = MemoryBackend::default();
        for i in 0..10 {
            backend
                .insert(&Triple::in_default_graph(
                    TermId::new(1),
                    TermId::new(2),
                    TermId::new(100 + i),
                ))
                .unwrap();
        }
        let pattern = TriplePattern::any().with_subject(TermId::new(1));
        let page = backend.scan_page(&pattern, None, 4).unwrap();
        assert_eq!(page.len(), 4);
        let next = backend.scan_page(&pattern, page.last(), 100).unwrap();
        assert_eq!(next.len(), 6);
        assert!(next[0] > page[3]);
    }
}
