//! Permutation indexes for efficient triple pattern matching.
//!
//! The store keeps each triple under six orderings of its four positions.
//! Whatever subset of positions a pattern binds, one of the orderings has
//! exactly those positions as a key prefix, so every pattern shape is a
//! contiguous range scan:
//!
//! ```text
//!  bound        permutation      bound        permutation
//!  -            SPOG             S G          GSPO
//!  S            SPOG             P G          GPOS
//!  P            POSG             O G          GOSP
//!  O            OSPG             S P O        SPOG
//!  G            GSPO             S P G        GSPO
//!  S P          SPOG             S O G        GOSP
//!  P O          POSG             P O G        GPOS
//!  S O          OSPG             S P O G      SPOG
//! ```

use crate::dictionary::TermId;
use crate::triple::{Position, Triple, TriplePattern};
use std::collections::BTreeSet;
use std::ops::Bound;

/// One ordering of the four triple positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permutation {
    /// Subject, Predicate, Object, Graph.
    Spog,
    /// Predicate, Object, Subject, Graph.
    Posg,
    /// Object, Subject, Predicate, Graph.
    Ospg,
    /// Graph, Subject, Predicate, Object.
    Gspo,
    /// Graph, Predicate, Object, Subject.
    Gpos,
    /// Graph, Object, Subject, Predicate.
    Gosp,
}

impl Permutation {
    /// Every maintained permutation.
    pub const ALL: [Permutation; 6] = [
        Permutation::Spog,
        Permutation::Posg,
        Permutation::Ospg,
        Permutation::Gspo,
        Permutation::Gpos,
        Permutation::Gosp,
    ];

    /// Positions in key order.
    pub fn order(self) -> [Position; 4] {
        use Position::*;
        match self {
            Self::Spog => [Subject, Predicate, Object, Graph],
            Self::Posg => [Predicate, Object, Subject, Graph],
            Self::Ospg => [Object, Subject, Predicate, Graph],
            Self::Gspo => [Graph, Subject, Predicate, Object],
            Self::Gpos => [Graph, Predicate, Object, Subject],
            Self::Gosp => [Graph, Object, Subject, Predicate],
        }
    }

    /// Lower-case name, used for SQL index names.
    pub fn name(self) -> &'static str {
        match self {
            Self::Spog => "spog",
            Self::Posg => "posg",
            Self::Ospg => "ospg",
            Self::Gspo => "gspo",
            Self::Gpos => "gpos",
            Self::Gosp => "gosp",
        }
    }

    fn slot(self) -> usize {
        match self {
            Self::Spog => 0,
            Self::Posg => 1,
            Self::Ospg => 2,
            Self::Gspo => 3,
            Self::Gpos => 4,
            Self::Gosp => 5,
        }
    }

    /// Reorders a triple into this permutation's key.
    pub fn key(self, triple: &Triple) -> [TermId; 4] {
        self.order().map(|p| triple.get(p))
    }

    /// Rebuilds a triple from a key in this permutation's order.
    pub fn triple(self, key: [TermId; 4]) -> Triple {
        let mut ids = [TermId::DEFAULT_GRAPH; 4];
        for (component, position) in key.iter().zip(self.order()) {
            ids[position.index()] = *component;
        }
        Triple::from_array(ids)
    }

    /// Number of leading key positions the pattern binds.
    pub fn prefix_len(self, pattern: &TriplePattern) -> usize {
        self.order()
            .iter()
            .take_while(|&&p| pattern.get(p).is_some())
            .count()
    }

    /// The bound prefix of a pattern in this permutation's order.
    pub fn prefix(self, pattern: &TriplePattern) -> Vec<TermId> {
        self.order().iter().map_while(|&p| pattern.get(p)).collect()
    }

    /// Picks the permutation whose key prefix covers every bound position.
    pub fn for_pattern(pattern: &TriplePattern) -> Self {
        let bound = pattern.bound_count();
        Self::ALL
            .into_iter()
            .find(|perm| perm.prefix_len(pattern) == bound)
            .unwrap_or(Self::Spog)
    }
}

/// In-memory permutation index: one ordered set of keys per permutation.
#[derive(Debug, Default, Clone)]
pub struct PermutationIndex {
    sets: [BTreeSet<[TermId; 4]>; 6],
}

impl PermutationIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a triple to every permutation. Returns false if already present.
    pub fn insert(&mut self, triple: &Triple) -> bool {
        if !self.sets[0].insert(Permutation::Spog.key(triple)) {
            return false;
        }
        for perm in &Permutation::ALL[1..] {
            self.sets[perm.slot()].insert(perm.key(triple));
        }
        true
    }

    /// Removes a triple from every permutation. Returns false if absent.
    pub fn remove(&mut self, triple: &Triple) -> bool {
        if !self.sets[0].remove(&Permutation::Spog.key(triple)) {
            return false;
        }
        for perm in &Permutation::ALL[1..] {
            self.sets[perm.slot()].remove(&perm.key(triple));
        }
        true
    }

    /// True if the triple is stored.
    pub fn contains(&self, triple: &Triple) -> bool {
        self.sets[0].contains(&Permutation::Spog.key(triple))
    }

    /// Number of stored triples.
    pub fn len(&self) -> usize {
        self.sets[0].len()
    }

    /// True when no triple is stored.
    pub fn is_empty(&self) -> bool {
        self.sets[0].is_empty()
    }

    /// Removes everything.
    pub fn clear(&mut self) {
        for set in &mut self.sets {
            set.clear();
        }
    }

    /// Iterates over the triples matching `pattern` in permutation order,
    /// starting strictly after `after` when given.
    pub fn range<'a>(
        &'a self,
        pattern: &TriplePattern,
        after: Option<&Triple>,
    ) -> impl Iterator<Item = Triple> + 'a {
        let perm = Permutation::for_pattern(pattern);
        let prefix = perm.prefix(pattern);

        let lower = match after {
            Some(triple) => Bound::Excluded(perm.key(triple)),
            None => {
                let mut start = [TermId::DEFAULT_GRAPH; 4];
                start[..prefix.len()].copy_from_slice(&prefix);
                Bound::Included(start)
            }
        };

        let pattern = *pattern;
        self.sets[perm.slot()]
            .range((lower, Bound::Unbounded))
            .take_while(move |key| key[..prefix.len()] == prefix[..])
            .map(move |key| perm.triple(*key))
            .filter(move |triple| pattern.matches(triple))
    }

    /// Distinct graph ids, in id order.
    pub fn graphs(&self) -> Vec<TermId> {
        let gspo = &self.sets[Permutation::Gspo.slot()];
        let mut graphs = Vec::new();
        let mut lower = Bound::Unbounded;
        while let Some(key) = gspo.range((lower, Bound::Unbounded)).next() {
            graphs.push(key[0]);
            let max = TermId::new(u64::MAX);
            lower = Bound::Excluded([key[0], max, max, max]);
        }
        graphs
    }
}
