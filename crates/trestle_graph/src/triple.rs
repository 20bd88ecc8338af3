//! Identifier-level triples and patterns.

use crate::dictionary::TermId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a component inside a triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    /// Subject.
    Subject,
    /// Predicate.
    Predicate,
    /// Object.
    Object,
    /// Graph.
    Graph,
}

impl Position {
    /// All positions in SPOG order.
    pub const ALL: [Position; 4] = [
        Position::Subject,
        Position::Predicate,
        Position::Object,
        Position::Graph,
    ];

    /// Index of this position in an SPOG array.
    pub fn index(self) -> usize {
        match self {
            Self::Subject => 0,
            Self::Predicate => 1,
            Self::Object => 2,
            Self::Graph => 3,
        }
    }
}

/// A stored fact: four term ids. The graph is [`TermId::DEFAULT_GRAPH`] for
/// triples outside any named graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Triple {
    /// Subject id.
    pub subject: TermId,
    /// Predicate id.
    pub predicate: TermId,
    /// Object id.
    pub object: TermId,
    /// Graph id.
    pub graph: TermId,
}

impl Triple {
    /// Creates a triple in the given graph.
    pub fn new(subject: TermId, predicate: TermId, object: TermId, graph: TermId) -> Self {
        Self {
            subject,
            predicate,
            object,
            graph,
        }
    }

    /// Creates a triple in the default graph.
    pub fn in_default_graph(subject: TermId, predicate: TermId, object: TermId) -> Self {
        Self::new(subject, predicate, object, TermId::DEFAULT_GRAPH)
    }

    /// The component at `position`.
    pub fn get(&self, position: Position) -> TermId {
        match position {
            Position::Subject => self.subject,
            Position::Predicate => self.predicate,
            Position::Object => self.object,
            Position::Graph => self.graph,
        }
    }

    /// The components in SPOG order.
    pub fn to_array(&self) -> [TermId; 4] {
        [self.subject, self.predicate, self.object, self.graph]
    }

    /// Inverse of [`Triple::to_array`].
    pub fn from_array(ids: [TermId; 4]) -> Self {
        Self::new(ids[0], ids[1], ids[2], ids[3])
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({} {} {} {})",
            self.subject, self.predicate, self.object, self.graph
        )
    }
}

/// A pattern over stored triples. `None` positions are wildcards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriplePattern {
    /// Subject constraint.
    pub subject: Option<TermId>,
    /// Predicate constraint.
    pub predicate: Option<TermId>,
    /// Object constraint.
    pub object: Option<TermId>,
    /// Graph constraint.
    pub graph: Option<TermId>,
}

impl TriplePattern {
    /// A pattern matching every triple.
    pub fn any() -> Self {
        Self::default()
    }

    /// Constrains the subject.
    pub fn with_subject(mut self, id: TermId) -> Self {
        self.subject = Some(id);
        self
    }

    /// Constrains the predicate.
    pub fn with_predicate(mut self, id: TermId) -> Self {
        self.predicate = Some(id);
        self
    }

    /// Constrains the object.
    pub fn with_object(mut self, id: TermId) -> Self {
        self.object = Some(id);
        self
    }

    /// Constrains the graph.
    pub fn with_graph(mut self, id: TermId) -> Self {
        self.graph = Some(id);
        self
    }

    /// A pattern matching exactly one triple.
    pub fn exact(triple: &Triple) -> Self {
        Self::from_array(triple.to_array().map(Some))
    }

    /// The constraint at `position`.
    pub fn get(&self, position: Position) -> Option<TermId> {
        match position {
            Position::Subject => self.subject,
            Position::Predicate => self.predicate,
            Position::Object => self.object,
            Position::Graph => self.graph,
        }
    }

    /// Constraints in SPOG order.
    pub fn to_array(&self) -> [Option<TermId>; 4] {
        [self.subject, self.predicate, self.object, self.graph]
    }

    /// Inverse of [`TriplePattern::to_array`].
    pub fn from_array(ids: [Option<TermId>; 4]) -> Self {
        Self {
            subject: ids[0],
            predicate: ids[1],
            object: ids[2],
            graph: ids[3],
        }
    }

    /// Bit mask of bound positions, bit `i` set for SPOG position `i`.
    pub fn bound_mask(&self) -> u8 {
        self.to_array()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_some())
            .fold(0, |mask, (i, _)| mask | (1 << i))
    }

    /// Number of bound positions.
    pub fn bound_count(&self) -> usize {
        self.bound_mask().count_ones() as usize
    }

    /// True if every position is bound.
    pub fn is_exact(&self) -> bool {
        self.bound_count() == 4
    }

    /// True if no position is bound.
    pub fn is_wildcard(&self) -> bool {
        self.bound_mask() == 0
    }

    /// Checks whether a triple satisfies this pattern.
    pub fn matches(&self, triple: &Triple) -> bool {
        Position::ALL
            .iter()
            .all(|&p| self.get(p).is_none_or(|id| id == triple.get(p)))
    }
}
