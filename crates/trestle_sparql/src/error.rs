//! Error types for Trestle SPARQL.

use thiserror::Error;

/// A specialized `Result` type for query operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Defines the errors a query or update can fail with.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed SPARQL text. Positions are 1-based; `offset` is in bytes.
    #[error("query syntax error at line {line}, column {column}: {message}")]
    Syntax {
        /// Line of the offending token.
        line: usize,
        /// Column of the offending token, in characters.
        column: usize,
        /// Byte offset of the offending token.
        offset: usize,
        /// What the parser expected or found.
        message: String,
    },

    /// Storage faults and dictionary inconsistencies, propagated unchanged.
    #[error(transparent)]
    Graph(#[from] trestle_graph::Error),

    /// A recognised construct this engine does not evaluate.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A query that parses but cannot be evaluated as written.
    #[error("evaluation error: {0}")]
    Evaluation(String),
}

impl Error {
    /// Builds a syntax error at the given position.
    pub fn syntax(line: usize, column: usize, offset: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            column,
            offset,
            message: message.into(),
        }
    }

    /// Returns true for faults raised by the storage engine.
    pub fn is_storage_fault(&self) -> bool {
        matches!(self, Self::Graph(e) if e.is_storage_fault())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_display() {
        let err = Error::syntax(2, 5, 17, "expected '}'");
        assert_eq!(
            err.to_string(),
            "query syntax error at line 2, column 5: expected '}'"
        );
    }

    #[test]
    fn test_graph_errors_pass_through() {
        let err: Error = trestle_graph::Error::Storage("disk full".into()).into();
        assert!(err.is_storage_fault());
        assert_eq!(err.to_string(), "storage error: disk full");
        assert!(!Error::Unsupported("SERVICE".into()).is_storage_fault());
    }
}
