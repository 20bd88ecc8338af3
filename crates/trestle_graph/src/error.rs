//! Error types for Trestle Graph.
//!
//! This module provides a unified `Error` type for ingestion, dictionary and
//! index operations.

use crate::dictionary::TermId;
use thiserror::Error;

/// A specialized `Result` type for graph store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Defines the errors that can occur during graph operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed Turtle or N-Triples input. Positions are 1-based.
    #[error("{source_id}:{line}:{column}: syntax error: {message}")]
    Syntax {
        /// Identifier of the document being parsed (file name, URL, ...).
        source_id: String,
        /// Line of the offending token.
        line: usize,
        /// Column of the offending token, in characters.
        column: usize,
        /// What the parser expected or found.
        message: String,
    },

    /// A TermId was not found in the dictionary. Indicates that the index and
    /// the dictionary are out of sync.
    #[error("unknown term id: {0}")]
    UnknownTermId(TermId),

    /// The provided triple violates the RDF position rules.
    #[error("invalid triple: {0}")]
    InvalidTriple(String),

    /// An error originating from the underlying storage backend.
    #[error("storage error: {0}")]
    Storage(String),

    /// An error occurred while encoding or decoding stored data.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An error from the underlying I/O system.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error related to the store configuration.
    #[error("config error: {0}")]
    Config(String),

    /// A required storage backend feature is not enabled.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl Error {
    /// Builds a syntax error for the given document position.
    pub fn syntax(
        source_id: impl Into<String>,
        line: usize,
        column: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::Syntax {
            source_id: source_id.into(),
            line,
            column,
            message: message.into(),
        }
    }

    /// Returns true for faults raised by the storage engine.
    pub fn is_storage_fault(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Io(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(feature = "sqlite-backend")]
impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(format!("sqlite error: {}", err))
    }
}
