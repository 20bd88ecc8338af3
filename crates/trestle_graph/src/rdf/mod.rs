//! RDF syntax support
//!
//! This module provides parsing and serialization of standard RDF formats:
//! - Turtle (.ttl) - Terse RDF Triple Language
//! - N-Triples (.nt) - Line-based triple format
//!
//! Parsers are streaming: each triple is handed to a [`TripleSink`] as soon
//! as it is complete.
//!
//! # Example
//!
//! ```rust
//! use trestle_graph::rdf::{ParserConfig, RdfFormat, RdfTriple};
//!
//! let ttl = r#"
//!     @prefix ex: <http://example.org/> .
//!     ex:alice ex:knows ex:bob .
//!     ex:alice ex:name "Alice" .
//! "#;
//!
//! let mut parser = RdfFormat::Turtle.parser(ParserConfig::default());
//! let mut triples = Vec::new();
//! let mut sink = |t: RdfTriple| -> trestle_graph::Result<()> {
//!     triples.push(t);
//!     Ok(())
//! };
//! let count = parser.parse("people.ttl", ttl, &mut sink)?;
//! assert_eq!(count, 2);
//! # Ok::<(), trestle_graph::Error>(())
//! ```

pub mod blank;
pub mod iri;
pub mod lexer;
pub mod namespace;
pub mod serializer;
pub mod turtle;

pub use blank::BlankNodeGenerator;
pub use namespace::{NamespaceMap, PREFIX_RDF, PREFIX_RDFS, PREFIX_XSD};
pub use serializer::{NTriplesSerializer, RdfSerializer, TurtleSerializer};
pub use turtle::TurtleParser;

use crate::term::Term;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A triple of terms, as produced by parsers and consumed by serializers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RdfTriple {
    /// Subject: named or blank node.
    pub subject: Term,
    /// Predicate: named node.
    pub predicate: Term,
    /// Object: any term.
    pub object: Term,
}

impl RdfTriple {
    /// Create a new triple
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    /// Checks the RDF position rules.
    pub fn validate(&self) -> Result<()> {
        if !self.subject.can_be_subject() {
            return Err(Error::InvalidTriple(format!(
                "literal {} in subject position",
                self.subject
            )));
        }
        if !self.predicate.can_be_predicate() {
            return Err(Error::InvalidTriple(format!(
                "{} in predicate position",
                self.predicate
            )));
        }
        Ok(())
    }
}

impl fmt::Display for RdfTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}

/// Receives triples from a parser as they are produced.
pub trait TripleSink {
    /// Accepts one triple. An error aborts the parse.
    fn triple(&mut self, triple: RdfTriple) -> Result<()>;
}

impl<F> TripleSink for F
where
    F: FnMut(RdfTriple) -> Result<()>,
{
    fn triple(&mut self, triple: RdfTriple) -> Result<()> {
        self(triple)
    }
}

/// Trait for RDF parsers
pub trait RdfParser {
    /// Parses `text`, delivering every triple to `sink`, and returns how many
    /// were delivered. `source_id` names the document in syntax errors.
    ///
    /// Triples delivered before an error are not retracted.
    fn parse(&mut self, source_id: &str, text: &str, sink: &mut dyn TripleSink) -> Result<usize>;
}

/// Parser settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Base IRI for relative references, until the document sets its own.
    pub base_iri: Option<String>,
    /// Seed for blank node prefixes. `None` draws from the thread rng.
    pub blank_node_seed: Option<u64>,
    /// Start every document with the well-known prefixes (rdf, rdfs, xsd, ...).
    pub default_prefixes: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            base_iri: None,
            blank_node_seed: None,
            default_prefixes: true,
        }
    }
}

impl ParserConfig {
    /// Sets the base IRI.
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base_iri = Some(base.into());
        self
    }

    /// Makes blank node labels reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.blank_node_seed = Some(seed);
        self
    }

    /// Starts documents with an empty prefix table.
    pub fn without_default_prefixes(mut self) -> Self {
        self.default_prefixes = false;
        self
    }

    /// A fresh prefix table for one document.
    pub fn namespaces(&self) -> NamespaceMap {
        if self.default_prefixes {
            NamespaceMap::with_defaults()
        } else {
            NamespaceMap::new()
        }
    }
}

/// Supported RDF syntaxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RdfFormat {
    /// Turtle
    Turtle,
    /// N-Triples
    NTriples,
}

impl RdfFormat {
    /// Every supported format.
    pub const ALL: [RdfFormat; 2] = [RdfFormat::Turtle, RdfFormat::NTriples];

    /// Guesses the format from a file extension.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "ttl" | "turtle" => Some(Self::Turtle),
            "nt" | "ntriples" => Some(Self::NTriples),
            _ => None,
        }
    }

    /// Maps a media type to a format, ignoring parameters.
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        let essence = media_type.split(';').next().unwrap_or("").trim();
        match essence.to_ascii_lowercase().as_str() {
            "text/turtle" | "application/x-turtle" => Some(Self::Turtle),
            "application/n-triples" | "text/plain" => Some(Self::NTriples),
            _ => None,
        }
    }

    /// The canonical media type.
    pub fn media_type(self) -> &'static str {
        match self {
            Self::Turtle => "text/turtle",
            Self::NTriples => "application/n-triples",
        }
    }

    /// The usual file extension.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Turtle => "ttl",
            Self::NTriples => "nt",
        }
    }

    /// Builds a parser for this format.
    pub fn parser(self, config: ParserConfig) -> Box<dyn RdfParser> {
        match self {
            Self::Turtle => Box::new(TurtleParser::new(config)),
            // N-Triples is a subset of Turtle without prefixes.
            Self::NTriples => Box::new(TurtleParser::new(config.without_default_prefixes())),
        }
    }

    /// Builds a serializer for this format.
    pub fn serializer(self) -> Box<dyn RdfSerializer> {
        match self {
            Self::Turtle => Box::new(TurtleSerializer::new(NamespaceMap::with_defaults())),
            Self::NTriples => Box::new(NTriplesSerializer),
        }
    }
}

impl fmt::Display for RdfFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Turtle => "Turtle",
            Self::NTriples => "N-Triples",
        })
    }
}
