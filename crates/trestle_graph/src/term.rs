//! RDF terms.
//!
//! A [`Term`] is a named node (IRI), a blank node or a literal. Terms have a
//! canonical string form (the N-Triples rendering) which the dictionary hashes
//! to derive term identities, so two terms are equal exactly when their
//! canonical forms are equal.

use crate::rdf::namespace::{RDF_LANG_STRING, XSD_BOOLEAN, XSD_DECIMAL, XSD_DOUBLE, XSD_INTEGER, XSD_STRING};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of an RDF term, stored alongside every dictionary entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TermKind {
    /// An IRI.
    #[serde(rename = "uri")]
    NamedNode,
    /// A blank node.
    #[serde(rename = "bnode")]
    BlankNode,
    /// A literal value.
    Literal,
}

impl TermKind {
    /// Discriminator byte used for hashing and persistence.
    pub fn tag(self) -> u8 {
        match self {
            Self::NamedNode => 1,
            Self::BlankNode => 2,
            Self::Literal => 3,
        }
    }

    /// Inverse of [`TermKind::tag`].
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::NamedNode),
            2 => Some(Self::BlankNode),
            3 => Some(Self::Literal),
            _ => None,
        }
    }

    /// Short name used by the simple index format.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NamedNode => "uri",
            Self::BlankNode => "bnode",
            Self::Literal => "literal",
        }
    }
}

/// A literal: lexical form plus either a language tag or a datatype.
///
/// A plain literal and an `xsd:string` typed literal are the same term; the
/// constructor drops an explicit `xsd:string` datatype.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Literal {
    lexical: String,
    language: Option<String>,
    datatype: Option<String>,
}

impl Literal {
    /// A simple literal (`xsd:string`).
    pub fn simple(lexical: impl Into<String>) -> Self {
        Self {
            lexical: lexical.into(),
            language: None,
            datatype: None,
        }
    }

    /// A language-tagged literal.
    pub fn lang(lexical: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            lexical: lexical.into(),
            language: Some(language.into()),
            datatype: None,
        }
    }

    /// A typed literal.
    pub fn typed(lexical: impl Into<String>, datatype: impl Into<String>) -> Self {
        let datatype = datatype.into();
        Self {
            lexical: lexical.into(),
            language: None,
            datatype: if datatype == XSD_STRING {
                None
            } else {
                Some(datatype)
            },
        }
    }

    /// Builds a literal from optional language and datatype, as produced by a
    /// parser or a storage row. A language tag wins over a datatype.
    pub fn from_parts(
        lexical: impl Into<String>,
        language: Option<String>,
        datatype: Option<String>,
    ) -> Self {
        match (language, datatype) {
            (Some(lang), _) => Self::lang(lexical, lang),
            (None, Some(dt)) => Self::typed(lexical, dt),
            (None, None) => Self::simple(lexical),
        }
    }

    /// The lexical form.
    pub fn lexical(&self) -> &str {
        &self.lexical
    }

    /// The language tag, if any.
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// The datatype as written, `None` for simple and language literals.
    pub fn explicit_datatype(&self) -> Option<&str> {
        self.datatype.as_deref()
    }

    /// The effective datatype IRI.
    pub fn datatype(&self) -> &str {
        match (&self.language, &self.datatype) {
            (Some(_), _) => RDF_LANG_STRING,
            (None, Some(dt)) => dt,
            (None, None) => XSD_STRING,
        }
    }

    /// True for literals without a language tag whose datatype is `xsd:string`.
    pub fn is_simple(&self) -> bool {
        self.language.is_none() && self.datatype.is_none()
    }
}

/// An RDF term.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Term {
    /// An IRI.
    NamedNode(String),
    /// A blank node, identified by its store-scoped label.
    BlankNode(String),
    /// A literal.
    Literal(Literal),
}

impl Term {
    /// Creates a named node.
    pub fn iri(iri: impl Into<String>) -> Self {
        Self::NamedNode(iri.into())
    }

    /// Creates a blank node with the given label (without the `_:` marker).
    pub fn blank(label: impl Into<String>) -> Self {
        Self::BlankNode(label.into())
    }

    /// Creates a simple literal.
    pub fn literal(lexical: impl Into<String>) -> Self {
        Self::Literal(Literal::simple(lexical))
    }

    /// Creates a language-tagged literal.
    pub fn lang_literal(lexical: impl Into<String>, language: impl Into<String>) -> Self {
        Self::Literal(Literal::lang(lexical, language))
    }

    /// Creates a typed literal.
    pub fn typed_literal(lexical: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self::Literal(Literal::typed(lexical, datatype))
    }

    /// Creates an `xsd:integer` literal.
    pub fn integer(value: i64) -> Self {
        Self::typed_literal(value.to_string(), XSD_INTEGER)
    }

    /// Creates an `xsd:decimal` literal from its `f64` value.
    pub fn decimal(value: f64) -> Self {
        let mut lexical = value.to_string();
        if !lexical.contains('.') && value.is_finite() {
            lexical.push_str(".0");
        }
        Self::typed_literal(lexical, XSD_DECIMAL)
    }

    /// Creates an `xsd:double` literal.
    pub fn double(value: f64) -> Self {
        let lexical = if value.is_nan() {
            "NaN".to_string()
        } else if value.is_infinite() {
            if value > 0.0 { "INF" } else { "-INF" }.to_string()
        } else {
            format!("{:E}", value)
        };
        Self::typed_literal(lexical, XSD_DOUBLE)
    }

    /// Creates an `xsd:boolean` literal.
    pub fn boolean(value: bool) -> Self {
        Self::typed_literal(if value { "true" } else { "false" }, XSD_BOOLEAN)
    }

    /// The kind of this term.
    pub fn kind(&self) -> TermKind {
        match self {
            Self::NamedNode(_) => TermKind::NamedNode,
            Self::BlankNode(_) => TermKind::BlankNode,
            Self::Literal(_) => TermKind::Literal,
        }
    }

    /// Returns true if this is a named node.
    pub fn is_named_node(&self) -> bool {
        matches!(self, Self::NamedNode(_))
    }

    /// Returns true if this is a blank node.
    pub fn is_blank_node(&self) -> bool {
        matches!(self, Self::BlankNode(_))
    }

    /// Returns true if this is a literal.
    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }

    /// Subjects may be named or blank nodes.
    pub fn can_be_subject(&self) -> bool {
        !self.is_literal()
    }

    /// Predicates must be named nodes.
    pub fn can_be_predicate(&self) -> bool {
        self.is_named_node()
    }

    /// The IRI of a named node.
    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Self::NamedNode(iri) => Some(iri),
            _ => None,
        }
    }

    /// The literal payload.
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Self::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    /// The bare value: IRI, blank label or lexical form.
    pub fn value(&self) -> &str {
        match self {
            Self::NamedNode(iri) => iri,
            Self::BlankNode(label) => label,
            Self::Literal(lit) => lit.lexical(),
        }
    }

    /// The canonical string form, also used for display.
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl From<Literal> for Term {
    fn from(lit: Literal) -> Self {
        Self::Literal(lit)
    }
}

/// Escapes a string for use inside `"..."` in N-Triples.
pub(crate) fn escape_literal(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
}

/// Escapes characters that may not appear raw inside `<...>`.
pub(crate) fn escape_iri(iri: &str, out: &mut String) {
    for c in iri.chars() {
        match c {
            '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\' | '\u{0}'..='\u{20}' => {
                out.push_str(&format!("\\u{:04X}", c as u32))
            }
            c => out.push(c),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        match self {
            Self::NamedNode(iri) => {
                out.push('<');
                escape_iri(iri, &mut out);
                out.push('>');
            }
            Self::BlankNode(label) => {
                out.push_str("_:");
                out.push_str(label);
            }
            Self::Literal(lit) => {
                out.push('"');
                escape_literal(&lit.lexical, &mut out);
                out.push('"');
                if let Some(lang) = &lit.language {
                    out.push('@');
                    out.push_str(lang);
                } else if let Some(dt) = &lit.datatype {
                    out.push_str("^^<");
                    escape_iri(dt, &mut out);
                    out.push('>');
                }
            }
        }
        f.write_str(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xsd_string_is_plain() {
        assert_eq!(Term::typed_literal("a", XSD_STRING), Term::literal("a"));
        assert_ne!(Term::lang_literal("a", "en"), Term::literal("a"));
        assert_ne!(Term::typed_literal("1", XSD_INTEGER), Term::literal("1"));
    }

    #[test]
    fn test_effective_datatype() {
        let lit = Literal::lang("chat", "fr");
        assert_eq!(lit.datatype(), RDF_LANG_STRING);
        assert_eq!(Literal::simple("x").datatype(), XSD_STRING);
        assert_eq!(Literal::typed("1", XSD_INTEGER).datatype(), XSD_INTEGER);
    }

    #[test]
    fn test_from_parts_prefers_language() {
        let lit = Literal::from_parts("x", Some("en".into()), Some(XSD_INTEGER.into()));
        assert_eq!(lit.language(), Some("en"));
        assert_eq!(lit.explicit_datatype(), None);
    }

    #[test]
    fn test_canonical_forms() {
        assert_eq!(Term::iri("http://ex.org/a").canonical(), "<http://ex.org/a>");
        assert_eq!(Term::blank("b0").canonical(), "_:b0");
        assert_eq!(Term::literal("say \"hi\"\n").canonical(), "\"say \\\"hi\\\"\\n\"");
        assert_eq!(Term::lang_literal("hi", "en").canonical(), "\"hi\"@en");
        assert_eq!(
            Term::integer(7).canonical(),
            "\"7\"^^<http://www.w3.org/2001/XMLSchema#integer>"
        );
    }

    #[test]
    fn test_canonical_is_unambiguous() {
        // A lexical form that looks like a language suffix stays distinct.
        let a = Term::literal("x\"@en");
        let b = Term::lang_literal("x", "en");
        assert_ne!(a.canonical(), b.canonical());
    }

    #[test]
    fn test_position_rules() {
        assert!(Term::blank("x").can_be_subject());
        assert!(!Term::literal("x").can_be_subject());
        assert!(!Term::blank("x").can_be_predicate());
        assert!(Term::iri("p").can_be_predicate());
    }

    #[test]
    fn test_kind_tags_round_trip() {
        for kind in [TermKind::NamedNode, TermKind::BlankNode, TermKind::Literal] {
            assert_eq!(TermKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(TermKind::from_tag(9), None);
    }
}
