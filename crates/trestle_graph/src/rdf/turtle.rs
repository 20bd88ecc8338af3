//! Streaming Turtle parser.
//!
//! The parser is a state machine over the token stream:
//!
//! ```text
//!            ┌──────────── '.' ─────────────┐
//!            ▼                              │
//!   ExpectSubject ──► ExpectPredicate ──► ExpectObject ──► AfterObject
//!                          ▲                  ▲               │
//!                          │                  └───── ',' ─────┤
//!                          └──────────────────────── ';' ─────┘
//! ```
//!
//! `[ ... ]` pushes a frame whose subject is a fresh blank node, `( ... )`
//! pushes a collection frame that emits `rdf:first`/`rdf:rest` cells, and
//! closing either pops back to the enclosing subject or object slot. Every
//! triple is handed to the sink as soon as its object is known.

use super::blank::BlankNodeGenerator;
use super::iri;
use super::lexer::{Lexer, Spanned, Token};
use super::namespace::{
    NamespaceMap, RDF_FIRST, RDF_NIL, RDF_REST, RDF_TYPE, XSD_BOOLEAN, XSD_DECIMAL, XSD_DOUBLE,
    XSD_INTEGER,
};
use super::{ParserConfig, RdfParser, RdfTriple, TripleSink};
use crate::term::Term;
use crate::{Error, Result};
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ExpectSubject,
    ExpectPredicate,
    ExpectObject,
    AfterObject,
}

/// Where a completed `[...]` or `(...)` node goes once its frame closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Subject,
    Object,
}

#[derive(Debug)]
enum Frame {
    /// A top-level statement.
    Statement {
        subject: Option<Term>,
        predicate: Option<Term>,
        /// `[ ... ] .` is a complete statement without a predicate list.
        may_end: bool,
    },
    /// A blank node property list.
    PropertyList {
        node: Term,
        predicate: Option<Term>,
        slot: Slot,
    },
    /// A collection under construction.
    Collection {
        head: Option<Term>,
        tail: Option<Term>,
        slot: Slot,
    },
}

/// Per-document parsing state.
struct Session<'a, 's> {
    lexer: Lexer<'a>,
    source_id: &'a str,
    peeked: Option<Spanned>,
    prefixes: NamespaceMap,
    base: Option<String>,
    blanks: BlankNodeGenerator,
    sink: &'s mut dyn TripleSink,
    stack: Vec<Frame>,
    emitted: usize,
}

/// Turtle parser. Each call to [`RdfParser::parse`] is a new session with
/// its own blank node scope and prefix table.
pub struct TurtleParser {
    config: ParserConfig,
    rng: StdRng,
}

impl TurtleParser {
    /// Creates a parser.
    pub fn new(config: ParserConfig) -> Self {
        let seed = config
            .blank_node_seed
            .unwrap_or_else(|| rand::rng().random());
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Parses a whole document into a vector.
    pub fn parse_to_vec(&mut self, source_id: &str, text: &str) -> Result<Vec<RdfTriple>> {
        let mut triples = Vec::new();
        let mut sink = |triple: RdfTriple| -> Result<()> {
            triples.push(triple);
            Ok(())
        };
        self.parse(source_id, text, &mut sink)?;
        Ok(triples)
    }
}

impl Default for TurtleParser {
    fn default() -> Self {
        Self::new(ParserConfig::default())
    }
}

impl RdfParser for TurtleParser {
    fn parse(&mut self, source_id: &str, text: &str, sink: &mut dyn TripleSink) -> Result<usize> {
        let prefixes = self.config.namespaces();
        let session = Session {
            lexer: Lexer::new(source_id, text),
            source_id,
            peeked: None,
            prefixes,
            base: self.config.base_iri.clone(),
            blanks: BlankNodeGenerator::from_rng(&mut self.rng),
            sink,
            stack: Vec::new(),
            emitted: 0,
        };
        let count = session.run()?;
        debug!("parsed {} triples from {}", count, source_id);
        Ok(count)
    }
}

impl<'a, 's> Session<'a, 's> {
    fn next(&mut self) -> Result<Spanned> {
        match self.peeked.take() {
            Some(token) => Ok(token),
            None => self.lexer.next_token(),
        }
    }

    fn peek(&mut self) -> Result<&Token> {
        if self.peeked.is_none() {
            self.peeked = Some(self.lexer.next_token()?);
        }
        match &self.peeked {
            Some(spanned) => Ok(&spanned.token),
            None => Err(Error::syntax(self.source_id, 0, 0, "lexer lost lookahead")),
        }
    }

    fn error(&self, at: &Spanned, message: impl Into<String>) -> Error {
        Error::syntax(self.source_id, at.line, at.column, message)
    }

    fn unexpected(&self, at: &Spanned, expected: &str) -> Error {
        self.error(
            at,
            format!("expected {}, found {}", expected, at.token.describe()),
        )
    }

    fn run(mut self) -> Result<usize> {
        let mut state = State::ExpectSubject;
        loop {
            let spanned = self.next()?;
            state = match state {
                State::ExpectSubject => match self.expect_subject(spanned)? {
                    Some(state) => state,
                    None => return Ok(self.emitted),
                },
                State::ExpectPredicate => self.expect_predicate(spanned)?,
                State::ExpectObject => self.expect_object(spanned)?,
                State::AfterObject => self.after_object(spanned)?,
            };
        }
    }

    /// Returns `None` at the end of the document.
    fn expect_subject(&mut self, spanned: Spanned) -> Result<Option<State>> {
        let subject = match spanned.token {
            Token::Eof => return Ok(None),
            Token::AtPrefix | Token::SparqlPrefix => {
                let dotted = spanned.token == Token::AtPrefix;
                self.prefix_directive(dotted)?;
                return Ok(Some(State::ExpectSubject));
            }
            Token::AtBase | Token::SparqlBase => {
                let dotted = spanned.token == Token::AtBase;
                self.base_directive(dotted)?;
                return Ok(Some(State::ExpectSubject));
            }
            Token::OpenBracket => {
                if *self.peek()? == Token::CloseBracket {
                    self.next()?;
                    Term::blank(self.blanks.fresh())
                } else {
                    self.stack.push(Frame::Statement {
                        subject: None,
                        predicate: None,
                        may_end: false,
                    });
                    self.stack.push(Frame::PropertyList {
                        node: Term::blank(self.blanks.fresh()),
                        predicate: None,
                        slot: Slot::Subject,
                    });
                    return Ok(Some(State::ExpectPredicate));
                }
            }
            Token::OpenParen => {
                self.stack.push(Frame::Statement {
                    subject: None,
                    predicate: None,
                    may_end: false,
                });
                self.stack.push(Frame::Collection {
                    head: None,
                    tail: None,
                    slot: Slot::Subject,
                });
                return Ok(Some(State::ExpectObject));
            }
            Token::IriRef(_) | Token::PrefixedName { .. } | Token::BlankLabel(_) => {
                self.resource(&spanned)?
            }
            _ => return Err(self.unexpected(&spanned, "subject or directive")),
        };
        self.stack.push(Frame::Statement {
            subject: Some(subject),
            predicate: None,
            may_end: false,
        });
        Ok(Some(State::ExpectPredicate))
    }

    fn expect_predicate(&mut self, spanned: Spanned) -> Result<State> {
        let predicate = match &spanned.token {
            Token::A => Term::iri(RDF_TYPE),
            Token::IriRef(_) | Token::PrefixedName { .. } => self.resource(&spanned)?,
            // Repeated or trailing ';'
            Token::Semicolon if self.has_predicate() => return Ok(State::ExpectPredicate),
            Token::Dot if self.statement_may_end() => {
                self.stack.pop();
                return Ok(State::ExpectSubject);
            }
            Token::CloseBracket if matches!(self.stack.last(), Some(Frame::PropertyList { .. })) => {
                return self.close_frame(&spanned);
            }
            _ => return Err(self.unexpected(&spanned, "predicate")),
        };
        match self.stack.last_mut() {
            Some(Frame::Statement { predicate: p, .. })
            | Some(Frame::PropertyList { predicate: p, .. }) => *p = Some(predicate),
            _ => return Err(self.unexpected(&spanned, "object or ')'")),
        }
        Ok(State::ExpectObject)
    }

    fn expect_object(&mut self, spanned: Spanned) -> Result<State> {
        let object = match &spanned.token {
            Token::OpenBracket => {
                if *self.peek()? == Token::CloseBracket {
                    self.next()?;
                    Term::blank(self.blanks.fresh())
                } else {
                    self.stack.push(Frame::PropertyList {
                        node: Term::blank(self.blanks.fresh()),
                        predicate: None,
                        slot: Slot::Object,
                    });
                    return Ok(State::ExpectPredicate);
                }
            }
            Token::OpenParen => {
                self.stack.push(Frame::Collection {
                    head: None,
                    tail: None,
                    slot: Slot::Object,
                });
                return Ok(State::ExpectObject);
            }
            Token::CloseParen if matches!(self.stack.last(), Some(Frame::Collection { .. })) => {
                return self.close_frame(&spanned);
            }
            Token::IriRef(_) | Token::PrefixedName { .. } | Token::BlankLabel(_) => {
                self.resource(&spanned)?
            }
            Token::String(lexical) => self.string_literal(lexical.clone())?,
            Token::Integer(lexical) => Term::typed_literal(lexical.clone(), XSD_INTEGER),
            Token::Decimal(lexical) => Term::typed_literal(lexical.clone(), XSD_DECIMAL),
            Token::Double(lexical) => Term::typed_literal(lexical.clone(), XSD_DOUBLE),
            Token::Boolean(value) => Term::typed_literal(value.to_string(), XSD_BOOLEAN),
            _ => return Err(self.unexpected(&spanned, "object")),
        };
        self.deliver_object(object)
    }

    fn after_object(&mut self, spanned: Spanned) -> Result<State> {
        match (&spanned.token, self.stack.last()) {
            (Token::Comma, _) => Ok(State::ExpectObject),
            (Token::Semicolon, _) => Ok(State::ExpectPredicate),
            (Token::Dot, Some(Frame::Statement { .. })) => {
                self.stack.pop();
                Ok(State::ExpectSubject)
            }
            (Token::CloseBracket, Some(Frame::PropertyList { .. })) => self.close_frame(&spanned),
            (_, Some(Frame::PropertyList { .. })) => {
                Err(self.unexpected(&spanned, "',', ';' or ']'"))
            }
            _ => Err(self.unexpected(&spanned, "',', ';' or '.'")),
        }
    }

    fn has_predicate(&self) -> bool {
        matches!(
            self.stack.last(),
            Some(Frame::Statement {
                predicate: Some(_),
                ..
            }) | Some(Frame::PropertyList {
                predicate: Some(_),
                ..
            })
        )
    }

    fn statement_may_end(&self) -> bool {
        match self.stack.last() {
            Some(Frame::Statement {
                predicate, may_end, ..
            }) => predicate.is_some() || *may_end,
            _ => false,
        }
    }

    /// Places a completed object term into the innermost frame.
    fn deliver_object(&mut self, object: Term) -> Result<State> {
        match self.stack.last_mut() {
            Some(Frame::Statement {
                subject: Some(subject),
                predicate: Some(predicate),
                ..
            }) => {
                let triple = RdfTriple::new(subject.clone(), predicate.clone(), object);
                self.emit(triple)?;
                Ok(State::AfterObject)
            }
            Some(Frame::PropertyList {
                node,
                predicate: Some(predicate),
                ..
            }) => {
                let triple = RdfTriple::new(node.clone(), predicate.clone(), object);
                self.emit(triple)?;
                Ok(State::AfterObject)
            }
            Some(Frame::Collection { head, tail, .. }) => {
                let cell = Term::blank(self.blanks.fresh());
                let previous = tail.replace(cell.clone());
                if head.is_none() {
                    *head = Some(cell.clone());
                }
                if let Some(previous) = previous {
                    self.emit(RdfTriple::new(previous, Term::iri(RDF_REST), cell.clone()))?;
                }
                self.emit(RdfTriple::new(cell, Term::iri(RDF_FIRST), object))?;
                Ok(State::ExpectObject)
            }
            _ => Err(Error::syntax(
                self.source_id,
                self.lexer_line(),
                0,
                "object outside of a statement",
            )),
        }
    }

    /// Closes a `]` or `)` frame and routes its node to the enclosing slot.
    fn close_frame(&mut self, at: &Spanned) -> Result<State> {
        let (node, slot) = match self.stack.pop() {
            Some(Frame::PropertyList { node, slot, .. }) => (node, slot),
            Some(Frame::Collection { head, tail, slot }) => {
                if let Some(tail) = tail {
                    self.emit(RdfTriple::new(tail, Term::iri(RDF_REST), Term::iri(RDF_NIL)))?;
                }
                (head.unwrap_or_else(|| Term::iri(RDF_NIL)), slot)
            }
            _ => return Err(self.unexpected(at, "matching bracket")),
        };

        match slot {
            Slot::Object => self.deliver_object(node),
            Slot::Subject => match self.stack.last_mut() {
                Some(Frame::Statement {
                    subject, may_end, ..
                }) if subject.is_none() => {
                    // Only `[ ... ]` may stand alone; `( ... )` needs predicates.
                    *may_end = node.is_blank_node() && at.token == Token::CloseBracket;
                    *subject = Some(node);
                    Ok(State::ExpectPredicate)
                }
                _ => Err(self.unexpected(at, "statement")),
            },
        }
    }

    fn emit(&mut self, triple: RdfTriple) -> Result<()> {
        self.emitted += 1;
        self.sink.triple(triple)
    }

    fn lexer_line(&self) -> usize {
        self.peeked.as_ref().map(|s| s.line).unwrap_or(0)
    }

    fn resolve_iri(&self, reference: &str) -> String {
        match &self.base {
            Some(base) if !iri::is_absolute(reference) => iri::resolve(base, reference),
            _ => reference.to_string(),
        }
    }

    /// IRI, prefixed name or blank node label.
    fn resource(&mut self, spanned: &Spanned) -> Result<Term> {
        match &spanned.token {
            Token::IriRef(reference) => Ok(Term::iri(self.resolve_iri(reference))),
            Token::PrefixedName { prefix, local } => self
                .prefixes
                .expand_parts(prefix, local)
                .map(Term::iri)
                .ok_or_else(|| self.error(spanned, format!("undefined prefix '{}:'", prefix))),
            Token::BlankLabel(label) => Ok(Term::blank(self.blanks.scoped(label))),
            _ => Err(self.unexpected(spanned, "IRI or blank node")),
        }
    }

    /// Completes a literal with its optional language tag or datatype.
    fn string_literal(&mut self, lexical: String) -> Result<Term> {
        match self.peek()? {
            Token::LangTag(_) | Token::AtPrefix | Token::AtBase => {
                let tag = match self.next()?.token {
                    Token::LangTag(tag) => tag,
                    Token::AtPrefix => "prefix".to_string(),
                    _ => "base".to_string(),
                };
                Ok(Term::lang_literal(lexical, tag))
            }
            Token::DoubleCaret => {
                self.next()?;
                let datatype = self.next()?;
                match datatype.token {
                    Token::IriRef(_) | Token::PrefixedName { .. } => {
                        let datatype = self.resource(&datatype)?;
                        Ok(Term::typed_literal(lexical, datatype.value()))
                    }
                    _ => Err(self.unexpected(&datatype, "datatype IRI")),
                }
            }
            _ => Ok(Term::literal(lexical)),
        }
    }

    fn prefix_directive(&mut self, dotted: bool) -> Result<()> {
        let name = self.next()?;
        let prefix = match &name.token {
            Token::PrefixedName { prefix, local } if local.is_empty() => prefix.clone(),
            _ => return Err(self.unexpected(&name, "prefix name ending in ':'")),
        };
        let target = self.next()?;
        let namespace = match &target.token {
            Token::IriRef(reference) => self.resolve_iri(reference),
            _ => return Err(self.unexpected(&target, "namespace IRI")),
        };
        self.prefixes.add(&prefix, &namespace);
        if dotted {
            self.expect_dot()?;
        }
        Ok(())
    }

    fn base_directive(&mut self, dotted: bool) -> Result<()> {
        let target = self.next()?;
        let base = match &target.token {
            Token::IriRef(reference) => self.resolve_iri(reference),
            _ => return Err(self.unexpected(&target, "base IRI")),
        };
        self.base = Some(base);
        if dotted {
            self.expect_dot()?;
        }
        Ok(())
    }

    fn expect_dot(&mut self) -> Result<()> {
        let spanned = self.next()?;
        if spanned.token == Token::Dot {
            Ok(())
        } else {
            Err(self.unexpected(&spanned, "'.'"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::namespace::XSD_STRING;

    fn parse(text: &str) -> Vec<RdfTriple> {
        TurtleParser::new(ParserConfig::default().with_seed(42))
            .parse_to_vec("test.ttl", text)
            .unwrap()
    }

    fn iri(s: &str) -> Term {
        Term::iri(s)
    }

    #[test]
    fn test_simple_statements() {
        let triples = parse(
            r#"
            @prefix ex: <http://ex.org/> .
            ex:alice ex:knows ex:bob ;
                     ex:name "Alice" , "Alicia"@es .
            ex:bob a ex:Person .
            "#,
        );
        assert_eq!(triples.len(), 4);
        assert_eq!(
            triples[0],
            RdfTriple::new(
                iri("http://ex.org/alice"),
                iri("http://ex.org/knows"),
                iri("http://ex.org/bob")
            )
        );
        assert_eq!(triples[2].object, Term::lang_literal("Alicia", "es"));
        assert_eq!(triples[3].predicate, iri(RDF_TYPE));
    }

    #[test]
    fn test_sparql_style_directives_and_base() {
        let triples = parse(
            r#"
            BASE <http://ex.org/dir/>
            PREFIX v: <vocab#>
            <a> v:p <../b> .
            "#,
        );
        assert_eq!(
            triples,
            vec![RdfTriple::new(
                iri("http://ex.org/dir/a"),
                iri("http://ex.org/dir/vocab#p"),
                iri("http://ex.org/b")
            )]
        );
    }

    #[test]
    fn test_directives_are_not_retroactive() {
        let triples = parse(
            r#"
            @prefix ex: <http://one.org/> .
            ex:a ex:p ex:b .
            @prefix ex: <http://two.org/> .
            ex:a ex:p ex:b .
            "#,
        );
        assert_eq!(triples[0].subject, iri("http://one.org/a"));
        assert_eq!(triples[1].subject, iri("http://two.org/a"));
    }

    #[test]
    fn test_literal_shorthands() {
        let triples = parse(
            r#"@prefix ex: <http://ex.org/> .
            ex:s ex:p 42, -1.5, 1e3, true, "x"^^ex:dt, "y"^^<http://www.w3.org/2001/XMLSchema#string> ."#,
        );
        let objects: Vec<_> = triples.into_iter().map(|t| t.object).collect();
        assert_eq!(
            objects,
            vec![
                Term::typed_literal("42", XSD_INTEGER),
                Term::typed_literal("-1.5", XSD_DECIMAL),
                Term::typed_literal("1e3", XSD_DOUBLE),
                Term::typed_literal("true", XSD_BOOLEAN),
                Term::typed_literal("x", "http://ex.org/dt"),
                Term::typed_literal("y", XSD_STRING),
            ]
        );
    }

    #[test]
    fn test_blank_node_property_list() {
        let triples = parse(
            r#"@prefix ex: <http://ex.org/> .
            ex:s ex:address [ ex:city "Paris" ; ex:zip "75001" ] ."#,
        );
        assert_eq!(triples.len(), 3);
        // Inner triples come first, the linking triple once the list closes.
        let node = triples[0].subject.clone();
        assert!(node.is_blank_node());
        assert_eq!(triples[1].subject, node);
        assert_eq!(
            triples[2],
            RdfTriple::new(iri("http://ex.org/s"), iri("http://ex.org/address"), node)
        );
    }

    #[test]
    fn test_property_list_as_subject() {
        let triples = parse(
            r#"@prefix ex: <http://ex.org/> .
            [ ex:p "a" ] ex:q "b" .
            [ ex:r "c" ] ."#,
        );
        assert_eq!(triples.len(), 3);
        assert_eq!(triples[0].subject, triples[1].subject);
        assert_ne!(triples[0].subject, triples[2].subject);
    }

    #[test]
    fn test_collections() {
        let triples = parse(
            r#"@prefix ex: <http://ex.org/> .
            ex:s ex:list ( 1 ex:two ( ) ) .
            ex:s ex:empty () ."#,
        );
        let first: Vec<_> = triples
            .iter()
            .filter(|t| t.predicate == iri(RDF_FIRST))
            .collect();
        assert_eq!(first.len(), 3);
        assert_eq!(first[2].object, iri(RDF_NIL));
        let rests: Vec<_> = triples
            .iter()
            .filter(|t| t.predicate == iri(RDF_REST))
            .collect();
        assert_eq!(rests.len(), 3);
        assert_eq!(rests[2].object, iri(RDF_NIL));
        let head = triples
            .iter()
            .find(|t| t.predicate == iri("http://ex.org/list"))
            .map(|t| t.object.clone())
            .unwrap();
        assert_eq!(head, first[0].subject);
        assert!(triples.contains(&RdfTriple::new(
            iri("http://ex.org/s"),
            iri("http://ex.org/empty"),
            iri(RDF_NIL)
        )));
    }

    #[test]
    fn test_blank_labels_scoped_per_document() {
        let mut parser = TurtleParser::new(ParserConfig::default().with_seed(1));
        let text = "_:x <http://ex.org/p> _:x .";
        let one = parser.parse_to_vec("a.ttl", text).unwrap();
        let two = parser.parse_to_vec("b.ttl", text).unwrap();
        assert_eq!(one[0].subject, one[0].object);
        assert_ne!(one[0].subject, two[0].subject);
    }

    #[test]
    fn test_seeded_parsers_agree() {
        let text = "[] <http://ex.org/p> [ <http://ex.org/q> _:l ] .";
        assert_eq!(parse(text), parse(text));
    }

    #[test]
    fn test_trailing_semicolon() {
        let triples = parse("<http://s> <http://p> <http://o> ; .");
        assert_eq!(triples.len(), 1);
    }

    #[test]
    fn test_error_positions() {
        let err = TurtleParser::default()
            .parse_to_vec("bad.ttl", "<http://s> <http://p>\n  .")
            .unwrap_err();
        match err {
            Error::Syntax {
                source_id,
                line,
                column,
                message,
            } => {
                assert_eq!(source_id, "bad.ttl");
                assert_eq!((line, column), (2, 3));
                assert!(message.contains("expected object"), "{}", message);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_undefined_prefix() {
        let err = TurtleParser::new(ParserConfig::default().without_default_prefixes())
            .parse_to_vec("x", "rdf:a rdf:b rdf:c .")
            .unwrap_err();
        assert!(err.to_string().contains("undefined prefix 'rdf:'"));
    }

    #[test]
    fn test_partial_output_survives_error() {
        let mut delivered = Vec::new();
        let mut sink = |t: RdfTriple| -> Result<()> {
            delivered.push(t);
            Ok(())
        };
        let result = TurtleParser::default().parse(
            "partial.ttl",
            "<http://s> <http://p> <http://o1> .\n<http://s> <http://p> ??? .",
            &mut sink,
        );
        assert!(result.is_err());
        assert_eq!(delivered.len(), 1);
    }

    #[test]
    fn test_literal_subject_rejected() {
        assert!(TurtleParser::default()
            .parse_to_vec("x", "\"lit\" <http://p> <http://o> .")
            .is_err());
    }
}
