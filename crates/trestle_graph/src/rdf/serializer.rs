//! RDF serializers for Turtle and N-Triples formats

use super::namespace::{NamespaceMap, RDF_TYPE, XSD_BOOLEAN, XSD_INTEGER};
use super::RdfTriple;
use crate::term::{escape_literal, Term};
use crate::{Error, Result};
use indexmap::IndexMap;
use std::io::Write;

/// Trait for RDF serializers
pub trait RdfSerializer {
    /// Serialize RDF triples to string
    fn serialize(&self, triples: &[RdfTriple]) -> Result<String>;

    /// Serialize to a writer
    fn serialize_to_writer(&self, triples: &[RdfTriple], writer: &mut dyn Write) -> Result<()> {
        let output = self.serialize(triples)?;
        writer.write_all(output.as_bytes()).map_err(Error::Io)?;
        Ok(())
    }
}

/// Serializer for N-Triples (.nt) format
#[derive(Debug, Clone, Copy, Default)]
pub struct NTriplesSerializer;

impl RdfSerializer for NTriplesSerializer {
    fn serialize(&self, triples: &[RdfTriple]) -> Result<String> {
        let mut output = String::new();
        for triple in triples {
            output.push_str(&triple.to_string());
            output.push('\n');
        }
        Ok(output)
    }
}

/// Serializer for Turtle (.ttl) format
///
/// Triples are grouped by subject (in first-seen order), then by predicate,
/// and IRIs are compacted with the serializer's prefix table.
#[derive(Debug, Clone)]
pub struct TurtleSerializer {
    namespaces: NamespaceMap,
}

impl TurtleSerializer {
    /// Create serializer with the given namespaces
    pub fn new(namespaces: NamespaceMap) -> Self {
        Self { namespaces }
    }

    /// Add a namespace
    pub fn add_namespace(&mut self, prefix: &str, iri: &str) {
        self.namespaces.add(prefix, iri);
    }

    fn format_term(&self, term: &Term) -> String {
        match term {
            Term::NamedNode(iri) => self
                .namespaces
                .compact(iri)
                .unwrap_or_else(|| term.to_string()),
            Term::BlankNode(_) => term.to_string(),
            Term::Literal(lit) => {
                if lit.language().is_none() {
                    let lexical = lit.lexical();
                    match lit.datatype() {
                        XSD_INTEGER if is_integer_lexical(lexical) => return lexical.to_string(),
                        XSD_BOOLEAN if matches!(lexical, "true" | "false") => {
                            return lexical.to_string()
                        }
                        _ => {}
                    }
                }
                let mut out = String::from("\"");
                escape_literal(lit.lexical(), &mut out);
                out.push('"');
                if let Some(lang) = lit.language() {
                    out.push('@');
                    out.push_str(lang);
                } else if let Some(datatype) = lit.explicit_datatype() {
                    out.push_str("^^");
                    out.push_str(&self.format_term(&Term::iri(datatype)));
                }
                out
            }
        }
    }

    fn format_predicate(&self, predicate: &Term) -> String {
        if predicate.as_iri() == Some(RDF_TYPE) {
            "a".to_string()
        } else {
            self.format_term(predicate)
        }
    }
}

impl Default for TurtleSerializer {
    fn default() -> Self {
        Self::new(NamespaceMap::with_defaults())
    }
}

fn is_integer_lexical(lexical: &str) -> bool {
    let digits = lexical.strip_prefix(['+', '-']).unwrap_or(lexical);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

impl RdfSerializer for TurtleSerializer {
    fn serialize(&self, triples: &[RdfTriple]) -> Result<String> {
        let mut grouped: IndexMap<&Term, IndexMap<&Term, Vec<&Term>>> = IndexMap::new();
        for triple in triples {
            grouped
                .entry(&triple.subject)
                .or_default()
                .entry(&triple.predicate)
                .or_default()
                .push(&triple.object);
        }

        let mut output = self.namespaces.to_turtle_prefixes();
        if !output.is_empty() {
            output.push('\n');
        }

        for (subject, predicates) in grouped {
            output.push_str(&self.format_term(subject));
            let mut first_predicate = true;
            for (predicate, objects) in predicates {
                output.push_str(if first_predicate { " " } else { " ;\n    " });
                first_predicate = false;
                output.push_str(&self.format_predicate(predicate));
                output.push(' ');
                let objects: Vec<String> = objects.iter().map(|o| self.format_term(o)).collect();
                output.push_str(&objects.join(", "));
            }
            output.push_str(" .\n");
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::{ParserConfig, TurtleParser};

    fn sample() -> Vec<RdfTriple> {
        vec![
            RdfTriple::new(
                Term::iri("http://xmlns.com/foaf/0.1/alice"),
                Term::iri(RDF_TYPE),
                Term::iri("http://xmlns.com/foaf/0.1/Person"),
            ),
            RdfTriple::new(
                Term::iri("http://xmlns.com/foaf/0.1/alice"),
                Term::iri("http://xmlns.com/foaf/0.1/name"),
                Term::lang_literal("Alice \"A\"", "en"),
            ),
            RdfTriple::new(
                Term::iri("http://xmlns.com/foaf/0.1/alice"),
                Term::iri("http://xmlns.com/foaf/0.1/age"),
                Term::integer(30),
            ),
            RdfTriple::new(
                Term::blank("n1"),
                Term::iri("http://ex.org/p"),
                Term::typed_literal("x", "http://ex.org/dt"),
            ),
        ]
    }

    #[test]
    fn test_ntriples_serialization() {
        let output = NTriplesSerializer.serialize(&sample()).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[1],
            "<http://xmlns.com/foaf/0.1/alice> <http://xmlns.com/foaf/0.1/name> \"Alice \\\"A\\\"\"@en ."
        );
    }

    #[test]
    fn test_turtle_grouping() {
        let output = TurtleSerializer::default().serialize(&sample()).unwrap();
        assert!(output.contains("foaf:alice a foaf:Person ;\n    foaf:name \"Alice \\\"A\\\"\"@en ;\n    foaf:age 30 .\n"));
        assert!(output.contains("_:n1 <http://ex.org/p> \"x\"^^<http://ex.org/dt> .\n"));
    }

    #[test]
    fn test_roundtrip() {
        for serializer in [
            Box::new(NTriplesSerializer) as Box<dyn RdfSerializer>,
            Box::new(TurtleSerializer::default()),
        ] {
            let text = serializer.serialize(&sample()).unwrap();
            let parsed = TurtleParser::new(ParserConfig::default())
                .parse_to_vec("roundtrip", &text)
                .unwrap();
            // Blank labels are rescoped by the parser; compare the rest.
            assert_eq!(parsed.len(), 4);
            assert_eq!(&parsed[..3], &sample()[..3]);
            assert_eq!(parsed[3].object, sample()[3].object);
        }
    }

    #[test]
    fn test_serialize_to_writer() {
        let mut buffer = Vec::new();
        NTriplesSerializer
            .serialize_to_writer(&sample()[..1], &mut buffer)
            .unwrap();
        assert!(String::from_utf8(buffer).unwrap().ends_with(" .\n"));
    }
}
