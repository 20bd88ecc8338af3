//! The "simple index" interchange shape.
//!
//! A nested map `subject -> predicate -> [object]`, the shape external
//! serializers and bulk importers exchange with the store:
//!
//! ```json
//! {
//!   "http://example.org/alice": {
//!     "http://xmlns.com/foaf/0.1/name": [
//!       { "value": "Alice", "type": "literal", "lang": "en" }
//!     ]
//!   }
//! }
//! ```
//!
//! Subject keys are IRIs, or `_:label` for blank nodes. Maps keep insertion
//! order.

use crate::rdf::RdfTriple;
use crate::term::{Literal, Term, TermKind};
use crate::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One object in the simple index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectValue {
    /// IRI, blank label (without `_:`) or lexical form.
    pub value: String,
    /// `uri`, `bnode` or `literal`.
    #[serde(rename = "type")]
    pub kind: TermKind,
    /// Language tag of a literal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    /// Datatype IRI of a literal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
}

impl ObjectValue {
    /// Describes `term`.
    pub fn from_term(term: &Term) -> Self {
        let (lang, datatype) = match term.as_literal() {
            Some(lit) => (
                lit.language().map(str::to_string),
                lit.explicit_datatype().map(str::to_string),
            ),
            None => (None, None),
        };
        Self {
            value: term.value().to_string(),
            kind: term.kind(),
            lang,
            datatype,
        }
    }

    /// Rebuilds the term. A language tag wins over a datatype.
    pub fn to_term(&self) -> Term {
        match self.kind {
            TermKind::NamedNode => Term::iri(self.value.clone()),
            TermKind::BlankNode => Term::blank(self.value.clone()),
            TermKind::Literal => Literal::from_parts(
                self.value.clone(),
                self.lang.clone(),
                self.datatype.clone(),
            )
            .into(),
        }
    }
}

fn subject_key(term: &Term) -> String {
    match term {
        Term::BlankNode(label) => format!("_:{}", label),
        other => other.value().to_string(),
    }
}

fn subject_from_key(key: &str) -> Term {
    match key.strip_prefix("_:") {
        Some(label) => Term::blank(label),
        None => Term::iri(key),
    }
}

/// Nested `subject -> predicate -> objects` map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimpleIndex {
    entries: IndexMap<String, IndexMap<String, Vec<ObjectValue>>>,
}

impl SimpleIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Groups `triples` into an index. Duplicate triples are kept once.
    pub fn from_triples<'a>(triples: impl IntoIterator<Item = &'a RdfTriple>) -> Self {
        let mut index = Self::new();
        for triple in triples {
            index.add(triple);
        }
        index
    }

    /// Adds one triple. Returns false if it was already present.
    pub fn add(&mut self, triple: &RdfTriple) -> bool {
        let object = ObjectValue::from_term(&triple.object);
        let objects = self
            .entries
            .entry(subject_key(&triple.subject))
            .or_default()
            .entry(triple.predicate.value().to_string())
            .or_default();
        if objects.contains(&object) {
            return false;
        }
        objects.push(object);
        true
    }

    /// Objects recorded for a subject key and predicate IRI.
    pub fn get(&self, subject: &str, predicate: &str) -> &[ObjectValue] {
        self.entries
            .get(subject)
            .and_then(|predicates| predicates.get(predicate))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Subject keys in insertion order.
    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of triples.
    pub fn len(&self) -> usize {
        self.entries
            .values()
            .flat_map(|predicates| predicates.values())
            .map(Vec::len)
            .sum()
    }

    /// True when the index holds no triple.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flattens the index back into triples.
    ///
    /// # Errors
    ///
    /// `Error::InvalidTriple` when a subject key or predicate is empty.
    pub fn to_triples(&self) -> Result<Vec<RdfTriple>> {
        let mut triples = Vec::with_capacity(self.len());
        for (subject, predicates) in &self.entries {
            if subject.is_empty() {
                return Err(Error::InvalidTriple("empty subject key".into()));
            }
            let subject = subject_from_key(subject);
            for (predicate, objects) in predicates {
                if predicate.is_empty() {
                    return Err(Error::InvalidTriple(format!(
                        "empty predicate for subject {}",
                        subject
                    )));
                }
                for object in objects {
                    triples.push(RdfTriple::new(
                        subject.clone(),
                        Term::iri(predicate.clone()),
                        object.to_term(),
                    ));
                }
            }
        }
        Ok(triples)
    }

    /// Serializes to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses the JSON form.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Vec<RdfTriple> {
        vec![
            RdfTriple::new(
                Term::iri("http://ex.org/alice"),
                Term::iri("http://ex.org/name"),
                Term::lang_literal("Alice", "en"),
            ),
            RdfTriple::new(
                Term::iri("http://ex.org/alice"),
                Term::iri("http://ex.org/age"),
                Term::integer(30),
            ),
            RdfTriple::new(
                Term::iri("http://ex.org/alice"),
                Term::iri("http://ex.org/knows"),
                Term::blank("b0"),
            ),
            RdfTriple::new(
                Term::blank("b0"),
                Term::iri("http://ex.org/name"),
                Term::literal("Bob"),
            ),
        ]
    }

    #[test]
    fn test_grouping() {
        let index = SimpleIndex::from_triples(&alice());
        assert_eq!(index.len(), 4);
        assert_eq!(
            index.subjects().collect::<Vec<_>>(),
            vec!["http://ex.org/alice", "_:b0"]
        );
        let names = index.get("http://ex.org/alice", "http://ex.org/name");
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].kind, TermKind::Literal);
        assert_eq!(names[0].lang.as_deref(), Some("en"));
        assert!(index.get("http://ex.org/alice", "http://ex.org/missing").is_empty());
    }

    #[test]
    fn test_duplicates_collapse() {
        let mut index = SimpleIndex::new();
        assert!(index.add(&alice()[0]));
        assert!(!index.add(&alice()[0]));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_back_to_triples() {
        let index = SimpleIndex::from_triples(&alice());
        assert_eq!(index.to_triples().unwrap(), alice());
    }

    #[test]
    fn test_json_shape() {
        let index = SimpleIndex::from_triples(&alice()[1..2]);
        let json: serde_json::Value = serde_json::from_str(&index.to_json().unwrap()).unwrap();
        let age = &json["http://ex.org/alice"]["http://ex.org/age"][0];
        assert_eq!(age["value"], "30");
        assert_eq!(age["type"], "literal");
        assert_eq!(age["datatype"], "http://www.w3.org/2001/XMLSchema#integer");
        assert!(age.get("lang").is_none());

        let parsed = SimpleIndex::from_json(&index.to_json().unwrap()).unwrap();
        assert_eq!(parsed, index);
    }

    #[test]
    fn test_rejects_empty_keys() {
        let index = SimpleIndex::from_json(r#"{"": {"http://p": []}}"#).unwrap();
        assert!(matches!(index.to_triples(), Err(Error::InvalidTriple(_))));
    }
}
