//! Query results.

use serde_json::{json, Map, Value};
use std::sync::Arc;
use trestle_graph::rdf::RdfTriple;
use trestle_graph::{SimpleIndex, Term};

/// One SELECT solution: a term or nothing per projected variable.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySolution {
    variables: Arc<[String]>,
    values: Vec<Option<Term>>,
}

impl QuerySolution {
    pub(crate) fn new(variables: Arc<[String]>, values: Vec<Option<Term>>) -> Self {
        Self { variables, values }
    }

    /// The term bound to `variable` (without the `?`).
    pub fn get(&self, variable: &str) -> Option<&Term> {
        let index = self.variables.iter().position(|v| v == variable)?;
        self.values.get(index).and_then(Option::as_ref)
    }

    /// Bound variables and their terms, in projection order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Term)> {
        self.variables
            .iter()
            .zip(&self.values)
            .filter_map(|(v, t)| t.as_ref().map(|t| (v.as_str(), t)))
    }

    pub fn values(&self) -> &[Option<Term>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }
}

/// Result of [`crate::SparqlEngine::execute`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResults {
    /// SELECT: projected variable names and one row per solution.
    Solutions {
        variables: Vec<String>,
        rows: Vec<QuerySolution>,
    },
    /// ASK
    Boolean(bool),
    /// CONSTRUCT
    Graph(Vec<RdfTriple>),
    /// Update: triples actually added and removed.
    Update { inserted: usize, deleted: usize },
}

impl QueryResults {
    pub fn is_solutions(&self) -> bool {
        matches!(self, QueryResults::Solutions { .. })
    }

    /// Solution rows, empty for other result kinds.
    pub fn rows(&self) -> &[QuerySolution] {
        match self {
            QueryResults::Solutions { rows, .. } => rows,
            _ => &[],
        }
    }

    pub fn variables(&self) -> &[String] {
        match self {
            QueryResults::Solutions { variables, .. } => variables,
            _ => &[],
        }
    }

    pub fn boolean(&self) -> Option<bool> {
        match self {
            QueryResults::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn triples(&self) -> &[RdfTriple] {
        match self {
            QueryResults::Graph(triples) => triples,
            _ => &[],
        }
    }

    /// A CONSTRUCT result as a simple index.
    pub fn to_simple_index(&self) -> Option<SimpleIndex> {
        match self {
            QueryResults::Graph(triples) => Some(SimpleIndex::from_triples(triples)),
            _ => None,
        }
    }

    /// W3C SPARQL 1.1 Query Results JSON. CONSTRUCT results are rendered as
    /// their simple index, updates as counts.
    pub fn to_json(&self) -> Value {
        match self {
            QueryResults::Solutions { variables, rows } => {
                let bindings: Vec<Value> = rows
                    .iter()
                    .map(|row| {
                        let mut binding = Map::new();
                        for (variable, term) in row.iter() {
                            binding.insert(variable.to_string(), term_json(term));
                        }
                        Value::Object(binding)
                    })
                    .collect();
                json!({
                    "head": { "vars": variables },
                    "results": { "bindings": bindings },
                })
            }
            QueryResults::Boolean(b) => json!({ "head": {}, "boolean": b }),
            QueryResults::Graph(triples) => {
                serde_json::to_value(SimpleIndex::from_triples(triples)).unwrap_or(Value::Null)
            }
            QueryResults::Update { inserted, deleted } => {
                json!({ "inserted": inserted, "deleted": deleted })
            }
        }
    }
}

fn term_json(term: &Term) -> Value {
    match term {
        Term::NamedNode(iri) => json!({ "type": "uri", "value": iri }),
        Term::BlankNode(label) => json!({ "type": "bnode", "value": label }),
        Term::Literal(lit) => {
            let mut object = Map::new();
            object.insert("type".into(), json!("literal"));
            object.insert("value".into(), json!(lit.lexical()));
            if let Some(lang) = lit.language() {
                object.insert("xml:lang".into(), json!(lang));
            } else if let Some(datatype) = lit.explicit_datatype() {
                object.insert("datatype".into(), json!(datatype));
            }
            Value::Object(object)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solutions() -> QueryResults {
        let variables: Arc<[String]> = vec!["s".to_string(), "o".to_string()].into();
        QueryResults::Solutions {
            variables: variables.to_vec(),
            rows: vec![
                QuerySolution::new(
                    variables.clone(),
                    vec![Some(Term::iri("http://ex.org/a")), Some(Term::lang_literal("hi", "en"))],
                ),
                QuerySolution::new(variables, vec![Some(Term::blank("b0")), None]),
            ],
        }
    }

    #[test]
    fn test_solution_access() {
        let results = solutions();
        let row = &results.rows()[0];
        assert_eq!(row.get("s"), Some(&Term::iri("http://ex.org/a")));
        assert_eq!(row.get("missing"), None);
        assert_eq!(results.rows()[1].len(), 1);
        assert_eq!(results.variables(), &["s".to_string(), "o".to_string()]);
    }

    #[test]
    fn test_json_shape() {
        let json = solutions().to_json();
        assert_eq!(json["head"]["vars"], json!(["s", "o"]));
        let bindings = json["results"]["bindings"].as_array().unwrap();
        assert_eq!(bindings[0]["s"], json!({"type": "uri", "value": "http://ex.org/a"}));
        assert_eq!(bindings[0]["o"]["xml:lang"], json!("en"));
        assert!(bindings[1].get("o").is_none());

        assert_eq!(QueryResults::Boolean(true).to_json()["boolean"], json!(true));
    }

    #[test]
    fn test_typed_literal_json() {
        let value = term_json(&Term::integer(4));
        assert_eq!(value["value"], json!("4"));
        assert_eq!(
            value["datatype"],
            json!("http://www.w3.org/2001/XMLSchema#integer")
        );
        assert!(term_json(&Term::literal("x")).get("datatype").is_none());
    }
}
