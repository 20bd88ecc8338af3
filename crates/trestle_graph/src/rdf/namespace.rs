//! RDF namespace and prefix management
//!
//! Provides the well-known vocabularies and the prefix table used by the
//! Turtle parser, the serializers and the SPARQL prologue.

use indexmap::IndexMap;

/// Standard RDF namespace
pub const PREFIX_RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
/// RDF Schema namespace
pub const PREFIX_RDFS: &str = "http://www.w3.org/2000/01/rdf-schema#";
/// XML Schema datatypes namespace
pub const PREFIX_XSD: &str = "http://www.w3.org/2001/XMLSchema#";
/// OWL namespace
pub const PREFIX_OWL: &str = "http://www.w3.org/2002/07/owl#";
/// Dublin Core namespace
pub const PREFIX_DC: &str = "http://purl.org/dc/elements/1.1/";
/// Dublin Core Terms namespace
pub const PREFIX_DCT: &str = "http://purl.org/dc/terms/";
/// FOAF namespace
pub const PREFIX_FOAF: &str = "http://xmlns.com/foaf/0.1/";
/// SKOS namespace
pub const PREFIX_SKOS: &str = "http://www.w3.org/2004/02/skos/core#";

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const RDF_FIRST: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#first";
pub const RDF_REST: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#rest";
pub const RDF_NIL: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#nil";
pub const RDF_LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";

pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
pub const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
pub const XSD_DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
pub const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
pub const XSD_FLOAT: &str = "http://www.w3.org/2001/XMLSchema#float";
pub const XSD_DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";

/// Integer-derived XSD datatypes, treated as `xsd:integer` in arithmetic.
pub const XSD_INTEGER_DERIVED: &[&str] = &[
    XSD_INTEGER,
    "http://www.w3.org/2001/XMLSchema#int",
    "http://www.w3.org/2001/XMLSchema#long",
    "http://www.w3.org/2001/XMLSchema#short",
    "http://www.w3.org/2001/XMLSchema#byte",
    "http://www.w3.org/2001/XMLSchema#nonNegativeInteger",
    "http://www.w3.org/2001/XMLSchema#nonPositiveInteger",
    "http://www.w3.org/2001/XMLSchema#negativeInteger",
    "http://www.w3.org/2001/XMLSchema#positiveInteger",
    "http://www.w3.org/2001/XMLSchema#unsignedLong",
    "http://www.w3.org/2001/XMLSchema#unsignedInt",
    "http://www.w3.org/2001/XMLSchema#unsignedShort",
    "http://www.w3.org/2001/XMLSchema#unsignedByte",
];

/// A map of namespace prefixes, in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamespaceMap {
    prefixes: IndexMap<String, String>,
}

impl NamespaceMap {
    /// Create an empty namespace map
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a namespace map with standard prefixes
    pub fn with_defaults() -> Self {
        let mut map = Self::new();
        map.add("rdf", PREFIX_RDF);
        map.add("rdfs", PREFIX_RDFS);
        map.add("xsd", PREFIX_XSD);
        map.add("owl", PREFIX_OWL);
        map.add("dc", PREFIX_DC);
        map.add("dcterms", PREFIX_DCT);
        map.add("foaf", PREFIX_FOAF);
        map.add("skos", PREFIX_SKOS);
        map
    }

    /// Add or rebind a namespace
    pub fn add(&mut self, prefix: &str, iri: &str) {
        self.prefixes.insert(prefix.to_string(), iri.to_string());
    }

    /// Get the IRI for a prefix
    pub fn get_iri(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(|s| s.as_str())
    }

    /// Expand `prefix` + `local` to a full IRI
    pub fn expand_parts(&self, prefix: &str, local: &str) -> Option<String> {
        self.get_iri(prefix).map(|base| format!("{}{}", base, local))
    }

    /// Expand a prefixed name to full IRI
    /// Returns the original string if not a valid prefixed name
    pub fn expand(&self, prefixed: &str) -> String {
        prefixed
            .split_once(':')
            .and_then(|(prefix, local)| self.expand_parts(prefix, local))
            .unwrap_or_else(|| prefixed.to_string())
    }

    /// Compact an IRI to prefixed form using the longest matching namespace
    pub fn compact(&self, iri: &str) -> Option<String> {
        self.prefixes
            .iter()
            .filter(|(_, base)| iri.starts_with(base.as_str()))
            .max_by_key(|(_, base)| base.len())
            .map(|(prefix, base)| (prefix, &iri[base.len()..]))
            .filter(|(_, local)| is_simple_local_name(local))
            .map(|(prefix, local)| format!("{}:{}", prefix, local))
    }

    /// Get all prefixes
    pub fn prefixes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.prefixes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of declared prefixes
    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    /// True when no prefix is declared
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    /// Generate Turtle @prefix declarations
    pub fn to_turtle_prefixes(&self) -> String {
        let mut result = String::new();
        for (prefix, iri) in &self.prefixes {
            result.push_str(&format!("@prefix {}: <{}> .\n", prefix, iri));
        }
        result
    }
}

/// Local names that can be written after a prefix without escaping.
fn is_simple_local_name(local: &str) -> bool {
    !local.is_empty()
        && !local.ends_with('.')
        && local
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !local.starts_with(['-', '.'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_map_expand() {
        let map = NamespaceMap::with_defaults();

        assert_eq!(map.expand("rdf:type"), RDF_TYPE);
        assert_eq!(map.expand("xsd:integer"), XSD_INTEGER);
        // Unknown prefix returns original
        assert_eq!(map.expand("unknown:foo"), "unknown:foo");
    }

    #[test]
    fn test_namespace_map_compact() {
        let map = NamespaceMap::with_defaults();

        assert_eq!(map.compact(RDF_TYPE).as_deref(), Some("rdf:type"));
        assert_eq!(map.compact("http://example.org/foo"), None);
        // Local part with a slash can't be a plain local name.
        assert_eq!(map.compact("http://purl.org/dc/terms/a/b"), None);
    }

    #[test]
    fn test_compact_prefers_longest_namespace() {
        let mut map = NamespaceMap::new();
        map.add("ex", "http://ex.org/");
        map.add("exv", "http://ex.org/vocab#");
        assert_eq!(
            map.compact("http://ex.org/vocab#name").as_deref(),
            Some("exv:name")
        );
    }

    #[test]
    fn test_default_tables_are_independent() {
        let mut a = NamespaceMap::with_defaults();
        a.add("foaf", "http://ex.org/friends#");
        let b = NamespaceMap::with_defaults();
        assert_eq!(b.get_iri("foaf"), Some(PREFIX_FOAF));
        assert_eq!(b.len(), 8);
    }

    #[test]
    fn test_turtle_prefixes() {
        let turtle = NamespaceMap::with_defaults().to_turtle_prefixes();
        assert!(turtle.starts_with("@prefix rdf: <"));
        assert!(turtle.contains("@prefix xsd:"));
    }
}
