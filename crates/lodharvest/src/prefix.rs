//! Prefix bindings for compact `prefix:local` identifiers.

use std::collections::BTreeMap;

/// Bindings every configuration starts from. Configured prefixes override them.
pub const DEFAULT_PREFIXES: [(&str, &str); 10] = [
    ("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
    ("rdfs", "http://www.w3.org/2000/01/rdf-schema#"),
    ("owl", "http://www.w3.org/2002/07/owl#"),
    ("xsd", "http://www.w3.org/2001/XMLSchema#"),
    ("schema", "https://schema.org/"),
    ("dct", "http://purl.org/dc/terms/"),
    ("foaf", "http://xmlns.com/foaf/0.1/"),
    ("skos", "http://www.w3.org/2004/02/skos/core#"),
    ("dcat", "http://www.w3.org/ns/dcat#"),
    ("prov", "http://www.w3.org/ns/prov#"),
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixMap {
    bindings: BTreeMap<String, String>,
}

impl PrefixMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut map = Self::new();
        for (prefix, ns) in DEFAULT_PREFIXES {
            map.bind(prefix, ns);
        }
        map
    }

    pub fn bind(&mut self, prefix: impl Into<String>, namespace: impl Into<String>) {
        self.bindings.insert(prefix.into(), namespace.into());
    }

    pub fn extend<K, V>(&mut self, bindings: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (prefix, ns) in bindings {
            self.bind(prefix, ns);
        }
    }

    pub fn get(&self, prefix: &str) -> Option<&str> {
        self.bindings.get(prefix).map(String::as_str)
    }

    /// Expand `prefix:local`. `None` when there is no colon or the prefix is unbound.
    pub fn expand(&self, curie: &str) -> Option<String> {
        let (prefix, local) = curie.split_once(':')?;
        self.get(prefix).map(|ns| format!("{ns}{local}"))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings.iter().map(|(p, n)| (p.as_str(), n.as_str()))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// `PREFIX` declarations for every binding, one per line.
    pub fn sparql_prologue(&self) -> String {
        self.iter()
            .map(|(p, ns)| format!("PREFIX {p}: <{ns}>\n"))
            .collect()
    }
}
