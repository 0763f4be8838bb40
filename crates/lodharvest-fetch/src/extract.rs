//! Content extractors: turn a fetched body into facts.
//!
//! The registry is built once at startup and handed to the fetcher; it picks
//! the first extractor that accepts the response media type.

use lodharvest_core::{parse_facts, rdf_format_for, Fact, Result};
use std::sync::Arc;

/// A fetched body together with where it came from.
#[derive(Debug, Clone, Copy)]
pub struct Document<'a> {
    /// Effective URI after redirects. Relative references resolve against it.
    pub uri: &'a str,
    /// Media type essence, lowercased, without parameters.
    pub media_type: &'a str,
    pub body: &'a [u8],
}

#[derive(Debug, Default)]
pub struct Extraction {
    pub facts: Vec<Fact>,
    /// Companion documents worth fetching for more facts.
    pub follow: Vec<String>,
}

pub trait ContentExtractor: Send + Sync {
    fn name(&self) -> &str;

    fn accepts(&self, media_type: &str) -> bool;

    fn extract(&self, doc: &Document<'_>) -> Result<Extraction>;
}

/// Structured RDF formats the parser reads directly.
pub struct RdfExtractor;

impl ContentExtractor for RdfExtractor {
    fn name(&self) -> &str {
        "rdf"
    }

    fn accepts(&self, media_type: &str) -> bool {
        rdf_format_for(media_type).is_some()
    }

    fn extract(&self, doc: &Document<'_>) -> Result<Extraction> {
        let Some(format) = rdf_format_for(doc.media_type) else {
            return Ok(Extraction::default());
        };
        Ok(Extraction {
            facts: parse_facts(doc.body, format, Some(doc.uri))?,
            follow: Vec::new(),
        })
    }
}

pub struct ExtractorRegistry {
    extractors: Vec<Arc<dyn ContentExtractor>>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// Structured RDF first, then JSON-LD, then HTML.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(RdfExtractor);
        registry.register(crate::jsonld::JsonLdExtractor);
        registry.register(crate::html::HtmlExtractor::new());
        registry
    }

    /// Register an extractor. Replaces any existing one with the same name,
    /// keeping its position.
    pub fn register(&mut self, extractor: impl ContentExtractor + 'static) {
        let extractor: Arc<dyn ContentExtractor> = Arc::new(extractor);
        match self.extractors.iter().position(|e| e.name() == extractor.name()) {
            Some(i) => self.extractors[i] = extractor,
            None => self.extractors.push(extractor),
        }
    }

    pub fn resolve(&self, media_type: &str) -> Option<Arc<dyn ContentExtractor>> {
        self.extractors
            .iter()
            .find(|e| e.accepts(media_type))
            .cloned()
    }

    pub fn list(&self) -> Vec<&str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_by_media_type() {
        let reg = ExtractorRegistry::with_defaults();
        assert_eq!(reg.list(), vec!["rdf", "json-ld", "html"]);
        assert_eq!(reg.resolve("text/turtle").unwrap().name(), "rdf");
        assert_eq!(reg.resolve("application/ld+json").unwrap().name(), "json-ld");
        assert_eq!(reg.resolve("application/rdf+xml").unwrap().name(), "rdf");
        assert_eq!(reg.resolve("text/html").unwrap().name(), "html");
        assert!(reg.resolve("image/png").is_none());
    }

    #[test]
    fn register_replaces_same_name() {
        struct Nothing;
        impl ContentExtractor for Nothing {
            fn name(&self) -> &str {
                "rdf"
            }
            fn accepts(&self, _: &str) -> bool {
                false
            }
            fn extract(&self, _: &Document<'_>) -> Result<Extraction> {
                Ok(Extraction::default())
            }
        }
        let mut reg = ExtractorRegistry::with_defaults();
        reg.register(Nothing);
        assert_eq!(reg.list(), vec!["rdf", "json-ld", "html"]);
        assert!(reg.resolve("text/turtle").is_none());
    }

    #[test]
    fn rdf_extractor_resolves_against_document() {
        let doc = Document {
            uri: "https://example.org/data/",
            media_type: "text/turtle",
            body: b"<a> <https://example.org/p> <b> .",
        };
        let out = RdfExtractor.extract(&doc).unwrap();
        assert_eq!(out.facts.len(), 1);
        assert_eq!(out.facts[0].subject.to_string(), "<https://example.org/data/a>");
        assert!(out.follow.is_empty());
    }
}
