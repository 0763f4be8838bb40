//! Partition key <-> partition URI mapping.
//!
//! Keys are opaque application identifiers (a relative file path, a task name,
//! a fetched resource URI). Every byte outside the RFC 3986 unreserved set is
//! percent-escaped and the result is appended to a configurable base, so the
//! mapping is deterministic and reversible.

use lodharvest_core::{iri, NamedNode, Result};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

pub const DEFAULT_BASE: &str = "urn:lodharvest:partition:";

const KEY_ESCAPES: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionMapper {
    base: String,
}

impl Default for PartitionMapper {
    fn default() -> Self {
        Self::new(DEFAULT_BASE)
    }
}

impl PartitionMapper {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn key_to_uri(&self, key: &str) -> String {
        format!("{}{}", self.base, utf8_percent_encode(key, KEY_ESCAPES))
    }

    /// Inverse of [`key_to_uri`](Self::key_to_uri). `None` for URIs outside the base
    /// or whose escapes do not decode to UTF-8.
    pub fn uri_to_key(&self, uri: &str) -> Option<String> {
        let escaped = uri.strip_prefix(&self.base)?;
        percent_decode_str(escaped)
            .decode_utf8()
            .ok()
            .map(|k| k.into_owned())
    }

    pub fn key_to_node(&self, key: &str) -> Result<NamedNode> {
        iri(&self.key_to_uri(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_keys() {
        let m = PartitionMapper::default();
        for key in [
            "urn:test:1",
            "configs/harvest.yml",
            "https://example.org/thing?x=1&y=2#frag",
            "with space and ünïcödé",
            "",
            "%41 already escaped",
        ] {
            let uri = m.key_to_uri(key);
            assert_eq!(m.uri_to_key(&uri).as_deref(), Some(key), "key {key:?}");
        }
    }

    #[test]
    fn produced_uris_roundtrip() {
        let m = PartitionMapper::new("urn:x:");
        let uri = m.key_to_uri("a/b c");
        assert_eq!(uri, "urn:x:a%2Fb%20c");
        let key = m.uri_to_key(&uri).unwrap();
        assert_eq!(m.key_to_uri(&key), uri);
    }

    #[test]
    fn produced_uris_are_valid_iris() {
        let m = PartitionMapper::default();
        assert!(m.key_to_node("https://example.org/a b").is_ok());
    }

    #[test]
    fn foreign_uri_has_no_key() {
        let m = PartitionMapper::default();
        assert_eq!(m.uri_to_key("https://example.org/graph"), None);
    }
}
