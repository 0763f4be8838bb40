//! Facts, identifiers and the narrow RDF parse/serialize surface the harvester uses.

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use oxigraph::io::{RdfFormat, RdfParser};
use oxigraph::model::vocab::xsd;
use oxigraph::model::{Literal, NamedNode, Quad, Term, Triple};

pub use oxigraph::model::{BlankNode, GraphName, Subject};

/// A subject–predicate–object statement.
pub type Fact = Triple;

/// Parse an absolute identifier. Relative references are rejected.
pub fn iri(value: &str) -> Result<NamedNode> {
    NamedNode::new(value.trim()).map_err(|e| Error::invalid_iri(value, e))
}

/// True when `value` parses as an absolute IRI.
pub fn is_absolute_iri(value: &str) -> bool {
    NamedNode::new(value).is_ok()
}

pub fn fact(subject: impl Into<Subject>, predicate: impl Into<NamedNode>, object: impl Into<Term>) -> Fact {
    Triple::new(subject, predicate, object)
}

pub fn timestamp_literal(ts: DateTime<Utc>) -> Literal {
    Literal::new_typed_literal(ts.to_rfc3339_opts(SecondsFormat::Micros, true), xsd::DATE_TIME)
}

/// Read back a timestamp written by [`timestamp_literal`] (or any xsd:dateTime with offset).
pub fn parse_timestamp(term: &Term) -> Option<DateTime<Utc>> {
    match term {
        Term::Literal(lit) => DateTime::parse_from_rfc3339(lit.value())
            .ok()
            .map(|ts| ts.with_timezone(&Utc)),
        _ => None,
    }
}

/// `minutes` as a duration, saturating at [`Duration::MAX`] for values chrono
/// cannot represent.
pub fn minutes_saturating(minutes: u64) -> Duration {
    i64::try_from(minutes)
        .ok()
        .and_then(Duration::try_minutes)
        .unwrap_or(Duration::MAX)
}

pub fn integer_literal(value: usize) -> Literal {
    Literal::new_typed_literal(value.to_string(), xsd::INTEGER)
}

pub fn boolean_literal(value: bool) -> Literal {
    Literal::new_typed_literal(if value { "true" } else { "false" }, xsd::BOOLEAN)
}

/// Resolve a media type (parameters allowed) to a format the RDF parser understands.
pub fn rdf_format_for(media_type: &str) -> Option<RdfFormat> {
    let essence = media_type.split(';').next().unwrap_or("").trim();
    if essence.is_empty() {
        return None;
    }
    RdfFormat::from_media_type(essence)
}

/// Guess a format from the path extension of a URI (`.ttl`, `.nt`, `.rdf`, ...).
pub fn rdf_format_for_uri(uri: &str) -> Option<RdfFormat> {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    let last = path.rsplit('/').next().unwrap_or(path);
    let (_, ext) = last.rsplit_once('.')?;
    RdfFormat::from_extension(ext)
}

/// Parse a serialized document into quads. Blank nodes are renamed so that
/// separate documents never share blank node identifiers.
pub fn parse_quads(bytes: &[u8], format: RdfFormat, base_iri: Option<&str>) -> Result<Vec<Quad>> {
    let mut parser = RdfParser::from_format(format).rename_blank_nodes();
    if let Some(base) = base_iri {
        parser = parser
            .with_base_iri(base)
            .map_err(|e| Error::invalid_iri(base, e))?;
    }
    parser
        .for_reader(bytes)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::parse(format.name(), e))
}

/// Parse a serialized document into facts, discarding any graph names.
pub fn parse_facts(bytes: &[u8], format: RdfFormat, base_iri: Option<&str>) -> Result<Vec<Fact>> {
    Ok(parse_quads(bytes, format, base_iri)?
        .into_iter()
        .map(|q| Triple::new(q.subject, q.predicate, q.object))
        .collect())
}

/// N-Triples serialization, one statement per line.
pub fn to_ntriples(facts: &[Fact]) -> String {
    let mut out = String::new();
    for f in facts {
        out.push_str(&f.to_string());
        out.push_str(" .\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iri_rejects_relative() {
        assert!(iri("https://example.org/a").is_ok());
        assert!(iri("relative/path").is_err());
        assert!(!is_absolute_iri("not an iri"));
    }

    #[test]
    fn huge_minute_counts_saturate() {
        assert_eq!(minutes_saturating(90), Duration::minutes(90));
        assert_eq!(minutes_saturating(u64::MAX), Duration::MAX);
        assert_eq!(minutes_saturating(i64::MAX as u64), Duration::MAX);
        assert!(Utc::now() - DateTime::<Utc>::MIN_UTC < minutes_saturating(u64::MAX));
    }

    #[test]
    fn timestamp_roundtrip() {
        let now = Utc::now();
        let lit: Term = timestamp_literal(now).into();
        let back = parse_timestamp(&lit).unwrap();
        assert_eq!(back.timestamp_micros(), now.timestamp_micros());
    }

    #[test]
    fn media_type_with_parameters() {
        assert_eq!(rdf_format_for("text/turtle; charset=utf-8"), Some(RdfFormat::Turtle));
        assert_eq!(rdf_format_for("text/html"), None);
        assert_eq!(rdf_format_for(""), None);
    }

    #[test]
    fn format_from_uri_extension() {
        assert_eq!(rdf_format_for_uri("https://example.org/data.ttl"), Some(RdfFormat::Turtle));
        assert_eq!(rdf_format_for_uri("https://example.org/data.nt?x=1"), Some(RdfFormat::NTriples));
        assert_eq!(rdf_format_for_uri("https://example.org/page"), None);
    }

    #[test]
    fn parse_and_serialize_ntriples() {
        let doc = b"<https://example.org/s> <https://example.org/p> \"o\" .\n";
        let facts = parse_facts(doc, RdfFormat::NTriples, None).unwrap();
        assert_eq!(facts.len(), 1);
        let nt = to_ntriples(&facts);
        assert_eq!(nt, String::from_utf8_lossy(doc));
    }

    #[test]
    fn parse_resolves_relative_against_base() {
        let doc = b"<thing> <https://example.org/p> <other> .";
        let facts = parse_facts(doc, RdfFormat::Turtle, Some("https://example.org/dir/")).unwrap();
        assert_eq!(facts[0].subject.to_string(), "<https://example.org/dir/thing>");
    }

    #[test]
    fn parse_failure_is_error() {
        let err = parse_facts(b"<unterminated", RdfFormat::Turtle, None).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }
}
