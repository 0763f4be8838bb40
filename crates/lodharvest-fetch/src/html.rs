//! Facts embedded in HTML pages.
//!
//! Two sources: `<script type="...">` blocks whose type is an RDF media type
//! or JSON-LD, and `<link rel="alternate|describedby|meta">` companion
//! documents, which are returned for the fetcher to follow one level deep.

use crate::extract::{ContentExtractor, Document, Extraction};
use crate::jsonld::{is_json_ld, parse_json_ld};
use lodharvest_core::{parse_facts, rdf_format_for, Result};
use regex::Regex;
use std::collections::HashMap;
use tracing::warn;
use url::Url;

const COMPANION_RELS: [&str; 3] = ["alternate", "describedby", "meta"];

pub struct HtmlExtractor {
    script_re: Regex,
    link_re: Regex,
    attr_re: Regex,
}

impl Default for HtmlExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl HtmlExtractor {
    pub fn new() -> Self {
        Self {
            script_re: Regex::new(r"(?is)<script\b([^>]*)>(.*?)</script\s*>").expect("static pattern"),
            link_re: Regex::new(r"(?is)<link\b([^>]*)>").expect("static pattern"),
            attr_re: Regex::new(r#"(?i)([a-z_:][-a-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+))"#)
                .expect("static pattern"),
        }
    }

    fn attributes(&self, raw: &str) -> HashMap<String, String> {
        self.attr_re
            .captures_iter(raw)
            .filter_map(|c| {
                let name = c.get(1)?.as_str().to_ascii_lowercase();
                let value = c.get(2).or_else(|| c.get(3)).or_else(|| c.get(4))?.as_str();
                Some((name, decode_entities(value)))
            })
            .collect()
    }

    fn companion(&self, attrs: &HashMap<String, String>, base: Option<&Url>) -> Option<String> {
        let rel = attrs.get("rel")?.to_ascii_lowercase();
        if !rel.split_whitespace().any(|r| COMPANION_RELS.contains(&r)) {
            return None;
        }
        // a typed link must point at something we can parse
        if let Some(ty) = attrs.get("type") {
            if !is_json_ld(ty) {
                rdf_format_for(ty)?;
            }
        } else if rel.split_whitespace().all(|r| r == "alternate") {
            return None;
        }
        let href = attrs.get("href")?.trim();
        let target = match base {
            Some(base) => base.join(href).ok()?,
            None => Url::parse(href).ok()?,
        };
        Some(target.to_string())
    }
}

/// The handful of entities that show up in attribute values and script bodies.
fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

impl ContentExtractor for HtmlExtractor {
    fn name(&self) -> &str {
        "html"
    }

    fn accepts(&self, media_type: &str) -> bool {
        matches!(media_type, "text/html" | "application/xhtml+xml")
    }

    fn extract(&self, doc: &Document<'_>) -> Result<Extraction> {
        let text = String::from_utf8_lossy(doc.body);
        let base = Url::parse(doc.uri).ok();
        let mut out = Extraction::default();

        for caps in self.script_re.captures_iter(&text) {
            let attrs = self.attributes(caps.get(1).map_or("", |m| m.as_str()));
            let Some(ty) = attrs.get("type") else { continue };
            let body = caps.get(2).map_or("", |m| m.as_str()).trim();
            let parsed = if is_json_ld(ty) {
                parse_json_ld(body.as_bytes(), Some(doc.uri))
            } else if let Some(format) = rdf_format_for(ty) {
                parse_facts(body.as_bytes(), format, Some(doc.uri))
            } else {
                continue;
            };
            match parsed {
                Ok(facts) => out.facts.extend(facts),
                Err(e) => warn!(uri = doc.uri, error = %e, "embedded script block failed to parse"),
            }
        }

        for caps in self.link_re.captures_iter(&text) {
            let attrs = self.attributes(caps.get(1).map_or("", |m| m.as_str()));
            if let Some(target) = self.companion(&attrs, base.as_ref()) {
                if target != doc.uri && !out.follow.contains(&target) {
                    out.follow.push(target);
                }
            }
        }

        Ok(out)
    }
}
