//! JSON-LD documents as facts.
//!
//! Covers what web pages and linked-data APIs actually publish: inline,
//! array and scoped contexts with `@vocab`, `@base`, `@language`, prefixes
//! and term definitions (`@type` coercion, `@container: @list`, `@reverse`),
//! node objects with `@id`, `@type`, `@graph`, `@reverse` and nesting, value
//! objects, `@list` and `@set`. Remote contexts are not dereferenced; the
//! schema.org context is recognised and maps to its vocabulary.
//!
//! Named graphs are flattened: every fact of the document lands in the
//! partition of the document it came from.

use crate::extract::{ContentExtractor, Document, Extraction};
use lodharvest_core::{fact, is_absolute_iri, BlankNode, Error, Fact, Literal, NamedNode, Result, Subject, Term};
use oxigraph::model::vocab::{rdf, xsd};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;
use url::Url;

pub const JSON_LD: &str = "application/ld+json";

const SCHEMA_ORG_VOCAB: &str = "http://schema.org/";

// term definitions may point at other terms; bound the chain
const MAX_TERM_HOPS: usize = 8;

pub fn is_json_ld(media_type: &str) -> bool {
    media_type.split(';').next().unwrap_or("").trim().eq_ignore_ascii_case(JSON_LD)
}

/// Parse a JSON-LD body. Relative references resolve against `base`.
pub fn parse_json_ld(body: &[u8], base: Option<&str>) -> Result<Vec<Fact>> {
    let value: Value = serde_json::from_slice(body).map_err(|e| Error::parse("json-ld", e))?;
    let context = Context {
        base: base.and_then(|b| Url::parse(b).ok()),
        ..Context::default()
    };
    let mut converter = Converter::default();
    converter.top_level(&value, &context);
    Ok(converter.facts)
}

#[derive(Debug, Clone, Default)]
struct TermDef {
    /// `None` marks a term explicitly mapped to null, which drops it.
    id: Option<String>,
    coerce: Option<String>,
    container: Option<String>,
    language: Option<String>,
    reverse: bool,
}

#[derive(Debug, Clone, Default)]
struct Context {
    base: Option<Url>,
    vocab: Option<String>,
    language: Option<String>,
    terms: HashMap<String, TermDef>,
}

impl Context {
    fn with(&self, local: &Value) -> Context {
        match local {
            Value::Null => Context {
                base: self.base.clone(),
                ..Context::default()
            },
            Value::Array(items) => items.iter().fold(self.clone(), |ctx, item| ctx.with(item)),
            Value::String(remote) => {
                let mut ctx = self.clone();
                let trimmed = remote.trim_end_matches('/');
                if trimmed.ends_with("//schema.org") || trimmed.ends_with("//schema.org/docs/jsonldcontext.json") {
                    ctx.vocab = Some(SCHEMA_ORG_VOCAB.to_string());
                } else {
                    debug!(context = %remote, "remote JSON-LD context not dereferenced");
                }
                ctx
            }
            Value::Object(map) => self.with_object(map),
            _ => self.clone(),
        }
    }

    fn with_object(&self, map: &Map<String, Value>) -> Context {
        let mut ctx = self.clone();
        if let Some(base) = map.get("@base") {
            ctx.base = match base {
                Value::String(b) => match &self.base {
                    Some(current) => current.join(b).ok(),
                    None => Url::parse(b).ok(),
                },
                _ => None,
            };
        }
        if let Some(vocab) = map.get("@vocab") {
            let vocab = vocab.as_str().and_then(|v| {
                if v.is_empty() {
                    ctx.base.as_ref().map(|b| b.to_string())
                } else {
                    ctx.expand(v, true).or_else(|| Some(v.to_string()))
                }
            });
            ctx.vocab = vocab;
        }
        if let Some(language) = map.get("@language") {
            ctx.language = language.as_str().map(str::to_string);
        }
        for (term, definition) in map {
            if term.starts_with('@') {
                continue;
            }
            let def = match definition {
                Value::Null => TermDef::default(),
                Value::String(id) => TermDef {
                    id: Some(id.clone()),
                    ..TermDef::default()
                },
                Value::Object(d) => {
                    let reverse = d.get("@reverse").and_then(Value::as_str);
                    TermDef {
                        id: reverse
                            .or_else(|| d.get("@id").and_then(Value::as_str))
                            .map(str::to_string)
                            .or_else(|| Some(term.clone())),
                        coerce: d.get("@type").and_then(Value::as_str).map(str::to_string),
                        container: d.get("@container").and_then(Value::as_str).map(str::to_string),
                        language: d.get("@language").and_then(Value::as_str).map(str::to_string),
                        reverse: reverse.is_some(),
                    }
                }
                _ => continue,
            };
            ctx.terms.insert(term.clone(), def);
        }
        ctx
    }

    /// Expand a term, compact IRI or reference to an absolute IRI. `vocab`
    /// selects vocabulary-relative resolution (properties, types) over
    /// document-relative resolution (`@id` values).
    fn expand(&self, value: &str, vocab: bool) -> Option<String> {
        self.expand_hops(value, vocab, 0)
    }

    fn expand_hops(&self, value: &str, vocab: bool, hops: usize) -> Option<String> {
        if value.starts_with('@') || hops > MAX_TERM_HOPS {
            return None;
        }
        if vocab {
            if let Some(def) = self.terms.get(value) {
                let id = def.id.as_deref()?;
                if id == value {
                    return self.vocab.as_ref().map(|v| format!("{v}{value}"));
                }
                return self.expand_hops(id, true, hops + 1);
            }
        }
        if let Some((prefix, suffix)) = value.split_once(':') {
            if prefix == "_" {
                return Some(value.to_string());
            }
            if !suffix.starts_with("//") {
                if let Some(ns) = self.terms.get(prefix).and_then(|d| d.id.as_deref()) {
                    if let Some(ns) = self.expand_hops(ns, true, hops + 1) {
                        return Some(format!("{ns}{suffix}"));
                    }
                }
            }
            if is_absolute_iri(value) {
                return Some(value.to_string());
            }
        }
        if vocab {
            return self.vocab.as_ref().map(|v| format!("{v}{value}"));
        }
        self.base.as_ref()?.join(value).ok().map(|u| u.to_string())
    }
}

#[derive(Default)]
struct Converter {
    facts: Vec<Fact>,
    labels: HashMap<String, BlankNode>,
}

impl Converter {
    fn top_level(&mut self, value: &Value, ctx: &Context) {
        match value {
            Value::Array(items) => {
                for item in items {
                    self.top_level(item, ctx);
                }
            }
            Value::Object(map) if !map.contains_key("@value") => {
                self.node(map, ctx);
            }
            _ => {}
        }
    }

    /// `_:label` or an IRI reference, as a subject.
    fn resource(&mut self, id: &str, ctx: &Context, vocab: bool) -> Option<Subject> {
        if let Some(label) = id.strip_prefix("_:") {
            let node = self.labels.entry(label.to_string()).or_default();
            return Some(node.clone().into());
        }
        let expanded = ctx.expand(id, vocab)?;
        NamedNode::new(expanded).ok().map(Subject::from)
    }

    fn node(&mut self, map: &Map<String, Value>, outer: &Context) -> Subject {
        let ctx = match map.get("@context") {
            Some(local) => outer.with(local),
            None => outer.clone(),
        };
        let subject = map
            .get("@id")
            .and_then(Value::as_str)
            .and_then(|id| self.resource(id, &ctx, false))
            .unwrap_or_else(|| BlankNode::default().into());

        for ty in values(map.get("@type")) {
            let Some(ty) = ty.as_str() else { continue };
            if let Some(Subject::NamedNode(class)) = self.resource(ty, &ctx, true) {
                self.facts.push(fact(subject.clone(), rdf::TYPE, class));
            }
        }

        if let Some(Value::Object(reverse)) = map.get("@reverse") {
            for (key, value) in reverse {
                let Some(predicate) = property(key, &ctx) else { continue };
                let def = ctx.terms.get(key).cloned();
                for object in self.objects(value, def.as_ref(), &ctx) {
                    if let Some(from) = as_subject(object) {
                        self.facts.push(fact(from, predicate.clone(), subject.clone()));
                    }
                }
            }
        }

        for (key, value) in map {
            if key.starts_with('@') {
                continue;
            }
            let Some(predicate) = property(key, &ctx) else {
                debug!(term = %key, "JSON-LD term without IRI mapping dropped");
                continue;
            };
            let def = ctx.terms.get(key).cloned();
            let reverse = def.as_ref().is_some_and(|d| d.reverse);
            for object in self.objects(value, def.as_ref(), &ctx) {
                if reverse {
                    if let Some(from) = as_subject(object) {
                        self.facts.push(fact(from, predicate.clone(), subject.clone()));
                    }
                } else {
                    self.facts.push(fact(subject.clone(), predicate.clone(), object));
                }
            }
        }

        if let Some(graph) = map.get("@graph") {
            for item in values(Some(graph)) {
                if let Value::Object(inner) = item {
                    if !inner.contains_key("@value") {
                        self.node(inner, &ctx);
                    }
                }
            }
        }
        subject
    }

    fn objects(&mut self, value: &Value, def: Option<&TermDef>, ctx: &Context) -> Vec<Term> {
        match value {
            Value::Null => Vec::new(),
            Value::Array(items) if def.and_then(|d| d.container.as_deref()) == Some("@list") => {
                vec![self.list(items, def, ctx)]
            }
            Value::Array(items) => items.iter().flat_map(|v| self.objects(v, def, ctx)).collect(),
            Value::Object(map) => {
                if let Some(v) = map.get("@value") {
                    return value_object(v, map, ctx).into_iter().collect();
                }
                if let Some(list) = map.get("@list") {
                    let items: Vec<Value> = values(Some(list)).into_iter().cloned().collect();
                    return vec![self.list(&items, def, ctx)];
                }
                if let Some(set) = map.get("@set") {
                    return self.objects(set, def, ctx);
                }
                vec![Term::from(self.node(map, ctx))]
            }
            Value::String(s) => match def.and_then(|d| d.coerce.as_deref()) {
                Some("@id") => self.resource(s, ctx, false).map(Term::from).into_iter().collect(),
                Some("@vocab") => self.resource(s, ctx, true).map(Term::from).into_iter().collect(),
                Some(datatype) => typed(s.clone(), datatype, ctx).into_iter().collect(),
                None => {
                    let language = def.and_then(|d| d.language.as_ref()).or(ctx.language.as_ref());
                    let literal = match language {
                        Some(lang) => Literal::new_language_tagged_literal(s.clone(), lang)
                            .unwrap_or_else(|_| Literal::new_simple_literal(s.clone())),
                        None => Literal::new_simple_literal(s.clone()),
                    };
                    vec![literal.into()]
                }
            },
            Value::Bool(_) | Value::Number(_) => {
                let coerced = def
                    .and_then(|d| d.coerce.as_deref())
                    .filter(|c| !c.starts_with('@'));
                match coerced {
                    Some(datatype) => typed(scalar_lexical(value), datatype, ctx).into_iter().collect(),
                    None => scalar(value).into_iter().collect(),
                }
            }
        }
    }

    fn list(&mut self, items: &[Value], def: Option<&TermDef>, ctx: &Context) -> Term {
        // members of a list-container term are plain values
        let member_def = def.map(|d| TermDef {
            container: None,
            ..d.clone()
        });
        let members: Vec<Term> = items
            .iter()
            .flat_map(|v| self.objects(v, member_def.as_ref(), ctx))
            .collect();
        let mut head: Term = NamedNode::from(rdf::NIL).into();
        for member in members.into_iter().rev() {
            let cell = BlankNode::default();
            self.facts.push(fact(cell.clone(), rdf::FIRST, member));
            self.facts.push(fact(cell.clone(), rdf::REST, head));
            head = cell.into();
        }
        head
    }
}

fn values(value: Option<&Value>) -> Vec<&Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(other) => vec![other],
    }
}

fn property(key: &str, ctx: &Context) -> Option<NamedNode> {
    let iri = ctx.expand(key, true)?;
    if iri.starts_with("_:") {
        return None;
    }
    NamedNode::new(iri).ok()
}

fn as_subject(term: Term) -> Option<Subject> {
    match term {
        Term::NamedNode(n) => Some(n.into()),
        Term::BlankNode(b) => Some(b.into()),
        _ => None,
    }
}

fn typed(lexical: String, datatype: &str, ctx: &Context) -> Option<Term> {
    let datatype = NamedNode::new(ctx.expand(datatype, true)?).ok()?;
    Some(Literal::new_typed_literal(lexical, datatype).into())
}

fn scalar_lexical(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Native JSON scalars: booleans, integers, doubles in canonical `1.5E0` form.
fn scalar(value: &Value) -> Option<Term> {
    let literal = match value {
        Value::Bool(b) => Literal::new_typed_literal(b.to_string(), xsd::BOOLEAN),
        Value::Number(n) if n.is_i64() || n.is_u64() => Literal::new_typed_literal(n.to_string(), xsd::INTEGER),
        Value::Number(n) => Literal::new_typed_literal(format!("{:E}", n.as_f64()?), xsd::DOUBLE),
        Value::String(s) => Literal::new_simple_literal(s.clone()),
        _ => return None,
    };
    Some(literal.into())
}

fn value_object(value: &Value, map: &Map<String, Value>, ctx: &Context) -> Option<Term> {
    if let Some(datatype) = map.get("@type").and_then(Value::as_str) {
        return typed(scalar_lexical(value), datatype, ctx);
    }
    if let (Some(lang), Value::String(s)) = (map.get("@language").and_then(Value::as_str), value) {
        return Literal::new_language_tagged_literal(s.clone(), lang).ok().map(Term::from);
    }
    scalar(value)
}

/// JSON-LD responses, served directly.
pub struct JsonLdExtractor;

impl ContentExtractor for JsonLdExtractor {
    fn name(&self) -> &str {
        "json-ld"
    }

    fn accepts(&self, media_type: &str) -> bool {
        is_json_ld(media_type)
    }

    fn extract(&self, doc: &Document<'_>) -> Result<Extraction> {
        Ok(Extraction {
            facts: parse_json_ld(doc.body, Some(doc.uri))?,
            follow: Vec::new(),
        })
    }
}
