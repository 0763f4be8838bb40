//! Assert-path expressions.
//!
//! Syntax: segments separated by `/`, each either `<absolute-iri>`,
//! `prefix:local` or `a` (rdf:type). A lone `*` is the wildcard path.

use crate::prefix::PrefixMap;
use lodharvest_core::{iri, Error, NamedNode, Result};
use std::fmt;

const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssertPath {
    /// Fetch everything directly known about the subject.
    Wildcard,
    Segments(Vec<NamedNode>),
}

impl AssertPath {
    pub fn parse(expr: &str, prefixes: &PrefixMap) -> Result<Self> {
        let trimmed = expr.trim();
        if trimmed == "*" {
            return Ok(Self::Wildcard);
        }
        let segments = tokenize(trimmed)
            .map_err(|reason| Error::path_syntax(expr, reason))?
            .into_iter()
            .map(|token| resolve(token, prefixes).map_err(|reason| Error::path_syntax(expr, reason)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::Segments(segments))
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Wildcard)
    }

    pub fn segments(&self) -> &[NamedNode] {
        match self {
            Self::Wildcard => &[],
            Self::Segments(s) => s,
        }
    }

    /// Number of segments; 0 for the wildcard.
    pub fn max_depth(&self) -> usize {
        self.segments().len()
    }

    /// The first `depth` segments.
    pub fn prefix(&self, depth: usize) -> &[NamedNode] {
        let segments = self.segments();
        &segments[..depth.min(segments.len())]
    }

    pub fn prefix_variable(depth: usize) -> String {
        format!("o{depth}")
    }

    /// Query selecting the distinct terms reached by following the first
    /// `depth` segments from `subject`. `None` for depth 0.
    pub fn prefix_query(&self, subject: &NamedNode, depth: usize) -> Option<String> {
        let prefix = self.prefix(depth);
        if prefix.is_empty() || depth > prefix.len() {
            return None;
        }
        let mut patterns = String::new();
        let mut from = subject.to_string();
        for (i, segment) in prefix.iter().enumerate() {
            let to = format!("?{}", Self::prefix_variable(i + 1));
            patterns.push_str(&format!("{from} {segment} {to} . "));
            from = to;
        }
        Some(format!(
            "SELECT DISTINCT {from} WHERE {{ {patterns}}}"
        ))
    }

    /// Canonical rendering of a prefix, `<a>/<b>`; empty for depth 0.
    pub fn render_prefix(&self, depth: usize) -> String {
        self.prefix(depth)
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl fmt::Display for AssertPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wildcard => f.write_str("*"),
            Self::Segments(_) => f.write_str(&self.render_prefix(self.max_depth())),
        }
    }
}

enum Token<'a> {
    Iri(&'a str),
    Name(&'a str),
}

fn tokenize(expr: &str) -> std::result::Result<Vec<Token<'_>>, String> {
    if expr.is_empty() {
        return Err("empty path".into());
    }
    let mut tokens = Vec::new();
    let mut rest = expr;
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            return Err("path ends with '/'".into());
        }
        let token = if let Some(inner) = rest.strip_prefix('<') {
            let end = inner.find('>').ok_or("unterminated '<'")?;
            rest = &inner[end + 1..];
            Token::Iri(&inner[..end])
        } else {
            let end = rest.find(|c: char| c == '/' || c.is_whitespace()).unwrap_or(rest.len());
            let name = &rest[..end];
            if name.is_empty() {
                return Err("empty segment".into());
            }
            if name == "*" {
                return Err("'*' must be the whole path".into());
            }
            rest = &rest[end..];
            Token::Name(name)
        };
        tokens.push(token);

        rest = rest.trim_start();
        match rest.strip_prefix('/') {
            Some(after) => rest = after,
            None if rest.is_empty() => return Ok(tokens),
            None => return Err(format!("expected '/' before '{rest}'")),
        }
    }
}

fn resolve(token: Token<'_>, prefixes: &PrefixMap) -> std::result::Result<NamedNode, String> {
    let value = match token {
        Token::Iri(value) => value.to_string(),
        Token::Name("a") => RDF_TYPE.to_string(),
        Token::Name(name) => {
            let (prefix, _) = name
                .split_once(':')
                .ok_or_else(|| format!("'{name}' is neither <iri> nor prefix:local"))?;
            prefixes
                .expand(name)
                .ok_or_else(|| format!("unknown prefix '{prefix}'"))?
        }
    };
    iri(&value).map_err(|e| e.to_string())
}
