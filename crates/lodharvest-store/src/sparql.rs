//! Remote graph store speaking the SPARQL 1.1 protocol.
//!
//! Reads go to the query endpoint, writes to the update endpoint. Every
//! operation is one isolated round trip; the lastmod refresh is part of the
//! same update request as the content change.
//!
//! Whole-store reads must see every partition. Endpoints differ in how the
//! union of named graphs is reached, so [`UnionGraph`] names the dialect.

use crate::mapper::PartitionMapper;
use crate::store::{GraphStore, ResultSet, Row};
use chrono::{DateTime, Utc};
use lodharvest_core::vocab::{schema, ADMIN_PARTITION};
use lodharvest_core::{
    iri, parse_facts, parse_timestamp, rdf_format_for, timestamp_literal, to_ntriples, BlankNode,
    Error, Fact, Literal, Result, Term,
};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, error};

const RESULTS_ACCEPT: &str =
    "application/sparql-results+json, application/n-triples;q=0.9, text/turtle;q=0.8";

/// How a query without a partition reaches the union of all partitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnionGraph {
    /// The endpoint's default graph already is the union.
    #[default]
    Native,
    /// Name a virtual union graph as default graph, e.g. `urn:x-arq:UnionGraph` on Fuseki.
    DefaultGraphUri(String),
    /// Send a boolean request parameter, e.g. `union-default-graph` on an Oxigraph server.
    Flag(String),
}

pub struct SparqlGraphStore {
    client: Client,
    read_endpoint: String,
    write_endpoint: Option<String>,
    mapper: PartitionMapper,
    union_graph: UnionGraph,
}

impl SparqlGraphStore {
    /// A store without an update endpoint is read-only.
    pub fn new(read_endpoint: impl Into<String>, write_endpoint: Option<String>) -> Self {
        Self {
            client: Client::new(),
            read_endpoint: read_endpoint.into(),
            write_endpoint: write_endpoint.filter(|e| !e.is_empty()),
            mapper: PartitionMapper::default(),
            union_graph: UnionGraph::default(),
        }
    }

    pub fn with_union_graph(mut self, union_graph: UnionGraph) -> Self {
        self.union_graph = union_graph;
        self
    }

    pub fn with_mapper(mut self, mapper: PartitionMapper) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    async fn update(&self, op: &str, update: String) -> Result<()> {
        let Some(endpoint) = &self.write_endpoint else {
            return Err(Error::ReadOnly(format!("{op} rejected: no update endpoint")));
        };
        debug!(op, bytes = update.len(), "sparql update");
        let response = self
            .client
            .post(endpoint)
            .header(CONTENT_TYPE, "application/sparql-update")
            .body(update)
            .send()
            .await
            .map_err(Error::store)?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(op, %status, "sparql update failed");
            return Err(Error::store(format!("{op} failed: {status}: {text}")));
        }
        Ok(())
    }

    /// Request parameters for `query`, scoped to one partition or the union.
    pub(crate) fn query_params(&self, query: &str, partition: Option<&str>) -> Vec<(String, String)> {
        let mut form = vec![("query".to_string(), query.to_string())];
        match (partition, &self.union_graph) {
            (Some(key), _) => form.push(("default-graph-uri".into(), self.mapper.key_to_uri(key))),
            (None, UnionGraph::Native) => {}
            (None, UnionGraph::DefaultGraphUri(uri)) => form.push(("default-graph-uri".into(), uri.clone())),
            (None, UnionGraph::Flag(name)) => form.push((name.clone(), "true".into())),
        }
        form
    }

    // Admin queries address the admin graph by name and need the endpoint's
    // own dataset, so they never carry dataset parameters.
    async fn admin_select(&self, query: String) -> Result<ResultSet> {
        self.post_query(vec![("query".to_string(), query)]).await
    }

    async fn post_query(&self, form: Vec<(String, String)>) -> Result<ResultSet> {
        let response = self
            .client
            .post(&self.read_endpoint)
            .header(ACCEPT, RESULTS_ACCEPT)
            .form(&form)
            .send()
            .await
            .map_err(Error::query)?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/sparql-results+json")
            .to_string();
        let body = response.bytes().await.map_err(Error::query)?;
        if !status.is_success() {
            return Err(Error::query(format!(
                "{status}: {}",
                String::from_utf8_lossy(&body)
            )));
        }
        if let Some(format) = rdf_format_for(&content_type) {
            return Ok(ResultSet::Graph(parse_facts(&body, format, None)?));
        }
        parse_json_results(&body)
    }
}

fn admin_uri() -> &'static str {
    ADMIN_PARTITION.as_str()
}

pub(crate) fn insert_update(facts: &[Fact], graph: Option<&str>, now: DateTime<Utc>) -> String {
    let data = to_ntriples(facts);
    let Some(graph) = graph else {
        return format!("INSERT DATA {{\n{data}}}");
    };
    format!(
        "INSERT DATA {{ GRAPH <{graph}> {{\n{data}}} }} ;\n{}",
        refresh_update(graph, now, false)
    )
}

/// Replace the lastmod entry of `graph`. With `only_if_tracked` the update
/// is a no-op for graphs without an entry.
pub(crate) fn refresh_update(graph: &str, now: DateTime<Utc>, only_if_tracked: bool) -> String {
    let admin = admin_uri();
    let predicate = schema::DATE_MODIFIED.as_str();
    let ts = timestamp_literal(now);
    if only_if_tracked {
        format!(
            "DELETE {{ GRAPH <{admin}> {{ <{graph}> <{predicate}> ?lm }} }}\n\
             INSERT {{ GRAPH <{admin}> {{ <{graph}> <{predicate}> {ts} }} }}\n\
             WHERE {{ GRAPH <{admin}> {{ <{graph}> <{predicate}> ?lm }} }}"
        )
    } else {
        format!(
            "DELETE WHERE {{ GRAPH <{admin}> {{ <{graph}> <{predicate}> ?lm }} }} ;\n\
             INSERT DATA {{ GRAPH <{admin}> {{ <{graph}> <{predicate}> {ts} }} }}"
        )
    }
}

/// Drop, refill and re-stamp `graph` in one update request.
pub(crate) fn replace_update(facts: &[Fact], graph: &str, now: DateTime<Utc>) -> String {
    format!(
        "DROP SILENT GRAPH <{graph}> ;\n{}",
        insert_update(facts, Some(graph), now)
    )
}

pub(crate) fn forget_update(graph: &str) -> String {
    format!(
        "DELETE WHERE {{ GRAPH <{}> {{ <{graph}> <{}> ?lm }} }}",
        admin_uri(),
        schema::DATE_MODIFIED.as_str()
    )
}

#[async_trait::async_trait]
impl GraphStore for SparqlGraphStore {
    fn mapper(&self) -> &PartitionMapper {
        &self.mapper
    }

    fn is_read_only(&self) -> bool {
        self.write_endpoint.is_none()
    }

    async fn insert(&self, facts: Vec<Fact>, partition: Option<&str>) -> Result<()> {
        let graph = partition.map(|k| self.mapper.key_to_uri(k));
        self.update("insert", insert_update(&facts, graph.as_deref(), Utc::now()))
            .await
    }

    async fn select(&self, query: &str, partition: Option<&str>) -> Result<ResultSet> {
        self.post_query(self.query_params(query, partition)).await
    }

    async fn drop_partition(&self, key: &str) -> Result<()> {
        let graph = self.mapper.key_to_uri(key);
        self.update(
            "drop",
            format!(
                "DROP SILENT GRAPH <{graph}> ;\n{}",
                refresh_update(&graph, Utc::now(), true)
            ),
        )
        .await
    }

    async fn replace_partition(&self, key: &str, facts: Vec<Fact>) -> Result<()> {
        let graph = self.mapper.key_to_uri(key);
        self.update("replace", replace_update(&facts, &graph, Utc::now()))
            .await
    }

    async fn forget(&self, key: &str) -> Result<()> {
        self.update("forget", forget_update(&self.mapper.key_to_uri(key)))
            .await
    }

    async fn lastmod(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let results = self
            .admin_select(format!(
                "SELECT ?lm WHERE {{ GRAPH <{}> {{ <{}> <{}> ?lm }} }}",
                admin_uri(),
                self.mapper.key_to_uri(key),
                schema::DATE_MODIFIED.as_str()
            ))
            .await?;
        Ok(results.column("lm").filter_map(parse_timestamp).max())
    }

    async fn known_keys(&self) -> Result<Vec<String>> {
        let results = self
            .admin_select(format!(
                "SELECT DISTINCT ?g WHERE {{ GRAPH <{}> {{ ?g <{}> ?lm }} }}",
                admin_uri(),
                schema::DATE_MODIFIED.as_str()
            ))
            .await?;
        let mut keys: Vec<String> = results
            .column("g")
            .filter_map(|t| match t {
                Term::NamedNode(n) => self.mapper.uri_to_key(n.as_str()),
                _ => None,
            })
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

// ---------------------------------------------------------------------------
// application/sparql-results+json
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct JsonResults {
    #[serde(default)]
    head: JsonHead,
    boolean: Option<bool>,
    results: Option<JsonBindings>,
}

#[derive(Deserialize, Default)]
struct JsonHead {
    #[serde(default)]
    vars: Vec<String>,
}

#[derive(Deserialize)]
struct JsonBindings {
    bindings: Vec<HashMap<String, JsonTerm>>,
}

#[derive(Deserialize)]
struct JsonTerm {
    #[serde(rename = "type")]
    kind: String,
    value: String,
    datatype: Option<String>,
    #[serde(rename = "xml:lang")]
    lang: Option<String>,
}

impl JsonTerm {
    fn into_term(self) -> Result<Term> {
        match self.kind.as_str() {
            "uri" => Ok(iri(&self.value)?.into()),
            "bnode" => BlankNode::new(&self.value)
                .map(Term::from)
                .map_err(|e| Error::query(format!("bad blank node {}: {e}", self.value))),
            "literal" | "typed-literal" => {
                if let Some(lang) = self.lang {
                    Literal::new_language_tagged_literal(self.value, lang)
                        .map(Term::from)
                        .map_err(Error::query)
                } else if let Some(dt) = self.datatype {
                    Ok(Literal::new_typed_literal(self.value, iri(&dt)?).into())
                } else {
                    Ok(Literal::new_simple_literal(self.value).into())
                }
            }
            other => Err(Error::query(format!("unsupported term type '{other}'"))),
        }
    }
}

pub(crate) fn parse_json_results(body: &[u8]) -> Result<ResultSet> {
    let parsed: JsonResults = serde_json::from_slice(body)?;
    if let Some(b) = parsed.boolean {
        return Ok(ResultSet::Boolean(b));
    }
    let mut rows = Vec::new();
    for binding in parsed.results.map(|r| r.bindings).unwrap_or_default() {
        let mut row = Row::new();
        for (var, term) in binding {
            row.insert(var, term.into_term()?);
        }
        rows.push(row);
    }
    Ok(ResultSet::Solutions {
        variables: parsed.head.vars,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodharvest_core::fact;

    #[test]
    fn parses_select_results() {
        let body = br#"{
            "head": {"vars": ["s", "label"]},
            "results": {"bindings": [
                {"s": {"type": "uri", "value": "https://example.org/a"},
                 "label": {"type": "literal", "value": "A", "xml:lang": "en"}},
                {"s": {"type": "bnode", "value": "b0"}}
            ]}
        }"#;
        let rs = parse_json_results(body).unwrap();
        assert_eq!(rs.variables(), &["s".to_string(), "label".to_string()]);
        assert_eq!(rs.len(), 2);
        assert_eq!(rs.column("label").count(), 1);
        assert!(matches!(rs.rows()[1]["s"], Term::BlankNode(_)));
    }

    #[test]
    fn parses_ask_results() {
        let rs = parse_json_results(br#"{"head": {}, "boolean": true}"#).unwrap();
        assert_eq!(rs.boolean(), Some(true));
    }

    #[test]
    fn typed_literal_keeps_datatype() {
        let body = br#"{"head": {"vars": ["n"]}, "results": {"bindings": [
            {"n": {"type": "literal", "value": "3", "datatype": "http://www.w3.org/2001/XMLSchema#integer"}}
        ]}}"#;
        let rs = parse_json_results(body).unwrap();
        match &rs.rows()[0]["n"] {
            Term::Literal(l) => assert_eq!(l.datatype().as_str(), "http://www.w3.org/2001/XMLSchema#integer"),
            other => panic!("expected literal, got {other}"),
        }
    }

    #[test]
    fn insert_update_refreshes_lastmod_in_same_request() {
        let f = fact(
            iri("https://example.org/s").unwrap(),
            iri("https://example.org/p").unwrap(),
            iri("https://example.org/o").unwrap(),
        );
        let update = insert_update(&[f], Some("urn:g"), Utc::now());
        assert!(update.contains("GRAPH <urn:g>"));
        assert!(update.contains("<https://example.org/s> <https://example.org/p> <https://example.org/o> ."));
        assert!(update.contains(admin_uri()));
        assert!(update.contains("DELETE WHERE"));
    }

    #[test]
    fn unpartitioned_insert_skips_admin() {
        let update = insert_update(&[], None, Utc::now());
        assert!(!update.contains(admin_uri()));
    }

    #[test]
    fn drop_refresh_is_conditional() {
        let update = refresh_update("urn:g", Utc::now(), true);
        assert!(update.contains("WHERE { GRAPH"));
        assert!(update.starts_with("DELETE {"));
    }

    #[test]
    fn replace_is_a_single_update() {
        let f = fact(
            iri("https://example.org/s").unwrap(),
            iri("https://example.org/p").unwrap(),
            iri("https://example.org/o").unwrap(),
        );
        let update = replace_update(&[f], "urn:g", Utc::now());
        let drop = update.find("DROP SILENT GRAPH <urn:g>").unwrap();
        let insert = update.find("INSERT DATA { GRAPH <urn:g>").unwrap();
        assert!(drop < insert);
        // stamped unconditionally, so a fresh partition becomes tracked
        assert!(!update.contains("DELETE {"));
        assert!(update.contains(admin_uri()));
    }

    fn param<'a>(form: &'a [(String, String)], name: &str) -> Vec<&'a str> {
        form.iter().filter(|(k, _)| k == name).map(|(_, v)| v.as_str()).collect()
    }

    #[test]
    fn whole_store_queries_follow_union_dialect() {
        let q = "SELECT * WHERE { ?s ?p ?o }";

        let native = SparqlGraphStore::new("http://localhost/q", None);
        let form = native.query_params(q, None);
        assert_eq!(param(&form, "query"), vec![q]);
        assert_eq!(form.len(), 1);

        let fuseki = SparqlGraphStore::new("http://localhost/q", None)
            .with_union_graph(UnionGraph::DefaultGraphUri("urn:x-arq:UnionGraph".into()));
        assert_eq!(
            param(&fuseki.query_params(q, None), "default-graph-uri"),
            vec!["urn:x-arq:UnionGraph"]
        );

        let flagged = SparqlGraphStore::new("http://localhost/q", None)
            .with_union_graph(UnionGraph::Flag("union-default-graph".into()));
        assert_eq!(param(&flagged.query_params(q, None), "union-default-graph"), vec!["true"]);
    }

    #[test]
    fn partition_queries_ignore_union_dialect() {
        let store = SparqlGraphStore::new("http://localhost/q", None)
            .with_union_graph(UnionGraph::Flag("union-default-graph".into()));
        let form = store.query_params("ASK {}", Some("k"));
        assert_eq!(param(&form, "default-graph-uri"), vec![store.mapper().key_to_uri("k")]);
        assert!(param(&form, "union-default-graph").is_empty());
    }

    #[test]
    fn forget_only_touches_admin() {
        let update = forget_update("urn:g");
        assert!(update.contains(admin_uri()));
        assert!(!update.contains("DROP"));
    }

    #[tokio::test]
    async fn writes_without_update_endpoint_are_rejected() {
        let store = SparqlGraphStore::new("http://127.0.0.1:9/sparql", None);
        assert!(store.is_read_only());
        let err = store.insert(vec![], Some("k")).await.unwrap_err();
        assert!(matches!(err, Error::ReadOnly(_)));
        let err = store.forget("k").await.unwrap_err();
        assert!(matches!(err, Error::ReadOnly(_)));
    }
}
